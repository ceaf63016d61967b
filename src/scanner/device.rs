//! Capture devices feeding decoded frames to scan sessions
//!
//! - [`ChannelDevice`]: frames pushed in-process (console simulation, tests)
//! - [`DecoderProcessDevice`]: an external QR decoder (`zbarcam`) whose stdout
//!   lines become frames

use super::{lock, ScanError};
use crate::config::ScannerConfig;
use std::process::Stdio;
use std::sync::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Result of decoding one camera frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A QR payload was read
    Decoded(String),
    /// Nothing legible in this frame
    Unreadable,
}

/// Stream of frames from an acquired device. Ends when the device is released.
pub type FrameFeed = mpsc::Receiver<Frame>;

/// A camera (or stand-in) that scan sessions acquire and release.
///
/// `release` must be idempotent and safe to call when nothing is acquired.
pub trait CaptureDevice: Send + Sync + 'static {
    /// Acquire the device and start producing frames.
    fn acquire(&self) -> Result<FrameFeed, ScanError>;

    /// Release the device; the feed ends.
    fn release(&self);

    /// Short name for logs.
    fn name(&self) -> &str;
}

// ============================================================================
// Channel device
// ============================================================================

/// Device whose frames are pushed in by the caller.
pub struct ChannelDevice {
    capacity: usize,
    sender: Mutex<Option<mpsc::Sender<Frame>>>,
}

impl ChannelDevice {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            sender: Mutex::new(None),
        }
    }

    /// Deliver a frame to the active feed.
    ///
    /// Returns false when the device is not acquired or the feed is full.
    pub fn push(&self, frame: Frame) -> bool {
        match lock(&self.sender).as_ref() {
            Some(tx) => tx.try_send(frame).is_ok(),
            None => false,
        }
    }

    /// Convenience for pushing a decoded payload.
    pub fn push_decoded(&self, text: impl Into<String>) -> bool {
        self.push(Frame::Decoded(text.into()))
    }

    pub fn is_acquired(&self) -> bool {
        lock(&self.sender).is_some()
    }
}

impl Default for ChannelDevice {
    fn default() -> Self {
        Self::new(crate::config::defaults::FRAME_BUFFER)
    }
}

impl CaptureDevice for ChannelDevice {
    fn acquire(&self) -> Result<FrameFeed, ScanError> {
        let (tx, rx) = mpsc::channel(self.capacity);
        *lock(&self.sender) = Some(tx);
        Ok(rx)
    }

    fn release(&self) {
        lock(&self.sender).take();
    }

    fn name(&self) -> &str {
        "channel"
    }
}

// ============================================================================
// Decoder process device
// ============================================================================

/// Camera access through an external decoder process.
///
/// The decoder prints one payload per stdout line. The process is killed on
/// release.
pub struct DecoderProcessDevice {
    command: String,
    args: Vec<String>,
    buffer: usize,
    child: Mutex<Option<Child>>,
}

impl DecoderProcessDevice {
    pub fn new(config: &ScannerConfig) -> Self {
        Self {
            command: config.decoder_command.clone(),
            args: config.decoder_args.clone(),
            buffer: config.frame_buffer.max(1),
            child: Mutex::new(None),
        }
    }
}

/// Map one stdout line of the decoder to a frame.
fn frame_from_line(raw: &[u8]) -> Frame {
    match std::str::from_utf8(raw) {
        Ok(line) if !line.trim().is_empty() => Frame::Decoded(line.trim().to_string()),
        _ => Frame::Unreadable,
    }
}

impl CaptureDevice for DecoderProcessDevice {
    fn acquire(&self) -> Result<FrameFeed, ScanError> {
        let mut slot = lock(&self.child);
        if let Some(mut stale) = slot.take() {
            let _ = stale.start_kill();
        }

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ScanError::DeviceUnavailable {
                message: format!("failed to start {}: {e}", self.command),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| ScanError::DeviceUnavailable {
            message: "decoder stdout not captured".to_string(),
        })?;

        let (tx, rx) = mpsc::channel(self.buffer);
        let command = self.command.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut line = Vec::new();
            loop {
                line.clear();
                match reader.read_until(b'\n', &mut line).await {
                    Ok(0) => {
                        debug!(command = %command, "Decoder output closed");
                        break;
                    }
                    Ok(_) => {
                        let frame = frame_from_line(&line);
                        trace!(?frame, "Decoder frame");
                        if tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(command = %command, error = %e, "Decoder read failed");
                        break;
                    }
                }
            }
        });

        info!(command = %self.command, pid = ?child.id(), "Decoder process started");
        *slot = Some(child);
        Ok(rx)
    }

    fn release(&self) {
        if let Some(mut child) = lock(&self.child).take() {
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "Decoder process already gone");
            }
            info!(command = %self.command, "Decoder process stopped");
        }
    }

    fn name(&self) -> &str {
        &self.command
    }
}
