//! Scan Session Manager: exclusive access to the capture device
//!
//! At most one scan session is active per manager. The process owns a single
//! manager (shared through `Arc` by both workflows), so at most one session is
//! active process-wide.
//!
//! A session ends in exactly one of three ways:
//! - the first successful decode (the session stops itself)
//! - an explicit [`ScanSessionManager::stop`] / [`ScanSessionManager::stop_session`]
//! - the device feed closing
//!
//! Whichever way it ends, the device is released and later frames are never
//! delivered.

pub mod device;

pub use device::{CaptureDevice, ChannelDevice, DecoderProcessDevice, Frame, FrameFeed};

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Types
// ============================================================================

/// What a scan session is reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanTarget {
    /// Worker RUT
    Worker,
    /// Box code
    Box,
}

impl std::fmt::Display for ScanTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanTarget::Worker => write!(f, "worker"),
            ScanTarget::Box => write!(f, "box"),
        }
    }
}

/// A decoded payload tagged with the session's target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEvent {
    pub target: ScanTarget,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum ScanError {
    /// Another session holds the device
    #[error("A {target} scan is already active")]
    AlreadyActive { target: ScanTarget },

    /// The device could not be acquired
    #[error("Camera unavailable: {message}")]
    DeviceUnavailable { message: String },
}

// ============================================================================
// Manager
// ============================================================================

struct ActiveScan {
    id: u64,
    target: ScanTarget,
    cancel: CancellationToken,
}

/// Hands out exclusive scan sessions over one capture device.
pub struct ScanSessionManager {
    device: Arc<dyn CaptureDevice>,
    active: Arc<Mutex<Option<ActiveScan>>>,
    next_id: AtomicU64,
}

impl ScanSessionManager {
    pub fn new(device: Arc<dyn CaptureDevice>) -> Self {
        Self {
            device,
            active: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Start a session for `target`.
    ///
    /// Fails with `AlreadyActive` while another session runs; the caller
    /// decides whether to stop it first.
    pub fn start(&self, target: ScanTarget) -> Result<ScanSubscription, ScanError> {
        let mut active = lock(&self.active);
        if let Some(current) = active.as_ref() {
            debug!(requested = %target, active = %current.target, "Scan already active");
            return Err(ScanError::AlreadyActive {
                target: current.target,
            });
        }

        let feed = self.device.acquire()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        *active = Some(ActiveScan {
            id,
            target,
            cancel: cancel.clone(),
        });
        info!(session = id, target = %target, device = self.device.name(), "Scan session started");

        Ok(ScanSubscription {
            id,
            target,
            feed,
            cancel,
            active: Arc::clone(&self.active),
            device: Arc::clone(&self.device),
        })
    }

    /// Stop whatever session is active. Idempotent; always releases the device.
    ///
    /// The device is released before the slot is unlocked, so a concurrent
    /// `start` never acquires a device that is about to be torn down.
    pub fn stop(&self) {
        let mut active = lock(&self.active);
        if let Some(scan) = active.take() {
            scan.cancel.cancel();
            info!(session = scan.id, target = %scan.target, "Scan session stopped");
        }
        self.device.release();
    }

    /// Stop session `id` if it is still the active one.
    ///
    /// Leaves a newer session (possibly started by another workflow) untouched.
    pub fn stop_session(&self, id: u64) {
        let mut active = lock(&self.active);
        if active.as_ref().is_some_and(|s| s.id != id) {
            return;
        }
        if let Some(scan) = active.take() {
            scan.cancel.cancel();
            info!(session = scan.id, target = %scan.target, "Scan session stopped");
        }
        self.device.release();
    }

    pub fn is_active(&self) -> bool {
        lock(&self.active).is_some()
    }

    /// Target of the active session, if any.
    pub fn active_target(&self) -> Option<ScanTarget> {
        lock(&self.active).as_ref().map(|s| s.target)
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Receiving end of one scan session.
///
/// Dropping it ends the session if it is still active.
pub struct ScanSubscription {
    id: u64,
    target: ScanTarget,
    feed: FrameFeed,
    cancel: CancellationToken,
    active: Arc<Mutex<Option<ActiveScan>>>,
    device: Arc<dyn CaptureDevice>,
}

impl ScanSubscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn target(&self) -> ScanTarget {
        self.target
    }

    /// Wait for the first decoded frame.
    ///
    /// Unreadable frames are skipped. Returns `None` when the session is
    /// stopped or the feed closes first. The session ends either way.
    pub async fn next_decode(mut self) -> Option<ScanEvent> {
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return None,
                frame = self.feed.recv() => match frame {
                    Some(Frame::Decoded(text)) if !text.trim().is_empty() => {
                        self.finish();
                        debug!(session = self.id, target = %self.target, "Scan decoded");
                        return Some(ScanEvent {
                            target: self.target,
                            text: text.trim().to_string(),
                        });
                    }
                    Some(_) => trace!(session = self.id, "Unreadable frame ignored"),
                    None => {
                        debug!(session = self.id, "Device feed closed");
                        self.finish();
                        return None;
                    }
                },
            }
        }
    }

    /// End this session if it is still the active one.
    fn finish(&self) {
        let mut active = lock(&self.active);
        if active.as_ref().is_some_and(|s| s.id == self.id) {
            active.take();
            self.cancel.cancel();
            self.device.release();
        }
    }
}

impl Drop for ScanSubscription {
    fn drop(&mut self) {
        self.finish();
    }
}
