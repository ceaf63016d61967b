//! System-wide default constants.
//!
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Loading
// ============================================================================

/// Environment variable naming the config file to load.
pub const CONFIG_ENV_VAR: &str = "GUARDPOST_CONFIG";

/// Config file looked up in the working directory when the env var is unset.
pub const LOCAL_CONFIG_FILE: &str = "guardpost.toml";

// ============================================================================
// Gateway
// ============================================================================

/// Backend API root.
pub const BASE_URL: &str = "http://127.0.0.1:8000/api";

/// Per-request timeout for backend calls (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Delivery Workflow
// ============================================================================

/// Delay before a successful delivery resets to Idle (ms).
pub const SUCCESS_RESET_MS: u64 = 2_500;

// ============================================================================
// Incident Workflow
// ============================================================================

/// Delay before the confirmation screen returns to the menu (ms).
pub const CONFIRMATION_RETURN_MS: u64 = 1_500;

/// Largest photo accepted as incident evidence (bytes). 5 MiB.
pub const MAX_PHOTO_BYTES: u64 = 5 * 1024 * 1024;

// ============================================================================
// Scanner
// ============================================================================

/// External QR decoder spawned by the camera device.
pub const DECODER_COMMAND: &str = "zbarcam";

/// Decoder arguments: raw payloads, one per line, no preview window.
pub const DECODER_ARGS: &[&str] = &["--raw", "--nodisplay"];

/// Frames buffered between the capture device and the scan session.
pub const FRAME_BUFFER: usize = 16;
