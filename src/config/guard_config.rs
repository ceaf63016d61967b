//! Guard deployment configuration (TOML)

use super::defaults;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a guard station.
///
/// Load with `GuardConfig::load()` which searches:
/// 1. `$GUARDPOST_CONFIG` env var
/// 2. `./guardpost.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Backend API location and timeouts
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Delivery workflow timing and dashboard capabilities
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Incident workflow timing and photo limits
    #[serde(default)]
    pub incident: IncidentConfig,

    /// QR decoder process
    #[serde(default)]
    pub scanner: ScannerConfig,
}

impl GuardConfig {
    /// Load configuration using the standard search order:
    /// 1. `$GUARDPOST_CONFIG` environment variable
    /// 2. `./guardpost.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var(defaults::CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), base_url = %config.gateway.base_url, "Loaded guard config from GUARDPOST_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from GUARDPOST_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "GUARDPOST_CONFIG points to non-existent file, falling back");
            }
        }

        // 2. Check ./guardpost.toml
        let local = PathBuf::from(defaults::LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(base_url = %config.gateway.base_url, "Loaded guard config from ./guardpost.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./guardpost.toml, using defaults");
                }
            }
        }

        // 3. Defaults
        info!("No guardpost.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    ///
    /// Unknown keys are logged as warnings and otherwise ignored.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::from("<inline>"), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate value ranges.
    ///
    /// Impossible values fail; suspicious ones are logged.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (errors, warnings) = super::validation::validate_ranges(self);
        for w in &warnings {
            warn!("{}", w);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Gateway
// ============================================================================

/// Backend REST API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// API root, e.g. `http://127.0.0.1:8000/api`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    defaults::BASE_URL.to_string()
}
fn default_timeout_secs() -> u64 {
    defaults::HTTP_TIMEOUT_SECS
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// ============================================================================
// Delivery
// ============================================================================

/// Delivery workflow settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Milliseconds the success screen stays up before resetting to Idle
    #[serde(default = "default_success_reset_ms")]
    pub success_reset_ms: u64,

    /// Whether the dashboard statistics panel is enabled
    #[serde(default)]
    pub show_statistics: bool,
}

fn default_success_reset_ms() -> u64 {
    defaults::SUCCESS_RESET_MS
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            success_reset_ms: default_success_reset_ms(),
            show_statistics: false,
        }
    }
}

// ============================================================================
// Incident
// ============================================================================

/// Incident workflow settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentConfig {
    /// Milliseconds the confirmation screen stays up before returning to the menu
    #[serde(default = "default_confirmation_return_ms")]
    pub confirmation_return_ms: u64,

    /// Largest accepted evidence photo, in bytes
    #[serde(default = "default_max_photo_bytes")]
    pub max_photo_bytes: u64,
}

fn default_confirmation_return_ms() -> u64 {
    defaults::CONFIRMATION_RETURN_MS
}
fn default_max_photo_bytes() -> u64 {
    defaults::MAX_PHOTO_BYTES
}

impl Default for IncidentConfig {
    fn default() -> Self {
        Self {
            confirmation_return_ms: default_confirmation_return_ms(),
            max_photo_bytes: default_max_photo_bytes(),
        }
    }
}

// ============================================================================
// Scanner
// ============================================================================

/// QR decoder process settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Decoder executable; prints one decoded payload per line on stdout
    #[serde(default = "default_decoder_command")]
    pub decoder_command: String,

    /// Arguments passed to the decoder
    #[serde(default = "default_decoder_args")]
    pub decoder_args: Vec<String>,

    /// Frames buffered between device and session
    #[serde(default = "default_frame_buffer")]
    pub frame_buffer: usize,
}

fn default_decoder_command() -> String {
    defaults::DECODER_COMMAND.to_string()
}
fn default_decoder_args() -> Vec<String> {
    defaults::DECODER_ARGS.iter().map(|s| (*s).to_string()).collect()
}
fn default_frame_buffer() -> usize {
    defaults::FRAME_BUFFER
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            decoder_command: default_decoder_command(),
            decoder_args: default_decoder_args(),
            frame_buffer: default_frame_buffer(),
        }
    }
}
