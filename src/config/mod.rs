//! Guard Configuration Module
//!
//! Deployment settings loaded from TOML: backend location, workflow timings,
//! photo limits and the QR decoder command.
//!
//! ## Loading Order
//!
//! 1. `GUARDPOST_CONFIG` environment variable (path to TOML file)
//! 2. `guardpost.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! Load once at startup and hand the sections to the components that need
//! them:
//!
//! ```ignore
//! let config = GuardConfig::load();
//! let gateway = HttpGateway::new(&config.gateway, &session)?;
//! let delivery = DeliveryOrchestrator::new(gateway, scanner, session, (&config.delivery).into());
//! ```

mod guard_config;
pub mod defaults;
pub mod validation;

pub use guard_config::*;
