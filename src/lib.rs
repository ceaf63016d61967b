//! Guardpost: guard-side workflows for benefit-box deliveries
//!
//! A guard at a branch gate confirms that a worker collects the box assigned
//! to them and reports incidents when something goes wrong.
//!
//! ## Architecture
//!
//! - **Workflow**: delivery and incident orchestrators (state machines)
//! - **Scanner**: exclusive QR scan sessions over one capture device
//! - **Gateway**: backend validation and persistence (`HttpGateway` over REST)
//! - **Config**: TOML deployment settings
//! - **Console**: line commands for the guard console binary

pub mod config;
pub mod console;
pub mod gateway;
pub mod scanner;
pub mod types;
pub mod workflow;

// Re-export configuration
pub use config::GuardConfig;

// Re-export the gateway seam
pub use gateway::{GatewayError, HttpGateway, ValidationGateway};

// Re-export scanning
pub use scanner::{
    CaptureDevice, ChannelDevice, DecoderProcessDevice, Frame, FrameFeed, ScanError, ScanEvent,
    ScanSessionManager, ScanSubscription, ScanTarget,
};

// Re-export commonly used types
pub use types::{
    normalize_rut, ContractType, DeliveryReceipt, GuardSession, GuardStatistics, Incident,
    IncidentDraft, IncidentField, IncidentFilter, IncidentStatus, IncidentType, InventoryBox,
    Photo, Worker,
};

// Re-export orchestrators
pub use workflow::{
    ContractTypeWarning, DashboardCapabilities, DeliveryOptions, DeliveryOrchestrator,
    DeliverySnapshot, DeliveryStep, EntryMode, IncidentOptions, IncidentOrchestrator,
    IncidentSnapshot, IncidentStep, Outcome, WorkflowError,
};
