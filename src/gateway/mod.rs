//! Validation Gateway: backend operations the guard workflows depend on
//!
//! The orchestrators only see the [`ValidationGateway`] trait. [`HttpGateway`]
//! implements it against the backend REST API; tests substitute in-memory
//! fakes.
//!
//! Every call is asynchronous and individually fallible. Anything other than
//! the documented success shape comes back as a [`GatewayError`], which the
//! orchestrators treat as recoverable.

pub mod http;

pub use http::HttpGateway;

use crate::types::{
    DeliveryReceipt, GuardStatistics, Incident, IncidentDraft, IncidentFilter, IncidentType,
    InventoryBox, Worker,
};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Errors returned by gateway calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The identifier does not resolve (or the record is inactive)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Field-level rejection
    #[error("Rejected: {message}")]
    Validation {
        message: String,
        /// Per-field messages, when the server reports them
        fields: BTreeMap<String, Vec<String>>,
    },

    /// Box is stocked at a different branch than the worker's
    #[error("Box belongs to {box_branch}, worker belongs to {worker_branch}")]
    BranchMismatch {
        box_branch: String,
        worker_branch: String,
    },

    /// Transport failure or unexpected server response
    #[error("Network error: {0}")]
    Network(String),
}

impl GatewayError {
    /// Validation error without per-field detail.
    pub fn validation(message: impl Into<String>) -> Self {
        GatewayError::Validation {
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }
}

/// Backend operations consumed by the delivery and incident workflows.
#[async_trait]
pub trait ValidationGateway: Send + Sync + 'static {
    /// Resolve a worker by RUT.
    async fn validate_worker(&self, rut: &str) -> Result<Worker, GatewayError>;

    /// Resolve a box by code, checking it against the worker's branch.
    async fn validate_box(&self, code: &str, branch: &str) -> Result<InventoryBox, GatewayError>;

    /// Commit a delivery of `box_code` to the worker.
    async fn create_delivery(
        &self,
        worker_rut: &str,
        box_code: &str,
    ) -> Result<DeliveryReceipt, GatewayError>;

    /// Report an incident.
    async fn create_incident(&self, draft: &IncidentDraft) -> Result<Incident, GatewayError>;

    /// Incidents reported by the current guard, newest first.
    async fn list_incidents(
        &self,
        filter: Option<IncidentFilter>,
    ) -> Result<Vec<Incident>, GatewayError>;

    /// The incident-type catalog.
    async fn list_incident_types(&self) -> Result<Vec<IncidentType>, GatewayError>;

    /// Counters for the guard dashboard's statistics panel.
    async fn guard_statistics(&self) -> Result<GuardStatistics, GatewayError>;
}
