//! Workflow error taxonomy
//!
//! Every failure the guard sees is a [`WorkflowError`]. Gateway errors are
//! recorded on the orchestrator as `last_error`; guard rejections
//! (`InvalidTransition`, `Busy`, `StatisticsDisabled`) are only returned.

use crate::gateway::GatewayError;
use crate::scanner::ScanError;
use crate::types::ContractType;
use serde::Serialize;
use std::collections::BTreeMap;

/// Validation fields that refer to the selected box. A confirm rejected on
/// one of these sends the guard back to box entry.
pub(crate) const BOX_FIELDS: &[&str] = &["caja", "caja_codigo", "cantidad_disponible"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowError {
    #[error("{message}")]
    NotFound { message: String },

    #[error("{message}")]
    Validation {
        message: String,
        fields: BTreeMap<String, Vec<String>>,
    },

    #[error("Box belongs to branch {box_branch}, worker belongs to {worker_branch}")]
    BranchMismatch {
        box_branch: String,
        worker_branch: String,
    },

    #[error("Connection problem: {message}")]
    Network { message: String },

    #[error("Cannot {operation} while {step}")]
    InvalidTransition {
        operation: &'static str,
        step: String,
    },

    #[error("A request is already in progress")]
    Busy,

    #[error("Statistics panel is disabled")]
    StatisticsDisabled,

    #[error(transparent)]
    Scan(#[from] ScanError),
}

impl WorkflowError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        WorkflowError::Validation {
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    pub(crate) fn invalid(operation: &'static str, step: impl std::fmt::Display) -> Self {
        WorkflowError::InvalidTransition {
            operation,
            step: step.to_string(),
        }
    }

    /// Whether this is a guard rejection rather than an outcome worth recording.
    pub fn is_guard_rejection(&self) -> bool {
        matches!(
            self,
            WorkflowError::InvalidTransition { .. }
                | WorkflowError::Busy
                | WorkflowError::StatisticsDisabled
        )
    }

    /// Whether a validation failure points at the selected box.
    pub(crate) fn concerns_box(&self) -> bool {
        match self {
            WorkflowError::Validation { fields, .. } => {
                fields.keys().any(|k| BOX_FIELDS.contains(&k.as_str()))
            }
            _ => false,
        }
    }
}

impl From<GatewayError> for WorkflowError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::NotFound(message) => WorkflowError::NotFound { message },
            GatewayError::Validation { message, fields } => {
                WorkflowError::Validation { message, fields }
            }
            GatewayError::BranchMismatch {
                box_branch,
                worker_branch,
            } => WorkflowError::BranchMismatch {
                box_branch,
                worker_branch,
            },
            GatewayError::Network(message) => WorkflowError::Network { message },
        }
    }
}

/// Non-blocking notice: worker and box contract types differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContractTypeWarning {
    pub worker: ContractType,
    #[serde(rename = "box")]
    pub box_contract: ContractType,
}

impl std::fmt::Display for ContractTypeWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Worker contract is {} but the box is for {}",
            self.worker.display_name(),
            self.box_contract.display_name()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_errors_map_one_to_one() {
        let err = WorkflowError::from(GatewayError::NotFound("Trabajador no encontrado".into()));
        assert_eq!(err.to_string(), "Trabajador no encontrado");

        let err = WorkflowError::from(GatewayError::Network("timeout".into()));
        assert_eq!(err, WorkflowError::Network { message: "timeout".into() });
        assert!(!err.is_guard_rejection());
    }

    #[test]
    fn test_concerns_box() {
        let mut fields = BTreeMap::new();
        fields.insert("caja_codigo".to_string(), vec!["Sin stock".to_string()]);
        let err = WorkflowError::Validation {
            message: "Sin stock".into(),
            fields,
        };
        assert!(err.concerns_box());
        assert!(!WorkflowError::validation("RUT requerido").concerns_box());
    }

    #[test]
    fn test_guard_rejections() {
        assert!(WorkflowError::Busy.is_guard_rejection());
        assert!(WorkflowError::invalid("confirm", "Idle").is_guard_rejection());
        assert_eq!(
            WorkflowError::invalid("confirm", "Idle").to_string(),
            "Cannot confirm while Idle"
        );
    }
}
