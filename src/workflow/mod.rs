//! Guard workflows
//!
//! Two orchestrators drive the guard console:
//! - [`DeliveryOrchestrator`]: worker → box → confirm → success
//! - [`IncidentOrchestrator`]: report incidents and browse history
//!
//! Both are cheap `Clone` handles over shared state. Operations validate the
//! current step synchronously, release the state lock, await the gateway and
//! then re-check a generation counter: a `reset()` in between bumps the
//! counter and the late result is discarded.

mod delivery;
mod error;
mod incident;

pub use delivery::{
    DashboardCapabilities, DeliveryOptions, DeliveryOrchestrator, DeliverySnapshot, DeliveryStep,
    EntryMode,
};
pub use error::{ContractTypeWarning, WorkflowError};
pub use incident::{IncidentOptions, IncidentOrchestrator, IncidentSnapshot, IncidentStep};

/// Result of an operation that awaited the gateway or the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<S> {
    /// The transition was applied; carries the resulting step.
    Applied(S),
    /// A reset happened while the call was in flight; the result was dropped.
    Discarded,
    /// The scan session ended without a decode.
    ScanStopped,
}

impl<S> Outcome<S> {
    pub fn applied(self) -> Option<S> {
        match self {
            Outcome::Applied(step) => Some(step),
            _ => None,
        }
    }
}
