//! Shared data structures for the guard workflows
//!
//! - Worker / ContractType: identity returned by worker validation
//! - InventoryBox: box snapshot returned by box validation
//! - DeliveryReceipt / GuardStatistics: delivery commit result and panel counters
//! - Incident / IncidentDraft / Photo: incident history and the create form
//! - GuardSession: the authenticated guard, passed explicitly

mod incident;
mod inventory;
mod session;
mod worker;

pub use incident::*;
pub use inventory::*;
pub use session::*;
pub use worker::*;
