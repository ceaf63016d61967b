//! Inventory boxes, delivery receipts and guard statistics

use super::ContractType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An inventory box as returned by box validation.
///
/// Snapshot only: stock is never decremented locally, the server is the
/// authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryBox {
    /// Unique box code (e.g. `CAJA-IND-001`)
    pub code: String,
    /// Branch code the box is stocked at
    pub branch: String,
    /// Contract type the box is intended for
    pub contract_type: ContractType,
    /// Units available at validation time
    pub available_stock: u32,
}

/// Server record of a committed delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// Server-side delivery id, when returned
    pub id: Option<u64>,
    pub worker_rut: String,
    pub box_code: String,
    /// Delivery timestamp, when returned
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Counters shown by the optional statistics panel of the guard dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardStatistics {
    pub deliveries_today: u64,
    pub deliveries_this_week: u64,
    pub deliveries_this_month: u64,
    /// Boxes with stock at the guard's branch
    pub available_stock: u64,
    /// Incidents reported by this guard still awaiting triage
    pub pending_incidents: u64,
}
