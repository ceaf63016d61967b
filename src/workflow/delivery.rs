//! Delivery Workflow Orchestrator
//!
//! ```text
//! Idle ─┬─ scan ──▶ ScanningWorker ──┐
//!       └─ manual ▶ ManualWorkerEntry ┴─ worker ok ─▶ AwaitingBox ◀──┐
//!                                                    ├ ScanningBox     │ box rejected
//!                                                    └ ManualBoxEntry  │ at confirm
//!                                          box ok ─▶ Confirming ───────┘
//!                                        confirmed ─▶ Success ── delay ─▶ Idle
//! ```
//!
//! `reset()` returns to Idle from anywhere.

use super::error::{ContractTypeWarning, WorkflowError};
use super::Outcome;
use crate::config::DeliveryConfig;
use crate::gateway::ValidationGateway;
use crate::scanner::{lock, ScanSessionManager, ScanSubscription, ScanTarget};
use crate::types::{
    normalize_rut, non_blank, GuardSession, GuardStatistics, InventoryBox, Worker,
};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ============================================================================
// Steps and options
// ============================================================================

/// Position in the delivery flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStep {
    Idle,
    ScanningWorker,
    ManualWorkerEntry,
    AwaitingBox,
    ScanningBox,
    ManualBoxEntry,
    Confirming,
    Success,
}

impl DeliveryStep {
    pub fn is_worker_entry(self) -> bool {
        matches!(self, DeliveryStep::ScanningWorker | DeliveryStep::ManualWorkerEntry)
    }

    /// AwaitingBox, ScanningBox or ManualBoxEntry.
    pub fn is_box_step(self) -> bool {
        matches!(
            self,
            DeliveryStep::AwaitingBox | DeliveryStep::ScanningBox | DeliveryStep::ManualBoxEntry
        )
    }

    /// Target scanned in this step, if it is a scanning step.
    pub fn scan_target(self) -> Option<ScanTarget> {
        match self {
            DeliveryStep::ScanningWorker => Some(ScanTarget::Worker),
            DeliveryStep::ScanningBox => Some(ScanTarget::Box),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeliveryStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStep::Idle => write!(f, "Idle"),
            DeliveryStep::ScanningWorker => write!(f, "Scanning Worker"),
            DeliveryStep::ManualWorkerEntry => write!(f, "Manual Worker Entry"),
            DeliveryStep::AwaitingBox => write!(f, "Awaiting Box"),
            DeliveryStep::ScanningBox => write!(f, "Scanning Box"),
            DeliveryStep::ManualBoxEntry => write!(f, "Manual Box Entry"),
            DeliveryStep::Confirming => write!(f, "Confirming"),
            DeliveryStep::Success => write!(f, "Success"),
        }
    }
}

/// How an identifier is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMode {
    Scan,
    Manual,
}

/// Optional dashboard features.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DashboardCapabilities {
    pub show_statistics: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryOptions {
    /// How long Success stays up before resetting to Idle
    pub success_reset_delay: Duration,
    pub capabilities: DashboardCapabilities,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        (&DeliveryConfig::default()).into()
    }
}

impl From<&DeliveryConfig> for DeliveryOptions {
    fn from(config: &DeliveryConfig) -> Self {
        Self {
            success_reset_delay: Duration::from_millis(config.success_reset_ms),
            capabilities: DashboardCapabilities {
                show_statistics: config.show_statistics,
            },
        }
    }
}

/// Read-only view for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliverySnapshot {
    pub step: DeliveryStep,
    pub guard: String,
    pub worker: Option<Worker>,
    #[serde(rename = "box")]
    pub inventory_box: Option<InventoryBox>,
    pub contract_warning: Option<ContractTypeWarning>,
    pub last_error: Option<WorkflowError>,
    pub loading: bool,
    pub scanning: bool,
    pub statistics: Option<GuardStatistics>,
    pub capabilities: DashboardCapabilities,
}

// ============================================================================
// State
// ============================================================================

struct DeliveryState {
    step: DeliveryStep,
    worker: Option<Worker>,
    inventory_box: Option<InventoryBox>,
    contract_warning: Option<ContractTypeWarning>,
    last_error: Option<WorkflowError>,
    loading: bool,
    statistics: Option<GuardStatistics>,
    /// Bumped by reset; results tagged with an older value are dropped
    generation: u64,
    /// Session started by this orchestrator, not yet awaited
    pending_scan: Option<ScanSubscription>,
    /// Id of the session started by this orchestrator, while it may be active
    scan_id: Option<u64>,
    auto_reset: Option<CancellationToken>,
}

impl DeliveryState {
    fn new() -> Self {
        Self {
            step: DeliveryStep::Idle,
            worker: None,
            inventory_box: None,
            contract_warning: None,
            last_error: None,
            loading: false,
            statistics: None,
            generation: 0,
            pending_scan: None,
            scan_id: None,
            auto_reset: None,
        }
    }
}

struct Inner {
    gateway: Arc<dyn ValidationGateway>,
    scanner: Arc<ScanSessionManager>,
    session: GuardSession,
    options: DeliveryOptions,
    state: Mutex<DeliveryState>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, DeliveryState> {
        lock(&self.state)
    }

    /// Stop the scan session this orchestrator started, if any.
    fn release_scan(&self, state: &mut DeliveryState) {
        state.pending_scan = None;
        if let Some(id) = state.scan_id.take() {
            self.scanner.stop_session(id);
        }
    }

    fn set_step(&self, state: &mut DeliveryState, step: DeliveryStep) {
        if state.step != step {
            info!(from = %state.step, to = %step, guard = %self.session.username, "Delivery step");
            state.step = step;
        }
    }

    fn record(&self, state: &mut DeliveryState, err: WorkflowError) -> WorkflowError {
        warn!(step = %state.step, error = %err, "Delivery operation failed");
        state.last_error = Some(err.clone());
        err
    }

    fn reset_state(&self, state: &mut DeliveryState) {
        state.generation += 1;
        if let Some(timer) = state.auto_reset.take() {
            timer.cancel();
        }
        self.release_scan(state);
        state.worker = None;
        state.inventory_box = None;
        state.contract_warning = None;
        state.last_error = None;
        state.loading = false;
        self.set_step(state, DeliveryStep::Idle);
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Drives one guard's delivery confirmations.
#[derive(Clone)]
pub struct DeliveryOrchestrator {
    inner: Arc<Inner>,
}

impl DeliveryOrchestrator {
    pub fn new(
        gateway: Arc<dyn ValidationGateway>,
        scanner: Arc<ScanSessionManager>,
        session: GuardSession,
        options: DeliveryOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                gateway,
                scanner,
                session,
                options,
                state: Mutex::new(DeliveryState::new()),
            }),
        }
    }

    pub fn step(&self) -> DeliveryStep {
        self.inner.state().step
    }

    pub fn snapshot(&self) -> DeliverySnapshot {
        let state = self.inner.state();
        DeliverySnapshot {
            step: state.step,
            guard: self.inner.session.display_name.clone(),
            worker: state.worker.clone(),
            inventory_box: state.inventory_box.clone(),
            contract_warning: state.contract_warning,
            last_error: state.last_error.clone(),
            loading: state.loading,
            scanning: state.scan_id.is_some(),
            statistics: state.statistics.clone(),
            capabilities: self.inner.options.capabilities,
        }
    }

    /// Start entering the worker, by camera or by hand.
    pub fn begin_worker_entry(&self, mode: EntryMode) -> Result<DeliveryStep, WorkflowError> {
        let inner = &self.inner;
        let mut state = inner.state();
        if state.step != DeliveryStep::Idle {
            return Err(WorkflowError::invalid("begin worker entry", state.step));
        }
        state.last_error = None;
        match mode {
            EntryMode::Manual => inner.set_step(&mut state, DeliveryStep::ManualWorkerEntry),
            EntryMode::Scan => {
                let subscription = match inner.scanner.start(ScanTarget::Worker) {
                    Ok(s) => s,
                    Err(e) => return Err(inner.record(&mut state, e.into())),
                };
                state.scan_id = Some(subscription.id());
                state.pending_scan = Some(subscription);
                inner.set_step(&mut state, DeliveryStep::ScanningWorker);
            }
        }
        Ok(state.step)
    }

    /// Validate the worker's RUT and move on to the box.
    pub async fn submit_worker_identifier(
        &self,
        raw: &str,
    ) -> Result<Outcome<DeliveryStep>, WorkflowError> {
        let inner = &self.inner;
        let (generation, rut) = {
            let mut state = inner.state();
            if !state.step.is_worker_entry() {
                return Err(WorkflowError::invalid("submit worker", state.step));
            }
            if state.loading {
                return Err(WorkflowError::Busy);
            }
            let Some(rut) = normalize_rut(raw) else {
                let message = if raw.trim().is_empty() {
                    "Enter the worker's RUT"
                } else {
                    "RUT must look like 12345678-9"
                };
                return Err(inner.record(&mut state, WorkflowError::validation(message)));
            };
            state.loading = true;
            state.last_error = None;
            (state.generation, rut)
        };

        debug!(rut = %rut, "Validating worker");
        let result = inner.gateway.validate_worker(&rut).await;

        let mut state = inner.state();
        if state.generation != generation {
            debug!(rut = %rut, "Discarding stale worker validation");
            return Ok(Outcome::Discarded);
        }
        state.loading = false;
        match result {
            Ok(worker) => {
                info!(rut = %worker.rut, branch = %worker.branch, "Worker validated");
                inner.release_scan(&mut state);
                state.worker = Some(worker);
                inner.set_step(&mut state, DeliveryStep::AwaitingBox);
                Ok(Outcome::Applied(state.step))
            }
            Err(e) => Err(inner.record(&mut state, e.into())),
        }
    }

    /// Start entering the box, by camera or by hand. Switching mode stops a
    /// running scan.
    pub fn begin_box_entry(&self, mode: EntryMode) -> Result<DeliveryStep, WorkflowError> {
        let inner = &self.inner;
        let mut state = inner.state();
        if !state.step.is_box_step() {
            return Err(WorkflowError::invalid("begin box entry", state.step));
        }
        if state.loading {
            return Err(WorkflowError::Busy);
        }
        inner.release_scan(&mut state);
        state.last_error = None;
        match mode {
            EntryMode::Manual => inner.set_step(&mut state, DeliveryStep::ManualBoxEntry),
            EntryMode::Scan => {
                let subscription = match inner.scanner.start(ScanTarget::Box) {
                    Ok(s) => s,
                    Err(e) => {
                        inner.set_step(&mut state, DeliveryStep::AwaitingBox);
                        return Err(inner.record(&mut state, e.into()));
                    }
                };
                state.scan_id = Some(subscription.id());
                state.pending_scan = Some(subscription);
                inner.set_step(&mut state, DeliveryStep::ScanningBox);
            }
        }
        Ok(state.step)
    }

    /// Validate the box against the worker's branch and move to confirmation.
    pub async fn submit_box_identifier(
        &self,
        raw: &str,
    ) -> Result<Outcome<DeliveryStep>, WorkflowError> {
        let inner = &self.inner;
        let (generation, code, worker) = {
            let mut state = inner.state();
            if !state.step.is_box_step() {
                return Err(WorkflowError::invalid("submit box", state.step));
            }
            if state.loading {
                return Err(WorkflowError::Busy);
            }
            let Some(worker) = state.worker.clone() else {
                return Err(WorkflowError::invalid("submit box without a worker", state.step));
            };
            let Some(code) = non_blank(raw) else {
                return Err(inner.record(&mut state, WorkflowError::validation("Enter the box code")));
            };
            state.loading = true;
            state.last_error = None;
            (state.generation, code, worker)
        };

        debug!(code = %code, branch = %worker.branch, "Validating box");
        let result = inner.gateway.validate_box(&code, &worker.branch).await;

        let mut state = inner.state();
        if state.generation != generation {
            debug!(code = %code, "Discarding stale box validation");
            return Ok(Outcome::Discarded);
        }
        state.loading = false;
        match result {
            Ok(found) if found.branch != worker.branch => {
                let err = WorkflowError::BranchMismatch {
                    box_branch: found.branch,
                    worker_branch: worker.branch,
                };
                Err(inner.record(&mut state, err))
            }
            Ok(found) => {
                state.contract_warning = (found.contract_type != worker.contract_type).then(|| {
                    ContractTypeWarning {
                        worker: worker.contract_type,
                        box_contract: found.contract_type,
                    }
                });
                if let Some(w) = &state.contract_warning {
                    warn!(code = %found.code, rut = %worker.rut, "{w}");
                }
                info!(code = %found.code, stock = found.available_stock, "Box validated");
                inner.release_scan(&mut state);
                state.inventory_box = Some(found);
                inner.set_step(&mut state, DeliveryStep::Confirming);
                Ok(Outcome::Applied(state.step))
            }
            Err(e) => Err(inner.record(&mut state, e.into())),
        }
    }

    /// Commit the delivery.
    pub async fn confirm(&self) -> Result<Outcome<DeliveryStep>, WorkflowError> {
        let inner = &self.inner;
        let (generation, rut, code) = {
            let mut state = inner.state();
            if state.step != DeliveryStep::Confirming {
                return Err(WorkflowError::invalid("confirm", state.step));
            }
            if state.loading {
                return Err(WorkflowError::Busy);
            }
            let rut = state.worker.as_ref().map(|w| w.rut.clone());
            let code = state.inventory_box.as_ref().map(|b| b.code.clone());
            let (Some(rut), Some(code)) = (rut, code) else {
                return Err(WorkflowError::invalid("confirm without worker and box", state.step));
            };
            state.loading = true;
            state.last_error = None;
            (state.generation, rut, code)
        };

        info!(rut = %rut, code = %code, "Creating delivery");
        let result = inner.gateway.create_delivery(&rut, &code).await;

        {
            let mut state = inner.state();
            if state.generation != generation {
                debug!(rut = %rut, code = %code, "Discarding stale delivery result");
                return Ok(Outcome::Discarded);
            }
            state.loading = false;
            match result {
                Ok(receipt) => {
                    info!(id = ?receipt.id, rut = %rut, code = %code, "Delivery recorded");
                    inner.set_step(&mut state, DeliveryStep::Success);
                    self.schedule_auto_reset(&mut state);
                }
                Err(e) => {
                    let err = WorkflowError::from(e);
                    if err.concerns_box() {
                        state.inventory_box = None;
                        state.contract_warning = None;
                        inner.set_step(&mut state, DeliveryStep::AwaitingBox);
                    }
                    return Err(inner.record(&mut state, err));
                }
            }
        }

        if inner.options.capabilities.show_statistics {
            if let Err(e) = self.refresh_statistics().await {
                debug!(error = %e, "Statistics refresh after delivery failed");
            }
        }
        Ok(Outcome::Applied(DeliveryStep::Success))
    }

    fn schedule_auto_reset(&self, state: &mut DeliveryState) {
        let token = CancellationToken::new();
        if let Some(previous) = state.auto_reset.replace(token.clone()) {
            previous.cancel();
        }
        let generation = state.generation;
        let delay = self.inner.options.success_reset_delay;
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    let Some(inner) = weak.upgrade() else { return };
                    let mut state = inner.state();
                    if state.generation == generation && state.step == DeliveryStep::Success {
                        debug!("Automatic reset after success");
                        inner.reset_state(&mut state);
                    }
                }
            }
        });
    }

    /// Discard everything and return to Idle.
    pub fn reset(&self) {
        let mut state = self.inner.state();
        self.inner.reset_state(&mut state);
    }

    /// Wait for the pending scan to decode and submit the payload.
    ///
    /// Re-arms the camera when the previous session already ended (e.g. a
    /// decoded RUT was rejected).
    pub async fn await_scan(&self) -> Result<Outcome<DeliveryStep>, WorkflowError> {
        let inner = &self.inner;
        let (generation, target, subscription) = {
            let mut state = inner.state();
            let Some(target) = state.step.scan_target() else {
                return Err(WorkflowError::invalid("await scan", state.step));
            };
            let subscription = match state.pending_scan.take() {
                Some(s) => s,
                None => match inner.scanner.start(target) {
                    Ok(s) => {
                        state.scan_id = Some(s.id());
                        s
                    }
                    Err(e) => return Err(inner.record(&mut state, e.into())),
                },
            };
            (state.generation, target, subscription)
        };

        let session = subscription.id();
        let event = subscription.next_decode().await;

        {
            let mut state = inner.state();
            let current = state.generation == generation && state.step.scan_target() == Some(target);
            if current && state.scan_id == Some(session) {
                state.scan_id = None;
            }
            match (&event, current) {
                (None, _) => return Ok(Outcome::ScanStopped),
                (Some(_), false) => {
                    debug!(target = %target, "Decode arrived after the step changed");
                    return Ok(Outcome::Discarded);
                }
                (Some(_), true) => {}
            }
        }

        let Some(event) = event else {
            return Ok(Outcome::ScanStopped);
        };
        info!(target = %event.target, "Scan decoded");
        match event.target {
            ScanTarget::Worker => self.submit_worker_identifier(&event.text).await,
            ScanTarget::Box => self.submit_box_identifier(&event.text).await,
        }
    }

    /// Load the statistics panel.
    ///
    /// Failures are logged and returned, never recorded as `last_error`.
    /// Counters fetched across a reset are returned but not kept.
    pub async fn refresh_statistics(&self) -> Result<GuardStatistics, WorkflowError> {
        let inner = &self.inner;
        if !inner.options.capabilities.show_statistics {
            return Err(WorkflowError::StatisticsDisabled);
        }
        let generation = inner.state().generation;
        match inner.gateway.guard_statistics().await {
            Ok(stats) => {
                let mut state = inner.state();
                if state.generation == generation {
                    debug!(today = stats.deliveries_today, "Statistics refreshed");
                    state.statistics = Some(stats.clone());
                } else {
                    debug!("Statistics arrived after a reset, not kept");
                }
                Ok(stats)
            }
            Err(e) => {
                warn!(error = %e, "Failed to load statistics");
                Err(e.into())
            }
        }
    }
}
