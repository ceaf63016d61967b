//! Incident Workflow Orchestrator
//!
//! ```text
//! Menu ─▶ Create ─ submit ─▶ Submitting ─┬─ ok ──▶ Confirmation ── delay ─▶ Menu
//!           ▲                             └─ err ─▶ Create (form kept)
//! Menu ─▶ History ◀─▶ Detail
//! ```

use super::error::WorkflowError;
use super::Outcome;
use crate::config::IncidentConfig;
use crate::gateway::ValidationGateway;
use crate::scanner::{lock, ScanSessionManager, ScanSubscription, ScanTarget};
use crate::types::{
    non_blank, normalize_rut, GuardSession, Incident, IncidentDraft, IncidentField,
    IncidentFilter, IncidentType,
};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Screen of the incident workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStep {
    Menu,
    Create,
    Submitting,
    Confirmation,
    History,
    Detail,
}

impl std::fmt::Display for IncidentStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncidentStep::Menu => write!(f, "Menu"),
            IncidentStep::Create => write!(f, "Create"),
            IncidentStep::Submitting => write!(f, "Submitting"),
            IncidentStep::Confirmation => write!(f, "Confirmation"),
            IncidentStep::History => write!(f, "History"),
            IncidentStep::Detail => write!(f, "Detail"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncidentOptions {
    /// How long Confirmation stays up before returning to the menu
    pub confirmation_return_delay: Duration,
    /// Largest accepted evidence photo
    pub max_photo_bytes: u64,
}

impl Default for IncidentOptions {
    fn default() -> Self {
        (&IncidentConfig::default()).into()
    }
}

impl From<&IncidentConfig> for IncidentOptions {
    fn from(config: &IncidentConfig) -> Self {
        Self {
            confirmation_return_delay: Duration::from_millis(config.confirmation_return_ms),
            max_photo_bytes: config.max_photo_bytes,
        }
    }
}

/// Read-only view for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncidentSnapshot {
    pub step: IncidentStep,
    pub draft: IncidentDraft,
    pub catalog: Vec<IncidentType>,
    pub incidents: Vec<Incident>,
    pub selected: Option<Incident>,
    /// Most recently created incident, shown on the confirmation screen
    pub last_created: Option<Incident>,
    pub last_error: Option<WorkflowError>,
    pub loading: bool,
    pub scanning: Option<ScanTarget>,
}

struct IncidentState {
    step: IncidentStep,
    draft: IncidentDraft,
    catalog: Vec<IncidentType>,
    incidents: Vec<Incident>,
    selected: Option<Incident>,
    last_created: Option<Incident>,
    last_error: Option<WorkflowError>,
    loading: bool,
    generation: u64,
    pending_scan: Option<ScanSubscription>,
    scan: Option<(u64, ScanTarget)>,
    auto_return: Option<CancellationToken>,
}

struct Inner {
    gateway: Arc<dyn ValidationGateway>,
    scanner: Arc<ScanSessionManager>,
    session: GuardSession,
    options: IncidentOptions,
    state: Mutex<IncidentState>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, IncidentState> {
        lock(&self.state)
    }

    fn release_scan(&self, state: &mut IncidentState) {
        state.pending_scan = None;
        if let Some((id, _)) = state.scan.take() {
            self.scanner.stop_session(id);
        }
    }

    fn set_step(&self, state: &mut IncidentState, step: IncidentStep) {
        if state.step != step {
            info!(from = %state.step, to = %step, guard = %self.session.username, "Incident step");
            if state.step == IncidentStep::Create {
                self.release_scan(state);
            }
            if let Some(timer) = state.auto_return.take() {
                timer.cancel();
            }
            state.step = step;
        }
    }

    fn record(&self, state: &mut IncidentState, err: WorkflowError) -> WorkflowError {
        warn!(step = %state.step, error = %err, "Incident operation failed");
        state.last_error = Some(err.clone());
        err
    }
}

/// Drives incident reporting and history browsing.
#[derive(Clone)]
pub struct IncidentOrchestrator {
    inner: Arc<Inner>,
}

impl IncidentOrchestrator {
    pub fn new(
        gateway: Arc<dyn ValidationGateway>,
        scanner: Arc<ScanSessionManager>,
        session: GuardSession,
        options: IncidentOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                gateway,
                scanner,
                session,
                options,
                state: Mutex::new(IncidentState {
                    step: IncidentStep::Menu,
                    draft: IncidentDraft::default(),
                    catalog: Vec::new(),
                    incidents: Vec::new(),
                    selected: None,
                    last_created: None,
                    last_error: None,
                    loading: false,
                    generation: 0,
                    pending_scan: None,
                    scan: None,
                    auto_return: None,
                }),
            }),
        }
    }

    pub fn step(&self) -> IncidentStep {
        self.inner.state().step
    }

    pub fn snapshot(&self) -> IncidentSnapshot {
        let state = self.inner.state();
        IncidentSnapshot {
            step: state.step,
            draft: state.draft.clone(),
            catalog: state.catalog.clone(),
            incidents: state.incidents.clone(),
            selected: state.selected.clone(),
            last_created: state.last_created.clone(),
            last_error: state.last_error.clone(),
            loading: state.loading,
            scanning: state.scan.map(|(_, target)| target),
        }
    }

    /// Open the create form, loading the type catalog on first use.
    pub async fn open_create(&self) -> Result<Outcome<IncidentStep>, WorkflowError> {
        let inner = &self.inner;
        let generation = {
            let mut state = inner.state();
            if state.step != IncidentStep::Menu {
                return Err(WorkflowError::invalid("open incident form", state.step));
            }
            if state.loading {
                return Err(WorkflowError::Busy);
            }
            state.last_error = None;
            inner.set_step(&mut state, IncidentStep::Create);
            if !state.catalog.is_empty() {
                return Ok(Outcome::Applied(state.step));
            }
            state.loading = true;
            state.generation
        };

        let result = inner.gateway.list_incident_types().await;

        let mut state = inner.state();
        if state.generation != generation {
            return Ok(Outcome::Discarded);
        }
        state.loading = false;
        match result {
            Ok(catalog) => {
                debug!(types = catalog.len(), "Incident types loaded");
                state.catalog = catalog;
            }
            Err(e) => warn!(error = %e, "Failed to load incident types"),
        }
        Ok(Outcome::Applied(state.step))
    }

    /// Edit one field of the create form.
    pub fn update_field(&self, field: IncidentField) -> Result<(), WorkflowError> {
        let inner = &self.inner;
        let mut state = inner.state();
        if state.step != IncidentStep::Create {
            return Err(WorkflowError::invalid("edit incident form", state.step));
        }
        match field {
            IncidentField::Type(value) => {
                let value = value.trim().to_string();
                if !state.catalog.is_empty() && !state.catalog.iter().any(|t| t.value == value) {
                    let err = WorkflowError::validation(format!("Unknown incident type '{value}'"));
                    return Err(inner.record(&mut state, err));
                }
                state.draft.incident_type = non_blank(&value);
            }
            IncidentField::WorkerRut(raw) => {
                state.draft.worker_rut = normalize_rut(&raw).or_else(|| non_blank(&raw));
            }
            IncidentField::BoxCode(raw) => state.draft.box_code = non_blank(&raw),
            IncidentField::Description(text) => state.draft.description = text,
            IncidentField::Photo(photo) => {
                let size = photo.size() as u64;
                if size > inner.options.max_photo_bytes {
                    let err = WorkflowError::validation(format!(
                        "Photo is {size} bytes; the limit is {} bytes",
                        inner.options.max_photo_bytes
                    ));
                    return Err(inner.record(&mut state, err));
                }
                debug!(file = %photo.file_name, size, "Photo attached");
                state.draft.photo = Some(photo);
            }
            IncidentField::ClearPhoto => state.draft.photo = None,
        }
        state.last_error = None;
        Ok(())
    }

    /// Submit the create form.
    pub async fn submit(&self) -> Result<Outcome<IncidentStep>, WorkflowError> {
        let inner = &self.inner;
        let (generation, draft) = {
            let mut state = inner.state();
            if state.step != IncidentStep::Create {
                return Err(WorkflowError::invalid("submit incident", state.step));
            }
            if state.loading {
                return Err(WorkflowError::Busy);
            }
            if state.draft.incident_type.is_none() {
                let err = WorkflowError::validation("Select the incident type");
                return Err(inner.record(&mut state, err));
            }
            if state.draft.description.trim().is_empty() {
                let err = WorkflowError::validation("Describe the problem");
                return Err(inner.record(&mut state, err));
            }
            state.loading = true;
            state.last_error = None;
            inner.set_step(&mut state, IncidentStep::Submitting);
            (state.generation, state.draft.clone())
        };

        info!(kind = ?draft.incident_type, photo = draft.photo.is_some(), "Reporting incident");
        let result = inner.gateway.create_incident(&draft).await;

        let mut state = inner.state();
        if state.generation != generation {
            debug!("Discarding stale incident result");
            return Ok(Outcome::Discarded);
        }
        state.loading = false;
        match result {
            Ok(incident) => {
                info!(id = incident.id, "Incident reported");
                state.draft = IncidentDraft::default();
                state.last_created = Some(incident);
                inner.set_step(&mut state, IncidentStep::Confirmation);
                self.schedule_return(&mut state);
                Ok(Outcome::Applied(state.step))
            }
            Err(e) => {
                inner.set_step(&mut state, IncidentStep::Create);
                Err(inner.record(&mut state, e.into()))
            }
        }
    }

    fn schedule_return(&self, state: &mut IncidentState) {
        let token = CancellationToken::new();
        state.auto_return = Some(token.clone());
        let generation = state.generation;
        let delay = self.inner.options.confirmation_return_delay;
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    let Some(inner) = weak.upgrade() else { return };
                    let mut state = inner.state();
                    if state.generation == generation && state.step == IncidentStep::Confirmation {
                        debug!("Returning to menu after confirmation");
                        inner.set_step(&mut state, IncidentStep::Menu);
                    }
                }
            }
        });
    }

    /// Fetch the guard's incidents and show the history list.
    pub async fn open_history(&self) -> Result<Outcome<IncidentStep>, WorkflowError> {
        self.open_history_filtered(None).await
    }

    /// Like [`open_history`](Self::open_history), restricted by `filter`.
    pub async fn open_history_filtered(
        &self,
        filter: Option<IncidentFilter>,
    ) -> Result<Outcome<IncidentStep>, WorkflowError> {
        let inner = &self.inner;
        let generation = {
            let mut state = inner.state();
            if !matches!(
                state.step,
                IncidentStep::Menu | IncidentStep::Detail | IncidentStep::History
            ) {
                return Err(WorkflowError::invalid("open history", state.step));
            }
            if state.loading {
                return Err(WorkflowError::Busy);
            }
            state.loading = true;
            state.last_error = None;
            state.selected = None;
            inner.set_step(&mut state, IncidentStep::History);
            state.generation
        };

        let result = inner.gateway.list_incidents(filter).await;

        let mut state = inner.state();
        if state.generation != generation {
            return Ok(Outcome::Discarded);
        }
        state.loading = false;
        match result {
            Ok(incidents) => {
                debug!(count = incidents.len(), "Incident history loaded");
                state.incidents = incidents;
                Ok(Outcome::Applied(state.step))
            }
            Err(e) => {
                state.incidents.clear();
                Err(inner.record(&mut state, e.into()))
            }
        }
    }

    /// Show one incident from the fetched history.
    pub fn open_detail(&self, id: u64) -> Result<IncidentStep, WorkflowError> {
        let inner = &self.inner;
        let mut state = inner.state();
        if state.step != IncidentStep::History {
            return Err(WorkflowError::invalid("open incident detail", state.step));
        }
        let Some(found) = state.incidents.iter().find(|i| i.id == id).cloned() else {
            let err = WorkflowError::NotFound {
                message: format!("Incident #{id} is not in the list"),
            };
            return Err(inner.record(&mut state, err));
        };
        state.selected = Some(found);
        state.last_error = None;
        inner.set_step(&mut state, IncidentStep::Detail);
        Ok(state.step)
    }

    /// Go up one screen.
    pub fn back(&self) -> Result<IncidentStep, WorkflowError> {
        let inner = &self.inner;
        let mut state = inner.state();
        let target = match state.step {
            IncidentStep::Detail => IncidentStep::History,
            IncidentStep::Create | IncidentStep::History | IncidentStep::Confirmation => {
                IncidentStep::Menu
            }
            IncidentStep::Submitting => return Err(WorkflowError::Busy),
            IncidentStep::Menu => return Err(WorkflowError::invalid("go back", state.step)),
        };
        if target == IncidentStep::History {
            state.selected = None;
        }
        if state.loading {
            // The catalog or history fetch lands on a screen that is gone.
            state.generation += 1;
            state.loading = false;
        }
        state.last_error = None;
        inner.set_step(&mut state, target);
        Ok(state.step)
    }

    /// Start a scan that fills the worker RUT or box code of the form.
    pub fn begin_scan_prefill(&self, target: ScanTarget) -> Result<(), WorkflowError> {
        let inner = &self.inner;
        let mut state = inner.state();
        if state.step != IncidentStep::Create {
            return Err(WorkflowError::invalid("scan into incident form", state.step));
        }
        inner.release_scan(&mut state);
        match inner.scanner.start(target) {
            Ok(subscription) => {
                state.scan = Some((subscription.id(), target));
                state.pending_scan = Some(subscription);
                Ok(())
            }
            Err(e) => Err(inner.record(&mut state, e.into())),
        }
    }

    /// Wait for the prefill scan and write the decoded text into the form.
    pub async fn await_scan(&self) -> Result<Outcome<IncidentStep>, WorkflowError> {
        let inner = &self.inner;
        let (generation, subscription) = {
            let mut state = inner.state();
            if state.step != IncidentStep::Create {
                return Err(WorkflowError::invalid("await scan", state.step));
            }
            let Some(subscription) = state.pending_scan.take() else {
                return Err(WorkflowError::invalid("await scan without a scan", state.step));
            };
            (state.generation, subscription)
        };

        let session = subscription.id();
        let event = subscription.next_decode().await;

        let mut state = inner.state();
        if state.scan.is_some_and(|(id, _)| id == session) {
            state.scan = None;
        }
        let Some(event) = event else {
            return Ok(Outcome::ScanStopped);
        };
        if state.generation != generation || state.step != IncidentStep::Create {
            return Ok(Outcome::Discarded);
        }
        match event.target {
            ScanTarget::Worker => {
                state.draft.worker_rut =
                    normalize_rut(&event.text).or_else(|| non_blank(&event.text));
            }
            ScanTarget::Box => state.draft.box_code = non_blank(&event.text),
        }
        info!(target = %event.target, "Incident form prefilled from scan");
        Ok(Outcome::Applied(state.step))
    }

    /// Back to the menu with an empty form. In-flight results are dropped.
    pub fn reset(&self) {
        let inner = &self.inner;
        let mut state = inner.state();
        state.generation += 1;
        inner.release_scan(&mut state);
        state.draft = IncidentDraft::default();
        state.selected = None;
        state.last_error = None;
        state.loading = false;
        inner.set_step(&mut state, IncidentStep::Menu);
    }
}
