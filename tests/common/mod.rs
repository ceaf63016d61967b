//! Shared fixtures: an in-memory gateway with call recording and a
//! controllable gate, plus a harness wiring both orchestrators to a
//! channel camera.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use guardpost::{
    ChannelDevice, ContractType, DeliveryOptions, DeliveryOrchestrator, DeliveryReceipt,
    GatewayError, GuardSession, GuardStatistics, Incident, IncidentDraft, IncidentFilter,
    IncidentOptions, IncidentOrchestrator, IncidentStatus, IncidentType, InventoryBox,
    ScanSessionManager, ValidationGateway, Worker,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ValidateWorker(String),
    ValidateBox { code: String, branch: String },
    CreateDelivery { rut: String, code: String },
    CreateIncident(IncidentDraft),
    ListIncidents(Option<IncidentFilter>),
    ListIncidentTypes,
    GuardStatistics,
}

#[derive(Default)]
pub struct FakeGateway {
    workers: Mutex<HashMap<String, Worker>>,
    boxes: Mutex<HashMap<String, InventoryBox>>,
    incidents: Mutex<Vec<Incident>>,
    types: Mutex<Vec<IncidentType>>,
    calls: Mutex<Vec<Call>>,
    delivery_errors: Mutex<Vec<GatewayError>>,
    incident_error: Mutex<Option<GatewayError>>,
    list_error: Mutex<Option<GatewayError>>,
    types_error: Mutex<Option<GatewayError>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

pub fn worker(rut: &str, name: &str, branch: &str, contract_type: ContractType) -> Worker {
    Worker {
        rut: rut.to_string(),
        name: name.to_string(),
        branch: branch.to_string(),
        contract_type,
    }
}

pub fn inventory_box(code: &str, branch: &str, contract_type: ContractType, stock: u32) -> InventoryBox {
    InventoryBox {
        code: code.to_string(),
        branch: branch.to_string(),
        contract_type,
        available_stock: stock,
    }
}

pub fn incident(id: u64, kind: &str, status: IncidentStatus) -> Incident {
    Incident {
        id,
        incident_type: kind.to_string(),
        type_label: None,
        description: format!("incident {id}"),
        status,
        priority: None,
        reported_at: Some(Utc::now()),
        resolution: None,
        worker_rut: None,
        box_code: None,
        evidence_url: None,
    }
}

impl FakeGateway {
    /// Gateway seeded with the branch scenarios used across tests.
    pub fn seeded() -> Self {
        let gateway = Self::default();
        gateway.add_worker(worker("12345678-9", "Juan Pérez", "casablanca", ContractType::Indefinido));
        gateway.add_worker(worker("11111111-1", "Ana Rojas", "valparaiso_bif", ContractType::PlazoFijo));
        gateway.add_box(inventory_box("CAJA-IND-001", "casablanca", ContractType::Indefinido, 10));
        gateway.add_box(inventory_box("CAJA-PF-001", "casablanca", ContractType::PlazoFijo, 5));
        gateway.add_box(inventory_box("CAJA-BIF-001", "valparaiso_bif", ContractType::Indefinido, 3));
        *gateway.types.lock().unwrap() = vec![
            IncidentType { value: "caja_danada".into(), label: "Caja dañada".into() },
            IncidentType { value: "qr_no_funciona".into(), label: "QR no funciona".into() },
            IncidentType { value: "otro".into(), label: "Otro".into() },
        ];
        *gateway.incidents.lock().unwrap() = vec![
            incident(2, "caja_danada", IncidentStatus::EnProceso),
            incident(1, "qr_no_funciona", IncidentStatus::Resuelto),
        ];
        gateway
    }

    pub fn add_worker(&self, w: Worker) {
        self.workers.lock().unwrap().insert(w.rut.clone(), w);
    }

    pub fn add_box(&self, b: InventoryBox) {
        self.boxes.lock().unwrap().insert(b.code.clone(), b);
    }

    /// Queue errors returned by the next create_delivery calls, in order.
    pub fn fail_deliveries(&self, errors: Vec<GatewayError>) {
        *self.delivery_errors.lock().unwrap() = errors;
    }

    pub fn fail_incident(&self, err: GatewayError) {
        *self.incident_error.lock().unwrap() = Some(err);
    }

    pub fn fail_list(&self, err: GatewayError) {
        *self.list_error.lock().unwrap() = Some(err);
    }

    pub fn fail_types(&self, err: GatewayError) {
        *self.types_error.lock().unwrap() = Some(err);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn delivery_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::CreateDelivery { .. }))
            .collect()
    }

    /// Make every call wait for [`release`](Self::release).
    pub fn hold(&self) {
        *self.gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let `n` held calls complete.
    pub fn release(&self, n: usize) {
        if let Some(gate) = self.gate.lock().unwrap().as_ref() {
            gate.add_permits(n);
        }
    }

    /// Yield until at least `n` calls have been recorded.
    pub async fn wait_for_calls(&self, n: usize) {
        for _ in 0..10_000 {
            if self.calls.lock().unwrap().len() >= n {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {n} gateway calls, saw {:?}", self.calls());
    }

    async fn enter(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.expect("gate closed").forget();
        }
    }
}

#[async_trait]
impl ValidationGateway for FakeGateway {
    async fn validate_worker(&self, rut: &str) -> Result<Worker, GatewayError> {
        self.enter(Call::ValidateWorker(rut.to_string())).await;
        self.workers
            .lock()
            .unwrap()
            .get(rut)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound("Trabajador no encontrado".into()))
    }

    async fn validate_box(&self, code: &str, branch: &str) -> Result<InventoryBox, GatewayError> {
        self.enter(Call::ValidateBox {
            code: code.to_string(),
            branch: branch.to_string(),
        })
        .await;
        let found = self
            .boxes
            .lock()
            .unwrap()
            .get(code)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound("Caja no encontrada".into()))?;
        if found.branch != branch {
            return Err(GatewayError::BranchMismatch {
                box_branch: found.branch,
                worker_branch: branch.to_string(),
            });
        }
        Ok(found)
    }

    async fn create_delivery(
        &self,
        worker_rut: &str,
        box_code: &str,
    ) -> Result<DeliveryReceipt, GatewayError> {
        self.enter(Call::CreateDelivery {
            rut: worker_rut.to_string(),
            code: box_code.to_string(),
        })
        .await;
        {
            let mut errors = self.delivery_errors.lock().unwrap();
            if !errors.is_empty() {
                return Err(errors.remove(0));
            }
        }
        Ok(DeliveryReceipt {
            id: Some(self.delivery_calls().len() as u64),
            worker_rut: worker_rut.to_string(),
            box_code: box_code.to_string(),
            delivered_at: Some(Utc::now()),
        })
    }

    async fn create_incident(&self, draft: &IncidentDraft) -> Result<Incident, GatewayError> {
        self.enter(Call::CreateIncident(draft.clone())).await;
        if let Some(err) = self.incident_error.lock().unwrap().take() {
            return Err(err);
        }
        let mut incidents = self.incidents.lock().unwrap();
        let mut created = incident(
            incidents.len() as u64 + 1,
            draft.incident_type.as_deref().unwrap_or("otro"),
            IncidentStatus::Pendiente,
        );
        created.description = draft.description.clone();
        created.worker_rut = draft.worker_rut.clone();
        created.box_code = draft.box_code.clone();
        incidents.insert(0, created.clone());
        Ok(created)
    }

    async fn list_incidents(
        &self,
        filter: Option<IncidentFilter>,
    ) -> Result<Vec<Incident>, GatewayError> {
        self.enter(Call::ListIncidents(filter)).await;
        if let Some(err) = self.list_error.lock().unwrap().take() {
            return Err(err);
        }
        let status = filter.and_then(|f| f.status);
        Ok(self
            .incidents
            .lock()
            .unwrap()
            .iter()
            .filter(|i| status.map_or(true, |s| i.status == s))
            .cloned()
            .collect())
    }

    async fn list_incident_types(&self) -> Result<Vec<IncidentType>, GatewayError> {
        self.enter(Call::ListIncidentTypes).await;
        if let Some(err) = self.types_error.lock().unwrap().take() {
            return Err(err);
        }
        Ok(self.types.lock().unwrap().clone())
    }

    async fn guard_statistics(&self) -> Result<GuardStatistics, GatewayError> {
        self.enter(Call::GuardStatistics).await;
        Ok(GuardStatistics {
            deliveries_today: self.delivery_calls().len() as u64,
            deliveries_this_week: 12,
            deliveries_this_month: 40,
            available_stock: 18,
            pending_incidents: 1,
        })
    }
}

/// Both orchestrators over one fake gateway and one channel camera.
pub struct Harness {
    pub gateway: Arc<FakeGateway>,
    pub camera: Arc<ChannelDevice>,
    pub scanner: Arc<ScanSessionManager>,
    pub delivery: DeliveryOrchestrator,
    pub incident: IncidentOrchestrator,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(DeliveryOptions::default(), IncidentOptions::default())
    }

    pub fn with_options(delivery: DeliveryOptions, incident: IncidentOptions) -> Self {
        let gateway = Arc::new(FakeGateway::seeded());
        let camera = Arc::new(ChannelDevice::new(8));
        let scanner = Arc::new(ScanSessionManager::new(camera.clone()));
        let session = GuardSession::new("guardia1", "Pedro Soto", "token");
        let shared: Arc<dyn ValidationGateway> = gateway.clone();
        Self {
            delivery: DeliveryOrchestrator::new(shared.clone(), scanner.clone(), session.clone(), delivery),
            incident: IncidentOrchestrator::new(shared, scanner.clone(), session, incident),
            gateway,
            camera,
            scanner,
        }
    }
}
