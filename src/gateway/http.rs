//! HTTP Gateway: reqwest client for the backend REST API
//!
//! Maps the backend's JSON shapes onto the crate's types and its status codes
//! onto [`GatewayError`]:
//!
//! | Status                 | Error                                      |
//! |------------------------|--------------------------------------------|
//! | 404                    | `NotFound`                                 |
//! | 400 with `caja_sucursal` | `BranchMismatch`                         |
//! | 400 / 422              | `Validation` (with per-field messages)     |
//! | anything else          | `Network`                                  |

use super::{GatewayError, ValidationGateway};
use crate::config::GatewayConfig;
use crate::types::{
    non_blank, ContractType, DeliveryReceipt, GuardSession, GuardStatistics, Incident,
    IncidentDraft, IncidentFilter, IncidentPriority, IncidentStatus, IncidentType, InventoryBox,
    Worker,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::Network(e.to_string())
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct WireWorker {
    rut: String,
    nombre: Option<String>,
    nombre_completo: Option<String>,
    sucursal: Option<String>,
    sede: Option<String>,
    tipo_contrato: ContractType,
}

impl TryFrom<WireWorker> for Worker {
    type Error = GatewayError;

    fn try_from(w: WireWorker) -> Result<Self, Self::Error> {
        let branch = w
            .sucursal
            .or(w.sede)
            .ok_or_else(|| GatewayError::Network("worker response has no branch".to_string()))?;
        Ok(Worker {
            name: w.nombre_completo.or(w.nombre).unwrap_or_else(|| w.rut.clone()),
            rut: w.rut,
            branch,
            contract_type: w.tipo_contrato,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireBox {
    codigo: String,
    sucursal: Option<String>,
    sede: Option<String>,
    tipo_contrato: ContractType,
    #[serde(default)]
    cantidad_disponible: i64,
}

impl TryFrom<WireBox> for InventoryBox {
    type Error = GatewayError;

    fn try_from(b: WireBox) -> Result<Self, Self::Error> {
        let branch = b
            .sucursal
            .or(b.sede)
            .ok_or_else(|| GatewayError::Network("box response has no branch".to_string()))?;
        Ok(InventoryBox {
            code: b.codigo,
            branch,
            contract_type: b.tipo_contrato,
            available_stock: u32::try_from(b.cantidad_disponible.max(0)).unwrap_or(u32::MAX),
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireDelivery {
    id: Option<u64>,
    fecha_entrega: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireWorkerRef {
    rut: String,
}

#[derive(Debug, Deserialize)]
struct WireBoxRef {
    codigo: String,
}

#[derive(Debug, Deserialize)]
struct WireIncident {
    id: u64,
    tipo: String,
    tipo_display: Option<String>,
    #[serde(default)]
    descripcion: String,
    estado: IncidentStatus,
    prioridad: Option<IncidentPriority>,
    fecha_reporte: Option<String>,
    solucion: Option<String>,
    rut_trabajador: Option<String>,
    trabajador_detalle: Option<WireWorkerRef>,
    codigo_caja: Option<String>,
    caja_detalle: Option<WireBoxRef>,
    imagen_evidencia: Option<String>,
}

impl From<WireIncident> for Incident {
    fn from(i: WireIncident) -> Self {
        Incident {
            id: i.id,
            incident_type: i.tipo,
            type_label: i.tipo_display,
            description: i.descripcion,
            status: i.estado,
            priority: i.prioridad,
            reported_at: i.fecha_reporte.as_deref().and_then(parse_timestamp),
            resolution: i.solucion.as_deref().and_then(non_blank),
            worker_rut: i
                .trabajador_detalle
                .map(|t| t.rut)
                .or(i.rut_trabajador)
                .as_deref()
                .and_then(non_blank),
            box_code: i
                .caja_detalle
                .map(|c| c.codigo)
                .or(i.codigo_caja)
                .as_deref()
                .and_then(non_blank),
            evidence_url: i.imagen_evidencia.as_deref().and_then(non_blank),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireCreatedIncident {
    incidencia: WireIncident,
}

#[derive(Debug, Deserialize)]
struct WireIncidentType {
    #[serde(alias = "codigo")]
    value: String,
    #[serde(alias = "nombre")]
    label: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireStatistics {
    entregas_hoy: u64,
    entregas_semana: u64,
    /// Not sent by every backend version; stays 0 when absent.
    entregas_mes: u64,
    #[serde(alias = "stock_disponible")]
    stock_total: u64,
    incidencias_pendientes: u64,
}

impl From<WireStatistics> for GuardStatistics {
    fn from(s: WireStatistics) -> Self {
        GuardStatistics {
            deliveries_today: s.entregas_hoy,
            deliveries_this_week: s.entregas_semana,
            deliveries_this_month: s.entregas_mes,
            available_stock: s.stock_total,
            pending_incidents: s.incidencias_pendientes,
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ============================================================================
// Error mapping
// ============================================================================

/// Top-level message of an error body (`error`, then `detail`).
fn error_message(body: &Value) -> Option<String> {
    ["error", "detail", "message"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Per-field messages from a serializer error body.
fn field_errors(body: &Value) -> BTreeMap<String, Vec<String>> {
    let mut fields = BTreeMap::new();
    let Some(map) = body.as_object() else {
        return fields;
    };
    for (key, value) in map {
        if matches!(key.as_str(), "error" | "detail" | "message") {
            continue;
        }
        let messages: Vec<String> = match value {
            Value::String(s) => vec![s.clone()],
            Value::Array(items) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => continue,
        };
        if !messages.is_empty() {
            fields.insert(key.clone(), messages);
        }
    }
    fields
}

/// Map a non-success response onto a [`GatewayError`].
fn map_failure(status: StatusCode, body: &Value, fallback: &str) -> GatewayError {
    let message = error_message(body).unwrap_or_else(|| fallback.to_string());
    match status {
        StatusCode::NOT_FOUND => GatewayError::NotFound(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            if let Some(box_branch) = body.get("caja_sucursal").and_then(Value::as_str) {
                let worker_branch = body
                    .get("trabajador_sucursal")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                return GatewayError::BranchMismatch {
                    box_branch: box_branch.to_string(),
                    worker_branch: worker_branch.to_string(),
                };
            }
            let fields = field_errors(body);
            let message = if error_message(body).is_none() {
                fields
                    .values()
                    .flatten()
                    .next()
                    .cloned()
                    .unwrap_or(message)
            } else {
                message
            };
            GatewayError::Validation { message, fields }
        }
        status => GatewayError::Network(format!("server returned {status}: {message}")),
    }
}

// ============================================================================
// Client
// ============================================================================

/// [`ValidationGateway`] backed by the REST API.
#[derive(Clone)]
pub struct HttpGateway {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl HttpGateway {
    /// Build a client for `config.base_url`, authenticating as `session`.
    pub fn new(config: &GatewayConfig, session: &GuardSession) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: session.access_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.access_token.is_empty() {
            req
        } else {
            req.bearer_auth(&self.access_token)
        }
    }

    /// Send `req` and decode a 2xx body as `T`; map anything else to an error.
    async fn execute<T: serde::de::DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
        fallback: &str,
    ) -> Result<T, GatewayError> {
        let resp = self.authorized(req).send().await?;
        let status = resp.status();

        if status.is_success() {
            return resp
                .json::<T>()
                .await
                .map_err(|e| GatewayError::Network(format!("malformed response: {e}")));
        }

        let body = resp.json::<Value>().await.unwrap_or(Value::Null);
        let err = map_failure(status, &body, fallback);
        debug!(%status, error = %err, "Backend rejected request");
        Err(err)
    }
}

#[async_trait]
impl ValidationGateway for HttpGateway {
    async fn validate_worker(&self, rut: &str) -> Result<Worker, GatewayError> {
        let req = self
            .http
            .post(self.url("entregas/validar_trabajador/"))
            .json(&json!({ "rut": rut }));
        let wire: WireWorker = self.execute(req, "Worker not found").await?;
        Worker::try_from(wire)
    }

    async fn validate_box(&self, code: &str, branch: &str) -> Result<InventoryBox, GatewayError> {
        let req = self
            .http
            .post(self.url("entregas/validar_caja/"))
            .json(&json!({ "codigo": code, "sucursal": branch }));
        let wire: WireBox = self.execute(req, "Box not found").await?;
        InventoryBox::try_from(wire)
    }

    async fn create_delivery(
        &self,
        worker_rut: &str,
        box_code: &str,
    ) -> Result<DeliveryReceipt, GatewayError> {
        let req = self
            .http
            .post(self.url("entregas/crear_entrega_completa/"))
            .json(&json!({ "trabajador_rut": worker_rut, "caja_codigo": box_code }));
        let wire: WireDelivery = self.execute(req, "Delivery rejected").await?;
        Ok(DeliveryReceipt {
            id: wire.id,
            worker_rut: worker_rut.to_string(),
            box_code: box_code.to_string(),
            delivered_at: wire.fecha_entrega.as_deref().and_then(parse_timestamp),
        })
    }

    async fn create_incident(&self, draft: &IncidentDraft) -> Result<Incident, GatewayError> {
        let incident_type = draft
            .incident_type
            .clone()
            .ok_or_else(|| GatewayError::validation("Incident type is required"))?;

        let mut form = reqwest::multipart::Form::new()
            .text("tipo", incident_type)
            .text("descripcion", draft.description.trim().to_string());
        if let Some(rut) = draft.worker_rut.as_deref().and_then(non_blank) {
            form = form.text("rut_trabajador", rut);
        }
        if let Some(code) = draft.box_code.as_deref().and_then(non_blank) {
            form = form.text("codigo_caja", code);
        }
        if let Some(photo) = &draft.photo {
            let part = reqwest::multipart::Part::bytes(photo.bytes.clone())
                .file_name(photo.file_name.clone())
                .mime_str(&photo.content_type)?;
            form = form.part("imagen", part);
        }

        let req = self
            .http
            .post(self.url("incidencias/crear_incidencia/"))
            .multipart(form);
        let wire: WireCreatedIncident = self.execute(req, "Incident rejected").await?;
        Ok(wire.incidencia.into())
    }

    async fn list_incidents(
        &self,
        filter: Option<IncidentFilter>,
    ) -> Result<Vec<Incident>, GatewayError> {
        let mut req = self.http.get(self.url("incidencias/mis_incidencias/"));
        if let Some(status) = filter.and_then(|f| f.status) {
            req = req.query(&[("estado", status.as_str())]);
        }
        let wire: Vec<WireIncident> = self.execute(req, "Could not list incidents").await?;
        Ok(wire.into_iter().map(Incident::from).collect())
    }

    async fn list_incident_types(&self) -> Result<Vec<IncidentType>, GatewayError> {
        let req = self.http.get(self.url("incidencias/tipos_incidencia/"));
        let wire: Vec<WireIncidentType> = self
            .execute(req, "Could not load incident types")
            .await?;
        if wire.is_empty() {
            warn!("Backend returned an empty incident-type catalog");
        }
        Ok(wire
            .into_iter()
            .map(|t| IncidentType {
                value: t.value,
                label: t.label,
            })
            .collect())
    }

    async fn guard_statistics(&self) -> Result<GuardStatistics, GatewayError> {
        let req = self.http.get(self.url("entregas/estadisticas_guardia/"));
        let wire: WireStatistics = self.execute(req, "Could not load statistics").await?;
        Ok(wire.into())
    }
}
