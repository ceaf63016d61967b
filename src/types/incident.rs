//! Incident reports: catalog entries, history records and the create form

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One entry of the externally supplied incident-type catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentType {
    /// Wire value (e.g. `caja_danada`)
    pub value: String,
    /// Display label (e.g. `Caja dañada`)
    pub label: String,
}

/// Triage status assigned by supervisors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Pendiente,
    EnProceso,
    Resuelto,
    Rechazado,
}

impl IncidentStatus {
    /// Wire value, as used in list filters.
    pub fn as_str(self) -> &'static str {
        match self {
            IncidentStatus::Pendiente => "pendiente",
            IncidentStatus::EnProceso => "en_proceso",
            IncidentStatus::Resuelto => "resuelto",
            IncidentStatus::Rechazado => "rechazado",
        }
    }
}

impl std::fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncidentStatus::Pendiente => write!(f, "Pendiente"),
            IncidentStatus::EnProceso => write!(f, "En Proceso"),
            IncidentStatus::Resuelto => write!(f, "Resuelto"),
            IncidentStatus::Rechazado => write!(f, "Rechazado"),
        }
    }
}

/// Triage priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentPriority {
    Baja,
    Media,
    Alta,
    Critica,
}

/// A previously reported incident, as listed in the guard's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub id: u64,
    /// Catalog value of the incident type
    pub incident_type: String,
    /// Catalog label, when the server supplies one
    pub type_label: Option<String>,
    pub description: String,
    pub status: IncidentStatus,
    pub priority: Option<IncidentPriority>,
    pub reported_at: Option<DateTime<Utc>>,
    /// Supervisor's resolution notes
    pub resolution: Option<String>,
    pub worker_rut: Option<String>,
    pub box_code: Option<String>,
    /// URL of the uploaded photo evidence
    pub evidence_url: Option<String>,
}

/// Optional filter for the incident history list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentFilter {
    pub status: Option<IncidentStatus>,
}

/// Photo evidence attached to an incident.
///
/// Only metadata is serialized into snapshots; the bytes go to the upload.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Photo {
    pub file_name: String,
    pub content_type: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl Photo {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Read a photo from disk, guessing the content type from the extension.
    ///
    /// Files larger than `max_bytes` are refused before being read.
    pub async fn load(path: &Path, max_bytes: u64) -> std::io::Result<Self> {
        let len = tokio::fs::metadata(path).await?.len();
        if len > max_bytes {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("photo is {len} bytes; the limit is {max_bytes} bytes"),
            ));
        }
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "evidencia.jpg".to_string());
        let content_type = match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("png") => "image/png",
            Some("webp") => "image/webp",
            Some("gif") => "image/gif",
            _ => "image/jpeg",
        };
        Ok(Self::new(file_name, content_type, bytes))
    }

    /// Size in bytes.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

impl std::fmt::Debug for Photo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Photo")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// Contents of the incident create form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IncidentDraft {
    /// Catalog value; required before submission
    pub incident_type: Option<String>,
    pub worker_rut: Option<String>,
    pub box_code: Option<String>,
    /// Free-form description; must be non-blank before submission
    pub description: String,
    pub photo: Option<Photo>,
}

/// A single edit to the incident create form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncidentField {
    Type(String),
    WorkerRut(String),
    BoxCode(String),
    Description(String),
    Photo(Photo),
    ClearPhoto,
}

/// Trimmed value or `None` when blank.
pub(crate) fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
