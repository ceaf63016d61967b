//! Worker identity and contract types

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Employment contract type. Both workers and boxes carry one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractType {
    /// Indefinite contract
    Indefinido,
    /// Fixed-term contract
    PlazoFijo,
}

impl ContractType {
    /// Human-readable label used by the guard console.
    pub fn display_name(self) -> &'static str {
        match self {
            ContractType::Indefinido => "Indefinido",
            ContractType::PlazoFijo => "Plazo Fijo",
        }
    }
}

impl std::fmt::Display for ContractType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContractType::Indefinido => write!(f, "indefinido"),
            ContractType::PlazoFijo => write!(f, "plazo_fijo"),
        }
    }
}

/// A worker as returned by worker validation.
///
/// Immutable snapshot; a re-validation replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    /// Unique identifier (Chilean RUT, e.g. `12345678-9`)
    pub rut: String,
    /// Full display name
    pub name: String,
    /// Branch code the worker belongs to (e.g. `casablanca`)
    pub branch: String,
    /// Contract type, compared against the box's for a non-blocking warning
    pub contract_type: ContractType,
}

fn rut_pattern() -> &'static Regex {
    static RUT: OnceLock<Regex> = OnceLock::new();
    RUT.get_or_init(|| Regex::new(r"^\d{1,8}-[0-9K]$").expect("RUT pattern is a valid regex"))
}

/// Normalize a RUT typed by hand or decoded from a QR code.
///
/// Strips whitespace and thousands separators and upper-cases the check
/// character. Returns `None` when the result is not shaped like
/// `digits-check` (check digit is not verified; the backend is authoritative).
pub fn normalize_rut(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '.' && !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();

    if rut_pattern().is_match(&cleaned) {
        Some(cleaned)
    } else {
        None
    }
}

/// Display name for the known branch codes; unknown codes are shown verbatim.
pub fn branch_display_name(code: &str) -> &str {
    match code {
        "casablanca" => "Casablanca",
        "valparaiso_bif" => "Valparaíso – Planta BIF",
        "valparaiso_bic" => "Valparaíso – Planta BIC",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_rut_accepts_plain_and_dotted() {
        assert_eq!(normalize_rut("12345678-9").as_deref(), Some("12345678-9"));
        assert_eq!(normalize_rut(" 12.345.678-9 ").as_deref(), Some("12345678-9"));
        assert_eq!(normalize_rut("7654321-k").as_deref(), Some("7654321-K"));
    }

    #[test]
    fn test_normalize_rut_rejects_malformed() {
        assert_eq!(normalize_rut(""), None);
        assert_eq!(normalize_rut("   "), None);
        assert_eq!(normalize_rut("123456789"), None);
        assert_eq!(normalize_rut("CAJA-IND-001"), None);
        assert_eq!(normalize_rut("12345678-99"), None);
    }

    #[test]
    fn test_contract_type_wire_names() {
        let json = serde_json::to_string(&ContractType::PlazoFijo).unwrap();
        assert_eq!(json, "\"plazo_fijo\"");
        let parsed: ContractType = serde_json::from_str("\"indefinido\"").unwrap();
        assert_eq!(parsed, ContractType::Indefinido);
        assert_eq!(ContractType::PlazoFijo.to_string(), "plazo_fijo");
    }

    #[test]
    fn test_branch_display_name() {
        assert_eq!(branch_display_name("valparaiso_bif"), "Valparaíso – Planta BIF");
        assert_eq!(branch_display_name("antofagasta"), "antofagasta");
    }
}
