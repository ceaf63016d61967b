//! Config validation: unknown-key detection with Levenshtein suggestions
//! and value range checks.
//!
//! The raw file is parsed into a `toml::Value` first so keys serde would
//! silently ignore can be reported with the nearest known key. Typed
//! deserialization runs afterwards and is unaffected.

use std::collections::HashSet;

/// Something in guardpost.toml that loads but is probably not what the
/// operator meant. Logged at startup; never fails the load.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// Dotted path of the offending key, e.g. `delivery.success_reset_ms`
    pub field: String,
    pub message: String,
    /// Closest known key, for misspellings
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.suggestion {
            Some(known) => write!(f, "{}; closest known key is '{known}'", self.message),
            None => f.write_str(&self.message),
        }
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for GuardConfig.
///
/// Maintained by hand to match the struct hierarchy in guard_config.rs.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [gateway]
        "gateway",
        "gateway.base_url",
        "gateway.timeout_secs",
        // [delivery]
        "delivery",
        "delivery.success_reset_ms",
        "delivery.show_statistics",
        // [incident]
        "incident",
        "incident.confirmation_return_ms",
        "incident.max_photo_bytes",
        // [scanner]
        "scanner",
        "scanner.decoder_command",
        "scanner.decoder_args",
        "scanner.frame_buffer",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Every table and key path present in a parsed guardpost.toml, dotted.
///
/// `[scanner]` with `frame_buffer = 8` gives `scanner` and
/// `scanner.frame_buffer`. Arrays are leaves.
pub fn config_key_paths(value: &toml::Value) -> Vec<String> {
    let mut paths = Vec::new();
    if let Some(table) = value.as_table() {
        collect_key_paths(table, None, &mut paths);
    }
    paths
}

fn collect_key_paths(table: &toml::Table, parent: Option<&str>, out: &mut Vec<String>) {
    for (key, value) in table {
        let path = match parent {
            Some(parent) => format!("{parent}.{key}"),
            None => key.clone(),
        };
        if let Some(nested) = value.as_table() {
            out.push(path.clone());
            collect_key_paths(nested, Some(&path), out);
        } else {
            out.push(path);
        }
    }
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|k| (*k, levenshtein(unknown, k)))
        .filter(|(_, dist)| *dist <= 3)
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
        .map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// This does NOT fail on unknown keys; it only warns.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };

    let known = known_config_keys();
    config_key_paths(&value)
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Range Validation
// ============================================================================

/// Validate value ranges on a parsed GuardConfig.
///
/// Returns (errors, warnings): errors are impossible values that must
/// prevent startup; warnings are suspicious but not fatal.
pub fn validate_ranges(config: &super::GuardConfig) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    match reqwest::Url::parse(&config.gateway.base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(format!(
            "gateway.base_url must use http or https, got '{}'",
            url.scheme()
        )),
        Err(e) => errors.push(format!(
            "gateway.base_url '{}' is not a valid URL: {e}",
            config.gateway.base_url
        )),
    }

    if config.gateway.timeout_secs == 0 {
        errors.push("gateway.timeout_secs must be > 0".to_string());
    } else if config.gateway.timeout_secs > 120 {
        warnings.push(ValidationWarning {
            field: "gateway.timeout_secs".to_string(),
            message: format!(
                "gateway.timeout_secs = {} leaves the guard waiting over two minutes on a stalled backend",
                config.gateway.timeout_secs
            ),
            suggestion: None,
        });
    }

    if config.delivery.success_reset_ms == 0 {
        errors.push("delivery.success_reset_ms must be > 0".to_string());
    }
    if config.incident.confirmation_return_ms == 0 {
        errors.push("incident.confirmation_return_ms must be > 0".to_string());
    }

    if config.incident.max_photo_bytes == 0 {
        errors.push("incident.max_photo_bytes must be > 0".to_string());
    } else if config.incident.max_photo_bytes > 20 * 1024 * 1024 {
        warnings.push(ValidationWarning {
            field: "incident.max_photo_bytes".to_string(),
            message: format!(
                "incident.max_photo_bytes = {} exceeds 20 MiB; uploads may be rejected by the backend",
                config.incident.max_photo_bytes
            ),
            suggestion: None,
        });
    }

    if config.scanner.decoder_command.trim().is_empty() {
        errors.push("scanner.decoder_command must not be empty".to_string());
    }
    if config.scanner.frame_buffer == 0 {
        errors.push("scanner.frame_buffer must be > 0".to_string());
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================
