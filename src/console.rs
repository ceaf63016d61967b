//! Guard console: line commands and plain-text rendering
//!
//! The binary reads one command per stdin line, parses it with
//! [`parse_command`] and prints the orchestrator snapshots with
//! [`render_delivery`] / [`render_incident`].

use crate::scanner::ScanTarget;
use crate::types::{branch_display_name, IncidentStatus};
use crate::workflow::{DeliverySnapshot, IncidentSnapshot, IncidentStep};
use std::fmt::Write as _;
use std::path::PathBuf;

pub const HELP: &str = "\
Delivery:
  worker scan | worker manual | worker <rut>
  box scan | box manual | box <code>
  confirm | reset | status | stats
Incidents:
  incident new | incident type <value> | incident rut <rut> | incident box <code>
  incident desc <text> | incident photo <path|none> | incident scan rut|box
  incident submit | incident history [estado] | incident show <id>
  incident back | incident reset | incident status
Camera simulation (--simulate-camera):
  frame <payload> | frame -
Other:
  help | quit";

/// How a worker or box is entered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryArg {
    Scan,
    Manual,
    /// Identifier typed directly; implies manual entry
    Value(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncidentCommand {
    New,
    Type(String),
    Rut(String),
    Box(String),
    Description(String),
    Photo(PathBuf),
    ClearPhoto,
    Scan(ScanTarget),
    Submit,
    History(Option<IncidentStatus>),
    Show(u64),
    Back,
    Reset,
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Worker(EntryArg),
    Box(EntryArg),
    Confirm,
    Reset,
    Status,
    Stats,
    Incident(IncidentCommand),
    /// Push a simulated camera frame; `None` is an unreadable frame
    Frame(Option<String>),
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsoleError {
    #[error("Unknown command '{0}' (try 'help')")]
    Unknown(String),
    #[error("'{0}' needs an argument")]
    MissingArgument(&'static str),
    #[error("Invalid {what}: '{value}'")]
    InvalidArgument { what: &'static str, value: String },
}

fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim();
    match input.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (input, ""),
    }
}

fn required<'a>(rest: &'a str, name: &'static str) -> Result<&'a str, ConsoleError> {
    if rest.is_empty() {
        Err(ConsoleError::MissingArgument(name))
    } else {
        Ok(rest)
    }
}

fn entry_arg(rest: &str, name: &'static str) -> Result<EntryArg, ConsoleError> {
    Ok(match required(rest, name)? {
        "scan" => EntryArg::Scan,
        "manual" => EntryArg::Manual,
        value => EntryArg::Value(value.to_string()),
    })
}

fn parse_status(value: &str) -> Result<IncidentStatus, ConsoleError> {
    serde_json::from_value(serde_json::Value::String(value.to_string())).map_err(|_| {
        ConsoleError::InvalidArgument {
            what: "status",
            value: value.to_string(),
        }
    })
}

fn parse_incident(rest: &str) -> Result<IncidentCommand, ConsoleError> {
    let (sub, arg) = split_word(rest);
    Ok(match sub {
        "new" => IncidentCommand::New,
        "type" => IncidentCommand::Type(required(arg, "incident type")?.to_string()),
        "rut" => IncidentCommand::Rut(required(arg, "incident rut")?.to_string()),
        "box" => IncidentCommand::Box(required(arg, "incident box")?.to_string()),
        "desc" => IncidentCommand::Description(required(arg, "incident desc")?.to_string()),
        "photo" => match required(arg, "incident photo")? {
            "none" => IncidentCommand::ClearPhoto,
            path => IncidentCommand::Photo(PathBuf::from(path)),
        },
        "scan" => match required(arg, "incident scan")? {
            "rut" | "worker" => IncidentCommand::Scan(ScanTarget::Worker),
            "box" => IncidentCommand::Scan(ScanTarget::Box),
            other => {
                return Err(ConsoleError::InvalidArgument {
                    what: "scan target",
                    value: other.to_string(),
                })
            }
        },
        "submit" => IncidentCommand::Submit,
        "history" => {
            IncidentCommand::History(if arg.is_empty() { None } else { Some(parse_status(arg)?) })
        }
        "show" => {
            let id = required(arg, "incident show")?;
            IncidentCommand::Show(id.parse().map_err(|_| ConsoleError::InvalidArgument {
                what: "incident id",
                value: id.to_string(),
            })?)
        }
        "back" => IncidentCommand::Back,
        "reset" => IncidentCommand::Reset,
        "status" | "" => IncidentCommand::Status,
        other => return Err(ConsoleError::Unknown(format!("incident {other}"))),
    })
}

/// Parse one console line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, ConsoleError> {
    let (head, rest) = split_word(line);
    if head.is_empty() {
        return Ok(None);
    }
    let command = match head.to_ascii_lowercase().as_str() {
        "worker" => Command::Worker(entry_arg(rest, "worker")?),
        "box" => Command::Box(entry_arg(rest, "box")?),
        "confirm" => Command::Confirm,
        "reset" => Command::Reset,
        "status" => Command::Status,
        "stats" => Command::Stats,
        "incident" => Command::Incident(parse_incident(rest)?),
        "frame" => Command::Frame(match required(rest, "frame")? {
            "-" => None,
            payload => Some(payload.to_string()),
        }),
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(ConsoleError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

// ============================================================================
// Rendering
// ============================================================================

pub fn render_delivery(snapshot: &DeliverySnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[delivery] {} (guard: {})", snapshot.step, snapshot.guard);
    if let Some(worker) = &snapshot.worker {
        let _ = writeln!(
            out,
            "  worker: {} {} | {} | {}",
            worker.rut,
            worker.name,
            branch_display_name(&worker.branch),
            worker.contract_type.display_name()
        );
    }
    if let Some(found) = &snapshot.inventory_box {
        let _ = writeln!(
            out,
            "  box:    {} | {} | {} | stock {}",
            found.code,
            branch_display_name(&found.branch),
            found.contract_type.display_name(),
            found.available_stock
        );
    }
    if let Some(warning) = &snapshot.contract_warning {
        let _ = writeln!(out, "  warning: {warning}");
    }
    if snapshot.scanning {
        let _ = writeln!(out, "  camera active");
    }
    if snapshot.loading {
        let _ = writeln!(out, "  working...");
    }
    if let Some(err) = &snapshot.last_error {
        let _ = writeln!(out, "  error: {err}");
    }
    if let Some(stats) = &snapshot.statistics {
        let _ = writeln!(
            out,
            "  today {} | week {} | month {} | stock {} | pending incidents {}",
            stats.deliveries_today,
            stats.deliveries_this_week,
            stats.deliveries_this_month,
            stats.available_stock,
            stats.pending_incidents
        );
    }
    out
}

pub fn render_incident(snapshot: &IncidentSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[incident] {}", snapshot.step);
    match snapshot.step {
        IncidentStep::Create | IncidentStep::Submitting => {
            let draft = &snapshot.draft;
            let _ = writeln!(out, "  type:        {}", draft.incident_type.as_deref().unwrap_or("-"));
            let _ = writeln!(out, "  worker rut:  {}", draft.worker_rut.as_deref().unwrap_or("-"));
            let _ = writeln!(out, "  box code:    {}", draft.box_code.as_deref().unwrap_or("-"));
            let _ = writeln!(out, "  description: {}", draft.description);
            if let Some(photo) = &draft.photo {
                let _ = writeln!(out, "  photo:       {} ({} bytes)", photo.file_name, photo.size());
            }
            if !snapshot.catalog.is_empty() {
                let types: Vec<&str> = snapshot.catalog.iter().map(|t| t.value.as_str()).collect();
                let _ = writeln!(out, "  types: {}", types.join(", "));
            }
        }
        IncidentStep::Confirmation => {
            if let Some(created) = &snapshot.last_created {
                let _ = writeln!(out, "  reported incident #{} ({})", created.id, created.status);
            }
        }
        IncidentStep::History => {
            if snapshot.incidents.is_empty() && !snapshot.loading {
                let _ = writeln!(out, "  no incidents");
            }
            for incident in &snapshot.incidents {
                let _ = writeln!(
                    out,
                    "  #{:<5} {:<12} {:<26} {}",
                    incident.id,
                    incident.status,
                    incident.type_label.as_deref().unwrap_or(&incident.incident_type),
                    incident.description
                );
            }
        }
        IncidentStep::Detail => {
            if let Some(incident) = &snapshot.selected {
                let _ = writeln!(out, "  #{} {}", incident.id, incident.type_label.as_deref().unwrap_or(&incident.incident_type));
                let _ = writeln!(out, "  status: {}", incident.status);
                if let Some(at) = incident.reported_at {
                    let _ = writeln!(out, "  reported: {}", at.format("%Y-%m-%d %H:%M"));
                }
                let _ = writeln!(out, "  {}", incident.description);
                if let Some(resolution) = &incident.resolution {
                    let _ = writeln!(out, "  resolution: {resolution}");
                }
                if let Some(url) = &incident.evidence_url {
                    let _ = writeln!(out, "  evidence: {url}");
                }
            }
        }
        IncidentStep::Menu => {}
    }
    if let Some(target) = snapshot.scanning {
        let _ = writeln!(out, "  camera active ({target})");
    }
    if let Some(err) = &snapshot.last_error {
        let _ = writeln!(out, "  error: {err}");
    }
    out
}
