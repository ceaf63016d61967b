//! Guardpost - guard console for benefit-box deliveries
//!
//! Reads one command per line from stdin and drives the delivery and incident
//! workflows against the backend API.
//!
//! # Usage
//!
//! ```bash
//! # Against a local backend, camera through zbarcam
//! GUARDPOST_TOKEN=... guardpost --user guardia1
//!
//! # Without a camera: feed payloads with `frame <text>`
//! guardpost --simulate-camera
//! ```
//!
//! # Environment Variables
//!
//! - `GUARDPOST_CONFIG`: Path to the TOML config (default: ./guardpost.toml)
//! - `GUARDPOST_TOKEN`: Bearer token for the backend API
//! - `GUARDPOST_USER`: Guard login name
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use guardpost::console::{self, Command, EntryArg, IncidentCommand};
use guardpost::{
    CaptureDevice, ChannelDevice, DecoderProcessDevice, DeliveryOrchestrator, DeliveryStep,
    EntryMode, Frame, GuardConfig, GuardSession, HttpGateway, IncidentField, IncidentFilter,
    IncidentOrchestrator, Outcome, Photo, ScanSessionManager, ValidationGateway, WorkflowError,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "guardpost")]
#[command(about = "Guard console for benefit-box deliveries and incident reports")]
#[command(version)]
struct CliArgs {
    /// Config file (overrides GUARDPOST_CONFIG and ./guardpost.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Backend API root (overrides [gateway].base_url)
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Bearer token for the backend API
    #[arg(long, env = "GUARDPOST_TOKEN", default_value = "", hide_env_values = true)]
    token: String,

    /// Guard login name
    #[arg(long, env = "GUARDPOST_USER", default_value = "guardia")]
    user: String,

    /// Name shown in the console header (defaults to --user)
    #[arg(long)]
    display_name: Option<String>,

    /// Enable the statistics panel (overrides [delivery].show_statistics)
    #[arg(long)]
    statistics: bool,

    /// Use an in-process camera fed by `frame <payload>` commands
    #[arg(long)]
    simulate_camera: bool,
}

/// Handles shared by the command loop and the tasks it spawns.
#[derive(Clone)]
struct Console {
    delivery: DeliveryOrchestrator,
    incident: IncidentOrchestrator,
    camera: Option<Arc<ChannelDevice>>,
    max_photo_bytes: u64,
}

fn print_result<S: std::fmt::Display>(label: &str, result: Result<Outcome<S>, WorkflowError>) {
    match result {
        Ok(Outcome::Applied(step)) => println!("{label}: {step}"),
        Ok(Outcome::Discarded) => println!("{label}: result dropped after reset"),
        Ok(Outcome::ScanStopped) => println!("{label}: scan stopped"),
        Err(e) => println!("{label}: {e}"),
    }
}

impl Console {
    fn show_delivery(&self) {
        print!("{}", console::render_delivery(&self.delivery.snapshot()));
    }

    fn show_incident(&self) {
        print!("{}", console::render_incident(&self.incident.snapshot()));
    }

    /// Wait for the delivery scan in the background.
    fn spawn_delivery_scan(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            print_result("scan", this.delivery.await_scan().await);
            this.show_delivery();
        });
    }

    fn spawn_incident_scan(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            print_result("scan", this.incident.await_scan().await);
            this.show_incident();
        });
    }

    fn worker(&self, arg: EntryArg) {
        match arg {
            EntryArg::Scan => match self.delivery.begin_worker_entry(EntryMode::Scan) {
                Ok(_) => {
                    println!("Point the camera at the worker's QR code");
                    self.spawn_delivery_scan();
                }
                Err(e) => println!("worker: {e}"),
            },
            EntryArg::Manual => {
                if let Err(e) = self.delivery.begin_worker_entry(EntryMode::Manual) {
                    println!("worker: {e}");
                }
            }
            EntryArg::Value(rut) => {
                if self.delivery.step() == DeliveryStep::Idle {
                    if let Err(e) = self.delivery.begin_worker_entry(EntryMode::Manual) {
                        println!("worker: {e}");
                        return;
                    }
                }
                let this = self.clone();
                tokio::spawn(async move {
                    print_result("worker", this.delivery.submit_worker_identifier(&rut).await);
                    this.show_delivery();
                });
            }
        }
    }

    fn inventory_box(&self, arg: EntryArg) {
        match arg {
            EntryArg::Scan => match self.delivery.begin_box_entry(EntryMode::Scan) {
                Ok(_) => {
                    println!("Point the camera at the box's QR code");
                    self.spawn_delivery_scan();
                }
                Err(e) => println!("box: {e}"),
            },
            EntryArg::Manual => {
                if let Err(e) = self.delivery.begin_box_entry(EntryMode::Manual) {
                    println!("box: {e}");
                }
            }
            EntryArg::Value(code) => {
                let this = self.clone();
                tokio::spawn(async move {
                    print_result("box", this.delivery.submit_box_identifier(&code).await);
                    this.show_delivery();
                });
            }
        }
    }

    async fn incident(&self, command: IncidentCommand) {
        let field = match command {
            IncidentCommand::New => {
                let this = self.clone();
                tokio::spawn(async move {
                    print_result("incident", this.incident.open_create().await);
                    this.show_incident();
                });
                return;
            }
            IncidentCommand::Submit => {
                let this = self.clone();
                tokio::spawn(async move {
                    print_result("incident", this.incident.submit().await);
                    this.show_incident();
                });
                return;
            }
            IncidentCommand::History(status) => {
                let this = self.clone();
                let filter = status.map(|s| IncidentFilter { status: Some(s) });
                tokio::spawn(async move {
                    print_result("history", this.incident.open_history_filtered(filter).await);
                    this.show_incident();
                });
                return;
            }
            IncidentCommand::Scan(target) => {
                match self.incident.begin_scan_prefill(target) {
                    Ok(()) => self.spawn_incident_scan(),
                    Err(e) => println!("incident: {e}"),
                }
                return;
            }
            IncidentCommand::Show(id) => {
                if let Err(e) = self.incident.open_detail(id) {
                    println!("incident: {e}");
                }
                self.show_incident();
                return;
            }
            IncidentCommand::Back => {
                if let Err(e) = self.incident.back() {
                    println!("incident: {e}");
                }
                self.show_incident();
                return;
            }
            IncidentCommand::Reset => {
                self.incident.reset();
                self.show_incident();
                return;
            }
            IncidentCommand::Status => {
                self.show_incident();
                return;
            }
            IncidentCommand::Photo(path) => {
                match Photo::load(&path, self.max_photo_bytes).await {
                    Ok(photo) => IncidentField::Photo(photo),
                    Err(e) => {
                        println!("incident: cannot attach {}: {e}", path.display());
                        return;
                    }
                }
            }
            IncidentCommand::ClearPhoto => IncidentField::ClearPhoto,
            IncidentCommand::Type(value) => IncidentField::Type(value),
            IncidentCommand::Rut(rut) => IncidentField::WorkerRut(rut),
            IncidentCommand::Box(code) => IncidentField::BoxCode(code),
            IncidentCommand::Description(text) => IncidentField::Description(text),
        };
        if let Err(e) = self.incident.update_field(field) {
            println!("incident: {e}");
        }
    }

    /// Returns false when the console should exit.
    async fn dispatch(&self, command: Command) -> bool {
        match command {
            Command::Worker(arg) => self.worker(arg),
            Command::Box(arg) => self.inventory_box(arg),
            Command::Confirm => {
                let this = self.clone();
                tokio::spawn(async move {
                    print_result("confirm", this.delivery.confirm().await);
                    this.show_delivery();
                });
            }
            Command::Reset => {
                self.delivery.reset();
                self.show_delivery();
            }
            Command::Status => {
                self.show_delivery();
                self.show_incident();
            }
            Command::Stats => {
                let this = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = this.delivery.refresh_statistics().await {
                        println!("stats: {e}");
                    }
                    this.show_delivery();
                });
            }
            Command::Incident(command) => self.incident(command).await,
            Command::Frame(payload) => match &self.camera {
                Some(camera) => {
                    let frame = payload.map_or(Frame::Unreadable, Frame::Decoded);
                    if !camera.push(frame) {
                        println!("frame: no scan is active");
                    }
                }
                None => println!("frame: start with --simulate-camera to feed frames"),
            },
            Command::Help => println!("{}", console::HELP),
            Command::Quit => return false,
        }
        true
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => GuardConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => GuardConfig::load(),
    };
    if let Some(base_url) = args.base_url {
        config.gateway.base_url = base_url;
    }
    if args.statistics {
        config.delivery.show_statistics = true;
    }
    config.validate().context("Invalid configuration")?;

    let session = GuardSession::new(
        args.user.clone(),
        args.display_name.unwrap_or_else(|| args.user.clone()),
        args.token,
    );
    if session.access_token.is_empty() {
        warn!("No GUARDPOST_TOKEN set; backend calls will be unauthenticated");
    }

    let gateway: Arc<dyn ValidationGateway> = Arc::new(
        HttpGateway::new(&config.gateway, &session).context("Failed to build HTTP client")?,
    );

    let camera = args
        .simulate_camera
        .then(|| Arc::new(ChannelDevice::new(config.scanner.frame_buffer)));
    let device: Arc<dyn CaptureDevice> = match &camera {
        Some(channel) => Arc::clone(channel) as Arc<dyn CaptureDevice>,
        None => Arc::new(DecoderProcessDevice::new(&config.scanner)),
    };
    let scanner = Arc::new(ScanSessionManager::new(device));

    let console = Console {
        delivery: DeliveryOrchestrator::new(
            Arc::clone(&gateway),
            Arc::clone(&scanner),
            session.clone(),
            (&config.delivery).into(),
        ),
        incident: IncidentOrchestrator::new(
            gateway,
            Arc::clone(&scanner),
            session.clone(),
            (&config.incident).into(),
        ),
        camera,
        max_photo_bytes: config.incident.max_photo_bytes,
    };

    info!(
        guard = %session.username,
        backend = %config.gateway.base_url,
        camera = if args.simulate_camera { "simulated" } else { config.scanner.decoder_command.as_str() },
        "Guard console ready"
    );
    println!("{}", console::HELP);

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, shutting down");
        shutdown_token.cancel();
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            () = cancel_token.cancelled() => break,
            line = lines.next_line() => line.context("Failed to read stdin")?,
        };
        let Some(line) = line else { break };

        match console::parse_command(&line) {
            Ok(Some(command)) => {
                if !console.dispatch(command).await {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => println!("{e}"),
        }
    }

    console.delivery.reset();
    console.incident.reset();
    scanner.stop();
    info!("Guard console stopped");
    Ok(())
}
