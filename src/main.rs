//! doorlink entry point
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  GpioDoorHardware   SimulatedHardware   LogEventSink           │
//! │  (DoorPort/sysfs)   (DoorPort/dryRun)   (EventSink/log)        │
//! │  TcpTransport       SessionHub          ControlClient          │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │            DoorService (pure logic)                    │    │
//! │  │  request · poll · stall/sim/relay timers               │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```

use std::net::TcpListener;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::{LevelFilter, info};

#[cfg(target_os = "linux")]
use doorlink::adapters::hardware::GpioDoorHardware;
use doorlink::adapters::simulated::SimulatedHardware;
use doorlink::config::DoorConfig;
use doorlink::error::ClientError;
use doorlink::fsm::{DoorSnapshot, TargetState};
use doorlink::rpc::client::{ControlClient, ControlRequest, SetOutcome};
use doorlink::rpc::io_task::serve;

#[derive(Parser, Debug)]
#[command(name = "doorlink")]
#[command(version, about = "Door actuator with an authenticated TCP control channel", long_about = None)]
struct Args {
    /// Shared HMAC secret
    #[arg(long)]
    secret: String,

    /// Server address (client commands) or bind address (`tcp`)
    #[arg(long)]
    host: Option<String>,

    /// TCP port [default: 11001]
    #[arg(long)]
    port: Option<u16>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// off, error, warn, info, debug or trace (RUST_LOG refines it)
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the control server
    Tcp {
        /// Simulate the door instead of driving GPIO
        #[arg(long = "dryRun", alias = "dry-run")]
        dry_run: bool,
    },
    /// Print the door state, then every change until the server closes
    Sync,
    /// Move the door and wait for the outcome
    Set {
        /// 0 = OPEN, 1 = CLOSE
        #[arg(long, value_parser = parse_target)]
        target: TargetState,
    },
}

fn parse_target(s: &str) -> Result<TargetState, String> {
    let code: u8 = s.parse().map_err(|_| format!("'{s}' is not 0 or 1"))?;
    TargetState::try_from(code).map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .parse_default_env()
        .format_timestamp_millis()
        .init();

    let mut config = DoorConfig::load(args.config.as_deref()).context("loading config")?;
    if let Some(port) = args.port {
        config.port = port;
    }

    match args.command {
        Command::Tcp { dry_run } => run_server(&args.secret, args.host, &config, dry_run),
        Command::Sync => run_sync(&args.secret, args.host, &config),
        Command::Set { target } => run_set(&args.secret, args.host, &config, target),
    }
}

// ── Server ────────────────────────────────────────────────────

fn run_server(secret: &str, host: Option<String>, config: &DoorConfig, dry_run: bool) -> Result<()> {
    let host = host.unwrap_or_else(|| config.bind_host.clone());
    let listener = TcpListener::bind((host.as_str(), config.port))
        .with_context(|| format!("binding {}:{}", host, config.port))?;

    info!("doorlink v{}", env!("CARGO_PKG_VERSION"));

    if dry_run {
        info!(
            "Dry run: simulated door, travel {}+{}ms",
            config.sim_travel_ms, config.sim_travel_jitter_ms
        );
        return serve(
            listener,
            secret.as_bytes(),
            config,
            SimulatedHardware::from_config(config),
        );
    }

    serve_gpio(listener, secret, config)
}

#[cfg(target_os = "linux")]
fn serve_gpio(listener: TcpListener, secret: &str, config: &DoorConfig) -> Result<()> {
    let hw = GpioDoorHardware::from_sysfs(&config.gpio).context("setting up GPIO")?;
    serve(listener, secret.as_bytes(), config, hw)
}

#[cfg(not(target_os = "linux"))]
fn serve_gpio(_listener: TcpListener, _secret: &str, _config: &DoorConfig) -> Result<()> {
    bail!("GPIO needs Linux sysfs; use --dryRun on this platform")
}

// ── Client ────────────────────────────────────────────────────

fn connect(secret: &str, host: Option<String>, config: &DoorConfig) -> Result<ControlClient> {
    let host = host.context("--host is required for client commands")?;
    ControlClient::connect((host.as_str(), config.port), secret.as_bytes())
        .with_context(|| format!("connecting to {}:{}", host, config.port))
}

fn print_snapshot(snapshot: &DoorSnapshot) {
    match serde_json::to_string(snapshot) {
        Ok(line) => println!("{line}"),
        Err(e) => log::warn!("cannot print snapshot: {e}"),
    }
}

fn run_sync(secret: &str, host: Option<String>, config: &DoorConfig) -> Result<()> {
    let mut client = connect(secret, host, config)?;
    client.send(ControlRequest::Sync)?;
    loop {
        match client.next_snapshot() {
            Ok(snapshot) => print_snapshot(&snapshot),
            Err(ClientError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }
}

fn run_set(secret: &str, host: Option<String>, config: &DoorConfig, target: TargetState) -> Result<()> {
    let mut client = connect(secret, host, config)?;
    match client.set_target(target, print_snapshot)? {
        SetOutcome::Reached => {
            info!("Door is {}", target);
            Ok(())
        }
        SetOutcome::Stopped => bail!("door stopped before reaching {target}"),
        SetOutcome::Redirected => bail!("door settled away from {target}"),
    }
}
