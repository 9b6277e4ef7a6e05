use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use mdc_fc::mav::MavFlight;
use mdc_fc::sim::SimFlight;
use mdc_fc::{FcConfig, FlightControl, Position};
use mdc_link::serial::{default_baud, default_candidate_devs, SerialTransport};
use mdc_link::sim::{SimConfig, SimTransport};
use mdc_link::{LinkConfig, MissionContext, ProtocolConfig, ReliableMessenger, ScenarioCoordinator, Transport};
use mdc_mission::doctor as mission_doctor;
use mdc_mission::orient::{load_orienting, save_orienting};
use mdc_mission::{
    AbortMonitor, JsonArrayFile, MissionConfig, MissionController, MissionPlan, NodesConfig, ScenarioConfig,
};
use mdc_path::Waypoint2D;
use mdc_proto::packet::SERIAL_AM_CONTROL;

/// Where the simulated vehicle stands before takeoff.
const SIM_HOME: Position = Position { lat: 43.6532, lon: -79.3832, alt_msl: 76.0 };

#[derive(Debug, Parser)]
#[command(name = "mdc", version, about = "MDCn - mobile data collector for wake-up radio sensor networks")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the configuration.
    Doctor,
    /// Set scenarios, collect once from every node, switch them off again.
    CommTest,
    /// Print the vehicle position.
    Coords,
    /// Save the vehicle position as the orienting point.
    Orient,
    /// Fly one collection cycle and append the results.
    Run,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct Config {
    link: LinkConfig,
    #[serde(default)]
    protocol: ProtocolConfig,
    #[serde(default)]
    scenario: ScenarioConfig,
    #[serde(default)]
    nodes: NodesConfig,
    #[serde(default)]
    mission: MissionConfig,
    fc: FcConfig,
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).context("read config")?;
    Ok(toml::from_str(&s).context("parse config toml")?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg).await?,
        Command::CommTest => comm_test(&cfg).await?,
        Command::Coords => coords(&cfg).await?,
        Command::Orient => orient(&cfg).await?,
        Command::Run => run(&cfg).await?,
    }
    Ok(())
}

async fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    mission_doctor::check_protocol(&cfg.protocol)?;
    mission_doctor::check_scenario(&cfg.scenario)?;
    mission_doctor::check_nodes(&cfg.nodes.ids())?;
    mission_doctor::check_mission(&cfg.mission)?;

    match cfg.link.backend.as_str() {
        "serial" => {
            anyhow::ensure!(cfg.link.baud.unwrap_or_else(default_baud) > 0, "link.baud invalid");
            let devs = cfg.link.candidate_devs.clone().unwrap_or_else(default_candidate_devs);
            anyhow::ensure!(!devs.is_empty(), "link.candidate_devs is empty");
        }
        "sim" => {
            let drop = cfg.link.drop_rate.unwrap_or(0.0);
            anyhow::ensure!((0.0..1.0).contains(&drop), "link.drop_rate must be in [0, 1)");
        }
        other => anyhow::bail!("unknown link.backend: {}", other),
    }

    match cfg.fc.backend.as_str() {
        "mavlink" => {
            anyhow::ensure!(!cfg.fc.connection().is_empty(), "fc.connection missing");
            anyhow::ensure!(cfg.fc.arrival_tolerance_m() > 0.0, "fc.arrival_tolerance_m must be > 0");
            anyhow::ensure!(cfg.fc.command_timeout() >= Duration::from_secs(5), "fc.command_timeout_s too short");
        }
        "sim" => info!("doctor: simulated flight (OK)"),
        other => anyhow::bail!("unknown fc.backend: {}", other),
    }

    load_orienting(Path::new(&cfg.mission.orient_path())).map(|_| ()).or_else(|e| {
        warn!("no orienting point yet: {:#}", e);
        Ok::<(), anyhow::Error>(())
    })?;

    info!("doctor: OK");
    Ok(())
}

fn open_transport(cfg: &Config) -> Result<Box<dyn Transport>> {
    match cfg.link.backend.as_str() {
        "serial" => {
            let devs = cfg.link.candidate_devs.clone().unwrap_or_else(default_candidate_devs);
            let baud = cfg.link.baud.unwrap_or_else(default_baud);
            let t = SerialTransport::open_first(&devs, baud).context("sniffer mote not found")?;
            info!("link: sniffer mote on {}", t.device());
            Ok(Box::new(t))
        }
        "sim" => {
            let defaults = SimConfig::default();
            let sim = SimConfig {
                drop_rate: cfg.link.drop_rate.unwrap_or(defaults.drop_rate),
                seed: cfg.link.seed.unwrap_or(defaults.seed),
                ..defaults
            };
            info!("link: simulated nodes {:?}", cfg.nodes.ids());
            Ok(Box::new(SimTransport::new(&cfg.nodes.ids(), sim)))
        }
        other => anyhow::bail!("unknown link.backend: {}", other),
    }
}

fn open_flight(cfg: &Config) -> Result<Box<dyn FlightControl>> {
    match cfg.fc.backend.as_str() {
        "mavlink" => Ok(Box::new(MavFlight::open(&cfg.fc).context("FC open")?)),
        "sim" => {
            let step = Duration::from_millis(cfg.fc.sim_step_ms.unwrap_or(1000));
            Ok(Box::new(SimFlight::new(SIM_HOME, step)))
        }
        other => anyhow::bail!("unknown fc.backend: {}", other),
    }
}

/// Opens the FC and waits for a fix, off the async workers.
async fn vehicle(cfg: &Config) -> Result<(Box<dyn FlightControl>, Position)> {
    let cfg = cfg.clone();
    tokio::task::spawn_blocking(move || -> Result<(Box<dyn FlightControl>, Position)> {
        let mut flight = open_flight(&cfg)?;
        let p = flight.position().context("vehicle position")?;
        Ok((flight, p))
    })
    .await
    .context("FC task")?
}

fn coordinator(cfg: &Config, transport: Box<dyn Transport>) -> ScenarioCoordinator<Box<dyn Transport>> {
    let messenger = ReliableMessenger::new(transport, SERIAL_AM_CONTROL, cfg.protocol.read_timeout());
    ScenarioCoordinator::new(messenger, &cfg.protocol, cfg.scenario.kind, cfg.scenario.duty_cycle())
}

async fn comm_test(cfg: &Config) -> Result<()> {
    let cfg = cfg.clone();
    tokio::task::spawn_blocking(move || comm_test_blocking(&cfg))
        .await
        .context("comm-test task")?
}

fn comm_test_blocking(cfg: &Config) -> Result<()> {
    mission_doctor::check_scenario(&cfg.scenario)?;
    let mut coordinator = coordinator(cfg, open_transport(cfg)?);
    let nodes = cfg.nodes.ids();
    let mut ctx = MissionContext::new(&nodes);

    for &node in &nodes {
        let _ = coordinator.set_scenario(&mut ctx, node, cfg.scenario.kind);
    }
    for &node in &nodes {
        println!("Collecting data from SN {}...", node);
        match coordinator.collect_from_node(&mut ctx, node) {
            Ok(latency) => println!("SN {} answered in {:.3} seconds.", node, latency.as_secs_f64()),
            Err(e) => println!("SN {}: {}", node, e),
        }
    }
    for &node in &nodes {
        match coordinator.switch_off(&mut ctx, node) {
            Ok(ms) => println!("SN {} was awake for {} milliseconds.", node, ms),
            Err(e) => println!("SN {}: {}", node, e),
        }
    }
    Ok(())
}

async fn coords(cfg: &Config) -> Result<()> {
    let (_, p) = vehicle(cfg).await?;
    println!("MDC coordinates: [{}, {}, {}]", p.lat, p.lon, p.alt_msl);
    Ok(())
}

async fn orient(cfg: &Config) -> Result<()> {
    let (_, p) = vehicle(cfg).await?;
    let path = cfg.mission.orient_path();
    save_orienting(Path::new(&path), Waypoint2D::new(p.lat, p.lon))?;
    info!("orient: saved {:.7}, {:.7} to {}", p.lat, p.lon, path);
    Ok(())
}

async fn run(cfg: &Config) -> Result<()> {
    info!("run: starting");
    mission_doctor::check_scenario(&cfg.scenario)?;
    mission_doctor::check_mission(&cfg.mission)?;

    let orienting = load_orienting(Path::new(&cfg.mission.orient_path()))?;
    let (flight, home) = vehicle(cfg).await.context("home position")?;
    mdc_path::doctor::check_orienting(&Waypoint2D::new(home.lat, home.lon), &orienting)?;

    let coordinator = coordinator(cfg, open_transport(cfg)?);
    let plan = MissionPlan {
        layers: cfg.mission.layers(),
        altitude_m: cfg.mission.altitude_m(),
        scale_factor: cfg.mission.scale_factor(),
        orienting,
    };
    let sink = JsonArrayFile::new(cfg.mission.results_path());
    let mut controller = MissionController::new(coordinator, flight, sink, plan);
    let mut ctx = MissionContext::new(&cfg.nodes.ids());

    let monitor = AbortMonitor::operator(ctx.abort.clone());
    let banner = "!".repeat(20);
    println!("{}\nCollection cycle starting!\nPress ENTER to terminate the collection cycle!\n{}", banner, banner);

    // The mission blocks on serial and MAVLink reads; keep it off the async workers.
    let result = tokio::task::spawn_blocking(move || controller.run(&mut ctx))
        .await
        .context("mission task")?;
    monitor.stop();

    let record = result?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
