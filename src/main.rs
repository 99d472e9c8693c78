//! Race Host - headless fixed-rate race driver
//!
//! Builds a session from environment configuration, fills the grid with AI
//! drivers and runs it until the race ends or the process is signalled.

use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use racing_core::config::{HostConfig, Settings};
use racing_core::host::{HostRegistry, RaceHost};
use racing_core::net::{MessageKind, NetMessage};
use racing_core::race::laptime::format_millis;
use racing_core::race::physics::CarClass;
use racing_core::race::{CircuitData, Contestant, CorridorTerrain, Session, SessionMode};
use racing_core::util::time::{init_host_time, uptime_secs};

/// Track half-width around the racing line (m)
const TRACK_HALF_WIDTH: f32 = 7.0;
/// Wall distance from the racing line (m)
const WALL_DISTANCE: f32 = 14.0;
/// Spread of AI difficulty around the configured value
const SKILL_SPREAD: f32 = 0.1;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = HostConfig::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize host time tracking
    init_host_time();

    info!("Starting Race Host");

    let circuit = match &config.circuit_path {
        Some(path) => CircuitData::from_path(path)?,
        None => CircuitData::stadium("Stadium", 200.0, 50.0, 120, 4.0, 9.0)?,
    };
    let circuit = Arc::new(circuit);
    info!(circuit = %circuit.name(), points = circuit.len(), "Circuit loaded");

    let seed = config.seed.unwrap_or_else(rand::random);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    info!(
        seed,
        ai_count = config.ai_count,
        difficulty = config.ai_difficulty,
        speed_unit = config.speed_unit.label(),
        "Filling grid"
    );

    let settings = config.settings();
    let mut session = Session::new(config.mode, config.laps, Arc::clone(&circuit));
    for i in 0..config.ai_count {
        let difficulty = config.ai_difficulty + rng.gen_range(-SKILL_SPREAD..=SKILL_SPREAD);
        let driver_settings = Settings {
            ai_difficulty: difficulty.clamp(0.0, 1.0),
            ..settings.clone()
        };
        let class = match rng.gen_range(0..3) {
            0 => CarClass::Compact,
            1 => CarClass::Sport,
            _ => CarClass::Formula,
        };
        let driver = Contestant::ai(format!("AI {}", i + 1), class, &driver_settings);
        session.add_contestant(driver)?;
    }

    let terrain = Arc::new(
        CorridorTerrain::new(Arc::clone(&circuit), TRACK_HALF_WIDTH).with_walls(WALL_DISTANCE),
    );
    let (mut host, handle) = RaceHost::new(session, terrain);
    if config.mode == SessionMode::Time {
        host = host.with_time_limit(Duration::from_secs(config.time_limit_secs));
    }

    let registry = HostRegistry::new();
    registry.insert(handle.clone());

    let mut run = tokio::spawn(host.run());
    let results = tokio::select! {
        joined = &mut run => joined?,
        _ = shutdown_signal() => {
            handle.offer(NetMessage::new(MessageKind::Stop));
            run.await?
        }
    };
    registry.remove(&handle.id);

    for result in &results {
        info!(
            position = result.position,
            name = %result.name,
            laps = result.laps_completed,
            best = %result.best_lap.map(format_millis).unwrap_or_else(|| "-".to_string()),
            race_time = %result.race_time.map(format_millis).unwrap_or_else(|| "-".to_string()),
            finished = result.finished,
            "Result"
        );
    }
    match serde_json::to_string_pretty(&results) {
        Ok(json) => println!("{json}"),
        Err(e) => warn!(error = %e, "Failed to serialize results"),
    }

    info!(uptime_secs = uptime_secs(), "Race host shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping race");
        }
        _ = terminate => {
            info!("Received terminate signal, stopping race");
        }
    }
}
