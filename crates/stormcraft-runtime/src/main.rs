//! Stormcraft scenario runner.
//!
//! Runs the engine against a static YAML world for a fixed time, then prints
//! per-player threat assessments, scheduler totals, and earned balances as
//! JSON.

use std::collections::BTreeMap;
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use stormcraft_core::clock::SystemClock;
use stormcraft_core::config::EngineConfig;
use stormcraft_core::difficulty::ThreatTier;
use stormcraft_core::rng::SeededRng;
use stormcraft_runtime::{Collaborators, EngineStats, Scenario, ScenarioWorld, StormEngine};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize)]
struct Assessment {
    player: String,
    nearby_players: usize,
    multiplier: f64,
    tier: ThreatTier,
    reward_scaling: f64,
}

#[derive(Debug, Serialize)]
struct Summary {
    assessments: Vec<Assessment>,
    stats: EngineStats,
    events_torn_down: usize,
    balances: BTreeMap<String, u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Read configuration from environment.
    let config = match std::env::var("STORMCRAFT_CONFIG") {
        Ok(path) => EngineConfig::from_path(path)?,
        Err(_) => EngineConfig::default(),
    };
    let scenario_path = std::env::var("STORMCRAFT_SCENARIO")
        .map_err(|_| "STORMCRAFT_SCENARIO environment variable must be set")?;
    let run_secs: u64 = std::env::var("STORMCRAFT_RUN_SECS")
        .unwrap_or_else(|_| "60".to_string())
        .parse()
        .map_err(|e| format!("STORMCRAFT_RUN_SECS must be a whole number of seconds: {e}"))?;

    let scenario = Scenario::from_path(&scenario_path)?;
    let rng = scenario
        .seed
        .map_or_else(SeededRng::from_entropy, SeededRng::from_seed_u64);
    let world = Arc::new(ScenarioWorld::new(scenario));
    let collaborators = Collaborators::new(world.clone(), world.clone())
        .with_parties(world.clone())
        .with_claims(world.clone())
        .with_economy(world.clone());
    let engine = StormEngine::new(
        config,
        collaborators,
        Arc::new(SystemClock),
        Arc::new(Mutex::new(rng)),
    )?;

    let mut assessments = Vec::new();
    for player in world.player_ids() {
        if let Some(a) = engine.difficulty().assess_player(player)? {
            assessments.push(Assessment {
                player: world.name_of(player).unwrap_or_default().to_owned(),
                nearby_players: a.nearby_players,
                multiplier: a.result.multiplier,
                tier: a.result.tier,
                reward_scaling: a.reward_scaling,
            });
        }
    }

    tracing::info!(scenario = %scenario_path, run_secs, "Starting Stormcraft scenario run");
    engine.start()?;
    tokio::select! {
        () = tokio::time::sleep(Duration::from_secs(run_secs)) => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Interrupted, shutting down");
        }
    }
    let events_torn_down = engine.shutdown().await;

    let summary = Summary {
        assessments,
        stats: engine.stats(),
        events_torn_down,
        balances: world.balances_by_name(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
