//! Engine wiring and background drivers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use stormcraft_core::body::BodyFactory;
use stormcraft_core::clock::Clock;
use stormcraft_core::config::{EngineConfig, MAX_DURATION_SECS};
use stormcraft_core::error::DomainError;
use stormcraft_core::ports::{
    ClaimSource, Economy, PartySource, PlayerSource, StormSource, SurfaceResolver, TeamSource,
};
use stormcraft_core::rng::DeterministicRng;
use stormcraft_difficulty::{DensityCache, DifficultyEngine, DifficultySettings};
use stormcraft_events::{CooldownLedger, EventRegistry, ObjectiveBodyFactory};
use stormcraft_rewards::{RewardEngine, RewardSettings};
use stormcraft_spawning::{Scheduler, SchedulerSettings, SpawnOutcome, TickReport};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Host-world collaborators. Only the player and storm sources are required.
#[derive(Clone)]
pub struct Collaborators {
    pub players: Arc<dyn PlayerSource>,
    pub storms: Arc<dyn StormSource>,
    pub parties: Option<Arc<dyn PartySource>>,
    pub teams: Option<Arc<dyn TeamSource>>,
    pub claims: Option<Arc<dyn ClaimSource>>,
    pub economy: Option<Arc<dyn Economy>>,
    pub surface: Option<Arc<dyn SurfaceResolver>>,
    /// Event bodies; objective bodies from configuration when absent.
    pub bodies: Option<Arc<dyn BodyFactory>>,
}

impl Collaborators {
    #[must_use]
    pub fn new(players: Arc<dyn PlayerSource>, storms: Arc<dyn StormSource>) -> Self {
        Self {
            players,
            storms,
            parties: None,
            teams: None,
            claims: None,
            economy: None,
            surface: None,
            bodies: None,
        }
    }

    #[must_use]
    pub fn with_parties(mut self, parties: Arc<dyn PartySource>) -> Self {
        self.parties = Some(parties);
        self
    }

    #[must_use]
    pub fn with_teams(mut self, teams: Arc<dyn TeamSource>) -> Self {
        self.teams = Some(teams);
        self
    }

    #[must_use]
    pub fn with_claims(mut self, claims: Arc<dyn ClaimSource>) -> Self {
        self.claims = Some(claims);
        self
    }

    #[must_use]
    pub fn with_economy(mut self, economy: Arc<dyn Economy>) -> Self {
        self.economy = Some(economy);
        self
    }

    #[must_use]
    pub fn with_surface(mut self, surface: Arc<dyn SurfaceResolver>) -> Self {
        self.surface = Some(surface);
        self
    }

    #[must_use]
    pub fn with_bodies(mut self, bodies: Arc<dyn BodyFactory>) -> Self {
        self.bodies = Some(bodies);
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("parties", &self.parties.is_some())
            .field("teams", &self.teams.is_some())
            .field("claims", &self.claims.is_some())
            .field("economy", &self.economy.is_some())
            .field("surface", &self.surface.is_some())
            .field("bodies", &self.bodies.is_some())
            .finish_non_exhaustive()
    }
}

/// Running totals of scheduler outcomes since the engine was built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub ticks: u64,
    pub cooling_ticks: u64,
    pub spawned: u64,
    pub no_roll: u64,
    pub ineligible: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    ticks: AtomicU64,
    cooling_ticks: AtomicU64,
    spawned: AtomicU64,
    no_roll: AtomicU64,
    ineligible: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn record(&self, report: &TickReport) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        match report {
            TickReport::CoolingDown { .. } => {
                self.cooling_ticks.fetch_add(1, Ordering::Relaxed);
            }
            TickReport::Attempted { attempts } => {
                for attempt in attempts {
                    let counter = match attempt.outcome {
                        SpawnOutcome::NoRoll => &self.no_roll,
                        SpawnOutcome::Ineligible(_) => &self.ineligible,
                        SpawnOutcome::Spawned(_) => &self.spawned,
                        SpawnOutcome::Failed(_) => &self.failed,
                    };
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    fn snapshot(&self) -> EngineStats {
        EngineStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            cooling_ticks: self.cooling_ticks.load(Ordering::Relaxed),
            spawned: self.spawned.load(Ordering::Relaxed),
            no_roll: self.no_roll.load(Ordering::Relaxed),
            ineligible: self.ineligible.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

fn delayed_interval(period: Duration) -> Interval {
    let period = period.clamp(
        Duration::from_millis(1),
        Duration::from_secs(MAX_DURATION_SECS),
    );
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Runs `work` every `period()`. The period is re-read after each run so a
/// reload takes effect without restarting the driver.
fn spawn_driver<P, W>(handle: &Handle, name: &'static str, period: P, work: W) -> JoinHandle<()>
where
    P: Fn() -> Duration + Send + 'static,
    W: Fn() + Send + 'static,
{
    handle.spawn(async move {
        let mut current = period();
        let mut interval = delayed_interval(current);
        loop {
            interval.tick().await;
            work();
            let next = period();
            if next != current {
                debug!(driver = name, period_ms = next.as_millis(), "driver period changed");
                current = next;
                interval = delayed_interval(current);
            }
        }
    })
}

fn read(config: &RwLock<Arc<EngineConfig>>) -> Arc<EngineConfig> {
    config.read().unwrap_or_else(PoisonError::into_inner).clone()
}

/// The assembled storm-event engine.
pub struct StormEngine {
    config: Arc<RwLock<Arc<EngineConfig>>>,
    cache: Arc<DensityCache>,
    difficulty: Arc<DifficultyEngine>,
    rewards: Arc<RewardEngine>,
    registry: Arc<EventRegistry>,
    scheduler: Arc<Scheduler>,
    objectives: Option<Arc<ObjectiveBodyFactory>>,
    counters: Arc<Counters>,
    drivers: Mutex<Vec<JoinHandle<()>>>,
}

impl StormEngine {
    /// Validates `config` and wires every component. Nothing runs until
    /// [`StormEngine::start`].
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Configuration` if the configuration is invalid.
    pub fn new(
        config: EngineConfig,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
        rng: Arc<Mutex<dyn DeterministicRng + Send>>,
    ) -> Result<Self, DomainError> {
        config.validate()?;

        let mut cache = DensityCache::new(
            collaborators.players.clone(),
            clock.clone(),
            &config.density,
        );
        if let Some(parties) = collaborators.parties {
            cache = cache.with_party_source(parties);
        }
        if let Some(teams) = collaborators.teams {
            cache = cache.with_team_source(teams);
        }
        let cache = Arc::new(cache);

        let mut difficulty = DifficultyEngine::new(
            DifficultySettings::from_config(&config.difficulty, config.density.scan_radius)?,
            cache.clone(),
            collaborators.players,
        )
        .with_storms(collaborators.storms.clone());
        if let Some(claims) = collaborators.claims {
            difficulty = difficulty.with_claims(claims);
        }
        let difficulty = Arc::new(difficulty);

        let mut rewards =
            RewardEngine::new(RewardSettings::from_config(&config), difficulty.clone());
        if let Some(economy) = collaborators.economy {
            rewards = rewards.with_economy(economy);
        }
        let rewards = Arc::new(rewards);

        let registry = EventRegistry::new(
            Arc::new(CooldownLedger::new()),
            clock.clone(),
            Some(rewards.clone()),
            Duration::from_millis(config.events.tick_interval_ms),
        );

        let (factory, objectives) = match collaborators.bodies {
            Some(bodies) => (bodies, None),
            None => {
                let objectives = Arc::new(ObjectiveBodyFactory::new(config.events.clone()));
                let factory: Arc<dyn BodyFactory> = objectives.clone();
                (factory, Some(objectives))
            }
        };

        let mut scheduler = Scheduler::new(
            SchedulerSettings::from_config(&config)?,
            difficulty.clone(),
            registry.clone(),
            factory,
            collaborators.storms,
            clock,
            rng,
        );
        if let Some(surface) = collaborators.surface {
            scheduler = scheduler.with_surface(surface);
        }

        Ok(Self {
            config: Arc::new(RwLock::new(Arc::new(config))),
            cache,
            difficulty,
            rewards,
            registry,
            scheduler: Arc::new(scheduler),
            objectives,
            counters: Arc::new(Counters::default()),
            drivers: Mutex::new(Vec::new()),
        })
    }

    /// The configuration currently in force.
    #[must_use]
    pub fn config(&self) -> Arc<EngineConfig> {
        read(&self.config)
    }

    #[must_use]
    pub fn density(&self) -> &Arc<DensityCache> {
        &self.cache
    }

    #[must_use]
    pub fn difficulty(&self) -> &Arc<DifficultyEngine> {
        &self.difficulty
    }

    #[must_use]
    pub fn rewards(&self) -> &Arc<RewardEngine> {
        &self.rewards
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    #[must_use]
    pub fn stats(&self) -> EngineStats {
        self.counters.snapshot()
    }

    /// Returns true while the drivers are running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self
            .drivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Spawns the scheduler-tick and cache-sweep drivers. Calling it again
    /// while running does nothing.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ShutDown` after `shutdown`, or
    /// `DomainError::Infrastructure` outside a tokio runtime.
    pub fn start(&self) -> Result<(), DomainError> {
        if self.registry.is_shut_down() {
            return Err(DomainError::ShutDown);
        }
        let handle = Handle::try_current()
            .map_err(|e| DomainError::Infrastructure(format!("no tokio runtime: {e}")))?;
        let mut drivers = self.drivers.lock().unwrap_or_else(PoisonError::into_inner);
        if !drivers.is_empty() {
            warn!("storm engine already running");
            return Ok(());
        }

        let scheduler = self.scheduler.clone();
        let period_source = self.scheduler.clone();
        let counters = self.counters.clone();
        drivers.push(spawn_driver(
            &handle,
            "scheduler",
            move || period_source.tick_interval(),
            move || counters.record(&scheduler.tick()),
        ));

        let config = self.config.clone();
        let cache = self.cache.clone();
        drivers.push(spawn_driver(
            &handle,
            "density-sweep",
            move || Duration::from_secs(read(&config).density.sweep_interval_secs),
            move || {
                let removed = cache.sweep();
                if removed > 0 {
                    debug!(removed, "density cache swept");
                }
            },
        ));

        let config = self.config();
        info!(
            tick_interval_secs = config.scheduler.tick_interval_secs,
            sweep_interval_secs = config.density.sweep_interval_secs,
            "storm engine started"
        );
        Ok(())
    }

    /// Validates `config` and swaps it into every component. On error
    /// nothing changes.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Configuration` if the configuration is invalid.
    pub fn reload(&self, config: EngineConfig) -> Result<(), DomainError> {
        config.validate()?;
        let difficulty =
            DifficultySettings::from_config(&config.difficulty, config.density.scan_radius)?;
        let scheduler = SchedulerSettings::from_config(&config)?;

        self.difficulty.reload(difficulty);
        self.cache.reconfigure(&config.density);
        self.rewards.reload(RewardSettings::from_config(&config));
        self.scheduler.reload(scheduler);
        self.registry
            .set_tick_interval(Duration::from_millis(config.events.tick_interval_ms));
        if let Some(objectives) = &self.objectives {
            objectives.reload(config.events.clone());
        }
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
        info!("storm engine configuration reloaded");
        Ok(())
    }

    /// Stops the drivers and waits for them, fails every active event
    /// without rewards, then clears the caches. Returns how many events were
    /// torn down.
    pub async fn shutdown(&self) -> usize {
        let drivers =
            std::mem::take(&mut *self.drivers.lock().unwrap_or_else(PoisonError::into_inner));
        for driver in &drivers {
            driver.abort();
        }
        for driver in drivers {
            if let Err(e) = driver.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "driver task failed");
                }
            }
        }

        let ended = self.registry.shutdown();
        self.cache.clear();
        info!(ended, "storm engine shut down");
        ended
    }
}

impl std::fmt::Debug for StormEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StormEngine")
            .field("registry", &self.registry)
            .field("running", &self.is_running())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stormcraft_core::config::{RingConfig, SchedulerConfig};
    use stormcraft_core::event::EventType;
    use stormcraft_core::geometry::StormId;
    use stormcraft_core::ports::Storm;
    use stormcraft_test_support::{
        ManualClock, RecordingEconomy, SequenceRng, StaticStorms, StaticWorld, location,
    };

    #[tokio::test]
    async fn test_driver_period_is_clamped_to_a_schedulable_range() {
        let huge = delayed_interval(Duration::MAX);
        let zero = delayed_interval(Duration::ZERO);

        assert_eq!(huge.period(), Duration::from_secs(MAX_DURATION_SECS));
        assert_eq!(zero.period(), Duration::from_millis(1));
    }

    fn always_roll() -> EngineConfig {
        EngineConfig {
            scheduler: SchedulerConfig {
                base_chance: 1.0,
                max_chance: 1.0,
                ..SchedulerConfig::default()
            },
            ..EngineConfig::default()
        }
    }

    fn engine(config: EngineConfig, rng: SequenceRng) -> Result<StormEngine, DomainError> {
        let world = Arc::new(StaticWorld::new());
        world.spawn(location(2.0, 64.0, 0.0));
        let storms = Arc::new(StaticStorms::new(vec![Storm {
            id: StormId::new_v4(),
            location: location(0.0, 64.0, 0.0),
            intensity: 50,
        }]));
        let collaborators =
            Collaborators::new(world, storms).with_economy(Arc::new(RecordingEconomy::new()));
        StormEngine::new(
            config,
            collaborators,
            Arc::new(ManualClock::default()),
            Arc::new(Mutex::new(rng)),
        )
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = EngineConfig::default();
        config.zones.rings = vec![RingConfig {
            name: "core".into(),
            percent: 50,
            min_radius: 0.0,
            max_radius: 10.0,
        }];

        match engine(config, SequenceRng::new(vec![])).unwrap_err() {
            DomainError::Configuration(msg) => assert!(msg.contains("sum to 100")),
            other => panic!("expected Configuration, got {other:?}"),
        }
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let engine = engine(EngineConfig::default(), SequenceRng::new(vec![])).unwrap();

        match engine.start().unwrap_err() {
            DomainError::Infrastructure(msg) => assert!(msg.contains("tokio")),
            other => panic!("expected Infrastructure, got {other:?}"),
        }
    }

    #[test]
    fn test_reload_swaps_settings_and_rejects_invalid() {
        // Arrange
        let engine = engine(EngineConfig::default(), SequenceRng::new(vec![])).unwrap();
        let mut next = EngineConfig::default();
        next.scheduler.tick_interval_secs = 7;
        next.density.ttl_ms = 2_000;
        let mut broken = next.clone();
        broken.scheduler.max_chance = 3.0;

        // Act
        engine.reload(next).unwrap();
        let rejected = engine.reload(broken);

        // Assert
        assert!(matches!(rejected, Err(DomainError::Configuration(_))));
        assert_eq!(engine.scheduler().tick_interval(), Duration::from_secs(7));
        assert_eq!(engine.density().ttl_ms(), 2_000);
        assert_eq!(engine.config().scheduler.tick_interval_secs, 7);
    }

    #[tokio::test]
    async fn test_tick_spawns_and_shutdown_tears_down() {
        // Arrange
        // Medium tier row, first draw picks the surge; then the core ring.
        let engine = engine(always_roll(), SequenceRng::new(vec![0, 0])).unwrap();

        // Act
        let report = engine.scheduler().tick();
        let spawned = report.spawned();
        engine.start().unwrap();
        let ended = engine.shutdown().await;

        // Assert
        assert_eq!(spawned.len(), 1);
        let created = engine.registry().ledger().last_spawn(EventType::StormSurge);
        assert!(created.is_some());
        assert_eq!(ended, 1);
        assert!(!engine.is_running());
        assert_eq!(engine.registry().active_count(), 0);
        assert!(matches!(engine.start(), Err(DomainError::ShutDown)));
    }

    #[tokio::test]
    async fn test_start_twice_keeps_one_set_of_drivers() {
        let engine = engine(EngineConfig::default(), SequenceRng::new(vec![])).unwrap();

        engine.start().unwrap();
        engine.start().unwrap();

        assert!(engine.is_running());
        assert_eq!(engine.drivers.lock().unwrap().len(), 2);
        engine.shutdown().await;
    }

    #[test]
    fn test_counters_tally_outcomes() {
        let counters = Counters::default();

        counters.record(&TickReport::CoolingDown { remaining_secs: 3 });
        counters.record(&TickReport::Attempted {
            attempts: vec![stormcraft_spawning::StormAttempt {
                storm_id: StormId::new_v4(),
                density: 0,
                chance: 0.05,
                outcome: SpawnOutcome::NoRoll,
            }],
        });

        let stats = counters.snapshot();
        assert_eq!(stats.ticks, 2);
        assert_eq!(stats.cooling_ticks, 1);
        assert_eq!(stats.no_roll, 1);
        assert_eq!(stats.spawned, 0);
    }
}
