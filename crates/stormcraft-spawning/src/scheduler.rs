//! Spawn scheduler: one roll per storm per tick.
//!
//! The global cooldown is checked once at the start of a tick. Storms
//! processed later in the same tick do not see a cooldown stamped by an
//! earlier storm's spawn, so one tick may start several events.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use stormcraft_core::body::BodyFactory;
use stormcraft_core::clock::Clock;
use stormcraft_core::config::{EngineConfig, EventsConfig, SchedulerConfig};
use stormcraft_core::difficulty::DifficultyResult;
use stormcraft_core::error::DomainError;
use stormcraft_core::event::{EventDescriptor, EventId, EventType};
use stormcraft_core::geometry::{PlayerId, StormId};
use stormcraft_core::ports::{Storm, StormSource, SurfaceResolver};
use stormcraft_core::rng::DeterministicRng;
use stormcraft_difficulty::DifficultyEngine;
use stormcraft_difficulty::threat::select_weighted;
use stormcraft_events::EventRegistry;
use tracing::{debug, info, instrument, warn};

use crate::zone::SpawnZoneSampler;

/// Scheduler settings swapped as one unit on reload.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub scheduler: SchedulerConfig,
    pub events: EventsConfig,
    pub sampler: SpawnZoneSampler,
}

impl SchedulerSettings {
    /// Extracts the scheduler, per-type, and zone sections.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Configuration` if the ring layout is invalid.
    pub fn from_config(config: &EngineConfig) -> Result<Self, DomainError> {
        Ok(Self {
            scheduler: config.scheduler.clone(),
            events: config.events.clone(),
            sampler: SpawnZoneSampler::from_config(&config.zones)?,
        })
    }
}

/// Result of one storm's spawn attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum SpawnOutcome {
    /// The chance roll missed.
    NoRoll,
    /// The chosen type could not run here; not an error.
    Ineligible(String),
    Spawned(EventId),
    /// A collaborator, the body factory, or the registry refused.
    Failed(String),
}

/// One storm's entry in a [`TickReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StormAttempt {
    pub storm_id: StormId,
    /// Players within the density radius of the storm centre.
    pub density: usize,
    pub chance: f64,
    pub outcome: SpawnOutcome,
}

/// What a scheduler tick did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TickReport {
    /// The global cooldown is still running; no storm was considered.
    CoolingDown { remaining_secs: i64 },
    Attempted { attempts: Vec<StormAttempt> },
}

impl TickReport {
    /// Identifiers of every event started by this tick.
    #[must_use]
    pub fn spawned(&self) -> Vec<EventId> {
        match self {
            TickReport::CoolingDown { .. } => Vec::new(),
            TickReport::Attempted { attempts } => attempts
                .iter()
                .filter_map(|attempt| match attempt.outcome {
                    SpawnOutcome::Spawned(id) => Some(id),
                    _ => None,
                })
                .collect(),
        }
    }
}

enum Rejection {
    Ineligible(String),
    Error(DomainError),
}

impl From<DomainError> for Rejection {
    fn from(e: DomainError) -> Self {
        Rejection::Error(e)
    }
}

/// `min(base + log10(n + 1) × density_multiplier, max_chance)`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn spawn_chance(config: &SchedulerConfig, density: usize) -> f64 {
    let scaled = config.base_chance + ((density + 1) as f64).log10() * config.density_multiplier;
    scaled.min(config.max_chance)
}

/// Rolls spawns around active storms and starts the resulting events.
pub struct Scheduler {
    settings: RwLock<Arc<SchedulerSettings>>,
    difficulty: Arc<DifficultyEngine>,
    registry: Arc<EventRegistry>,
    factory: Arc<dyn BodyFactory>,
    storms: Arc<dyn StormSource>,
    clock: Arc<dyn Clock>,
    rng: Arc<Mutex<dyn DeterministicRng + Send>>,
    surface: Option<Arc<dyn SurfaceResolver>>,
}

impl Scheduler {
    /// Creates a scheduler. The RNG is locked only around individual draws.
    #[must_use]
    pub fn new(
        settings: SchedulerSettings,
        difficulty: Arc<DifficultyEngine>,
        registry: Arc<EventRegistry>,
        factory: Arc<dyn BodyFactory>,
        storms: Arc<dyn StormSource>,
        clock: Arc<dyn Clock>,
        rng: Arc<Mutex<dyn DeterministicRng + Send>>,
    ) -> Self {
        Self {
            settings: RwLock::new(Arc::new(settings)),
            difficulty,
            registry,
            factory,
            storms,
            clock,
            rng,
            surface: None,
        }
    }

    /// Resolves spawn heights through `surface` instead of copying the
    /// storm centre's `y`.
    #[must_use]
    pub fn with_surface(mut self, surface: Arc<dyn SurfaceResolver>) -> Self {
        self.surface = Some(surface);
        self
    }

    #[must_use]
    pub fn settings(&self) -> Arc<SchedulerSettings> {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Atomically replaces the settings; the next tick uses them.
    pub fn reload(&self, settings: SchedulerSettings) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(settings);
    }

    /// Period between ticks.
    #[must_use]
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.settings().scheduler.tick_interval_secs)
    }

    fn rng(&self) -> Result<MutexGuard<'_, dyn DeterministicRng + Send + 'static>, DomainError> {
        self.rng
            .lock()
            .map_err(|e| DomainError::Infrastructure(format!("RNG mutex poisoned: {e}")))
    }

    /// Time left on the global cooldown.
    #[must_use]
    pub fn global_cooldown_remaining(&self) -> Duration {
        self.registry.ledger().global_remaining(
            self.clock.now(),
            self.settings().scheduler.global_cooldown_secs,
        )
    }

    /// Time left on `event_type`'s own cooldown.
    #[must_use]
    pub fn remaining_cooldown(&self, event_type: EventType) -> Duration {
        let cooldown = self.settings().events.type_config(event_type).cooldown_secs;
        self.registry
            .ledger()
            .type_remaining(event_type, self.clock.now(), cooldown)
    }

    /// Runs one scheduling pass over every active storm.
    #[instrument(skip_all)]
    pub fn tick(&self) -> TickReport {
        let settings = self.settings();
        let now = self.clock.now();

        let remaining = self
            .registry
            .ledger()
            .global_remaining(now, settings.scheduler.global_cooldown_secs);
        if remaining > Duration::zero() {
            debug!(remaining_secs = remaining.num_seconds(), "global cooldown active");
            return TickReport::CoolingDown {
                remaining_secs: remaining.num_seconds(),
            };
        }

        let storms = match self.storms.active_storms() {
            Ok(storms) => storms,
            Err(e) => {
                warn!(error = %e, "storm host unavailable, skipping tick");
                return TickReport::Attempted {
                    attempts: Vec::new(),
                };
            }
        };

        let attempts: Vec<StormAttempt> = storms
            .iter()
            .map(|storm| self.attempt(&settings, storm, now))
            .collect();
        debug!(
            storms = attempts.len(),
            spawned = attempts
                .iter()
                .filter(|a| matches!(a.outcome, SpawnOutcome::Spawned(_)))
                .count(),
            "scheduler tick finished"
        );
        TickReport::Attempted { attempts }
    }

    fn attempt(
        &self,
        settings: &SchedulerSettings,
        storm: &Storm,
        now: DateTime<Utc>,
    ) -> StormAttempt {
        let density = self
            .difficulty
            .density()
            .nearby_count(&storm.location, settings.scheduler.density_radius)
            .unwrap_or_else(|e| {
                warn!(storm_id = %storm.id, error = %e, "density query failed, assuming none");
                0
            });
        let chance = spawn_chance(&settings.scheduler, density);
        let attempt = |outcome| StormAttempt {
            storm_id: storm.id,
            density,
            chance,
            outcome,
        };

        let draw = match self.rng().map(|mut rng| rng.next_f64()) {
            Ok(draw) => draw,
            Err(e) => return attempt(SpawnOutcome::Failed(e.to_string())),
        };
        if draw > chance {
            return attempt(SpawnOutcome::NoRoll);
        }

        match self.spawn(settings, storm, None, now) {
            Ok(id) => attempt(SpawnOutcome::Spawned(id)),
            Err(Rejection::Ineligible(reason)) => {
                debug!(storm_id = %storm.id, reason = %reason, "spawn skipped");
                attempt(SpawnOutcome::Ineligible(reason))
            }
            Err(Rejection::Error(e)) => {
                warn!(storm_id = %storm.id, error = %e, "spawn attempt failed");
                attempt(SpawnOutcome::Failed(e.to_string()))
            }
        }
    }

    /// Spawns `event_type` at `storm` without rolling and without waiting
    /// for the global cooldown. The per-type checks still apply.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the storm is not active or the
    /// type is ineligible there, or the underlying error if the storm host,
    /// the body factory, or the registry fails.
    #[instrument(skip(self))]
    pub fn force_spawn(
        &self,
        storm: StormId,
        event_type: EventType,
    ) -> Result<EventId, DomainError> {
        let target = self
            .storms
            .active_storms()?
            .into_iter()
            .find(|s| s.id == storm)
            .ok_or_else(|| DomainError::Validation(format!("storm {storm} is not active")))?;
        let settings = self.settings();
        match self.spawn(&settings, &target, Some(event_type), self.clock.now()) {
            Ok(id) => Ok(id),
            Err(Rejection::Ineligible(reason)) => Err(DomainError::Validation(reason)),
            Err(Rejection::Error(e)) => Err(e),
        }
    }

    fn spawn(
        &self,
        settings: &SchedulerSettings,
        storm: &Storm,
        forced: Option<EventType>,
        now: DateTime<Utc>,
    ) -> Result<EventId, Rejection> {
        let difficulty_settings = self.difficulty.settings();
        let players = self
            .difficulty
            .density()
            .nearby_players(&storm.location, difficulty_settings.scan_radius)
            .unwrap_or_else(|e| {
                warn!(storm_id = %storm.id, error = %e, "player scan failed");
                Vec::new()
            });

        let difficulty: Option<DifficultyResult> =
            difficulty_settings.coefficients.enabled.then(|| {
                self.difficulty
                    .evaluate_excluding(&storm.location, &players, Some(storm.id))
            });

        let event_type = match (forced, &difficulty) {
            (Some(event_type), _) => event_type,
            (None, Some(result)) => {
                let mut rng = self.rng()?;
                self.difficulty.select_event_type(result, &mut *rng)
            }
            (None, None) => self.select_flat(settings, storm, &players, now)?,
        };
        self.check_eligible(settings, event_type, storm, &players, now)?;

        let type_config = settings.events.type_config(event_type);
        let point = {
            let mut rng = self.rng()?;
            match &self.surface {
                Some(surface) => {
                    settings
                        .sampler
                        .sample_with_surface(&storm.location, &mut *rng, surface.as_ref())
                }
                None => settings.sampler.sample(&storm.location, &mut *rng),
            }
        };

        let mut descriptor =
            EventDescriptor::new(event_type, point.location, now, type_config.duration_secs)
                .with_storm(storm.id);
        if let Some(result) = difficulty {
            descriptor = descriptor.with_difficulty(result);
        }
        let body = self.factory.create(&descriptor)?;
        let multiplier = descriptor.multiplier();
        let id = self.registry.start(descriptor, body)?;
        info!(
            event_id = %id,
            event_type = %event_type,
            storm_id = %storm.id,
            ring = %point.ring,
            players = players.len(),
            multiplier,
            "event spawned"
        );
        Ok(id)
    }

    fn select_flat(
        &self,
        settings: &SchedulerSettings,
        storm: &Storm,
        players: &[PlayerId],
        now: DateTime<Utc>,
    ) -> Result<EventType, Rejection> {
        let eligible: Vec<(EventType, u32)> = EventType::ALL
            .iter()
            .filter(|t| self.check_eligible(settings, **t, storm, players, now).is_ok())
            .map(|t| (*t, settings.events.type_config(*t).weight))
            .collect();
        let mut rng = self.rng()?;
        select_weighted(eligible, &mut *rng)
            .ok_or_else(|| Rejection::Ineligible("no eligible event type".into()))
    }

    fn check_eligible(
        &self,
        settings: &SchedulerSettings,
        event_type: EventType,
        storm: &Storm,
        players: &[PlayerId],
        now: DateTime<Utc>,
    ) -> Result<(), Rejection> {
        let config = settings.events.type_config(event_type);
        if !config.enabled {
            return Err(Rejection::Ineligible(format!("{event_type} is disabled")));
        }
        let found = players.len();
        if found < usize::try_from(config.min_players).unwrap_or(usize::MAX) {
            return Err(Rejection::Ineligible(format!(
                "{event_type} needs {} players, found {found}",
                config.min_players
            )));
        }
        let cooling = self
            .registry
            .ledger()
            .type_remaining(event_type, now, config.cooldown_secs);
        if cooling > Duration::zero() {
            return Err(Rejection::Ineligible(format!(
                "{event_type} cooling down for {}s",
                cooling.num_seconds()
            )));
        }
        if storm.intensity < config.min_storm_intensity {
            return Err(Rejection::Ineligible(format!(
                "storm intensity {} below {event_type} minimum {}",
                storm.intensity, config.min_storm_intensity
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("settings", &self.settings())
            .field("has_surface", &self.surface.is_some())
            .finish_non_exhaustive()
    }
}
