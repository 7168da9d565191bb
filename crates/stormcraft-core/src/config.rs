//! Engine configuration: every coefficient, band, table, TTL, and interval.
//!
//! Each section defaults independently, so a partial YAML file only needs the
//! values it overrides. Loading always validates.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::difficulty::ThreatTier;
use crate::error::DomainError;
use crate::event::EventType;

/// Root of the configuration tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Spawn-opportunity driver.
    pub scheduler: SchedulerConfig,
    /// Player-density and party caches.
    pub density: DensityConfig,
    /// Difficulty coefficients, tier bands, and weight tables.
    pub difficulty: DifficultyConfig,
    /// Spawn rings around a storm centre.
    pub zones: ZonesConfig,
    /// Per-type event settings.
    pub events: EventsConfig,
    /// Payout settings.
    pub rewards: RewardsConfig,
}

/// Upper bound for every configured interval and cooldown: one year.
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Scheduler tick and spawn-chance settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    pub tick_interval_secs: u64,
    pub global_cooldown_secs: u64,
    pub base_chance: f64,
    pub density_multiplier: f64,
    pub max_chance: f64,
    pub density_radius: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 30,
            global_cooldown_secs: 60,
            base_chance: 0.05,
            density_multiplier: 0.1,
            max_chance: 0.5,
            density_radius: 100.0,
        }
    }
}

/// Density and party cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DensityConfig {
    pub ttl_ms: u64,
    /// Edge length of a spatial bucket; queries in one bucket share an entry.
    pub bucket_size: f64,
    /// Radius used to gather candidate players around a spawn or a player.
    pub scan_radius: f64,
    pub sweep_interval_secs: u64,
}

impl Default for DensityConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 5_000,
            bucket_size: 16.0,
            scan_radius: 50.0,
            sweep_interval_secs: 30,
        }
    }
}

/// Half-open multiplier band `[min, max)` of one tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TierBand {
    pub min: f64,
    pub max: f64,
}

impl TierBand {
    /// Returns true when `value` is in `[min, max)`.
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value < self.max
    }
}

/// Difficulty coefficients and the threat model tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DifficultyConfig {
    pub enabled: bool,
    pub party_bonus_per_member: f64,
    pub max_party_bonus: f64,
    pub proximity_bonus_per_player: f64,
    pub max_proximity_bonus: f64,
    pub wilderness_bonus: f64,
    pub storm_proximity_bonus: f64,
    pub storm_proximity_radius: f64,
    /// Dampening applied to the whole multiplier on claimed land.
    pub town_claim_multiplier: f64,
    pub reward_scaling_factor: f64,
    pub tiers: BTreeMap<ThreatTier, TierBand>,
    pub weights: BTreeMap<ThreatTier, BTreeMap<EventType, u32>>,
    /// Chosen when a tier's weights sum to zero.
    pub default_event_type: Option<EventType>,
}

impl Default for DifficultyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            party_bonus_per_member: 0.3,
            max_party_bonus: 1.5,
            proximity_bonus_per_player: 0.2,
            max_proximity_bonus: 1.0,
            wilderness_bonus: 0.5,
            storm_proximity_bonus: 0.5,
            storm_proximity_radius: 300.0,
            town_claim_multiplier: 0.5,
            reward_scaling_factor: 2.5,
            tiers: default_tiers(),
            weights: default_weights(),
            default_event_type: Some(EventType::StormSurge),
        }
    }
}

fn default_tiers() -> BTreeMap<ThreatTier, TierBand> {
    BTreeMap::from([
        (ThreatTier::Low, TierBand { min: 1.0, max: 1.5 }),
        (ThreatTier::Medium, TierBand { min: 1.5, max: 2.0 }),
        (ThreatTier::High, TierBand { min: 2.0, max: 2.75 }),
        (ThreatTier::Extreme, TierBand { min: 2.75, max: 10.0 }),
    ])
}

fn default_weights() -> BTreeMap<ThreatTier, BTreeMap<EventType, u32>> {
    let row = |weights: [u32; 5]| -> BTreeMap<EventType, u32> {
        EventType::ALL.into_iter().zip(weights).collect()
    };
    BTreeMap::from([
        (ThreatTier::Low, row([60, 10, 30, 0, 0])),
        (ThreatTier::Medium, row([40, 20, 35, 5, 0])),
        (ThreatTier::High, row([20, 35, 30, 10, 5])),
        (ThreatTier::Extreme, row([10, 40, 20, 20, 10])),
    ])
}

/// One concentric spawn ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RingConfig {
    pub name: String,
    /// Selection probability in whole percent.
    pub percent: u32,
    pub min_radius: f64,
    pub max_radius: f64,
}

/// Spawn ring layout, innermost first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ZonesConfig {
    pub rings: Vec<RingConfig>,
}

impl Default for ZonesConfig {
    fn default() -> Self {
        let ring = |name: &str, percent, min_radius, max_radius| RingConfig {
            name: name.to_owned(),
            percent,
            min_radius,
            max_radius,
        };
        Self {
            rings: vec![
                ring("core", 60, 0.0, 50.0),
                ring("periphery", 30, 50.0, 150.0),
                ring("influence", 10, 150.0, 300.0),
            ],
        }
    }
}

/// How a completed event's rewards are split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardMode {
    /// Everyone present gets the same share.
    Equal,
    /// Shares follow recorded contribution (damage).
    Contribution,
}

/// What an objective body counts towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveKind {
    /// Items gathered.
    Collect,
    /// Enemies or bosses defeated.
    Defeat,
    /// Waves survived.
    Survive,
}

/// Objective of an event body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectiveConfig {
    pub kind: ObjectiveKind,
    pub target: u32,
}

/// Settings for one event type.
///
/// Read from YAML as overrides on top of [`EventTypeConfig::default_for`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventTypeConfig {
    pub enabled: bool,
    /// Flat selection weight used when difficulty scaling is disabled.
    pub weight: u32,
    pub min_players: u32,
    pub duration_secs: u32,
    pub cooldown_secs: u64,
    /// Base reward before scaling.
    pub reward: u64,
    pub min_storm_intensity: u8,
    pub reward_mode: RewardMode,
    pub objective: ObjectiveConfig,
}

impl Default for EventTypeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            weight: 10,
            min_players: 1,
            duration_secs: 120,
            cooldown_secs: 300,
            reward: 50,
            min_storm_intensity: 0,
            reward_mode: RewardMode::Equal,
            objective: ObjectiveConfig {
                kind: ObjectiveKind::Collect,
                target: 10,
            },
        }
    }
}

impl EventTypeConfig {
    /// Defaults for a specific event type.
    #[must_use]
    pub fn default_for(event_type: EventType) -> Self {
        let objective = |kind, target| ObjectiveConfig { kind, target };
        let base = Self::default();
        match event_type {
            EventType::StormSurge => base,
            EventType::TempestGuardian => Self {
                reward_mode: RewardMode::Contribution,
                objective: objective(ObjectiveKind::Defeat, 1),
                ..base
            },
            EventType::StormRift => Self {
                objective: objective(ObjectiveKind::Survive, 3),
                ..base
            },
            EventType::StormTitan => Self {
                reward_mode: RewardMode::Contribution,
                objective: objective(ObjectiveKind::Defeat, 1),
                ..base
            },
            EventType::TownSiege => Self {
                objective: objective(ObjectiveKind::Survive, 5),
                ..base
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ObjectiveOverrides {
    kind: Option<ObjectiveKind>,
    target: Option<u32>,
}

/// Fields given for one type in YAML; the rest come from the type's defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct EventTypeOverrides {
    enabled: Option<bool>,
    weight: Option<u32>,
    min_players: Option<u32>,
    duration_secs: Option<u32>,
    cooldown_secs: Option<u64>,
    reward: Option<u64>,
    min_storm_intensity: Option<u8>,
    reward_mode: Option<RewardMode>,
    objective: Option<ObjectiveOverrides>,
}

impl EventTypeOverrides {
    fn apply(self, base: EventTypeConfig) -> EventTypeConfig {
        let objective = self.objective.unwrap_or_default();
        EventTypeConfig {
            enabled: self.enabled.unwrap_or(base.enabled),
            weight: self.weight.unwrap_or(base.weight),
            min_players: self.min_players.unwrap_or(base.min_players),
            duration_secs: self.duration_secs.unwrap_or(base.duration_secs),
            cooldown_secs: self.cooldown_secs.unwrap_or(base.cooldown_secs),
            reward: self.reward.unwrap_or(base.reward),
            min_storm_intensity: self.min_storm_intensity.unwrap_or(base.min_storm_intensity),
            reward_mode: self.reward_mode.unwrap_or(base.reward_mode),
            objective: ObjectiveConfig {
                kind: objective.kind.unwrap_or(base.objective.kind),
                target: objective.target.unwrap_or(base.objective.target),
            },
        }
    }
}

fn deserialize_types<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<EventType, EventTypeConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = BTreeMap::<EventType, EventTypeOverrides>::deserialize(deserializer)?;
    Ok(overrides
        .into_iter()
        .map(|(t, o)| (t, o.apply(EventTypeConfig::default_for(t))))
        .collect())
}

/// Per-type event settings and the event body tick rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EventsConfig {
    pub tick_interval_ms: u64,
    #[serde(deserialize_with = "deserialize_types")]
    pub types: BTreeMap<EventType, EventTypeConfig>,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            types: EventType::ALL
                .into_iter()
                .map(|t| (t, EventTypeConfig::default_for(t)))
                .collect(),
        }
    }
}

impl EventsConfig {
    /// Settings for `event_type`, falling back to its defaults when the file
    /// does not mention it.
    #[must_use]
    pub fn type_config(&self, event_type: EventType) -> EventTypeConfig {
        self.types
            .get(&event_type)
            .cloned()
            .unwrap_or_else(|| EventTypeConfig::default_for(event_type))
    }
}

/// Payout settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RewardsConfig {
    pub party_completion_bonus: f64,
    pub max_party_completion_bonus: f64,
    /// Total pool split by contribution, independent of participant count.
    pub contribution_pool: u64,
    pub min_contribution_percent: f64,
    pub participation_reward: u64,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            party_completion_bonus: 0.1,
            max_party_completion_bonus: 0.5,
            contribution_pool: 1_000,
            min_contribution_percent: 5.0,
            participation_reward: 10,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a YAML document.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Configuration` if the document is malformed or
    /// fails validation.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, DomainError> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| DomainError::Configuration(format!("invalid YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses, and validates a YAML file.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the file cannot be read, or
    /// `DomainError::Configuration` if it is malformed or invalid.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DomainError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            DomainError::Infrastructure(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Checks every invariant the engine relies on.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Configuration` naming the first violated rule.
    pub fn validate(&self) -> Result<(), DomainError> {
        self.validate_scheduler()?;
        self.validate_density()?;
        self.difficulty.validate()?;
        self.zones.validate()?;
        self.validate_events()?;
        self.validate_rewards()
    }

    fn validate_scheduler(&self) -> Result<(), DomainError> {
        let s = &self.scheduler;
        positive_interval("scheduler.tick_interval_secs", s.tick_interval_secs)?;
        at_most_max_secs("scheduler.tick_interval_secs", s.tick_interval_secs)?;
        at_most_max_secs("scheduler.global_cooldown_secs", s.global_cooldown_secs)?;
        non_negative("scheduler.base_chance", s.base_chance)?;
        non_negative("scheduler.density_multiplier", s.density_multiplier)?;
        non_negative("scheduler.density_radius", s.density_radius)?;
        if !(0.0..=1.0).contains(&s.max_chance) {
            return Err(DomainError::Configuration(format!(
                "scheduler.max_chance must be within [0, 1], got {}",
                s.max_chance
            )));
        }
        Ok(())
    }

    fn validate_density(&self) -> Result<(), DomainError> {
        let d = &self.density;
        positive_interval("density.ttl_ms", d.ttl_ms)?;
        positive_interval("density.sweep_interval_secs", d.sweep_interval_secs)?;
        at_most_max_secs("density.ttl_ms", d.ttl_ms / 1_000)?;
        at_most_max_secs("density.sweep_interval_secs", d.sweep_interval_secs)?;
        non_negative("density.scan_radius", d.scan_radius)?;
        non_negative("density.bucket_size", d.bucket_size)?;
        if d.bucket_size == 0.0 {
            return Err(DomainError::Configuration(
                "density.bucket_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    fn validate_events(&self) -> Result<(), DomainError> {
        positive_interval("events.tick_interval_ms", self.events.tick_interval_ms)?;
        at_most_max_secs("events.tick_interval_ms", self.events.tick_interval_ms / 1_000)?;
        for (event_type, config) in &self.events.types {
            at_most_max_secs(
                &format!("events.types.{}.cooldown_secs", event_type.config_key()),
                config.cooldown_secs,
            )?;
        }
        Ok(())
    }

    fn validate_rewards(&self) -> Result<(), DomainError> {
        let r = &self.rewards;
        non_negative("rewards.party_completion_bonus", r.party_completion_bonus)?;
        non_negative(
            "rewards.max_party_completion_bonus",
            r.max_party_completion_bonus,
        )?;
        non_negative("rewards.min_contribution_percent", r.min_contribution_percent)?;
        if r.min_contribution_percent > 100.0 {
            return Err(DomainError::Configuration(format!(
                "rewards.min_contribution_percent must not exceed 100, got {}",
                r.min_contribution_percent
            )));
        }
        Ok(())
    }
}

impl DifficultyConfig {
    /// Checks coefficients, tier bands, and weight tables.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Configuration` naming the first violated rule.
    pub fn validate(&self) -> Result<(), DomainError> {
        for (name, value) in [
            ("party_bonus_per_member", self.party_bonus_per_member),
            ("max_party_bonus", self.max_party_bonus),
            ("proximity_bonus_per_player", self.proximity_bonus_per_player),
            ("max_proximity_bonus", self.max_proximity_bonus),
            ("wilderness_bonus", self.wilderness_bonus),
            ("storm_proximity_bonus", self.storm_proximity_bonus),
            ("storm_proximity_radius", self.storm_proximity_radius),
            ("reward_scaling_factor", self.reward_scaling_factor),
        ] {
            non_negative(&format!("difficulty.{name}"), value)?;
        }

        let dampening = self.town_claim_multiplier;
        if !(dampening > 0.0 && dampening <= 1.0) {
            return Err(DomainError::Configuration(format!(
                "difficulty.town_claim_multiplier must be within (0, 1], got {dampening}"
            )));
        }

        self.validate_tiers()?;
        self.validate_weights()
    }

    fn validate_tiers(&self) -> Result<(), DomainError> {
        let mut expected_min = 1.0;
        for tier in ThreatTier::ALL {
            let band = self.tiers.get(&tier).ok_or_else(|| {
                DomainError::Configuration(format!("difficulty.tiers is missing tier {tier}"))
            })?;
            if !band.min.is_finite() || !band.max.is_finite() {
                return Err(DomainError::Configuration(format!(
                    "tier {tier} has a non-finite bound"
                )));
            }
            if (band.min - expected_min).abs() > f64::EPSILON {
                return Err(DomainError::Configuration(format!(
                    "tier {tier} must start at {expected_min}, got {}",
                    band.min
                )));
            }
            if band.max <= band.min {
                return Err(DomainError::Configuration(format!(
                    "tier {tier} band [{}, {}) is empty or inverted",
                    band.min, band.max
                )));
            }
            expected_min = band.max;
        }
        Ok(())
    }

    fn validate_weights(&self) -> Result<(), DomainError> {
        if self.default_event_type.is_some() {
            return Ok(());
        }
        for tier in ThreatTier::ALL {
            let total: u64 = self
                .weights
                .get(&tier)
                .map(|row| row.values().map(|w| u64::from(*w)).sum())
                .unwrap_or(0);
            if total == 0 {
                return Err(DomainError::Configuration(format!(
                    "weights for tier {tier} sum to zero and no default_event_type is set"
                )));
            }
        }
        Ok(())
    }
}

impl ZonesConfig {
    /// Checks that ring percentages sum to 100 and every band is sane.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Configuration` naming the first violated rule.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.rings.is_empty() {
            return Err(DomainError::Configuration(
                "zones.rings must not be empty".into(),
            ));
        }
        let total: u32 = self.rings.iter().map(|r| r.percent).sum();
        if total != 100 {
            return Err(DomainError::Configuration(format!(
                "zone ring percentages must sum to 100, got {total}"
            )));
        }
        for ring in &self.rings {
            non_negative(&format!("zones.{}.min_radius", ring.name), ring.min_radius)?;
            non_negative(&format!("zones.{}.max_radius", ring.name), ring.max_radius)?;
            if ring.max_radius <= ring.min_radius {
                return Err(DomainError::Configuration(format!(
                    "zone ring {} band [{}, {}) is empty or inverted",
                    ring.name, ring.min_radius, ring.max_radius
                )));
            }
        }
        Ok(())
    }
}

fn non_negative(name: &str, value: f64) -> Result<(), DomainError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(DomainError::Configuration(format!(
            "{name} must be a finite non-negative number, got {value}"
        )))
    }
}

fn positive_interval(name: &str, value: u64) -> Result<(), DomainError> {
    if value == 0 {
        Err(DomainError::Configuration(format!(
            "{name} must be greater than zero"
        )))
    } else {
        Ok(())
    }
}

fn at_most_max_secs(name: &str, secs: u64) -> Result<(), DomainError> {
    if secs > MAX_DURATION_SECS {
        Err(DomainError::Configuration(format!(
            "{name} must not exceed {MAX_DURATION_SECS} seconds, got {secs}"
        )))
    } else {
        Ok(())
    }
}
