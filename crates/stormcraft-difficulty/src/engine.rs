//! Difficulty engine: turns density, party, claim, and storm context into a
//! multiplier, a tier, and an event-type choice.

use std::sync::{Arc, PoisonError, RwLock};

use stormcraft_core::config::DifficultyConfig;
use stormcraft_core::difficulty::{ComponentBonuses, DifficultyResult};
use stormcraft_core::error::DomainError;
use stormcraft_core::event::EventType;
use stormcraft_core::geometry::{Location, PlayerId, StormId};
use stormcraft_core::ports::{ClaimSource, PlayerSource, StormSource};
use stormcraft_core::rng::DeterministicRng;
use tracing::{debug, instrument, warn};

use crate::density::DensityCache;
use crate::threat::ThreatModel;

/// One consistent set of coefficients and the threat model built from them.
#[derive(Debug, Clone)]
pub struct DifficultySettings {
    /// Bonus coefficients, caps, and tables.
    pub coefficients: DifficultyConfig,
    /// Radius used to gather players around an assessed player.
    pub scan_radius: f64,
    model: ThreatModel,
}

impl DifficultySettings {
    /// Validates `coefficients` and builds the threat model.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Configuration` if the coefficients are invalid.
    pub fn from_config(
        coefficients: &DifficultyConfig,
        scan_radius: f64,
    ) -> Result<Self, DomainError> {
        let model = ThreatModel::from_config(coefficients)?;
        Ok(Self {
            coefficients: coefficients.clone(),
            scan_radius,
            model,
        })
    }

    /// The threat model for these coefficients.
    #[must_use]
    pub fn model(&self) -> &ThreatModel {
        &self.model
    }
}

/// Threat read-out at a player's position.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerAssessment {
    pub player: PlayerId,
    pub location: Location,
    /// Players within the scan radius, the assessed player included.
    pub nearby_players: usize,
    pub result: DifficultyResult,
    pub reward_scaling: f64,
}

/// `1 + (multiplier - 1) × factor`. Exactly `1.0` at a multiplier of `1.0`.
#[must_use]
pub fn reward_scaling(multiplier: f64, factor: f64) -> f64 {
    1.0 + (multiplier - 1.0) * factor
}

/// Computes difficulty multipliers. Coefficients can be swapped at runtime.
pub struct DifficultyEngine {
    settings: RwLock<Arc<DifficultySettings>>,
    density: Arc<DensityCache>,
    players: Arc<dyn PlayerSource>,
    claims: Option<Arc<dyn ClaimSource>>,
    storms: Option<Arc<dyn StormSource>>,
}

impl DifficultyEngine {
    /// Creates an engine. Without a claim source every location counts as
    /// wilderness; without a storm source nothing is near a storm.
    #[must_use]
    pub fn new(
        settings: DifficultySettings,
        density: Arc<DensityCache>,
        players: Arc<dyn PlayerSource>,
    ) -> Self {
        Self {
            settings: RwLock::new(Arc::new(settings)),
            density,
            players,
            claims: None,
            storms: None,
        }
    }

    /// Attaches a land-claim lookup.
    #[must_use]
    pub fn with_claims(mut self, claims: Arc<dyn ClaimSource>) -> Self {
        self.claims = Some(claims);
        self
    }

    /// Attaches the storm host for the near-storm bonus.
    #[must_use]
    pub fn with_storms(mut self, storms: Arc<dyn StormSource>) -> Self {
        self.storms = Some(storms);
        self
    }

    /// A snapshot of the active settings.
    #[must_use]
    pub fn settings(&self) -> Arc<DifficultySettings> {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Atomically replaces the active settings. Evaluations already running
    /// finish with the set they started with.
    pub fn reload(&self, settings: DifficultySettings) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(settings);
    }

    /// The density cache this engine reads through.
    #[must_use]
    pub fn density(&self) -> &Arc<DensityCache> {
        &self.density
    }

    /// Difficulty at `location` for the given nearby players.
    #[must_use]
    pub fn evaluate(&self, location: &Location, candidates: &[PlayerId]) -> DifficultyResult {
        self.evaluate_excluding(location, candidates, None)
    }

    /// Like [`DifficultyEngine::evaluate`], but the storm `exclude` never
    /// counts as nearby. Used so a storm does not boost its own spawns.
    #[must_use]
    pub fn evaluate_excluding(
        &self,
        location: &Location,
        candidates: &[PlayerId],
        exclude: Option<StormId>,
    ) -> DifficultyResult {
        let settings = self.settings();
        let c = &settings.coefficients;

        if candidates.is_empty() {
            return DifficultyResult::neutral(settings.model.tier_of(1.0));
        }

        let primary = self.primary_player(location, candidates);
        let others = candidates.iter().filter(|p| **p != primary).count();
        let (party_count, proximity_count) = match (
            self.density.party_member_count(primary, candidates),
            self.density.non_party_count(primary, candidates),
        ) {
            (Ok(party), Ok(non_party)) => (party, non_party),
            (Err(e), _) | (_, Err(e)) => {
                warn!(player = %primary, error = %e, "party lookup failed, assuming no party");
                (0, others)
            }
        };

        let in_wilderness = self.is_wilderness(location);
        let near_storm = self.is_near_storm(location, c.storm_proximity_radius, exclude);

        #[allow(clippy::cast_precision_loss)]
        let bonuses = ComponentBonuses {
            party: (party_count as f64 * c.party_bonus_per_member).min(c.max_party_bonus),
            proximity: (proximity_count as f64 * c.proximity_bonus_per_player)
                .min(c.max_proximity_bonus),
            wilderness: if in_wilderness { c.wilderness_bonus } else { 0.0 },
            storm: if near_storm { c.storm_proximity_bonus } else { 0.0 },
        };

        let mut multiplier = 1.0 + bonuses.total();
        if !in_wilderness {
            multiplier *= c.town_claim_multiplier;
        }
        let multiplier = multiplier.max(0.0);
        let tier = settings.model.tier_of(multiplier);

        debug!(
            %location,
            multiplier,
            %tier,
            party_count,
            proximity_count,
            in_wilderness,
            near_storm,
            "evaluated difficulty"
        );

        DifficultyResult {
            multiplier,
            tier,
            player_count: candidates.len(),
            party_count,
            proximity_count,
            in_wilderness,
            near_storm,
            bonuses,
        }
    }

    /// The candidate nearest to `location`; ties go to the earliest. Players
    /// whose position cannot be read count as infinitely far.
    fn primary_player(&self, location: &Location, candidates: &[PlayerId]) -> PlayerId {
        let mut best = candidates[0];
        let mut best_distance = f64::INFINITY;
        for candidate in candidates {
            let distance = match self.players.current_location(*candidate) {
                Ok(Some(at)) => at.distance(location).unwrap_or(f64::INFINITY),
                Ok(None) => f64::INFINITY,
                Err(e) => {
                    warn!(player = %candidate, error = %e, "location lookup failed");
                    f64::INFINITY
                }
            };
            if distance < best_distance {
                best = *candidate;
                best_distance = distance;
            }
        }
        best
    }

    fn is_wilderness(&self, location: &Location) -> bool {
        let Some(claims) = &self.claims else {
            return true;
        };
        claims.is_wilderness(location).unwrap_or_else(|e| {
            warn!(%location, error = %e, "claim lookup failed, assuming wilderness");
            true
        })
    }

    fn is_near_storm(&self, location: &Location, radius: f64, exclude: Option<StormId>) -> bool {
        let Some(storms) = &self.storms else {
            return false;
        };
        match storms.active_storms() {
            Ok(storms) => storms
                .iter()
                .filter(|storm| Some(storm.id) != exclude)
                .any(|storm| storm.location.is_within(location, radius)),
            Err(e) => {
                warn!(%location, error = %e, "storm lookup failed, assuming no storm nearby");
                false
            }
        }
    }

    /// Weighted event-type choice for the result's tier.
    pub fn select_event_type(
        &self,
        result: &DifficultyResult,
        rng: &mut dyn DeterministicRng,
    ) -> EventType {
        self.settings().model.select_event_type(result.tier, rng)
    }

    /// Reward scaling for `multiplier` under the active scaling factor.
    #[must_use]
    pub fn reward_scaling(&self, multiplier: f64) -> f64 {
        reward_scaling(multiplier, self.settings().coefficients.reward_scaling_factor)
    }

    /// Threat read-out at a player's current position, using the scan radius.
    /// Returns `None` when the player is offline.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Collaborator` if the player's location or the
    /// players around them cannot be read.
    #[instrument(skip_all, fields(player = %player))]
    pub fn assess_player(
        &self,
        player: PlayerId,
    ) -> Result<Option<PlayerAssessment>, DomainError> {
        let Some(location) = self.players.current_location(player)? else {
            return Ok(None);
        };
        let scan_radius = self.settings().scan_radius;
        let nearby = self.density.nearby_players(&location, scan_radius)?;
        let result = self.evaluate(&location, &nearby);
        let reward_scaling = self.reward_scaling(result.multiplier);
        Ok(Some(PlayerAssessment {
            player,
            location,
            nearby_players: nearby.len(),
            result,
            reward_scaling,
        }))
    }
}

impl std::fmt::Debug for DifficultyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DifficultyEngine")
            .field("settings", &self.settings())
            .field("has_claims", &self.claims.is_some())
            .field("has_storms", &self.storms.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stormcraft_core::config::DensityConfig;
    use stormcraft_core::difficulty::ThreatTier;
    use stormcraft_core::geometry::WorldId;
    use stormcraft_core::ports::Storm;
    use stormcraft_test_support::{
        FailingPlayerSource, ManualClock, MockRng, StaticClaims, StaticPartySource, StaticStorms,
        StaticWorld, location,
    };

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    fn settings() -> DifficultySettings {
        DifficultySettings::from_config(&DifficultyConfig::default(), 50.0).unwrap()
    }

    fn engine_with(world: &Arc<StaticWorld>, parties: StaticPartySource) -> DifficultyEngine {
        let density = DensityCache::new(
            world.clone(),
            Arc::new(ManualClock::default()),
            &DensityConfig::default(),
        )
        .with_party_source(Arc::new(parties));
        DifficultyEngine::new(settings(), Arc::new(density), world.clone())
    }

    fn storm_at(at: Location) -> Storm {
        Storm {
            id: StormId::new_v4(),
            location: at,
            intensity: 50,
        }
    }

    #[test]
    fn test_no_candidates_is_neutral() {
        let world = Arc::new(StaticWorld::new());
        let engine = engine_with(&world, StaticPartySource::default());

        let result = engine.evaluate(&location(0.0, 64.0, 0.0), &[]);

        assert_close(result.multiplier, 1.0);
        assert_eq!(result.tier, ThreatTier::Low);
        assert_eq!(result.party_count, 0);
        assert_eq!(result.proximity_count, 0);
    }

    #[test]
    fn test_party_of_two_with_three_strangers_in_wilderness_is_high() {
        // Arrange
        let world = Arc::new(StaticWorld::new());
        let primary = world.spawn(location(1.0, 64.0, 0.0));
        let friend_a = world.spawn(location(5.0, 64.0, 0.0));
        let friend_b = world.spawn(location(6.0, 64.0, 0.0));
        let strangers: Vec<PlayerId> = (0..3)
            .map(|i| world.spawn(location(10.0 + f64::from(i), 64.0, 0.0)))
            .collect();
        let parties = StaticPartySource::new(&[vec![primary, friend_a, friend_b]]);
        let engine = engine_with(&world, parties).with_claims(Arc::new(StaticClaims::wilderness()));
        let mut candidates = vec![primary, friend_a, friend_b];
        candidates.extend(&strangers);

        // Act
        let result = engine.evaluate(&location(0.0, 64.0, 0.0), &candidates);

        // Assert
        assert_eq!(result.party_count, 2);
        assert_eq!(result.proximity_count, 3);
        assert_close(result.bonuses.party, 0.6);
        assert_close(result.bonuses.proximity, 0.6);
        assert_close(result.bonuses.wilderness, 0.5);
        assert_close(result.bonuses.storm, 0.0);
        assert_close(result.multiplier, 2.7);
        assert_eq!(result.tier, ThreatTier::High);
    }

    #[test]
    fn test_bonuses_are_capped() {
        let world = Arc::new(StaticWorld::new());
        let members: Vec<PlayerId> = (0..12)
            .map(|i| world.spawn(location(f64::from(i), 64.0, 0.0)))
            .collect();
        let strangers: Vec<PlayerId> = (0..8)
            .map(|i| world.spawn(location(f64::from(i), 64.0, 5.0)))
            .collect();
        let engine = engine_with(&world, StaticPartySource::new(&[members.clone()]));
        let mut candidates = members;
        candidates.extend(strangers);

        let result = engine.evaluate(&location(0.0, 64.0, 0.0), &candidates);

        assert_close(result.bonuses.party, 1.5);
        assert_close(result.bonuses.proximity, 1.0);
        assert_close(result.multiplier, 1.0 + 1.5 + 1.0 + 0.5);
        assert_eq!(result.tier, ThreatTier::Extreme);
    }

    #[test]
    fn test_town_dampening_applies_after_bonuses() {
        // Arrange
        let world = Arc::new(StaticWorld::new());
        let primary = world.spawn(location(0.0, 64.0, 0.0));
        let stranger = world.spawn(location(3.0, 64.0, 0.0));
        let engine = engine_with(&world, StaticPartySource::default())
            .with_claims(Arc::new(StaticClaims::claimed()));

        // Act
        let result = engine.evaluate(&location(0.0, 64.0, 0.0), &[primary, stranger]);

        // Assert
        assert!(!result.in_wilderness);
        assert_close(result.bonuses.wilderness, 0.0);
        assert_close(result.multiplier, (1.0 + 0.2) * 0.5);
        assert_eq!(result.tier, ThreatTier::Low);
    }

    #[test]
    fn test_primary_is_nearest_candidate() {
        // Arrange
        let world = Arc::new(StaticWorld::new());
        let far = world.spawn(location(40.0, 64.0, 0.0));
        let near = world.spawn(location(1.0, 64.0, 0.0));
        let far_friend = world.spawn(location(41.0, 64.0, 0.0));
        let engine = engine_with(&world, StaticPartySource::new(&[vec![far, far_friend]]));

        // Act
        let result = engine.evaluate(&location(0.0, 64.0, 0.0), &[far, near, far_friend]);

        // Assert: the nearest player has no party, so everyone else is a stranger.
        assert_eq!(result.party_count, 0);
        assert_eq!(result.proximity_count, 2);
    }

    #[test]
    fn test_primary_tie_goes_to_first_candidate() {
        let world = Arc::new(StaticWorld::new());
        let first = world.spawn(location(5.0, 64.0, 0.0));
        let second = world.spawn(location(-5.0, 64.0, 0.0));
        let friend = world.spawn(location(0.0, 64.0, 30.0));
        let engine = engine_with(&world, StaticPartySource::new(&[vec![first, friend]]));

        let result = engine.evaluate(&location(0.0, 64.0, 0.0), &[first, second, friend]);

        assert_eq!(result.party_count, 1);
        assert_eq!(result.proximity_count, 1);
    }

    #[test]
    fn test_near_storm_excludes_spawning_storm_and_other_worlds() {
        // Arrange
        let world = Arc::new(StaticWorld::new());
        let player = world.spawn(location(0.0, 64.0, 0.0));
        let own = storm_at(location(10.0, 64.0, 10.0));
        let nether = storm_at(Location::new(WorldId::new("nether"), 0.0, 64.0, 0.0));
        let storms = Arc::new(StaticStorms::new(vec![own.clone(), nether]));
        let engine = engine_with(&world, StaticPartySource::default()).with_storms(storms);
        let here = location(0.0, 64.0, 0.0);

        // Act
        let including = engine.evaluate(&here, &[player]);
        let excluding = engine.evaluate_excluding(&here, &[player], Some(own.id));

        // Assert
        assert!(including.near_storm);
        assert_close(including.bonuses.storm, 0.5);
        assert!(!excluding.near_storm);
        assert_close(excluding.multiplier, 1.5);
    }

    #[test]
    fn test_storm_beyond_radius_is_not_near() {
        let world = Arc::new(StaticWorld::new());
        let player = world.spawn(location(0.0, 64.0, 0.0));
        let storms = Arc::new(StaticStorms::new(vec![storm_at(location(301.0, 64.0, 0.0))]));
        let engine = engine_with(&world, StaticPartySource::default()).with_storms(storms);

        let result = engine.evaluate(&location(0.0, 64.0, 0.0), &[player]);

        assert!(!result.near_storm);
    }

    #[test]
    fn test_collaborator_failures_degrade() {
        // Arrange
        let world = Arc::new(StaticWorld::new());
        let primary = world.spawn(location(0.0, 64.0, 0.0));
        let other = world.spawn(location(2.0, 64.0, 0.0));
        let engine = engine_with(&world, StaticPartySource::failing())
            .with_claims(Arc::new(StaticClaims::failing()))
            .with_storms(Arc::new(StaticStorms::failing()));

        // Act
        let result = engine.evaluate(&location(0.0, 64.0, 0.0), &[primary, other]);

        // Assert: no party, wilderness, no storm.
        assert_eq!(result.party_count, 0);
        assert_eq!(result.proximity_count, 1);
        assert!(result.in_wilderness);
        assert!(!result.near_storm);
        assert_close(result.multiplier, 1.0 + 0.2 + 0.5);
    }

    #[test]
    fn test_location_failure_treats_candidates_as_far() {
        let world = Arc::new(StaticWorld::new());
        let density = DensityCache::new(
            world.clone(),
            Arc::new(ManualClock::default()),
            &DensityConfig::default(),
        );
        let engine =
            DifficultyEngine::new(settings(), Arc::new(density), Arc::new(FailingPlayerSource));
        let a = PlayerId::new_v4();
        let b = PlayerId::new_v4();

        let result = engine.evaluate(&location(0.0, 64.0, 0.0), &[a, b]);

        assert_eq!(result.player_count, 2);
        assert_eq!(result.proximity_count, 1);
    }

    #[test]
    fn test_reload_swaps_coefficients_atomically() {
        // Arrange
        let world = Arc::new(StaticWorld::new());
        let player = world.spawn(location(0.0, 64.0, 0.0));
        let engine = engine_with(&world, StaticPartySource::default());
        let before = engine.settings();
        let mut coefficients = DifficultyConfig::default();
        coefficients.wilderness_bonus = 1.25;

        // Act
        engine.reload(DifficultySettings::from_config(&coefficients, 50.0).unwrap());
        let result = engine.evaluate(&location(0.0, 64.0, 0.0), &[player]);

        // Assert
        assert_close(before.coefficients.wilderness_bonus, 0.5);
        assert_close(result.multiplier, 2.25);
        assert_eq!(result.tier, ThreatTier::High);
    }

    #[test]
    fn test_reward_scaling_is_identity_at_one() {
        assert!((reward_scaling(1.0, 2.5) - 1.0).abs() < f64::EPSILON);
        assert!((reward_scaling(1.0, 0.0) - 1.0).abs() < f64::EPSILON);
        assert_close(reward_scaling(2.7, 2.5), 5.25);
    }

    #[test]
    fn test_reward_scaling_is_monotonic() {
        for factor in [0.0, 0.5, 1.0, 2.5, 10.0] {
            let mut previous = f64::NEG_INFINITY;
            for step in 0..400 {
                let value = reward_scaling(0.5 + f64::from(step) * 0.025, factor);
                assert!(value >= previous, "not monotonic at factor {factor}");
                previous = value;
            }
        }
    }

    #[test]
    fn test_select_event_type_uses_result_tier() {
        let world = Arc::new(StaticWorld::new());
        let engine = engine_with(&world, StaticPartySource::default());
        let result = DifficultyResult::neutral(ThreatTier::Extreme);

        // Extreme row starts with storm_surge at weight 10; the lowest draw picks it.
        assert_eq!(
            engine.select_event_type(&result, &mut MockRng),
            EventType::StormSurge
        );
    }

    #[test]
    fn test_assess_player_reads_current_position() {
        // Arrange
        let world = Arc::new(StaticWorld::new());
        let player = world.spawn(location(0.0, 64.0, 0.0));
        world.spawn(location(20.0, 64.0, 0.0));
        world.spawn(location(500.0, 64.0, 0.0));
        let engine = engine_with(&world, StaticPartySource::default());

        // Act
        let assessment = engine.assess_player(player).unwrap().unwrap();

        // Assert
        assert_eq!(assessment.nearby_players, 2);
        assert_close(assessment.result.multiplier, 1.0 + 0.2 + 0.5);
        assert_close(assessment.reward_scaling, 1.0 + 0.7 * 2.5);
    }

    #[test]
    fn test_assess_offline_player_is_none() {
        let world = Arc::new(StaticWorld::new());
        let player = world.spawn(location(0.0, 64.0, 0.0));
        world.disconnect(player);
        let engine = engine_with(&world, StaticPartySource::default());

        assert!(engine.assess_player(player).unwrap().is_none());
    }
}
