//! Threat tiers and the immutable result of a difficulty evaluation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Discrete difficulty band derived from a continuous multiplier.
///
/// Ordered `Low < Medium < High < Extreme`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatTier {
    /// Baseline threat.
    Low,
    /// Noticeably elevated threat.
    Medium,
    /// Dangerous; boss events become likely.
    High,
    /// The most dangerous band.
    Extreme,
}

impl ThreatTier {
    /// Every tier, lowest first.
    pub const ALL: [ThreatTier; 4] = [
        ThreatTier::Low,
        ThreatTier::Medium,
        ThreatTier::High,
        ThreatTier::Extreme,
    ];

    /// Returns true when this tier is `other` or higher.
    #[must_use]
    pub fn is_at_least(self, other: ThreatTier) -> bool {
        self >= other
    }

    /// The configuration key for this tier.
    #[must_use]
    pub fn config_key(self) -> &'static str {
        match self {
            ThreatTier::Low => "low",
            ThreatTier::Medium => "medium",
            ThreatTier::High => "high",
            ThreatTier::Extreme => "extreme",
        }
    }
}

impl fmt::Display for ThreatTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_key())
    }
}

/// The additive components that made up a multiplier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentBonuses {
    /// Bonus for party members among the nearby players.
    pub party: f64,
    /// Bonus for non-party players nearby.
    pub proximity: f64,
    /// Bonus for unclaimed land.
    pub wilderness: f64,
    /// Bonus for being near another active storm.
    pub storm: f64,
}

impl ComponentBonuses {
    /// Sum of all components.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.party + self.proximity + self.wilderness + self.storm
    }
}

/// Result of one difficulty evaluation. Computed fresh per query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultyResult {
    /// Final multiplier after dampening. Never negative.
    pub multiplier: f64,
    /// Tier derived from `multiplier`.
    pub tier: ThreatTier,
    /// Number of candidate players considered.
    pub player_count: usize,
    /// Party members of the primary player among the candidates.
    pub party_count: usize,
    /// Candidates outside the primary player's party.
    pub proximity_count: usize,
    /// Whether the location is unclaimed.
    pub in_wilderness: bool,
    /// Whether another storm is within range.
    pub near_storm: bool,
    /// Breakdown of the additive bonuses.
    pub bonuses: ComponentBonuses,
}

impl DifficultyResult {
    /// The result used when nobody is around: multiplier `1.0`, no bonuses.
    #[must_use]
    pub fn neutral(tier: ThreatTier) -> Self {
        Self {
            multiplier: 1.0,
            tier,
            player_count: 0,
            party_count: 0,
            proximity_count: 0,
            in_wilderness: false,
            near_storm: false,
            bonuses: ComponentBonuses::default(),
        }
    }
}
