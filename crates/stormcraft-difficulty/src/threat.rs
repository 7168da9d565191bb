//! Threat model: tier bands and per-tier event-type weight tables.

use std::collections::BTreeMap;

use stormcraft_core::config::{DifficultyConfig, TierBand};
use stormcraft_core::difficulty::ThreatTier;
use stormcraft_core::error::DomainError;
use stormcraft_core::event::EventType;
use stormcraft_core::rng::DeterministicRng;

/// Pure mapping from multiplier to tier, and from tier to event type.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreatModel {
    bands: Vec<(ThreatTier, TierBand)>,
    weights: BTreeMap<ThreatTier, BTreeMap<EventType, u32>>,
    default_type: EventType,
}

impl ThreatModel {
    /// Builds a model from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Configuration` if the bands are not contiguous
    /// from 1.0 or a tier has no weight and no default type is configured.
    pub fn from_config(config: &DifficultyConfig) -> Result<Self, DomainError> {
        config.validate()?;
        let bands = ThreatTier::ALL
            .into_iter()
            .filter_map(|tier| config.tiers.get(&tier).map(|band| (tier, *band)))
            .collect();
        Ok(Self {
            bands,
            weights: config.weights.clone(),
            default_type: config.default_event_type.unwrap_or(EventType::ALL[0]),
        })
    }

    /// The tier whose `[min, max)` band contains `multiplier`.
    ///
    /// Values above every band map to the highest tier; values below every
    /// band (or NaN) map to the lowest.
    #[must_use]
    pub fn tier_of(&self, multiplier: f64) -> ThreatTier {
        if let Some((tier, _)) = self.bands.iter().find(|(_, band)| band.contains(multiplier)) {
            return *tier;
        }
        match self.bands.last() {
            Some((top, band)) if multiplier >= band.max => *top,
            _ => self.bands.first().map_or(ThreatTier::Low, |(tier, _)| *tier),
        }
    }

    /// The configured band of `tier`.
    #[must_use]
    pub fn bounds(&self, tier: ThreatTier) -> Option<TierBand> {
        self.bands
            .iter()
            .find(|(t, _)| *t == tier)
            .map(|(_, band)| *band)
    }

    /// A copy of the weight row for `tier`. Types missing from the row weigh 0.
    #[must_use]
    pub fn weights_for(&self, tier: ThreatTier) -> BTreeMap<EventType, u32> {
        self.weights.get(&tier).cloned().unwrap_or_default()
    }

    /// The type chosen when a tier's weights sum to zero.
    #[must_use]
    pub fn default_event_type(&self) -> EventType {
        self.default_type
    }

    /// Weighted choice of event type for `tier`.
    ///
    /// Draws one integer in `[0, total)` and walks types in declaration order.
    /// An all-zero row returns the default type without drawing.
    pub fn select_event_type(&self, tier: ThreatTier, rng: &mut dyn DeterministicRng) -> EventType {
        let row = self.weights.get(&tier);
        select_weighted(row.into_iter().flatten().map(|(t, w)| (*t, *w)), rng)
            .unwrap_or(self.default_type)
    }
}

/// Weighted choice over `(type, weight)` pairs in the order given.
///
/// Returns `None` when the weights sum to zero; no draw is made in that case.
pub fn select_weighted(
    entries: impl IntoIterator<Item = (EventType, u32)>,
    rng: &mut dyn DeterministicRng,
) -> Option<EventType> {
    let entries: Vec<(EventType, u32)> = entries.into_iter().filter(|(_, w)| *w > 0).collect();
    let total: u64 = entries.iter().map(|(_, w)| u64::from(*w)).sum();
    if total == 0 {
        return None;
    }
    let upper = u32::try_from(total - 1).unwrap_or(u32::MAX);
    let draw = u64::from(rng.next_u32_range(0, upper));

    let mut cumulative = 0u64;
    for (event_type, weight) in &entries {
        cumulative += u64::from(*weight);
        if draw < cumulative {
            return Some(*event_type);
        }
    }
    entries.last().map(|(t, _)| *t)
}
