//! Per-player contribution (damage) accounting for one event.

use std::collections::{BTreeMap, BTreeSet};

use stormcraft_core::geometry::PlayerId;

/// Accumulated contribution per player.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContributionTracker {
    totals: BTreeMap<PlayerId, f64>,
}

impl ContributionTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `amount` to the player's total. Negative or non-finite amounts
    /// are ignored and `false` is returned.
    pub fn record(&mut self, player: PlayerId, amount: f64) -> bool {
        if !amount.is_finite() || amount < 0.0 {
            return false;
        }
        *self.totals.entry(player).or_insert(0.0) += amount;
        true
    }

    /// The player's total, `0.0` if they never contributed.
    #[must_use]
    pub fn contribution_of(&self, player: PlayerId) -> f64 {
        self.totals.get(&player).copied().unwrap_or(0.0)
    }

    /// Sum over all players.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.totals.values().sum()
    }

    /// The player's share of the total in percent, `0.0` when nothing has
    /// been recorded.
    #[must_use]
    pub fn percentage_of(&self, player: PlayerId) -> f64 {
        let total = self.total();
        if total <= 0.0 {
            return 0.0;
        }
        self.contribution_of(player) * 100.0 / total
    }

    /// Returns true if the player has a positive total.
    #[must_use]
    pub fn has_contributed(&self, player: PlayerId) -> bool {
        self.contribution_of(player) > 0.0
    }

    /// The `limit` largest contributors, largest first.
    #[must_use]
    pub fn top(&self, limit: usize) -> Vec<(PlayerId, f64)> {
        let mut ranked: Vec<(PlayerId, f64)> =
            self.totals.iter().map(|(p, amount)| (*p, *amount)).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(limit);
        ranked
    }

    /// Everyone with a recorded entry.
    #[must_use]
    pub fn contributors(&self) -> BTreeSet<PlayerId> {
        self.totals.keys().copied().collect()
    }

    /// A copy of all totals, ready for a contribution split.
    #[must_use]
    pub fn as_map(&self) -> BTreeMap<PlayerId, f64> {
        self.totals.clone()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    /// Drops every record.
    pub fn clear(&mut self) {
        self.totals.clear();
    }
}
