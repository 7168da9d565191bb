//! Reward engine: equal split, contribution split, and payout.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use stormcraft_core::config::{EngineConfig, EventsConfig, RewardMode, RewardsConfig};
use stormcraft_core::error::DomainError;
use stormcraft_core::event::EventDescriptor;
use stormcraft_core::geometry::PlayerId;
use stormcraft_core::ports::Economy;
use stormcraft_difficulty::DifficultyEngine;
use tracing::{debug, info, warn};

/// Payout settings plus the per-type base rewards and modes.
#[derive(Debug, Clone, PartialEq)]
pub struct RewardSettings {
    pub rewards: RewardsConfig,
    pub events: EventsConfig,
}

impl RewardSettings {
    /// Extracts the reward-relevant sections of a validated configuration.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            rewards: config.rewards.clone(),
            events: config.events.clone(),
        }
    }
}

impl Default for RewardSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Outcome of depositing a batch of payouts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PayoutReport {
    /// Deposits the economy accepted.
    pub paid: BTreeMap<PlayerId, u64>,
    /// Deposits that failed, with the reason.
    pub failed: BTreeMap<PlayerId, String>,
}

impl PayoutReport {
    /// Sum of accepted deposits.
    #[must_use]
    pub fn total_paid(&self) -> u64 {
        self.paid.values().sum()
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn at_least_one(amount: f64) -> u64 {
    if amount.is_finite() && amount >= 1.0 {
        amount as u64
    } else {
        1
    }
}

/// Computes and pays rewards.
pub struct RewardEngine {
    settings: RwLock<Arc<RewardSettings>>,
    difficulty: Arc<DifficultyEngine>,
    economy: Option<Arc<dyn Economy>>,
}

impl RewardEngine {
    /// Creates an engine that scales rewards with `difficulty`'s scaling
    /// factor. Without an economy, payouts are computed but never delivered.
    #[must_use]
    pub fn new(settings: RewardSettings, difficulty: Arc<DifficultyEngine>) -> Self {
        Self {
            settings: RwLock::new(Arc::new(settings)),
            difficulty,
            economy: None,
        }
    }

    /// Attaches the economy that receives deposits.
    #[must_use]
    pub fn with_economy(mut self, economy: Arc<dyn Economy>) -> Self {
        self.economy = Some(economy);
        self
    }

    fn settings(&self) -> Arc<RewardSettings> {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Atomically replaces the payout settings.
    pub fn reload(&self, settings: RewardSettings) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(settings);
    }

    /// Flat amount for taking part without qualifying for a share.
    #[must_use]
    pub fn participation_reward(&self) -> u64 {
        self.settings().rewards.participation_reward
    }

    /// Splits the type's scaled base reward, plus a party bonus, equally.
    ///
    /// Each player receives `round(total / n)`, never less than 1. No
    /// participants yields an empty map.
    ///
    /// Scaling is not clamped: on claimed land a multiplier far enough below
    /// 1 makes it zero or negative, and every share falls to the 1-unit floor.
    #[must_use]
    pub fn distribute_equal(
        &self,
        descriptor: &EventDescriptor,
        participants: &BTreeSet<PlayerId>,
    ) -> BTreeMap<PlayerId, u64> {
        if participants.is_empty() {
            return BTreeMap::new();
        }
        let settings = self.settings();
        let r = &settings.rewards;

        #[allow(clippy::cast_precision_loss)]
        let n = participants.len() as f64;
        #[allow(clippy::cast_precision_loss)]
        let base = settings.events.type_config(descriptor.event_type).reward as f64;
        let scaling = self.difficulty.reward_scaling(descriptor.multiplier());
        let party_bonus = (n * r.party_completion_bonus).min(r.max_party_completion_bonus);
        let total = base * scaling * (1.0 + party_bonus);
        let amount = at_least_one((total / n).round());

        debug!(
            event_id = %descriptor.id,
            scaling,
            party_bonus,
            total,
            amount,
            "equal reward split"
        );
        participants.iter().map(|p| (*p, amount)).collect()
    }

    /// Splits the scaled contribution pool by share of total contribution.
    ///
    /// Contributors below the minimum percentage get no entry; those at or
    /// above it get `floor(pool × scaling × share / total)`, never less than
    /// 1. A non-positive total yields an empty map. As with the equal split,
    /// a non-positive scaling leaves every qualifying share at 1.
    #[must_use]
    pub fn distribute_by_contribution(
        &self,
        descriptor: &EventDescriptor,
        contributions: &BTreeMap<PlayerId, f64>,
    ) -> BTreeMap<PlayerId, u64> {
        let total_share: f64 = contributions
            .values()
            .filter(|share| share.is_finite() && **share > 0.0)
            .sum();
        if total_share <= 0.0 {
            return BTreeMap::new();
        }
        let settings = self.settings();
        let r = &settings.rewards;

        #[allow(clippy::cast_precision_loss)]
        let pool = r.contribution_pool as f64;
        let scaled_pool = pool * self.difficulty.reward_scaling(descriptor.multiplier());

        contributions
            .iter()
            .filter(|(_, share)| share.is_finite() && **share > 0.0)
            .filter(|(_, share)| **share * 100.0 / total_share >= r.min_contribution_percent)
            .map(|(player, share)| {
                let amount = at_least_one((scaled_pool * (*share / total_share)).floor());
                (*player, amount)
            })
            .collect()
    }

    /// Payouts for a completed event, following its type's reward mode.
    ///
    /// Contribution mode falls back to an equal split when nothing was
    /// recorded. Participants who joined but did not qualify for a
    /// contribution share receive the participation reward.
    #[must_use]
    pub fn distribute(
        &self,
        descriptor: &EventDescriptor,
        participants: &BTreeSet<PlayerId>,
        contributions: &BTreeMap<PlayerId, f64>,
    ) -> BTreeMap<PlayerId, u64> {
        let mode = self
            .settings()
            .events
            .type_config(descriptor.event_type)
            .reward_mode;
        if mode == RewardMode::Equal || contributions.is_empty() {
            return self.distribute_equal(descriptor, participants);
        }

        let mut payouts = self.distribute_by_contribution(descriptor, contributions);
        let participation = self.participation_reward();
        if participation > 0 {
            for player in participants {
                payouts.entry(*player).or_insert(participation);
            }
        }
        payouts
    }

    /// Deposits every payout. A failed deposit is logged and reported but
    /// never stops the rest of the batch.
    pub fn pay(&self, payouts: &BTreeMap<PlayerId, u64>) -> PayoutReport {
        let mut report = PayoutReport::default();
        let Some(economy) = &self.economy else {
            for player in payouts.keys() {
                report
                    .failed
                    .insert(*player, "no economy configured".to_owned());
            }
            if !payouts.is_empty() {
                warn!(recipients = payouts.len(), "no economy configured, payouts dropped");
            }
            return report;
        };

        for (player, amount) in payouts {
            match economy.deposit(*player, *amount) {
                Ok(()) => {
                    report.paid.insert(*player, *amount);
                }
                Err(e) => {
                    warn!(player = %player, amount, error = %e, "deposit failed");
                    report.failed.insert(*player, e.to_string());
                }
            }
        }
        info!(
            paid = report.paid.len(),
            failed = report.failed.len(),
            total = report.total_paid(),
            "rewards paid"
        );
        report
    }

    /// Deposits the participation reward for one player.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Collaborator` if no economy is configured or the
    /// deposit is rejected.
    pub fn award_participation(&self, player: PlayerId) -> Result<u64, DomainError> {
        let amount = self.participation_reward();
        let economy = self
            .economy
            .as_ref()
            .ok_or_else(|| DomainError::Collaborator("no economy configured".into()))?;
        economy.deposit(player, amount)?;
        Ok(amount)
    }
}

impl std::fmt::Debug for RewardEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewardEngine")
            .field("settings", &self.settings())
            .field("has_economy", &self.economy.is_some())
            .finish_non_exhaustive()
    }
}
