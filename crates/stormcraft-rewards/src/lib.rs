//! Stormcraft: reward distribution.
//!
//! Converts a completed event's difficulty, participant count, and recorded
//! contributions into payouts, then deposits them through the economy.

pub mod engine;

pub use engine::{PayoutReport, RewardEngine, RewardSettings};
