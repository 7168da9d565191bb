//! Stormcraft: spawn scheduling.
//!
//! Every scheduler tick rolls a density-scaled spawn chance per active
//! storm, picks an event type, samples a location in one of the storm's
//! concentric rings, and hands the result to the event registry.

pub mod scheduler;
pub mod zone;

pub use scheduler::{Scheduler, SchedulerSettings, SpawnOutcome, StormAttempt, TickReport};
pub use zone::{SpawnPoint, SpawnRing, SpawnZoneSampler};
