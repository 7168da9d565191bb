//! Stormcraft: host wiring.
//!
//! [`StormEngine`] builds every component from one validated configuration,
//! runs the scheduler and cache-sweep drivers on tokio, and tears everything
//! down in order. [`scenario`] provides a YAML-described static world for
//! tuning runs.

pub mod engine;
pub mod scenario;

pub use engine::{Collaborators, EngineStats, StormEngine};
pub use scenario::{Scenario, ScenarioWorld};
