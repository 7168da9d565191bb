//! Stormcraft: difficulty scaling.
//!
//! Maps local player density, party composition, land claims, and nearby
//! storms onto a single multiplier, a threat tier, and a weighted choice of
//! event type.

pub mod density;
pub mod engine;
pub mod threat;

pub use density::{CacheStats, DensityCache};
pub use engine::{DifficultyEngine, DifficultySettings, PlayerAssessment};
pub use threat::ThreatModel;
