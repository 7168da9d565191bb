//! Shared test mocks and utilities for the Stormcraft event engine.

mod body;
mod clock;
mod collaborators;
mod rng;
mod world;

pub use body::{BodyCall, BodyLog, RecordingBody, RecordingBodyFactory};
pub use clock::{FixedClock, ManualClock, fixed_time};
pub use collaborators::{
    FailingEconomy, RecordingEconomy, StaticClaims, StaticPartySource, StaticStorms,
    StaticTeamSource,
};
pub use rng::{MockRng, SequenceRng};
pub use world::{FailingPlayerSource, StaticWorld, location};
