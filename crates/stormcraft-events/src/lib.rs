//! Stormcraft: event lifecycle.
//!
//! The registry is the sole authority for starting and ending events. It
//! stamps cooldowns on start, drives each body on its own tick timer, and
//! hands successful completions to the reward engine.

pub mod body;
pub mod contribution;
pub mod ledger;
pub mod objective;
pub mod registry;
mod slot;

pub use body::{BodyFactory, BodyStatus, EventBody, EventContext};
pub use contribution::ContributionTracker;
pub use ledger::CooldownLedger;
pub use objective::{ObjectiveBody, ObjectiveBodyFactory};
pub use registry::{EndReport, EventRegistry, EventSnapshot};
