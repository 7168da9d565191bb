//! Event body capability.
//!
//! The trait lives in `stormcraft-core` so hosts and shared test fakes can
//! implement it without depending on the registry. Bodies never call back
//! into the registry from a hook; they report resolution through
//! [`BodyStatus`] and the registry ends the event.

pub use stormcraft_core::body::{BodyFactory, BodyStatus, EventBody, EventContext};
