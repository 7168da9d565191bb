//! Stormcraft Core: shared domain abstractions.
//!
//! This crate defines the value types, collaborator ports, and configuration
//! that every other Stormcraft crate depends on. It contains no timers and no
//! world-host code.

pub mod body;
pub mod clock;
pub mod config;
pub mod difficulty;
pub mod error;
pub mod event;
pub mod geometry;
pub mod ports;
pub mod rng;
