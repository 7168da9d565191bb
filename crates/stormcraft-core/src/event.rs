//! Storm event kinds, lifecycle states, and the descriptor handed from the
//! scheduler to the registry.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::difficulty::DifficultyResult;
use crate::geometry::{Location, StormId};

/// Unique identifier of a spawned event instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Generates a fresh random event identifier.
    #[must_use]
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The fixed set of storm event kinds.
///
/// Declaration order is significant: weighted selection walks types in this
/// order, so `Ord` and [`EventType::ALL`] define the tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Collect storm crystals before they disappear.
    StormSurge,
    /// Defeat a powerful mini-boss near the storm.
    TempestGuardian,
    /// Defend against waves of storm-corrupted mobs.
    StormRift,
    /// Face a world boss spawned from the tempest.
    StormTitan,
    /// Defend a town from storm-corrupted invaders.
    TownSiege,
}

impl EventType {
    /// Every event type in declaration order.
    pub const ALL: [EventType; 5] = [
        EventType::StormSurge,
        EventType::TempestGuardian,
        EventType::StormRift,
        EventType::StormTitan,
        EventType::TownSiege,
    ];

    /// The configuration key for this type.
    #[must_use]
    pub fn config_key(self) -> &'static str {
        match self {
            EventType::StormSurge => "storm_surge",
            EventType::TempestGuardian => "tempest_guardian",
            EventType::StormRift => "storm_rift",
            EventType::StormTitan => "storm_titan",
            EventType::TownSiege => "town_siege",
        }
    }

    /// Returns true for boss fights, where rewards follow contribution.
    #[must_use]
    pub fn is_boss(self) -> bool {
        matches!(self, EventType::TempestGuardian | EventType::StormTitan)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_key())
    }
}

/// Lifecycle state of an event instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventState {
    /// Created by the scheduler, not yet started.
    Spawning,
    /// Running; its body is ticking.
    Active,
    /// Finished successfully. Terminal.
    Completed,
    /// Failed, expired, or torn down. Terminal.
    Failed,
}

impl EventState {
    /// Returns true for `Completed` and `Failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, EventState::Completed | EventState::Failed)
    }
}

/// Everything decided about an event at spawn time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDescriptor {
    /// Unique identifier.
    pub id: EventId,
    /// The kind of event.
    pub event_type: EventType,
    /// Where the event takes place.
    pub location: Location,
    /// When the scheduler created the descriptor.
    pub created_at: DateTime<Utc>,
    /// How long the event may run before its body treats it as expired.
    pub duration_seconds: u32,
    /// Difficulty evaluation at spawn time, absent when scaling is disabled.
    pub difficulty: Option<DifficultyResult>,
    /// The storm that spawned the event, if any.
    pub storm_id: Option<StormId>,
}

impl EventDescriptor {
    /// Creates a descriptor with a fresh identifier.
    #[must_use]
    pub fn new(
        event_type: EventType,
        location: Location,
        created_at: DateTime<Utc>,
        duration_seconds: u32,
    ) -> Self {
        Self {
            id: EventId::new_v4(),
            event_type,
            location,
            created_at,
            duration_seconds,
            difficulty: None,
            storm_id: None,
        }
    }

    /// Attaches the difficulty evaluation.
    #[must_use]
    pub fn with_difficulty(mut self, difficulty: DifficultyResult) -> Self {
        self.difficulty = Some(difficulty);
        self
    }

    /// Records the originating storm.
    #[must_use]
    pub fn with_storm(mut self, storm_id: StormId) -> Self {
        self.storm_id = Some(storm_id);
        self
    }

    /// The difficulty multiplier, `1.0` when no evaluation is attached.
    #[must_use]
    pub fn multiplier(&self) -> f64 {
        self.difficulty.as_ref().map_or(1.0, |d| d.multiplier)
    }

    /// Returns true once `duration_seconds` have elapsed since creation.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        (now - self.created_at).num_seconds() >= i64::from(self.duration_seconds)
    }

    /// Whole seconds left before expiry, saturating at zero.
    #[must_use]
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> u32 {
        let elapsed = (now - self.created_at).num_seconds();
        let remaining = i64::from(self.duration_seconds) - elapsed.max(0);
        u32::try_from(remaining.max(0)).unwrap_or(0)
    }
}
