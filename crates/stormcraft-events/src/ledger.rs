//! Cooldown ledger: last spawn per event type plus one global stamp.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use stormcraft_core::event::EventType;

#[derive(Debug, Default)]
struct Stamps {
    per_type: HashMap<EventType, DateTime<Utc>>,
    global: Option<DateTime<Utc>>,
}

/// Spawn timestamps. Stamps only move forward.
#[derive(Debug, Default)]
pub struct CooldownLedger {
    stamps: Mutex<Stamps>,
}

fn remaining(last: Option<DateTime<Utc>>, now: DateTime<Utc>, cooldown_secs: u64) -> Duration {
    let Some(last) = last else {
        return Duration::zero();
    };
    let cooldown = i64::try_from(cooldown_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX);
    let left = cooldown
        .checked_sub(&(now - last))
        .unwrap_or(Duration::MAX);
    if left > Duration::zero() {
        left
    } else {
        Duration::zero()
    }
}

impl CooldownLedger {
    /// Creates an empty ledger; nothing is cooling down.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a spawn of `event_type` at `at`, updating both the per-type
    /// and the global stamp. Earlier timestamps never overwrite later ones.
    pub fn stamp(&self, event_type: EventType, at: DateTime<Utc>) {
        let mut stamps = self.stamps.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = stamps.per_type.entry(event_type).or_insert(at);
        if at > *entry {
            *entry = at;
        }
        if stamps.global.is_none_or(|global| at > global) {
            stamps.global = Some(at);
        }
    }

    /// When `event_type` last spawned.
    #[must_use]
    pub fn last_spawn(&self, event_type: EventType) -> Option<DateTime<Utc>> {
        self.stamps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .per_type
            .get(&event_type)
            .copied()
    }

    /// When any event last spawned.
    #[must_use]
    pub fn last_global(&self) -> Option<DateTime<Utc>> {
        self.stamps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .global
    }

    /// Time left on the global cooldown, zero when idle.
    #[must_use]
    pub fn global_remaining(&self, now: DateTime<Utc>, cooldown_secs: u64) -> Duration {
        remaining(self.last_global(), now, cooldown_secs)
    }

    /// Time left on `event_type`'s cooldown, zero when idle.
    #[must_use]
    pub fn type_remaining(
        &self,
        event_type: EventType,
        now: DateTime<Utc>,
        cooldown_secs: u64,
    ) -> Duration {
        remaining(self.last_spawn(event_type), now, cooldown_secs)
    }

    /// Returns true while `now - last_global < cooldown`.
    #[must_use]
    pub fn is_global_cooling(&self, now: DateTime<Utc>, cooldown_secs: u64) -> bool {
        self.global_remaining(now, cooldown_secs) > Duration::zero()
    }

    /// Returns true while `now - last_spawn(event_type) < cooldown`.
    #[must_use]
    pub fn is_type_cooling(
        &self,
        event_type: EventType,
        now: DateTime<Utc>,
        cooldown_secs: u64,
    ) -> bool {
        self.type_remaining(event_type, now, cooldown_secs) > Duration::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stormcraft_test_support::fixed_time;

    #[test]
    fn test_cooldown_beyond_duration_range_saturates() {
        // Arrange
        let ledger = CooldownLedger::new();
        let start = fixed_time();
        ledger.stamp(EventType::StormTitan, start);

        // Act
        let global = ledger.global_remaining(start + Duration::seconds(1), 10_u64.pow(16));
        let per_type = ledger.type_remaining(EventType::StormTitan, start, u64::MAX);

        // Assert
        assert_eq!(global, Duration::MAX - Duration::seconds(1));
        assert_eq!(per_type, Duration::MAX);
        assert!(ledger.is_global_cooling(start, u64::MAX));
    }

    #[test]
    fn test_empty_ledger_is_idle() {
        let ledger = CooldownLedger::new();

        assert!(!ledger.is_global_cooling(fixed_time(), 60));
        assert!(!ledger.is_type_cooling(EventType::StormSurge, fixed_time(), 300));
        assert_eq!(ledger.last_global(), None);
    }

    #[test]
    fn test_stamp_starts_both_cooldowns() {
        // Arrange
        let ledger = CooldownLedger::new();
        let start = fixed_time();

        // Act
        ledger.stamp(EventType::StormRift, start);

        // Assert
        assert!(ledger.is_global_cooling(start + Duration::seconds(59), 60));
        assert!(!ledger.is_global_cooling(start + Duration::seconds(60), 60));
        assert!(ledger.is_type_cooling(EventType::StormRift, start + Duration::seconds(299), 300));
        assert!(!ledger.is_type_cooling(EventType::StormSurge, start, 300));
        assert_eq!(
            ledger.type_remaining(EventType::StormRift, start + Duration::seconds(100), 300),
            Duration::seconds(200)
        );
    }

    #[test]
    fn test_stamps_never_rewind() {
        let ledger = CooldownLedger::new();
        let later = fixed_time() + Duration::seconds(30);

        ledger.stamp(EventType::StormSurge, later);
        ledger.stamp(EventType::StormSurge, fixed_time());

        assert_eq!(ledger.last_spawn(EventType::StormSurge), Some(later));
        assert_eq!(ledger.last_global(), Some(later));
    }

    #[test]
    fn test_global_tracks_latest_type() {
        let ledger = CooldownLedger::new();
        let later = fixed_time() + Duration::seconds(5);

        ledger.stamp(EventType::StormSurge, fixed_time());
        ledger.stamp(EventType::TownSiege, later);

        assert_eq!(ledger.last_global(), Some(later));
        assert_eq!(ledger.last_spawn(EventType::StormSurge), Some(fixed_time()));
    }
}
