//! Clock abstraction for determinism.

use chrono::{DateTime, Utc};

/// Abstraction over system time for deterministic behavior.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Milliseconds elapsed from `earlier` to `later`, saturating at zero when the
/// clock has gone backwards.
#[must_use]
pub fn elapsed_ms(earlier: DateTime<Utc>, later: DateTime<Utc>) -> u64 {
    u64::try_from((later - earlier).num_milliseconds()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_elapsed_ms_counts_forward_time() {
        let start = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let later = start + Duration::milliseconds(1_500);

        assert_eq!(elapsed_ms(start, later), 1_500);
    }

    #[test]
    fn test_elapsed_ms_saturates_when_clock_moves_backwards() {
        let start = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let earlier = start - Duration::seconds(3);

        assert_eq!(elapsed_ms(start, earlier), 0);
    }
}
