//! Cycle trigger timing

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Time from `now` until the next multiple of `period` since the Unix epoch
///
/// A daily period lands on 00:00 UTC. Returns zero when `now` is exactly on a
/// boundary.
pub fn until_next_boundary(now: DateTime<Utc>, period: Duration) -> Duration {
    let period_ms = period.as_millis() as i64;
    if period_ms <= 0 {
        return Duration::ZERO;
    }
    let elapsed = now.timestamp_millis().rem_euclid(period_ms);
    if elapsed == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis((period_ms - elapsed) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const DAY: Duration = Duration::from_secs(86_400);

    #[test]
    fn daily_period_waits_for_midnight_utc() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 23, 30, 0).unwrap();
        assert_eq!(until_next_boundary(now, DAY), Duration::from_secs(30 * 60));

        let morning = Utc.with_ymd_and_hms(2024, 3, 10, 6, 0, 0).unwrap();
        assert_eq!(until_next_boundary(morning, DAY), Duration::from_secs(18 * 3600));
    }

    #[test]
    fn exactly_on_boundary_fires_now() {
        let midnight = Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap();
        assert_eq!(until_next_boundary(midnight, DAY), Duration::ZERO);
    }

    #[test]
    fn hourly_period_aligns_to_the_hour() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 14, 45, 30).unwrap();
        assert_eq!(
            until_next_boundary(now, Duration::from_secs(3600)),
            Duration::from_secs(14 * 60 + 30)
        );
    }

    #[test]
    fn zero_period_never_waits() {
        assert_eq!(until_next_boundary(Utc::now(), Duration::ZERO), Duration::ZERO);
    }
}
