//! Time and timestamp helpers.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// UTC timestamp used for `last_changed`, event times, etc.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Time elapsed between `since` and `now`, clamped to zero when the clock
/// went backwards.
#[must_use]
pub fn elapsed(since: Timestamp, now: Timestamp) -> Duration {
    (now - since).to_std().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_return_current_utc_time() {
        let before = Utc::now();
        let ts = now();
        assert!(ts >= before);
        assert!(ts <= Utc::now());
    }

    #[test]
    fn should_measure_elapsed_time() {
        let since = now();
        let later = since + chrono::Duration::seconds(90);
        assert_eq!(elapsed(since, later), Duration::from_secs(90));
    }

    #[test]
    fn should_clamp_negative_elapsed_to_zero() {
        let since = now();
        let earlier = since - chrono::Duration::seconds(5);
        assert_eq!(elapsed(since, earlier), Duration::ZERO);
    }
}
