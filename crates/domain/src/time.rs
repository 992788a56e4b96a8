//! Time and timestamp helpers.

use chrono::{DateTime, Utc};

/// UTC timestamp carried by events, state history and connection checks.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Whether `ts` lies strictly before the current time.
#[must_use]
pub fn has_passed(ts: Timestamp) -> bool {
    ts < now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn should_return_current_utc_time() {
        let before = Utc::now();
        let ts = now();
        let after = Utc::now();
        assert!(ts >= before && ts <= after);
    }

    #[test]
    fn should_tell_past_from_future() {
        assert!(has_passed(now() - TimeDelta::seconds(5)));
        assert!(!has_passed(now() + TimeDelta::hours(1)));
    }
}
