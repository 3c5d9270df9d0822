//! ENVISAT modified Julian date timestamps.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: u32 = 86_400;
const MICROS_PER_SECOND: u32 = 1_000_000;
const EPOCH_2000_UNIX_SECONDS: i64 = 946_684_800;

/// Timestamp as (day, second, microsecond) counted from 2000-01-01T00:00:00 UTC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Mjd {
    pub days: i32,
    pub seconds: u32,
    pub microseconds: u32,
}

impl Mjd {
    pub fn new(days: i32, seconds: u32, microseconds: u32) -> Self {
        Self {
            days,
            seconds,
            microseconds,
        }
    }

    /// Build a timestamp from a day number and a fractional seconds-of-day value.
    ///
    /// The fraction is rounded to the nearest microsecond; overflow carries
    /// into the seconds and days fields.
    pub fn from_day_seconds(days: i32, seconds_field: f64) -> Self {
        let mut days = days;
        let mut whole = seconds_field.floor();
        let mut micros = ((seconds_field - whole) * MICROS_PER_SECOND as f64).round() as u32;

        if micros >= MICROS_PER_SECOND {
            micros -= MICROS_PER_SECOND;
            whole += 1.0;
        }

        let mut seconds = whole.max(0.0) as u64;
        if seconds >= SECONDS_PER_DAY as u64 {
            days += (seconds / SECONDS_PER_DAY as u64) as i32;
            seconds %= SECONDS_PER_DAY as u64;
        }

        Self {
            days,
            seconds: seconds as u32,
            microseconds: micros,
        }
    }

    /// Seconds of day including the microsecond fraction.
    pub fn seconds_of_day(&self) -> f64 {
        self.seconds as f64 + self.microseconds as f64 / MICROS_PER_SECOND as f64
    }

    /// Seconds elapsed since the 2000-01-01 epoch.
    pub fn as_seconds(&self) -> f64 {
        self.days as f64 * SECONDS_PER_DAY as f64 + self.seconds_of_day()
    }

    /// Convert to a UTC datetime.
    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH
            + Duration::seconds(EPOCH_2000_UNIX_SECONDS)
            + Duration::days(self.days as i64)
            + Duration::seconds(self.seconds as i64)
            + Duration::microseconds(self.microseconds as i64)
    }
}

impl std::fmt::Display for Mjd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_datetime().format("%Y-%m-%dT%H:%M:%S%.6fZ"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_day_seconds_split() {
        let t = Mjd::from_day_seconds(100, 12.5);
        assert_eq!(t, Mjd::new(100, 12, 500_000));
    }

    #[test]
    fn test_from_day_seconds_rounds_microseconds() {
        let t = Mjd::from_day_seconds(0, 1.999_999_7);
        assert_eq!(t, Mjd::new(0, 2, 0));
    }

    #[test]
    fn test_from_day_seconds_day_rollover() {
        let t = Mjd::from_day_seconds(5, 86_400.25);
        assert_eq!(t, Mjd::new(6, 0, 250_000));
    }

    #[test]
    fn test_to_datetime() {
        let t = Mjd::new(1, 3600, 0);
        assert_eq!(t.to_string(), "2000-01-02T01:00:00.000000Z");
    }

    #[test]
    fn test_ordering() {
        assert!(Mjd::new(1, 0, 0) > Mjd::new(0, 86_399, 999_999));
        assert!(Mjd::new(1, 5, 1) > Mjd::new(1, 5, 0));
    }
}
