use std::{
    fmt::{Debug, Display},
    time::{Duration, SystemTime},
};

use chrono::TimeZone;

/// Either gets the current time or panics
#[must_use]
pub fn get_time() -> Time {
    Time::from_duration_since_epoch(
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .expect("Time went backwards"),
    )
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Time {
    /// Time, stored as duration since `SystemTime::UNIX_EPOCH`
    time: Duration,
}

impl Time {
    #[must_use]
    pub const fn as_duration_since_epoch(&self) -> Duration {
        self.time
    }

    #[must_use]
    pub const fn from_duration_since_epoch(duration: Duration) -> Self {
        Self { time: duration }
    }

    #[must_use]
    pub const fn from_secs_since_epoch(seconds: u64) -> Self {
        Self {
            time: Duration::from_secs(seconds),
        }
    }

    /// Seconds since the Unix epoch with sub-second precision, the way
    /// request timestamps are reported in payloads
    #[must_use]
    pub fn as_unix_timestamp_f64(&self) -> f64 {
        self.time.as_secs_f64()
    }

    #[must_use]
    pub fn as_absolute_time(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        TryInto::<i64>::try_into(self.time.as_secs())
            .ok()
            .and_then(|secs| {
                chrono::Utc
                    .timestamp_opt(secs, self.time.subsec_nanos())
                    .single()
            })
    }
}

impl Debug for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.as_absolute_time() {
            Some(time) => write!(f, "{time:?}"),
            None => write!(f, "Time({:?})", self.time),
        }
    }
}

impl Display for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.as_absolute_time() {
            Some(time) => write!(f, "{time}"),
            None => write!(f, "{:?} since Unix epoch", self.time),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Duration::from_secs(1_705_064_092), 1_705_064_092.0)]
    #[case(Duration::from_millis(1_705_064_092_500), 1_705_064_092.5)]
    #[case(Duration::ZERO, 0.0)]
    fn unix_timestamp(#[case] since_epoch: Duration, #[case] expected: f64) {
        let t = Time::from_duration_since_epoch(since_epoch);
        assert!((t.as_unix_timestamp_f64() - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn current_time_is_after_2024() {
        assert!(get_time() > Time::from_secs_since_epoch(1_704_067_200));
    }

    #[test]
    fn debug_display() {
        let t = Time::from_secs_since_epoch(1_705_064_092);
        assert_eq!(format!("{t:?}"), "2024-01-12T12:54:52Z");
        assert_eq!(format!("{t}"), "2024-01-12 12:54:52 UTC");

        let t = Time::from_duration_since_epoch(Duration::MAX);
        assert_eq!(format!("{t:?}"), "Time(18446744073709551615.999999999s)");
        assert_eq!(
            format!("{t}"),
            "18446744073709551615.999999999s since Unix epoch"
        );
    }
}
