//! First-class schedule specs: fixed interval or weekly-at-time-of-day.
//! Replaces a host-framework scheduler with a due-time evaluator that any
//! process can poll.

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleSpec {
    /// Run every `secs` seconds.
    Every { secs: u64 },
    /// Run at the nearest future occurrence of `weekday` at `at` (UTC).
    WeeklyAt { weekday: Weekday, at: NaiveTime },
}

impl ScheduleSpec {
    pub fn every_secs(secs: u64) -> Result<Self, ConfigurationError> {
        let spec = ScheduleSpec::Every { secs };
        spec.validate()?;
        Ok(spec)
    }

    /// Parse e.g. `("monday", "00:00")`. Accepts chrono weekday names
    /// ("mon", "monday") and `%H:%M` or `%H:%M:%S` times.
    pub fn weekly_at(weekday: &str, at: &str) -> Result<Self, ConfigurationError> {
        let weekday: Weekday = weekday
            .parse()
            .map_err(|_| ConfigurationError(format!("unparsable weekday: {weekday:?}")))?;
        let at = NaiveTime::parse_from_str(at, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(at, "%H:%M"))
            .map_err(|_| ConfigurationError(format!("unparsable time of day: {at:?}")))?;
        Ok(ScheduleSpec::WeeklyAt { weekday, at })
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match self {
            ScheduleSpec::Every { secs: 0 } => Err(ConfigurationError(
                "interval must be greater than zero".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Next run time strictly after `now`.
    ///
    /// For weekly specs a missed occurrence is not re-computed here; the
    /// registry leaves a stale `next_run_time` in the past so the job comes
    /// due immediately on the next poll, and only then advances through
    /// this method. That yields exactly one catch-up run after downtime.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            ScheduleSpec::Every { secs } => now + Duration::seconds(*secs as i64),
            ScheduleSpec::WeeklyAt { weekday, at } => {
                let days_ahead = (weekday.num_days_from_monday() as i64
                    - now.weekday().num_days_from_monday() as i64)
                    .rem_euclid(7);
                let candidate = (now + Duration::days(days_ahead))
                    .date_naive()
                    .and_time(*at)
                    .and_utc();
                if candidate > now {
                    candidate
                } else {
                    candidate + Duration::days(7)
                }
            }
        }
    }
}
