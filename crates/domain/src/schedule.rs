//! Time-of-day schedules.
//!
//! Schedule rules are written as human times (`"11:59pm"`, `"06:30"`,
//! `"23:59:30"`) or cron expressions (`"0 30 6 * * Mon-Fri"`). [`parse`]
//! normalizes both into a [`ScheduleSpec`] once, at configuration time, so
//! that the timer only ever asks "when is the next firing after `t`?".

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};

/// A normalized recurring schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ScheduleSpec {
    /// Every day at a fixed local wall-clock time.
    TimeOfDay { hour: u8, minute: u8, second: u8 },
    /// A cron expression (seconds-resolution, 6 or 7 fields).
    Cron(CronSpec),
}

/// A validated cron expression.
#[derive(Clone)]
pub struct CronSpec {
    expression: String,
    schedule: cron::Schedule,
}

/// A schedule string could not be understood.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("invalid time of day {0:?}")]
    InvalidTime(String),

    #[error("invalid cron expression {expression:?}")]
    InvalidCron {
        expression: String,
        #[source]
        source: cron::error::Error,
    },
}

/// Parse a time-of-day or cron string into a [`ScheduleSpec`].
///
/// Strings with four or more whitespace-separated fields are treated as
/// cron; standard five-field cron gets a leading `0` seconds field.
///
/// # Errors
///
/// Returns [`ScheduleError`] when the string is neither a valid time of day
/// nor a valid cron expression.
pub fn parse(input: &str) -> Result<ScheduleSpec, ScheduleError> {
    let trimmed = input.trim();
    let fields = trimmed.split_whitespace().count();
    if fields >= 4 {
        let expression = if fields == 5 {
            format!("0 {trimmed}")
        } else {
            trimmed.to_string()
        };
        let schedule =
            cron::Schedule::from_str(&expression).map_err(|source| ScheduleError::InvalidCron {
                expression: trimmed.to_string(),
                source,
            })?;
        return Ok(ScheduleSpec::Cron(CronSpec {
            expression,
            schedule,
        }));
    }
    parse_time_of_day(trimmed)
}

fn parse_time_of_day(input: &str) -> Result<ScheduleSpec, ScheduleError> {
    let invalid = || ScheduleError::InvalidTime(input.to_string());
    let lower = input.to_ascii_lowercase().replace(' ', "");

    let (clock, meridiem) = if let Some(rest) = lower.strip_suffix("am") {
        (rest, Some(false))
    } else if let Some(rest) = lower.strip_suffix("pm") {
        (rest, Some(true))
    } else {
        (lower.as_str(), None)
    };

    let mut parts = clock.split(':');
    let mut next_field = |max: u8| -> Result<Option<u8>, ScheduleError> {
        match parts.next() {
            None => Ok(None),
            Some(text) => {
                let value: u8 = text.parse().map_err(|_| invalid())?;
                if value > max {
                    return Err(invalid());
                }
                Ok(Some(value))
            }
        }
    };

    let hour = next_field(23)?.ok_or_else(invalid)?;
    let minute = next_field(59)?.unwrap_or(0);
    let second = next_field(59)?.unwrap_or(0);
    if parts.next().is_some() {
        return Err(invalid());
    }

    let hour = match meridiem {
        None => hour,
        Some(_) if hour == 0 || hour > 12 => return Err(invalid()),
        Some(false) => hour % 12,
        Some(true) => hour % 12 + 12,
    };

    Ok(ScheduleSpec::TimeOfDay {
        hour,
        minute,
        second,
    })
}

impl ScheduleSpec {
    /// The first firing strictly after `after`, in `after`'s timezone.
    ///
    /// Returns `None` when the schedule has no future occurrence.
    #[must_use]
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        match self {
            Self::TimeOfDay {
                hour,
                minute,
                second,
            } => {
                let time = NaiveTime::from_hms_opt(
                    u32::from(*hour),
                    u32::from(*minute),
                    u32::from(*second),
                )?;
                let tz = after.timezone();
                let mut date = after.date_naive();
                // A local time can be skipped by a DST jump; look a few days ahead.
                for _ in 0..3 {
                    if let Some(candidate) = tz.from_local_datetime(&date.and_time(time)).earliest()
                    {
                        if candidate > *after {
                            return Some(candidate);
                        }
                    }
                    date = date.succ_opt()?;
                }
                None
            }
            Self::Cron(spec) => spec.schedule.after(after).next(),
        }
    }
}

impl fmt::Display for ScheduleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimeOfDay {
                hour,
                minute,
                second,
            } => write!(f, "{hour:02}:{minute:02}:{second:02}"),
            Self::Cron(spec) => f.write_str(&spec.expression),
        }
    }
}

impl FromStr for ScheduleSpec {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

impl TryFrom<String> for ScheduleSpec {
    type Error = ScheduleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse(&value)
    }
}

impl From<ScheduleSpec> for String {
    fn from(spec: ScheduleSpec) -> Self {
        spec.to_string()
    }
}

impl fmt::Debug for CronSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CronSpec").field(&self.expression).finish()
    }
}

impl PartialEq for CronSpec {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression
    }
}

impl Eq for CronSpec {}
