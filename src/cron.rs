//! Five-field cron expressions
//!
//! Supports `*`, single values, ranges, steps (`*/n`, `a-b/n`, `a/n`), comma
//! lists, month and weekday names, and the descriptors `@yearly`,
//! `@annually`, `@monthly`, `@weekly`, `@daily`, `@midnight` and `@hourly`.
//! All times are evaluated in UTC.

use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, Timelike, Utc};
use thiserror::Error;

/// How far ahead `next_after` searches before giving up (e.g. `0 0 30 2 *`)
const SEARCH_YEARS: i32 = 5;

const MONTH_NAMES: &[&str] = &[
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const DAY_NAMES: &[&str] = &["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CronError {
    #[error("empty cron expression")]
    Empty,

    #[error("expected 5 fields, found {0}")]
    FieldCount(usize),

    #[error("unknown descriptor: {0}")]
    UnknownDescriptor(String),

    #[error("invalid {field} field '{value}': {reason}")]
    InvalidField {
        field: &'static str,
        value: String,
        reason: String,
    },
}

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
    name_offset: u32,
}

const MINUTE: FieldSpec = FieldSpec {
    name: "minute",
    min: 0,
    max: 59,
    names: &[],
    name_offset: 0,
};
const HOUR: FieldSpec = FieldSpec {
    name: "hour",
    min: 0,
    max: 23,
    names: &[],
    name_offset: 0,
};
const DAY_OF_MONTH: FieldSpec = FieldSpec {
    name: "day-of-month",
    min: 1,
    max: 31,
    names: &[],
    name_offset: 0,
};
const MONTH: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
    names: MONTH_NAMES,
    name_offset: 1,
};
// 7 is accepted as an alias for Sunday
const DAY_OF_WEEK: FieldSpec = FieldSpec {
    name: "day-of-week",
    min: 0,
    max: 7,
    names: DAY_NAMES,
    name_offset: 0,
};

/// A parsed cron schedule. Each field is a bitmask of allowed values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<Self, CronError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(CronError::Empty);
        }
        if let Some(descriptor) = expr.strip_prefix('@') {
            return Self::from_descriptor(descriptor);
        }

        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronError::FieldCount(fields.len()));
        }

        let mut days_of_week = parse_field(fields[4], &DAY_OF_WEEK)?;
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }

        Ok(Self {
            minutes: parse_field(fields[0], &MINUTE)?,
            hours: parse_field(fields[1], &HOUR)?,
            days_of_month: parse_field(fields[2], &DAY_OF_MONTH)?,
            months: parse_field(fields[3], &MONTH)?,
            days_of_week,
            dom_restricted: is_restricted(fields[2]),
            dow_restricted: is_restricted(fields[4]),
        })
    }

    fn from_descriptor(descriptor: &str) -> Result<Self, CronError> {
        let expr = match descriptor.to_ascii_lowercase().as_str() {
            "yearly" | "annually" => "0 0 1 1 *",
            "monthly" => "0 0 1 * *",
            "weekly" => "0 0 * * 0",
            "daily" | "midnight" => "0 0 * * *",
            "hourly" => "0 * * * *",
            _ => return Err(CronError::UnknownDescriptor(format!("@{descriptor}"))),
        };
        Self::parse(expr)
    }

    /// First matching minute strictly after `after`, or None when nothing
    /// matches within the search horizon
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after.naive_utc().with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);
        let limit = start.year() + SEARCH_YEARS;
        let mut t = start;

        loop {
            if t.year() > limit {
                return None;
            }
            if !bit(self.months, t.month()) {
                t = first_of_next_month(t.date())?;
                continue;
            }
            if !self.day_matches(t.date()) {
                t = t.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !bit(self.hours, t.hour()) {
                t = t.date().and_hms_opt(t.hour(), 0, 0)? + Duration::hours(1);
                continue;
            }
            if !bit(self.minutes, t.minute()) {
                t += Duration::minutes(1);
                continue;
            }
            return Some(t.and_utc());
        }
    }

    /// Whether `at` (truncated to the minute) is a fire time
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        bit(self.months, at.month())
            && self.day_matches(at.date_naive())
            && bit(self.hours, at.hour())
            && bit(self.minutes, at.minute())
    }

    // When both day fields are restricted either one may match, otherwise both must
    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = bit(self.days_of_month, date.day());
        let dow = bit(self.days_of_week, date.weekday().num_days_from_sunday());
        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }
}

impl FromStr for CronSchedule {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn bit(mask: u64, value: u32) -> bool {
    mask & (1u64 << value) != 0
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?
        .checked_add_months(Months::new(1))?
        .and_hms_opt(0, 0, 0)
}

// Fields starting with a wildcard, stepped or not, leave the day unrestricted
fn is_restricted(field: &str) -> bool {
    !(field.starts_with('*') || field.starts_with('?'))
}

fn parse_field(field: &str, spec: &FieldSpec) -> Result<u64, CronError> {
    let invalid = |reason: &str| CronError::InvalidField {
        field: spec.name,
        value: field.to_string(),
        reason: reason.to_string(),
    };

    let mut mask = 0u64;
    for part in field.split(',') {
        if part.is_empty() {
            return Err(invalid("empty list element"));
        }

        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step.parse().map_err(|_| invalid("step is not a number"))?;
                if step == 0 {
                    return Err(invalid("step must be positive"));
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (low, high) = if range == "*" || range == "?" {
            (spec.min, spec.max)
        } else if let Some((low, high)) = range.split_once('-') {
            (parse_value(low, spec)?, parse_value(high, spec)?)
        } else {
            let value = parse_value(range, spec)?;
            // "a/n" means "a-max/n"
            if step.is_some() {
                (value, spec.max)
            } else {
                (value, value)
            }
        };

        if low > high {
            return Err(invalid("range start is after range end"));
        }

        let step = step.unwrap_or(1);
        let mut value = Some(low);
        while let Some(v) = value
            && v <= high
        {
            mask |= 1u64 << v;
            value = v.checked_add(step);
        }
    }

    Ok(mask)
}

fn parse_value(raw: &str, spec: &FieldSpec) -> Result<u32, CronError> {
    let value = match raw.parse::<u32>() {
        Ok(value) => value,
        Err(_) => spec
            .names
            .iter()
            .position(|name| name.eq_ignore_ascii_case(raw))
            .map(|idx| idx as u32 + spec.name_offset)
            .ok_or_else(|| CronError::InvalidField {
                field: spec.name,
                value: raw.to_string(),
                reason: "not a number or known name".to_string(),
            })?,
    };

    if value < spec.min || value > spec.max {
        return Err(CronError::InvalidField {
            field: spec.name,
            value: raw.to_string(),
            reason: format!("out of range {}-{}", spec.min, spec.max),
        });
    }
    Ok(value)
}
