//! Cron-like schedule for the expiry sweep
//!
//! Each field accepts `*`, `*/n`, `n`, `a-b`, `a-b/n` and comma lists.
//! Day-of-week runs 0-6 with Sunday as 0 (7 is accepted for Sunday too).

use chrono::{DateTime, Datelike, Duration as ChronoDuration, Local, TimeZone, Timelike};
use std::fmt;

/// One parsed schedule field, as a bitmask over its value range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CronField {
    mask: u64,
    wildcard: bool,
}

impl CronField {
    pub fn contains(&self, value: u32) -> bool {
        value < 64 && self.mask & (1 << value) != 0
    }

    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }
}

/// Parse one field with inclusive bounds
pub fn parse_field(expr: &str, min: u32, max: u32) -> Result<CronField, String> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err("empty field".into());
    }

    let mut mask = 0u64;
    for part in expr.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("invalid step '{}'", step))?;
                if step == 0 {
                    return Err("step must be positive".into());
                }
                if step > max - min {
                    return Err(format!("step {} exceeds range {}-{}", step, min, max));
                }
                (range, step)
            }
            None => (part, 1),
        };

        let (lo, hi) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            (parse_value(a, min, max)?, parse_value(b, min, max)?)
        } else {
            let v = parse_value(range, min, max)?;
            // "5/15" means from 5 to the end of the range
            if part.contains('/') { (v, max) } else { (v, v) }
        };

        if lo > hi {
            return Err(format!("range {}-{} is reversed", lo, hi));
        }

        for v in (lo..=hi).step_by(step as usize) {
            mask |= 1 << v;
        }
    }

    Ok(CronField {
        mask,
        wildcard: expr == "*",
    })
}

fn parse_value(s: &str, min: u32, max: u32) -> Result<u32, String> {
    let v: u32 = s.trim().parse().map_err(|_| format!("invalid value '{}'", s))?;
    if v < min || v > max {
        return Err(format!("value {} outside {}-{}", v, min, max));
    }
    Ok(v)
}

/// Validated schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    minute: CronField,
    hour: CronField,
    day: CronField,
    month: CronField,
    day_of_week: CronField,
    source: [String; 5],
}

impl Schedule {
    /// Parse the five fields; errors name the offending field
    pub fn parse(
        minute: &str,
        hour: &str,
        day: &str,
        month: &str,
        day_of_week: &str,
    ) -> Result<Self, (&'static str, String)> {
        let mut dow = parse_field(day_of_week, 0, 7).map_err(|e| ("day_of_week", e))?;
        if dow.contains(7) {
            dow.mask = (dow.mask & !(1 << 7)) | 1;
        }

        let day_field = parse_field(day, 1, 31).map_err(|e| ("day", e))?;
        let month_field = parse_field(month, 1, 12).map_err(|e| ("month", e))?;
        // With day-of-week unrestricted the day of month alone decides
        if dow.is_wildcard() && !date_exists(&day_field, &month_field) {
            return Err(("day", "day never occurs in the selected months".into()));
        }

        Ok(Self {
            minute: parse_field(minute, 0, 59).map_err(|e| ("minute", e))?,
            hour: parse_field(hour, 0, 23).map_err(|e| ("hour", e))?,
            day: day_field,
            month: month_field,
            day_of_week: dow,
            source: [
                minute.to_string(),
                hour.to_string(),
                day.to_string(),
                month.to_string(),
                day_of_week.to_string(),
            ],
        })
    }

    /// Every ten minutes
    pub fn every_ten_minutes() -> Self {
        Self::parse("*/10", "*", "*", "*", "*").unwrap_or_else(|_| unreachable!())
    }

    /// Whether the minute containing `dt` is a scheduled slot
    pub fn matches(&self, dt: &DateTime<Local>) -> bool {
        self.minute.contains(dt.minute()) && self.hour.contains(dt.hour()) && self.date_matches(dt)
    }

    fn date_matches(&self, dt: &DateTime<Local>) -> bool {
        if !self.month.contains(dt.month()) {
            return false;
        }

        let day_ok = self.day.contains(dt.day());
        let dow_ok = self.day_of_week.contains(dt.weekday().num_days_from_sunday());

        // Classic cron: when both day fields are restricted either may match
        match (self.day.is_wildcard(), self.day_of_week.is_wildcard()) {
            (false, false) => day_ok || dow_ok,
            _ => day_ok && dow_ok,
        }
    }

    /// First scheduled minute strictly after `dt`, searching up to a year ahead.
    ///
    /// Days and hours that cannot match are skipped whole.
    pub fn next_after(&self, dt: &DateTime<Local>) -> Option<DateTime<Local>> {
        let mut t = dt.with_second(0)?.with_nanosecond(0)? + ChronoDuration::minutes(1);
        let limit = t + ChronoDuration::days(366);

        while t <= limit {
            if !self.date_matches(&t) {
                let midnight = t.date_naive().succ_opt()?.and_hms_opt(0, 0, 0)?;
                t = Local.from_local_datetime(&midnight).earliest()?;
            } else if !self.hour.contains(t.hour()) {
                t = t.with_minute(0)? + ChronoDuration::hours(1);
            } else if self.minute.contains(t.minute()) {
                return Some(t);
            } else {
                t += ChronoDuration::minutes(1);
            }
        }
        None
    }
}

/// Longest length of each month, leap years included
const MONTH_DAYS: [u32; 12] = [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

fn date_exists(day: &CronField, month: &CronField) -> bool {
    (1..=12).any(|m| month.contains(m) && (1..=MONTH_DAYS[m as usize - 1]).any(|d| day.contains(d)))
}

impl Default for Schedule {
    fn default() -> Self {
        Self::every_ten_minutes()
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source.join(" "))
    }
}
