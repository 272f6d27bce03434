//! Five-field cron expressions.
//!
//! ```text
//! ┌──────── minute        0-59
//! │ ┌────── hour          0-23
//! │ │ ┌──── day of month  1-31
//! │ │ │ ┌── month         1-12 or JAN-DEC
//! │ │ │ │ ┌ day of week   0-7 or SUN-SAT (0 and 7 are Sunday)
//! 0 9 * * MON
//! ```
//!
//! Each field accepts `*`, single values, ranges (`1-5`), lists (`1,3,5`) and
//! steps (`*/15`, `10-50/20`, `5/10`). When both day fields are restricted a
//! day matches if either of them matches. Schedules are evaluated in UTC.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};

use crate::error::TriggerError;

const MONTHS: [&str; 12] = [
  "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const WEEKDAYS: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// How far `next_after` searches before giving up.
const SEARCH_YEARS: i32 = 5;

/// A set of allowed values for one field, as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Field {
  bits: u64,
  /// False when the field starts with `*`.
  restricted: bool,
}

impl Field {
  fn contains(self, value: u32) -> bool {
    self.bits & (1u64 << value) != 0
  }
}

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
  source: String,
  minutes: Field,
  hours: Field,
  days_of_month: Field,
  months: Field,
  days_of_week: Field,
}

impl CronSchedule {
  pub fn parse(expression: &str) -> Result<Self, TriggerError> {
    let invalid = |message: String| TriggerError::InvalidCron {
      expression: expression.to_string(),
      message,
    };

    let fields: Vec<&str> = expression.split_whitespace().collect();
    let [minute, hour, dom, month, dow] = fields.as_slice() else {
      return Err(invalid(format!("expected 5 fields, found {}", fields.len())));
    };

    let mut days_of_week =
      parse_field(dow, 0, 7, &WEEKDAYS, 0).map_err(|m| invalid(format!("day of week: {m}")))?;
    // 7 is Sunday too
    if days_of_week.contains(7) {
      days_of_week.bits = (days_of_week.bits & !(1u64 << 7)) | 1;
    }

    Ok(Self {
      source: expression.split_whitespace().collect::<Vec<_>>().join(" "),
      minutes: parse_field(minute, 0, 59, &[], 0).map_err(|m| invalid(format!("minute: {m}")))?,
      hours: parse_field(hour, 0, 23, &[], 0).map_err(|m| invalid(format!("hour: {m}")))?,
      days_of_month: parse_field(dom, 1, 31, &[], 0)
        .map_err(|m| invalid(format!("day of month: {m}")))?,
      months: parse_field(month, 1, 12, &MONTHS, 1).map_err(|m| invalid(format!("month: {m}")))?,
      days_of_week,
    })
  }

  /// The normalized expression.
  pub fn as_str(&self) -> &str {
    &self.source
  }

  /// Whether the minute containing `at` is a fire time.
  pub fn matches(&self, at: DateTime<Utc>) -> bool {
    self.minutes.contains(at.minute())
      && self.hours.contains(at.hour())
      && self.months.contains(at.month())
      && self.day_matches(at.date_naive())
  }

  fn day_matches(&self, date: NaiveDate) -> bool {
    let dom = self.days_of_month.contains(date.day());
    let dow = self.days_of_week.contains(date.weekday().num_days_from_sunday());
    if self.days_of_month.restricted && self.days_of_week.restricted {
      dom || dow
    } else {
      dom && dow
    }
  }

  /// The first fire time strictly after `after`, or `None` if the schedule
  /// never fires (e.g. `0 0 30 FEB *`).
  pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let limit = after.year() + SEARCH_YEARS;
    let mut t = truncate_to_minute(after)? + Duration::minutes(1);

    while t.year() <= limit {
      if !self.months.contains(t.month()) {
        t = start_of_next_month(t)?;
        continue;
      }
      if !self.day_matches(t.date_naive()) {
        t = start_of_day(t.date_naive().succ_opt()?)?;
        continue;
      }
      if !self.hours.contains(t.hour()) {
        t = truncate_to_hour(t)? + Duration::hours(1);
        continue;
      }
      if !self.minutes.contains(t.minute()) {
        t += Duration::minutes(1);
        continue;
      }
      return Some(t);
    }
    None
  }

  /// The next `count` fire times after `after`.
  pub fn upcoming(&self, after: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
    let mut times = Vec::with_capacity(count);
    let mut cursor = after;
    while times.len() < count {
      let Some(next) = self.next_after(cursor) else {
        break;
      };
      times.push(next);
      cursor = next;
    }
    times
  }
}

impl FromStr for CronSchedule {
  type Err = TriggerError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::parse(s)
  }
}

impl fmt::Display for CronSchedule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.source)
  }
}

/// Parse one field. `names[i]` stands for the value `name_base + i`.
fn parse_field(
  text: &str,
  min: u32,
  max: u32,
  names: &[&str],
  name_base: u32,
) -> Result<Field, String> {
  let mut bits = 0u64;

  for part in text.split(',') {
    let (range, step) = match part.split_once('/') {
      Some((range, step)) => {
        let step: u32 = step
          .parse()
          .map_err(|_| format!("invalid step '{step}'"))?;
        if step == 0 {
          return Err("step must be at least 1".to_string());
        }
        (range, Some(step))
      }
      None => (part, None),
    };

    let (start, end) = if range == "*" {
      (min, max)
    } else if let Some((a, b)) = range.split_once('-') {
      let a = parse_value(a, min, max, names, name_base)?;
      let b = parse_value(b, min, max, names, name_base)?;
      if a > b {
        return Err(format!("range '{range}' is reversed"));
      }
      (a, b)
    } else {
      let value = parse_value(range, min, max, names, name_base)?;
      // `5/10` runs from 5 to the end of the field
      (value, if step.is_some() { max } else { value })
    };

    let step = step.unwrap_or(1) as usize;
    for value in (start..=end).step_by(step) {
      bits |= 1u64 << value;
    }
  }

  Ok(Field {
    bits,
    restricted: !text.starts_with('*'),
  })
}

fn parse_value(
  text: &str,
  min: u32,
  max: u32,
  names: &[&str],
  name_base: u32,
) -> Result<u32, String> {
  let value = match text.parse::<u32>() {
    Ok(value) => value,
    Err(_) => names
      .iter()
      .position(|name| name.eq_ignore_ascii_case(text))
      .map(|i| name_base + i as u32)
      .ok_or_else(|| format!("invalid value '{text}'"))?,
  };
  if value < min || value > max {
    return Err(format!("value {value} out of range {min}-{max}"));
  }
  Ok(value)
}

fn truncate_to_minute(t: DateTime<Utc>) -> Option<DateTime<Utc>> {
  t.with_second(0)?.with_nanosecond(0)
}

fn truncate_to_hour(t: DateTime<Utc>) -> Option<DateTime<Utc>> {
  truncate_to_minute(t)?.with_minute(0)
}

fn start_of_day(date: NaiveDate) -> Option<DateTime<Utc>> {
  Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

fn start_of_next_month(t: DateTime<Utc>) -> Option<DateTime<Utc>> {
  let (year, month) = if t.month() == 12 {
    (t.year() + 1, 1)
  } else {
    (t.year(), t.month() + 1)
  };
  start_of_day(NaiveDate::from_ymd_opt(year, month, 1)?)
}
