use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, SubsecRound, Utc};

/// Forms other SQLite writers commonly use (`CURRENT_TIMESTAMP`, `datetime()`),
/// read as UTC.
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

pub fn to_i64(value: usize) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

/// RFC 3339 UTC with all nine fractional digits, so nothing is lost on the way
/// in and every timestamp this crate writes has the same width.
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Rounds up to whole microseconds, the finest instant PostgreSQL stores, so
/// a rounded "now" never lands before the moment it was taken.
pub fn ceil_to_micros(value: DateTime<Utc>) -> DateTime<Utc> {
    let truncated = value.trunc_subsecs(6);
    if truncated < value {
        truncated + Duration::microseconds(1)
    } else {
        truncated
    }
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| anyhow!("unrecognized timestamp format"))
        .with_context(|| format!("failed to parse {field} '{value}'"))
}
