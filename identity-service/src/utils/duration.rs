//! Access duration grammar used for external invites and the sweep interval.
//!
//! Calendar forms take a whole count: `Nd`, `Nw`, `Nmo` (30 days) and `Ny`
//! (365 days). Anything else is read as a sequence of `<number><unit>` pairs
//! with units `h`, `m`, `s` and `ms`, e.g. `90m` or `1h30m`.

use chrono::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid duration '{input}': {reason}")]
pub struct DurationParseError {
    pub input: String,
    pub reason: &'static str,
}

impl DurationParseError {
    pub fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }
}

const MS_PER_SECOND: i64 = 1_000;
const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

// Order matters: `mo` must be tried before any single-letter suffix.
const CALENDAR_UNITS: [(&str, i64); 4] = [
    ("y", 365 * MS_PER_DAY),
    ("mo", 30 * MS_PER_DAY),
    ("w", 7 * MS_PER_DAY),
    ("d", MS_PER_DAY),
];

pub fn parse_access_duration(input: &str) -> Result<Duration, DurationParseError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(DurationParseError::new(input, "empty"));
    }

    for (suffix, unit_ms) in CALENDAR_UNITS {
        if let Some(count) = s.strip_suffix(suffix) {
            if count.is_empty() || !count.bytes().all(|b| b.is_ascii_digit()) {
                return Err(DurationParseError::new(input, "expected a whole count"));
            }
            let count: i64 = count
                .parse()
                .map_err(|_| DurationParseError::new(input, "count out of range"))?;
            return to_duration(input, count.checked_mul(unit_ms));
        }
    }

    parse_clock_duration(input, s)
}

fn parse_clock_duration(input: &str, s: &str) -> Result<Duration, DurationParseError> {
    let bytes = s.as_bytes();
    let mut total: Option<i64> = Some(0);
    let mut i = 0;

    while i < bytes.len() {
        let digits_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == digits_start {
            return Err(DurationParseError::new(input, "expected a number"));
        }
        let value: i64 = s[digits_start..i]
            .parse()
            .map_err(|_| DurationParseError::new(input, "number out of range"))?;

        let unit_start = i;
        while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
            i += 1;
        }
        let unit_ms = match &s[unit_start..i] {
            "h" => MS_PER_HOUR,
            "m" => MS_PER_MINUTE,
            "s" => MS_PER_SECOND,
            "ms" => 1,
            "" => return Err(DurationParseError::new(input, "missing unit")),
            _ => return Err(DurationParseError::new(input, "unknown unit")),
        };

        total = total
            .and_then(|t| value.checked_mul(unit_ms).and_then(|v| t.checked_add(v)));
    }

    to_duration(input, total)
}

fn to_duration(input: &str, millis: Option<i64>) -> Result<Duration, DurationParseError> {
    match millis {
        None => Err(DurationParseError::new(input, "out of range")),
        Some(ms) if ms <= 0 => Err(DurationParseError::new(input, "must be positive")),
        Some(ms) => Ok(Duration::milliseconds(ms)),
    }
}
