//! Timestamp codec for the journal and log lines.
//!
//! Timestamps round-trip as `YYYY-MM-DDTHH:MM:SS.<microseconds>`. The writer
//! always emits a six-digit zero-padded fraction; the reader splits on the
//! first `.` and treats the suffix as an integer count of microseconds with
//! one trailing `Z` tolerated. Off-the-shelf ISO-8601 parsers disagree on
//! fractional seconds, so the codec is explicit about both directions.

use chrono::{Duration, NaiveDateTime, Timelike};

/// Failure to decode a journal timestamp.
#[derive(Debug, thiserror::Error)]
pub enum TimestampError {
    /// The seconds-resolution prefix did not parse.
    #[error("invalid datetime prefix: {0}")]
    DateTime(#[from] chrono::ParseError),
    /// The microsecond suffix was not an integer.
    #[error("invalid microsecond suffix: {0}")]
    Micros(#[from] std::num::ParseIntError),
}

/// Current naive local wall-clock time, microsecond resolution.
pub fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Format a timestamp with an always-present six-digit microsecond fraction.
pub fn format_micros(ts: &NaiveDateTime) -> String {
    format!(
        "{}.{:06}",
        ts.format("%Y-%m-%dT%H:%M:%S"),
        ts.nanosecond() / 1_000
    )
}

/// Parse a timestamp previously written by [`format_micros`].
///
/// The suffix is an integer microsecond count, so `.5` means five
/// microseconds. A missing fraction means zero.
pub fn parse_micros(raw: &str) -> Result<NaiveDateTime, TimestampError> {
    let (prefix, fraction) = match raw.split_once('.') {
        Some((prefix, fraction)) => (prefix, Some(fraction)),
        None => (raw, None),
    };
    let base = NaiveDateTime::parse_from_str(prefix, "%Y-%m-%dT%H:%M:%S")?;
    let micros = match fraction {
        Some(digits) => digits.trim_end_matches('Z').parse::<i64>()?,
        None => 0,
    };
    Ok(base + Duration::microseconds(micros))
}

/// Serde adapter applying the codec to struct fields.
pub mod serde_micros {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize through [`super::format_micros`].
    pub fn serialize<S>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_micros(ts))
    }

    /// Deserialize through [`super::parse_micros`].
    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_micros(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample(micros: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_micro_opt(14, 5, 9, micros)
            .unwrap()
    }

    #[test]
    fn format_pads_fraction_to_six_digits() {
        assert_eq!(format_micros(&sample(42)), "2024-03-09T14:05:09.000042");
        assert_eq!(format_micros(&sample(0)), "2024-03-09T14:05:09.000000");
    }

    #[test]
    fn round_trip_is_exact() {
        for micros in [0, 1, 999, 123_456, 999_999] {
            let ts = sample(micros);
            assert_eq!(parse_micros(&format_micros(&ts)).unwrap(), ts);
        }
    }

    #[test]
    fn trailing_z_is_tolerated() {
        let parsed = parse_micros("2024-03-09T14:05:09.000042Z").unwrap();
        assert_eq!(parsed, sample(42));
    }

    #[test]
    fn missing_fraction_means_zero() {
        let parsed = parse_micros("2024-03-09T14:05:09").unwrap();
        assert_eq!(parsed, sample(0));
    }

    #[test]
    fn suffix_is_an_integer_microsecond_count() {
        // `.5` is five microseconds, not half a second.
        let parsed = parse_micros("2024-03-09T14:05:09.5").unwrap();
        assert_eq!(parsed, sample(5));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_micros("not a timestamp").is_err());
        assert!(parse_micros("2024-03-09T14:05:09.banana").is_err());
    }
}
