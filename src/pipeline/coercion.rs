//! Value coercion for raw log cells
//!
//! Numeric cells are strict base-10 floats. Timestamps use the fixed
//! `DD-MM-YYYY HH:MM:SS` layout in the producer's local zone, falling back
//! to UTC when the zone cannot be resolved. The fallback is reported on every
//! parsed timestamp so callers can observe it.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// chrono format for `DD-MM-YYYY HH:MM:SS`
pub const TIMESTAMP_LAYOUT: &str = "%d-%m-%Y %H:%M:%S";

/// Written by the monitoring application for readings it could not take
pub const MISSING_SENTINEL: &str = "N/A";

#[derive(Debug, Clone, PartialEq)]
pub enum CoercionError {
    NotNumeric(String),
    TimestampLayout(String),
}

impl std::fmt::Display for CoercionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoercionError::NotNumeric(raw) => write!(f, "not a number: '{}'", raw),
            CoercionError::TimestampLayout(raw) => {
                write!(f, "timestamp '{}' does not match DD-MM-YYYY HH:MM:SS", raw)
            }
        }
    }
}

impl std::error::Error for CoercionError {}

/// Parse a trimmed cell as a finite `f64`.
///
/// `NaN` and infinities are rejected; no sink can store them.
pub fn parse_value(raw: &str) -> Result<f64, CoercionError> {
    let trimmed = raw.trim();
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(CoercionError::NotNumeric(trimmed.to_string())),
    }
}

/// Whether a trimmed cell is the "no reading" sentinel
pub fn is_missing(raw: &str) -> bool {
    raw.trim() == MISSING_SENTINEL
}

/// Time zone the log's local timestamps are interpreted in
#[derive(Debug, Clone)]
pub struct ReferenceZone {
    name: String,
    tz: Option<Tz>,
}

impl ReferenceZone {
    /// Look up an IANA zone name. Unknown names resolve to the UTC fallback.
    pub fn resolve(name: &str) -> Self {
        let tz = name.parse::<Tz>().ok();
        if tz.is_none() {
            log::warn!("⚠️  Unknown time zone '{}', interpreting timestamps as UTC", name);
        }
        Self {
            name: name.to_string(),
            tz,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when timestamps are being read as UTC because the zone was unavailable
    pub fn uses_fallback(&self) -> bool {
        self.tz.is_none()
    }

    fn to_utc(&self, naive: NaiveDateTime) -> DateTime<Utc> {
        match self.tz {
            Some(tz) => local_to_utc(&tz, naive),
            None => Utc.from_utc_datetime(&naive),
        }
    }
}

/// Ambiguous local times take the earlier instant; times inside a
/// spring-forward gap keep the offset in effect before the gap.
fn local_to_utc(tz: &Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    if let Some(local) = tz.from_local_datetime(&naive).earliest() {
        return local.with_timezone(&Utc);
    }
    let hour = Duration::hours(1);
    match tz.from_local_datetime(&(naive - hour)).earliest() {
        Some(before_gap) => before_gap.with_timezone(&Utc) + hour,
        None => Utc.from_utc_datetime(&naive),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedTimestamp {
    pub at: DateTime<Utc>,
    pub used_fallback_zone: bool,
}

/// Parse a data row timestamp in the reference zone
pub fn parse_timestamp(raw: &str, zone: &ReferenceZone) -> Result<ParsedTimestamp, CoercionError> {
    let trimmed = raw.trim();
    let naive = NaiveDateTime::parse_from_str(trimmed, TIMESTAMP_LAYOUT)
        .map_err(|_| CoercionError::TimestampLayout(trimmed.to_string()))?;

    Ok(ParsedTimestamp {
        at: zone.to_utc(naive),
        used_fallback_zone: zone.uses_fallback(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("55.5"), Ok(55.5));
        assert_eq!(parse_value("  -3 "), Ok(-3.0));
        assert_eq!(parse_value("1e3"), Ok(1000.0));
        assert_eq!(parse_value("N/A"), Err(CoercionError::NotNumeric("N/A".to_string())));
        assert!(parse_value("").is_err());
        assert!(parse_value("12 MHz").is_err());
        assert!(parse_value("1,5").is_err());
    }

    #[test]
    fn test_parse_value_rejects_non_finite() {
        assert!(parse_value("NaN").is_err());
        assert!(parse_value("inf").is_err());
        assert!(parse_value("-infinity").is_err());
    }

    #[test]
    fn test_is_missing() {
        assert!(is_missing("N/A"));
        assert!(is_missing(" N/A "));
        assert!(!is_missing("n/a"));
        assert!(!is_missing("NA"));
    }

    #[test]
    fn test_timestamp_winter_in_london() {
        let zone = ReferenceZone::resolve("Europe/London");
        let parsed = parse_timestamp("01-01-2024 10:00:00", &zone).unwrap();

        assert_eq!(parsed.at, utc(2024, 1, 1, 10, 0, 0));
        assert!(!parsed.used_fallback_zone);
    }

    #[test]
    fn test_timestamp_summer_in_london() {
        // BST is UTC+1
        let zone = ReferenceZone::resolve("Europe/London");
        let parsed = parse_timestamp("15-07-2024 10:00:00", &zone).unwrap();

        assert_eq!(parsed.at, utc(2024, 7, 15, 9, 0, 0));
    }

    #[test]
    fn test_timestamp_unknown_zone_falls_back_to_utc() {
        let zone = ReferenceZone::resolve("Mars/Olympus_Mons");
        assert!(zone.uses_fallback());
        assert_eq!(zone.name(), "Mars/Olympus_Mons");

        let parsed = parse_timestamp("15-07-2024 10:00:00", &zone).unwrap();
        assert_eq!(parsed.at, utc(2024, 7, 15, 10, 0, 0));
        assert!(parsed.used_fallback_zone);
    }

    #[test]
    fn test_timestamp_layout_mismatch() {
        let zone = ReferenceZone::resolve("Europe/London");
        assert!(matches!(
            parse_timestamp("2024-01-01 10:00:00", &zone),
            Err(CoercionError::TimestampLayout(_))
        ));
        assert!(parse_timestamp("N/A", &zone).is_err());
        assert!(parse_timestamp("", &zone).is_err());
    }

    #[test]
    fn test_timestamp_ambiguous_takes_earlier() {
        // 27-10-2024 01:30 happens twice in London; the BST one comes first
        let zone = ReferenceZone::resolve("Europe/London");
        let parsed = parse_timestamp("27-10-2024 01:30:00", &zone).unwrap();

        assert_eq!(parsed.at, utc(2024, 10, 27, 0, 30, 0));
    }

    #[test]
    fn test_timestamp_in_gap_keeps_previous_offset() {
        // 31-03-2024 01:30 does not exist in London; read it as GMT
        let zone = ReferenceZone::resolve("Europe/London");
        let parsed = parse_timestamp("31-03-2024 01:30:00", &zone).unwrap();

        assert_eq!(parsed.at, utc(2024, 3, 31, 1, 30, 0));
    }
}
