//! Timestamp parsing for the listing dialects.
//!
//! None of these functions fail: a date that cannot be read becomes
//! [`NaiveDateTime::MIN`], which callers treat as "unknown".

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};

/// Formats seen in `ls -l` output that carry an explicit year.
const UNIX_YEAR_FORMATS: &[&str] = &["%b %d %Y"];

/// DOS/IIS formats, two-digit years first so `24` is not read as year 24 AD.
const DOS_FORMATS: &[&str] = &[
    "%m-%d-%y %I:%M%p",
    "%m-%d-%Y %I:%M%p",
    "%m-%d-%y %H:%M",
    "%m-%d-%Y %H:%M",
];

/// Parses an MLSD `modify` fact: `yyyyMMddHHmmss[.fff]`.
#[must_use]
pub fn parse_mlsd_timestamp(value: &str) -> NaiveDateTime {
    let (whole, fraction) = value.trim().split_once('.').unwrap_or((value.trim(), ""));

    let Ok(parsed) = NaiveDateTime::parse_from_str(whole, "%Y%m%d%H%M%S") else {
        return NaiveDateTime::MIN;
    };

    if fraction.is_empty() {
        return parsed;
    }
    if !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDateTime::MIN;
    }

    // Keep millisecond precision; pad "5" to "500".
    let millis: String = fraction.chars().chain("000".chars()).take(3).collect();
    millis
        .parse::<i64>()
        .map_or(NaiveDateTime::MIN, |ms| parsed + Duration::milliseconds(ms))
}

/// Parses the date columns of a Unix listing relative to the local clock.
#[must_use]
pub fn parse_unix_date(value: &str) -> NaiveDateTime {
    parse_unix_date_at(value, Local::now().naive_local())
}

/// Parses the date columns of a Unix listing (`Jan 01 2024` or `Jan 01 10:00`).
///
/// The time-of-day form carries no year; the most recent year that does not
/// put the entry in the future (one day of clock skew tolerated) is assumed.
#[must_use]
pub fn parse_unix_date_at(value: &str, now: NaiveDateTime) -> NaiveDateTime {
    let normalized = normalize(value);

    for format in UNIX_YEAR_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(&normalized, format) {
            return date.and_time(NaiveTime::MIN);
        }
    }

    let year = now.year();
    for candidate_year in [year, year - 1] {
        let stamped = format!("{candidate_year} {normalized}");
        if let Ok(parsed) = NaiveDateTime::parse_from_str(&stamped, "%Y %b %d %H:%M")
            && (candidate_year < year || parsed <= now + Duration::days(1))
        {
            return parsed;
        }
    }

    NaiveDateTime::MIN
}

/// Parses the date columns of a DOS/IIS listing (`01-01-24  10:00AM`).
#[must_use]
pub fn parse_dos_date(value: &str) -> NaiveDateTime {
    let normalized = normalize(value);

    DOS_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&normalized, format).ok())
        .unwrap_or(NaiveDateTime::MIN)
}

/// Collapses runs of whitespace so `Jan  1` and `Jan 1` parse alike.
fn normalize(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_mlsd_timestamp() {
        assert_eq!(parse_mlsd_timestamp("20240101120000"), at(2024, 1, 1, 12, 0));
    }

    #[test]
    fn test_mlsd_timestamp_with_fraction() {
        let parsed = parse_mlsd_timestamp("20240101120000.5");
        assert_eq!(parsed, at(2024, 1, 1, 12, 0) + Duration::milliseconds(500));
    }

    #[test]
    fn test_mlsd_timestamp_invalid() {
        assert_eq!(parse_mlsd_timestamp("yesterday"), NaiveDateTime::MIN);
        assert_eq!(parse_mlsd_timestamp("20240101120000.x"), NaiveDateTime::MIN);
        assert_eq!(parse_mlsd_timestamp(""), NaiveDateTime::MIN);
    }

    #[test]
    fn test_unix_date_with_year() {
        let now = at(2025, 6, 1, 0, 0);
        assert_eq!(parse_unix_date_at("Jan 01 2024", now), at(2024, 1, 1, 0, 0));
        assert_eq!(parse_unix_date_at("Mar  5  2019", now), at(2019, 3, 5, 0, 0));
    }

    #[test]
    fn test_unix_date_with_time_uses_current_year() {
        let now = at(2025, 6, 1, 0, 0);
        assert_eq!(parse_unix_date_at("Jan 01 10:00", now), at(2025, 1, 1, 10, 0));
    }

    #[test]
    fn test_unix_date_with_time_in_future_uses_previous_year() {
        let now = at(2025, 6, 1, 0, 0);
        assert_eq!(parse_unix_date_at("Dec 24 09:30", now), at(2024, 12, 24, 9, 30));
    }

    #[test]
    fn test_unix_date_unparsable() {
        let now = at(2025, 6, 1, 0, 0);
        assert_eq!(parse_unix_date_at("sometime", now), NaiveDateTime::MIN);
    }

    #[test]
    fn test_dos_date() {
        assert_eq!(parse_dos_date("01-01-24  10:00AM"), at(2024, 1, 1, 10, 0));
        assert_eq!(parse_dos_date("12-31-2023  01:15PM"), at(2023, 12, 31, 13, 15));
        assert_eq!(parse_dos_date("07-04-24  18:45"), at(2024, 7, 4, 18, 45));
    }

    #[test]
    fn test_dos_date_unparsable() {
        assert_eq!(parse_dos_date("13-45-24  99:00AM"), NaiveDateTime::MIN);
    }
}
