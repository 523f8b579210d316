// ── Timestamp normalization ──
//
// Cherwell reports modification times without a UTC offset, while records
// seeded from other systems may carry one. Both shapes normalize to UTC:
// an embedded offset is authoritative, otherwise the caller's default
// offset (hours east of UTC) is subtracted.

use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use regex::Regex;

use crate::error::CoreError;

/// Default offset, in hours, for timestamps that carry none.
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 0;

/// Display format for modification times.
pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static OFFSET_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([+-])(\d\d):?(\d\d)$").expect("valid offset suffix regex")
});

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Parse `text` into a UTC instant.
///
/// A trailing `[+-]HH:MM` or `[+-]HHMM` wins over `default_offset_hours`;
/// a trailing `Z` means UTC. Empty text is [`CoreError::MissingData`],
/// anything unreadable is [`CoreError::InvalidDate`].
pub fn parse_datetime(text: &str, default_offset_hours: i32) -> Result<DateTime<Utc>, CoreError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CoreError::MissingData("empty date/time".into()));
    }
    let invalid = |reason: &str| CoreError::InvalidDate {
        value: text.to_owned(),
        reason: reason.to_owned(),
    };

    if let Some(caps) = OFFSET_SUFFIX.captures(text) {
        let (Some(whole), Some(sign), Some(hours), Some(minutes)) =
            (caps.get(0), caps.get(1), caps.get(2), caps.get(3))
        else {
            return Err(invalid("unreadable UTC offset"));
        };
        let naive = parse_naive(&text[..whole.start()]).ok_or_else(|| invalid("unrecognized format"))?;
        let hours: i32 = hours.as_str().parse().map_err(|_| invalid("bad offset hours"))?;
        let minutes: i32 = minutes
            .as_str()
            .parse()
            .map_err(|_| invalid("bad offset minutes"))?;
        let seconds = (hours * 3600 + minutes * 60) * if sign.as_str() == "-" { -1 } else { 1 };
        let offset = FixedOffset::east_opt(seconds).ok_or_else(|| invalid("offset out of range"))?;
        return naive
            .and_local_timezone(offset)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| invalid("ambiguous local time"));
    }

    if let Some(utc) = text.strip_suffix('Z') {
        let naive = parse_naive(utc).ok_or_else(|| invalid("unrecognized format"))?;
        return Ok(naive.and_utc());
    }

    let naive = parse_naive(text).ok_or_else(|| invalid("unrecognized format"))?;
    naive
        .checked_sub_signed(TimeDelta::hours(i64::from(default_offset_hours)))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| invalid("out of range"))
}

fn parse_naive(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Render a UTC instant the way Cherwell displays modification times.
pub fn format_display(instant: &DateTime<Utc>) -> String {
    instant.format(DISPLAY_FORMAT).to_string()
}

/// Render a UTC instant for storage in a date/time field.
pub fn format_field(instant: &DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%S%:z").to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn expected() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2012, 2, 9, 14, 42, 13).unwrap()
    }

    #[test]
    fn embedded_offset_is_authoritative() {
        assert_eq!(parse_datetime("2012-02-09T09:42:13-05:00", 0).unwrap(), expected());
        assert_eq!(parse_datetime("2012-02-09T09:42:13-0500", 7).unwrap(), expected());
        assert_eq!(parse_datetime("2012-02-09T16:42:13+02:00", -5).unwrap(), expected());
    }

    #[test]
    fn naive_time_uses_default_offset() {
        assert_eq!(parse_datetime("2012-02-09T09:42:13", -5).unwrap(), expected());
        assert_eq!(parse_datetime("2012-02-09 14:42:13", 0).unwrap(), expected());
        assert_eq!(parse_datetime("2/9/2012 9:42:13 AM", -5).unwrap(), expected());
    }

    #[test]
    fn us_dates_take_either_clock() {
        let minute = Utc.with_ymd_and_hms(2012, 2, 9, 14, 42, 0).unwrap();
        assert_eq!(parse_datetime("02/09/2012 14:42", 0).unwrap(), minute);
        assert_eq!(parse_datetime("02/09/2012 2:42 PM", 0).unwrap(), minute);
        assert_eq!(parse_datetime("02/09/2012 14:42:13", 0).unwrap(), expected());
    }

    #[test]
    fn zulu_suffix_is_utc() {
        assert_eq!(parse_datetime("2012-02-09T14:42:13Z", -5).unwrap(), expected());
    }

    #[test]
    fn fractional_seconds_are_accepted() {
        let parsed = parse_datetime("2012-02-09T14:42:13.250", 0).unwrap();
        assert_eq!(parsed.timestamp(), expected().timestamp());
    }

    #[test]
    fn empty_is_missing_and_garbage_is_invalid() {
        assert!(matches!(parse_datetime("  ", 0), Err(CoreError::MissingData(_))));
        assert!(matches!(
            parse_datetime("bogus", 0),
            Err(CoreError::InvalidDate { ref value, .. }) if value == "bogus"
        ));
    }

    #[test]
    fn display_format() {
        assert_eq!(format_display(&expected()), "2012-02-09 14:42:13");
        assert_eq!(format_field(&expected()), "2012-02-09T14:42:13+00:00");
    }
}
