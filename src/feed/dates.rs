//! Publication date normalization.
//!
//! Feed producers put almost anything into `<pubDate>`. [`parse`] tries a
//! fixed, ordered list of layouts and returns the first one that matches.
//! The order matters: several layouts are prefixes or near-duplicates of each
//! other, so the same input must always resolve through the same layout.
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use thiserror::Error;

/// No known layout matched the input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no known date layout matches `{input}`")]
pub struct DateParseError {
    pub input: String,
}

/// How a layout carries its timezone.
#[derive(Debug, Clone, Copy)]
enum Zone {
    /// No zone in the text, interpreted as UTC.
    None,
    /// Numeric offset such as `-0700`, handled by chrono's `%z`.
    Numeric,
    /// Alphabetic abbreviation such as `MST`, `from_end` tokens from the end.
    Abbrev { from_end: usize },
    /// RFC 3339, with or without fractional seconds.
    Rfc3339 { fractional: bool },
    /// Bare time of day, placed on 0000-01-01 UTC.
    TimeOfDay,
}

/// A leading day name, checked for spelling and then discarded.
///
/// chrono rejects a weekday that disagrees with the date, but feeds get the
/// weekday wrong often enough that the date itself is the better signal.
#[derive(Debug, Clone, Copy)]
enum DayName {
    Absent,
    /// `Mon` followed by `sep`.
    Short { sep: &'static str },
    /// `Monday` followed by `sep`.
    Long { sep: &'static str },
}

#[derive(Debug, Clone, Copy)]
struct Layout {
    name: &'static str,
    day: DayName,
    /// Format of the text after the day name.
    format: &'static str,
    zone: Zone,
}

const SHORT_DAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
const LONG_DAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Known layouts, tried in this order.
const LAYOUTS: [Layout; 12] = [
    Layout {
        name: "reference",
        day: DayName::Absent,
        format: "%m/%d %I:%M:%S%p '%y %z",
        zone: Zone::Numeric,
    },
    Layout {
        name: "ansi-c",
        day: DayName::Short { sep: " " },
        format: "%b %e %H:%M:%S %Y",
        zone: Zone::None,
    },
    Layout {
        name: "unix-date",
        day: DayName::Short { sep: " " },
        format: "%b %e %H:%M:%S %Z %Y",
        zone: Zone::Abbrev { from_end: 1 },
    },
    Layout {
        name: "ruby-date",
        day: DayName::Short { sep: " " },
        format: "%b %d %H:%M:%S %z %Y",
        zone: Zone::Numeric,
    },
    Layout {
        name: "rfc822",
        day: DayName::Absent,
        format: "%d %b %y %H:%M %Z",
        zone: Zone::Abbrev { from_end: 0 },
    },
    Layout {
        name: "rfc822z",
        day: DayName::Absent,
        format: "%d %b %y %H:%M %z",
        zone: Zone::Numeric,
    },
    Layout {
        name: "rfc850",
        day: DayName::Long { sep: ", " },
        format: "%d-%b-%y %H:%M:%S %Z",
        zone: Zone::Abbrev { from_end: 0 },
    },
    Layout {
        name: "rfc1123",
        day: DayName::Short { sep: ", " },
        format: "%d %b %Y %H:%M:%S %Z",
        zone: Zone::Abbrev { from_end: 0 },
    },
    Layout {
        name: "rfc1123z",
        day: DayName::Short { sep: ", " },
        format: "%d %b %Y %H:%M:%S %z",
        zone: Zone::Numeric,
    },
    Layout {
        name: "rfc3339",
        day: DayName::Absent,
        format: "",
        zone: Zone::Rfc3339 { fractional: false },
    },
    Layout {
        name: "rfc3339-nano",
        day: DayName::Absent,
        format: "",
        zone: Zone::Rfc3339 { fractional: true },
    },
    Layout {
        name: "kitchen",
        day: DayName::Absent,
        format: "%I:%M%p",
        zone: Zone::TimeOfDay,
    },
];

/// Parse a loosely formatted timestamp into a UTC instant.
///
/// Runs of whitespace are collapsed before matching, so space-padded days
/// (`Mon Jan  2 ...`) match the same layouts as single-spaced ones.
pub fn parse(raw: &str) -> Result<DateTime<Utc>, DateParseError> {
    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    if !normalized.is_empty() {
        for layout in &LAYOUTS {
            if let Some(instant) = try_layout(layout, &normalized) {
                tracing::trace!(layout = layout.name, input = %raw, "Parsed publication date");
                return Ok(instant);
            }
        }
    }

    Err(DateParseError {
        input: raw.to_string(),
    })
}

/// Drop a correctly spelled leading day name, or reject the input.
fn strip_day_name(day: DayName, s: &str) -> Option<&str> {
    let (names, sep): (&[&str], &str) = match day {
        DayName::Absent => return Some(s),
        DayName::Short { sep } => (&SHORT_DAYS, sep),
        DayName::Long { sep } => (&LONG_DAYS, sep),
    };
    let (token, rest) = s.split_once(sep)?;
    names
        .iter()
        .any(|name| name.eq_ignore_ascii_case(token))
        .then_some(rest)
}

fn try_layout(layout: &Layout, s: &str) -> Option<DateTime<Utc>> {
    let s = strip_day_name(layout.day, s)?;
    match layout.zone {
        Zone::None => NaiveDateTime::parse_from_str(s, layout.format)
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive)),
        Zone::Numeric => DateTime::parse_from_str(s, layout.format)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Zone::Abbrev { from_end } => {
            let abbrev = s.split(' ').rev().nth(from_end)?;
            if abbrev.is_empty() || !abbrev.chars().all(|c| c.is_ascii_alphabetic()) {
                return None;
            }
            let naive = NaiveDateTime::parse_from_str(s, layout.format).ok()?;
            let offset = FixedOffset::east_opt(abbreviation_offset(abbrev))?;
            offset
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc))
        }
        Zone::Rfc3339 { fractional } => {
            if s.contains('.') != fractional {
                return None;
            }
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        }
        Zone::TimeOfDay => {
            let time = NaiveTime::parse_from_str(s, layout.format).ok()?;
            let date = NaiveDate::from_ymd_opt(0, 1, 1)?;
            Some(Utc.from_utc_datetime(&date.and_time(time)))
        }
    }
}

/// UTC offset in seconds for a zone abbreviation. Unknown names resolve to UTC.
fn abbreviation_offset(abbrev: &str) -> i32 {
    const HOUR: i32 = 3600;
    match abbrev.to_ascii_uppercase().as_str() {
        "EDT" => -4 * HOUR,
        "EST" | "CDT" => -5 * HOUR,
        "CST" | "MDT" => -6 * HOUR,
        "MST" | "PDT" => -7 * HOUR,
        "PST" => -8 * HOUR,
        _ => 0,
    }
}
