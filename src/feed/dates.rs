//! Date normalization for scraped date text.
//!
//! Pages print dates in whatever format their CMS likes. [`parse_date`] tries
//! a fixed list of layouts in order and keeps the first that fits, so the
//! list order decides ambiguous inputs.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Numeric layouts: `(shape, chrono format)`, see [`has_shape`].
const NUMERIC_LAYOUTS: [(&str, &str); 3] = [
    ("dddd-dd-dd", "%Y-%m-%d"),
    ("dddd/dd/dd", "%Y/%m/%d"),
    ("dd-dd-dddd", "%d-%m-%Y"),
];

/// Parse scraped date text into a calendar date.
///
/// Layouts, in order:
/// 1. `2006-01-02`
/// 2. `2006/01/02`
/// 3. `02-01-2006` (day first)
/// 4. RFC 1123, `Mon, 02 Jan 2006 15:04:05 MST`
/// 5. RFC 3339, `2006-01-02T15:04:05Z07:00`
///
/// Zoned layouts keep the calendar date as written in their own offset.
/// Returns `None` for empty text or when no layout fits.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    for (shape, format) in NUMERIC_LAYOUTS {
        if has_shape(text, shape) {
            if let Ok(date) = NaiveDate::parse_from_str(text, format) {
                return Some(date);
            }
        }
    }

    parse_rfc1123(text).or_else(|| {
        DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|dt| dt.date_naive())
    })
}

/// Midnight UTC of `date` as unix seconds, the storage form of a publish date.
pub fn to_timestamp(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

/// RFC 1123 without the weekday and zone. The hour may drop its leading zero.
const RFC1123_SHAPES: [&str; 2] = ["dd aaa dddd dd:dd:dd", "dd aaa dddd d:dd:dd"];

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// In a shape `d` is one ASCII digit, `a` one ASCII letter, and any other
/// byte must match literally.
fn has_shape(text: &str, shape: &str) -> bool {
    text.len() == shape.len()
        && text.bytes().zip(shape.bytes()).all(|(c, s)| match s {
            b'd' => c.is_ascii_digit(),
            b'a' => c.is_ascii_alphabetic(),
            _ => c == s,
        })
}

/// `Mon, 02 Jan 2006 15:04:05 MST`. The weekday must be a day name but is
/// not checked against the date. The zone is any 3 to 5 letter uppercase
/// abbreviation and only the wall-clock date is kept.
fn parse_rfc1123(text: &str) -> Option<NaiveDate> {
    let (weekday, rest) = text.split_once(", ")?;
    if !WEEKDAYS.iter().any(|day| day.eq_ignore_ascii_case(weekday)) {
        return None;
    }

    let (stamp, zone) = rest.rsplit_once(' ')?;
    if !(3..=5).contains(&zone.len()) || !zone.bytes().all(|b| b.is_ascii_uppercase()) {
        return None;
    }
    if !RFC1123_SHAPES.iter().any(|shape| has_shape(stamp, shape)) {
        return None;
    }

    NaiveDateTime::parse_from_str(stamp, "%d %b %Y %H:%M:%S")
        .ok()
        .map(|dt| dt.date())
}
