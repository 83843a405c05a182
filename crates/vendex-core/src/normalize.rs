//! Tolerant conversions from raw cell text to numbers and dates.
//!
//! Every function here is total: arbitrary input yields a value (or `None`
//! for the date parsers), never a panic. The `parse_*` variants report
//! whether the value is a fallback through [`Extracted`].

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;

use crate::models::Extracted;

/// Ceiling applied to inventory counts (oversell cap, sold count).
pub const DEFAULT_CEILING: u64 = 99_999;

/// No clamping.
pub const NO_CEILING: u64 = u64::MAX;

static INT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9][0-9,]*").expect("valid integer pattern"));

static FLOAT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9][0-9,]*(?:\.[0-9]+)?|\.[0-9]+").expect("valid float pattern")
});

static DIGITS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+").expect("valid digits pattern"));

/// Leading `MM-DD`, `MM/DD`, `MM.DD` or `M月D日`, not followed by a clock.
static MONTH_DAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[0-9]{1,2}\s*[-/.月]\s*[0-9]{1,2}(?:[^0-9:]|$)")
        .expect("valid month-day pattern")
});

/// Fold full-width ASCII variants and the ideographic space to plain ASCII.
pub fn to_half_width(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{3000}' => ' ',
            '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            _ => c,
        })
        .collect()
}

/// Join whitespace runs into single spaces and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Replace the year/month/day markers of Chinese dates with spaces.
pub fn strip_date_markers(text: &str) -> String {
    text.replace(['年', '月', '日'], " ")
}

/// First integer in `text`, clamped to `ceiling`; degraded `0` when there is none.
///
/// Thousands separators are accepted. A digit run too large for `u64` is
/// clamped like any other oversized value.
pub fn parse_int(text: &str, ceiling: u64) -> Extracted<u64> {
    let text = to_half_width(text);
    let Some(m) = INT_RE.find(&text) else {
        return Extracted::degraded(0);
    };
    let digits: String = m.as_str().chars().filter(char::is_ascii_digit).collect();
    match digits.parse::<u64>() {
        Ok(value) => Extracted::ok(value.min(ceiling)),
        // only overflow is left once the run is pure digits
        Err(_) => Extracted::ok(ceiling),
    }
}

pub fn normalize_int(text: &str, ceiling: u64) -> u64 {
    parse_int(text, ceiling).value
}

/// First decimal number in `text`, ignoring currency and unit decoration;
/// degraded `0.0` when there is none.
pub fn parse_float(text: &str) -> Extracted<f64> {
    let text = to_half_width(text);
    FLOAT_RE
        .find(&text)
        .and_then(|m| m.as_str().replace(',', "").parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .map(Extracted::ok)
        .unwrap_or_else(|| Extracted::degraded(0.0))
}

pub fn normalize_float(text: &str) -> f64 {
    parse_float(text).value
}

/// Parse a timestamp from loosely formatted text.
///
/// The numeric tokens must start with a 4-digit year followed by month and
/// day, or with a single `YYYYMMDD` token. Up to three further tokens are
/// read as hour, minute and second; missing ones are zero. Separators and
/// any non-digit noise in between are ignored.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = to_half_width(text);
    let tokens: Vec<&str> = DIGITS_RE.find_iter(&text).map(|m| m.as_str()).collect();
    let (first, rest) = tokens.split_first()?;

    let (date, rest) = match first.len() {
        8 => {
            let date = NaiveDate::from_ymd_opt(
                first[..4].parse().ok()?,
                first[4..6].parse().ok()?,
                first[6..].parse().ok()?,
            )?;
            (date, rest)
        }
        4 => {
            let [month, day, rest @ ..] = rest else {
                return None;
            };
            let date =
                NaiveDate::from_ymd_opt(first.parse().ok()?, month.parse().ok()?, day.parse().ok()?)?;
            (date, rest)
        }
        _ => return None,
    };

    let clock: Vec<u32> = rest
        .iter()
        .take(3)
        .map(|t| t.parse().ok())
        .collect::<Option<_>>()?;
    let at = |i: usize| clock.get(i).copied().unwrap_or(0);
    let time = NaiveTime::from_hms_opt(at(0), at(1), at(2))?;

    Some(date.and_time(time))
}

/// Like [`parse_timestamp`], but supplies `year` when the text omits it
/// (the site prints recent dates as `MM-DD HH:MM`).
///
/// The year is only supplied to text that starts with a month and day, so a
/// bare clock such as `09:30` is rejected rather than read as a date.
pub fn parse_timestamp_in_year(text: &str, year: i32) -> Option<NaiveDateTime> {
    parse_timestamp(text).or_else(|| {
        let text = to_half_width(text);
        MONTH_DAY_RE
            .is_match(&text)
            .then(|| parse_timestamp(&format!("{year} {text}")))
            .flatten()
    })
}

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    parse_timestamp(text).map(|ts| ts.date())
}
