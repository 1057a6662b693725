use chrono::{Duration, NaiveDate};
use thiserror::Error;

use crate::error::AttendanceError;

/// (format, separator, index of the year field, digits in the year field)
const DATE_FORMATS: [(&str, char, usize, usize); 6] = [
    ("%Y-%m-%d", '-', 0, 4),
    ("%m/%d/%Y", '/', 2, 4),
    ("%m-%d-%Y", '-', 2, 4),
    ("%m/%d/%y", '/', 2, 2),
    ("%Y/%m/%d", '/', 0, 4),
    ("%m-%d-%y", '-', 2, 2),
];

/// Spreadsheet serials count days from this base (the 1900 date system with the
/// leap-year bug folded in).
const SERIAL_BASE: (i32, u32, u32) = (1899, 12, 30);
const SERIAL_MAX: i64 = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported date format: {0:?}")]
pub struct DateFormatError(pub String);

/// Parses the date shapes found in hand-edited and spreadsheet-exported CSVs.
pub fn parse_date_any(value: &str) -> Result<NaiveDate, DateFormatError> {
    let s = value.trim();
    let (iso_fmt, rest) = DATE_FORMATS.split_at(1);
    if let Some(d) = parse_with(s, iso_fmt[0]) {
        return Ok(d);
    }
    if let Some(d) = parse_serial(s) {
        return Ok(d);
    }
    rest.iter()
        .find_map(|f| parse_with(s, *f))
        .ok_or_else(|| DateFormatError(value.to_string()))
}

// chrono's %Y happily reads two digits, so "8/15/24" would land in year 24
// without the width check.
fn parse_with(
    s: &str,
    (fmt, sep, year_idx, year_width): (&str, char, usize, usize),
) -> Option<NaiveDate> {
    let parts: Vec<&str> = s.split(sep).collect();
    if parts.len() != 3 || parts.get(year_idx)?.len() != year_width {
        return None;
    }
    NaiveDate::parse_from_str(s, fmt).ok()
}

fn parse_serial(s: &str) -> Option<NaiveDate> {
    let n = s.parse::<i64>().ok()?;
    if !(1..=SERIAL_MAX).contains(&n) {
        return None;
    }
    let (y, m, d) = SERIAL_BASE;
    NaiveDate::from_ymd_opt(y, m, d)?.checked_add_signed(Duration::days(n))
}

/// Strict ISO parse for dates arriving through request params.
pub fn parse_iso(value: &str) -> Result<NaiveDate, DateFormatError> {
    parse_with(value.trim(), DATE_FORMATS[0]).ok_or_else(|| DateFormatError(value.to_string()))
}

pub fn iso(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

/// Closed ranges must not run backwards.
pub fn ensure_ordered(start: NaiveDate, end: NaiveDate) -> Result<(), AttendanceError> {
    if end < start {
        return Err(AttendanceError::InvalidRange {
            start: iso(start),
            end: iso(end),
        });
    }
    Ok(())
}
