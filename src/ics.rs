//! iCalendar reader/writer for school-calendar days.
//!
//! Reading goes through the `ical` parser; this module maps its events onto
//! calendar rows. Only all-day `VEVENT`s are produced. The day type travels in `CATEGORIES`
//! and is repeated at the front of `SUMMARY` ("Holiday – Labor Day") so that
//! other calendar clients still show something readable.

use chrono::{Duration, NaiveDate};
use ical::parser::ical::component::IcalEvent;
use ical::IcalParser;
use tracing::warn;

use crate::error::{AttendanceError, Result};

pub const SUMMARY_SEPARATOR: &str = " – ";
const PRODID: &str = "-//attendanced//Calendar Export//EN";
const UID_DOMAIN: &str = "attendanced@local";
const FOLD_LIMIT: usize = 75;
/// Longest event expanded; one DTEND must not turn into millions of rows.
pub const MAX_EVENT_DAYS: i64 = 366;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarRow {
    pub date: NaiveDate,
    pub day_type: String,
    pub description: String,
}

impl CalendarRow {
    #[cfg(test)]
    pub fn new(date: NaiveDate, day_type: &str, description: &str) -> Self {
        Self {
            date,
            day_type: day_type.to_string(),
            description: description.to_string(),
        }
    }
}

pub fn encode_calendar(rows: &[CalendarRow]) -> Vec<u8> {
    let mut lines: Vec<String> = vec![
        "BEGIN:VCALENDAR".to_string(),
        format!("PRODID:{}", PRODID),
        "VERSION:2.0".to_string(),
        "CALSCALE:GREGORIAN".to_string(),
        "METHOD:PUBLISH".to_string(),
    ];

    for row in rows {
        let dtstart = fmt_date(row.date);
        let dtend = fmt_date(row.date + Duration::days(1));
        let summary = if row.description.is_empty() {
            row.day_type.clone()
        } else {
            format!("{}{}{}", row.day_type, SUMMARY_SEPARATOR, row.description)
        };
        lines.push("BEGIN:VEVENT".to_string());
        lines.push(format!(
            "UID:{}-{}-{}",
            dtstart,
            alnum(&row.day_type),
            UID_DOMAIN
        ));
        lines.push(format!("SUMMARY:{}", escape_text(&summary)));
        lines.push(format!("CATEGORIES:{}", escape_text(&row.day_type)));
        lines.push(format!("DTSTART;VALUE=DATE:{}", dtstart));
        lines.push(format!("DTEND;VALUE=DATE:{}", dtend));
        lines.push("END:VEVENT".to_string());
    }
    lines.push("END:VCALENDAR".to_string());

    let mut out = String::new();
    for line in &lines {
        out.push_str(&fold_line(line));
        out.push_str("\r\n");
    }
    out.into_bytes()
}

#[derive(Default)]
struct PendingEvent {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    category: Option<String>,
    summary: Option<String>,
}

impl PendingEvent {
    fn from_ical(event: &IcalEvent) -> Self {
        let mut ev = PendingEvent::default();
        for property in &event.properties {
            let Some(value) = property.value.as_deref() else {
                continue;
            };
            match property.name.to_ascii_uppercase().as_str() {
                "DTSTART" => ev.start = parse_ics_date(value),
                "DTEND" => ev.end = parse_ics_date(value),
                "CATEGORIES" => {
                    let first = first_category(value);
                    if !first.is_empty() {
                        ev.category = Some(first);
                    }
                }
                "SUMMARY" => ev.summary = Some(unescape_text(value)),
                _ => {}
            }
        }
        ev
    }

    /// One row per covered day; returns how many trailing days were dropped.
    fn expand_into(self, out: &mut Vec<CalendarRow>) -> usize {
        let Some(start) = self.start else {
            return 0;
        };
        let (day_type, description) = split_type(self.category, self.summary);
        let Some(day_type) = day_type.filter(|t| !t.is_empty()) else {
            return 0;
        };

        let covered = match self.end {
            Some(end) if end > start + Duration::days(1) => (end - start).num_days(),
            _ => 1,
        };
        let days = covered.min(MAX_EVENT_DAYS);
        if covered > days {
            warn!(
                start = %start,
                days = covered,
                kept = days,
                "calendar event truncated"
            );
        }
        out.extend((0..days).map(|i| CalendarRow {
            date: start + Duration::days(i),
            day_type: day_type.clone(),
            description: description.clone(),
        }));
        (covered - days) as usize
    }
}

/// CATEGORIES wins for the type; SUMMARY fills whatever is left.
fn split_type(category: Option<String>, summary: Option<String>) -> (Option<String>, String) {
    let summary = summary.map(|s| s.trim().to_string()).unwrap_or_default();
    match summary.split_once(SUMMARY_SEPARATOR) {
        Some((t, desc)) => {
            let t = t.trim().to_string();
            (category.or(Some(t)), desc.trim().to_string())
        }
        None => match category {
            None if summary.is_empty() => (None, String::new()),
            None => (Some(summary), String::new()),
            Some(c) if summary == c => (Some(c), String::new()),
            Some(c) => (Some(c), summary),
        },
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct DecodedCalendar {
    pub rows: Vec<CalendarRow>,
    /// Days cut from events longer than [`MAX_EVENT_DAYS`].
    pub truncated_days: usize,
}

/// Parses all-day events into one row per covered day. Events without a
/// usable date or type are dropped; a file that is not iCalendar at all is an
/// error.
pub fn decode_calendar(bytes: &[u8]) -> Result<DecodedCalendar> {
    let text = String::from_utf8_lossy(bytes);
    let mut decoded = DecodedCalendar::default();

    for calendar in IcalParser::new(text.as_bytes()) {
        let calendar = calendar.map_err(|e| AttendanceError::BadIcs(e.to_string()))?;
        for event in &calendar.events {
            decoded.truncated_days += PendingEvent::from_ical(event).expand_into(&mut decoded.rows);
        }
    }
    Ok(decoded)
}

fn parse_ics_date(value: &str) -> Option<NaiveDate> {
    let v = value.trim();
    let ymd = v.get(..8)?;
    NaiveDate::parse_from_str(ymd, "%Y%m%d").ok()
}

fn first_category(value: &str) -> String {
    let mut cur = String::new();
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(n) = chars.next() {
                    cur.push('\\');
                    cur.push(n);
                }
            }
            ',' => break,
            _ => cur.push(c),
        }
    }
    unescape_text(cur.trim())
}

fn fmt_date(d: NaiveDate) -> String {
    d.format("%Y%m%d").to_string()
}

fn alnum(s: &str) -> String {
    s.chars().filter(|c| c.is_alphanumeric()).collect()
}

fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(c),
        }
    }
    out
}

fn unescape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Folds at 75 octets without splitting a UTF-8 sequence. Spaces before a
/// fold move to the next line, since readers trim each physical line's end.
fn fold_line(line: &str) -> String {
    if line.len() <= FOLD_LIMIT {
        return line.to_string();
    }
    let mut segments: Vec<String> = Vec::new();
    let mut cur = String::new();
    // Continuation lines carry a leading space, so they hold one octet less.
    let mut limit = FOLD_LIMIT;
    for c in line.chars() {
        let n = c.len_utf8();
        if cur.len() + n > limit {
            limit = FOLD_LIMIT - 1;
            let kept = cur.trim_end_matches(' ').len();
            let carry = if kept > 0 && cur.len() - kept + n <= limit {
                cur.split_off(kept)
            } else {
                String::new()
            };
            segments.push(std::mem::replace(&mut cur, carry));
        }
        cur.push(c);
    }
    segments.push(cur);
    segments.join("\r\n ")
}
