use csv::{ReaderBuilder, Trim, Writer};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{AttendanceError, Result};

pub const STUDENT_HEADER: [&str; 4] = ["first_name", "last_name", "grade", "active"];
pub const ATTENDANCE_HEADER: [&str; 7] = [
    "date",
    "last_name",
    "first_name",
    "grade",
    "status",
    "notes",
    "year",
];
pub const CALENDAR_HEADER: [&str; 4] = ["date", "type", "description", "year"];

const UTF8_BOM: &str = "\u{feff}";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StudentCsvRow {
    pub first_name: String,
    pub last_name: String,
    pub grade: String,
    pub active: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AttendanceCsvRow {
    pub date: String,
    pub last_name: String,
    pub first_name: String,
    pub grade: String,
    pub status: String,
    pub notes: String,
    pub year: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CalendarCsvRow {
    pub date: String,
    #[serde(rename = "type")]
    pub day_type: String,
    pub description: String,
    pub year: String,
}

/// Writes `header` and `rows`, optionally preceded by a title line and a blank line.
pub fn write_csv<R, F>(title: Option<&str>, header: &[&str], rows: R) -> Result<Vec<u8>>
where
    R: IntoIterator<Item = Vec<F>>,
    F: AsRef<[u8]>,
{
    let mut buf = Vec::new();
    if let Some(t) = title {
        let mut w = Writer::from_writer(buf);
        w.write_record([t])?;
        buf = w
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))?;
        buf.push(b'\n');
    }

    let mut w = Writer::from_writer(buf);
    w.write_record(header)?;
    for row in rows {
        w.write_record(&row)?;
    }
    let out = w
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(out)
}

/// Reads rows by header name. Unknown columns are ignored and missing ones
/// come back as empty strings.
pub fn read_rows<T: DeserializeOwned>(bytes: &[u8]) -> Result<Vec<T>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| AttendanceError::BadParams("csv file is not valid UTF-8".to_string()))?;
    let text = text.strip_prefix(UTF8_BOM).unwrap_or(text);
    let text = skip_title(text);

    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());
    let mut out = Vec::new();
    for rec in rdr.deserialize::<T>() {
        out.push(rec?);
    }
    Ok(out)
}

/// Drops a leading title: a single one-field record followed by a blank line,
/// which is how the attendance export opens.
fn skip_title(text: &str) -> &str {
    let Some((head, rest)) = split_at_blank_line(text) else {
        return text;
    };
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(head.as_bytes());
    let records = match rdr.records().collect::<std::result::Result<Vec<_>, _>>() {
        Ok(records) => records,
        Err(_) => return text,
    };
    match records.as_slice() {
        [title] if title.len() == 1 => rest,
        _ => text,
    }
}

/// Splits around the first blank line that follows some content.
fn split_at_blank_line(text: &str) -> Option<(&str, &str)> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if offset > 0 && line.trim().is_empty() {
            return Some((&text[..offset], &text[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

pub fn parse_bool_flag(raw: &str, default: bool) -> bool {
    let t = raw.trim();
    if t.is_empty() {
        return default;
    }
    matches!(t.to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

pub fn non_empty(raw: &str) -> Option<String> {
    let t = raw.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}
