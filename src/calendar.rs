use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::csv_io::{self, CalendarCsvRow, CALENDAR_HEADER};
use crate::dates::{ensure_ordered, iso, parse_date_any};
use crate::error::{AttendanceError, Result};
use crate::ics::{self, CalendarRow};
use crate::import::{skip_reason, ImportMode, ImportSummary, UnknownYearPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DayType {
    Regular,
    Holiday,
    #[serde(rename = "In-service")]
    InService,
    Closed,
}

impl DayType {
    pub fn as_str(self) -> &'static str {
        match self {
            DayType::Regular => "Regular",
            DayType::Holiday => "Holiday",
            DayType::InService => "In-service",
            DayType::Closed => "Closed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let key: String = raw
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "regular" => Some(DayType::Regular),
            "holiday" => Some(DayType::Holiday),
            "inservice" => Some(DayType::InService),
            "closed" => Some(DayType::Closed),
            _ => None,
        }
    }

    /// Holiday, In-service and Closed days take no attendance.
    pub fn closes_school(self) -> bool {
        !matches!(self, DayType::Regular)
    }
}

impl ToSql for DayType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for DayType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        DayType::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown day type {s:?}").into()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolYear {
    pub id: String,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct SchoolYearInput {
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEntry {
    pub id: String,
    pub school_year_id: Option<String>,
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub day_type: DayType,
    pub description: Option<String>,
}

const YEAR_COLUMNS: &str = "id, name, start_date, end_date, active";
const ENTRY_COLUMNS: &str = "id, school_year_id, date, type, description";

fn year_from_row(r: &Row<'_>) -> rusqlite::Result<SchoolYear> {
    Ok(SchoolYear {
        id: r.get(0)?,
        name: r.get(1)?,
        start_date: r.get(2)?,
        end_date: r.get(3)?,
        active: r.get::<_, i64>(4)? != 0,
    })
}

fn entry_from_row(r: &Row<'_>) -> rusqlite::Result<CalendarEntry> {
    Ok(CalendarEntry {
        id: r.get(0)?,
        school_year_id: r.get(1)?,
        date: r.get(2)?,
        day_type: r.get(3)?,
        description: r.get(4)?,
    })
}

// ---------- School years ----------

pub fn list_years(conn: &Connection) -> Result<Vec<SchoolYear>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {YEAR_COLUMNS} FROM school_years ORDER BY start_date, name"
    ))?;
    let rows = stmt
        .query_map([], year_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn get_year(conn: &Connection, id: &str) -> Result<Option<SchoolYear>> {
    Ok(conn
        .query_row(
            &format!("SELECT {YEAR_COLUMNS} FROM school_years WHERE id = ?"),
            [id],
            year_from_row,
        )
        .optional()?)
}

pub fn require_year(conn: &Connection, id: &str) -> Result<SchoolYear> {
    get_year(conn, id)?.ok_or(AttendanceError::NotFound("school year"))
}

pub fn year_by_name(conn: &Connection, name: &str) -> Result<Option<SchoolYear>> {
    Ok(conn
        .query_row(
            &format!("SELECT {YEAR_COLUMNS} FROM school_years WHERE name = ?"),
            [name],
            year_from_row,
        )
        .optional()?)
}

/// The school year whose closed range contains `d`.
///
/// Overlapping ranges are refused on write, but a workspace may predate that
/// rule; the latest-starting year wins, then the first by name.
pub fn school_year_for_date(conn: &Connection, d: NaiveDate) -> Result<Option<SchoolYear>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {YEAR_COLUMNS} FROM school_years
                 WHERE start_date <= ?1 AND end_date >= ?1
                 ORDER BY start_date DESC, name
                 LIMIT 1"
            ),
            [d],
            year_from_row,
        )
        .optional()?)
}

fn validate_year(
    conn: &Connection,
    input: &SchoolYearInput,
    exclude_id: Option<&str>,
) -> Result<()> {
    if input.name.trim().is_empty() {
        return Err(AttendanceError::BadParams(
            "school year name must not be empty".to_string(),
        ));
    }
    ensure_ordered(input.start_date, input.end_date)?;
    let overlapping: Option<String> = conn
        .query_row(
            "SELECT name FROM school_years
             WHERE start_date <= ?1 AND end_date >= ?2 AND (?3 IS NULL OR id != ?3)
             ORDER BY start_date
             LIMIT 1",
            rusqlite::params![input.end_date, input.start_date, exclude_id],
            |r| r.get(0),
        )
        .optional()?;
    if let Some(other) = overlapping {
        return Err(AttendanceError::Conflict(format!(
            "school year overlaps {other}"
        )));
    }
    Ok(())
}

pub fn create_year(conn: &Connection, input: &SchoolYearInput) -> Result<SchoolYear> {
    validate_year(conn, input, None)?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO school_years(id, name, start_date, end_date, active) VALUES(?, ?, ?, ?, ?)",
        rusqlite::params![
            id,
            input.name.trim(),
            input.start_date,
            input.end_date,
            input.active as i64
        ],
    )?;
    require_year(conn, &id)
}

pub fn update_year(conn: &Connection, id: &str, input: &SchoolYearInput) -> Result<SchoolYear> {
    require_year(conn, id)?;
    validate_year(conn, input, Some(id))?;
    conn.execute(
        "UPDATE school_years SET name = ?, start_date = ?, end_date = ?, active = ? WHERE id = ?",
        rusqlite::params![
            input.name.trim(),
            input.start_date,
            input.end_date,
            input.active as i64,
            id
        ],
    )?;
    require_year(conn, id)
}

/// Detaches attendance and calendar rows from the year, then removes it.
pub fn delete_year(conn: &Connection, id: &str) -> Result<()> {
    require_year(conn, id)?;
    conn.execute(
        "UPDATE attendance SET school_year_id = NULL WHERE school_year_id = ?",
        [id],
    )?;
    conn.execute(
        "UPDATE school_calendar SET school_year_id = NULL WHERE school_year_id = ?",
        [id],
    )?;
    conn.execute("DELETE FROM school_years WHERE id = ?", [id])?;
    Ok(())
}

// ---------- Calendar entries ----------

pub fn find_entry(
    conn: &Connection,
    d: NaiveDate,
    school_year_id: Option<&str>,
) -> Result<Option<CalendarEntry>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM school_calendar WHERE date = ? AND school_year_id IS ?"
            ),
            rusqlite::params![d, school_year_id],
            entry_from_row,
        )
        .optional()?)
}

pub fn get_entry(conn: &Connection, id: &str) -> Result<CalendarEntry> {
    conn.query_row(
        &format!("SELECT {ENTRY_COLUMNS} FROM school_calendar WHERE id = ?"),
        [id],
        entry_from_row,
    )
    .optional()?
    .ok_or(AttendanceError::NotFound("calendar entry"))
}

pub fn list_entries(
    conn: &Connection,
    school_year_id: Option<&str>,
    range: Option<(NaiveDate, NaiveDate)>,
) -> Result<Vec<CalendarEntry>> {
    let (start, end) = match range {
        Some((s, e)) => (Some(s), Some(e)),
        None => (None, None),
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM school_calendar
         WHERE (?1 IS NULL OR school_year_id = ?1)
           AND (?2 IS NULL OR date >= ?2)
           AND (?3 IS NULL OR date <= ?3)
         ORDER BY date, school_year_id"
    ))?;
    let rows = stmt
        .query_map(rusqlite::params![school_year_id, start, end], entry_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Decides whether attendance is expected on `d`.
///
/// Weekdays are open unless an entry closes them; weekends are closed unless
/// an entry marks them `Regular`.
pub fn is_school_day(conn: &Connection, d: NaiveDate, school_year_id: Option<&str>) -> Result<bool> {
    let day_type: Option<DayType> = conn
        .query_row(
            "SELECT type FROM school_calendar
             WHERE date = ?1 AND (?2 IS NULL OR school_year_id = ?2)
             ORDER BY school_year_id
             LIMIT 1",
            rusqlite::params![d, school_year_id],
            |r| r.get(0),
        )
        .optional()?;

    let weekend = matches!(d.weekday(), Weekday::Sat | Weekday::Sun);
    Ok(match day_type {
        Some(t) if weekend => t == DayType::Regular,
        None if weekend => false,
        Some(t) => !t.closes_school(),
        None => true,
    })
}

/// Inserts or overwrites the entry keyed by (date, year). Returns whether a row was created.
pub fn upsert_entry(
    conn: &Connection,
    d: NaiveDate,
    school_year_id: Option<&str>,
    day_type: DayType,
    description: Option<&str>,
) -> Result<(CalendarEntry, bool)> {
    let description = description.map(str::trim).filter(|s| !s.is_empty());
    match find_entry(conn, d, school_year_id)? {
        Some(existing) => {
            conn.execute(
                "UPDATE school_calendar SET type = ?, description = ? WHERE id = ?",
                rusqlite::params![day_type, description, existing.id],
            )?;
            Ok((get_entry(conn, &existing.id)?, false))
        }
        None => {
            let id = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO school_calendar(id, school_year_id, date, type, description)
                 VALUES(?, ?, ?, ?, ?)",
                rusqlite::params![id, school_year_id, d, day_type, description],
            )?;
            Ok((get_entry(conn, &id)?, true))
        }
    }
}

/// Saves one day under the school year its date falls in.
pub fn set_day(
    conn: &Connection,
    d: NaiveDate,
    day_type: DayType,
    description: Option<&str>,
) -> Result<CalendarEntry> {
    let year_id = school_year_for_date(conn, d)?.map(|y| y.id);
    let (entry, _) = upsert_entry(conn, d, year_id.as_deref(), day_type, description)?;
    Ok(entry)
}

pub fn bulk_set(
    conn: &Connection,
    start: NaiveDate,
    end: NaiveDate,
    day_type: DayType,
    description: Option<&str>,
) -> Result<usize> {
    ensure_ordered(start, end)?;
    let mut count = 0;
    let mut cur = start;
    while cur <= end {
        set_day(conn, cur, day_type, description)?;
        count += 1;
        cur += Duration::days(1);
    }
    Ok(count)
}

/// Edits an entry in place, re-resolving its school year from the new date.
pub fn update_entry(
    conn: &Connection,
    id: &str,
    d: NaiveDate,
    day_type: DayType,
    description: Option<&str>,
) -> Result<CalendarEntry> {
    get_entry(conn, id)?;
    let year_id = school_year_for_date(conn, d)?.map(|y| y.id);
    if let Some(clash) = find_entry(conn, d, year_id.as_deref())? {
        if clash.id != id {
            return Err(AttendanceError::Conflict(
                "another entry already exists for that date in the same school year".to_string(),
            ));
        }
    }
    let description = description.map(str::trim).filter(|s| !s.is_empty());
    conn.execute(
        "UPDATE school_calendar SET date = ?, type = ?, description = ?, school_year_id = ? WHERE id = ?",
        rusqlite::params![d, day_type, description, year_id, id],
    )?;
    get_entry(conn, id)
}

pub fn delete_entry(conn: &Connection, id: &str) -> Result<()> {
    let n = conn.execute("DELETE FROM school_calendar WHERE id = ?", [id])?;
    if n == 0 {
        return Err(AttendanceError::NotFound("calendar entry"));
    }
    Ok(())
}

// ---------- Month view ----------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridDay {
    pub date: NaiveDate,
    pub in_month: bool,
    pub entries: Vec<CalendarEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthView {
    pub year: i32,
    pub month: u32,
    pub prev: (i32, u32),
    pub next: (i32, u32),
    pub weeks: Vec<Vec<GridDay>>,
}

/// Years the month grid accepts; matches the four-digit ISO dates used elsewhere.
pub const MONTH_YEARS: std::ops::RangeInclusive<i32> = 1..=9999;

/// Normalizes a month that ran one past either end of the year.
pub fn normalize_month(year: i32, month: i64) -> (i32, u32) {
    if month < 1 {
        (year.saturating_sub(1), 12)
    } else if month > 12 {
        (year.saturating_add(1), 1)
    } else {
        (year, month as u32)
    }
}

/// Six Sunday-start weeks covering the month.
pub fn month_view(conn: &Connection, year: i32, month: i64) -> Result<MonthView> {
    let (year, month) = normalize_month(year, month);
    if !MONTH_YEARS.contains(&year) {
        return Err(AttendanceError::BadParams(format!(
            "year must be between {} and {} (got {year})",
            MONTH_YEARS.start(),
            MONTH_YEARS.end()
        )));
    }
    let invalid = || AttendanceError::BadParams(format!("invalid month {year}-{month}"));
    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
    let days_back = first.weekday().num_days_from_sunday() as i64;
    let grid_start = first
        .checked_sub_signed(Duration::days(days_back))
        .ok_or_else(invalid)?;
    let grid_end = grid_start
        .checked_add_signed(Duration::days(41))
        .ok_or_else(invalid)?;

    let mut by_date: BTreeMap<NaiveDate, Vec<CalendarEntry>> = BTreeMap::new();
    for e in list_entries(conn, None, Some((grid_start, grid_end)))? {
        by_date.entry(e.date).or_default().push(e);
    }

    let weeks: Vec<Vec<GridDay>> = (0..6)
        .map(|w| {
            (0..7)
                .map(|d| {
                    let date = grid_start + Duration::days(w * 7 + d);
                    GridDay {
                        date,
                        in_month: date.month() == month,
                        entries: by_date.remove(&date).unwrap_or_default(),
                    }
                })
                .collect()
        })
        .collect();

    Ok(MonthView {
        year,
        month,
        prev: normalize_month(year, month as i64 - 1),
        next: normalize_month(year, month as i64 + 1),
        weeks,
    })
}

// ---------- Import / export ----------

/// Picks the year for an imported row: an explicit name, then the import's
/// target year, then the year containing the date.
pub fn resolve_import_year(
    conn: &Connection,
    year_name: &str,
    target_year: Option<&SchoolYear>,
    d: NaiveDate,
) -> Result<Option<SchoolYear>> {
    let name = year_name.trim();
    if !name.is_empty() {
        return match year_by_name(conn, name)? {
            Some(y) => Ok(Some(y)),
            None => Err(AttendanceError::UnknownSchoolYear(name.to_string())),
        };
    }
    if let Some(y) = target_year {
        return Ok(Some(y.clone()));
    }
    school_year_for_date(conn, d)
}

pub fn export_rows(
    conn: &Connection,
    school_year_id: Option<&str>,
    range: Option<(NaiveDate, NaiveDate)>,
) -> Result<Vec<CalendarRow>> {
    if let Some((start, end)) = range {
        ensure_ordered(start, end)?;
    }
    Ok(list_entries(conn, school_year_id, range)?
        .into_iter()
        .map(|e| CalendarRow {
            date: e.date,
            day_type: e.day_type.as_str().to_string(),
            description: e.description.unwrap_or_default(),
        })
        .collect())
}

pub fn export_ics(
    conn: &Connection,
    school_year_id: Option<&str>,
    range: Option<(NaiveDate, NaiveDate)>,
) -> Result<(Vec<u8>, usize)> {
    let rows = export_rows(conn, school_year_id, range)?;
    Ok((ics::encode_calendar(&rows), rows.len()))
}

pub fn export_csv(
    conn: &Connection,
    school_year_id: Option<&str>,
    range: Option<(NaiveDate, NaiveDate)>,
) -> Result<(Vec<u8>, usize)> {
    if let Some((start, end)) = range {
        ensure_ordered(start, end)?;
    }
    let years: BTreeMap<String, String> = list_years(conn)?
        .into_iter()
        .map(|y| (y.id, y.name))
        .collect();
    let entries = list_entries(conn, school_year_id, range)?;
    let count = entries.len();
    let rows = entries.into_iter().map(|e| {
        let year = e
            .school_year_id
            .as_ref()
            .and_then(|id| years.get(id))
            .cloned()
            .unwrap_or_default();
        vec![
            iso(e.date),
            e.day_type.as_str().to_string(),
            e.description.unwrap_or_default(),
            year,
        ]
    });
    Ok((csv_io::write_csv(None, &CALENDAR_HEADER, rows)?, count))
}

/// Applies decoded ICS rows. In replace mode every (date, year) key present in
/// the file is cleared first.
pub fn import_ics(conn: &Connection, bytes: &[u8], mode: ImportMode) -> Result<ImportSummary> {
    let decoded = ics::decode_calendar(bytes)?;
    let mut summary = ImportSummary::default();
    summary.skip_many(skip_reason::EVENT_TOO_LONG, decoded.truncated_days);
    let rows = decoded.rows;

    let mut resolved: Vec<(NaiveDate, Option<String>, DayType, String)> = Vec::new();
    for row in rows {
        let Some(day_type) = DayType::parse(&row.day_type) else {
            debug!(date = %row.date, day_type = %row.day_type, "skipping ics event with unknown type");
            summary.skip(skip_reason::BAD_TYPE);
            continue;
        };
        let year_id = school_year_for_date(conn, row.date)?.map(|y| y.id);
        resolved.push((row.date, year_id, day_type, row.description));
    }

    if mode == ImportMode::Replace {
        for (d, year_id, _, _) in &resolved {
            conn.execute(
                "DELETE FROM school_calendar WHERE date = ? AND school_year_id IS ?",
                rusqlite::params![d, year_id],
            )?;
        }
    }

    for (d, year_id, day_type, description) in &resolved {
        let (_, created) = upsert_entry(
            conn,
            *d,
            year_id.as_deref(),
            *day_type,
            Some(description.as_str()),
        )?;
        summary.record(created);
    }

    info!(
        created = summary.created,
        updated = summary.updated,
        skipped = summary.skipped,
        "calendar ics imported"
    );
    Ok(summary)
}

/// Applies a `date,type,description,year` CSV. A blank type means `Regular`.
pub fn import_csv(
    conn: &Connection,
    bytes: &[u8],
    mode: ImportMode,
    target_year: Option<&SchoolYear>,
    unknown_year: UnknownYearPolicy,
) -> Result<ImportSummary> {
    let rows: Vec<CalendarCsvRow> = csv_io::read_rows(bytes)?;
    let mut summary = ImportSummary::default();

    for row in rows {
        let d = match parse_date_any(&row.date) {
            Ok(d) => d,
            Err(e) => {
                debug!(error = %e, "skipping calendar row");
                summary.skip(skip_reason::BAD_DATE);
                continue;
            }
        };
        let day_type = if row.day_type.trim().is_empty() {
            DayType::Regular
        } else {
            match DayType::parse(&row.day_type) {
                Some(t) => t,
                None => {
                    debug!(date = %d, day_type = %row.day_type, "skipping calendar row with unknown type");
                    summary.skip(skip_reason::BAD_TYPE);
                    continue;
                }
            }
        };
        let year = match resolve_import_year(conn, &row.year, target_year, d) {
            Ok(y) => y,
            Err(AttendanceError::UnknownSchoolYear(name)) if unknown_year == UnknownYearPolicy::Skip => {
                debug!(date = %d, year = %name, "skipping calendar row with unknown year");
                summary.skip(skip_reason::UNKNOWN_YEAR);
                continue;
            }
            Err(e) => return Err(e),
        };
        let year_id = year.map(|y| y.id);

        if mode == ImportMode::Replace {
            conn.execute(
                "DELETE FROM school_calendar WHERE date = ? AND school_year_id IS ?",
                rusqlite::params![d, year_id],
            )?;
        }
        let (_, created) = upsert_entry(
            conn,
            d,
            year_id.as_deref(),
            day_type,
            csv_io::non_empty(&row.description).as_deref(),
        )?;
        summary.record(created);
    }

    info!(
        created = summary.created,
        updated = summary.updated,
        skipped = summary.skipped,
        "calendar csv imported"
    );
    Ok(summary)
}
