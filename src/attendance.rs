use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::calendar::{self, SchoolYear};
use crate::csv_io::{self, AttendanceCsvRow, ATTENDANCE_HEADER};
use crate::dates::{ensure_ordered, iso, parse_date_any};
use crate::error::{AttendanceError, Result};
use crate::import::{skip_reason, ImportSummary, UnknownYearPolicy};
use crate::roster::{self, Student};

pub const DEFAULT_STATUS: &str = "Present";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub student_id: String,
    pub date: NaiveDate,
    pub status: String,
    pub notes: Option<String>,
    pub grade_at_time: Option<String>,
    pub school_year_id: Option<String>,
}

const RECORD_COLUMNS: &str = "id, student_id, date, status, notes, grade_at_time, school_year_id";

fn record_from_row(r: &Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    Ok(AttendanceRecord {
        id: r.get(0)?,
        student_id: r.get(1)?,
        date: r.get(2)?,
        status: r.get(3)?,
        notes: r.get(4)?,
        grade_at_time: r.get(5)?,
        school_year_id: r.get(6)?,
    })
}

pub fn records_for_date(conn: &Connection, d: NaiveDate) -> Result<Vec<AttendanceRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RECORD_COLUMNS} FROM attendance WHERE date = ? ORDER BY student_id"
    ))?;
    let rows = stmt
        .query_map([d], record_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn find_record(
    conn: &Connection,
    student_id: &str,
    d: NaiveDate,
) -> Result<Option<AttendanceRecord>> {
    Ok(conn
        .query_row(
            &format!("SELECT {RECORD_COLUMNS} FROM attendance WHERE student_id = ? AND date = ?"),
            rusqlite::params![student_id, d],
            record_from_row,
        )
        .optional()?)
}

fn normalize_status(raw: Option<&str>) -> String {
    raw.and_then(csv_io::non_empty)
        .unwrap_or_else(|| DEFAULT_STATUS.to_string())
}

/// Inserts or updates the (student, date) record.
///
/// `grade` overrides the snapshot; without it a new record takes the
/// student's current grade and an existing one keeps its snapshot. The year is
/// only ever moved to a known year, never cleared.
fn upsert_record(
    conn: &Connection,
    student: &Student,
    d: NaiveDate,
    status: &str,
    notes: Option<&str>,
    grade: Option<&str>,
    school_year_id: Option<&str>,
) -> Result<bool> {
    let notes = notes.and_then(csv_io::non_empty);
    match find_record(conn, &student.id, d)? {
        Some(existing) => {
            let snapshot = grade
                .map(str::to_string)
                .or(existing.grade_at_time)
                .or_else(|| student.current_grade.clone());
            conn.execute(
                "UPDATE attendance
                    SET status = ?, notes = ?, grade_at_time = ?,
                        school_year_id = COALESCE(?, school_year_id)
                  WHERE id = ?",
                rusqlite::params![status, notes, snapshot, school_year_id, existing.id],
            )?;
            Ok(false)
        }
        None => {
            let snapshot = grade
                .map(str::to_string)
                .or_else(|| student.current_grade.clone());
            conn.execute(
                "INSERT INTO attendance(id, student_id, date, status, notes, grade_at_time, school_year_id)
                 VALUES(?, ?, ?, ?, ?, ?, ?)",
                rusqlite::params![
                    Uuid::new_v4().to_string(),
                    student.id,
                    d,
                    status,
                    notes,
                    snapshot,
                    school_year_id
                ],
            )?;
            Ok(true)
        }
    }
}

// ---------- Day sheet ----------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySheet {
    pub date: NaiveDate,
    pub school_year: Option<SchoolYear>,
    pub non_school_day: bool,
    pub students: Vec<Student>,
    pub records: Vec<AttendanceRecord>,
}

pub fn open_day(conn: &Connection, d: NaiveDate) -> Result<DaySheet> {
    let school_year = calendar::school_year_for_date(conn, d)?;
    let year_id = school_year.as_ref().map(|y| y.id.as_str());
    let non_school_day = !calendar::is_school_day(conn, d, year_id)?;
    Ok(DaySheet {
        date: d,
        non_school_day,
        students: roster::active_students(conn)?,
        records: records_for_date(conn, d)?,
        school_year,
    })
}

#[derive(Debug, Clone)]
pub struct DayEntry {
    pub student_id: String,
    pub status: Option<String>,
    pub notes: Option<String>,
}

/// Saves a day's sheet. Non-school days are refused before anything is written.
pub fn save_day(conn: &Connection, d: NaiveDate, entries: &[DayEntry]) -> Result<usize> {
    let year_id = calendar::school_year_for_date(conn, d)?.map(|y| y.id);
    if !calendar::is_school_day(conn, d, year_id.as_deref())? {
        return Err(AttendanceError::NonSchoolDay(iso(d)));
    }

    for entry in entries {
        let student = roster::get_student(conn, &entry.student_id)?;
        let status = normalize_status(entry.status.as_deref());
        upsert_record(
            conn,
            &student,
            d,
            &status,
            entry.notes.as_deref(),
            None,
            year_id.as_deref(),
        )?;
    }
    debug!(date = %d, saved = entries.len(), "attendance day saved");
    Ok(entries.len())
}

// ---------- CSV ----------

pub fn export_title(school_name: &str) -> String {
    format!("{} Attendance", school_name.trim())
}

/// Exports the closed range ordered by date then student name.
pub fn export_csv(
    conn: &Connection,
    start: NaiveDate,
    end: NaiveDate,
    school_year_id: Option<&str>,
    school_name: &str,
) -> Result<(Vec<u8>, usize)> {
    ensure_ordered(start, end)?;
    let mut stmt = conn.prepare(
        "SELECT a.date, s.last_name, s.first_name,
                COALESCE(a.grade_at_time, s.current_grade),
                a.status, a.notes, y.name
           FROM attendance a
           JOIN students s ON s.id = a.student_id
           LEFT JOIN school_years y ON y.id = a.school_year_id
          WHERE a.date >= ?1 AND a.date <= ?2
            AND (?3 IS NULL OR a.school_year_id = ?3)
          ORDER BY a.date, s.last_name, s.first_name",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![start, end, school_year_id], |r| {
            Ok(vec![
                iso(r.get::<_, NaiveDate>(0)?),
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, Option<String>>(3)?.unwrap_or_default(),
                r.get::<_, String>(4)?,
                r.get::<_, Option<String>>(5)?.unwrap_or_default(),
                r.get::<_, Option<String>>(6)?.unwrap_or_default(),
            ])
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let count = rows.len();
    let title = export_title(school_name);
    let bytes = csv_io::write_csv(Some(&title), &ATTENDANCE_HEADER, rows)?;
    info!(start = %start, end = %end, rows = count, "attendance csv exported");
    Ok((bytes, count))
}

/// Upserts `date,last_name,first_name,grade,status,notes,year` rows.
///
/// Students are matched by name; rows that cannot be placed are skipped and
/// counted. Importing the same file twice updates rather than duplicates.
pub fn import_csv(
    conn: &Connection,
    bytes: &[u8],
    target_year: Option<&SchoolYear>,
    unknown_year: UnknownYearPolicy,
) -> Result<ImportSummary> {
    let rows: Vec<AttendanceCsvRow> = csv_io::read_rows(bytes)?;
    let mut summary = ImportSummary::default();

    for row in rows {
        let d = match parse_date_any(&row.date) {
            Ok(d) => d,
            Err(e) => {
                debug!(error = %e, "skipping attendance row");
                summary.skip(skip_reason::BAD_DATE);
                continue;
            }
        };
        let Some(student) = roster::student_by_name(conn, &row.first_name, &row.last_name)? else {
            debug!(
                first_name = %row.first_name,
                last_name = %row.last_name,
                "skipping attendance row for unknown student"
            );
            summary.skip(skip_reason::UNKNOWN_STUDENT);
            continue;
        };
        let year = match calendar::resolve_import_year(conn, &row.year, target_year, d) {
            Ok(y) => y,
            Err(AttendanceError::UnknownSchoolYear(name))
                if unknown_year == UnknownYearPolicy::Skip =>
            {
                debug!(date = %d, year = %name, "skipping attendance row with unknown year");
                summary.skip(skip_reason::UNKNOWN_YEAR);
                continue;
            }
            Err(e) => return Err(e),
        };

        let status = normalize_status(Some(row.status.as_str()));
        let grade = csv_io::non_empty(&row.grade);
        let created = upsert_record(
            conn,
            &student,
            d,
            &status,
            Some(row.notes.as_str()),
            grade.as_deref(),
            year.as_ref().map(|y| y.id.as_str()),
        )?;
        summary.record(created);
    }

    info!(
        created = summary.created,
        updated = summary.updated,
        skipped = summary.skipped,
        "attendance csv imported"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{DayType, SchoolYearInput};
    use crate::db;
    use crate::roster::StudentInput;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        db::init_schema(&conn).expect("schema");
        conn
    }

    fn add_student(conn: &Connection, first: &str, last: &str, grade: &str) -> Student {
        roster::create_student(
            conn,
            &StudentInput {
                first_name: first.to_string(),
                last_name: last.to_string(),
                current_grade: Some(grade.to_string()),
                active: true,
            },
        )
        .expect("student")
    }

    fn add_year(conn: &Connection) -> SchoolYear {
        calendar::create_year(
            conn,
            &SchoolYearInput {
                name: "2024-25".to_string(),
                start_date: ymd(2024, 8, 15),
                end_date: ymd(2025, 6, 15),
                active: true,
            },
        )
        .expect("year")
    }

    fn entry(student: &Student, status: Option<&str>) -> DayEntry {
        DayEntry {
            student_id: student.id.clone(),
            status: status.map(str::to_string),
            notes: None,
        }
    }

    #[test]
    fn open_day_reports_year_and_school_day() {
        let conn = conn();
        let year = add_year(&conn);
        add_student(&conn, "Ada", "Lovelace", "5");

        let tuesday = open_day(&conn, ymd(2024, 9, 3)).expect("open");
        assert!(!tuesday.non_school_day);
        assert_eq!(tuesday.school_year.map(|y| y.id), Some(year.id));
        assert_eq!(tuesday.students.len(), 1);
        assert!(tuesday.records.is_empty());

        let saturday = open_day(&conn, ymd(2024, 9, 7)).expect("open");
        assert!(saturday.non_school_day);
    }

    #[test]
    fn save_day_snapshots_grade_and_year() {
        let conn = conn();
        let year = add_year(&conn);
        let ada = add_student(&conn, "Ada", "Lovelace", "5");
        let alan = add_student(&conn, "Alan", "Turing", "6");
        let d = ymd(2024, 9, 3);

        let saved = save_day(&conn, d, &[entry(&ada, None), entry(&alan, Some("Absent"))])
            .expect("save");
        assert_eq!(saved, 2);

        let records = records_for_date(&conn, d).expect("records");
        let ada_rec = records
            .iter()
            .find(|r| r.student_id == ada.id)
            .expect("ada record");
        assert_eq!(ada_rec.status, "Present");
        assert_eq!(ada_rec.grade_at_time.as_deref(), Some("5"));
        assert_eq!(ada_rec.school_year_id.as_deref(), Some(year.id.as_str()));

        // Promotion after the fact does not rewrite the snapshot.
        conn.execute("UPDATE students SET current_grade = '6' WHERE id = ?", [&ada.id])
            .expect("promote");
        let ada = roster::get_student(&conn, &ada.id).expect("reload");
        save_day(&conn, d, &[entry(&ada, Some("Tardy"))]).expect("resave");
        let rec = find_record(&conn, &ada.id, d).expect("query").expect("record");
        assert_eq!(rec.status, "Tardy");
        assert_eq!(rec.grade_at_time.as_deref(), Some("5"));
        assert_eq!(records_for_date(&conn, d).expect("records").len(), 2);
    }

    #[test]
    fn save_day_refuses_non_school_days() {
        let conn = conn();
        add_year(&conn);
        let ada = add_student(&conn, "Ada", "Lovelace", "5");
        let labor_day = ymd(2024, 9, 2);
        calendar::set_day(&conn, labor_day, DayType::Holiday, Some("Labor Day")).expect("holiday");

        let err = save_day(&conn, labor_day, &[entry(&ada, None)]).expect_err("holiday");
        assert_eq!(err.code(), "non_school_day");
        let err = save_day(&conn, ymd(2024, 9, 7), &[entry(&ada, None)]).expect_err("saturday");
        assert_eq!(err.code(), "non_school_day");
        assert!(records_for_date(&conn, labor_day).expect("records").is_empty());
    }

    #[test]
    fn save_day_rejects_unknown_students() {
        let conn = conn();
        let err = save_day(
            &conn,
            ymd(2024, 9, 3),
            &[DayEntry {
                student_id: "missing".to_string(),
                status: None,
                notes: None,
            }],
        )
        .expect_err("unknown");
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn importing_the_same_row_twice_updates() {
        let conn = conn();
        let year = add_year(&conn);
        let ada = add_student(&conn, "Ada", "Lovelace", "5");
        let csv = "date,last_name,first_name,grade,status,notes,year\n\
                   2024-09-03,Lovelace,Ada,5,Absent,sick,\n";

        let first = import_csv(&conn, csv.as_bytes(), None, UnknownYearPolicy::Skip).expect("first");
        assert_eq!((first.created, first.updated), (1, 0));
        let second =
            import_csv(&conn, csv.as_bytes(), None, UnknownYearPolicy::Skip).expect("second");
        assert_eq!((second.created, second.updated), (0, 1));

        let records = records_for_date(&conn, ymd(2024, 9, 3)).expect("records");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].student_id, ada.id);
        assert_eq!(records[0].status, "Absent");
        assert_eq!(records[0].notes.as_deref(), Some("sick"));
        assert_eq!(records[0].school_year_id.as_deref(), Some(year.id.as_str()));
    }

    #[test]
    fn import_skips_and_counts_unplaceable_rows() {
        let conn = conn();
        add_year(&conn);
        add_student(&conn, "Ada", "Lovelace", "5");
        let csv = "date,last_name,first_name,grade,status,notes,year\n\
                   someday,Lovelace,Ada,5,Present,,\n\
                   2024-09-03,Hopper,Grace,5,Present,,\n\
                   2024-09-03,Lovelace,Ada,5,Present,,1999-00\n\
                   9/4/2024,Lovelace,Ada,,,,\n";

        let summary =
            import_csv(&conn, csv.as_bytes(), None, UnknownYearPolicy::Skip).expect("import");
        assert_eq!(summary.created, 1);
        assert_eq!(summary.skipped, 3);
        assert_eq!(summary.skipped_for(skip_reason::BAD_DATE), 1);
        assert_eq!(summary.skipped_for(skip_reason::UNKNOWN_STUDENT), 1);
        assert_eq!(summary.skipped_for(skip_reason::UNKNOWN_YEAR), 1);

        let rec = &records_for_date(&conn, ymd(2024, 9, 4)).expect("records")[0];
        assert_eq!(rec.status, "Present");
        assert_eq!(rec.grade_at_time.as_deref(), Some("5"));

        let err = import_csv(&conn, csv.as_bytes(), None, UnknownYearPolicy::Abort)
            .expect_err("abort");
        assert_eq!(err.code(), "unknown_school_year");
    }

    #[test]
    fn export_has_title_and_falls_back_to_current_grade() {
        let conn = conn();
        add_year(&conn);
        let ada = add_student(&conn, "Ada", "Lovelace", "5");
        save_day(&conn, ymd(2024, 9, 3), &[entry(&ada, None)]).expect("save");
        conn.execute("UPDATE attendance SET grade_at_time = NULL", [])
            .expect("clear snapshot");

        let (bytes, n) =
            export_csv(&conn, ymd(2024, 9, 1), ymd(2024, 9, 30), None, "Springfield Elementary")
                .expect("export");
        assert_eq!(n, 1);
        let text = String::from_utf8(bytes).expect("utf8");
        assert_eq!(
            text,
            "Springfield Elementary Attendance\n\n\
             date,last_name,first_name,grade,status,notes,year\n\
             2024-09-03,Lovelace,Ada,5,Present,,2024-25\n"
        );

        let err = export_csv(&conn, ymd(2024, 9, 30), ymd(2024, 9, 1), None, "School")
            .expect_err("reversed");
        assert_eq!(err.code(), "invalid_range");
    }

    #[test]
    fn exported_file_imports_back_cleanly() {
        let conn = conn();
        add_year(&conn);
        let ada = add_student(&conn, "Ada", "Lovelace", "5");
        save_day(&conn, ymd(2024, 9, 3), &[entry(&ada, Some("Tardy"))]).expect("save");
        let (bytes, _) = export_csv(&conn, ymd(2024, 9, 1), ymd(2024, 9, 30), None, "School")
            .expect("export");

        let summary = import_csv(&conn, &bytes, None, UnknownYearPolicy::Abort).expect("import");
        assert_eq!((summary.created, summary.updated, summary.skipped), (0, 1, 0));
    }

    #[test]
    fn school_name_with_comma_survives_the_round_trip() {
        let conn = conn();
        add_year(&conn);
        let ada = add_student(&conn, "Ada", "Lovelace", "5");
        save_day(&conn, ymd(2024, 9, 3), &[entry(&ada, Some("Absent"))]).expect("save");
        let (bytes, n) = export_csv(
            &conn,
            ymd(2024, 9, 1),
            ymd(2024, 9, 30),
            None,
            "Lovelace, Babbage Academy",
        )
        .expect("export");
        assert_eq!(n, 1);

        let summary = import_csv(&conn, &bytes, None, UnknownYearPolicy::Abort).expect("import");
        assert_eq!((summary.created, summary.updated, summary.skipped), (0, 1, 0));
        let records = records_for_date(&conn, ymd(2024, 9, 3)).expect("records");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, "Absent");
    }
}
