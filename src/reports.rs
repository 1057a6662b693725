use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;

use crate::dates::ensure_ordered;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRecord {
    pub student_id: String,
    pub student_name: String,
    pub status: String,
    pub notes: Option<String>,
    pub grade_at_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySummary {
    pub date: NaiveDate,
    pub counts: Vec<StatusCount>,
    pub records: Vec<DailyRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentStats {
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    pub present_count: usize,
    pub total_count: usize,
    pub percentage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeSummary {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub students: Vec<StudentStats>,
}

/// Status tallies and the roster view for one day.
pub fn daily_summary(
    conn: &Connection,
    d: NaiveDate,
    school_year_id: Option<&str>,
) -> Result<DailySummary> {
    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*) FROM attendance
          WHERE date = ?1 AND (?2 IS NULL OR school_year_id = ?2)
          GROUP BY status
          ORDER BY status",
    )?;
    let counts = stmt
        .query_map(rusqlite::params![d, school_year_id], |r| {
            Ok(StatusCount {
                status: r.get(0)?,
                count: r.get::<_, i64>(1)? as usize,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare(
        "SELECT a.student_id, s.last_name || ', ' || s.first_name, a.status, a.notes, a.grade_at_time
           FROM attendance a
           JOIN students s ON s.id = a.student_id
          WHERE a.date = ?1 AND (?2 IS NULL OR a.school_year_id = ?2)
          ORDER BY s.last_name, s.first_name",
    )?;
    let records = stmt
        .query_map(rusqlite::params![d, school_year_id], |r| {
            Ok(DailyRecord {
                student_id: r.get(0)?,
                student_name: r.get(1)?,
                status: r.get(2)?,
                notes: r.get(3)?,
                grade_at_time: r.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(DailySummary {
        date: d,
        counts,
        records,
    })
}

/// Per-student attendance over the closed range `[start, end]`.
///
/// Only students with at least one record in range appear. `Present` is
/// matched exactly; Tardy counts toward the total but not toward presence.
pub fn range_summary(
    conn: &Connection,
    start: NaiveDate,
    end: NaiveDate,
    school_year_id: Option<&str>,
) -> Result<RangeSummary> {
    ensure_ordered(start, end)?;
    let mut stmt = conn.prepare(
        "SELECT s.id, s.first_name, s.last_name,
                SUM(CASE WHEN a.status = 'Present' THEN 1 ELSE 0 END),
                COUNT(a.id)
           FROM attendance a
           JOIN students s ON s.id = a.student_id
          WHERE a.date >= ?1 AND a.date <= ?2
            AND (?3 IS NULL OR a.school_year_id = ?3)
          GROUP BY s.id
          ORDER BY s.last_name, s.first_name",
    )?;
    let students = stmt
        .query_map(rusqlite::params![start, end, school_year_id], |r| {
            let present = r.get::<_, i64>(3)? as usize;
            let total = r.get::<_, i64>(4)? as usize;
            Ok(StudentStats {
                student_id: r.get(0)?,
                first_name: r.get(1)?,
                last_name: r.get(2)?,
                present_count: present,
                total_count: total,
                percentage: percentage(present, total),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(RangeSummary {
        start,
        end,
        students,
    })
}

/// One decimal place; exact halves round to the even tenth (6.25 -> 6.2).
/// Computed in integer tenths.
fn percentage(present: usize, total: usize) -> Option<f64> {
    if total == 0 {
        return None;
    }
    let (scaled, total) = (present as u64 * 1000, total as u64);
    let mut tenths = scaled / total;
    let twice_rem = (scaled % total) * 2;
    if twice_rem > total || (twice_rem == total && tenths % 2 == 1) {
        tenths += 1;
    }
    Some(tenths as f64 / 10.0)
}
