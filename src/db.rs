use anyhow::Context;
use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "attendance.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace.to_string_lossy()
        )
    })?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.to_string_lossy()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'teacher',
            active INTEGER NOT NULL DEFAULT 1,
            email TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS school_years(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_school_years_range ON school_years(start_date, end_date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            current_grade TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            UNIQUE(first_name, last_name)
        )",
        [],
    )?;
    // Older workspaces stored the roster grade in `grade`; add and backfill if needed.
    ensure_students_current_grade(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_name ON students(last_name, first_name)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_grade ON students(current_grade)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS school_calendar(
            id TEXT PRIMARY KEY,
            school_year_id TEXT,
            date TEXT NOT NULL,
            type TEXT NOT NULL DEFAULT 'Regular',
            description TEXT,
            FOREIGN KEY(school_year_id) REFERENCES school_years(id),
            UNIQUE(date, school_year_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_school_calendar_date ON school_calendar(date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_school_calendar_year ON school_calendar(school_year_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            notes TEXT,
            grade_at_time TEXT,
            school_year_id TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(school_year_id) REFERENCES school_years(id),
            UNIQUE(student_id, date)
        )",
        [],
    )?;
    ensure_attendance_grade_at_time(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_date ON attendance(date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student ON attendance(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_year ON attendance(school_year_id)",
        [],
    )?;

    Ok(())
}

fn ensure_students_current_grade(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "students", "current_grade")? {
        conn.execute("ALTER TABLE students ADD COLUMN current_grade TEXT", [])?;
    }
    if table_has_column(conn, "students", "grade")? {
        conn.execute(
            "UPDATE students SET current_grade = COALESCE(current_grade, grade)",
            [],
        )?;
    }
    Ok(())
}

fn ensure_attendance_grade_at_time(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "attendance", "grade_at_time")? {
        conn.execute("ALTER TABLE attendance ADD COLUMN grade_at_time TEXT", [])?;
    }
    // Snapshot from the legacy roster column only; current_grade may have moved on since.
    if table_has_column(conn, "students", "grade")? {
        conn.execute(
            "UPDATE attendance
                SET grade_at_time = (
                    SELECT s.grade FROM students s WHERE s.id = attendance.student_id
                )
              WHERE grade_at_time IS NULL",
            [],
        )?;
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("first init");
        init_schema(&conn).expect("second init");
        assert!(table_has_column(&conn, "attendance", "grade_at_time").expect("pragma"));
    }

    #[test]
    fn legacy_grade_column_is_migrated() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch(
            "CREATE TABLE students(
                id TEXT PRIMARY KEY,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                grade TEXT,
                active INTEGER NOT NULL DEFAULT 1
             );
             CREATE TABLE attendance(
                id TEXT PRIMARY KEY,
                student_id TEXT NOT NULL,
                date TEXT NOT NULL,
                status TEXT NOT NULL,
                notes TEXT,
                school_year_id TEXT
             );
             INSERT INTO students(id, first_name, last_name, grade, active)
                VALUES('s1', 'Ada', 'Lovelace', '5', 1);
             INSERT INTO attendance(id, student_id, date, status)
                VALUES('a1', 's1', '2024-09-03', 'Present');",
        )
        .expect("legacy schema");

        init_schema(&conn).expect("migrate");

        let current: Option<String> = conn
            .query_row("SELECT current_grade FROM students WHERE id = 's1'", [], |r| {
                r.get(0)
            })
            .expect("current_grade");
        assert_eq!(current.as_deref(), Some("5"));
        let snap: Option<String> = conn
            .query_row(
                "SELECT grade_at_time FROM attendance WHERE id = 'a1'",
                [],
                |r| r.get(0),
            )
            .expect("grade_at_time");
        assert_eq!(snap.as_deref(), Some("5"));
    }
}
