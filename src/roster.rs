use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::Argon2;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::csv_io::{self, StudentCsvRow, STUDENT_HEADER};
use crate::error::{AttendanceError, Result};
use crate::import::{skip_reason, ImportSummary};

// ---------- Students ----------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub current_grade: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct StudentInput {
    pub first_name: String,
    pub last_name: String,
    pub current_grade: Option<String>,
    pub active: bool,
}

impl StudentInput {
    fn normalized(&self) -> Result<(String, String, Option<String>)> {
        let first = self.first_name.trim().to_string();
        let last = self.last_name.trim().to_string();
        if first.is_empty() || last.is_empty() {
            return Err(AttendanceError::BadParams(
                "first and last name are required".to_string(),
            ));
        }
        let grade = self
            .current_grade
            .as_deref()
            .and_then(csv_io::non_empty);
        Ok((first, last, grade))
    }
}

const STUDENT_COLUMNS: &str = "id, first_name, last_name, current_grade, active";

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        first_name: r.get(1)?,
        last_name: r.get(2)?,
        current_grade: r.get(3)?,
        active: r.get::<_, i64>(4)? != 0,
    })
}

/// Roster ordered by last then first name; `query` matches name or grade.
pub fn list_students(conn: &Connection, query: Option<&str>) -> Result<Vec<Student>> {
    let like = query
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(|q| format!("%{}%", q));
    let mut stmt = conn.prepare(&format!(
        "SELECT {STUDENT_COLUMNS} FROM students
         WHERE ?1 IS NULL
            OR first_name LIKE ?1
            OR last_name LIKE ?1
            OR current_grade LIKE ?1
         ORDER BY last_name, first_name"
    ))?;
    let rows = stmt
        .query_map([like], student_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn active_students(conn: &Connection) -> Result<Vec<Student>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STUDENT_COLUMNS} FROM students WHERE active = 1 ORDER BY last_name, first_name"
    ))?;
    let rows = stmt
        .query_map([], student_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn get_student(conn: &Connection, id: &str) -> Result<Student> {
    conn.query_row(
        &format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?"),
        [id],
        student_from_row,
    )
    .optional()?
    .ok_or(AttendanceError::NotFound("student"))
}

/// Students are identified by name; there is no external id.
pub fn student_by_name(conn: &Connection, first: &str, last: &str) -> Result<Option<Student>> {
    Ok(conn
        .query_row(
            &format!("SELECT {STUDENT_COLUMNS} FROM students WHERE first_name = ? AND last_name = ?"),
            [first.trim(), last.trim()],
            student_from_row,
        )
        .optional()?)
}

pub fn create_student(conn: &Connection, input: &StudentInput) -> Result<Student> {
    let (first, last, grade) = input.normalized()?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, first_name, last_name, current_grade, active) VALUES(?, ?, ?, ?, ?)",
        rusqlite::params![id, first, last, grade, input.active as i64],
    )?;
    get_student(conn, &id)
}

pub fn update_student(conn: &Connection, id: &str, input: &StudentInput) -> Result<Student> {
    get_student(conn, id)?;
    let (first, last, grade) = input.normalized()?;
    conn.execute(
        "UPDATE students SET first_name = ?, last_name = ?, current_grade = ?, active = ? WHERE id = ?",
        rusqlite::params![first, last, grade, input.active as i64, id],
    )?;
    get_student(conn, id)
}

/// Removes the student and their attendance history.
pub fn delete_student(conn: &Connection, id: &str) -> Result<()> {
    get_student(conn, id)?;
    conn.execute("DELETE FROM attendance WHERE student_id = ?", [id])?;
    conn.execute("DELETE FROM students WHERE id = ?", [id])?;
    Ok(())
}

pub fn export_students_csv(conn: &Connection) -> Result<(Vec<u8>, usize)> {
    let students = list_students(conn, None)?;
    let count = students.len();
    let rows = students.into_iter().map(|s| {
        vec![
            s.first_name,
            s.last_name,
            s.current_grade.unwrap_or_default(),
            if s.active { "1" } else { "0" }.to_string(),
        ]
    });
    Ok((csv_io::write_csv(None, &STUDENT_HEADER, rows)?, count))
}

/// Upserts roster rows by name. Rows without both names are skipped.
pub fn import_students_csv(conn: &Connection, bytes: &[u8]) -> Result<ImportSummary> {
    let rows: Vec<StudentCsvRow> = csv_io::read_rows(bytes)?;
    let mut summary = ImportSummary::default();

    for row in rows {
        let first = row.first_name.trim();
        let last = row.last_name.trim();
        if first.is_empty() || last.is_empty() {
            debug!("skipping roster row without a full name");
            summary.skip(skip_reason::MISSING_NAME);
            continue;
        }
        let grade = csv_io::non_empty(&row.grade);
        let active = csv_io::parse_bool_flag(&row.active, true);

        match student_by_name(conn, first, last)? {
            Some(existing) => {
                conn.execute(
                    "UPDATE students SET current_grade = ?, active = ? WHERE id = ?",
                    rusqlite::params![grade, active as i64, existing.id],
                )?;
                summary.record(false);
            }
            None => {
                create_student(
                    conn,
                    &StudentInput {
                        first_name: first.to_string(),
                        last_name: last.to_string(),
                        current_grade: grade,
                        active,
                    },
                )?;
                summary.record(true);
            }
        }
    }

    info!(
        created = summary.created,
        updated = summary.updated,
        skipped = summary.skipped,
        "roster csv imported"
    );
    Ok(summary)
}

// ---------- Users ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
        }
    }

    pub fn parse(raw: Option<&str>) -> Result<Self> {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("teacher") => Ok(Role::Teacher),
            Some("admin") => Ok(Role::Admin),
            Some(other) => Err(AttendanceError::BadParams(format!(
                "role must be one of: admin, teacher (got {other:?})"
            ))),
        }
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "admin" => Ok(Role::Admin),
            "teacher" => Ok(Role::Teacher),
            other => Err(FromSqlError::Other(
                format!("unknown stored role {other:?}").into(),
            )),
        }
    }
}

/// A user record as exposed to callers; the password hash stays in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub role: Role,
    pub active: bool,
    pub email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UserInput {
    pub username: String,
    pub role: Role,
    pub active: bool,
    pub email: Option<String>,
    pub password: Option<String>,
}

const USER_COLUMNS: &str = "id, username, role, active, email";

fn user_from_row(r: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: r.get(0)?,
        username: r.get(1)?,
        role: r.get(2)?,
        active: r.get::<_, i64>(3)? != 0,
        email: r.get(4)?,
    })
}

pub fn list_users(conn: &Connection) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY username"))?;
    let rows = stmt
        .query_map([], user_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn get_user(conn: &Connection, id: &str) -> Result<User> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"),
        [id],
        user_from_row,
    )
    .optional()?
    .ok_or(AttendanceError::NotFound("user"))
}

pub fn user_by_username(conn: &Connection, username: &str) -> Result<Option<User>> {
    Ok(conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?"),
            [username.trim()],
            user_from_row,
        )
        .optional()?)
}

/// Surrounding whitespace is not part of a password.
fn new_password(input: &UserInput) -> Option<&str> {
    input
        .password
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
}

pub fn create_user(conn: &Connection, input: &UserInput) -> Result<User> {
    let username = input.username.trim();
    if username.is_empty() {
        return Err(AttendanceError::BadParams("username is required".to_string()));
    }
    let Some(password) = new_password(input) else {
        return Err(AttendanceError::BadParams("password is required".to_string()));
    };
    if user_by_username(conn, username)?.is_some() {
        return Err(AttendanceError::Conflict("username already exists".to_string()));
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO users(id, username, password_hash, role, active, email) VALUES(?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            id,
            username,
            hash_password(password)?,
            input.role.as_str(),
            input.active as i64,
            input.email.as_deref().and_then(csv_io::non_empty)
        ],
    )?;
    get_user(conn, &id)
}

/// Updates profile fields; a non-empty password resets the stored hash.
pub fn update_user(conn: &Connection, id: &str, input: &UserInput) -> Result<User> {
    get_user(conn, id)?;
    let username = input.username.trim();
    if username.is_empty() {
        return Err(AttendanceError::BadParams("username is required".to_string()));
    }
    conn.execute(
        "UPDATE users SET username = ?, role = ?, active = ?, email = ? WHERE id = ?",
        rusqlite::params![
            username,
            input.role.as_str(),
            input.active as i64,
            input.email.as_deref().and_then(csv_io::non_empty),
            id
        ],
    )?;
    if let Some(pw) = new_password(input) {
        conn.execute(
            "UPDATE users SET password_hash = ? WHERE id = ?",
            rusqlite::params![hash_password(pw)?, id],
        )?;
    }
    get_user(conn, id)
}

pub fn delete_user(conn: &Connection, id: &str) -> Result<()> {
    let n = conn.execute("DELETE FROM users WHERE id = ?", [id])?;
    if n == 0 {
        return Err(AttendanceError::NotFound("user"));
    }
    Ok(())
}

/// Creates the admin account unless one with that username exists.
/// Returns whether a user was created.
pub fn ensure_admin(conn: &Connection, username: &str, password: &str) -> Result<bool> {
    if user_by_username(conn, username)?.is_some() {
        return Ok(false);
    }
    create_user(
        conn,
        &UserInput {
            username: username.to_string(),
            role: Role::Admin,
            active: true,
            email: None,
            password: Some(password.to_string()),
        },
    )?;
    Ok(true)
}

/// Argon2id in PHC string form (`$argon2id$v=19$...`), salted from a fresh UUID.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|e| AttendanceError::PasswordHash(e.to_string()))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AttendanceError::PasswordHash(e.to_string()))?;
    Ok(hash.to_string())
}
