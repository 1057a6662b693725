use rusqlite::ErrorCode;
use thiserror::Error;

use crate::dates::DateFormatError;

/// Errors raised by the roster, calendar, attendance and reporting operations.
///
/// Each variant maps onto a stable IPC error code via [`AttendanceError::code`].
#[derive(Debug, Error)]
pub enum AttendanceError {
    #[error("{0}")]
    BadParams(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("end date {end} is before start date {start}")]
    InvalidRange { start: String, end: String },

    #[error(transparent)]
    BadDate(#[from] DateFormatError),

    #[error("unknown school year: {0}")]
    UnknownSchoolYear(String),

    #[error("{0} is not a school day")]
    NonSchoolDay(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("database error: {0}")]
    Db(rusqlite::Error),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("invalid calendar file: {0}")]
    BadIcs(String),
}

impl AttendanceError {
    pub fn code(&self) -> &'static str {
        match self {
            AttendanceError::BadParams(_) => "bad_params",
            AttendanceError::NotFound(_) => "not_found",
            AttendanceError::Conflict(_) => "conflict",
            AttendanceError::InvalidRange { .. } => "invalid_range",
            AttendanceError::BadDate(_) => "bad_date",
            AttendanceError::UnknownSchoolYear(_) => "unknown_school_year",
            AttendanceError::NonSchoolDay(_) => "non_school_day",
            AttendanceError::Csv(_) => "csv_failed",
            AttendanceError::Io { .. } => "io_failed",
            AttendanceError::Db(_) => "db_query_failed",
            AttendanceError::PasswordHash(_) => "password_hash_failed",
            AttendanceError::BadIcs(_) => "bad_ics",
        }
    }

    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        AttendanceError::Io {
            path: path.to_string_lossy().to_string(),
            source,
        }
    }
}

impl From<rusqlite::Error> for AttendanceError {
    fn from(e: rusqlite::Error) -> Self {
        // Unique/foreign-key violations surface to callers as conflicts.
        match e.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => AttendanceError::Conflict(e.to_string()),
            _ => AttendanceError::Db(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, AttendanceError>;
