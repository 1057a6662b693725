use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{AttendanceError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    /// Upsert by natural key.
    #[default]
    Merge,
    /// Delete rows matching the imported keys, then insert.
    Replace,
}

impl ImportMode {
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("merge") => Ok(ImportMode::Merge),
            Some("replace") => Ok(ImportMode::Replace),
            Some(other) => Err(AttendanceError::BadParams(format!(
                "mode must be one of: merge, replace (got {other:?})"
            ))),
        }
    }
}

/// What to do with a CSV row naming a school year that does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownYearPolicy {
    /// Fail the whole import; nothing is committed.
    Abort,
    /// Skip the row and count it.
    Skip,
}

impl UnknownYearPolicy {
    pub fn parse(raw: Option<&str>, default: UnknownYearPolicy) -> Result<Self> {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") => Ok(default),
            Some("abort") => Ok(UnknownYearPolicy::Abort),
            Some("skip") => Ok(UnknownYearPolicy::Skip),
            Some(other) => Err(AttendanceError::BadParams(format!(
                "unknownYear must be one of: abort, skip (got {other:?})"
            ))),
        }
    }
}

pub mod skip_reason {
    pub const BAD_DATE: &str = "badDate";
    pub const BAD_TYPE: &str = "badType";
    /// Days past the expansion cap of a long calendar event.
    pub const EVENT_TOO_LONG: &str = "eventTooLong";
    pub const MISSING_NAME: &str = "missingName";
    pub const UNKNOWN_STUDENT: &str = "unknownStudent";
    pub const UNKNOWN_YEAR: &str = "unknownYear";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub skipped_by_reason: BTreeMap<&'static str, usize>,
}

impl ImportSummary {
    pub fn skip(&mut self, reason: &'static str) {
        self.skipped += 1;
        *self.skipped_by_reason.entry(reason).or_insert(0) += 1;
    }

    pub fn skip_many(&mut self, reason: &'static str, n: usize) {
        if n == 0 {
            return;
        }
        self.skipped += n;
        *self.skipped_by_reason.entry(reason).or_insert(0) += n;
    }

    pub fn record(&mut self, created: bool) {
        if created {
            self.created += 1;
        } else {
            self.updated += 1;
        }
    }

    #[cfg(test)]
    pub fn skipped_for(&self, reason: &str) -> usize {
        self.skipped_by_reason.get(reason).copied().unwrap_or(0)
    }
}
