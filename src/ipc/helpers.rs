use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::de::DeserializeOwned;

use crate::dates;
use crate::error::AttendanceError;
use crate::ipc::error::{domain_err, err, ok};
use crate::ipc::types::{AppState, Request};

/// Handler outcome: the `Err` side is an already-built error envelope.
pub type HandlerResult = Result<serde_json::Value, serde_json::Value>;

pub fn respond(req: &Request, result: HandlerResult) -> serde_json::Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e,
    }
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn parse_params<T: DeserializeOwned>(req: &Request) -> Result<T, serde_json::Value> {
    let params = if req.params.is_null() {
        serde_json::json!({})
    } else {
        req.params.clone()
    };
    serde_json::from_value(params)
        .map_err(|e| err(&req.id, "bad_params", format!("invalid params: {e}"), None))
}

pub fn fail(req: &Request, e: AttendanceError) -> serde_json::Value {
    domain_err(&req.id, &e)
}

pub fn parse_day(req: &Request, raw: &str) -> Result<NaiveDate, serde_json::Value> {
    dates::parse_iso(raw).map_err(|e| fail(req, e.into()))
}

pub fn parse_opt_day(req: &Request, raw: Option<&str>) -> Result<Option<NaiveDate>, serde_json::Value> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => parse_day(req, s).map(Some),
        None => Ok(None),
    }
}

/// `start`/`end` are optional but must be given together.
pub fn parse_opt_range(
    req: &Request,
    start: Option<&str>,
    end: Option<&str>,
) -> Result<Option<(NaiveDate, NaiveDate)>, serde_json::Value> {
    match (parse_opt_day(req, start)?, parse_opt_day(req, end)?) {
        (Some(s), Some(e)) => Ok(Some((s, e))),
        (None, None) => Ok(None),
        _ => Err(err(
            &req.id,
            "bad_params",
            "start and end must be given together",
            None,
        )),
    }
}

/// Runs `f` as one unit of work. Any error drops the transaction, rolling it back.
pub fn with_tx<T>(
    conn: &Connection,
    req: &Request,
    f: impl FnOnce(&Connection) -> crate::error::Result<T>,
) -> Result<T, serde_json::Value> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| err(&req.id, "db_tx_failed", e.to_string(), None))?;
    let out = f(&tx).map_err(|e| fail(req, e))?;
    tx.commit()
        .map_err(|e| err(&req.id, "db_commit_failed", e.to_string(), None))?;
    Ok(out)
}

pub fn read_input(req: &Request, path: &str) -> Result<Vec<u8>, serde_json::Value> {
    let p = PathBuf::from(path);
    std::fs::read(&p).map_err(|e| fail(req, AttendanceError::io(&p, e)))
}

pub fn write_output(req: &Request, path: &str, bytes: &[u8]) -> Result<(), serde_json::Value> {
    let p = Path::new(path);
    if let Some(parent) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| fail(req, AttendanceError::io(parent, e)))?;
    }
    std::fs::write(p, bytes).map_err(|e| fail(req, AttendanceError::io(p, e)))
}
