use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::attendance::{self, DayEntry};
use crate::calendar;
use crate::import::UnknownYearPolicy;
use crate::ipc::helpers::{
    db_conn, fail, parse_day, parse_params, read_input, respond, with_tx, write_output,
    HandlerResult,
};
use crate::ipc::types::{AppState, Request};

#[derive(Deserialize)]
struct OpenDayParams {
    date: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryParams {
    student_id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Deserialize)]
struct SaveDayParams {
    date: String,
    #[serde(default)]
    entries: Vec<EntryParams>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportParams {
    start: String,
    end: String,
    out_path: String,
    #[serde(default)]
    year_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportParams {
    in_path: String,
    #[serde(default)]
    year_id: Option<String>,
    #[serde(default)]
    unknown_year: Option<String>,
}

fn handle_open_day(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let p: OpenDayParams = parse_params(req)?;
    let d = parse_day(req, &p.date)?;
    let sheet = attendance::open_day(conn, d).map_err(|e| fail(req, e))?;
    Ok(json!(sheet))
}

fn handle_save_day(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let p: SaveDayParams = parse_params(req)?;
    let d = parse_day(req, &p.date)?;
    let entries: Vec<DayEntry> = p
        .entries
        .into_iter()
        .map(|e| DayEntry {
            student_id: e.student_id,
            status: e.status,
            notes: e.notes,
        })
        .collect();
    let saved = with_tx(conn, req, |tx| attendance::save_day(tx, d, &entries))?;
    Ok(json!({ "date": d, "saved": saved }))
}

fn handle_export_csv(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let p: ExportParams = parse_params(req)?;
    let start = parse_day(req, &p.start)?;
    let end = parse_day(req, &p.end)?;
    let (bytes, count) =
        attendance::export_csv(conn, start, end, p.year_id.as_deref(), &state.school_name)
            .map_err(|e| fail(req, e))?;
    write_output(req, &p.out_path, &bytes)?;
    info!(path = %p.out_path, "attendance csv written");
    Ok(json!({ "path": p.out_path, "rowsExported": count }))
}

fn handle_import_csv(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let p: ImportParams = parse_params(req)?;
    let unknown_year = UnknownYearPolicy::parse(p.unknown_year.as_deref(), UnknownYearPolicy::Skip)
        .map_err(|e| fail(req, e))?;
    let bytes = read_input(req, &p.in_path)?;
    let summary = with_tx(conn, req, |tx| {
        let target = match p.year_id.as_deref() {
            Some(id) => Some(calendar::require_year(tx, id)?),
            None => None,
        };
        attendance::import_csv(tx, &bytes, target.as_ref(), unknown_year)
    })?;
    Ok(json!(summary))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "attendance.openDay" => handle_open_day(state, req),
        "attendance.saveDay" => handle_save_day(state, req),
        "attendance.exportCsv" => handle_export_csv(state, req),
        "attendance.importCsv" => handle_import_csv(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
