use chrono::Datelike;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::calendar::{self, DayType};
use crate::error::AttendanceError;
use crate::import::{ImportMode, UnknownYearPolicy};
use crate::ipc::helpers::{
    db_conn, fail, parse_day, parse_opt_range, parse_params, read_input, respond, with_tx,
    write_output, HandlerResult,
};
use crate::ipc::types::{AppState, Request};

fn parse_type(req: &Request, raw: &str) -> Result<DayType, serde_json::Value> {
    DayType::parse(raw).ok_or_else(|| {
        fail(
            req,
            AttendanceError::BadParams(format!(
                "type must be one of: Regular, Holiday, In-service, Closed (got {raw:?})"
            )),
        )
    })
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct ListParams {
    year_id: Option<String>,
    start: Option<String>,
    end: Option<String>,
}

#[derive(Deserialize)]
struct DayParams {
    date: String,
    #[serde(rename = "type")]
    day_type: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct BulkParams {
    start: String,
    end: String,
    #[serde(rename = "type")]
    day_type: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct UpdateParams {
    id: String,
    #[serde(flatten)]
    day: DayParams,
}

#[derive(Deserialize)]
struct IdParams {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchoolDayParams {
    date: String,
    #[serde(default)]
    year_id: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct MonthParams {
    year: Option<i32>,
    month: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportParams {
    out_path: String,
    #[serde(default)]
    year_id: Option<String>,
    #[serde(default)]
    start: Option<String>,
    #[serde(default)]
    end: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportParams {
    in_path: String,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    year_id: Option<String>,
    #[serde(default)]
    unknown_year: Option<String>,
}

fn handle_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let p: ListParams = parse_params(req)?;
    let range = parse_opt_range(req, p.start.as_deref(), p.end.as_deref())?;
    let entries =
        calendar::list_entries(conn, p.year_id.as_deref(), range).map_err(|e| fail(req, e))?;
    Ok(json!({ "entries": entries }))
}

fn handle_upsert_day(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let p: DayParams = parse_params(req)?;
    let d = parse_day(req, &p.date)?;
    let day_type = parse_type(req, &p.day_type)?;
    let entry = with_tx(conn, req, |tx| {
        calendar::set_day(tx, d, day_type, p.description.as_deref())
    })?;
    Ok(json!({ "entry": entry }))
}

fn handle_bulk_set(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let p: BulkParams = parse_params(req)?;
    let start = parse_day(req, &p.start)?;
    let end = parse_day(req, &p.end)?;
    let day_type = parse_type(req, &p.day_type)?;
    let updated = with_tx(conn, req, |tx| {
        calendar::bulk_set(tx, start, end, day_type, p.description.as_deref())
    })?;
    Ok(json!({ "daysUpdated": updated }))
}

fn handle_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let p: UpdateParams = parse_params(req)?;
    let d = parse_day(req, &p.day.date)?;
    let day_type = parse_type(req, &p.day.day_type)?;
    let entry = with_tx(conn, req, |tx| {
        calendar::update_entry(tx, &p.id, d, day_type, p.day.description.as_deref())
    })?;
    Ok(json!({ "entry": entry }))
}

fn handle_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let p: IdParams = parse_params(req)?;
    with_tx(conn, req, |tx| calendar::delete_entry(tx, &p.id))?;
    Ok(json!({ "entryId": p.id }))
}

fn handle_is_school_day(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let p: SchoolDayParams = parse_params(req)?;
    let d = parse_day(req, &p.date)?;
    let school_day =
        calendar::is_school_day(conn, d, p.year_id.as_deref()).map_err(|e| fail(req, e))?;
    Ok(json!({ "date": d, "schoolDay": school_day }))
}

fn handle_month(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let p: MonthParams = parse_params(req)?;
    let today = chrono::Local::now().date_naive();
    let year = p.year.unwrap_or_else(|| today.year());
    let month = p.month.unwrap_or_else(|| i64::from(today.month()));
    let view = calendar::month_view(conn, year, month).map_err(|e| fail(req, e))?;
    Ok(json!(view))
}

fn handle_export_ics(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let p: ExportParams = parse_params(req)?;
    let range = parse_opt_range(req, p.start.as_deref(), p.end.as_deref())?;
    let (bytes, count) =
        calendar::export_ics(conn, p.year_id.as_deref(), range).map_err(|e| fail(req, e))?;
    write_output(req, &p.out_path, &bytes)?;
    info!(events = count, path = %p.out_path, "calendar ics exported");
    Ok(json!({ "path": p.out_path, "eventsExported": count }))
}

fn handle_import_ics(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let p: ImportParams = parse_params(req)?;
    let mode = ImportMode::parse(p.mode.as_deref()).map_err(|e| fail(req, e))?;
    let bytes = read_input(req, &p.in_path)?;
    let summary = with_tx(conn, req, |tx| calendar::import_ics(tx, &bytes, mode))?;
    Ok(json!(summary))
}

fn handle_export_csv(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let p: ExportParams = parse_params(req)?;
    let range = parse_opt_range(req, p.start.as_deref(), p.end.as_deref())?;
    let (bytes, count) =
        calendar::export_csv(conn, p.year_id.as_deref(), range).map_err(|e| fail(req, e))?;
    write_output(req, &p.out_path, &bytes)?;
    info!(rows = count, path = %p.out_path, "calendar csv exported");
    Ok(json!({ "path": p.out_path, "rowsExported": count }))
}

fn handle_import_csv(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let p: ImportParams = parse_params(req)?;
    let mode = ImportMode::parse(p.mode.as_deref()).map_err(|e| fail(req, e))?;
    let unknown_year = UnknownYearPolicy::parse(p.unknown_year.as_deref(), UnknownYearPolicy::Abort)
        .map_err(|e| fail(req, e))?;
    let bytes = read_input(req, &p.in_path)?;
    let summary = with_tx(conn, req, |tx| {
        let target = match p.year_id.as_deref() {
            Some(id) => Some(calendar::require_year(tx, id)?),
            None => None,
        };
        calendar::import_csv(tx, &bytes, mode, target.as_ref(), unknown_year)
    })?;
    Ok(json!(summary))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "calendar.list" => handle_list(state, req),
        "calendar.upsertDay" => handle_upsert_day(state, req),
        "calendar.bulkSet" => handle_bulk_set(state, req),
        "calendar.update" => handle_update(state, req),
        "calendar.delete" => handle_delete(state, req),
        "calendar.isSchoolDay" => handle_is_school_day(state, req),
        "calendar.month" => handle_month(state, req),
        "calendar.exportIcs" => handle_export_ics(state, req),
        "calendar.importIcs" => handle_import_ics(state, req),
        "calendar.exportCsv" => handle_export_csv(state, req),
        "calendar.importCsv" => handle_import_csv(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
