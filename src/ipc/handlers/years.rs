use serde::Deserialize;
use serde_json::json;

use crate::calendar::{self, SchoolYearInput};
use crate::ipc::helpers::{
    db_conn, fail, parse_day, parse_params, respond, with_tx, HandlerResult,
};
use crate::ipc::types::{AppState, Request};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct YearParams {
    name: String,
    start_date: String,
    end_date: String,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Deserialize)]
struct UpdateParams {
    id: String,
    #[serde(flatten)]
    year: YearParams,
}

#[derive(Deserialize)]
struct IdParams {
    id: String,
}

#[derive(Deserialize)]
struct DateParams {
    date: String,
}

fn to_input(req: &Request, p: YearParams) -> Result<SchoolYearInput, serde_json::Value> {
    Ok(SchoolYearInput {
        name: p.name,
        start_date: parse_day(req, &p.start_date)?,
        end_date: parse_day(req, &p.end_date)?,
        active: p.active,
    })
}

fn handle_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let years = calendar::list_years(conn).map_err(|e| fail(req, e))?;
    Ok(json!({ "years": years }))
}

fn handle_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let p: YearParams = parse_params(req)?;
    let input = to_input(req, p)?;
    let year = with_tx(conn, req, |tx| calendar::create_year(tx, &input))?;
    Ok(json!({ "yearId": year.id, "year": year }))
}

fn handle_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let p: UpdateParams = parse_params(req)?;
    let input = to_input(req, p.year)?;
    let year = with_tx(conn, req, |tx| calendar::update_year(tx, &p.id, &input))?;
    Ok(json!({ "yearId": year.id, "year": year }))
}

fn handle_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let p: IdParams = parse_params(req)?;
    with_tx(conn, req, |tx| calendar::delete_year(tx, &p.id))?;
    Ok(json!({ "yearId": p.id }))
}

fn handle_for_date(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let p: DateParams = parse_params(req)?;
    let d = parse_day(req, &p.date)?;
    let year = calendar::school_year_for_date(conn, d).map_err(|e| fail(req, e))?;
    Ok(json!({ "year": year }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "years.list" => handle_list(state, req),
        "years.create" => handle_create(state, req),
        "years.update" => handle_update(state, req),
        "years.delete" => handle_delete(state, req),
        "years.forDate" => handle_for_date(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
