use serde::Deserialize;
use serde_json::json;

use crate::ipc::helpers::{db_conn, fail, parse_day, parse_opt_day, parse_params, respond, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::reports;

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct DailyParams {
    date: Option<String>,
    year_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RangeParams {
    start: String,
    end: String,
    #[serde(default)]
    year_id: Option<String>,
}

fn handle_daily(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let p: DailyParams = parse_params(req)?;
    let d = parse_opt_day(req, p.date.as_deref())?
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    let summary = reports::daily_summary(conn, d, p.year_id.as_deref()).map_err(|e| fail(req, e))?;
    Ok(json!(summary))
}

fn handle_range(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let p: RangeParams = parse_params(req)?;
    let start = parse_day(req, &p.start)?;
    let end = parse_day(req, &p.end)?;
    let summary =
        reports::range_summary(conn, start, end, p.year_id.as_deref()).map_err(|e| fail(req, e))?;
    Ok(json!(summary))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "reports.daily" => handle_daily(state, req),
        "reports.range" => handle_range(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
