use std::path::PathBuf;

use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::db;
use crate::ipc::error::err;
use crate::ipc::helpers::{parse_params, respond, HandlerResult};
use crate::ipc::types::{AppState, Request};

fn handle_health(state: &mut AppState, _req: &Request) -> HandlerResult {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
    }))
}

#[derive(Deserialize)]
struct SelectParams {
    path: String,
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: SelectParams = parse_params(req)?;
    let path = PathBuf::from(p.path);
    let conn = db::open_db(&path)
        .map_err(|e| err(&req.id, "db_open_failed", format!("{e:#}"), None))?;
    info!(workspace = %path.display(), "workspace opened");
    state.workspace = Some(path.clone());
    state.db = Some(conn);
    Ok(json!({ "workspacePath": path.to_string_lossy() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "health" => handle_health(state, req),
        "workspace.select" => handle_workspace_select(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
