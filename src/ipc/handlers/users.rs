use serde::Deserialize;
use serde_json::json;

use crate::ipc::helpers::{db_conn, fail, parse_params, respond, with_tx, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::roster::{self, Role, UserInput};

#[derive(Deserialize)]
struct UserParams {
    username: String,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default = "default_active")]
    active: bool,
    #[serde(default)]
    email: Option<String>,
}

fn default_active() -> bool {
    true
}

#[derive(Deserialize)]
struct UpdateParams {
    id: String,
    #[serde(flatten)]
    user: UserParams,
}

#[derive(Deserialize)]
struct IdParams {
    id: String,
}

fn to_input(req: &Request, p: UserParams) -> Result<UserInput, serde_json::Value> {
    let role = Role::parse(p.role.as_deref()).map_err(|e| fail(req, e))?;
    Ok(UserInput {
        username: p.username,
        role,
        active: p.active,
        email: p.email,
        password: p.password,
    })
}

fn handle_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let users = roster::list_users(conn).map_err(|e| fail(req, e))?;
    Ok(json!({ "users": users }))
}

fn handle_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let p: UserParams = parse_params(req)?;
    let input = to_input(req, p)?;
    let user = with_tx(conn, req, |tx| roster::create_user(tx, &input))?;
    Ok(json!({ "userId": user.id, "user": user }))
}

fn handle_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let p: UpdateParams = parse_params(req)?;
    let input = to_input(req, p.user)?;
    let user = with_tx(conn, req, |tx| roster::update_user(tx, &p.id, &input))?;
    Ok(json!({ "userId": user.id, "user": user }))
}

fn handle_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let p: IdParams = parse_params(req)?;
    with_tx(conn, req, |tx| roster::delete_user(tx, &p.id))?;
    Ok(json!({ "userId": p.id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "users.list" => handle_list(state, req),
        "users.create" => handle_create(state, req),
        "users.update" => handle_update(state, req),
        "users.delete" => handle_delete(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
