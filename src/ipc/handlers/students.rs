use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::ipc::helpers::{
    db_conn, fail, parse_params, read_input, respond, with_tx, write_output, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::roster::{self, StudentInput};

#[derive(Deserialize, Default)]
#[serde(default)]
struct ListParams {
    q: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudentParams {
    first_name: String,
    last_name: String,
    #[serde(default)]
    grade: Option<String>,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

impl StudentParams {
    fn into_input(self) -> StudentInput {
        StudentInput {
            first_name: self.first_name,
            last_name: self.last_name,
            current_grade: self.grade,
            active: self.active,
        }
    }
}

#[derive(Deserialize)]
struct UpdateParams {
    id: String,
    #[serde(flatten)]
    student: StudentParams,
}

#[derive(Deserialize)]
struct IdParams {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportParams {
    out_path: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportParams {
    in_path: String,
}

fn handle_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let p: ListParams = parse_params(req)?;
    let students = roster::list_students(conn, p.q.as_deref()).map_err(|e| fail(req, e))?;
    Ok(json!({ "students": students }))
}

fn handle_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let p: StudentParams = parse_params(req)?;
    let input = p.into_input();
    let student = with_tx(conn, req, |tx| roster::create_student(tx, &input))?;
    Ok(json!({ "studentId": student.id, "student": student }))
}

fn handle_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let p: UpdateParams = parse_params(req)?;
    let input = p.student.into_input();
    let student = with_tx(conn, req, |tx| roster::update_student(tx, &p.id, &input))?;
    Ok(json!({ "studentId": student.id, "student": student }))
}

fn handle_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let p: IdParams = parse_params(req)?;
    with_tx(conn, req, |tx| roster::delete_student(tx, &p.id))?;
    Ok(json!({ "studentId": p.id }))
}

fn handle_export_csv(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let p: ExportParams = parse_params(req)?;
    let (bytes, count) = roster::export_students_csv(conn).map_err(|e| fail(req, e))?;
    write_output(req, &p.out_path, &bytes)?;
    info!(rows = count, path = %p.out_path, "roster csv exported");
    Ok(json!({ "path": p.out_path, "rowsExported": count }))
}

fn handle_import_csv(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let p: ImportParams = parse_params(req)?;
    let bytes = read_input(req, &p.in_path)?;
    let summary = with_tx(conn, req, |tx| roster::import_students_csv(tx, &bytes))?;
    Ok(json!(summary))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.list" => handle_list(state, req),
        "students.create" => handle_create(state, req),
        "students.update" => handle_update(state, req),
        "students.delete" => handle_delete(state, req),
        "students.exportCsv" => handle_export_csv(state, req),
        "students.importCsv" => handle_import_csv(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
