use serde_json::json;

use crate::error::AttendanceError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Error envelope for a domain failure, keyed by the error's stable code.
pub fn domain_err(id: &str, e: &AttendanceError) -> serde_json::Value {
    let details = match e {
        AttendanceError::InvalidRange { start, end } => Some(json!({ "start": start, "end": end })),
        AttendanceError::UnknownSchoolYear(name) => Some(json!({ "year": name })),
        AttendanceError::NonSchoolDay(date) => Some(json!({ "date": date })),
        AttendanceError::Io { path, .. } => Some(json!({ "path": path })),
        _ => None,
    };
    err(id, e.code(), e.to_string(), details)
}
