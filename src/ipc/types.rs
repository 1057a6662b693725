use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    /// Shown in export titles ("<school name> Attendance").
    pub school_name: String,
}

impl AppState {
    pub fn new(school_name: impl Into<String>) -> Self {
        AppState {
            workspace: None,
            db: None,
            school_name: school_name.into(),
        }
    }
}
