use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Admin credentials from the environment; plaintext comparison by design.
#[derive(Debug, Clone)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

/// An issued admin session. Tokens live only in daemon memory and die with
/// the process.
#[derive(Debug, Clone)]
pub struct Session {
    pub expires_at: DateTime<Utc>,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub admin: Option<AdminCredentials>,
    pub sessions: HashMap<String, Session>,
}

impl AppState {
    pub fn new(admin: Option<AdminCredentials>) -> Self {
        Self {
            workspace: None,
            db: None,
            admin,
            sessions: HashMap::new(),
        }
    }
}
