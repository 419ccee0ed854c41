use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request, Session};

const SESSION_HOURS: i64 = 8;

fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

/// Gate for admin-only handlers. Returns the error envelope to send when the
/// request carries no valid, unexpired session token.
pub fn require_admin(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let Some(token) = req.params.get("sessionToken").and_then(|v| v.as_str()) else {
        return Some(err(
            &req.id,
            "unauthorized",
            "missing sessionToken; log in first",
            None,
        ));
    };
    let Some(session) = state.sessions.get(token) else {
        return Some(err(&req.id, "unauthorized", "invalid session token", None));
    };
    if session.expires_at <= Utc::now() {
        state.sessions.remove(token);
        return Some(err(
            &req.id,
            "session_expired",
            "session expired; log in again",
            None,
        ));
    }
    None
}

fn handle_admin_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let username = match required_str(req, "username") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let password = match required_str(req, "password") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let Some(admin) = state.admin.as_ref() else {
        return err(
            &req.id,
            "admin_not_configured",
            "admin credentials are not configured",
            None,
        );
    };
    if username != admin.username || password != admin.password {
        return err(&req.id, "invalid_credentials", "invalid credentials", None);
    }

    let token = Uuid::new_v4().to_string();
    let expires_at = Utc::now() + Duration::hours(SESSION_HOURS);
    state
        .sessions
        .insert(token.clone(), Session { expires_at });

    ok(
        &req.id,
        json!({
            "sessionToken": token,
            "expiresAt": expires_at.to_rfc3339()
        }),
    )
}

fn handle_admin_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    let token = match required_str(req, "sessionToken") {
        Ok(v) => v,
        Err(e) => return e,
    };
    state.sessions.remove(&token);
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "admin.login" => Some(handle_admin_login(state, req)),
        "admin.logout" => Some(handle_admin_logout(state, req)),
        _ => None,
    }
}
