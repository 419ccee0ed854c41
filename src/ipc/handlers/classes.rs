use crate::ipc::error::{err, ok};
use crate::ipc::handlers::session;
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

const DEFAULT_CODE: &str = "1234";
const DEFAULT_DAILY_LIMIT: i64 = 10;

fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn class_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    conn.query_row("SELECT 1 FROM classes WHERE name = ?", [name], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(resp) = session::require_admin(state, req) {
        return resp;
    }
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    if name.is_empty() {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }

    match class_exists(conn, &name) {
        Ok(true) => return err(&req.id, "class_exists", "class already exists", None),
        Ok(false) => {}
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    if let Err(e) = conn.execute(
        "INSERT INTO classes(name, code, daily_limit, is_open) VALUES(?, ?, ?, 0)",
        (&name, DEFAULT_CODE, DEFAULT_DAILY_LIMIT),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "classes" })),
        );
    }

    ok(
        &req.id,
        json!({
            "name": name,
            "code": DEFAULT_CODE,
            "dailyLimit": DEFAULT_DAILY_LIMIT,
            "isOpen": false
        }),
    )
}

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(resp) = session::require_admin(state, req) {
        return resp;
    }
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "classes": [] }));
    };

    // Counts via correlated subqueries so the console can show a dashboard
    // without extra round-trips.
    let mut stmt = match conn.prepare(
        "SELECT
           c.name,
           c.code,
           c.daily_limit,
           c.is_open,
           (SELECT COUNT(*) FROM roll_locks rl WHERE rl.class_name = c.name) AS locked_rolls,
           (SELECT COUNT(*) FROM attendance a WHERE a.class_name = c.name) AS record_count
         FROM classes c
         ORDER BY c.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            Ok(json!({
                "name": row.get::<_, String>(0)?,
                "code": row.get::<_, String>(1)?,
                "dailyLimit": row.get::<_, i64>(2)?,
                "isOpen": row.get::<_, i64>(3)? != 0,
                "lockedRolls": row.get::<_, i64>(4)?,
                "recordCount": row.get::<_, i64>(5)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(classes) => ok(&req.id, json!({ "classes": classes })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

// Student surface: names only, open classes only, no session required.
fn handle_classes_list_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "classes": [] }));
    };

    let mut stmt = match conn.prepare("SELECT name FROM classes WHERE is_open = 1 ORDER BY name") {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(classes) => ok(&req.id, json!({ "classes": classes })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_classes_set_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(resp) = session::require_admin(state, req) {
        return resp;
    }
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(open) = req.params.get("open").and_then(|v| v.as_bool()) else {
        return err(&req.id, "bad_params", "missing open", None);
    };

    // Check-and-flip in one transaction so two admin consoles cannot race a
    // second class open.
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    match class_exists(&tx, &name) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    if open {
        let others = {
            let mut stmt = match tx
                .prepare("SELECT name FROM classes WHERE is_open = 1 AND name <> ? ORDER BY name")
            {
                Ok(s) => s,
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            };
            match stmt
                .query_map([&name], |row| row.get::<_, String>(0))
                .and_then(|it| it.collect::<Result<Vec<String>, _>>())
            {
                Ok(v) => v,
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            }
        };
        if !others.is_empty() {
            return err(
                &req.id,
                "other_class_open",
                "close other open classes first",
                Some(json!({ "openClasses": others })),
            );
        }
    }

    if let Err(e) = tx.execute(
        "UPDATE classes SET is_open = ? WHERE name = ?",
        (open as i64, &name),
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "name": name, "isOpen": open }))
}

fn handle_classes_update_settings(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(resp) = session::require_admin(state, req) {
        return resp;
    }
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let code = match required_str(req, "code") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(daily_limit) = req.params.get("dailyLimit").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing dailyLimit", None);
    };
    if daily_limit < 1 {
        return err(
            &req.id,
            "bad_params",
            "dailyLimit must be a positive integer",
            None,
        );
    }

    let changed = match conn.execute(
        "UPDATE classes SET code = ?, daily_limit = ? WHERE name = ?",
        (&code, daily_limit, &name),
    ) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };
    if changed == 0 {
        return err(&req.id, "not_found", "class not found", None);
    }

    ok(
        &req.id,
        json!({ "name": name, "code": code, "dailyLimit": daily_limit }),
    )
}

fn handle_classes_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(resp) = session::require_admin(state, req) {
        return resp;
    }
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match class_exists(conn, &name) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Child rows before the parent; no ON DELETE CASCADE in the schema.
    if let Err(e) = tx.execute("DELETE FROM attendance WHERE class_name = ?", [&name]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "attendance" })),
        );
    }
    if let Err(e) = tx.execute("DELETE FROM roll_locks WHERE class_name = ?", [&name]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "roll_locks" })),
        );
    }
    if let Err(e) = tx.execute("DELETE FROM classes WHERE name = ?", [&name]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "classes" })),
        );
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.create" => Some(handle_classes_create(state, req)),
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.listOpen" => Some(handle_classes_list_open(state, req)),
        "classes.setOpen" => Some(handle_classes_set_open(state, req)),
        "classes.updateSettings" => Some(handle_classes_update_settings(state, req)),
        "classes.delete" => Some(handle_classes_delete(state, req)),
        _ => None,
    }
}
