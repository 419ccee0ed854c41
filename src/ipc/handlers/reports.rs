use crate::clock;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::session;
use crate::ipc::types::{AppState, Request};
use crate::matrix::{self, LedgerRow};
use crate::publish;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::path::PathBuf;

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

fn fetch_ledger(
    conn: &Connection,
    req: &Request,
    class_name: &str,
) -> Result<Vec<LedgerRow>, serde_json::Value> {
    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM classes WHERE name = ?", [class_name], |r| {
            r.get(0)
        })
        .optional()
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    if exists.is_none() {
        return Err(err(&req.id, "not_found", "class not found", None));
    }

    let mut stmt = conn
        .prepare(
            "SELECT roll_number, name, date FROM attendance
             WHERE class_name = ?
             ORDER BY date, roll_number",
        )
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    stmt.query_map([class_name], |row| {
        Ok(LedgerRow {
            roll_number: row.get(0)?,
            name: row.get(1)?,
            date: row.get(2)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))
}

fn handle_reports_matrix(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(resp) = session::require_admin(state, req) {
        return resp;
    }
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let rows = match fetch_ledger(conn, req, &class_name) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let model = matrix::project(&rows);
    ok(
        &req.id,
        json!({ "className": class_name, "matrix": model }),
    )
}

fn handle_reports_export_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(resp) = session::require_admin(state, req) {
        return resp;
    }
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let out_path = match required_str(req, "outPath") {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing outPath", None),
    };
    let rows = match fetch_ledger(conn, req, &class_name) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let model = matrix::project(&rows);
    let csv = matrix::to_csv(&model);

    let out = PathBuf::from(&out_path);
    if let Some(parent) = out.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return err(
                &req.id,
                "io_failed",
                e.to_string(),
                Some(json!({ "path": out_path })),
            );
        }
    }
    if let Err(e) = std::fs::write(&out, csv) {
        return err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": out_path })),
        );
    }

    ok(
        &req.id,
        json!({
            "path": out_path,
            "rowsExported": model.rows.len(),
            "columns": model.columns.len(),
            "droppedRolls": model.dropped_rolls
        }),
    )
}

fn handle_reports_publish_snapshot(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(resp) = session::require_admin(state, req) {
        return resp;
    }
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let host_path = match required_str(req, "hostPath") {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing hostPath", None),
    };
    let rows = match fetch_ledger(conn, req, &class_name) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let model = matrix::project(&rows);
    let csv = matrix::to_csv(&model);

    let host = PathBuf::from(&host_path);
    match publish::publish_snapshot(&host, &class_name, clock::ist_today(), &csv) {
        Ok(outcome) => ok(
            &req.id,
            json!({
                "action": outcome.action.as_str(),
                "path": outcome.path,
                "revision": outcome.revision
            }),
        ),
        Err(e) => err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": host_path })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.matrix" => Some(handle_reports_matrix(state, req)),
        "reports.exportCsv" => Some(handle_reports_export_csv(state, req)),
        "reports.publishSnapshot" => Some(handle_reports_publish_snapshot(state, req)),
        _ => None,
    }
}
