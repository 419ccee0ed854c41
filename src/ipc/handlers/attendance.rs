use crate::admission::{self, SubmissionRequest};
use crate::clock;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

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

fn handle_attendance_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_name = match required_str(req, "className") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    let roll_number = match required_str(req, "rollNumber") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    if class_name.is_empty() || roll_number.is_empty() {
        return err(
            &req.id,
            "bad_params",
            "className and rollNumber must not be empty",
            None,
        );
    }
    let code = match required_str(req, "code") {
        Ok(v) => v,
        Err(e) => return e,
    };
    // Optional once a roll lock exists; the stored name wins either way.
    let name = req
        .params
        .get("name")
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string());

    let submission = SubmissionRequest {
        class_name: &class_name,
        roll_number: &roll_number,
        name: name.as_deref(),
        code_input: &code,
    };

    match admission::submit(conn, &submission, clock::ist_today()) {
        Ok(admitted) => ok(
            &req.id,
            json!({
                "recordId": admitted.record_id,
                "name": admitted.name,
                "date": admitted.date,
                "lockCreated": admitted.lock_created
            }),
        ),
        Err(e) => err(&req.id, &e.code, e.message, None),
    }
}

// Personal-record lookup by class + roll; no session, mirrors the student
// panel's "my attendance" view.
fn handle_attendance_my_records(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_name = match required_str(req, "className") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    let roll_number = match required_str(req, "rollNumber") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };

    let locked_name: Option<String> = match conn
        .query_row(
            "SELECT name FROM roll_locks WHERE class_name = ? AND roll_number = ?",
            (&class_name, &roll_number),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut stmt = match conn.prepare(
        "SELECT date FROM attendance
         WHERE class_name = ? AND roll_number = ?
         ORDER BY date",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let dates = match stmt
        .query_map((&class_name, &roll_number), |row| row.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<String>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "className": class_name,
            "rollNumber": roll_number,
            "lockedName": locked_name,
            "dates": dates
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.submit" => Some(handle_attendance_submit(state, req)),
        "attendance.myRecords" => Some(handle_attendance_my_records(state, req)),
        _ => None,
    }
}
