use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_daemon() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_attendanced");
    let mut child = Command::new(exe)
        .env("ATTENDANCED_ADMIN_USER", "admin")
        .env("ATTENDANCED_ADMIN_PASS", "letmein")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn attendanced");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn bundle_roundtrip_restores_classes_and_ledger() {
    let source = temp_dir("attendanced-backup-src");
    let restored = temp_dir("attendanced-backup-dst");
    let bundle = source.join("export.attbackup.zip");

    let (mut child, mut stdin, mut reader) = spawn_daemon();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": source.to_string_lossy() }),
    );
    let login = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "admin.login",
        json!({ "username": "admin", "password": "letmein" }),
    );
    let token = login["sessionToken"].as_str().expect("token").to_string();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "classes.create",
        json!({ "sessionToken": token, "name": "CS101" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "classes.setOpen",
        json!({ "sessionToken": token, "name": "CS101", "open": true }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.submit",
        json!({ "className": "CS101", "rollNumber": "1", "name": "Alice", "code": "1234" }),
    );

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "backup.exportWorkspaceBundle",
        json!({
            "sessionToken": token,
            "workspacePath": source.to_string_lossy(),
            "outPath": bundle.to_string_lossy()
        }),
    );
    assert_eq!(
        exported["bundleFormat"].as_str(),
        Some("attendance-workspace-v1")
    );
    assert!(bundle.is_file());

    // Import into a fresh workspace; the daemon re-opens onto the restored db.
    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "backup.importWorkspaceBundle",
        json!({
            "sessionToken": token,
            "workspacePath": restored.to_string_lossy(),
            "inPath": bundle.to_string_lossy()
        }),
    );
    assert_eq!(
        imported["bundleFormatDetected"].as_str(),
        Some("attendance-workspace-v1")
    );

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "classes.list",
        json!({ "sessionToken": token }),
    );
    let classes = listed["classes"].as_array().expect("classes");
    assert_eq!(classes.len(), 1);
    assert_eq!(classes[0]["name"].as_str(), Some("CS101"));
    assert_eq!(classes[0]["recordCount"].as_i64(), Some(1));
    assert_eq!(classes[0]["lockedRolls"].as_i64(), Some(1));

    let records = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "attendance.myRecords",
        json!({ "className": "CS101", "rollNumber": "1" }),
    );
    assert_eq!(records["lockedName"].as_str(), Some("Alice"));
    assert_eq!(records["dates"].as_array().map(|a| a.len()), Some(1));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(source);
    let _ = std::fs::remove_dir_all(restored);
}

#[test]
fn import_rejects_a_foreign_bundle() {
    let workspace = temp_dir("attendanced-backup-foreign");
    let junk = workspace.join("junk.zip");
    // Valid zip signature, not a valid archive; import must fail cleanly.
    std::fs::write(&junk, [0x50, 0x4B, 0x03, 0x04, 0x00, 0x00]).expect("write junk");

    let (mut child, mut stdin, mut reader) = spawn_daemon();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let login = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "admin.login",
        json!({ "username": "admin", "password": "letmein" }),
    );
    let token = login["sessionToken"].as_str().expect("token").to_string();

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "backup.importWorkspaceBundle",
        json!({
            "sessionToken": token,
            "workspacePath": workspace.to_string_lossy(),
            "inPath": junk.to_string_lossy()
        }),
    );
    assert_eq!(resp["ok"].as_bool(), Some(false));
    assert_eq!(resp["error"]["code"].as_str(), Some("io_failed"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
