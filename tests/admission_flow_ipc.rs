use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

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

fn error_code(value: &serde_json::Value) -> &str {
    assert_eq!(value["ok"].as_bool(), Some(false), "expected error: {}", value);
    value["error"]["code"].as_str().unwrap_or("")
}

struct Console {
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u32,
}

impl Console {
    fn call(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        request(
            &mut self.stdin,
            &mut self.reader,
            &self.next_id.to_string(),
            method,
            params,
        )
    }

    fn call_ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        request_ok(
            &mut self.stdin,
            &mut self.reader,
            &self.next_id.to_string(),
            method,
            params,
        )
    }
}

fn open_class(console: &mut Console, name: &str, code: &str, limit: i64) -> String {
    let ws = console_workspace(name);
    // A failed earlier run may have left state behind; start clean.
    let _ = std::fs::remove_dir_all(&ws);
    let _ = console.call_ok(
        "workspace.select",
        json!({ "path": ws.to_string_lossy() }),
    );
    let login = console.call_ok(
        "admin.login",
        json!({ "username": "admin", "password": "letmein" }),
    );
    let token = login["sessionToken"].as_str().expect("token").to_string();
    let _ = console.call_ok("classes.create", json!({ "sessionToken": token, "name": name }));
    let _ = console.call_ok(
        "classes.updateSettings",
        json!({ "sessionToken": token, "name": name, "code": code, "dailyLimit": limit }),
    );
    let _ = console.call_ok(
        "classes.setOpen",
        json!({ "sessionToken": token, "name": name, "open": true }),
    );
    token
}

fn console_workspace(name: &str) -> PathBuf {
    // One workspace per (test, class) keeps parallel test runs apart.
    std::env::temp_dir().join(format!("attendanced-admission-{}-{}", name, std::process::id()))
}

fn submit(
    console: &mut Console,
    class: &str,
    roll: &str,
    name: Option<&str>,
    code: &str,
) -> serde_json::Value {
    let mut params = json!({
        "className": class,
        "rollNumber": roll,
        "code": code
    });
    if let Some(n) = name {
        params["name"] = json!(n);
    }
    console.call("attendance.submit", params)
}

#[test]
fn accepted_then_duplicate_then_limit() {
    let (mut child, stdin, reader) = spawn_daemon();
    let mut console = Console {
        stdin,
        reader,
        next_id: 0,
    };
    let _token = open_class(&mut console, "CS101", "1234", 2);

    // Alice is admitted and her roll locks to her name.
    let first = submit(&mut console, "CS101", "1", Some("Alice"), "1234");
    assert_eq!(first["ok"].as_bool(), Some(true), "{}", first);
    assert_eq!(first["result"]["name"].as_str(), Some("Alice"));
    assert_eq!(first["result"]["lockCreated"].as_bool(), Some(true));

    // Same day, same roll.
    let dup = submit(&mut console, "CS101", "1", Some("Alice"), "1234");
    assert_eq!(error_code(&dup), "already_marked");

    // Bob fills the day (limit 2).
    let second = submit(&mut console, "CS101", "2", Some("Bob"), "1234");
    assert_eq!(second["ok"].as_bool(), Some(true), "{}", second);

    // Cara bounces off the limit.
    let third = submit(&mut console, "CS101", "3", Some("Cara"), "1234");
    assert_eq!(error_code(&third), "limit_reached");

    // A rejected attempt leaves no lock: Cara's roll has no record or name.
    let records = console.call_ok(
        "attendance.myRecords",
        json!({ "className": "CS101", "rollNumber": "3" }),
    );
    assert!(records["lockedName"].is_null());
    assert_eq!(records["dates"].as_array().map(|a| a.len()), Some(0));

    drop(console.stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(console_workspace("CS101"));
}

#[test]
fn wrong_code_and_unknown_class_and_whitespace() {
    let (mut child, stdin, reader) = spawn_daemon();
    let mut console = Console {
        stdin,
        reader,
        next_id: 0,
    };
    let _token = open_class(&mut console, "PHY201", "9999", 10);

    let bad = submit(&mut console, "PHY201", "1", Some("Alice"), "0000");
    assert_eq!(error_code(&bad), "invalid_code");

    // Code comparison is case-sensitive and exact.
    let shouty = submit(&mut console, "PHY201", "1", Some("Alice"), "9999 ");
    assert_eq!(error_code(&shouty), "invalid_code");

    let missing = submit(&mut console, "NOSUCH", "1", Some("Alice"), "9999");
    assert_eq!(error_code(&missing), "class_not_found");

    // Roll and name are trimmed before admission; " 1 " is roll "1".
    let ok = submit(&mut console, "PHY201", " 1 ", Some(" Alice "), "9999");
    assert_eq!(ok["ok"].as_bool(), Some(true), "{}", ok);
    let dup = submit(&mut console, "PHY201", "1", Some("Alice"), "9999");
    assert_eq!(error_code(&dup), "already_marked");

    drop(console.stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(console_workspace("PHY201"));
}

#[test]
fn closed_class_not_listed_and_not_accepting() {
    let (mut child, stdin, reader) = spawn_daemon();
    let mut console = Console {
        stdin,
        reader,
        next_id: 0,
    };
    let token = open_class(&mut console, "CHEM10", "abcd", 10);

    let open = console.call_ok("classes.listOpen", json!({}));
    assert_eq!(open["classes"], json!(["CHEM10"]));

    let _ = console.call_ok(
        "classes.setOpen",
        json!({ "sessionToken": token, "name": "CHEM10", "open": false }),
    );

    let open = console.call_ok("classes.listOpen", json!({}));
    assert_eq!(open["classes"], json!([]));

    let refused = submit(&mut console, "CHEM10", "1", Some("Alice"), "abcd");
    assert_eq!(error_code(&refused), "class_closed");

    drop(console.stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(console_workspace("CHEM10"));
}

#[test]
fn locked_name_is_served_back_and_enforced() {
    let (mut child, stdin, reader) = spawn_daemon();
    let mut console = Console {
        stdin,
        reader,
        next_id: 0,
    };
    let _token = open_class(&mut console, "BIO42", "code", 10);

    let first = submit(&mut console, "BIO42", "7", Some("Dana"), "code");
    assert_eq!(first["ok"].as_bool(), Some(true), "{}", first);

    // The lookup the form uses to auto-fill the name field.
    let records = console.call_ok(
        "attendance.myRecords",
        json!({ "className": "BIO42", "rollNumber": "7" }),
    );
    assert_eq!(records["lockedName"].as_str(), Some("Dana"));
    assert_eq!(records["dates"].as_array().map(|a| a.len()), Some(1));

    drop(console.stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(console_workspace("BIO42"));
}
