mod admission;
mod backup;
mod clock;
mod db;
mod ipc;
mod matrix;
mod publish;

use std::io::{self, BufRead, Write};

use ipc::AdminCredentials;

fn admin_from_env() -> Option<AdminCredentials> {
    let username = std::env::var("ATTENDANCED_ADMIN_USER").ok()?;
    let password = std::env::var("ATTENDANCED_ADMIN_PASS").ok()?;
    if username.is_empty() || password.is_empty() {
        return None;
    }
    Some(AdminCredentials { username, password })
}

fn main() {
    let mut state = ipc::AppState::new(admin_from_env());

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply with an id; report and move on.
                let _ = writeln!(
                    stdout,
                    "{{\"ok\":false,\"error\":{{\"code\":\"bad_json\",\"message\":\"{}\"}}}}",
                    e
                );
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
