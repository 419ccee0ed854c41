use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::clock;

/// One submission attempt from the student surface. `name` is what the form
/// carried; once a roll lock exists the stored name wins and a differing
/// supplied name is rejected.
#[derive(Debug, Clone)]
pub struct SubmissionRequest<'a> {
    pub class_name: &'a str,
    pub roll_number: &'a str,
    pub name: Option<&'a str>,
    pub code_input: &'a str,
}

#[derive(Debug, Clone)]
pub struct Admitted {
    pub record_id: String,
    pub name: String,
    pub date: String,
    pub lock_created: bool,
}

/// Rejections and store failures share this shape; the code keeps them in
/// distinct families (`db_*` is infrastructure, everything else is a normal
/// user-reportable outcome).
#[derive(Debug, Clone)]
pub struct AdmissionError {
    pub code: String,
    pub message: String,
}

impl AdmissionError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is_rejection(&self) -> bool {
        !self.code.starts_with("db_")
    }
}

fn query_failed(e: rusqlite::Error) -> AdmissionError {
    AdmissionError::new("db_query_failed", e.to_string())
}

struct ClassGate {
    code: String,
    daily_limit: i64,
    is_open: bool,
}

/// Decide one submission attempt. The whole check sequence and both writes
/// run inside a single transaction: a rejection at any step commits nothing,
/// including the identity-establishing roll-lock insert.
pub fn submit(
    conn: &Connection,
    req: &SubmissionRequest,
    on_date: NaiveDate,
) -> Result<Admitted, AdmissionError> {
    let date = clock::format_date(on_date);

    // Dropping the transaction without commit rolls everything back.
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| AdmissionError::new("db_tx_failed", e.to_string()))?;

    // 1. The student surface only lists open classes; re-verify anyway.
    let gate: Option<ClassGate> = tx
        .query_row(
            "SELECT code, daily_limit, is_open FROM classes WHERE name = ?",
            [req.class_name],
            |r| {
                Ok(ClassGate {
                    code: r.get(0)?,
                    daily_limit: r.get(1)?,
                    is_open: r.get::<_, i64>(2)? != 0,
                })
            },
        )
        .optional()
        .map_err(query_failed)?;
    let Some(gate) = gate else {
        return Err(AdmissionError::new("class_not_found", "class not found"));
    };
    if !gate.is_open {
        return Err(AdmissionError::new(
            "class_closed",
            "attendance is not open for this class",
        ));
    }

    // 2. Exact, case-sensitive code match.
    if req.code_input != gate.code {
        return Err(AdmissionError::new(
            "invalid_code",
            "incorrect attendance code",
        ));
    }

    // 3. One record per (class, roll, day).
    let already: Option<i64> = tx
        .query_row(
            "SELECT 1 FROM attendance WHERE class_name = ? AND roll_number = ? AND date = ?",
            (req.class_name, req.roll_number, &date),
            |r| r.get(0),
        )
        .optional()
        .map_err(query_failed)?;
    if already.is_some() {
        return Err(AdmissionError::new(
            "already_marked",
            "attendance already marked today",
        ));
    }

    // 4. Daily capacity, counted in the same transaction as the insert.
    let count: i64 = tx
        .query_row(
            "SELECT COUNT(*) FROM attendance WHERE class_name = ? AND date = ?",
            (req.class_name, &date),
            |r| r.get(0),
        )
        .map_err(query_failed)?;
    if count >= gate.daily_limit {
        return Err(AdmissionError::new(
            "limit_reached",
            "attendance limit for today has been reached",
        ));
    }

    // 5. Roll-identity lock: first write wins, forever.
    let locked_name: Option<String> = tx
        .query_row(
            "SELECT name FROM roll_locks WHERE class_name = ? AND roll_number = ?",
            (req.class_name, req.roll_number),
            |r| r.get(0),
        )
        .optional()
        .map_err(query_failed)?;

    let mut lock_created = false;
    let effective_name = match locked_name {
        Some(locked) => {
            if let Some(supplied) = req.name {
                if !supplied.is_empty() && supplied != locked {
                    return Err(AdmissionError::new(
                        "name_locked",
                        "roll number already locked to a different name",
                    ));
                }
            }
            locked
        }
        None => {
            let supplied = req.name.unwrap_or("").trim();
            if supplied.is_empty() {
                return Err(AdmissionError::new(
                    "bad_params",
                    "name is required for a first submission",
                ));
            }
            tx.execute(
                "INSERT INTO roll_locks(class_name, roll_number, name) VALUES(?, ?, ?)",
                (req.class_name, req.roll_number, supplied),
            )
            .map_err(|e| AdmissionError::new("db_insert_failed", e.to_string()))?;
            lock_created = true;
            supplied.to_string()
        }
    };

    // 6. Conditional append; the UNIQUE key catches a duplicate that slipped
    // past step 3 (e.g. another writer on the same database file).
    let record_id = Uuid::new_v4().to_string();
    let inserted = tx
        .execute(
            "INSERT INTO attendance(id, class_name, roll_number, name, date)
             VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(class_name, roll_number, date) DO NOTHING",
            (
                &record_id,
                req.class_name,
                req.roll_number,
                &effective_name,
                &date,
            ),
        )
        .map_err(|e| AdmissionError::new("db_insert_failed", e.to_string()))?;
    if inserted == 0 {
        return Err(AdmissionError::new(
            "already_marked",
            "attendance already marked today",
        ));
    }

    tx.commit()
        .map_err(|e| AdmissionError::new("db_commit_failed", e.to_string()))?;

    Ok(Admitted {
        record_id,
        name: effective_name,
        date,
        lock_created,
    })
}
