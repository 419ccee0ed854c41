use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("attendance.sqlite3");
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            name TEXT PRIMARY KEY,
            code TEXT NOT NULL,
            daily_limit INTEGER NOT NULL,
            is_open INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS roll_locks(
            class_name TEXT NOT NULL,
            roll_number TEXT NOT NULL,
            name TEXT NOT NULL,
            PRIMARY KEY(class_name, roll_number),
            FOREIGN KEY(class_name) REFERENCES classes(name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_roll_locks_class ON roll_locks(class_name)",
        [],
    )?;

    // UNIQUE(class_name, roll_number, date) backs the duplicate-per-day guard:
    // the admission insert is conditional on this key, not just on a prior read.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            class_name TEXT NOT NULL,
            roll_number TEXT NOT NULL,
            name TEXT NOT NULL,
            date TEXT NOT NULL,
            UNIQUE(class_name, roll_number, date),
            FOREIGN KEY(class_name) REFERENCES classes(name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_class_date ON attendance(class_name, date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_class_roll ON attendance(class_name, roll_number)",
        [],
    )?;

    // Workspaces created before open/close state existed lack is_open.
    ensure_classes_is_open(conn)?;

    Ok(())
}

fn ensure_classes_is_open(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "classes", "is_open")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE classes ADD COLUMN is_open INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
