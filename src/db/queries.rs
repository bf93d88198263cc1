use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

// ── Session entries ──

pub fn get_entry(conn: &Connection, session_id: &str, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM session_entries WHERE session_id = ?1 AND key = ?2",
        params![session_id, key],
        |row| row.get(0),
    )
    .optional()
}

pub fn put_entry(conn: &Connection, session_id: &str, key: &str, value: &str) -> rusqlite::Result<()> {
    let now = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
    conn.execute(
        "INSERT INTO session_entries (session_id, key, value, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(session_id, key) DO UPDATE SET
           value = excluded.value,
           updated_at = excluded.updated_at",
        params![session_id, key, value, now],
    )?;
    Ok(())
}

pub fn delete_entry(conn: &Connection, session_id: &str, key: &str) -> rusqlite::Result<bool> {
    let count = conn.execute(
        "DELETE FROM session_entries WHERE session_id = ?1 AND key = ?2",
        params![session_id, key],
    )?;
    Ok(count > 0)
}
