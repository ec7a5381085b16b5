use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// Oldest entries beyond this are dropped on insert.
pub const MAX_HISTORY_ITEMS: usize = 50;

pub const DEFAULT_TITLE: &str = "Untitled";

/// One opened folder, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: String,
    pub path: String,
    pub name: String,
    pub title: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<HistoryItem> {
    Ok(HistoryItem {
        id: row.get(0)?,
        path: row.get(1)?,
        name: row.get(2)?,
        title: row.get(3)?,
        timestamp: row.get(4)?,
    })
}

/// Display name for a path: its last component, or the whole path.
pub fn display_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| path.to_string())
}

/// Record that `path` was opened. Returns the new entry.
pub fn add(conn: &Connection, path: &str) -> rusqlite::Result<HistoryItem> {
    let item = HistoryItem {
        id: uuid::Uuid::new_v4().to_string(),
        path: path.to_string(),
        name: display_name(path),
        title: DEFAULT_TITLE.to_string(),
        timestamp: chrono::Utc::now().timestamp_millis(),
    };
    conn.execute(
        "INSERT INTO history (id, path, name, title, timestamp) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![item.id, item.path, item.name, item.title, item.timestamp],
    )?;
    conn.execute(
        "DELETE FROM history WHERE id NOT IN (
             SELECT id FROM history ORDER BY timestamp DESC, rowid DESC LIMIT ?1
         )",
        params![MAX_HISTORY_ITEMS as i64],
    )?;
    Ok(item)
}

pub fn list(conn: &Connection) -> rusqlite::Result<Vec<HistoryItem>> {
    let mut stmt = conn.prepare(
        "SELECT id, path, name, title, timestamp
         FROM history ORDER BY timestamp DESC, rowid DESC",
    )?;
    let rows = stmt.query_map([], from_row)?;
    rows.collect()
}

pub fn get(conn: &Connection, id: &str) -> rusqlite::Result<Option<HistoryItem>> {
    conn.query_row(
        "SELECT id, path, name, title, timestamp FROM history WHERE id = ?1",
        params![id],
        from_row,
    )
    .optional()
}

/// Set the title of entry `id`. An empty title resets it to the default.
/// Returns `false` if no such entry exists.
pub fn update_title(conn: &Connection, id: &str, title: &str) -> rusqlite::Result<bool> {
    let title = if title.is_empty() { DEFAULT_TITLE } else { title };
    let changed = conn.execute(
        "UPDATE history SET title = ?1 WHERE id = ?2",
        params![title, id],
    )?;
    Ok(changed > 0)
}

pub fn clear(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM history", [])?;
    Ok(())
}
