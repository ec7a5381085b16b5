use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowBounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// User-facing app settings. Each field is stored as its own JSON-encoded
/// row in the `settings` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub first_time_setup_completed: bool,
    pub sidebar_collapsed: bool,
    pub working_folder: Option<String>,
    pub window_bounds: Option<WindowBounds>,
}

/// A partial update. Fields left as `None` keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_time_setup_completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sidebar_collapsed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_folder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_bounds: Option<WindowBounds>,
}

impl Settings {
    pub fn is_first_time(&self) -> bool {
        !self.first_time_setup_completed
    }
}

pub fn get(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM settings WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

/// Load settings, falling back to defaults for anything never stored.
pub fn load(conn: &Connection) -> crate::Result<Settings> {
    let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut fields = Map::new();
    for row in rows {
        let (key, value) = row?;
        fields.insert(key, serde_json::from_str(&value)?);
    }
    Ok(serde_json::from_value(Value::Object(fields))?)
}

/// Merge `patch` into the stored settings and return the result.
pub fn save(conn: &Connection, patch: &SettingsPatch) -> crate::Result<Settings> {
    if let Value::Object(fields) = serde_json::to_value(patch)? {
        for (key, value) in fields {
            set(conn, &key, &serde_json::to_string(&value)?)?;
        }
    }
    load(conn)
}

pub fn is_first_time(conn: &Connection) -> crate::Result<bool> {
    Ok(load(conn)?.is_first_time())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_empty() {
        let conn = crate::open_in_memory().unwrap();
        let settings = load(&conn).unwrap();
        assert_eq!(settings, Settings::default());
        assert!(is_first_time(&conn).unwrap());
    }

    #[test]
    fn test_save_merges_patch() {
        let conn = crate::open_in_memory().unwrap();
        save(
            &conn,
            &SettingsPatch {
                working_folder: Some("/work".to_string()),
                ..SettingsPatch::default()
            },
        )
        .unwrap();

        let settings = save(
            &conn,
            &SettingsPatch {
                first_time_setup_completed: Some(true),
                ..SettingsPatch::default()
            },
        )
        .unwrap();

        assert!(settings.first_time_setup_completed);
        assert!(!settings.sidebar_collapsed);
        assert_eq!(settings.working_folder.as_deref(), Some("/work"));
        assert!(!is_first_time(&conn).unwrap());
    }

    #[test]
    fn test_window_bounds_round_trip() {
        let conn = crate::open_in_memory().unwrap();
        let bounds = WindowBounds {
            x: -10,
            y: 20,
            width: 1200,
            height: 800,
        };
        save(
            &conn,
            &SettingsPatch {
                window_bounds: Some(bounds),
                ..SettingsPatch::default()
            },
        )
        .unwrap();
        assert_eq!(load(&conn).unwrap().window_bounds, Some(bounds));
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let conn = crate::open_in_memory().unwrap();
        set(&conn, "legacy_theme", "\"dark\"").unwrap();
        assert_eq!(load(&conn).unwrap(), Settings::default());
        assert_eq!(get(&conn, "legacy_theme").unwrap().as_deref(), Some("\"dark\""));
    }

    #[test]
    fn test_corrupt_value_is_an_error() {
        let conn = crate::open_in_memory().unwrap();
        set(&conn, "sidebar_collapsed", "not json").unwrap();
        assert!(matches!(load(&conn), Err(crate::DbError::Json(_))));
    }

    #[test]
    fn test_patch_deserializes_partial_json() {
        let patch: SettingsPatch = serde_json::from_str(r#"{"sidebar_collapsed":true}"#).unwrap();
        assert_eq!(patch.sidebar_collapsed, Some(true));
        assert_eq!(patch.working_folder, None);
    }
}
