// Persisted token storage backed by a SQLite key/value table

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

use super::types::StoredSession;

const KEY_ACCESS_TOKEN: &str = "accessToken";
const KEY_REFRESH_TOKEN: &str = "refreshToken";
const KEY_USERNAME: &str = "username";

/// On-disk session storage.
///
/// Tokens are stored as rows in a `session_kv` table so a process restart can
/// rehydrate the session. The in-memory store stays authoritative; callers
/// treat write failures as non-fatal.
#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create session directory: {}", parent.display())
            })?;
        }

        let conn = Connection::open(&self.path)
            .with_context(|| format!("Failed to open session file: {}", self.path.display()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS session_kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )
        .context("Failed to initialize session table")?;

        Ok(conn)
    }

    /// Load the persisted session, if one exists.
    ///
    /// A session is considered present only when an access token row exists;
    /// the refresh token and username rows are optional.
    pub fn load(&self) -> Result<Option<StoredSession>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let conn = self.conn()?;

        let access_token = match get_value(&conn, KEY_ACCESS_TOKEN)? {
            Some(token) => token,
            None => return Ok(None),
        };

        Ok(Some(StoredSession {
            access_token,
            refresh_token: get_value(&conn, KEY_REFRESH_TOKEN)?,
            username: get_value(&conn, KEY_USERNAME)?,
        }))
    }

    /// Write the current tokens. `refresh_token` and `username` are only
    /// updated when provided, so a non-rotating refresh keeps the stored
    /// refresh token intact.
    pub fn store(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        username: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn()?;

        put_value(&conn, KEY_ACCESS_TOKEN, access_token)?;
        if let Some(refresh) = refresh_token {
            put_value(&conn, KEY_REFRESH_TOKEN, refresh)?;
        }
        if let Some(name) = username {
            put_value(&conn, KEY_USERNAME, name)?;
        }

        Ok(())
    }

    /// Purge all persisted session state. Used by logout.
    pub fn clear(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }

        let conn = self.conn()?;
        conn.execute("DELETE FROM session_kv", [])
            .context("Failed to clear session table")?;

        Ok(())
    }
}

fn get_value(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM session_kv WHERE key = ?1",
        [key],
        |row| row.get(0),
    )
    .optional()
    .with_context(|| format!("Failed to read session key: {}", key))
}

fn put_value(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO session_kv (key, value) VALUES (?1, ?2)",
        params![key, value],
    )
    .with_context(|| format!("Failed to write session key: {}", key))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_session_file() -> SessionFile {
        let path = std::env::temp_dir().join(format!("session-{}.db", uuid::Uuid::new_v4()));
        SessionFile::new(path)
    }

    #[test]
    fn test_load_missing_file() {
        let file = temp_session_file();
        assert!(file.load().unwrap().is_none());
    }

    #[test]
    fn test_store_and_load_roundtrip() {
        let file = temp_session_file();
        file.store("A1", Some("R1"), Some("alice")).unwrap();

        let stored = file.load().unwrap().unwrap();
        assert_eq!(stored.access_token, "A1");
        assert_eq!(stored.refresh_token.as_deref(), Some("R1"));
        assert_eq!(stored.username.as_deref(), Some("alice"));

        let _ = std::fs::remove_file(file.path());
    }

    #[test]
    fn test_store_without_rotation_keeps_refresh_token() {
        let file = temp_session_file();
        file.store("A1", Some("R1"), Some("alice")).unwrap();

        // Refresh that does not rotate the refresh token
        file.store("A2", None, None).unwrap();

        let stored = file.load().unwrap().unwrap();
        assert_eq!(stored.access_token, "A2");
        assert_eq!(stored.refresh_token.as_deref(), Some("R1"));
        assert_eq!(stored.username.as_deref(), Some("alice"));

        let _ = std::fs::remove_file(file.path());
    }

    #[test]
    fn test_clear_purges_all_keys() {
        let file = temp_session_file();
        file.store("A1", Some("R1"), Some("alice")).unwrap();

        file.clear().unwrap();
        assert!(file.load().unwrap().is_none());

        // Idempotent
        file.clear().unwrap();

        let _ = std::fs::remove_file(file.path());
    }
}
