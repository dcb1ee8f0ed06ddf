use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::SubseekError;
use crate::models::UploadedFile;

const SCHEMA_V1: &str = include_str!("../../../migrations/001_kv_store.sql");

pub const KEY_UPLOADED_FILES: &str = "uploaded_files";
pub const KEY_OPENSUBTITLES_TOKEN: &str = "opensubtitles_token";

/// SQLite-backed key-value store for session state.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self, SubseekError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, SubseekError> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    // ── Raw key-value ───────────────────────────────────────────

    pub fn get(&self, key: &str) -> Result<Option<String>, SubseekError> {
        self.conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), SubseekError> {
        self.conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<(), SubseekError> {
        self.conn
            .execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(())
    }

    // ── Session state ───────────────────────────────────────────

    /// Persist the uploaded-file list.
    pub fn save_files(&self, files: &[UploadedFile]) -> Result<(), SubseekError> {
        let json = serde_json::to_string(files)?;
        self.set(KEY_UPLOADED_FILES, &json)
    }

    /// Load the uploaded-file list saved by the last session.
    pub fn load_files(&self) -> Result<Vec<UploadedFile>, SubseekError> {
        match self.get(KEY_UPLOADED_FILES)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    /// Store the OpenSubtitles bearer token, or forget it with `None`.
    pub fn save_token(&self, token: Option<&str>) -> Result<(), SubseekError> {
        match token {
            Some(token) => self.set(KEY_OPENSUBTITLES_TOKEN, token),
            None => self.remove(KEY_OPENSUBTITLES_TOKEN),
        }
    }

    pub fn load_token(&self) -> Result<Option<String>, SubseekError> {
        self.get(KEY_OPENSUBTITLES_TOKEN)
    }
}

fn run_migrations(conn: &Connection) -> Result<(), SubseekError> {
    let version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        conn.execute_batch(SCHEMA_V1)?;
        conn.pragma_update(None, "user_version", 1)?;
    }
    Ok(())
}
