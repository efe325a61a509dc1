//! SQLite connections
//!
//! Both handles open lazily on first use and keep the connection for reuse.
//! Every acquisition is scoped to one closure call, so queries on the same
//! handle never overlap.
//!
//! - [`Database`]: ordinary handle used by the built-in article operations
//! - [`ReadOnlyDatabase`]: handle for model-generated queries; opened with
//!   `mode=ro` and `PRAGMA query_only = ON`, so the engine refuses writes

use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OpenFlags};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use fluxion_core::AppConfig;

use crate::error::{Result, SqlError};

/// One result row, keyed by column name in select-list order
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccessMode {
    ReadWrite,
    ReadOnly,
}

/// Lazily opened SQLite connection
pub struct Database {
    path: PathBuf,
    mode: AccessMode,
    conn: Mutex<Option<Connection>>,
}

impl Database {
    /// Handle for the database file at `path`. Nothing is opened yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_mode(path.into(), AccessMode::ReadWrite)
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.database_file())
    }

    fn with_mode(path: PathBuf, mode: AccessMode) -> Self {
        Self {
            path,
            mode,
            conn: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<Connection> {
        if !self.path.exists() {
            return Err(SqlError::NotFound(self.path.clone()));
        }

        let conn = match self.mode {
            AccessMode::ReadWrite => Connection::open_with_flags(
                &self.path,
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?,
            AccessMode::ReadOnly => {
                let uri = format!("file:{}?mode=ro", uri_escape(&self.path));
                let conn = Connection::open_with_flags(
                    uri,
                    OpenFlags::SQLITE_OPEN_READ_ONLY
                        | OpenFlags::SQLITE_OPEN_URI
                        | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )?;
                if let Err(e) = conn.pragma_update(None, "query_only", true) {
                    warn!("query_only pragma unavailable, relying on read-only open: {}", e);
                }
                conn
            }
        };

        info!(
            "Opened {} database connection: {}",
            match self.mode {
                AccessMode::ReadWrite => "read-write",
                AccessMode::ReadOnly => "read-only",
            },
            self.path.display()
        );
        Ok(conn)
    }

    /// Run `f` against the connection, opening it first if needed.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let mut guard = self.conn.lock().map_err(|_| SqlError::LockPoisoned)?;
        let conn = match guard.take() {
            Some(conn) => conn,
            None => self.open()?,
        };
        let result = f(&conn);
        *guard = Some(conn);
        result.map_err(SqlError::from)
    }

    /// Fetch every row of `sql` bound to `params`.
    pub fn query_rows(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        self.with_connection(|conn| {
            let (rows, _) = fetch_rows(conn, sql, params, None)?;
            Ok(rows)
        })
    }

    /// Fetch the first row of `sql`, if any.
    pub fn query_one(&self, sql: &str, params: &[SqlValue]) -> Result<Option<Row>> {
        self.with_connection(|conn| {
            let (mut rows, _) = fetch_rows(conn, sql, params, Some(1))?;
            Ok(if rows.is_empty() { None } else { Some(rows.remove(0)) })
        })
    }

    /// Drop the cached connection; the next call reopens it.
    pub fn close(&self) {
        if let Ok(mut guard) = self.conn.lock() {
            if guard.take().is_some() {
                debug!("Closed database connection: {}", self.path.display());
            }
        }
    }
}

/// Connection that SQLite itself refuses to write through
pub struct ReadOnlyDatabase {
    inner: Database,
}

impl ReadOnlyDatabase {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Database::with_mode(path.into(), AccessMode::ReadOnly),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.database_file())
    }

    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    pub fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        self.inner.with_connection(f)
    }

    /// Run an unbound query and return at most `cap` rows.
    ///
    /// One extra row is requested so the caller learns whether more existed.
    pub fn query_capped(&self, sql: &str, cap: usize) -> Result<(Vec<Row>, bool)> {
        self.with_connection(|conn| fetch_rows(conn, sql, &[], Some(cap)))
    }

    pub fn close(&self) {
        self.inner.close()
    }
}

// ============================================================================
// ROW DECODING
// ============================================================================

fn fetch_rows(
    conn: &Connection,
    sql: &str,
    params: &[SqlValue],
    cap: Option<usize>,
) -> rusqlite::Result<(Vec<Row>, bool)> {
    let mut statement = conn.prepare(sql)?;
    let column_names: Vec<String> = statement
        .column_names()
        .iter()
        .map(ToString::to_string)
        .collect();

    let mut rows = statement.query(params_from_iter(params.iter()))?;
    let mut result = Vec::new();
    let mut truncated = false;

    while let Some(row) = rows.next()? {
        if cap.is_some_and(|cap| result.len() >= cap) {
            truncated = true;
            break;
        }
        let mut record = Map::new();
        for (index, name) in column_names.iter().enumerate() {
            let value: SqlValue = row.get(index)?;
            record.insert(name.clone(), json_from_sql(value));
        }
        result.push(record);
    }

    Ok((result, truncated))
}

fn json_from_sql(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(v) => json!(v),
        SqlValue::Real(v) => json!(v),
        SqlValue::Text(v) => json!(v),
        SqlValue::Blob(bytes) => json!(hex(&bytes)),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn uri_escape(path: &Path) -> String {
    path.display()
        .to_string()
        .replace('%', "%25")
        .replace('?', "%3f")
        .replace('#', "%23")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT, score REAL, raw BLOB);
             INSERT INTO notes (body, score, raw) VALUES ('alpha', 1.5, x'00ff');
             INSERT INTO notes (body, score, raw) VALUES ('beta', NULL, NULL);",
        )
        .unwrap();
        (dir, path)
    }

    #[test]
    fn test_query_rows_decodes_types() {
        let (_dir, path) = fixture();
        let db = Database::new(&path);

        let rows = db
            .query_rows("SELECT * FROM notes WHERE body = ?", &[SqlValue::Text("alpha".into())])
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], 1);
        assert_eq!(rows[0]["score"], 1.5);
        assert_eq!(rows[0]["raw"], "00ff");
        let keys: Vec<&String> = rows[0].keys().collect();
        assert_eq!(keys, ["id", "body", "score", "raw"]);
    }

    #[test]
    fn test_query_one_missing() {
        let (_dir, path) = fixture();
        let db = Database::new(&path);
        let row = db
            .query_one("SELECT * FROM notes WHERE id = ?", &[SqlValue::Integer(99)])
            .unwrap();
        assert!(row.is_none());
    }

    #[test]
    fn test_missing_file_is_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.db");
        let db = ReadOnlyDatabase::new(&path);

        let err = db.query_capped("SELECT 1", 10).unwrap_err();
        assert!(matches!(err, SqlError::NotFound(_)));
        assert!(!path.exists());
    }

    #[test]
    fn test_read_only_rejects_writes_at_engine_level() {
        let (_dir, path) = fixture();
        let db = ReadOnlyDatabase::new(&path);

        let result = db.with_connection(|conn| conn.execute("DELETE FROM notes", []));
        assert!(result.is_err());

        let result = db.with_connection(|conn| {
            conn.execute_batch("CREATE TABLE sneaky (x INTEGER)")
        });
        assert!(result.is_err());

        let (rows, _) = db.query_capped("SELECT COUNT(*) AS n FROM notes", 10).unwrap();
        assert_eq!(rows[0]["n"], 2);
    }

    #[test]
    fn test_query_capped_flags_truncation() {
        let (_dir, path) = fixture();
        let db = ReadOnlyDatabase::new(&path);

        let (rows, truncated) = db.query_capped("SELECT * FROM notes", 1).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(truncated);

        let (rows, truncated) = db.query_capped("SELECT * FROM notes", 2).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(!truncated);
    }

    #[test]
    fn test_connection_reused_after_close() {
        let (_dir, path) = fixture();
        let db = ReadOnlyDatabase::new(&path);
        assert!(db.query_capped("SELECT 1", 1).is_ok());
        db.close();
        assert!(db.query_capped("SELECT 1", 1).is_ok());
    }
}
