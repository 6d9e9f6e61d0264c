use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

const SCHEMA_VERSION: i64 = 1;
const BUSY_TIMEOUT_MS: u32 = 5_000;
const READ_POOL_SIZE: usize = 4;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("background task failed: {0}")]
    Task(String),
    #[error("not found")]
    NotFound,
}

/// Transactional handle onto the engine's SQLite database. Clone cheaply; every
/// clone shares the same writer mutex and read pool.
#[derive(Clone)]
pub struct Store {
    path: PathBuf,
    writer: Arc<Mutex<Connection>>,
    readers: Arc<Mutex<VecDeque<Connection>>>,
}

impl Store {
    pub async fn open(path: PathBuf) -> Result<Self, StoreError> {
        let open_path = path.clone();
        tokio::task::spawn_blocking(move || Self::open_blocking(open_path))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    fn open_blocking(path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let writer = Connection::open(&path)?;
        configure(&writer)?;
        migrate(&writer)?;

        let mut readers = VecDeque::with_capacity(READ_POOL_SIZE);
        for _ in 0..READ_POOL_SIZE {
            let conn = Connection::open_with_flags(
                &path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            configure_reader(&conn)?;
            readers.push_back(conn);
        }

        Ok(Self {
            path,
            writer: Arc::new(Mutex::new(writer)),
            readers: Arc::new(Mutex::new(readers)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) async fn write<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let writer = self.writer.clone();
        tokio::task::spawn_blocking(move || {
            let conn = writer.lock().expect("store writer mutex poisoned");
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    pub(crate) async fn read<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let readers = self.readers.clone();
        let writer = self.writer.clone();
        tokio::task::spawn_blocking(move || {
            let conn = {
                let mut pool = readers.lock().expect("store reader pool mutex poisoned");
                pool.pop_front()
            };
            match conn {
                Some(conn) => {
                    let result = f(&conn);
                    readers
                        .lock()
                        .expect("store reader pool mutex poisoned")
                        .push_back(conn);
                    result
                }
                // Pool momentarily exhausted (shouldn't happen under normal load):
                // fall back to the writer connection rather than fail the read.
                None => {
                    let conn = writer.lock().expect("store writer mutex poisoned");
                    f(&conn)
                }
            }
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn configure(conn: &Connection) -> Result<(), StoreError> {
    conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS as u64))?;
    conn.pragma_update(None, "journal_mode", "wal")?;
    conn.pragma_update(None, "synchronous", "normal")?;
    conn.pragma_update(None, "foreign_keys", "on")?;
    Ok(())
}

fn configure_reader(conn: &Connection) -> Result<(), StoreError> {
    conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS as u64))?;
    Ok(())
}

/// Additive-only migration: create each table if absent, then add any column
/// missing from a known table. Never drops or renames a column, so installations
/// created by older schema versions keep opening cleanly.
fn migrate(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL);

        CREATE TABLE IF NOT EXISTS signals (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            url TEXT NOT NULL,
            title TEXT NOT NULL,
            body_excerpt TEXT NOT NULL,
            author TEXT,
            created_at TEXT NOT NULL,
            raw TEXT NOT NULL,
            contact_hint TEXT,
            scored TEXT,
            proposal_id TEXT,
            status TEXT NOT NULL,
            inserted_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS proposals (
            id TEXT PRIMARY KEY,
            signal_id TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            approved_at TEXT,
            executing_at TEXT,
            executed_at TEXT,
            execution_mode TEXT NOT NULL,
            mission_id TEXT,
            estimated_revenue_cents INTEGER,
            realized_revenue_cents INTEGER,
            data TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS artifacts (
            id TEXT PRIMARY KEY,
            proposal_id TEXT NOT NULL,
            execution_id TEXT,
            created_at TEXT NOT NULL,
            kind TEXT NOT NULL,
            path TEXT NOT NULL,
            sha256 TEXT NOT NULL,
            data TEXT,
            text TEXT
        );

        CREATE TABLE IF NOT EXISTS executions (
            id TEXT PRIMARY KEY,
            proposal_id TEXT NOT NULL,
            mission_id TEXT,
            lane TEXT NOT NULL,
            status TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT,
            approved_by TEXT,
            inputs TEXT NOT NULL,
            outputs TEXT NOT NULL,
            logs_text TEXT NOT NULL DEFAULT '',
            error TEXT,
            metrics TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS missions (
            id TEXT PRIMARY KEY,
            started_at TEXT NOT NULL,
            ends_at TEXT NOT NULL,
            status TEXT NOT NULL,
            config TEXT NOT NULL,
            authority_mode TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS telemetry_events (
            id TEXT PRIMARY KEY,
            ts TEXT NOT NULL,
            mission_id TEXT,
            proposal_id TEXT,
            execution_id TEXT,
            type TEXT NOT NULL,
            payload TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_signals_source ON signals(source);
        CREATE INDEX IF NOT EXISTS idx_proposals_status ON proposals(status);
        CREATE INDEX IF NOT EXISTS idx_executions_status ON executions(status);
        CREATE INDEX IF NOT EXISTS idx_executions_mission ON executions(mission_id);
        CREATE INDEX IF NOT EXISTS idx_telemetry_type ON telemetry_events(type);
        ",
    )?;

    ensure_columns(
        conn,
        "proposals",
        &[("estimated_revenue_cents", "INTEGER"), ("realized_revenue_cents", "INTEGER")],
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO schema_meta(key, value) VALUES ('version', ?1)",
        rusqlite::params![SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

fn ensure_columns(conn: &Connection, table: &str, columns: &[(&str, &str)]) -> Result<(), StoreError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let existing: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<_, _>>()?;

    for (name, sql_type) in columns {
        if !existing.iter().any(|c| c == name) {
            conn.execute(
                &format!("ALTER TABLE {table} ADD COLUMN {name} {sql_type}"),
                [],
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_creates_all_tables() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("engine.sqlite3")).await.unwrap();
        let count = store
            .read(|conn| {
                let n: i64 = conn.query_row(
                    "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='signals'",
                    [],
                    |row| row.get(0),
                )?;
                Ok(n)
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.sqlite3");
        Store::open(path.clone()).await.unwrap();
        // Reopening must not fail even though every table already exists.
        Store::open(path).await.unwrap();
    }
}
