//! Persisted workspace key-value state.

use anyhow::{Context, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::util;

mod migrations;

pub const STATE_DIR: &str = ".api-console";
pub const STATE_FILE: &str = "state.sqlite";

const READ_POOL_SIZE: u32 = 4;
const READ_POOL_MIN_IDLE: u32 = 1;

/// Namespaced JSON values scoped to one workspace.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;
    fn set(&self, key: &str, value: &Value) -> Result<()>;
}

#[derive(Debug)]
struct ConnectionCustomizer;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;
        Ok(())
    }

    fn on_release(&self, _conn: Connection) {}
}

pub struct SqliteStore {
    db_path: PathBuf,
    write_conn: Arc<Mutex<Connection>>,
    read_pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    /// Opens `<workspace>/.api-console/state.sqlite`.
    pub fn open_workspace(workspace_root: &Path) -> Result<Self> {
        Self::new(&workspace_root.join(STATE_DIR).join(STATE_FILE))
    }

    pub fn new(db_path: &Path) -> Result<Self> {
        util::ensure_parent_dir(db_path)?;

        let write_conn = Connection::open(db_path)
            .with_context(|| format!("open sqlite db at {}", db_path.display()))?;
        write_conn.busy_timeout(Duration::from_secs(5))?;
        write_conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;
        migrations::migrate(&write_conn)?;
        let write_conn = Arc::new(Mutex::new(write_conn));

        let manager = SqliteConnectionManager::file(db_path);
        let read_pool = Pool::builder()
            .max_size(READ_POOL_SIZE)
            .min_idle(Some(READ_POOL_MIN_IDLE))
            .connection_timeout(Duration::from_secs(5))
            .connection_customizer(Box::new(ConnectionCustomizer))
            .build(manager)
            .with_context(|| "create connection pool")?;

        tracing::debug!(path = %db_path.display(), "workspace state store opened");
        Ok(Self {
            db_path: db_path.to_path_buf(),
            write_conn,
            read_pool,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn read_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.read_pool
            .get()
            .with_context(|| "get read connection from pool")
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let raw: Option<String> = self
            .read_conn()?
            .query_row(
                "SELECT value FROM workspace_state WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|text| {
            serde_json::from_str(&text).with_context(|| format!("decode state value {key}"))
        })
        .transpose()
    }

    fn set(&self, key: &str, value: &Value) -> Result<()> {
        let text = serde_json::to_string(value)?;
        let conn = self
            .write_conn
            .lock()
            .map_err(|_| anyhow::anyhow!("state write connection poisoned"))?;
        conn.execute(
            "INSERT INTO workspace_state (key, value, updated) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated = excluded.updated",
            params![key, text, util::now_millis()],
        )
        .with_context(|| format!("write state value {key}"))?;
        Ok(())
    }
}

/// In-process store for tests and `--no-state` sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store poisoned"))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &Value) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store poisoned"))?;
        values.insert(key.to_string(), value.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn sqlite_store_round_trips_and_reopens() {
        let dir = tempdir().unwrap();
        {
            let store = SqliteStore::open_workspace(dir.path()).unwrap();
            assert_eq!(store.get("missing").unwrap(), None);
            store.set("requestHistory.byEndpoint", &json!({"a": [1, 2]})).unwrap();
            store.set("requestHistory.byEndpoint", &json!({"a": [3]})).unwrap();
        }
        let store = SqliteStore::open_workspace(dir.path()).unwrap();
        assert_eq!(
            store.get("requestHistory.byEndpoint").unwrap(),
            Some(json!({"a": [3]}))
        );
        assert!(store.db_path().ends_with(STATE_FILE));
    }

    #[test]
    fn memory_store_overwrites() {
        let store = MemoryStore::new();
        store.set("k", &json!(1)).unwrap();
        store.set("k", &json!(2)).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(json!(2)));
    }
}
