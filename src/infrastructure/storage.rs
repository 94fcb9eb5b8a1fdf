use crate::infrastructure::error::InfraError;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

pub fn initialize_database(path: &Path) -> Result<(), InfraError> {
    let connection = Connection::open(path)?;
    connection.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// Durable string blobs addressed by key. No transactions across keys.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError>;
    fn set(&self, key: &str, value: &str) -> Result<(), InfraError>;
    fn remove(&self, key: &str) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteKeyValueStore {
    db_path: PathBuf,
}

impl SqliteKeyValueStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError> {
        let connection = self.connect()?;
        let value: Option<String> = connection
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO kv_store (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
               value = excluded.value,
               updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    values: Mutex<HashMap<String, String>>,
}

impl InMemoryKeyValueStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, InfraError> {
        self.values
            .lock()
            .map_err(|error| InfraError::Storage(format!("in-memory lock poisoned: {error}")))
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), InfraError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), InfraError> {
        self.lock()?.remove(key);
        Ok(())
    }
}
