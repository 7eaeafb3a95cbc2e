//! SQLite-backed persistence for silos, jobs and discovered entities.

mod categories;
mod discovery;
mod jobs;
mod review;
mod silos;
pub mod types;

pub use jobs::can_transition;
pub use types::*;

use rusqlite::{Connection, ErrorCode};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use crate::platform::{NativePlatform, Platform};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("consistency error: {0}")]
    Consistency(String),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid stored JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to prepare store directory: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Lock contention clears on its own; everything else is a real failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity,
            id: id.into(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Clone)]
pub struct SiloStore {
    db: Arc<Mutex<Connection>>,
}

impl SiloStore {
    pub async fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
            && !dir.exists()
        {
            tokio::fs::create_dir_all(dir).await?;
            NativePlatform::restrict_dir_permissions(dir);
        }
        let db = Connection::open(path)?;
        NativePlatform::restrict_file_permissions(path);
        Self::init(db, &path.display().to_string())
    }

    pub fn in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?, ":memory:")
    }

    fn init(db: Connection, location: &str) -> StoreResult<Self> {
        db.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS silo_specifications (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                workspace_id TEXT,
                docker_image TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS silo_definitions (
                id TEXT PRIMARY KEY,
                workspace_id TEXT NOT NULL,
                name TEXT NOT NULL,
                silo_specification_id TEXT NOT NULL REFERENCES silo_specifications(id),
                config_json TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                workspace_id TEXT NOT NULL,
                job_type TEXT NOT NULL,
                status TEXT NOT NULL,
                resource_id TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        // group_name is '' rather than NULL so the UNIQUE constraint holds
        db.execute(
            "CREATE TABLE IF NOT EXISTS data_sources (
                id TEXT PRIMARY KEY,
                silo_definition_id TEXT NOT NULL REFERENCES silo_definitions(id),
                group_name TEXT NOT NULL DEFAULT '',
                name TEXT NOT NULL,
                tentative TEXT,
                UNIQUE(silo_definition_id, group_name, name)
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS properties (
                id TEXT PRIMARY KEY,
                data_source_id TEXT NOT NULL REFERENCES data_sources(id),
                name TEXT NOT NULL,
                tentative TEXT,
                UNIQUE(data_source_id, name)
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS categories (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                workspace_id TEXT
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS property_categories (
                property_id TEXT NOT NULL REFERENCES properties(id),
                category_id TEXT NOT NULL REFERENCES categories(id),
                PRIMARY KEY (property_id, category_id)
            )",
            [],
        )?;

        info!("Silo store ready at {}", location);
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Builds a `?1, ?2, ...` placeholder list for `IN (...)` clauses.
fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_numbered() {
        assert_eq!(placeholders(3), "?1, ?2, ?3");
        assert_eq!(placeholders(0), "");
    }

    #[tokio::test]
    async fn open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("silos.db");
        let store = SiloStore::open(&path).await.unwrap();
        assert!(path.exists());
        drop(store);

        // Reopening an existing database keeps working.
        SiloStore::open(&path).await.unwrap();
    }

    #[test]
    fn only_lock_contention_is_retryable() {
        let busy = StoreError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        ));
        assert!(busy.is_retryable());
        assert!(!StoreError::Consistency("x".to_string()).is_retryable());
        assert!(!StoreError::not_found("job", "j1").is_retryable());
    }
}
