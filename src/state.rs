//! Application state management

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::storage::FileStorage;

/// Shared application state
///
/// Handlers reach the database and the archive storage only through this
/// handle, so tests can assemble a state over a scratch directory and an
/// in-memory database.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    db: SqlitePool,
    storage: FileStorage,
}

impl AppState {
    /// Create a new application state
    pub fn new(config: Config, db: SqlitePool, storage: FileStorage) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                db,
                storage,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the database pool
    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }

    /// Get the archive storage
    pub fn storage(&self) -> &FileStorage {
        &self.inner.storage
    }
}
