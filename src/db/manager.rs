//! Database manager implementation
//!
//! This module provides database connection management with:
//! - SQLite connection pool using r2d2
//! - Async wrapper for database operations
//! - Transaction support
//! - Database backup functionality
//! - Optional timing of every call through the API profiler

use crate::core::config::DatabaseConfig;
use crate::core::error::{AppError, Result};
use crate::core::profiler::ApiProfiler;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task;

fn pool_error(e: r2d2::Error) -> AppError {
    AppError::Internal(format!("Database pool error: {}", e))
}

/// Database manager with connection pool
pub struct DatabaseManager {
    pool: Pool<SqliteConnectionManager>,
    db_path: PathBuf,
    profiler: Option<Arc<ApiProfiler>>,
}

impl DatabaseManager {
    /// Open (creating if needed) the database file and bring its schema up to date
    pub fn new(db_path: &Path, pool_size: u32, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Pending migrations run against a backed-up copy before the pool opens
        crate::db::migrations::run_migrations_with_backup(db_path)?;

        let manager = SqliteConnectionManager::file(db_path).with_init(move |conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            conn.busy_timeout(busy_timeout)?;
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(pool_size)
            .connection_timeout(Duration::from_secs(30))
            .build(manager)
            .map_err(pool_error)?;

        Ok(Self {
            pool,
            db_path: db_path.to_path_buf(),
            profiler: None,
        })
    }

    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Self::new(
            &config.path,
            config.connection_pool_size as u32,
            Duration::from_millis(config.busy_timeout),
        )
    }

    /// Create a new DatabaseManager with an in-memory database for testing
    pub fn new_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory().with_init(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(1) // In-memory databases should use a single connection
            .connection_timeout(Duration::from_secs(30))
            .build(manager)
            .map_err(pool_error)?;

        let manager = Self {
            pool,
            db_path: PathBuf::from(":memory:"),
            profiler: None,
        };
        manager.migrate()?;

        Ok(manager)
    }

    /// Record the duration of every database call as a profiler dependency
    pub fn with_profiler(mut self, profiler: Arc<ApiProfiler>) -> Self {
        self.profiler = Some(profiler);
        self
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(pool_error)
    }

    /// Execute a database operation asynchronously
    ///
    /// This wraps synchronous database operations in tokio::task::spawn_blocking
    /// to avoid blocking the async runtime.
    pub async fn execute<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();

        let work = async move {
            task::spawn_blocking(move || {
                let conn = pool.get().map_err(pool_error)?;
                f(&conn)
            })
            .await
            .map_err(|e| AppError::TaskError(format!("Database task panicked: {}", e)))?
        };

        match &self.profiler {
            Some(profiler) => profiler.time_dependency("sqlite.execute", work).await,
            None => work.await,
        }
    }

    /// Execute a database operation within a transaction
    ///
    /// The transaction is automatically committed if the closure returns Ok,
    /// or rolled back if it returns Err.
    pub async fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();

        let work = async move {
            task::spawn_blocking(move || {
                let mut conn = pool.get().map_err(pool_error)?;
                let tx = conn.transaction()?;
                let result = f(&tx)?;
                tx.commit()?;
                Ok(result)
            })
            .await
            .map_err(|e| AppError::TaskError(format!("Transaction task panicked: {}", e)))?
        };

        match &self.profiler {
            Some(profiler) => profiler.time_dependency("sqlite.transaction", work).await,
            None => work.await,
        }
    }

    /// Execute database migrations
    pub fn migrate(&self) -> Result<()> {
        let mut conn = self.get_connection()?;
        crate::db::migrations::run_migrations(&mut conn)
    }

    /// Directory for online backups, next to the database file; `None` in memory
    pub fn backup_dir(&self) -> Option<PathBuf> {
        if self.db_path == Path::new(":memory:") {
            return None;
        }
        let parent = self.db_path.parent().unwrap_or_else(|| Path::new("."));
        Some(parent.join("backups"))
    }

    /// Backup the database using SQLite's online backup API
    pub async fn backup_async(&self, backup_path: PathBuf) -> Result<()> {
        let pool = self.pool.clone();
        task::spawn_blocking(move || {
            let src_conn = pool.get().map_err(pool_error)?;
            backup_to(&src_conn, &backup_path)
        })
        .await
        .map_err(|e| AppError::TaskError(format!("Backup task panicked: {}", e)))?
    }

    /// Cheap liveness check used by the health endpoint
    pub async fn ping(&self) -> Result<()> {
        self.execute(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn pool_size(&self) -> u32 {
        self.pool.max_size()
    }

    pub fn idle_connections(&self) -> u32 {
        self.pool.state().idle_connections
    }

    pub fn active_connections(&self) -> u32 {
        let state = self.pool.state();
        state.connections - state.idle_connections
    }
}

fn backup_to(src_conn: &Connection, backup_path: &Path) -> Result<()> {
    if let Some(parent) = backup_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut dst_conn = Connection::open(backup_path)?;
    let backup = rusqlite::backup::Backup::new(src_conn, &mut dst_conn)?;
    backup.run_to_completion(5, Duration::from_millis(250), None)?;

    Ok(())
}

impl Clone for DatabaseManager {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            db_path: self.db_path.clone(),
            profiler: self.profiler.clone(),
        }
    }
}
