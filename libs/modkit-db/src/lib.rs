//! ModKit database adapters.
//!
//! SQLite-backed implementations of the module-state and migration ports,
//! through SQLx. Other engines are recognised by DSN but not supported.
//!
//! # Example
//! ```rust,no_run
//! # async fn demo() -> modkit_db::Result<()> {
//! use modkit_db::{ConnectOpts, DbHandle, SqlModuleStore};
//!
//! let db = DbHandle::connect("sqlite://database/modules.db", ConnectOpts::default()).await?;
//! modkit_db::ensure_schema(&db).await?;
//! let store = SqlModuleStore::new(&db);
//! # let _ = store;
//! # Ok(())
//! # }
//! ```

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub mod ledger;
pub mod schema;
pub mod scripts;
pub mod sqlite;
pub mod store;

pub use ledger::SqlMigrationLedger;
pub use schema::ensure_schema;
pub use scripts::SqlScriptExecutor;
pub use store::SqlModuleStore;

/// Library-local result type.
pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Unknown DSN: {0}")]
    UnknownDsn(String),

    #[error("Database engine not supported: {0}")]
    UnsupportedEngine(DbEngine),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbEngine {
    Postgres,
    MySql,
    Sqlite,
}

impl fmt::Display for DbEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DbEngine::Postgres => "postgres",
            DbEngine::MySql => "mysql",
            DbEngine::Sqlite => "sqlite",
        })
    }
}

#[derive(Clone, Debug)]
pub struct ConnectOpts {
    /// Pool size for file databases. In-memory databases always use one connection.
    pub max_conns: Option<u32>,
    pub acquire_timeout: Option<Duration>,
    pub busy_timeout: Option<Duration>,
    /// Create parent directories for file DSNs.
    pub create_sqlite_dirs: bool,
}

impl Default for ConnectOpts {
    fn default() -> Self {
        Self {
            max_conns: Some(5),
            acquire_timeout: Some(Duration::from_secs(30)),
            busy_timeout: Some(Duration::from_millis(DEFAULT_SQLITE_BUSY_TIMEOUT_MS)),
            create_sqlite_dirs: true,
        }
    }
}

const DEFAULT_SQLITE_BUSY_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone)]
pub struct DbHandle {
    engine: DbEngine,
    pool: SqlitePool,
    dsn: String,
}

impl DbHandle {
    /// Detect engine by DSN scheme.
    pub fn detect(dsn: &str) -> Result<DbEngine> {
        let s = dsn.trim_start();
        if s.starts_with("postgres://") || s.starts_with("postgresql://") {
            Ok(DbEngine::Postgres)
        } else if s.starts_with("mysql://") {
            Ok(DbEngine::MySql)
        } else if s.starts_with("sqlite:") {
            Ok(DbEngine::Sqlite)
        } else {
            Err(DbError::UnknownDsn(dsn.to_string()))
        }
    }

    pub async fn connect(dsn: &str, opts: ConnectOpts) -> Result<Self> {
        let engine = Self::detect(dsn)?;
        if engine != DbEngine::Sqlite {
            return Err(DbError::UnsupportedEngine(engine));
        }

        let memory = sqlite::is_memory(dsn);
        if !memory && opts.create_sqlite_dirs {
            sqlite::prepare_parent_dir(dsn)?;
        }

        let mut co = SqliteConnectOptions::from_str(dsn)?
            .create_if_missing(true)
            .foreign_keys(true);
        if !memory {
            co = co.journal_mode(SqliteJournalMode::Wal);
            if let Some(t) = opts.busy_timeout {
                co = co.busy_timeout(t);
            }
        }

        let mut po = SqlitePoolOptions::new();
        if memory {
            // Every new connection would see a fresh empty database.
            po = po.max_connections(1).idle_timeout(None).max_lifetime(None);
        } else if let Some(n) = opts.max_conns {
            po = po.max_connections(n);
        }
        if let Some(t) = opts.acquire_timeout {
            po = po.acquire_timeout(t);
        }

        let pool = po.connect_with(co).await?;
        tracing::debug!(dsn, "SQLite pool ready");

        Ok(Self {
            engine,
            pool,
            dsn: dsn.to_string(),
        })
    }

    pub fn engine(&self) -> DbEngine {
        self.engine
    }

    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    pub fn sqlite(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
