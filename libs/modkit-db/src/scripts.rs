use anyhow::Context;
use async_trait::async_trait;
use modkit::{MigrationExecutor, MigrationStep, ModuleKey};
use sqlx::{Executor, SqliteConnection, SqlitePool};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tracing::debug;

use crate::DbHandle;

/// Runs SQL files from a migrations tree:
///
/// ```text
/// <root>/core/<file>
/// <root>/<module>/<file>
/// <root>/<module>/seed.sql
/// ```
///
/// Each file runs in its own transaction.
#[derive(Clone)]
pub struct SqlScriptExecutor {
    pool: SqlitePool,
    root: PathBuf,
}

impl SqlScriptExecutor {
    pub fn new(db: &DbHandle, root: impl Into<PathBuf>) -> Self {
        Self {
            pool: db.sqlite().clone(),
            root: root.into(),
        }
    }

    pub fn path_for(&self, step: &MigrationStep) -> PathBuf {
        self.root.join(step.scope()).join(&step.file)
    }

    pub fn seed_path(&self, module: ModuleKey) -> PathBuf {
        self.root.join(module.as_str()).join("seed.sql")
    }

    async fn run_file(&self, path: &Path) -> anyhow::Result<()> {
        let sql = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;

        let mut conn = self.pool.acquire().await?;
        run_in_transaction(&mut *conn, &sql)
            .await
            .with_context(|| format!("executing {}", path.display()))?;
        debug!(path = %path.display(), "SQL script executed");
        Ok(())
    }
}

type ScriptFuture<'c> = Pin<Box<dyn Future<Output = Result<(), sqlx::Error>> + Send + 'c>>;

/// `BEGIN`, the script, then `COMMIT`; `ROLLBACK` if any statement fails.
/// Returned boxed and `Send` so `async_trait` methods can await it.
fn run_in_transaction<'c>(conn: &'c mut SqliteConnection, sql: &'c str) -> ScriptFuture<'c> {
    Box::pin(async move {
        conn.execute(sqlx::raw_sql("BEGIN")).await?;
        match conn.execute(sqlx::raw_sql(sql)).await {
            Ok(_) => {
                conn.execute(sqlx::raw_sql("COMMIT")).await?;
                Ok(())
            }
            Err(e) => {
                if let Err(rb) = conn.execute(sqlx::raw_sql("ROLLBACK")).await {
                    tracing::warn!(error = %rb, "Rollback after failed script also failed");
                }
                Err(e)
            }
        }
    })
}

#[async_trait]
impl MigrationExecutor for SqlScriptExecutor {
    async fn apply(&self, step: &MigrationStep) -> anyhow::Result<()> {
        self.run_file(&self.path_for(step)).await
    }

    async fn seed(&self, module: ModuleKey) -> anyhow::Result<bool> {
        let path = self.seed_path(module);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(false);
        }
        self.run_file(&path).await?;
        Ok(true)
    }
}
