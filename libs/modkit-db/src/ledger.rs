use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use modkit::{MigrationLedger, MigrationStep, ProjectId};
use sqlx::SqlitePool;

use crate::DbHandle;

const STATUS_SUCCESS: &str = "success";

/// `module_migrations` table adapter. A file counts as applied once it has a
/// `success` row, whichever scope recorded it.
#[derive(Clone)]
pub struct SqlMigrationLedger {
    pool: SqlitePool,
}

impl SqlMigrationLedger {
    pub fn new(db: &DbHandle) -> Self {
        Self {
            pool: db.sqlite().clone(),
        }
    }

    /// Successfully applied migration files, oldest first.
    pub async fn applied_files(&self) -> anyhow::Result<Vec<String>> {
        let files = sqlx::query_scalar(
            "SELECT migration_file FROM module_migrations WHERE status = ? ORDER BY id",
        )
        .bind(STATUS_SUCCESS)
        .fetch_all(&self.pool)
        .await?;
        Ok(files)
    }
}

#[async_trait]
impl MigrationLedger for SqlMigrationLedger {
    async fn is_applied(&self, step: &MigrationStep) -> anyhow::Result<bool> {
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM module_migrations WHERE migration_file = ? AND status = ?",
        )
        .bind(&step.file)
        .bind(STATUS_SUCCESS)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("checking ledger for {step}"))?;
        Ok(n > 0)
    }

    async fn record_applied(
        &self,
        step: &MigrationStep,
        project: Option<&ProjectId>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO module_migrations (project_id, module_key, migration_file, status, applied_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(project.map(ProjectId::as_str))
        .bind(step.scope())
        .bind(&step.file)
        .bind(STATUS_SUCCESS)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .with_context(|| format!("recording {step}"))?;
        Ok(())
    }
}
