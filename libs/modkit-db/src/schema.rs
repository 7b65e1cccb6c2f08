use crate::{DbHandle, Result};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS project_modules (
    id          TEXT PRIMARY KEY,
    project_id  TEXT NOT NULL,
    module_key  TEXT NOT NULL,
    enabled     INTEGER NOT NULL DEFAULT 0,
    config      TEXT NOT NULL DEFAULT '{}',
    updated_at  TEXT NOT NULL,
    UNIQUE (project_id, module_key)
);

CREATE INDEX IF NOT EXISTS idx_project_modules_project
    ON project_modules (project_id);

CREATE TABLE IF NOT EXISTS module_migrations (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id      TEXT,
    module_key      TEXT NOT NULL,
    migration_file  TEXT NOT NULL,
    status          TEXT NOT NULL,
    applied_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_module_migrations_file
    ON module_migrations (migration_file, status);
"#;

/// Create the module state and migration ledger tables if missing.
pub async fn ensure_schema(db: &DbHandle) -> Result<()> {
    sqlx::raw_sql(SCHEMA).execute(db.sqlite()).await?;
    tracing::debug!("Module tables ensured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConnectOpts;

    #[tokio::test]
    async fn schema_is_idempotent() {
        let db = DbHandle::connect("sqlite::memory:", ConnectOpts::default())
            .await
            .unwrap();
        ensure_schema(&db).await.unwrap();
        ensure_schema(&db).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(db.sqlite())
        .await
        .unwrap();
        assert_eq!(tables, vec!["module_migrations", "project_modules"]);
    }
}
