use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use modkit::{ConfigMap, ModuleKey, ModuleRecord, ProjectId, ProjectModuleStore};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::warn;
use uuid::Uuid;

use crate::DbHandle;

const SELECT_COLUMNS: &str =
    "SELECT id, project_id, module_key, enabled, config, updated_at FROM project_modules";

/// `project_modules` table adapter.
#[derive(Clone)]
pub struct SqlModuleStore {
    pool: SqlitePool,
}

impl SqlModuleStore {
    pub fn new(db: &DbHandle) -> Self {
        Self {
            pool: db.sqlite().clone(),
        }
    }
}

/// `Ok(None)` for rows whose module key this build does not know.
fn map_row(row: &SqliteRow) -> anyhow::Result<Option<ModuleRecord>> {
    let raw_key: String = row.try_get("module_key")?;
    let Ok(module_key) = raw_key.parse::<ModuleKey>() else {
        warn!(module_key = %raw_key, "Skipping stored row for unknown module");
        return Ok(None);
    };

    let id: String = row.try_get("id")?;
    let project_id: String = row.try_get("project_id")?;
    let config: String = row.try_get("config")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Some(ModuleRecord {
        id: Uuid::parse_str(&id).with_context(|| format!("bad record id '{id}'"))?,
        project_id: ProjectId::from(project_id),
        module_key,
        enabled: row.try_get("enabled")?,
        config: serde_json::from_str::<ConfigMap>(&config)
            .with_context(|| format!("bad config for module '{module_key}'"))?,
        updated_at: DateTime::parse_from_rfc3339(&updated_at)
            .with_context(|| format!("bad timestamp '{updated_at}'"))?
            .with_timezone(&Utc),
    }))
}

#[async_trait]
impl ProjectModuleStore for SqlModuleStore {
    async fn list(&self, project: &ProjectId) -> anyhow::Result<Vec<ModuleRecord>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE project_id = ? ORDER BY module_key"
        ))
        .bind(project.as_str())
        .fetch_all(&self.pool)
        .await
        .context("loading project modules")?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(rec) = map_row(row)? {
                out.push(rec);
            }
        }
        Ok(out)
    }

    async fn get(
        &self,
        project: &ProjectId,
        module: ModuleKey,
    ) -> anyhow::Result<Option<ModuleRecord>> {
        let row = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE project_id = ? AND module_key = ?"
        ))
        .bind(project.as_str())
        .bind(module.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("loading project module")?;

        match row {
            Some(row) => map_row(&row),
            None => Ok(None),
        }
    }

    async fn upsert(
        &self,
        project: &ProjectId,
        module: ModuleKey,
        enabled: bool,
        config: ConfigMap,
    ) -> anyhow::Result<Uuid> {
        let config = serde_json::to_string(&config)?;
        let id: String = sqlx::query_scalar(
            r#"
            INSERT INTO project_modules (id, project_id, module_key, enabled, config, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (project_id, module_key) DO UPDATE SET
                enabled = excluded.enabled,
                config = excluded.config,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(project.as_str())
        .bind(module.as_str())
        .bind(enabled)
        .bind(config)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("saving module '{module}'"))?;

        Ok(Uuid::parse_str(&id)?)
    }
}
