//! In-process adapters for the store and ledger ports.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

use crate::contracts::{ModuleRecord, ProjectId, ProjectModuleStore};
use crate::installer::{MigrationLedger, MigrationStep};
use crate::registry::{ConfigMap, ModuleKey};

#[derive(Default)]
pub struct InMemoryModuleStore {
    rows: RwLock<HashMap<(ProjectId, ModuleKey), ModuleRecord>>,
}

impl InMemoryModuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

#[async_trait]
impl ProjectModuleStore for InMemoryModuleStore {
    async fn list(&self, project: &ProjectId) -> anyhow::Result<Vec<ModuleRecord>> {
        let mut out: Vec<ModuleRecord> = self
            .rows
            .read()
            .values()
            .filter(|r| &r.project_id == project)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.module_key);
        Ok(out)
    }

    async fn get(
        &self,
        project: &ProjectId,
        module: ModuleKey,
    ) -> anyhow::Result<Option<ModuleRecord>> {
        Ok(self.rows.read().get(&(project.clone(), module)).cloned())
    }

    async fn upsert(
        &self,
        project: &ProjectId,
        module: ModuleKey,
        enabled: bool,
        config: ConfigMap,
    ) -> anyhow::Result<Uuid> {
        let mut rows = self.rows.write();
        let record = rows
            .entry((project.clone(), module))
            .or_insert_with(|| ModuleRecord {
                id: Uuid::new_v4(),
                project_id: project.clone(),
                module_key: module,
                enabled,
                config: ConfigMap::new(),
                updated_at: Utc::now(),
            });
        record.enabled = enabled;
        record.config = config;
        record.updated_at = Utc::now();
        Ok(record.id)
    }
}

/// Ledger keyed by migration file name.
#[derive(Default)]
pub struct InMemoryLedger {
    applied: Mutex<BTreeSet<String>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_applied<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            applied: Mutex::new(files.into_iter().map(Into::into).collect()),
        }
    }

    pub fn applied(&self) -> Vec<String> {
        self.applied.lock().iter().cloned().collect()
    }
}

#[async_trait]
impl MigrationLedger for InMemoryLedger {
    async fn is_applied(&self, step: &MigrationStep) -> anyhow::Result<bool> {
        Ok(self.applied.lock().contains(&step.file))
    }

    async fn record_applied(
        &self,
        step: &MigrationStep,
        _project: Option<&ProjectId>,
    ) -> anyhow::Result<()> {
        self.applied.lock().insert(step.file.clone());
        Ok(())
    }
}
