use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::registry::{ConfigMap, ModuleKey};

/// Opaque identifier of a tenant project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ProjectId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// One persisted `(project, module)` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub id: Uuid,
    pub project_id: ProjectId,
    pub module_key: ModuleKey,
    pub enabled: bool,
    pub config: ConfigMap,
    pub updated_at: DateTime<Utc>,
}

/// Determines which project the current request acts on.
#[async_trait]
pub trait ProjectResolver: Send + Sync {
    /// `Ok(None)` means there is no project context; errors are treated the same way.
    async fn current_project(&self) -> anyhow::Result<Option<ProjectId>>;
}

/// Fixed project context, e.g. from CLI arguments or configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticProject(pub Option<ProjectId>);

impl StaticProject {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn of(id: impl Into<ProjectId>) -> Self {
        Self(Some(id.into()))
    }
}

#[async_trait]
impl ProjectResolver for StaticProject {
    async fn current_project(&self) -> anyhow::Result<Option<ProjectId>> {
        Ok(self.0.clone())
    }
}

/// Per-project persisted enablement state.
///
/// `upsert` is a single-row write keyed by `(project, module)`; concurrent
/// writers to the same row resolve as last-writer-wins.
#[async_trait]
pub trait ProjectModuleStore: Send + Sync {
    async fn list(&self, project: &ProjectId) -> anyhow::Result<Vec<ModuleRecord>>;

    async fn get(
        &self,
        project: &ProjectId,
        module: ModuleKey,
    ) -> anyhow::Result<Option<ModuleRecord>>;

    /// Replace `enabled` and `config` for the row, creating it if needed.
    async fn upsert(
        &self,
        project: &ProjectId,
        module: ModuleKey,
        enabled: bool,
        config: ConfigMap,
    ) -> anyhow::Result<Uuid>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_project_reports_its_id() {
        assert_eq!(StaticProject::none().current_project().await.unwrap(), None);
        let p = StaticProject::of("proj-1").current_project().await.unwrap();
        assert_eq!(p.as_ref().map(ProjectId::as_str), Some("proj-1"));
    }

    #[test]
    fn project_id_serializes_as_plain_string() {
        let id = ProjectId::from("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
        assert_eq!(id.to_string(), "abc");

        let back: ProjectId = serde_json::from_str("\"proj-9\"").unwrap();
        assert_eq!(back, ProjectId::from("proj-9"));
    }
}
