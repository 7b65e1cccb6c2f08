//! Migration planning and the batch run that applies it.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::contracts::ProjectId;
use crate::registry::{ModuleKey, ModuleRegistry, RegistryError};

/// One migration file and the scope that owns it (`None` = core).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStep {
    pub module: Option<ModuleKey>,
    pub file: String,
}

impl MigrationStep {
    pub fn core(file: impl Into<String>) -> Self {
        Self {
            module: None,
            file: file.into(),
        }
    }

    pub fn module(module: ModuleKey, file: impl Into<String>) -> Self {
        Self {
            module: Some(module),
            file: file.into(),
        }
    }

    /// `core` or the module slug; used as the ledger's module column.
    pub fn scope(&self) -> &'static str {
        self.module.map_or("core", ModuleKey::as_str)
    }
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope(), self.file)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationPlan {
    /// Dependency closure of the requested modules, dependencies first.
    pub modules: Vec<ModuleKey>,
    pub steps: Vec<MigrationStep>,
}

impl MigrationPlan {
    /// Core migrations, then each module's migrations in listed order.
    pub fn for_modules<I>(
        registry: &ModuleRegistry,
        keys: I,
        core_migrations: &[String],
    ) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = ModuleKey>,
    {
        let modules = registry.resolver().resolve_closure(keys)?;
        let mut steps: Vec<MigrationStep> =
            core_migrations.iter().map(MigrationStep::core).collect();

        for &key in &modules {
            let def = registry.get(key).ok_or(RegistryError::UnknownModule(key))?;
            steps.extend(def.migrations.iter().map(|m| MigrationStep::module(key, *m)));
        }
        Ok(Self { modules, steps })
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Tracks which migration files already ran successfully.
#[async_trait]
pub trait MigrationLedger: Send + Sync {
    async fn is_applied(&self, step: &MigrationStep) -> anyhow::Result<bool>;

    async fn record_applied(
        &self,
        step: &MigrationStep,
        project: Option<&ProjectId>,
    ) -> anyhow::Result<()>;
}

/// Runs migration scripts. Their content is opaque here.
#[async_trait]
pub trait MigrationExecutor: Send + Sync {
    async fn apply(&self, step: &MigrationStep) -> anyhow::Result<()>;

    /// `Ok(false)` when the module ships no seed data.
    async fn seed(&self, module: ModuleKey) -> anyhow::Result<bool>;
}

/// Rebuilds derived schema artefacts after a successful run.
#[async_trait]
pub trait SchemaRegenerator: Send + Sync {
    async fn regenerate(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InstallReport {
    pub applied: Vec<MigrationStep>,
    pub skipped: Vec<MigrationStep>,
    pub seeded: Vec<ModuleKey>,
    pub regenerated: bool,
    pub warnings: Vec<String>,
}

#[derive(Debug, Error)]
pub enum InstallError {
    /// The run stopped here; `report` lists what was applied before.
    #[error("migration {step} failed: {cause:#}")]
    Migration {
        step: MigrationStep,
        cause: anyhow::Error,
        report: Box<InstallReport>,
    },
}

pub struct Installer {
    ledger: Arc<dyn MigrationLedger>,
    executor: Arc<dyn MigrationExecutor>,
    regenerator: Option<Arc<dyn SchemaRegenerator>>,
    seed: bool,
    project: Option<ProjectId>,
}

impl Installer {
    pub fn new(ledger: Arc<dyn MigrationLedger>, executor: Arc<dyn MigrationExecutor>) -> Self {
        Self {
            ledger,
            executor,
            regenerator: None,
            seed: false,
            project: None,
        }
    }

    pub fn with_regenerator(mut self, regenerator: Arc<dyn SchemaRegenerator>) -> Self {
        self.regenerator = Some(regenerator);
        self
    }

    pub fn with_seed(mut self, seed: bool) -> Self {
        self.seed = seed;
        self
    }

    pub fn for_project(mut self, project: Option<ProjectId>) -> Self {
        self.project = project;
        self
    }

    /// Apply `plan` in order, once per migration file; stop at the first failure.
    pub async fn run(&self, plan: &MigrationPlan) -> Result<InstallReport, InstallError> {
        let mut report = InstallReport::default();

        for step in &plan.steps {
            let applied = match self.ledger.is_applied(step).await {
                Ok(applied) => applied,
                Err(e) => {
                    // First run: the ledger itself may not exist yet.
                    warn!(migration = %step, error = %format!("{e:#}"), "Ledger read failed; assuming not applied");
                    false
                }
            };
            if applied {
                info!(migration = %step, "Skipping migration (already applied)");
                report.skipped.push(step.clone());
                continue;
            }

            if let Err(cause) = self.executor.apply(step).await {
                error!(migration = %step, error = %format!("{cause:#}"), "Migration failed; halting run");
                return Err(InstallError::Migration {
                    step: step.clone(),
                    cause,
                    report: Box::new(report),
                });
            }
            info!(migration = %step, "Migration applied");

            if let Err(e) = self.ledger.record_applied(step, self.project.as_ref()).await {
                let msg = format!("could not record {step}: {e:#}");
                warn!("{msg}");
                report.warnings.push(msg);
            }
            report.applied.push(step.clone());
        }

        if self.seed {
            for &module in &plan.modules {
                match self.executor.seed(module).await {
                    Ok(true) => {
                        info!(module = %module, "Seed applied");
                        report.seeded.push(module);
                    }
                    Ok(false) => {}
                    Err(e) => {
                        let msg = format!("seed for {module} failed: {e:#}");
                        warn!("{msg}");
                        report.warnings.push(msg);
                    }
                }
            }
        }

        if let Some(regenerator) = &self.regenerator {
            match regenerator.regenerate().await {
                Ok(()) => {
                    info!("Schema types regenerated");
                    report.regenerated = true;
                }
                Err(e) => {
                    let msg = format!("type regeneration failed: {e:#}");
                    warn!("{msg}");
                    report.warnings.push(msg);
                }
            }
        }

        Ok(report)
    }
}
