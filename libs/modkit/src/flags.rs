//! Feature flags facade: the single read and mutation entry point.
//!
//! Every read re-derives flags from the provider chain; nothing is cached
//! between calls. Mutations go through the dependency resolver before they
//! touch the per-project store.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::contracts::{ProjectId, ProjectModuleStore, ProjectResolver, StaticProject};
use crate::presets::Preset;
use crate::registry::{ConfigMap, ModuleKey, ModuleRegistry, RegistryError};
use crate::resolver::{EnableCheck, EnabledSet};
use crate::snapshot::FlagSnapshot;
use crate::source::{
    DefaultsProvider, EnvProvider, FlagSource, FlagSourceChain, ModuleFlag, DEFAULT_ENV_PREFIX,
};

#[derive(Debug, Error)]
pub enum FlagsError {
    #[error("module '{0}' is the root module and cannot be disabled")]
    RootModuleLocked(ModuleKey),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("module store failure: {0:#}")]
    Store(anyhow::Error),
}

/// Why a mutation was skipped. Reported, never raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotAppliedReason {
    NoProjectContext,
    NoPersistence,
}

impl fmt::Display for NotAppliedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NotAppliedReason::NoProjectContext => {
                "no project context; use environment switches or select a project"
            }
            NotAppliedReason::NoPersistence => "no persistent module store is configured",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum Mutation<T> {
    Applied(T),
    NotApplied(NotAppliedReason),
}

impl<T> Mutation<T> {
    pub fn applied(self) -> Option<T> {
        match self {
            Mutation::Applied(v) => Some(v),
            Mutation::NotApplied(_) => None,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Mutation::Applied(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnableReport {
    pub record_id: Uuid,
    pub module: ModuleKey,
    /// Modules that were off before this call, dependencies first.
    pub newly_enabled: Vec<ModuleKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisableReport {
    /// The requested module followed by its cascaded dependents.
    pub disabled: Vec<ModuleKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresetReport {
    pub preset: &'static str,
    pub modules: Vec<EnableReport>,
}

/// Flags after dependency closure: every dependency of an enabled module is
/// itself reported enabled.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolvedFlags {
    flags: Vec<ModuleFlag>,
}

impl ResolvedFlags {
    fn complete(registry: &ModuleRegistry, mut flags: Vec<ModuleFlag>) -> Self {
        let enabled: Vec<ModuleKey> = flags.iter().filter(|f| f.enabled).map(|f| f.key).collect();
        let closure = match registry.resolver().resolve_closure(enabled) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Dependency closure failed; reporting flags as loaded");
                return Self { flags };
            }
        };

        for key in closure {
            match flags.iter_mut().find(|f| f.key == key) {
                Some(flag) if flag.enabled => {}
                Some(flag) => {
                    flag.enabled = true;
                    flag.source = FlagSource::Dependency;
                }
                None => {
                    let config = registry
                        .get(key)
                        .map(|d| d.default_config.clone())
                        .unwrap_or_default();
                    flags.push(ModuleFlag::new(key, true, FlagSource::Dependency).with_config(config));
                }
            }
        }

        let order: Vec<ModuleKey> = registry.keys().collect();
        flags.sort_by_key(|f| order.iter().position(|k| *k == f.key));
        Self { flags }
    }

    pub fn flags(&self) -> &[ModuleFlag] {
        &self.flags
    }

    pub fn into_flags(self) -> Vec<ModuleFlag> {
        self.flags
    }

    pub fn get(&self, key: ModuleKey) -> Option<&ModuleFlag> {
        self.flags.iter().find(|f| f.key == key)
    }

    pub fn is_enabled(&self, key: ModuleKey) -> bool {
        self.get(key).is_some_and(|f| f.enabled)
    }

    pub fn config(&self, key: ModuleKey) -> Option<&ConfigMap> {
        self.get(key).map(|f| &f.config)
    }

    pub fn enabled_modules(&self) -> EnabledSet {
        self.flags
            .iter()
            .filter(|f| f.enabled)
            .map(|f| f.key)
            .collect()
    }

    pub fn to_snapshot(&self) -> FlagSnapshot {
        FlagSnapshot::from_flags(&self.flags)
    }
}

pub struct FeatureFlagsBuilder {
    registry: Arc<ModuleRegistry>,
    store: Option<Arc<dyn ProjectModuleStore>>,
    env: EnvProvider,
    defaults: Vec<ModuleKey>,
    projects: Arc<dyn ProjectResolver>,
}

impl FeatureFlagsBuilder {
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        Self {
            registry,
            store: None,
            env: EnvProvider::from_process(DEFAULT_ENV_PREFIX),
            defaults: vec![ModuleKey::Auth, ModuleKey::Landing],
            projects: Arc::new(StaticProject::none()),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ProjectModuleStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_env(mut self, env: EnvProvider) -> Self {
        self.env = env;
        self
    }

    pub fn with_default_modules(mut self, modules: impl IntoIterator<Item = ModuleKey>) -> Self {
        self.defaults = modules.into_iter().collect();
        self
    }

    pub fn with_project_resolver(mut self, projects: Arc<dyn ProjectResolver>) -> Self {
        self.projects = projects;
        self
    }

    pub fn build(self) -> FeatureFlags {
        let chain = FlagSourceChain::standard(
            self.store.clone(),
            self.env,
            DefaultsProvider::new(self.defaults),
        );
        FeatureFlags {
            registry: self.registry,
            chain,
            store: self.store,
            projects: self.projects,
        }
    }
}

/// Explicitly constructed context: registry, provider chain and store handle.
#[derive(Clone)]
pub struct FeatureFlags {
    registry: Arc<ModuleRegistry>,
    chain: FlagSourceChain,
    store: Option<Arc<dyn ProjectModuleStore>>,
    projects: Arc<dyn ProjectResolver>,
}

impl FeatureFlags {
    pub fn builder(registry: Arc<ModuleRegistry>) -> FeatureFlagsBuilder {
        FeatureFlagsBuilder::new(registry)
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn sources(&self) -> Vec<FlagSource> {
        self.chain.sources()
    }

    /// Resolver errors degrade to "no project".
    pub async fn current_project(&self) -> Option<ProjectId> {
        match self.projects.current_project().await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Project context unavailable");
                None
            }
        }
    }

    // ---- reads ----

    /// Raw precedence result for the current project, before dependency closure.
    pub async fn load_module_flags(&self) -> Vec<ModuleFlag> {
        let project = self.current_project().await;
        self.chain.load(&self.registry, project.as_ref()).await
    }

    pub async fn resolve(&self) -> ResolvedFlags {
        let project = self.current_project().await;
        self.resolve_for(project.as_ref()).await
    }

    pub async fn resolve_for(&self, project: Option<&ProjectId>) -> ResolvedFlags {
        let flags = self.chain.load(&self.registry, project).await;
        ResolvedFlags::complete(&self.registry, flags)
    }

    /// False for keys outside the registry.
    pub async fn is_enabled(&self, key: ModuleKey) -> bool {
        self.resolve().await.is_enabled(key)
    }

    /// Resolved config, else the registry default; `None` outside the registry.
    pub async fn get_config(&self, key: ModuleKey) -> Option<ConfigMap> {
        let def = self.registry.get(key)?;
        let resolved = self.resolve().await;
        Some(
            resolved
                .config(key)
                .filter(|c| !c.is_empty())
                .cloned()
                .unwrap_or_else(|| def.default_config.clone()),
        )
    }

    pub async fn get_enabled_modules(&self) -> EnabledSet {
        self.resolve().await.enabled_modules()
    }

    /// Admin/debug view: every resolved flag with its provenance.
    pub async fn flags_with_source(&self) -> Vec<ModuleFlag> {
        self.resolve().await.into_flags()
    }

    pub async fn snapshot(&self) -> FlagSnapshot {
        self.resolve().await.to_snapshot()
    }

    pub async fn enabled_modules_for(&self, project: &ProjectId) -> EnabledSet {
        self.resolve_for(Some(project)).await.enabled_modules()
    }

    pub async fn can_enable(&self, key: ModuleKey) -> EnableCheck {
        let enabled = self.get_enabled_modules().await;
        self.registry.resolver().can_enable(key, &enabled)
    }

    pub async fn impact_of_disabling(&self, key: ModuleKey) -> Vec<ModuleKey> {
        let enabled = self.get_enabled_modules().await;
        self.registry.resolver().impact_of_disabling(key, &enabled)
    }

    /// Everything `disable(key)` would switch off besides `key`.
    pub async fn cascade_of_disabling(&self, key: ModuleKey) -> Vec<ModuleKey> {
        let enabled = self.get_enabled_modules().await;
        self.registry.resolver().cascade_of_disabling(key, &enabled)
    }

    // ---- mutations ----

    pub async fn enable(
        &self,
        key: ModuleKey,
        config: Option<ConfigMap>,
    ) -> Result<Mutation<EnableReport>, FlagsError> {
        match self.current_project().await {
            Some(project) => self.enable_for(&project, key, config).await,
            None => Ok(not_applied("enable", key, NotAppliedReason::NoProjectContext)),
        }
    }

    pub async fn disable(&self, key: ModuleKey) -> Result<Mutation<DisableReport>, FlagsError> {
        if key.is_root() {
            return Err(FlagsError::RootModuleLocked(key));
        }
        match self.current_project().await {
            Some(project) => self.disable_for(&project, key).await,
            None => Ok(not_applied("disable", key, NotAppliedReason::NoProjectContext)),
        }
    }

    /// Enable `key` and any dependency not already enabled; shallow-merge
    /// `config` into the stored config of `key`.
    #[instrument(skip_all, fields(project = %project, module = %key))]
    pub async fn enable_for(
        &self,
        project: &ProjectId,
        key: ModuleKey,
        config: Option<ConfigMap>,
    ) -> Result<Mutation<EnableReport>, FlagsError> {
        let closure = self.registry.resolver().resolve_closure([key])?;
        let Some(store) = &self.store else {
            return Ok(not_applied("enable", key, NotAppliedReason::NoPersistence));
        };

        let before = self.enabled_modules_for(project).await;
        let mut newly_enabled = Vec::new();

        for &dep in closure.iter().filter(|k| **k != key) {
            if before.contains(&dep) {
                continue;
            }
            let stored = stored_config(store.as_ref(), project, dep).await?;
            store
                .upsert(project, dep, true, stored)
                .await
                .map_err(FlagsError::Store)?;
            newly_enabled.push(dep);
        }

        let mut merged = stored_config(store.as_ref(), project, key).await?;
        if let Some(patch) = config {
            merged.extend(patch);
        }
        let record_id = store
            .upsert(project, key, true, merged)
            .await
            .map_err(FlagsError::Store)?;
        if !before.contains(&key) {
            newly_enabled.push(key);
        }

        info!(
            record_id = %record_id,
            newly_enabled = ?newly_enabled,
            "Module enabled"
        );
        Ok(Mutation::Applied(EnableReport {
            record_id,
            module: key,
            newly_enabled,
        }))
    }

    /// Disable `key` and, transitively, every enabled module depending on it.
    #[instrument(skip_all, fields(project = %project, module = %key))]
    pub async fn disable_for(
        &self,
        project: &ProjectId,
        key: ModuleKey,
    ) -> Result<Mutation<DisableReport>, FlagsError> {
        if key.is_root() {
            return Err(FlagsError::RootModuleLocked(key));
        }
        if !self.registry.contains(key) {
            return Err(RegistryError::UnknownModule(key).into());
        }
        let Some(store) = &self.store else {
            return Ok(not_applied("disable", key, NotAppliedReason::NoPersistence));
        };

        let before = self.enabled_modules_for(project).await;
        let cascade = self.registry.resolver().cascade_of_disabling(key, &before);

        // Dependents go first so no intermediate state has a broken dependency.
        for &module in cascade.iter().rev().chain(std::iter::once(&key)) {
            let stored = stored_config(store.as_ref(), project, module).await?;
            store
                .upsert(project, module, false, stored)
                .await
                .map_err(FlagsError::Store)?;
        }

        let mut disabled = vec![key];
        disabled.extend(cascade);
        info!(disabled = ?disabled, "Module disabled");
        Ok(Mutation::Applied(DisableReport { disabled }))
    }

    /// Enable every module of a preset for the current project.
    pub async fn apply_preset(&self, preset: &Preset) -> Result<Mutation<PresetReport>, FlagsError> {
        match self.current_project().await {
            Some(project) => self.apply_preset_for(&project, preset).await,
            None => {
                warn!(preset = preset.key, "Cannot apply preset: no project context");
                Ok(Mutation::NotApplied(NotAppliedReason::NoProjectContext))
            }
        }
    }

    pub async fn apply_preset_for(
        &self,
        project: &ProjectId,
        preset: &Preset,
    ) -> Result<Mutation<PresetReport>, FlagsError> {
        preset.validate(&self.registry)?;
        let mut modules = Vec::with_capacity(preset.modules.len());
        for &key in preset.modules {
            match self.enable_for(project, key, None).await? {
                Mutation::Applied(report) => modules.push(report),
                Mutation::NotApplied(reason) => return Ok(Mutation::NotApplied(reason)),
            }
        }
        info!(preset = preset.key, project = %project, "Preset applied");
        Ok(Mutation::Applied(PresetReport {
            preset: preset.key,
            modules,
        }))
    }
}

fn not_applied<T>(op: &str, key: ModuleKey, reason: NotAppliedReason) -> Mutation<T> {
    warn!(module = %key, reason = %reason, "Cannot {op} module");
    Mutation::NotApplied(reason)
}

async fn stored_config(
    store: &dyn ProjectModuleStore,
    project: &ProjectId,
    key: ModuleKey,
) -> Result<ConfigMap, FlagsError> {
    Ok(store
        .get(project, key)
        .await
        .map_err(FlagsError::Store)?
        .map(|r| r.config)
        .unwrap_or_default())
}
