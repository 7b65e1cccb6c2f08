//! Layered flag providers and the precedence chain that merges them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::contracts::{ProjectId, ProjectModuleStore};
use crate::registry::{ConfigMap, ModuleKey, ModuleRegistry, ROOT_MODULE};

pub const DEFAULT_ENV_PREFIX: &str = "MODULE_";

/// Provenance of a resolved flag. Diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagSource {
    Database,
    Env,
    Default,
    /// Enabled only because an enabled module depends on it.
    Dependency,
}

impl FlagSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            FlagSource::Database => "database",
            FlagSource::Env => "env",
            FlagSource::Default => "default",
            FlagSource::Dependency => "dependency",
        }
    }
}

impl fmt::Display for FlagSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleFlag {
    pub key: ModuleKey,
    pub enabled: bool,
    pub config: ConfigMap,
    pub source: FlagSource,
}

impl ModuleFlag {
    pub fn new(key: ModuleKey, enabled: bool, source: FlagSource) -> Self {
        Self {
            key,
            enabled,
            config: ConfigMap::new(),
            source,
        }
    }

    pub fn with_config(mut self, config: ConfigMap) -> Self {
        self.config = config;
        self
    }
}

/// What one provider knows, read in a single round trip.
#[derive(Debug, Clone, Default)]
pub struct ProviderSnapshot {
    flags: HashMap<ModuleKey, ModuleFlag>,
}

impl ProviderSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, flag: ModuleFlag) {
        self.flags.insert(flag.key, flag);
    }

    /// The flag this layer holds for `key`, if any.
    pub fn try_resolve(&self, key: ModuleKey) -> Option<ModuleFlag> {
        self.flags.get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

impl FromIterator<ModuleFlag> for ProviderSnapshot {
    fn from_iter<T: IntoIterator<Item = ModuleFlag>>(iter: T) -> Self {
        let mut s = Self::default();
        for flag in iter {
            s.insert(flag);
        }
        s
    }
}

/// One precedence layer.
#[async_trait]
pub trait FlagProvider: Send + Sync {
    fn source(&self) -> FlagSource;

    async fn snapshot(&self, project: Option<&ProjectId>) -> anyhow::Result<ProviderSnapshot>;
}

/// Per-project persisted state. Silent without a project.
pub struct PersistedProvider {
    store: Arc<dyn ProjectModuleStore>,
}

impl PersistedProvider {
    pub fn new(store: Arc<dyn ProjectModuleStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl FlagProvider for PersistedProvider {
    fn source(&self) -> FlagSource {
        FlagSource::Database
    }

    async fn snapshot(&self, project: Option<&ProjectId>) -> anyhow::Result<ProviderSnapshot> {
        let Some(project) = project else {
            return Ok(ProviderSnapshot::empty());
        };
        let records = self.store.list(project).await?;
        Ok(records
            .into_iter()
            .map(|r| {
                ModuleFlag::new(r.module_key, r.enabled, FlagSource::Database)
                    .with_config(r.config)
            })
            .collect())
    }
}

#[derive(Debug, Clone)]
enum EnvVars {
    Process,
    Fixed(HashMap<String, String>),
}

/// Boolean switches named `<prefix><MODULE_KEY>`.
///
/// A present switch is a signal: `"true"` enables, any other value disables.
#[derive(Debug, Clone)]
pub struct EnvProvider {
    prefix: String,
    vars: EnvVars,
}

impl EnvProvider {
    /// Reads the process environment on every snapshot.
    pub fn from_process(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            vars: EnvVars::Process,
        }
    }

    /// Reads a fixed variable map instead of the process environment.
    pub fn from_vars<I, K, V>(prefix: impl Into<String>, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            prefix: prefix.into(),
            vars: EnvVars::Fixed(
                vars.into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn read_vars(&self) -> Vec<(String, String)> {
        match &self.vars {
            // Non-UTF-8 entries cannot name a module; skip them.
            EnvVars::Process => std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
            EnvVars::Fixed(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }
}

#[async_trait]
impl FlagProvider for EnvProvider {
    fn source(&self) -> FlagSource {
        FlagSource::Env
    }

    async fn snapshot(&self, _project: Option<&ProjectId>) -> anyhow::Result<ProviderSnapshot> {
        let mut snapshot = ProviderSnapshot::empty();
        for (name, value) in self.read_vars() {
            let Some(suffix) = name.strip_prefix(&self.prefix) else {
                continue;
            };
            match ModuleKey::from_env_suffix(suffix) {
                Some(key) => {
                    snapshot.insert(ModuleFlag::new(key, value == "true", FlagSource::Env))
                }
                None => debug!(var = %name, "Ignoring switch for unknown module"),
            }
        }
        Ok(snapshot)
    }
}

/// Fixed fallback set, enabled with empty config.
#[derive(Debug, Clone)]
pub struct DefaultsProvider {
    modules: Vec<ModuleKey>,
}

impl DefaultsProvider {
    pub fn new(modules: impl IntoIterator<Item = ModuleKey>) -> Self {
        Self {
            modules: modules.into_iter().collect(),
        }
    }
}

impl Default for DefaultsProvider {
    fn default() -> Self {
        Self::new([ModuleKey::Auth, ModuleKey::Landing])
    }
}

#[async_trait]
impl FlagProvider for DefaultsProvider {
    fn source(&self) -> FlagSource {
        FlagSource::Default
    }

    async fn snapshot(&self, _project: Option<&ProjectId>) -> anyhow::Result<ProviderSnapshot> {
        Ok(self
            .modules
            .iter()
            .map(|&k| ModuleFlag::new(k, true, FlagSource::Default))
            .collect())
    }
}

/// Ordered providers; per key, the first provider that knows it wins.
#[derive(Clone)]
pub struct FlagSourceChain {
    providers: Vec<Arc<dyn FlagProvider>>,
}

impl FlagSourceChain {
    pub fn new(providers: Vec<Arc<dyn FlagProvider>>) -> Self {
        Self { providers }
    }

    /// Persisted (when a store is present), then environment, then defaults.
    pub fn standard(
        store: Option<Arc<dyn ProjectModuleStore>>,
        env: EnvProvider,
        defaults: DefaultsProvider,
    ) -> Self {
        let mut providers: Vec<Arc<dyn FlagProvider>> = Vec::with_capacity(3);
        if let Some(store) = store {
            providers.push(Arc::new(PersistedProvider::new(store)));
        }
        providers.push(Arc::new(env));
        providers.push(Arc::new(defaults));
        Self { providers }
    }

    pub fn sources(&self) -> Vec<FlagSource> {
        self.providers.iter().map(|p| p.source()).collect()
    }

    /// Merge all layers into one flag per resolved registry key, in
    /// registry order. Never fails: a failing layer contributes nothing.
    pub async fn load(
        &self,
        registry: &ModuleRegistry,
        project: Option<&ProjectId>,
    ) -> Vec<ModuleFlag> {
        let mut layers = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            match provider.snapshot(project).await {
                Ok(snapshot) => {
                    debug!(
                        source = %provider.source(),
                        count = snapshot.len(),
                        "Flag layer loaded"
                    );
                    layers.push(snapshot);
                }
                Err(e) => {
                    warn!(
                        source = %provider.source(),
                        error = %format!("{e:#}"),
                        "Flag layer unavailable, falling through"
                    );
                }
            }
        }

        let mut flags = Vec::new();
        for def in registry.all() {
            let hit = layers.iter().find_map(|layer| layer.try_resolve(def.key));
            let mut flag = match (hit, def.key == ROOT_MODULE) {
                (Some(flag), _) => flag,
                (None, true) => ModuleFlag::new(def.key, true, FlagSource::Default),
                (None, false) => continue,
            };
            if def.key == ROOT_MODULE {
                flag.enabled = true;
            }
            if flag.config.is_empty() {
                flag.config = def.default_config.clone();
            }
            flags.push(flag);
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ModuleKey::*;

    struct Broken;

    #[async_trait]
    impl FlagProvider for Broken {
        fn source(&self) -> FlagSource {
            FlagSource::Database
        }

        async fn snapshot(&self, _: Option<&ProjectId>) -> anyhow::Result<ProviderSnapshot> {
            anyhow::bail!("relation \"project_modules\" does not exist")
        }
    }

    fn find(flags: &[ModuleFlag], key: ModuleKey) -> Option<&ModuleFlag> {
        flags.iter().find(|f| f.key == key)
    }

    #[tokio::test]
    async fn env_switches_parse_true_as_enabled_and_anything_else_as_disabled() {
        let env = EnvProvider::from_vars(
            "MODULE_",
            [
                ("MODULE_TEAMS", "true"),
                ("MODULE_AUDIT_LOG", "TRUE"),
                ("MODULE_PAYMENTS", "true"),
                ("OTHER_BILLING", "true"),
            ],
        );
        let snap = env.snapshot(None).await.unwrap();
        assert_eq!(snap.len(), 2);
        assert!(snap.try_resolve(Teams).unwrap().enabled);
        assert!(!snap.try_resolve(AuditLog).unwrap().enabled);
        assert!(snap.try_resolve(Billing).is_none());
    }

    #[tokio::test]
    async fn env_switches_with_non_canonical_names_are_ignored() {
        let env = EnvProvider::from_vars(
            "MODULE_",
            [
                ("MODULE_teams", "true"),
                ("MODULE_AUDIT-LOG", "true"),
                ("MODULE_Ai_Features", "true"),
            ],
        );
        let snap = env.snapshot(None).await.unwrap();
        assert!(snap.is_empty());
        assert!(snap.try_resolve(Teams).is_none());
        assert!(snap.try_resolve(AuditLog).is_none());
    }

    #[tokio::test]
    async fn defaults_only_yields_auth_and_landing_with_registry_config() {
        let reg = ModuleRegistry::builtin().unwrap();
        let chain = FlagSourceChain::standard(
            None,
            EnvProvider::from_vars("MODULE_", Vec::<(String, String)>::new()),
            DefaultsProvider::default(),
        );
        let flags = chain.load(&reg, None).await;
        let keys: Vec<_> = flags.iter().map(|f| f.key).collect();
        assert_eq!(keys, vec![Auth, Landing]);
        assert!(flags.iter().all(|f| f.source == FlagSource::Default && f.enabled));
        assert_eq!(
            find(&flags, Landing).unwrap().config,
            reg.get(Landing).unwrap().default_config
        );
    }

    #[tokio::test]
    async fn failing_layer_falls_through_to_the_rest() {
        let reg = ModuleRegistry::builtin().unwrap();
        let env = EnvProvider::from_vars("MODULE_", [("MODULE_TEAMS", "true")]);

        let healthy = FlagSourceChain::new(vec![
            Arc::new(env.clone()),
            Arc::new(DefaultsProvider::default()),
        ]);
        let degraded = FlagSourceChain::new(vec![
            Arc::new(Broken),
            Arc::new(env),
            Arc::new(DefaultsProvider::default()),
        ]);

        let project = ProjectId::from("p1");
        let expected = healthy.load(&reg, Some(&project)).await;
        let actual = degraded.load(&reg, Some(&project)).await;
        assert!(!actual.is_empty());
        assert_eq!(actual, expected);
    }

    #[tokio::test]
    async fn root_module_is_pinned_enabled() {
        let reg = ModuleRegistry::builtin().unwrap();
        let chain = FlagSourceChain::new(vec![
            Arc::new(EnvProvider::from_vars("MODULE_", [("MODULE_AUTH", "false")])),
            Arc::new(DefaultsProvider::new([])),
        ]);
        let flags = chain.load(&reg, None).await;
        let auth = find(&flags, Auth).unwrap();
        assert!(auth.enabled);
        assert_eq!(auth.source, FlagSource::Env);

        let chain = FlagSourceChain::new(vec![Arc::new(DefaultsProvider::new([Landing]))]);
        let flags = chain.load(&reg, None).await;
        assert_eq!(find(&flags, Auth).unwrap().source, FlagSource::Default);
    }

    #[tokio::test]
    async fn explicit_config_is_kept_over_registry_default() {
        let reg = ModuleRegistry::builtin().unwrap();
        let mut cfg = ConfigMap::new();
        cfg.insert("trialDays".into(), 30.into());
        let layer: ProviderSnapshot =
            [ModuleFlag::new(Billing, true, FlagSource::Database).with_config(cfg.clone())]
                .into_iter()
                .collect();

        struct Fixed(ProviderSnapshot);
        #[async_trait]
        impl FlagProvider for Fixed {
            fn source(&self) -> FlagSource {
                FlagSource::Database
            }
            async fn snapshot(&self, _: Option<&ProjectId>) -> anyhow::Result<ProviderSnapshot> {
                Ok(self.0.clone())
            }
        }

        let chain = FlagSourceChain::new(vec![Arc::new(Fixed(layer))]);
        let flags = chain.load(&reg, None).await;
        assert_eq!(find(&flags, Billing).unwrap().config, cfg);
    }
}
