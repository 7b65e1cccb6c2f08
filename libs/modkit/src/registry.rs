//! Static catalog of optional modules.
//!
//! Module identity is a closed enum ([`ModuleKey`]) so dependency lists are
//! checked by the compiler; the registry itself validates the graph shape
//! (known dependencies, no duplicates, no cycles) when it is built.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::resolver::DependencyResolver;

/// Free-form per-module configuration (JSON object).
pub type ConfigMap = serde_json::Map<String, serde_json::Value>;

/// Identifier of every module the platform knows about.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleKey {
    Auth,
    Teams,
    Billing,
    Emails,
    AuditLog,
    FileUploads,
    Landing,
    AiFeatures,
}

/// The implicit root of the dependency graph. It can never be disabled.
pub const ROOT_MODULE: ModuleKey = ModuleKey::Auth;

impl ModuleKey {
    pub const ALL: [ModuleKey; 8] = [
        ModuleKey::Auth,
        ModuleKey::Teams,
        ModuleKey::Billing,
        ModuleKey::Emails,
        ModuleKey::AuditLog,
        ModuleKey::FileUploads,
        ModuleKey::Landing,
        ModuleKey::AiFeatures,
    ];

    /// Stable slug used in storage, environment switches and the client snapshot.
    pub const fn as_str(self) -> &'static str {
        match self {
            ModuleKey::Auth => "auth",
            ModuleKey::Teams => "teams",
            ModuleKey::Billing => "billing",
            ModuleKey::Emails => "emails",
            ModuleKey::AuditLog => "audit-log",
            ModuleKey::FileUploads => "file-uploads",
            ModuleKey::Landing => "landing",
            ModuleKey::AiFeatures => "ai-features",
        }
    }

    /// Name of the environment switch for this module: `prefix` + `AUDIT_LOG`.
    pub fn env_var(self, prefix: &str) -> String {
        format!(
            "{prefix}{}",
            self.as_str().to_ascii_uppercase().replace('-', "_")
        )
    }

    /// Inverse of [`ModuleKey::env_var`]: only the exact upper snake case
    /// spelling names a module.
    pub fn from_env_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.env_var("") == suffix)
    }

    pub const fn is_root(self) -> bool {
        matches!(self, ModuleKey::Auth)
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown module key '{0}'")]
pub struct UnknownModuleKey(pub String);

impl FromStr for ModuleKey {
    type Err = UnknownModuleKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModuleKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownModuleKey(s.to_string()))
    }
}

/// Immutable description of one optional capability.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleDefinition {
    pub key: ModuleKey,
    pub name: &'static str,
    pub description: &'static str,
    /// Modules that must be enabled whenever this one is.
    pub dependencies: &'static [ModuleKey],
    /// URL paths owned by the module (display only).
    pub routes: &'static [&'static str],
    /// Migration identifiers, applied in listed order.
    pub migrations: &'static [&'static str],
    /// Requires a paid plan; enforcement lives in billing.
    pub premium: bool,
    pub default_config: ConfigMap,
}

impl ModuleDefinition {
    pub fn new(key: ModuleKey, name: &'static str, description: &'static str) -> Self {
        Self {
            key,
            name,
            description,
            dependencies: &[],
            routes: &[],
            migrations: &[],
            premium: false,
            default_config: ConfigMap::new(),
        }
    }

    pub fn depends_on(mut self, deps: &'static [ModuleKey]) -> Self {
        self.dependencies = deps;
        self
    }

    pub fn routes(mut self, routes: &'static [&'static str]) -> Self {
        self.routes = routes;
        self
    }

    pub fn migrations(mut self, migrations: &'static [&'static str]) -> Self {
        self.migrations = migrations;
        self
    }

    pub fn premium(mut self, premium: bool) -> Self {
        self.premium = premium;
        self
    }

    /// Non-object values are ignored and leave the config empty.
    pub fn default_config(mut self, config: serde_json::Value) -> Self {
        self.default_config = match config {
            serde_json::Value::Object(map) => map,
            _ => ConfigMap::new(),
        };
        self
    }
}

/// Validated, declaration-ordered set of module definitions.
pub struct ModuleRegistry {
    modules: Vec<ModuleDefinition>,
    index: HashMap<ModuleKey, usize>,
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&'static str> = self.modules.iter().map(|m| m.key.as_str()).collect();
        f.debug_struct("ModuleRegistry")
            .field("modules", &keys)
            .finish()
    }
}

impl ModuleRegistry {
    /// The platform catalog, validated.
    pub fn builtin() -> Result<Self, RegistryError> {
        let mut b = RegistryBuilder::default();
        for def in crate::catalog::builtin_definitions() {
            b.register(def);
        }
        b.build()
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Build without graph validation. Only the resolver's own tests need a
    /// registry that may contain cycles.
    pub(crate) fn from_definitions_unchecked(modules: Vec<ModuleDefinition>) -> Self {
        let index = modules
            .iter()
            .enumerate()
            .map(|(i, m)| (m.key, i))
            .collect();
        Self { modules, index }
    }

    pub fn get(&self, key: ModuleKey) -> Option<&ModuleDefinition> {
        self.index.get(&key).map(|&i| &self.modules[i])
    }

    pub fn contains(&self, key: ModuleKey) -> bool {
        self.index.contains_key(&key)
    }

    /// All definitions in declaration order.
    pub fn all(&self) -> &[ModuleDefinition] {
        &self.modules
    }

    pub fn keys(&self) -> impl Iterator<Item = ModuleKey> + '_ {
        self.modules.iter().map(|m| m.key)
    }

    /// Modules that list `key` among their direct dependencies.
    pub fn dependents_of(&self, key: ModuleKey) -> impl Iterator<Item = &ModuleDefinition> + '_ {
        self.modules
            .iter()
            .filter(move |m| m.dependencies.contains(&key))
    }

    pub fn resolver(&self) -> DependencyResolver<'_> {
        DependencyResolver::new(self)
    }
}

/// Collects definitions; uniqueness and graph integrity are enforced at build time.
#[derive(Default)]
pub struct RegistryBuilder {
    modules: Vec<ModuleDefinition>,
    errors: Vec<String>,
}

impl RegistryBuilder {
    pub fn register(&mut self, def: ModuleDefinition) -> &mut Self {
        if self.modules.iter().any(|m| m.key == def.key) {
            self.errors
                .push(format!("Module '{}' is already registered", def.key));
            return self;
        }
        self.modules.push(def);
        self
    }

    pub fn with(mut self, def: ModuleDefinition) -> Self {
        self.register(def);
        self
    }

    /// Finalize: reject duplicates, dangling dependencies and cycles.
    pub fn build(self) -> Result<ModuleRegistry, RegistryError> {
        if !self.errors.is_empty() {
            return Err(RegistryError::InvalidRegistryConfiguration {
                errors: self.errors,
            });
        }

        for m in &self.modules {
            for &dep in m.dependencies {
                if !self.modules.iter().any(|other| other.key == dep) {
                    return Err(RegistryError::UnknownDependency {
                        module: m.key,
                        depends_on: dep,
                    });
                }
            }
        }

        let registry = ModuleRegistry::from_definitions_unchecked(self.modules);
        let order = registry.resolver().validate()?;

        tracing::debug!(
            modules = ?order.iter().map(|k| k.as_str()).collect::<Vec<_>>(),
            "Module dependency order resolved"
        );

        Ok(registry)
    }
}

/// Configuration-integrity faults of the module graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("unknown module '{0}'")]
    UnknownModule(ModuleKey),
    #[error("module '{module}' depends on unknown '{depends_on}'")]
    UnknownDependency {
        module: ModuleKey,
        depends_on: ModuleKey,
    },
    #[error("cyclic dependency detected: {}", join_path(path))]
    CycleDetected { path: Vec<ModuleKey> },
    #[error("invalid registry configuration:\n{errors:#?}")]
    InvalidRegistryConfiguration { errors: Vec<String> },
}

fn join_path(path: &[ModuleKey]) -> String {
    path.iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}
