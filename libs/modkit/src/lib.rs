//! # ModKit - Module Control Plane
//!
//! Decides which optional modules of an application are active and what
//! configuration they run with.
//!
//! - **Registry**: closed set of module keys with a validated dependency graph
//! - **Resolver**: dependency closure, enable/disable impact checks
//! - **Flag sources**: persisted state → environment → defaults, per key
//! - **Facade**: [`FeatureFlags`] reads and project-scoped mutations
//! - **Installer**: ordered, idempotent migration runs per module
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use modkit::{FeatureFlags, ModuleKey, ModuleRegistry};
//!
//! let registry = Arc::new(ModuleRegistry::builtin()?);
//! let flags = FeatureFlags::builder(registry).build();
//! if flags.is_enabled(ModuleKey::Billing).await {
//!     // ...
//! }
//! ```

pub use anyhow::Result;
pub use async_trait::async_trait;

pub mod catalog;
pub mod contracts;
pub mod flags;
pub mod installer;
pub mod memory;
pub mod presets;
pub mod registry;
pub mod resolver;
pub mod snapshot;
pub mod source;

pub use contracts::{ModuleRecord, ProjectId, ProjectModuleStore, ProjectResolver, StaticProject};
pub use flags::{
    DisableReport, EnableReport, FeatureFlags, FeatureFlagsBuilder, FlagsError, Mutation,
    NotAppliedReason, PresetReport, ResolvedFlags,
};
pub use installer::{
    InstallError, InstallReport, Installer, MigrationExecutor, MigrationLedger, MigrationPlan,
    MigrationStep, SchemaRegenerator,
};
pub use memory::{InMemoryLedger, InMemoryModuleStore};
pub use presets::{builtin_presets, preset, Preset};
pub use registry::{
    ConfigMap, ModuleDefinition, ModuleKey, ModuleRegistry, RegistryBuilder, RegistryError,
    UnknownModuleKey, ROOT_MODULE,
};
pub use resolver::{DependencyResolver, EnableCheck, EnabledSet};
pub use snapshot::FlagSnapshot;
pub use source::{
    DefaultsProvider, EnvProvider, FlagProvider, FlagSource, FlagSourceChain, ModuleFlag,
    PersistedProvider, ProviderSnapshot, DEFAULT_ENV_PREFIX,
};
