//! Serialisable, read-only view of resolved flags handed to clients.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::registry::ConfigMap;
use crate::source::ModuleFlag;

/// Computed once per request on the server. Lookups never re-resolve.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlagSnapshot {
    pub flags: BTreeMap<String, bool>,
    pub config: BTreeMap<String, ConfigMap>,
}

impl FlagSnapshot {
    pub fn from_flags<'a>(flags: impl IntoIterator<Item = &'a ModuleFlag>) -> Self {
        let mut snapshot = Self::default();
        for flag in flags {
            let key = flag.key.as_str().to_string();
            snapshot.flags.insert(key.clone(), flag.enabled);
            snapshot.config.insert(key, flag.config.clone());
        }
        snapshot
    }

    /// False for keys the snapshot does not know.
    pub fn is_enabled(&self, key: &str) -> bool {
        self.flags.get(key).copied().unwrap_or(false)
    }

    pub fn config(&self, key: &str) -> Option<&ConfigMap> {
        self.config.get(key)
    }

    /// Typed view of a module's config; `None` when absent or mismatched.
    pub fn config_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.config.get(key)?;
        serde_json::from_value(serde_json::Value::Object(raw.clone())).ok()
    }

    /// Pick `enabled` when the module is on, otherwise `fallback`.
    pub fn gate<T>(&self, key: &str, enabled: T, fallback: T) -> T {
        if self.is_enabled(key) {
            enabled
        } else {
            fallback
        }
    }

    pub fn enabled_modules(&self) -> Vec<&str> {
        self.flags
            .iter()
            .filter(|(_, on)| **on)
            .map(|(k, _)| k.as_str())
            .collect()
    }
}
