//! Structural operations over the module dependency graph.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::registry::{ModuleKey, ModuleRegistry, RegistryError};

/// Set of enabled module keys, ordered for stable output.
pub type EnabledSet = BTreeSet<ModuleKey>;

/// Outcome of [`DependencyResolver::can_enable`]. Advisory only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnableCheck {
    pub allowed: bool,
    /// Absent dependencies, in declaration order.
    pub missing: Vec<ModuleKey>,
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Done,
}

/// Borrowing view over a registry. Owns no state.
#[derive(Clone, Copy)]
pub struct DependencyResolver<'r> {
    registry: &'r ModuleRegistry,
}

impl<'r> DependencyResolver<'r> {
    pub fn new(registry: &'r ModuleRegistry) -> Self {
        Self { registry }
    }

    /// Requested keys plus every transitive dependency, dependencies first.
    ///
    /// Traversal is deterministic: requested order, then each module's
    /// declared dependency order. A cycle fails fast with its path.
    pub fn resolve_closure<I>(&self, requested: I) -> Result<Vec<ModuleKey>, RegistryError>
    where
        I: IntoIterator<Item = ModuleKey>,
    {
        let mut marks = HashMap::new();
        let mut path = Vec::new();
        let mut out = Vec::new();

        for key in requested {
            if !self.registry.contains(key) {
                return Err(RegistryError::UnknownModule(key));
            }
            self.visit(key, &mut marks, &mut path, &mut out)?;
        }
        Ok(out)
    }

    fn visit(
        &self,
        key: ModuleKey,
        marks: &mut HashMap<ModuleKey, Mark>,
        path: &mut Vec<ModuleKey>,
        out: &mut Vec<ModuleKey>,
    ) -> Result<(), RegistryError> {
        match marks.get(&key) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                // Back edge: report the loop closed on the repeated key.
                let start = path.iter().position(|k| *k == key).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(key);
                return Err(RegistryError::CycleDetected { path: cycle });
            }
            None => {}
        }

        let def = self
            .registry
            .get(key)
            .ok_or(RegistryError::UnknownModule(key))?;

        marks.insert(key, Mark::Visiting);
        path.push(key);

        for &dep in def.dependencies {
            if !self.registry.contains(dep) {
                return Err(RegistryError::UnknownDependency {
                    module: key,
                    depends_on: dep,
                });
            }
            self.visit(dep, marks, path, out)?;
        }

        path.pop();
        marks.insert(key, Mark::Done);
        out.push(key);
        Ok(())
    }

    /// Allowed iff every direct dependency of `key` is already enabled.
    /// Keys outside the registry are never allowed and report nothing missing.
    pub fn can_enable(&self, key: ModuleKey, enabled: &EnabledSet) -> EnableCheck {
        let Some(def) = self.registry.get(key) else {
            return EnableCheck {
                allowed: false,
                missing: Vec::new(),
            };
        };

        let missing: Vec<ModuleKey> = def
            .dependencies
            .iter()
            .copied()
            .filter(|dep| !enabled.contains(dep))
            .collect();

        EnableCheck {
            allowed: missing.is_empty(),
            missing,
        }
    }

    /// Enabled modules that directly depend on `key`.
    pub fn impact_of_disabling(&self, key: ModuleKey, enabled: &EnabledSet) -> Vec<ModuleKey> {
        self.registry
            .dependents_of(key)
            .map(|m| m.key)
            .filter(|k| enabled.contains(k))
            .collect()
    }

    /// Transitive closure of [`Self::impact_of_disabling`], breadth first.
    /// Does not include `key` itself.
    pub fn cascade_of_disabling(&self, key: ModuleKey, enabled: &EnabledSet) -> Vec<ModuleKey> {
        let mut seen = BTreeSet::from([key]);
        let mut queue = VecDeque::from([key]);
        let mut out = Vec::new();

        while let Some(current) = queue.pop_front() {
            for dependent in self.impact_of_disabling(current, enabled) {
                if seen.insert(dependent) {
                    out.push(dependent);
                    queue.push_back(dependent);
                }
            }
        }
        out
    }

    /// Resolve every registered module; returns a global dependency-first order.
    pub fn validate(&self) -> Result<Vec<ModuleKey>, RegistryError> {
        self.resolve_closure(self.registry.keys())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ModuleDefinition;
    use ModuleKey::*;

    fn builtin() -> ModuleRegistry {
        ModuleRegistry::builtin().unwrap()
    }

    fn set(keys: &[ModuleKey]) -> EnabledSet {
        keys.iter().copied().collect()
    }

    #[test]
    fn closure_contains_every_reachable_key_without_duplicates() {
        let reg = builtin();
        let r = reg.resolver();
        for key in ModuleKey::ALL {
            let closure = r.resolve_closure([key]).unwrap();
            assert!(closure.contains(&key));
            let unique: EnabledSet = closure.iter().copied().collect();
            assert_eq!(unique.len(), closure.len(), "duplicates for {key}");
            for k in &closure {
                for dep in reg.get(*k).unwrap().dependencies {
                    assert!(closure.contains(dep), "{dep} missing from closure of {key}");
                }
            }
        }
    }

    #[test]
    fn closure_orders_dependencies_first() {
        let reg = builtin();
        let closure = reg.resolver().resolve_closure([Billing]).unwrap();
        assert_eq!(closure, vec![Auth, Teams, Billing]);

        let closure = reg
            .resolver()
            .resolve_closure([AiFeatures, AuditLog, Auth])
            .unwrap();
        assert_eq!(closure, vec![Auth, AiFeatures, Teams, AuditLog]);
    }

    #[test]
    fn closure_rejects_keys_outside_the_registry() {
        let reg = ModuleRegistry::builder()
            .with(ModuleDefinition::new(Auth, "Auth", ""))
            .build()
            .unwrap();
        assert_eq!(
            reg.resolver().resolve_closure([Teams]),
            Err(RegistryError::UnknownModule(Teams))
        );
    }

    #[test]
    fn closure_fails_fast_on_cycle() {
        let reg = ModuleRegistry::from_definitions_unchecked(vec![
            ModuleDefinition::new(Teams, "A", "").depends_on(&[Billing]),
            ModuleDefinition::new(Billing, "B", "").depends_on(&[Teams]),
        ]);
        let err = reg.resolver().resolve_closure([Teams]).unwrap_err();
        assert_eq!(
            err,
            RegistryError::CycleDetected {
                path: vec![Teams, Billing, Teams]
            }
        );
        assert!(reg.resolver().validate().is_err());
    }

    #[test]
    fn can_enable_lists_missing_in_declaration_order() {
        let reg = builtin();
        let r = reg.resolver();

        let check = r.can_enable(Billing, &set(&[]));
        assert!(!check.allowed);
        assert_eq!(check.missing, vec![Auth, Teams]);

        let check = r.can_enable(Billing, &set(&[Auth]));
        assert_eq!(check.missing, vec![Teams]);

        let check = r.can_enable(Billing, &set(&[Auth, Teams]));
        assert!(check.allowed);
        assert!(check.missing.is_empty());

        assert!(r.can_enable(Auth, &set(&[])).allowed);
    }

    #[test]
    fn can_enable_unknown_key_is_denied_without_missing() {
        let reg = ModuleRegistry::builder()
            .with(ModuleDefinition::new(Auth, "Auth", ""))
            .build()
            .unwrap();
        let check = reg.resolver().can_enable(Billing, &set(&[Auth]));
        assert_eq!(
            check,
            EnableCheck {
                allowed: false,
                missing: vec![]
            }
        );
    }

    #[test]
    fn impact_only_reports_enabled_direct_dependents() {
        let reg = builtin();
        let enabled = set(&[Auth, Teams, Billing, Landing]);
        assert_eq!(reg.resolver().impact_of_disabling(Teams, &enabled), vec![Billing]);

        let impact = reg.resolver().impact_of_disabling(Auth, &enabled);
        assert_eq!(impact, vec![Teams, Billing]);
        assert!(reg.resolver().impact_of_disabling(Landing, &enabled).is_empty());
    }

    #[test]
    fn cascade_follows_dependents_transitively() {
        let reg = ModuleRegistry::builder()
            .with(ModuleDefinition::new(Auth, "Auth", ""))
            .with(ModuleDefinition::new(Teams, "Teams", "").depends_on(&[Auth]))
            .with(ModuleDefinition::new(Billing, "Billing", "").depends_on(&[Teams]))
            .with(ModuleDefinition::new(Emails, "Emails", "").depends_on(&[Billing]))
            .build()
            .unwrap();
        let enabled = set(&[Auth, Teams, Billing, Emails]);

        // Emails does not depend on Teams directly.
        assert_eq!(reg.resolver().impact_of_disabling(Teams, &enabled), vec![Billing]);
        assert_eq!(
            reg.resolver().cascade_of_disabling(Teams, &enabled),
            vec![Billing, Emails]
        );
    }

    #[test]
    fn validate_orders_the_whole_catalog() {
        let reg = builtin();
        let order = reg.resolver().validate().unwrap();
        assert_eq!(order.len(), ModuleKey::ALL.len());
        let pos = |k: ModuleKey| order.iter().position(|x| *x == k).unwrap();
        for def in reg.all() {
            for dep in def.dependencies {
                assert!(pos(*dep) < pos(def.key));
            }
        }
    }
}
