//! Consistency checks over a set of modules
//!
//! A set of modules is consistent when every `depends` entry is met by some
//! other member of the set (directly, through `provides`, or by an
//! autodetected DLL) and no member names another in its `conflicts`.
//!
//! # Examples
//!
//! ```
//! use ckan::{CkanModule, RelationshipDescriptor, SanityChecker};
//!
//! let mut a = CkanModule::new("A", "1.0");
//! a.depends.push(RelationshipDescriptor::new("B"));
//! let b = CkanModule::new("B", "1.0");
//!
//! assert!(SanityChecker::is_consistent(&[&a, &b], &[]));
//! assert!(!SanityChecker::is_consistent(&[&a], &[]));
//! ```

use crate::error::{Kraken, KrakenResult};
use crate::{CkanModule, RelationshipDescriptor};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use tracing::debug;

/// One reason a module set is inconsistent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    UnmetDependency {
        module: String,
        dependency: RelationshipDescriptor,
    },
    Conflict {
        module: String,
        with: String,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::UnmetDependency { module, dependency } => {
                write!(f, "{} has an unmet dependency: {}", module, dependency)
            }
            Violation::Conflict { module, with } => {
                write!(f, "{} conflicts with {}", module, with)
            }
        }
    }
}

pub struct SanityChecker;

impl SanityChecker {
    /// Every violation in `modules`, in module order. Empty means consistent.
    pub fn consistency_errors(modules: &[&CkanModule], dlls: &[&str]) -> Vec<Violation> {
        let dlls: HashSet<&str> = dlls.iter().copied().collect();
        let providers = providers_index(modules);
        let mut violations = Vec::new();

        for module in modules {
            for dep in &module.depends {
                if !is_satisfied(dep, &providers, &dlls) {
                    violations.push(Violation::UnmetDependency {
                        module: module.identifier.clone(),
                        dependency: dep.clone(),
                    });
                }
            }

            for conflict in &module.conflicts {
                if conflict.name == module.identifier {
                    continue;
                }
                if let Some(others) = providers.get(conflict.name.as_str()) {
                    for other in others {
                        if other.identifier != module.identifier && conflict.matches(other) {
                            violations.push(Violation::Conflict {
                                module: module.identifier.clone(),
                                with: other.identifier.clone(),
                            });
                        }
                    }
                }
                if dlls.contains(conflict.name.as_str()) {
                    violations.push(Violation::Conflict {
                        module: module.identifier.clone(),
                        with: conflict.name.clone(),
                    });
                }
            }
        }

        if !violations.is_empty() {
            debug!("Found {} consistency violations", violations.len());
        }
        violations
    }

    pub fn is_consistent(modules: &[&CkanModule], dlls: &[&str]) -> bool {
        Self::consistency_errors(modules, dlls).is_empty()
    }

    /// Fail with `Kraken::Inconsistent` listing every violation.
    pub fn enforce_consistency(modules: &[&CkanModule], dlls: &[&str]) -> KrakenResult<()> {
        let violations = Self::consistency_errors(modules, dlls);
        if violations.is_empty() {
            return Ok(());
        }
        Err(Kraken::Inconsistent {
            inconsistencies: violations.iter().map(ToString::to_string).collect(),
        })
    }

    /// Unmet dependency name → identifiers of the modules wanting it.
    pub fn find_unmet_dependencies(
        modules: &[&CkanModule],
        dlls: &[&str],
    ) -> BTreeMap<String, Vec<String>> {
        let dlls: HashSet<&str> = dlls.iter().copied().collect();
        let providers = providers_index(modules);
        let mut unmet: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for module in modules {
            for dep in &module.depends {
                if !is_satisfied(dep, &providers, &dlls) {
                    unmet
                        .entry(dep.name.clone())
                        .or_default()
                        .push(module.identifier.clone());
                }
            }
        }

        unmet
    }
}

/// Name (identifier or provided name) → modules answering to it.
fn providers_index<'a>(modules: &[&'a CkanModule]) -> HashMap<&'a str, Vec<&'a CkanModule>> {
    let mut index: HashMap<&str, Vec<&CkanModule>> = HashMap::new();
    for module in modules {
        for name in module.provides_list() {
            index.entry(name).or_default().push(module);
        }
    }
    index
}

fn is_satisfied(
    dep: &RelationshipDescriptor,
    providers: &HashMap<&str, Vec<&CkanModule>>,
    dlls: &HashSet<&str>,
) -> bool {
    if dlls.contains(dep.name.as_str()) {
        return true;
    }
    providers
        .get(dep.name.as_str())
        .is_some_and(|candidates| candidates.iter().any(|m| dep.matches(m)))
}
