//! Dependency and conflict resolution over the installed set.
//!
//! Resolution is a fixed-point iteration. Each pass first removes every
//! descriptor with a missing dependency, then every descriptor with a present
//! conflict, both checked against the live set. Passes repeat until one
//! removes nothing, so removals cascade to dependents.
//!
//! Conflicts remove the descriptor under evaluation, not the one it conflicts
//! with. The policy is asymmetric: with `c` and `d` declaring a mutual
//! conflict, whichever comes first in store order is removed and the other
//! survives.

use std::fmt;

use tracing::{debug, error};

use super::store::DescriptorStore;

/// Why a descriptor was excluded from the resolved set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exclusion {
    MissingDependency { module: String, dependency: String },
    Conflict { module: String, conflict: String },
}

impl Exclusion {
    /// Key of the excluded mod.
    pub fn module(&self) -> &str {
        match self {
            Self::MissingDependency { module, .. } | Self::Conflict { module, .. } => module,
        }
    }
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingDependency { module, dependency } => {
                write!(f, "{} requires missing dependency {}", module, dependency)
            }
            Self::Conflict { module, conflict } => {
                write!(f, "{} conflicts with installed mod {}", module, conflict)
            }
        }
    }
}

/// Outcome of one resolution run.
#[derive(Debug, Clone, Default)]
pub struct ResolveReport {
    pub exclusions: Vec<Exclusion>,
    /// Number of passes, including the final pass that removed nothing.
    pub passes: usize,
}

impl ResolveReport {
    pub fn is_excluded(&self, name: &str) -> bool {
        let key = name.to_lowercase();
        self.exclusions.iter().any(|e| e.module() == key)
    }

    /// Distinct excluded keys in removal order.
    pub fn removed(&self) -> Vec<&str> {
        let mut removed: Vec<&str> = Vec::new();
        for e in &self.exclusions {
            if !removed.contains(&e.module()) {
                removed.push(e.module());
            }
        }
        removed
    }
}

/// Computes the maximal consistent subset of a descriptor store.
#[derive(Debug, Default, Clone, Copy)]
pub struct DependencyResolver;

impl DependencyResolver {
    pub fn new() -> Self {
        Self
    }

    /// Remove every descriptor whose dependencies are not all present or
    /// whose declared conflicts are present, until a fixed point is reached.
    ///
    /// Each pass runs the dependency check over the whole set before the
    /// conflict check, so a mod never loses to a conflict partner that is
    /// itself missing a dependency.
    pub fn resolve(&self, store: &mut DescriptorStore) -> ResolveReport {
        let mut report = ResolveReport::default();

        loop {
            report.passes += 1;
            let dropped_missing = self.drop_missing_dependencies(store, &mut report);
            let dropped_conflicting = self.drop_conflicts(store, &mut report);
            let removed_any = dropped_missing || dropped_conflicting;

            if !removed_any {
                break;
            }
        }

        debug!(
            passes = report.passes,
            excluded = report.removed().len(),
            remaining = store.len(),
            "Dependency resolution complete"
        );
        report
    }

    fn drop_missing_dependencies(
        &self,
        store: &mut DescriptorStore,
        report: &mut ResolveReport,
    ) -> bool {
        let mut removed_any = false;
        let keys: Vec<String> = store.keys().map(str::to_string).collect();

        for key in keys {
            let Some(descriptor) = store.get(&key).cloned() else {
                continue;
            };
            let missing: Vec<&String> = descriptor
                .dependencies
                .iter()
                .filter(|dep| !store.contains(dep))
                .collect();
            if missing.is_empty() {
                continue;
            }

            for dependency in missing {
                error!(
                    module = %key,
                    dependency = %dependency,
                    "Mod {} cannot be loaded: missing dependency {}",
                    descriptor.printable_name(),
                    dependency
                );
                report.exclusions.push(Exclusion::MissingDependency {
                    module: key.clone(),
                    dependency: dependency.clone(),
                });
            }
            store.remove(&key);
            removed_any = true;
        }
        removed_any
    }

    fn drop_conflicts(&self, store: &mut DescriptorStore, report: &mut ResolveReport) -> bool {
        let mut removed_any = false;
        let keys: Vec<String> = store.keys().map(str::to_string).collect();

        for key in keys {
            let Some(descriptor) = store.get(&key).cloned() else {
                continue;
            };
            let Some(conflict) = descriptor.conflicts.iter().find(|c| store.contains(c)) else {
                continue;
            };

            error!(
                module = %key,
                conflict = %conflict,
                "Mod {} cannot be loaded: conflicts with installed mod {}",
                descriptor.printable_name(),
                conflict
            );
            report.exclusions.push(Exclusion::Conflict {
                module: key.clone(),
                conflict: conflict.clone(),
            });
            store.remove(&key);
            removed_any = true;
        }
        removed_any
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mods::descriptor::ModuleDescriptor;

    fn store(descriptors: Vec<ModuleDescriptor>) -> DescriptorStore {
        descriptors.into_iter().collect()
    }

    fn d(name: &str) -> ModuleDescriptor {
        ModuleDescriptor::new(name).unwrap()
    }

    #[test]
    fn test_consistent_set_untouched() {
        let mut s = store(vec![d("lib"), d("app").with_dependency("LIB")]);
        let report = DependencyResolver.resolve(&mut s);
        assert!(report.exclusions.is_empty());
        assert_eq!(report.passes, 1);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_missing_dependency_excluded() {
        let mut s = store(vec![d("a").with_dependency("b")]);
        let report = DependencyResolver.resolve(&mut s);
        assert!(s.is_empty());
        assert_eq!(
            report.exclusions,
            vec![Exclusion::MissingDependency {
                module: "a".into(),
                dependency: "b".into()
            }]
        );
    }

    #[test]
    fn test_conflict_removes_first_evaluated() {
        let mut s = store(vec![d("c").with_conflict("d"), d("d").with_conflict("c")]);
        let report = DependencyResolver.resolve(&mut s);
        assert_eq!(report.removed(), vec!["c"]);
        assert!(s.contains("d"));
        assert!(!s.contains("c"));
    }

    #[test]
    fn test_cascade_needs_multiple_passes() {
        let mut s = store(vec![
            d("a").with_dependency("b"),
            d("b").with_dependency("c"),
            d("c").with_conflict("e"),
            d("e"),
        ]);
        let report = DependencyResolver.resolve(&mut s);
        assert_eq!(s.keys().collect::<Vec<_>>(), vec!["e"]);
        assert_eq!(report.removed(), vec!["c", "b", "a"]);
        assert!(report.passes >= 3);
    }

    #[test]
    fn test_conflict_partner_with_missing_dependency_does_not_win() {
        let mut s = store(vec![d("c").with_conflict("d"), d("d").with_dependency("x")]);
        let report = DependencyResolver.resolve(&mut s);
        assert_eq!(s.keys().collect::<Vec<_>>(), vec!["c"]);
        assert_eq!(report.removed(), vec!["d"]);
        assert_eq!(
            report.exclusions,
            vec![Exclusion::MissingDependency {
                module: "d".into(),
                dependency: "x".into()
            }]
        );
    }

    #[test]
    fn test_every_missing_dependency_reported() {
        let mut s = store(vec![d("a").with_dependency("x").with_dependency("y")]);
        let report = DependencyResolver.resolve(&mut s);
        assert_eq!(report.exclusions.len(), 2);
        assert_eq!(report.removed(), vec!["a"]);
    }
}
