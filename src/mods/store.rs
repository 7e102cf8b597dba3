//! Descriptor store: the installed-mod set for one load cycle.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::error;

use super::descriptor::ModuleDescriptor;

/// Insertion-ordered map of installed descriptors keyed by lower-cased name.
///
/// Iteration order is the order in which descriptors were inserted; the
/// lifecycle manager relies on it for load and unload ordering.
#[derive(Debug, Default, Clone)]
pub struct DescriptorStore {
    entries: IndexMap<String, Arc<ModuleDescriptor>>,
}

impl DescriptorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a descriptor. Duplicates are rejected, never merged.
    pub fn insert(&mut self, descriptor: ModuleDescriptor) -> bool {
        let key = descriptor.key().to_string();
        if self.entries.contains_key(&key) {
            error!(
                module = %descriptor.name,
                "Duplicate mod {} ignored, a mod with that name is already installed",
                descriptor.printable_name()
            );
            return false;
        }
        self.entries.insert(key, Arc::new(descriptor));
        true
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ModuleDescriptor>> {
        self.entries.get(&name.to_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_lowercase())
    }

    /// Remove a descriptor, preserving the order of the remaining entries.
    pub fn remove(&mut self, name: &str) -> Option<Arc<ModuleDescriptor>> {
        self.entries.shift_remove(&name.to_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ModuleDescriptor>> {
        self.entries.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl FromIterator<ModuleDescriptor> for DescriptorStore {
    fn from_iter<I: IntoIterator<Item = ModuleDescriptor>>(iter: I) -> Self {
        let mut store = Self::new();
        for descriptor in iter {
            store.insert(descriptor);
        }
        store
    }
}
