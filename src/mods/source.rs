//! Descriptor sources.
//!
//! The lifecycle manager repopulates its store from a [`DescriptorSource`]
//! on every `load_all`. The filesystem source reads one sub-directory per mod.

use std::path::Path;

use tracing::{error, warn};

use super::descriptor::{DescriptorError, ModuleDescriptor, MANIFEST_FILE};

/// Supplies installed-mod metadata for a module root.
pub trait DescriptorSource: Send + Sync {
    /// Names of mods installed under `root`, in listing order.
    fn list_installed(&self, root: &Path) -> Result<Vec<String>, DescriptorError>;

    /// Load the descriptor of one installed mod.
    fn load_descriptor(&self, root: &Path, name: &str) -> Result<ModuleDescriptor, DescriptorError>;

    /// List and load every descriptor; entries that fail to load are logged
    /// and skipped.
    fn list_installed_descriptors(
        &self,
        root: &Path,
    ) -> Result<Vec<ModuleDescriptor>, DescriptorError> {
        let names = self.list_installed(root)?;
        let mut descriptors = Vec::with_capacity(names.len());
        for name in names {
            match self.load_descriptor(root, &name) {
                Ok(d) => descriptors.push(d),
                Err(e) => error!(module = %name, error = %e, "Failed to load mod info"),
            }
        }
        Ok(descriptors)
    }
}

/// Reads `<root>/<name>/module.json` for every sub-directory of the root.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsDescriptorSource;

impl FsDescriptorSource {
    pub fn new() -> Self {
        Self
    }
}

impl DescriptorSource for FsDescriptorSource {
    fn list_installed(&self, root: &Path) -> Result<Vec<String>, DescriptorError> {
        if !root.is_dir() {
            return Err(DescriptorError::RootNotFound(root.display().to_string()));
        }

        let entries = std::fs::read_dir(root).map_err(|source| DescriptorError::Read {
            path: root.display().to_string(),
            source,
        })?;

        let mut names = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !path.is_dir() {
                continue;
            }
            if !path.join(MANIFEST_FILE).is_file() {
                warn!(module = %name, "Skipping mod directory without {}", MANIFEST_FILE);
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    fn load_descriptor(&self, root: &Path, name: &str) -> Result<ModuleDescriptor, DescriptorError> {
        ModuleDescriptor::from_dir(&root.join(name))
    }
}
