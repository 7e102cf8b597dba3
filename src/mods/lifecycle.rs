//! Mod lifecycle management.
//!
//! The [`LifecycleManager`] owns the installed descriptor store and the
//! loaded runtime instances. Core mods are loaded before non-core mods and
//! unloaded after them, for the global facet as well as for client and
//! network facets. Within each class, store insertion order is preserved.
//!
//! All operations run on one logical thread. Callers serialize access
//! (the host keeps the manager behind an async mutex).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::code::{CodeCache, CodeLoadError, CodeLoader, ModContext};
use super::descriptor::{DescriptorError, ModuleDescriptor};
use super::instance::{DispatchId, ModuleRuntimeInstance, SessionId};
use super::resolver::{DependencyResolver, ResolveReport};
use super::source::DescriptorSource;
use super::store::DescriptorStore;

#[derive(Error, Debug, Clone)]
pub enum LifecycleError {
    #[error("Mod {0} is not installed")]
    NotInstalled(String),

    #[error("Mod {0} is not loaded")]
    NotLoaded(String),

    #[error("Mod {0} does not support reloading")]
    NotReloadable(String),

    #[error(transparent)]
    CodeLoad(#[from] CodeLoadError),
}

/// Summary of one `load_all` run.
#[derive(Debug, Clone, Default)]
pub struct LoadAllReport {
    /// Keys of mods in the resolved installed set, in store order.
    pub installed: Vec<String>,
    /// Keys of mods loaded by this run, in load order.
    pub loaded: Vec<String>,
    /// Keys of mods whose code failed to build.
    pub failed: Vec<String>,
    pub duplicates: Vec<String>,
    pub disabled: Vec<String>,
    pub resolve: ResolveReport,
    /// Instances built under an older code epoch and dropped first.
    pub stale_dropped: usize,
}

/// Loads and unloads mods and their attachment facets.
pub struct LifecycleManager {
    module_root: PathBuf,
    source: Arc<dyn DescriptorSource>,
    loader: Arc<dyn CodeLoader>,
    code_cache: Arc<CodeCache>,
    resolver: DependencyResolver,
    installed: DescriptorStore,
    loaded: IndexMap<String, ModuleRuntimeInstance>,
}

impl LifecycleManager {
    pub fn new(
        module_root: PathBuf,
        source: Arc<dyn DescriptorSource>,
        loader: Arc<dyn CodeLoader>,
        code_cache: Arc<CodeCache>,
    ) -> Self {
        Self {
            module_root,
            source,
            loader,
            code_cache,
            resolver: DependencyResolver::new(),
            installed: DescriptorStore::new(),
            loaded: IndexMap::new(),
        }
    }

    pub fn module_root(&self) -> &Path {
        &self.module_root
    }

    /// Point the manager at a new module root. Takes effect on the next
    /// `load_all`.
    pub fn set_module_root(&mut self, root: PathBuf) {
        self.module_root = root;
    }

    pub fn code_cache(&self) -> &Arc<CodeCache> {
        &self.code_cache
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn is_installed(&self, name: &str) -> bool {
        self.installed.contains(name)
    }

    pub fn info(&self, name: &str) -> Option<&Arc<ModuleDescriptor>> {
        self.installed.get(name)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.contains_key(&name.to_lowercase())
    }

    pub fn get(&self, name: &str) -> Option<&ModuleRuntimeInstance> {
        self.loaded.get(&name.to_lowercase())
    }

    pub fn is_core_mod(&self, name: &str) -> bool {
        self.info(name).map(|d| d.is_core()).unwrap_or(false)
    }

    pub fn installed(&self) -> &DescriptorStore {
        &self.installed
    }

    pub fn loaded_names(&self) -> Vec<&str> {
        self.loaded.keys().map(String::as_str).collect()
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    // ------------------------------------------------------------------
    // Mods and global instances
    // ------------------------------------------------------------------

    /// Repopulate the installed set from the descriptor source, resolve it,
    /// and load core mods followed by non-core mods.
    pub fn load_all(&mut self) -> LoadAllReport {
        let mut report = LoadAllReport {
            stale_dropped: self.drop_stale(),
            ..LoadAllReport::default()
        };

        self.installed.clear();
        match self.source.list_installed_descriptors(&self.module_root) {
            Ok(descriptors) => {
                if descriptors.is_empty() {
                    warn!(root = %self.module_root.display(), "No mods found in mod folder");
                }
                for descriptor in descriptors {
                    let key = descriptor.key().to_string();
                    if descriptor.flags.disabled {
                        debug!(module = %key, "Skipping disabled mod");
                        report.disabled.push(key);
                    } else if self.installed.insert(descriptor) {
                        debug!(module = %key, "Mod installed");
                    } else {
                        report.duplicates.push(key);
                    }
                }
            }
            Err(DescriptorError::RootNotFound(root)) => {
                error!(root = %root, "Mod folder does not exist");
            }
            Err(e) => {
                error!(root = %self.module_root.display(), error = %e, "Error listing mods");
            }
        }

        report.resolve = self.resolver.resolve(&mut self.installed);
        report.installed = self.installed.keys().map(str::to_string).collect();

        // Instances whose mod left the resolved set must not outlive it.
        let orphaned: Vec<String> = self
            .ordered_loaded(false)
            .into_iter()
            .filter(|key| !self.installed.contains(key))
            .collect();
        for key in orphaned {
            self.teardown(&key);
        }

        for core_pass in [true, false] {
            let keys: Vec<String> = self
                .installed
                .iter()
                .filter(|d| d.is_core() == core_pass)
                .map(|d| d.key().to_string())
                .collect();
            for key in keys {
                if self.is_loaded(&key) {
                    continue;
                }
                match self.load(&key) {
                    Ok(_) => report.loaded.push(key),
                    Err(_) => report.failed.push(key),
                }
            }
        }

        info!(
            installed = report.installed.len(),
            loaded = self.loaded.len(),
            failed = report.failed.len(),
            "Mods loaded"
        );
        report
    }

    /// Unload non-core mods, then core mods.
    pub fn unload_all(&mut self) -> usize {
        let keys = self.ordered_loaded(false);
        let count = keys.len();
        for key in keys {
            self.teardown(&key);
        }
        count
    }

    /// Load one installed mod. Loading a loaded mod returns the existing
    /// instance.
    pub fn load(&mut self, name: &str) -> Result<&ModuleRuntimeInstance, LifecycleError> {
        let key = name.to_lowercase();
        if self.loaded.contains_key(&key) {
            return Ok(&self.loaded[&key]);
        }

        let descriptor = match self.installed.get(&key) {
            Some(d) => d.clone(),
            None => {
                error!(module = %name, "Cannot load mod {}: not installed", name);
                return Err(LifecycleError::NotInstalled(name.to_string()));
            }
        };

        let built = self.build_instance(&descriptor)?;
        info!(module = %key, epoch = built.epoch(), "Loaded mod {}", descriptor.printable_name());
        let instance: &ModuleRuntimeInstance = self.loaded.entry(key).or_insert(built);
        Ok(instance)
    }

    /// Unload one loaded mod, tearing down network, client, then global facets.
    pub fn unload(&mut self, name: &str) -> Result<(), LifecycleError> {
        let descriptor = match self.installed.get(name) {
            Some(d) => d.clone(),
            None => {
                error!(module = %name, "Cannot unload mod {}: not installed", name);
                return Err(LifecycleError::NotInstalled(name.to_string()));
            }
        };

        if !self.teardown(descriptor.key()) {
            error!(
                module = %descriptor.key(),
                "Cannot unload mod {}: not loaded",
                descriptor.printable_name()
            );
            return Err(LifecycleError::NotLoaded(descriptor.key().to_string()));
        }
        Ok(())
    }

    /// Replace a reloadable mod's instance with one built from fresh code.
    ///
    /// The replacement is built before the old instance is torn down, and it
    /// takes the old instance's slot in a single map write, so the mod is
    /// never observed as unloaded. Client and network facets are re-attached
    /// for the same sessions and dispatches, and re-attached client facets
    /// are installed. If the rebuild fails the old
    /// instance stays loaded.
    pub fn reload(&mut self, name: &str) -> Result<&ModuleRuntimeInstance, LifecycleError> {
        let descriptor = match self.installed.get(name) {
            Some(d) => d.clone(),
            None => {
                error!(module = %name, "Cannot reload mod {}: not installed", name);
                return Err(LifecycleError::NotInstalled(name.to_string()));
            }
        };
        let key = descriptor.key().to_string();

        if !descriptor.flags.reloadable {
            error!(module = %key, "Cannot reload mod {}: not supported", descriptor.printable_name());
            return Err(LifecycleError::NotReloadable(key));
        }
        if !self.loaded.contains_key(&key) {
            error!(module = %key, "Cannot reload mod {}: not loaded", descriptor.printable_name());
            return Err(LifecycleError::NotLoaded(key));
        }

        self.code_cache.evict(&key);
        let mut replacement = self.build_instance(&descriptor)?;

        if let Some(old) = self.loaded.get_mut(&key) {
            let sessions = old.sessions();
            let dispatches = old.dispatches();
            old.destroy();

            for session in sessions {
                match replacement.attach_client(session) {
                    Ok(true) => {
                        replacement.install_client(session);
                    }
                    Ok(false) => {}
                    Err(e) => {
                        error!(module = %key, session = session.id(), error = %e, "Client instance failed after reload");
                    }
                }
            }
            for dispatch in dispatches {
                if let Err(e) = replacement.attach_network(dispatch) {
                    error!(module = %key, dispatch = dispatch.id(), error = %e, "Network instance failed after reload");
                }
            }
        }

        info!(module = %key, "Reloaded mod {}", descriptor.printable_name());
        self.loaded.insert(key.clone(), replacement);
        Ok(&self.loaded[&key])
    }

    // ------------------------------------------------------------------
    // Client instances
    // ------------------------------------------------------------------

    /// Attach the client facet of every loaded mod, core mods first.
    pub fn load_all_client(&mut self, session: SessionId) -> usize {
        self.ordered_loaded(true)
            .into_iter()
            .filter(|key| matches!(self.load_client(key, session), Ok(true)))
            .count()
    }

    /// Detach the client facet of every loaded mod, core mods last.
    pub fn unload_all_client(&mut self, session: SessionId) -> usize {
        self.ordered_loaded(false)
            .into_iter()
            .filter(|key| matches!(self.unload_client(key, session), Ok(true)))
            .count()
    }

    /// Run the install stage of every attached client facet in loaded order.
    pub fn install_all_client(&mut self, session: SessionId) -> usize {
        self.loaded
            .values_mut()
            .map(|instance| instance.install_client(session))
            .filter(|installed| *installed)
            .count()
    }

    pub fn load_client(&mut self, name: &str, session: SessionId) -> Result<bool, LifecycleError> {
        let instance = self.loaded_mut(name)?;
        instance.attach_client(session).map_err(|e| {
            error!(module = %name, session = session.id(), error = %e, "Failed to load client instance");
            LifecycleError::from(e)
        })
    }

    pub fn unload_client(&mut self, name: &str, session: SessionId) -> Result<bool, LifecycleError> {
        Ok(self.loaded_mut(name)?.detach_client(session))
    }

    // ------------------------------------------------------------------
    // Network instances
    // ------------------------------------------------------------------

    /// Attach the network facet of every loaded mod, core mods first.
    pub fn load_all_network(&mut self, dispatch: DispatchId) -> usize {
        self.ordered_loaded(true)
            .into_iter()
            .filter(|key| matches!(self.load_network(key, dispatch), Ok(true)))
            .count()
    }

    /// Detach the network facet of every loaded mod, core mods last.
    pub fn unload_all_network(&mut self, dispatch: DispatchId) -> usize {
        self.ordered_loaded(false)
            .into_iter()
            .filter(|key| matches!(self.unload_network(key, dispatch), Ok(true)))
            .count()
    }

    pub fn load_network(&mut self, name: &str, dispatch: DispatchId) -> Result<bool, LifecycleError> {
        let instance = self.loaded_mut(name)?;
        instance.attach_network(dispatch).map_err(|e| {
            error!(module = %name, dispatch = dispatch.id(), error = %e, "Failed to load network instance");
            LifecycleError::from(e)
        })
    }

    pub fn unload_network(&mut self, name: &str, dispatch: DispatchId) -> Result<bool, LifecycleError> {
        Ok(self.loaded_mut(name)?.detach_network(dispatch))
    }

    /// Unload everything and forget the installed set.
    pub fn clear(&mut self) {
        self.unload_all();
        self.installed.clear();
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn build_instance(
        &self,
        descriptor: &Arc<ModuleDescriptor>,
    ) -> Result<ModuleRuntimeInstance, LifecycleError> {
        let module_dir = descriptor
            .source_dir
            .clone()
            .unwrap_or_else(|| self.module_root.join(descriptor.name.raw()));

        let built = self
            .code_cache
            .get_or_load(descriptor, &module_dir, self.loader.as_ref())
            .and_then(|(code, epoch)| {
                let ctx = ModContext {
                    descriptor: descriptor.clone(),
                    module_dir,
                    epoch,
                };
                ModuleRuntimeInstance::create(ctx, code)
            });

        built.map_err(|e| {
            error!(
                module = %descriptor.key(),
                error = %e,
                "Failed to load mod {}",
                descriptor.printable_name()
            );
            LifecycleError::CodeLoad(e)
        })
    }

    fn loaded_mut(&mut self, name: &str) -> Result<&mut ModuleRuntimeInstance, LifecycleError> {
        self.loaded
            .get_mut(&name.to_lowercase())
            .ok_or_else(|| LifecycleError::NotLoaded(name.to_string()))
    }

    /// Loaded keys split by class: core first when `core_first`, else last.
    fn ordered_loaded(&self, core_first: bool) -> Vec<String> {
        let (core, other): (Vec<_>, Vec<_>) = self
            .loaded
            .values()
            .partition(|instance| instance.is_core());
        let (first, second) = if core_first { (core, other) } else { (other, core) };
        first
            .into_iter()
            .chain(second)
            .map(|instance| instance.name().to_string())
            .collect()
    }

    fn teardown(&mut self, key: &str) -> bool {
        match self.loaded.shift_remove(key) {
            Some(mut instance) => {
                instance.destroy();
                info!(module = %key, "Unloaded mod {}", instance.descriptor().printable_name());
                true
            }
            None => false,
        }
    }

    /// Tear down instances built under an older code epoch.
    fn drop_stale(&mut self) -> usize {
        let epoch = self.code_cache.epoch();
        let stale: Vec<String> = self
            .ordered_loaded(false)
            .into_iter()
            .filter(|key| self.loaded.get(key).map(|i| i.epoch() != epoch).unwrap_or(false))
            .collect();
        for key in &stale {
            warn!(module = %key, "Dropping instance built under a previous resource set");
            self.teardown(key);
        }
        stale.len()
    }
}

impl Drop for LifecycleManager {
    fn drop(&mut self) {
        self.unload_all();
    }
}
