//! Mod code construction and the epoch-versioned code cache.
//!
//! A mod's behaviour is provided by a [`ModCode`] built by a [`CodeLoader`].
//! Built code is cached per mod and tagged with the epoch it was built under.
//! Advancing the epoch (on every resource-set switch) drops all entries
//! built under an older epoch so the next load rebuilds them from the new
//! roots.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

use super::descriptor::ModuleDescriptor;
use super::instance::{DispatchId, SessionId};

#[derive(Error, Debug, Clone)]
pub enum CodeLoadError {
    #[error("No code registered for mod {0}")]
    NotFound(String),

    #[error("Failed to build mod {name}: {message}")]
    Build { name: String, message: String },

    #[error("Failed to create {facet} instance of {name}: {message}")]
    Facet {
        name: String,
        facet: &'static str,
        message: String,
    },
}

/// Context handed to facet constructors.
#[derive(Debug, Clone)]
pub struct ModContext {
    pub descriptor: Arc<ModuleDescriptor>,
    pub module_dir: PathBuf,
    pub epoch: u64,
}

/// One attached sub-instance of a loaded mod.
pub trait Facet: Send {
    /// Second-stage setup run after all client facets of a session are attached.
    fn install(&mut self) {}

    /// Called before the facet is dropped.
    fn destroy(&mut self) {}
}

/// Built code of one mod. Each constructor returns `Ok(None)` when the mod has
/// no such facet.
pub trait ModCode: Send + Sync {
    fn create_global(&self, ctx: &ModContext) -> Result<Option<Box<dyn Facet>>, String>;

    fn create_client(
        &self,
        _ctx: &ModContext,
        _session: SessionId,
    ) -> Result<Option<Box<dyn Facet>>, String> {
        Ok(None)
    }

    fn create_network(
        &self,
        _ctx: &ModContext,
        _dispatch: DispatchId,
    ) -> Result<Option<Box<dyn Facet>>, String> {
        Ok(None)
    }
}

/// Builds mod code from its descriptor and directory.
pub trait CodeLoader: Send + Sync {
    fn load(
        &self,
        descriptor: &ModuleDescriptor,
        module_dir: &Path,
    ) -> Result<Arc<dyn ModCode>, CodeLoadError>;
}

pub type ModFactory =
    Arc<dyn Fn(&ModuleDescriptor, &Path) -> Result<Arc<dyn ModCode>, String> + Send + Sync>;

/// Loader backed by factories registered in-process, keyed by mod name.
#[derive(Default)]
pub struct BuiltinCodeLoader {
    factories: RwLock<HashMap<String, ModFactory>>,
}

impl BuiltinCodeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, name: &str, factory: F)
    where
        F: Fn(&ModuleDescriptor, &Path) -> Result<Arc<dyn ModCode>, String> + Send + Sync + 'static,
    {
        self.factories
            .write()
            .insert(name.to_lowercase(), Arc::new(factory));
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.factories.write().remove(&name.to_lowercase()).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.read().contains_key(&name.to_lowercase())
    }
}

impl CodeLoader for BuiltinCodeLoader {
    fn load(
        &self,
        descriptor: &ModuleDescriptor,
        module_dir: &Path,
    ) -> Result<Arc<dyn ModCode>, CodeLoadError> {
        let factory = self
            .factories
            .read()
            .get(descriptor.key())
            .cloned()
            .ok_or_else(|| CodeLoadError::NotFound(descriptor.key().to_string()))?;

        factory(descriptor, module_dir).map_err(|message| CodeLoadError::Build {
            name: descriptor.key().to_string(),
            message,
        })
    }
}

/// Loader that builds facet-less code for every mod whose directory exists.
/// Used for dry runs where no mod code is linked into the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct InertCodeLoader;

struct InertCode;

impl ModCode for InertCode {
    fn create_global(&self, _ctx: &ModContext) -> Result<Option<Box<dyn Facet>>, String> {
        Ok(None)
    }
}

impl CodeLoader for InertCodeLoader {
    fn load(
        &self,
        descriptor: &ModuleDescriptor,
        module_dir: &Path,
    ) -> Result<Arc<dyn ModCode>, CodeLoadError> {
        if !module_dir.is_dir() {
            return Err(CodeLoadError::Build {
                name: descriptor.key().to_string(),
                message: format!("module directory {} not found", module_dir.display()),
            });
        }
        Ok(Arc::new(InertCode))
    }
}

struct CachedCode {
    epoch: u64,
    origin: PathBuf,
    code: Arc<dyn ModCode>,
}

/// Shared cache of built mod code, versioned by epoch.
pub struct CodeCache {
    epoch: AtomicU64,
    entries: RwLock<HashMap<String, CachedCode>>,
}

impl CodeCache {
    pub fn new() -> Self {
        Self {
            epoch: AtomicU64::new(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Current epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Return cached code built under the current epoch, or build it with
    /// `loader` and cache the result. Failures are not cached.
    pub fn get_or_load(
        &self,
        descriptor: &ModuleDescriptor,
        module_dir: &Path,
        loader: &dyn CodeLoader,
    ) -> Result<(Arc<dyn ModCode>, u64), CodeLoadError> {
        let epoch = self.epoch();
        if let Some(cached) = self.entries.read().get(descriptor.key()) {
            if cached.epoch == epoch && cached.origin == module_dir {
                return Ok((cached.code.clone(), epoch));
            }
        }

        let code = loader.load(descriptor, module_dir)?;
        self.entries.write().insert(
            descriptor.key().to_string(),
            CachedCode {
                epoch,
                origin: module_dir.to_path_buf(),
                code: code.clone(),
            },
        );
        Ok((code, epoch))
    }

    /// Drop the cached code of one mod so the next load rebuilds it.
    pub fn evict(&self, name: &str) -> bool {
        self.entries.write().remove(&name.to_lowercase()).is_some()
    }

    /// Start a new epoch and drop every entry built under an older one.
    /// Returns the new epoch and the number of evicted entries.
    pub fn advance_epoch(&self) -> (u64, usize) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, cached| cached.epoch == epoch);
        let evicted = before - entries.len();
        debug!(epoch, evicted, "Code cache epoch advanced");
        (epoch, evicted)
    }

    /// Number of cached entries whose origin lies under `root`.
    pub fn count_under(&self, root: &Path) -> usize {
        self.entries
            .read()
            .values()
            .filter(|cached| cached.origin.starts_with(root))
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for CodeCache {
    fn default() -> Self {
        Self::new()
    }
}
