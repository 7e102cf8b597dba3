//! Mod host core.
//!
//! Manages a set of dynamically loaded mods attached to a long-running host
//! process and switches the active resource set ("patch") while the host
//! keeps running.
//!
//! # Components
//!
//! - [`mods`]: descriptors, dependency resolution, code construction and the
//!   lifecycle of loaded mods across their global, client and network facets
//! - [`patch`]: resource-set identities, root derivation and the live switch
//!   protocol
//! - [`host`]: the host collaborator driven by a switch
//!
//! # Ordering
//!
//! Core mods load before and unload after every other mod, for every facet.
//! Within each class the installed-set insertion order is preserved.

pub mod cli;
pub mod config;
pub mod health;
pub mod host;
pub mod mods;
pub mod patch;
pub mod telemetry;

use std::sync::Arc;

use health::{HealthChecker, HealthConfig, HealthReport};
use host::{HostProcess, ModHost};
use mods::{CodeCache, CodeLoader, FsDescriptorSource, LifecycleManager, LoadAllReport};
use patch::{
    CatalogSource, IdentityError, ModCatalog, PatchIdentity, PatchOrchestrator, ResourceLayout,
    SwitchError, SwitchOutcome, DEFAULT_CATALOG_TEMPLATE,
};

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub layout: ResourceLayout,
    pub initial_patch: PatchIdentity,
    pub catalog_template: String,
    pub health: HealthConfig,
}

impl RuntimeConfig {
    pub fn from_env(env: &config::EnvConfig) -> Self {
        Self {
            layout: env.layout(),
            initial_patch: env.patch.clone(),
            catalog_template: env.catalog_url.clone(),
            health: HealthConfig::default(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            layout: ResourceLayout::new(".", PatchIdentity::default()),
            initial_patch: PatchIdentity::default(),
            catalog_template: DEFAULT_CATALOG_TEMPLATE.to_string(),
            health: HealthConfig::default(),
        }
    }
}

/// The mod host runtime: one host and the orchestrator that switches it.
pub struct Runtime {
    pub host: Arc<ModHost>,
    pub orchestrator: Arc<PatchOrchestrator>,
    pub health: HealthChecker,
}

impl Runtime {
    /// Create a runtime reading descriptors from disk and building mod code
    /// with `loader`.
    pub fn new(
        config: RuntimeConfig,
        loader: Arc<dyn CodeLoader>,
        catalog_source: Arc<dyn CatalogSource>,
    ) -> Result<Self, IdentityError> {
        let code_cache = Arc::new(CodeCache::new());
        let catalog = Arc::new(ModCatalog::new(catalog_source));
        let orchestrator = PatchOrchestrator::new(
            config.layout,
            config.initial_patch,
            code_cache.clone(),
            catalog,
        )?
        .with_catalog_template(config.catalog_template);

        let roots = orchestrator.roots();
        let manager = LifecycleManager::new(
            roots.module_root.clone(),
            Arc::new(FsDescriptorSource::new()),
            loader,
            code_cache,
        );

        Ok(Self {
            host: Arc::new(ModHost::new(manager, roots)),
            orchestrator: Arc::new(orchestrator),
            health: HealthChecker::new(config.health),
        })
    }

    /// Load every mod of the active resource set.
    pub async fn start(&self) -> LoadAllReport {
        self.host.load_mods().await
    }

    /// Switch the live host to `target`.
    pub async fn switch_patch(&self, target: PatchIdentity) -> Result<SwitchOutcome, SwitchError> {
        let host: &dyn HostProcess = self.host.as_ref();
        self.orchestrator.switch_patch(target, Some(host)).await
    }

    pub async fn health(&self) -> HealthReport {
        let snapshot = self.host.snapshot().await;
        self.health.report(
            &self.orchestrator.current_identity(),
            &self.orchestrator.state(),
            &snapshot,
        )
    }

    pub async fn shutdown(&self) {
        self.host.shutdown().await;
    }
}
