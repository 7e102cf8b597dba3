//! Live resource-set switching.
//!
//! Orchestrates host unload, root update, search-path and cache
//! invalidation, and host reload so the active patch can change while the
//! host keeps running.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn, Instrument};

use super::catalog::{CatalogEntry, CatalogError, ModCatalog};
use super::events::ObserverList;
use super::identity::{IdentityError, PatchIdentity, ResourceLayout, ResourceRoots};
use super::search_path::CodeSearchPath;
use crate::host::{HostError, HostProcess};
use crate::mods::{CodeCache, DescriptorStore};
use crate::telemetry::{SpanExt, SwitchSpan};

/// Default remote module list location. `{version}` is replaced by the
/// identity's compact version, e.g. `10002`.
pub const DEFAULT_CATALOG_TEMPLATE: &str =
    "https://raw.githubusercontent.com/merusira/moduleLists/master/moduleList-{version}.json";

#[derive(Error, Debug, Clone)]
pub enum SwitchError {
    #[error("Patch switch already in progress ({from} -> {to})")]
    InProgress { from: String, to: String },

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("Failed to unload mods: {0}")]
    Unload(#[source] HostError),

    #[error("Failed to update resource roots: {0}")]
    Roots(#[source] HostError),

    #[error("Failed to load mods: {0}")]
    Load(#[source] HostError),
}

/// Switch state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchState {
    Stable,
    Switching { from: PatchIdentity, to: PatchIdentity },
    /// The last switch failed after it started moving the host. The current
    /// identity and roots are the failed switch's target.
    Degraded { error: String },
}

/// Record of a completed switch.
#[derive(Debug, Clone, Serialize)]
pub struct SwitchRecord {
    pub from: PatchIdentity,
    pub to: PatchIdentity,
    pub epoch: u64,
    pub evicted: usize,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum SwitchOutcome {
    /// Target already active; nothing was touched.
    Unchanged,
    Switched(SwitchRecord),
}

struct OrchestratorState {
    current: PatchIdentity,
    roots: ResourceRoots,
    phase: SwitchState,
    last_switch: Option<SwitchRecord>,
}

/// Marks the switch degraded if the switching future is dropped before it
/// settles.
struct SwitchGuard<'a> {
    state: &'a RwLock<OrchestratorState>,
    settled: bool,
}

impl Drop for SwitchGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            let mut state = self.state.write();
            if matches!(state.phase, SwitchState::Switching { .. }) {
                warn!("Patch switch interrupted before completion");
                state.phase = SwitchState::Degraded {
                    error: "switch interrupted".to_string(),
                };
            }
        }
    }
}

/// Owns the active patch identity and performs live switches.
pub struct PatchOrchestrator {
    layout: ResourceLayout,
    state: RwLock<OrchestratorState>,
    code_cache: Arc<CodeCache>,
    search_path: Arc<CodeSearchPath>,
    catalog: Arc<ModCatalog>,
    observers: ObserverList,
    catalog_template: String,
    catalog_overrides: HashMap<PatchIdentity, String>,
}

impl PatchOrchestrator {
    pub fn new(
        layout: ResourceLayout,
        initial: PatchIdentity,
        code_cache: Arc<CodeCache>,
        catalog: Arc<ModCatalog>,
    ) -> Result<Self, IdentityError> {
        let roots = layout.roots_for(&initial)?;
        let baseline_code = layout.roots_for(&layout.baseline)?.code_root;
        let search_path = Arc::new(CodeSearchPath::new([baseline_code]));
        if !layout.is_baseline(&initial) {
            search_path.prepend(&roots.code_root);
        }

        Ok(Self {
            layout,
            state: RwLock::new(OrchestratorState {
                current: initial,
                roots,
                phase: SwitchState::Stable,
                last_switch: None,
            }),
            code_cache,
            search_path,
            catalog,
            observers: ObserverList::new(),
            catalog_template: DEFAULT_CATALOG_TEMPLATE.to_string(),
            catalog_overrides: HashMap::new(),
        })
    }

    pub fn with_catalog_template(mut self, template: impl Into<String>) -> Self {
        self.catalog_template = template.into();
        self
    }

    /// Use a fixed module list URL for one identity.
    pub fn with_catalog_url(mut self, identity: PatchIdentity, url: impl Into<String>) -> Self {
        self.catalog_overrides.insert(identity, url.into());
        self
    }

    pub fn current_identity(&self) -> PatchIdentity {
        self.state.read().current.clone()
    }

    pub fn roots(&self) -> ResourceRoots {
        self.state.read().roots.clone()
    }

    pub fn state(&self) -> SwitchState {
        self.state.read().phase.clone()
    }

    pub fn is_switching(&self) -> bool {
        matches!(self.state.read().phase, SwitchState::Switching { .. })
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.state.read().phase, SwitchState::Degraded { .. })
    }

    pub fn last_switch(&self) -> Option<SwitchRecord> {
        self.state.read().last_switch.clone()
    }

    pub fn layout(&self) -> &ResourceLayout {
        &self.layout
    }

    pub fn observers(&self) -> &ObserverList {
        &self.observers
    }

    pub fn search_path(&self) -> &Arc<CodeSearchPath> {
        &self.search_path
    }

    pub fn code_cache(&self) -> &Arc<CodeCache> {
        &self.code_cache
    }

    pub fn catalog(&self) -> &Arc<ModCatalog> {
        &self.catalog
    }

    /// Remote module list URL for the active identity.
    pub fn module_list_url(&self) -> String {
        self.module_list_url_for(&self.current_identity())
    }

    pub fn module_list_url_for(&self, identity: &PatchIdentity) -> String {
        match self.catalog_overrides.get(identity) {
            Some(url) => url.clone(),
            None => identity.fill_template(&self.catalog_template),
        }
    }

    /// Catalog entries for the active identity that are not installed.
    pub async fn installable_mods(
        &self,
        installed: &DescriptorStore,
        force_refresh: bool,
    ) -> Result<Vec<CatalogEntry>, CatalogError> {
        let url = self.module_list_url();
        self.catalog.installable(&url, installed, force_refresh).await
    }

    /// Switch the active resource set to `target`.
    ///
    /// Returns `Unchanged` without touching the host or notifying observers
    /// when `target` is already active and the last switch succeeded. A
    /// switch requested while another is running is rejected with
    /// [`SwitchError::InProgress`].
    ///
    /// On failure the orchestrator stays on `target`, enters
    /// [`SwitchState::Degraded`] and notifies `on_switch_failed`. Switching
    /// to the same target again retries the whole protocol.
    pub async fn switch_patch(
        &self,
        target: PatchIdentity,
        host: Option<&dyn HostProcess>,
    ) -> Result<SwitchOutcome, SwitchError> {
        let target_roots = self.layout.roots_for(&target)?;

        let from = {
            let mut state = self.state.write();
            if let SwitchState::Switching { from, to } = &state.phase {
                warn!(from = %from, to = %to, requested = %target, "Patch switch rejected, another is in progress");
                return Err(SwitchError::InProgress {
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }
            if state.current == target && state.phase == SwitchState::Stable {
                debug!(patch = %target, "Patch already active");
                return Ok(SwitchOutcome::Unchanged);
            }
            let from = state.current.clone();
            state.phase = SwitchState::Switching {
                from: from.clone(),
                to: target.clone(),
            };
            from
        };

        let mut guard = SwitchGuard {
            state: &self.state,
            settled: false,
        };
        let span = SwitchSpan::new(from.as_str(), target.as_str());
        let started = Instant::now();

        let result = self
            .run_switch(&from, &target, &target_roots, host)
            .instrument(span.clone())
            .await;
        span.record_result(&result);

        let duration_ms = started.elapsed().as_millis() as u64;
        span.record("duration_ms", duration_ms);

        match result {
            Ok((epoch, evicted)) => {
                let record = SwitchRecord {
                    from: from.clone(),
                    to: target.clone(),
                    epoch,
                    evicted,
                    duration_ms,
                    completed_at: Utc::now(),
                };
                {
                    let mut state = self.state.write();
                    state.current = target.clone();
                    state.roots = target_roots;
                    state.phase = SwitchState::Stable;
                    state.last_switch = Some(record.clone());
                }
                guard.settled = true;
                info!(from = %from, to = %target, epoch, duration_ms, "Switched patch");
                self.observers.notify_changed(&from, &target);
                Ok(SwitchOutcome::Switched(record))
            }
            Err(e) => {
                {
                    let mut state = self.state.write();
                    state.current = target.clone();
                    state.roots = target_roots;
                    state.phase = SwitchState::Degraded {
                        error: e.to_string(),
                    };
                }
                guard.settled = true;
                error!(from = %from, to = %target, error = %e, "Error switching patch");
                self.observers.notify_failed(&from, &target, &e.to_string());
                Err(e)
            }
        }
    }

    /// Steps between the changing and changed notifications. Returns the new
    /// code epoch and the number of evicted cache entries.
    async fn run_switch(
        &self,
        from: &PatchIdentity,
        to: &PatchIdentity,
        roots: &ResourceRoots,
        host: Option<&dyn HostProcess>,
    ) -> Result<(u64, usize), SwitchError> {
        info!(from = %from, to = %to, "Switching patch");
        self.observers.notify_changing(from, to);

        if let Some(host) = host {
            host.unload_all_mods().await.map_err(SwitchError::Unload)?;
        }

        self.state.write().roots = roots.clone();
        if let Some(host) = host {
            host.set_resource_roots(roots).await.map_err(SwitchError::Roots)?;
        }

        if !self.layout.is_baseline(from) {
            if let Ok(old) = self.layout.roots_for(from) {
                self.search_path.remove(&old.code_root);
            }
        }
        if !self.layout.is_baseline(to) {
            self.search_path.prepend(&roots.code_root);
        }

        let old_set = self.layout.set_root(from)?;
        let under_old = self.code_cache.count_under(&old_set);
        let (epoch, evicted) = self.code_cache.advance_epoch();
        let catalog_dropped = self.catalog.invalidate();
        debug!(epoch, evicted, under_old, catalog_dropped, "Caches invalidated");

        if let Some(host) = host {
            host.load_all_mods().await.map_err(SwitchError::Load)?;
        }

        Ok((epoch, evicted))
    }
}
