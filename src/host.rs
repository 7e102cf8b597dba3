//! Host process collaborator.
//!
//! [`HostProcess`] is the surface the patch orchestrator drives during a
//! switch. [`ModHost`] is the in-process implementation: it owns the
//! lifecycle manager and tracks the client sessions and network dispatches
//! currently attached, so every facet can be detached before the resource
//! roots move and re-attached afterwards.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::mods::{DispatchId, LifecycleManager, LoadAllReport, SessionId};
use crate::patch::ResourceRoots;

#[derive(Error, Debug, Clone)]
pub enum HostError {
    #[error("Mod folder does not exist: {0}")]
    ModuleRootMissing(String),

    #[error("Host rejected operation: {0}")]
    Rejected(String),
}

/// Operations the orchestrator needs from a live host.
#[async_trait]
pub trait HostProcess: Send + Sync {
    /// Detach every facet and unload every mod.
    async fn unload_all_mods(&self) -> Result<(), HostError>;

    /// Point the host at a new data and module root.
    async fn set_resource_roots(&self, roots: &ResourceRoots) -> Result<(), HostError>;

    /// Load every mod under the current module root and re-attach facets.
    async fn load_all_mods(&self) -> Result<(), HostError>;
}

/// Point-in-time view of the host.
#[derive(Debug, Clone)]
pub struct HostSnapshot {
    pub roots: ResourceRoots,
    pub installed: usize,
    pub loaded: usize,
    pub sessions: usize,
    pub dispatches: usize,
    /// Mods whose code failed to build in the last load.
    pub failed: usize,
    /// Mods excluded by dependency resolution in the last load.
    pub excluded: usize,
}

struct HostState {
    manager: LifecycleManager,
    roots: ResourceRoots,
    sessions: Vec<SessionId>,
    dispatches: Vec<DispatchId>,
    last_report: Option<LoadAllReport>,
}

impl HostState {
    fn detach_everything(&mut self) {
        for dispatch in self.dispatches.iter().rev() {
            self.manager.unload_all_network(*dispatch);
        }
        for session in self.sessions.iter().rev() {
            self.manager.unload_all_client(*session);
        }
    }

    fn attach_everything(&mut self) {
        for session in &self.sessions {
            self.manager.load_all_client(*session);
            self.manager.install_all_client(*session);
        }
        for dispatch in &self.dispatches {
            self.manager.load_all_network(*dispatch);
        }
    }
}

/// Host owning a [`LifecycleManager`]. All mutation is serialized through
/// one async mutex.
pub struct ModHost {
    state: Mutex<HostState>,
}

impl ModHost {
    pub fn new(mut manager: LifecycleManager, roots: ResourceRoots) -> Self {
        manager.set_module_root(roots.module_root.clone());
        Self {
            state: Mutex::new(HostState {
                manager,
                roots,
                sessions: Vec::new(),
                dispatches: Vec::new(),
                last_report: None,
            }),
        }
    }

    /// Load all mods and attach facets for tracked sessions and dispatches.
    pub async fn load_mods(&self) -> LoadAllReport {
        let mut state = self.state.lock().await;
        let report = state.manager.load_all();
        state.attach_everything();
        state.last_report = Some(report.clone());
        report
    }

    /// Track a client session and attach every loaded mod's client facet.
    pub async fn attach_session(&self, session: SessionId) -> usize {
        let mut state = self.state.lock().await;
        if state.sessions.contains(&session) {
            return 0;
        }
        state.sessions.push(session);
        let attached = state.manager.load_all_client(session);
        state.manager.install_all_client(session);
        attached
    }

    pub async fn detach_session(&self, session: SessionId) -> usize {
        let mut state = self.state.lock().await;
        let Some(index) = state.sessions.iter().position(|s| *s == session) else {
            return 0;
        };
        state.sessions.remove(index);
        state.manager.unload_all_client(session)
    }

    /// Track a network dispatch and attach every loaded mod's network facet.
    pub async fn attach_dispatch(&self, dispatch: DispatchId) -> usize {
        let mut state = self.state.lock().await;
        if state.dispatches.contains(&dispatch) {
            return 0;
        }
        state.dispatches.push(dispatch);
        state.manager.load_all_network(dispatch)
    }

    pub async fn detach_dispatch(&self, dispatch: DispatchId) -> usize {
        let mut state = self.state.lock().await;
        let Some(index) = state.dispatches.iter().position(|d| *d == dispatch) else {
            return 0;
        };
        state.dispatches.remove(index);
        state.manager.unload_all_network(dispatch)
    }

    /// Run `f` with exclusive access to the lifecycle manager.
    pub async fn with_manager<R>(&self, f: impl FnOnce(&mut LifecycleManager) -> R) -> R {
        let mut state = self.state.lock().await;
        f(&mut state.manager)
    }

    pub async fn roots(&self) -> ResourceRoots {
        self.state.lock().await.roots.clone()
    }

    pub async fn last_report(&self) -> Option<LoadAllReport> {
        self.state.lock().await.last_report.clone()
    }

    pub async fn snapshot(&self) -> HostSnapshot {
        let state = self.state.lock().await;
        HostSnapshot {
            roots: state.roots.clone(),
            installed: state.manager.installed().len(),
            loaded: state.manager.loaded_count(),
            sessions: state.sessions.len(),
            dispatches: state.dispatches.len(),
            failed: state.last_report.as_ref().map_or(0, |r| r.failed.len()),
            excluded: state
                .last_report
                .as_ref()
                .map_or(0, |r| r.resolve.removed().len()),
        }
    }

    /// Detach every facet, unload every mod and forget tracked attachments.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        state.detach_everything();
        state.sessions.clear();
        state.dispatches.clear();
        state.manager.clear();
        info!("Mod host shut down");
    }
}

#[async_trait]
impl HostProcess for ModHost {
    async fn unload_all_mods(&self) -> Result<(), HostError> {
        let mut state = self.state.lock().await;
        state.detach_everything();
        let unloaded = state.manager.unload_all();
        info!(unloaded, "All mods unloaded");
        Ok(())
    }

    async fn set_resource_roots(&self, roots: &ResourceRoots) -> Result<(), HostError> {
        let mut state = self.state.lock().await;
        state.manager.set_module_root(roots.module_root.clone());
        state.roots = roots.clone();
        info!(
            data_root = %roots.data_root.display(),
            module_root = %roots.module_root.display(),
            "Resource roots updated"
        );
        Ok(())
    }

    async fn load_all_mods(&self) -> Result<(), HostError> {
        let mut state = self.state.lock().await;
        let report = state.manager.load_all();
        state.attach_everything();
        state.last_report = Some(report);

        let module_root = state.manager.module_root();
        if !module_root.is_dir() {
            warn!(root = %module_root.display(), "Loaded with a missing mod folder");
            return Err(HostError::ModuleRootMissing(module_root.display().to_string()));
        }
        Ok(())
    }
}
