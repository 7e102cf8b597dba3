//! Runtime instances of loaded mods and their attachment facets.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, warn};

use super::code::{CodeLoadError, Facet, ModCode, ModContext};
use super::descriptor::ModuleDescriptor;

/// Opaque identity of a client session. Never inspected by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Opaque identity of a network dispatch. Never inspected by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DispatchId(u64);

impl DispatchId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// A loaded mod: one global sub-instance plus per-session and per-dispatch
/// sub-instances, all exclusively owned.
pub struct ModuleRuntimeInstance {
    ctx: ModContext,
    code: Arc<dyn ModCode>,
    global: Option<Box<dyn Facet>>,
    clients: IndexMap<SessionId, Box<dyn Facet>>,
    networks: IndexMap<DispatchId, Box<dyn Facet>>,
}

impl ModuleRuntimeInstance {
    /// Build the instance and its global facet. Nothing is retained on failure.
    pub fn create(ctx: ModContext, code: Arc<dyn ModCode>) -> Result<Self, CodeLoadError> {
        let global = code
            .create_global(&ctx)
            .map_err(|message| CodeLoadError::Facet {
                name: ctx.descriptor.key().to_string(),
                facet: "global",
                message,
            })?;

        Ok(Self {
            ctx,
            code,
            global,
            clients: IndexMap::new(),
            networks: IndexMap::new(),
        })
    }

    pub fn descriptor(&self) -> &Arc<ModuleDescriptor> {
        &self.ctx.descriptor
    }

    pub fn name(&self) -> &str {
        self.ctx.descriptor.key()
    }

    pub fn is_core(&self) -> bool {
        self.ctx.descriptor.is_core()
    }

    /// Epoch the backing code was built under.
    pub fn epoch(&self) -> u64 {
        self.ctx.epoch
    }

    pub fn has_global(&self) -> bool {
        self.global.is_some()
    }

    pub fn has_client(&self, session: SessionId) -> bool {
        self.clients.contains_key(&session)
    }

    pub fn has_network(&self, dispatch: DispatchId) -> bool {
        self.networks.contains_key(&dispatch)
    }

    pub fn sessions(&self) -> Vec<SessionId> {
        self.clients.keys().copied().collect()
    }

    pub fn dispatches(&self) -> Vec<DispatchId> {
        self.networks.keys().copied().collect()
    }

    /// Attach the client facet for `session`. Returns `Ok(false)` when already
    /// attached or when the mod has no client facet.
    pub fn attach_client(&mut self, session: SessionId) -> Result<bool, CodeLoadError> {
        if self.clients.contains_key(&session) {
            return Ok(false);
        }
        match self.code.create_client(&self.ctx, session) {
            Ok(Some(facet)) => {
                self.clients.insert(session, facet);
                debug!(module = %self.name(), session = session.id(), "Client instance loaded");
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(message) => Err(CodeLoadError::Facet {
                name: self.name().to_string(),
                facet: "client",
                message,
            }),
        }
    }

    pub fn detach_client(&mut self, session: SessionId) -> bool {
        match self.clients.shift_remove(&session) {
            Some(mut facet) => {
                facet.destroy();
                debug!(module = %self.name(), session = session.id(), "Client instance unloaded");
                true
            }
            None => false,
        }
    }

    /// Run the install stage of the client facet for `session`, if attached.
    pub fn install_client(&mut self, session: SessionId) -> bool {
        match self.clients.get_mut(&session) {
            Some(facet) => {
                facet.install();
                true
            }
            None => false,
        }
    }

    pub fn attach_network(&mut self, dispatch: DispatchId) -> Result<bool, CodeLoadError> {
        if self.networks.contains_key(&dispatch) {
            return Ok(false);
        }
        match self.code.create_network(&self.ctx, dispatch) {
            Ok(Some(facet)) => {
                self.networks.insert(dispatch, facet);
                debug!(module = %self.name(), dispatch = dispatch.id(), "Network instance loaded");
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(message) => Err(CodeLoadError::Facet {
                name: self.name().to_string(),
                facet: "network",
                message,
            }),
        }
    }

    pub fn detach_network(&mut self, dispatch: DispatchId) -> bool {
        match self.networks.shift_remove(&dispatch) {
            Some(mut facet) => {
                facet.destroy();
                debug!(module = %self.name(), dispatch = dispatch.id(), "Network instance unloaded");
                true
            }
            None => false,
        }
    }

    /// Tear down every facet: network, then client, then global.
    pub fn destroy(&mut self) {
        for (_, mut facet) in self.networks.drain(..).rev() {
            facet.destroy();
        }
        for (_, mut facet) in self.clients.drain(..).rev() {
            facet.destroy();
        }
        if let Some(mut global) = self.global.take() {
            global.destroy();
        }
    }
}

impl Drop for ModuleRuntimeInstance {
    fn drop(&mut self) {
        if self.global.is_some() || !self.clients.is_empty() || !self.networks.is_empty() {
            warn!(module = %self.name(), "Runtime instance dropped with attached facets");
            self.destroy();
        }
    }
}

impl std::fmt::Debug for ModuleRuntimeInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRuntimeInstance")
            .field("name", &self.name())
            .field("epoch", &self.ctx.epoch)
            .field("global", &self.global.is_some())
            .field("clients", &self.clients.len())
            .field("networks", &self.networks.len())
            .finish()
    }
}
