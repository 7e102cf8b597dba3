//! Resource-set identities and live patch switching.
//!
//! Maps a patch identity to its resource roots and swaps the active set
//! while the host keeps running.

pub mod identity;

mod catalog;
mod events;
mod orchestrator;
mod search_path;

pub use catalog::{CatalogEntry, CatalogError, CatalogSource, FileCatalogSource, ModCatalog};
pub use events::{ObserverId, ObserverList, PatchObserver};
pub use identity::{
    namespaced_root, IdentityError, PatchIdentity, ResourceLayout, ResourceRoots, DEFAULT_PATCH,
};
pub use orchestrator::{
    PatchOrchestrator, SwitchError, SwitchOutcome, SwitchRecord, SwitchState,
    DEFAULT_CATALOG_TEMPLATE,
};
pub use search_path::CodeSearchPath;
