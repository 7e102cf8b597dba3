//! Mod management for the mod host.
//!
//! Handles descriptor loading, dependency resolution, code construction and
//! the lifecycle of loaded mods across their global, client and network facets.

pub mod descriptor;

mod code;
mod instance;
mod lifecycle;
mod resolver;
mod source;
mod store;

pub use code::{
    BuiltinCodeLoader, CodeCache, CodeLoadError, CodeLoader, Facet, InertCodeLoader, ModCode,
    ModContext, ModFactory,
};
pub use descriptor::{
    DescriptorError, ModName, ModuleDescriptor, ModuleFlags, ModuleManifest, MANIFEST_FILE,
};
pub use instance::{DispatchId, ModuleRuntimeInstance, SessionId};
pub use lifecycle::{LifecycleError, LifecycleManager, LoadAllReport};
pub use resolver::{DependencyResolver, Exclusion, ResolveReport};
pub use source::{DescriptorSource, FsDescriptorSource};
pub use store::DescriptorStore;
