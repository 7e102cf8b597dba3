//! Resource-set identities and resource-root derivation.
//!
//! The baseline identity uses the configured root directories as-is. Every
//! other identity maps to a `patchN` sub-directory of the base, where `N` is
//! the identity's leading version number (`"100.02 Starscape"` → `patch100`).
//!
//! Derivation is a pure function of the base path and the identity. A
//! trailing component equal to the namespace being applied is stripped
//! first, so deriving from an already namespaced base yields the same path
//! instead of `patchN/patchN`. The baseline keeps the base as-is, even when
//! the base directory itself is named like a namespace.

use std::ffi::OsStr;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

const NAMESPACE_PREFIX: &str = "patch";

/// Identity used when none is configured.
pub const DEFAULT_PATCH: &str = "34.04 Omni";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Patch identity must not be empty")]
    Empty,

    #[error("Patch identity {0:?} has no leading version number")]
    NoVersionNumber(String),
}

/// Opaque version tag selecting a resource set, e.g. `"34.04 Omni"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PatchIdentity {
    raw: String,
}

impl PatchIdentity {
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(IdentityError::Empty);
        }
        Ok(Self {
            raw: trimmed.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Leading version token, e.g. `"100.02"`.
    pub fn version(&self) -> &str {
        self.raw.split_whitespace().next().unwrap_or_default()
    }

    /// Major version number taken from the leading token.
    pub fn major(&self) -> Option<u32> {
        self.version().split('.').next()?.parse().ok()
    }

    /// Version token with separators removed, e.g. `"10002"`. Used to key the
    /// remote module list.
    pub fn compact_version(&self) -> String {
        self.version().chars().filter(char::is_ascii_digit).collect()
    }

    /// Replace `{version}` in `template` with the compact version.
    pub fn fill_template(&self, template: &str) -> String {
        template.replace("{version}", &self.compact_version())
    }
}

impl fmt::Display for PatchIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Default for PatchIdentity {
    fn default() -> Self {
        Self {
            raw: DEFAULT_PATCH.to_string(),
        }
    }
}

impl std::str::FromStr for PatchIdentity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Concrete directories backing one resource set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceRoots {
    pub data_root: PathBuf,
    pub module_root: PathBuf,
    pub code_root: PathBuf,
}

/// Base directory plus the per-set directory names.
#[derive(Debug, Clone)]
pub struct ResourceLayout {
    pub base: PathBuf,
    pub baseline: PatchIdentity,
    pub data_dir: String,
    pub mods_dir: String,
    pub code_dir: String,
}

impl ResourceLayout {
    pub fn new(base: impl Into<PathBuf>, baseline: PatchIdentity) -> Self {
        Self {
            base: base.into(),
            baseline,
            data_dir: "data".to_string(),
            mods_dir: "mods".to_string(),
            code_dir: "node_modules".to_string(),
        }
    }

    pub fn is_baseline(&self, identity: &PatchIdentity) -> bool {
        *identity == self.baseline
    }

    /// Namespace directory for `identity`; `None` for the baseline.
    pub fn namespace(&self, identity: &PatchIdentity) -> Result<Option<String>, IdentityError> {
        if self.is_baseline(identity) {
            return Ok(None);
        }
        identity
            .major()
            .map(|n| Some(format!("{}{}", NAMESPACE_PREFIX, n)))
            .ok_or_else(|| IdentityError::NoVersionNumber(identity.to_string()))
    }

    /// Root directory of the resource set for `identity`.
    pub fn set_root(&self, identity: &PatchIdentity) -> Result<PathBuf, IdentityError> {
        let namespace = self.namespace(identity)?;
        Ok(namespaced_root(&self.base, namespace.as_deref()))
    }

    pub fn roots_for(&self, identity: &PatchIdentity) -> Result<ResourceRoots, IdentityError> {
        let root = self.set_root(identity)?;
        Ok(ResourceRoots {
            data_root: root.join(&self.data_dir),
            module_root: root.join(&self.mods_dir),
            code_root: root.join(&self.code_dir),
        })
    }
}

/// True for `patch` followed by one or more ASCII digits.
pub fn is_namespace_component(name: &OsStr) -> bool {
    name.to_str()
        .and_then(|s| s.strip_prefix(NAMESPACE_PREFIX))
        .map(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}

/// Apply `namespace` to `base`.
///
/// Adjacent repeated namespace components are collapsed and trailing
/// components equal to `namespace` are stripped from `base` first, so
/// `namespaced_root(namespaced_root(b, ns), ns) == namespaced_root(b, ns)`.
/// With no namespace nothing is stripped.
pub fn namespaced_root(base: &Path, namespace: Option<&str>) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in base.components() {
        if let Component::Normal(name) = component {
            let repeated = matches!(parts.last(), Some(Component::Normal(prev)) if *prev == name);
            if repeated && is_namespace_component(name) {
                continue;
            }
        }
        if component != Component::CurDir || parts.is_empty() {
            parts.push(component);
        }
    }
    let Some(namespace) = namespace else {
        return parts.iter().collect();
    };
    while let Some(Component::Normal(name)) = parts.last() {
        if *name != OsStr::new(namespace) {
            break;
        }
        parts.pop();
    }

    let mut root: PathBuf = parts.iter().collect();
    root.push(namespace);
    root
}
