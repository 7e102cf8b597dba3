//! Module descriptor parsing and validation.
//!
//! Descriptors describe an installed mod: its name, display aliases,
//! dependency and conflict declarations, and lifecycle flags. They are
//! immutable for the duration of one load cycle and shared by reference.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name of the per-mod manifest inside its directory.
pub const MANIFEST_FILE: &str = "module.json";

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("Failed to read manifest {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid manifest JSON for {name}: {message}")]
    Parse { name: String, message: String },

    #[error("Invalid module name: {0:?}")]
    InvalidName(String),

    #[error("Module root not found: {0}")]
    RootNotFound(String),
}

/// Case-insensitive module name.
///
/// Equality and hashing use the lower-cased key; the raw spelling is kept
/// for display.
#[derive(Debug, Clone)]
pub struct ModName {
    key: String,
    raw: String,
}

impl ModName {
    pub fn new(raw: &str) -> Result<Self, DescriptorError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.contains(['/', '\\']) {
            return Err(DescriptorError::InvalidName(raw.to_string()));
        }
        Ok(Self {
            key: trimmed.to_lowercase(),
            raw: trimmed.to_string(),
        })
    }

    /// Lower-cased lookup key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Name as spelled in the manifest.
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

impl PartialEq for ModName {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ModName {}

impl std::hash::Hash for ModName {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for ModName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Lifecycle flags declared by a mod.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModuleFlags {
    pub is_core: bool,
    pub disabled: bool,
    pub reloadable: bool,
    pub auto_update_disabled: bool,
}

/// Static metadata for one installed mod.
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    pub name: ModName,
    pub cli_name: Option<String>,
    pub gui_name: Option<String>,
    /// Dependency keys, in declaration order, deduplicated.
    pub dependencies: Vec<String>,
    /// Conflict keys, deduplicated.
    pub conflicts: Vec<String>,
    pub flags: ModuleFlags,
    /// Directory the descriptor was read from, when loaded from disk.
    pub source_dir: Option<PathBuf>,
}

impl ModuleDescriptor {
    pub fn new(name: &str) -> Result<Self, DescriptorError> {
        Ok(Self {
            name: ModName::new(name)?,
            cli_name: None,
            gui_name: None,
            dependencies: Vec::new(),
            conflicts: Vec::new(),
            flags: ModuleFlags::default(),
            source_dir: None,
        })
    }

    pub fn with_dependency(mut self, name: &str) -> Self {
        push_unique(&mut self.dependencies, name);
        self
    }

    pub fn with_conflict(mut self, name: &str) -> Self {
        push_unique(&mut self.conflicts, name);
        self
    }

    pub fn with_flags(mut self, flags: ModuleFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn core(mut self) -> Self {
        self.flags.is_core = true;
        self
    }

    pub fn reloadable(mut self) -> Self {
        self.flags.reloadable = true;
        self
    }

    pub fn with_cli_name(mut self, cli_name: &str) -> Self {
        self.cli_name = Some(cli_name.to_string());
        self
    }

    /// Lookup key (lower-cased name).
    pub fn key(&self) -> &str {
        self.name.key()
    }

    pub fn is_core(&self) -> bool {
        self.flags.is_core
    }

    /// Name used in log messages: `"cli" (raw)` when a differing CLI alias
    /// exists, otherwise `"raw"`.
    pub fn printable_name(&self) -> String {
        match &self.cli_name {
            Some(cli) if !cli.eq_ignore_ascii_case(self.name.key()) => {
                format!("\"{}\" ({})", cli, self.name.raw())
            }
            _ => format!("\"{}\"", self.name.raw()),
        }
    }

    /// Name shown in listings: GUI alias, then CLI alias, then raw name.
    pub fn display_name(&self) -> &str {
        self.gui_name
            .as_deref()
            .or(self.cli_name.as_deref())
            .unwrap_or_else(|| self.name.raw())
    }

    /// Load and validate a descriptor from `<dir>/module.json`.
    pub fn from_dir(dir: &Path) -> Result<Self, DescriptorError> {
        let path = dir.join(MANIFEST_FILE);
        let content = std::fs::read_to_string(&path).map_err(|source| DescriptorError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let fallback = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut descriptor = Self::from_json(&content, &fallback)?;
        descriptor.source_dir = Some(dir.to_path_buf());
        Ok(descriptor)
    }

    /// Parse a descriptor from manifest JSON. `fallback_name` is used when the
    /// manifest omits `name` (the directory name).
    pub fn from_json(json: &str, fallback_name: &str) -> Result<Self, DescriptorError> {
        let manifest: ModuleManifest =
            serde_json::from_str(json).map_err(|e| DescriptorError::Parse {
                name: fallback_name.to_string(),
                message: e.to_string(),
            })?;
        manifest.into_descriptor(fallback_name)
    }
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    let key = name.trim().to_lowercase();
    if !key.is_empty() && !list.contains(&key) {
        list.push(key);
    }
}

/// On-disk `module.json` layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleManifest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub options: ManifestOptions,
    #[serde(default)]
    pub dependencies: DependencyList,
    #[serde(default)]
    pub conflicts: Vec<String>,
    #[serde(default)]
    pub core: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub disable_auto_update: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestOptions {
    #[serde(default)]
    pub cli_name: Option<String>,
    #[serde(default)]
    pub gui_name: Option<String>,
    #[serde(default)]
    pub reloadable: bool,
}

/// Dependencies as a plain list or a name to version-range map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyList {
    Names(Vec<String>),
    Versioned(BTreeMap<String, String>),
}

impl Default for DependencyList {
    fn default() -> Self {
        Self::Names(Vec::new())
    }
}

impl DependencyList {
    fn names(&self) -> Vec<&str> {
        match self {
            Self::Names(names) => names.iter().map(String::as_str).collect(),
            Self::Versioned(map) => map.keys().map(String::as_str).collect(),
        }
    }
}

impl ModuleManifest {
    pub fn into_descriptor(self, fallback_name: &str) -> Result<ModuleDescriptor, DescriptorError> {
        let raw = self.name.as_deref().unwrap_or(fallback_name);
        let mut descriptor = ModuleDescriptor::new(raw)?;
        for dep in self.dependencies.names() {
            push_unique(&mut descriptor.dependencies, dep);
        }
        for conflict in &self.conflicts {
            push_unique(&mut descriptor.conflicts, conflict);
        }
        descriptor.cli_name = self.options.cli_name;
        descriptor.gui_name = self.options.gui_name;
        descriptor.flags = ModuleFlags {
            is_core: self.core,
            disabled: self.disabled,
            reloadable: self.options.reloadable,
            auto_update_disabled: self.disable_auto_update,
        };
        Ok(descriptor)
    }
}
