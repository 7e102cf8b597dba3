//! Host configuration loading from environment variables.
//!
//! All configuration values are loaded from `MODHOST_*` environment variables
//! with sensible defaults. Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `MODHOST_ROOT` | `.` | Base directory holding the resource sets |
//! | `MODHOST_PATCH` | `34.04 Omni` | Patch identity active at startup |
//! | `MODHOST_BASELINE_PATCH` | `34.04 Omni` | Identity that uses the base directories as-is |
//! | `MODHOST_DATA_DIR` | `data` | Data directory name |
//! | `MODHOST_MODS_DIR` | `mods` | Mod directory name |
//! | `MODHOST_CODE_DIR` | `node_modules` | Shared code directory name |
//! | `MODHOST_CATALOG_URL` | GitHub module list | Module list URL template (`{version}`) |
//! | `MODHOST_LOG_LEVEL` | `info` | Log filter directive |
//! | `MODHOST_LOG_FORMAT` | `json` | `json` or `pretty` |
//! | `MODHOST_LOG_FILE` | unset | Log to this file instead of stderr |

use std::path::PathBuf;

use serde::Serialize;
use tracing::warn;

use crate::patch::{PatchIdentity, ResourceLayout, DEFAULT_CATALOG_TEMPLATE, DEFAULT_PATCH};
use crate::telemetry::{LogConfig, LogFormat};

/// Effective configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub root: String,
    pub patch: String,
    pub baseline_patch: String,
    pub data_dir: String,
    pub mods_dir: String,
    pub code_dir: String,
    pub catalog_url: String,
    pub log_level: String,
    pub log_format: String,
    pub log_file: Option<String>,
}

/// All host configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub root: PathBuf,
    pub patch: PatchIdentity,
    pub baseline_patch: PatchIdentity,
    pub data_dir: String,
    pub mods_dir: String,
    pub code_dir: String,
    pub catalog_url: String,
    pub log: LogConfig,
}

/// Non-empty trimmed env var, or `default`.
fn parse_string(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(val) if !val.trim().is_empty() => val.trim().to_string(),
        _ => default.to_string(),
    }
}

/// Directory name env var. Names containing path separators fall back to
/// `default`.
fn parse_dir_name(key: &str, default: &str) -> String {
    let value = parse_string(key, default);
    if value.contains(['/', '\\']) || value == ".." {
        warn!(key, value = %value, "Ignoring invalid directory name");
        return default.to_string();
    }
    value
}

fn parse_identity(key: &str) -> PatchIdentity {
    PatchIdentity::parse(&parse_string(key, DEFAULT_PATCH)).unwrap_or_default()
}

fn parse_log_format(key: &str) -> LogFormat {
    match std::env::var(key) {
        Ok(val) => val.parse().unwrap_or_default(),
        Err(_) => LogFormat::default(),
    }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    let log = LogConfig {
        format: parse_log_format("MODHOST_LOG_FORMAT"),
        level: parse_string("MODHOST_LOG_LEVEL", "info"),
        output_path: std::env::var("MODHOST_LOG_FILE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from),
    };

    EnvConfig {
        root: PathBuf::from(parse_string("MODHOST_ROOT", ".")),
        patch: parse_identity("MODHOST_PATCH"),
        baseline_patch: parse_identity("MODHOST_BASELINE_PATCH"),
        data_dir: parse_dir_name("MODHOST_DATA_DIR", "data"),
        mods_dir: parse_dir_name("MODHOST_MODS_DIR", "mods"),
        code_dir: parse_dir_name("MODHOST_CODE_DIR", "node_modules"),
        catalog_url: parse_string("MODHOST_CATALOG_URL", DEFAULT_CATALOG_TEMPLATE),
        log,
    }
}

impl EnvConfig {
    /// Resource layout described by this configuration.
    pub fn layout(&self) -> ResourceLayout {
        let mut layout = ResourceLayout::new(self.root.clone(), self.baseline_patch.clone());
        layout.data_dir = self.data_dir.clone();
        layout.mods_dir = self.mods_dir.clone();
        layout.code_dir = self.code_dir.clone();
        layout
    }

    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            root: self.root.display().to_string(),
            patch: self.patch.to_string(),
            baseline_patch: self.baseline_patch.to_string(),
            data_dir: self.data_dir.clone(),
            mods_dir: self.mods_dir.clone(),
            code_dir: self.code_dir.clone(),
            catalog_url: self.catalog_url.clone(),
            log_level: self.log.level.clone(),
            log_format: match self.log.format {
                LogFormat::Json => "json".to_string(),
                LogFormat::Pretty => "pretty".to_string(),
            },
            log_file: self
                .log
                .output_path
                .as_ref()
                .map(|p| p.display().to_string()),
        }
    }
}

// Held by every test that reads or mutates the process environment.
#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
