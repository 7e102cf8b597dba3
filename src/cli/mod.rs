//! CLI subcommands for the mod host.
//!
//! Every command reads configuration from `MODHOST_*` environment variables
//! and inspects the resource sets on disk; none needs a running host.
//!
//! ## Usage
//!
//! ```bash
//! modhost-cli mods [PATCH]     # Resolved mod set for a patch
//! modhost-cli paths [PATCH]    # Derived resource roots
//! modhost-cli health [PATCH]   # Dry-run load and health report
//! modhost-cli config show      # Effective configuration
//! ```

pub mod config_cmd;
pub mod health_cmd;
pub mod mods_cmd;
pub mod paths_cmd;

use crate::config::EnvConfig;
use crate::patch::{IdentityError, PatchIdentity};

/// Exit code for invalid configuration or arguments.
pub const EXIT_CONFIG_ERROR: i32 = 2;

/// Identity named on the command line, or the configured one.
pub fn select_patch(arg: Option<&str>, cfg: &EnvConfig) -> Result<PatchIdentity, IdentityError> {
    match arg {
        Some(raw) => PatchIdentity::parse(raw),
        None => Ok(cfg.patch.clone()),
    }
}
