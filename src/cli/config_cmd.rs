//! Config CLI subcommands: show, defaults, validate.
//!
//! These commands read configuration directly from environment variables
//! without starting a host.

use crate::config::{self, EffectiveConfig};
use crate::patch::{DEFAULT_CATALOG_TEMPLATE, DEFAULT_PATCH};

/// Print effective config as key-value pairs to stdout.
pub fn run_show() {
    let cfg = config::load().effective_config();
    print_config(&cfg);
}

/// Print default config values (no env overrides) to stdout.
pub fn run_defaults() {
    println!("MODHOST_ROOT=.");
    println!("MODHOST_PATCH={}", DEFAULT_PATCH);
    println!("MODHOST_BASELINE_PATCH={}", DEFAULT_PATCH);
    println!("MODHOST_DATA_DIR=data");
    println!("MODHOST_MODS_DIR=mods");
    println!("MODHOST_CODE_DIR=node_modules");
    println!("MODHOST_CATALOG_URL={}", DEFAULT_CATALOG_TEMPLATE);
    println!("MODHOST_LOG_LEVEL=info");
    println!("MODHOST_LOG_FORMAT=json");
}

/// Validate configuration for obvious misconfigurations.
///
/// Returns 0 if valid, 1 if any warnings are found.
pub fn run_validate() -> i32 {
    let env = config::load();
    let layout = env.layout();
    let mut warnings = 0;

    if !env.root.is_dir() {
        eprintln!("WARNING: MODHOST_ROOT ({}) is not a directory", env.root.display());
        warnings += 1;
    }

    match layout.roots_for(&env.patch) {
        Ok(roots) if !roots.module_root.is_dir() => {
            eprintln!(
                "WARNING: mod folder for {} ({}) does not exist",
                env.patch,
                roots.module_root.display()
            );
            warnings += 1;
        }
        Ok(_) => {}
        Err(e) => {
            eprintln!("WARNING: MODHOST_PATCH: {}", e);
            warnings += 1;
        }
    }

    if !env.catalog_url.contains("{version}") {
        eprintln!("WARNING: MODHOST_CATALOG_URL has no {{version}} placeholder; every patch shares one list");
        warnings += 1;
    }

    if let Err(e) = tracing_subscriber::EnvFilter::try_new(&env.log.level) {
        eprintln!("WARNING: MODHOST_LOG_LEVEL: {}", e);
        warnings += 1;
    }

    if warnings == 0 {
        println!("Configuration is valid.");
        0
    } else {
        1
    }
}

fn print_config(cfg: &EffectiveConfig) {
    println!("MODHOST_ROOT={}", cfg.root);
    println!("MODHOST_PATCH={}", cfg.patch);
    println!("MODHOST_BASELINE_PATCH={}", cfg.baseline_patch);
    println!("MODHOST_DATA_DIR={}", cfg.data_dir);
    println!("MODHOST_MODS_DIR={}", cfg.mods_dir);
    println!("MODHOST_CODE_DIR={}", cfg.code_dir);
    println!("MODHOST_CATALOG_URL={}", cfg.catalog_url);
    println!("MODHOST_LOG_LEVEL={}", cfg.log_level);
    println!("MODHOST_LOG_FORMAT={}", cfg.log_format);
    if let Some(file) = &cfg.log_file {
        println!("MODHOST_LOG_FILE={}", file);
    }
}
