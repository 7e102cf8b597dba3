//! `health` subcommand: dry-run load of a patch and a health report.
//!
//! Mods are loaded with inert code, so the report reflects descriptor
//! parsing, dependency resolution and mod folder layout only.

use std::sync::Arc;

use crate::config;
use crate::health::HealthState;
use crate::mods::InertCodeLoader;
use crate::patch::FileCatalogSource;
use crate::{Runtime, RuntimeConfig};

use super::{select_patch, EXIT_CONFIG_ERROR};

/// Returns 0 when healthy, 1 otherwise.
pub async fn run_health(patch: Option<&str>, json: bool) -> i32 {
    let env = config::load();
    let mut runtime_config = RuntimeConfig::from_env(&env);
    match select_patch(patch, &env) {
        Ok(identity) => runtime_config.initial_patch = identity,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_CONFIG_ERROR;
        }
    }

    let runtime = match Runtime::new(
        runtime_config,
        Arc::new(InertCodeLoader),
        Arc::new(FileCatalogSource::new()),
    ) {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_CONFIG_ERROR;
        }
    };

    runtime.start().await;
    let report = runtime.health().await;
    runtime.shutdown().await;

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(out) => println!("{}", out),
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        }
    } else {
        println!("State:     {:?}", report.state);
        println!("Ready:     {}", report.ready);
        println!("Patch:     {}", report.patch);
        println!(
            "Mods:      {} loaded, {} installed, {} failed, {} excluded",
            report.mods_loaded, report.mods_installed, report.mods_failed, report.mods_excluded
        );
    }

    if report.state == HealthState::Healthy {
        0
    } else {
        1
    }
}
