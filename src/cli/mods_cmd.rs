//! `mods` subcommand: list the resolved mod set of a patch.
//!
//! Reads descriptors from the patch's mod folder and applies dependency
//! resolution exactly as a host load would, without building any mod code.

use serde::Serialize;

use crate::config;
use crate::mods::{
    DependencyResolver, DescriptorError, DescriptorSource, DescriptorStore, FsDescriptorSource,
};

use super::{select_patch, EXIT_CONFIG_ERROR};

#[derive(Debug, Serialize)]
pub struct ModSummary {
    pub name: String,
    pub display_name: String,
    pub core: bool,
    pub reloadable: bool,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ModListing {
    pub patch: String,
    pub module_root: String,
    pub installed: Vec<ModSummary>,
    pub excluded: Vec<String>,
    pub disabled: Vec<String>,
}

/// Build the listing for `patch` (or the configured patch).
pub fn build_listing(patch: Option<&str>) -> Result<ModListing, String> {
    let cfg = config::load();
    let identity = select_patch(patch, &cfg).map_err(|e| e.to_string())?;
    let roots = cfg.layout().roots_for(&identity).map_err(|e| e.to_string())?;

    let descriptors = FsDescriptorSource::new()
        .list_installed_descriptors(&roots.module_root)
        .map_err(|e| match e {
            DescriptorError::RootNotFound(root) => format!("Mod folder does not exist: {}", root),
            other => other.to_string(),
        })?;

    let mut store = DescriptorStore::new();
    let mut disabled = Vec::new();
    for descriptor in descriptors {
        if descriptor.flags.disabled {
            disabled.push(descriptor.key().to_string());
        } else {
            store.insert(descriptor);
        }
    }
    let report = DependencyResolver::new().resolve(&mut store);

    let mut installed: Vec<ModSummary> = store
        .iter()
        .map(|d| ModSummary {
            name: d.name.raw().to_string(),
            display_name: d.display_name().to_string(),
            core: d.is_core(),
            reloadable: d.flags.reloadable,
            dependencies: d.dependencies.clone(),
        })
        .collect();
    // Listed in load order.
    installed.sort_by_key(|m| !m.core);

    Ok(ModListing {
        patch: identity.to_string(),
        module_root: roots.module_root.display().to_string(),
        installed,
        excluded: report.exclusions.iter().map(|e| e.to_string()).collect(),
        disabled,
    })
}

pub fn run_list(patch: Option<&str>, json: bool) -> i32 {
    let listing = match build_listing(patch) {
        Ok(listing) => listing,
        Err(message) => {
            eprintln!("Error: {}", message);
            return EXIT_CONFIG_ERROR;
        }
    };

    if json {
        match serde_json::to_string_pretty(&listing) {
            Ok(out) => println!("{}", out),
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        }
        return 0;
    }

    println!("Patch:      {}", listing.patch);
    println!("Mod folder: {}", listing.module_root);
    println!();
    println!("INSTALLED ({}):", listing.installed.len());
    for m in &listing.installed {
        let mut tags = Vec::new();
        if m.core {
            tags.push("core");
        }
        if m.reloadable {
            tags.push("reloadable");
        }
        println!("  {:<28} {}", m.display_name, tags.join(", "));
    }
    if !listing.excluded.is_empty() {
        println!("EXCLUDED ({}):", listing.excluded.len());
        for reason in &listing.excluded {
            println!("  {}", reason);
        }
    }
    if !listing.disabled.is_empty() {
        println!("DISABLED ({}):", listing.disabled.len());
        for name in &listing.disabled {
            println!("  {}", name);
        }
    }
    0
}
