//! `paths` subcommand: print the resource roots derived for a patch.

use crate::config;

use super::{select_patch, EXIT_CONFIG_ERROR};

pub fn run(patch: Option<&str>) -> i32 {
    let cfg = config::load();
    let identity = match select_patch(patch, &cfg) {
        Ok(identity) => identity,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_CONFIG_ERROR;
        }
    };

    let layout = cfg.layout();
    let roots = match layout.roots_for(&identity) {
        Ok(roots) => roots,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_CONFIG_ERROR;
        }
    };

    println!("patch={}", identity);
    println!("baseline={}", layout.is_baseline(&identity));
    println!("data_root={}", roots.data_root.display());
    println!("module_root={}", roots.module_root.display());
    println!("code_root={}", roots.code_root.display());
    println!("module_list_url={}", identity.fill_template(&cfg.catalog_url));
    0
}
