//! modhost-cli entry point.
//!
//! ## CLI Subcommands
//!
//! - `modhost-cli mods [PATCH] [--json]` - Resolved mod set of a patch
//! - `modhost-cli paths [PATCH]` - Derived resource roots
//! - `modhost-cli health [PATCH] [--json]` - Dry-run load and health report (exit 0/1)
//! - `modhost-cli config show|defaults|validate` - Configuration

use std::process::ExitCode;

use modhost_core::cli::{config_cmd, health_cmd, mods_cmd, paths_cmd};
use modhost_core::config;
use modhost_core::telemetry::init_logging;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");
    let json = args.iter().any(|a| a == "--json");
    let patch = args
        .get(2)
        .map(|s| s.as_str())
        .filter(|s| !s.starts_with("--"));

    if matches!(command, "mods" | "health") {
        let env = config::load();
        if let Err(e) = init_logging(&env.log) {
            eprintln!("Logging disabled: {}", e);
        }
    }

    match command {
        "mods" | "list" => ExitCode::from(mods_cmd::run_list(patch, json) as u8),
        "paths" => ExitCode::from(paths_cmd::run(patch) as u8),
        "health" => ExitCode::from(health_cmd::run_health(patch, json).await as u8),
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => {
                    config_cmd::run_show();
                    ExitCode::SUCCESS
                }
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => ExitCode::from(config_cmd::run_validate() as u8),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("modhost-cli {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "modhost-cli - Mod host inspection tool v{}

USAGE:
    modhost-cli [COMMAND] [OPTIONS]

COMMANDS:
    mods         List the resolved mod set of a patch
    paths        Print the resource roots of a patch
    health       Dry-run load and health report (exit 0 if healthy)
    config       Manage configuration (show, defaults, validate)
    version      Show version information
    help         Show this help message

OPTIONS:
    -h, --help     Show help for command
    -V, --version  Show version information
    --json         JSON output (mods, health)

EXAMPLES:
    modhost-cli mods                       # Mods of the configured patch
    modhost-cli mods \"100.02 Starscape\"    # Mods of another patch
    modhost-cli paths \"100.02 Starscape\"   # Where that patch lives
    modhost-cli health --json              # Health report as JSON
    modhost-cli config validate            # Validate configuration

ENVIRONMENT:
    MODHOST_ROOT         Base directory (default: .)
    MODHOST_PATCH        Active patch (default: 34.04 Omni)
    MODHOST_LOG_LEVEL    Log filter (default: info)
    MODHOST_LOG_FORMAT   json or pretty (default: json)

EXIT CODES:
    0  Success / Healthy
    1  Failure / Unhealthy
    2  Configuration error
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "mods" | "list" => {
            eprintln!(
                "modhost-cli mods - List resolved mods

USAGE:
    modhost-cli mods [PATCH] [--json]

DESCRIPTION:
    Reads every module.json under the patch's mod folder, drops disabled
    mods and applies dependency and conflict resolution. Installed mods
    are listed in load order (core mods first), followed by the excluded
    mods and the reason for each exclusion.
"
            );
        }
        "paths" => {
            eprintln!(
                "modhost-cli paths - Show resource roots

USAGE:
    modhost-cli paths [PATCH]

DESCRIPTION:
    Prints the data, mod and code roots derived for the patch, and the
    module list URL. The baseline patch uses MODHOST_ROOT as-is; every
    other patch lives under a patchN sub-directory.
"
            );
        }
        "health" => {
            eprintln!(
                "modhost-cli health - Dry-run health check

USAGE:
    modhost-cli health [PATCH] [--json]

DESCRIPTION:
    Loads the patch's mods with inert code and reports installed, loaded,
    failed and excluded counts.

EXIT CODES:
    0  Healthy
    1  Degraded or unhealthy
    2  Configuration error
"
            );
        }
        "config" => {
            eprintln!(
                "modhost-cli config - Manage configuration

USAGE:
    modhost-cli config <SUBCOMMAND>

SUBCOMMANDS:
    show       Show effective configuration
    defaults   Show default configuration values
    validate   Check the configuration against the file system
"
            );
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            eprintln!("Run 'modhost-cli help' for available commands.");
        }
    }
}
