//! Recovery verification harness entry point.
//!
//! ## CLI Subcommands
//!
//! - `recovery-core-cli` or `recovery-core-cli run` - Run the scenario catalog (default)
//! - `recovery-core-cli list` - Show the scenario catalog
//! - `recovery-core-cli probe` - Health-check the target (exit 0/1)
//! - `recovery-core-cli backup` - Create and verify a backup artifact
//! - `recovery-core-cli config show|defaults|validate`

use std::process::ExitCode;

use recovery_core::cli::{backup_cmd, config_cmd, list_cmd, probe_cmd, run_cmd};
use recovery_core::telemetry::{init_logging, LogConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = match args.get(1).map(|s| s.as_str()) {
        Some("--help") => "help",
        Some("--version") => "version",
        Some(cmd) if !cmd.starts_with("--") => cmd,
        _ => "run",
    };

    if let Err(e) = init_logging(&LogConfig::from_env()) {
        eprintln!("Logging setup failed: {}", e);
    }

    match command {
        "run" => exit(run_cmd::run(&args).await),
        "list" => exit(list_cmd::run_list(&args)),
        "probe" => exit(probe_cmd::run_probe(&args).await),
        "backup" => exit(backup_cmd::run_backup(&args).await),
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => exit(config_cmd::run_show(&args)),
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => exit(config_cmd::run_validate(&args)),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "-V" => {
            println!("recovery-core-cli {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn exit(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "recovery-core-cli - Recovery verification harness v{}

USAGE:
    recovery-core-cli [COMMAND] [OPTIONS]

COMMANDS:
    run          Inject faults and measure recovery (default)
    list         Show the scenario catalog
    probe        Health-check the target without injecting faults
    backup       Create and verify a backup artifact
    config       Inspect configuration (show, defaults, validate)
    version      Show version information
    help         Show this help message

OPTIONS:
    --config FILE  Load a TOML configuration file
    --json         Machine-readable output where supported

ENVIRONMENT:
    TEST_BASE_URL          Target base URL (default: http://localhost:8000)
    RECOVERY_CONFIG_FILE   TOML configuration file
    RECOVERY_LOG_FORMAT    json or pretty (default: pretty)
    RECOVERY_LOG_LEVEL     Log filter, falls back to RUST_LOG (default: info)
    RECOVERY_LOG_FILE      Write logs to a file instead of stderr

    Run `recovery-core-cli config defaults` for every tunable.

EXIT CODES:
    0  Every scenario passed
    1  Blocking finding, SLA violation or failed check
    2  Configuration error
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "run" => {
            eprintln!(
                "recovery-core-cli run - Run the scenario catalog

USAGE:
    recovery-core-cli run [OPTIONS]

OPTIONS:
    --config FILE            Load configuration from file
    --scenario ID[,ID...]    Run only these scenarios, in catalog order
    --json                   Print the consolidated report as JSON

DESCRIPTION:
    Runs each enabled scenario in order: baseline health check, fault
    injection, recovery measurement, SLA evaluation. Per-scenario results
    and the consolidated JSON/HTML report are written to the results
    directory.

    Scenarios whose target (process pattern, datastore) is not configured
    are skipped with a low-severity finding.

EXAMPLES:
    recovery-core-cli run
    recovery-core-cli run --scenario application_crash,retry_recovery
"
            );
        }
        "list" => {
            eprintln!(
                "recovery-core-cli list - Show the scenario catalog

USAGE:
    recovery-core-cli list [--config FILE] [--json]
"
            );
        }
        "probe" => {
            eprintln!(
                "recovery-core-cli probe - Health-check the target

USAGE:
    recovery-core-cli probe [--config FILE] [--wait]

DESCRIPTION:
    Checks the HTTP health endpoint and, when configured, the datastore.
    Each check is retried RETRY_ATTEMPTS times, or with --wait polled until
    APP_RESTART_TIMEOUT.

EXIT CODES:
    0  All checks healthy
    1  At least one check unhealthy
    2  Configuration error
"
            );
        }
        "backup" => {
            eprintln!(
                "recovery-core-cli backup - Create a backup artifact

USAGE:
    recovery-core-cli backup [--config FILE] [--json]

DESCRIPTION:
    Runs the configured dump tool into RECOVERY_BACKUP_DIR and verifies
    the artifact's size and checksum. Requires RECOVERY_DB_NAME.
"
            );
        }
        "config" => {
            eprintln!(
                "recovery-core-cli config - Inspect configuration

USAGE:
    recovery-core-cli config <SUBCOMMAND> [--config FILE]

SUBCOMMANDS:
    show           Show the effective configuration
    validate       Warn about settings that skip or weaken scenarios
    defaults       Show built-in defaults
"
            );
        }
        _ => {
            eprintln!(
                "No detailed help available for '{}'. Use 'recovery-core-cli help' for general usage.",
                command
            );
        }
    }
}
