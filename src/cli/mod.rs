//! CLI subcommands for the recovery harness.
//!
//! ## Usage
//!
//! ```bash
//! recovery-core-cli                      # run the full scenario catalog
//! recovery-core-cli run --scenario application_crash
//! recovery-core-cli list                 # show the configured catalog
//! recovery-core-cli probe                # one-shot health check of the target
//! recovery-core-cli backup               # create and verify a backup artifact
//! recovery-core-cli config show
//! ```
//!
//! Every command returns a process exit code instead of exiting itself.

pub mod backup_cmd;
pub mod config_cmd;
pub mod list_cmd;
pub mod probe_cmd;
pub mod run_cmd;

use std::path::Path;

use crate::config::{self, ConfigError, HarnessConfig};

/// Everything passed.
pub const EXIT_SUCCESS: i32 = 0;
/// A blocking finding, SLA violation or failed check.
pub const EXIT_FAILURE: i32 = 1;
/// Configuration could not be loaded or is invalid.
pub const EXIT_CONFIG: i32 = 2;

/// Value following `flag`, e.g. `--config path`.
pub fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

/// Load and validate configuration, honouring `--config FILE`.
pub fn load_config(args: &[String]) -> Result<HarnessConfig, ConfigError> {
    let config = match flag_value(args, "--config") {
        Some(path) => config::load_from_file(Path::new(path))?,
        None => config::load()?,
    };
    config.validate()?;
    Ok(config)
}

/// Same as [`load_config`], printing the error and mapping it to
/// [`EXIT_CONFIG`].
pub(crate) fn load_config_or_exit(args: &[String]) -> Result<HarnessConfig, i32> {
    load_config(args).map_err(|e| {
        eprintln!("Configuration error: {}", e);
        EXIT_CONFIG
    })
}
