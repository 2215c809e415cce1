//! `run`: execute the scenario catalog against the configured target.

use tracing::{error, warn};

use super::{flag_value, has_flag, load_config_or_exit, EXIT_CONFIG, EXIT_FAILURE};
use crate::config::{ConfigError, HarnessConfig};
use crate::orchestrator::{Collaborators, ScenarioOrchestrator};
use crate::report::render_summary;

/// Restrict the catalog to a comma-separated list of scenario ids.
///
/// Selected scenarios are enabled even if the catalog disables them.
pub fn select_scenarios(config: &mut HarnessConfig, selection: &str) -> Result<(), ConfigError> {
    let wanted: Vec<&str> = selection
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if wanted.is_empty() {
        return Err(ConfigError::Invalid("--scenario needs at least one id".to_string()));
    }
    if let Some(unknown) = wanted
        .iter()
        .find(|id| !config.scenarios.iter().any(|s| s.id == **id))
    {
        return Err(ConfigError::Invalid(format!("unknown scenario {:?}", unknown)));
    }

    config.scenarios.retain(|s| wanted.contains(&s.id.as_str()));
    for scenario in &mut config.scenarios {
        scenario.enabled = true;
    }
    Ok(())
}

/// Run every selected scenario and print the summary.
///
/// Options: `--config FILE`, `--scenario ID[,ID...]`, `--json`.
pub async fn run(args: &[String]) -> i32 {
    let mut config = match load_config_or_exit(args) {
        Ok(config) => config,
        Err(code) => return code,
    };
    if let Some(selection) = flag_value(args, "--scenario") {
        if let Err(e) = select_scenarios(&mut config, selection) {
            eprintln!("Configuration error: {}", e);
            return EXIT_CONFIG;
        }
    }

    let parts = match Collaborators::from_config(&config) {
        Ok(parts) => parts,
        Err(e) => {
            error!(error = %e, "Failed to set up collaborators");
            eprintln!("Configuration error: {}", e);
            return EXIT_CONFIG;
        }
    };
    let orchestrator = ScenarioOrchestrator::new(config, parts);
    let run_id = orchestrator.run_id();

    tokio::select! {
        report = orchestrator.run() => {
            if has_flag(args, "--json") {
                match serde_json::to_string_pretty(&report) {
                    Ok(json) => println!("{}", json),
                    Err(e) => eprintln!("Failed to serialize report: {}", e),
                }
            } else {
                print!("{}", render_summary(&report));
            }
            i32::from(report.exit_code())
        }
        _ = tokio::signal::ctrl_c() => {
            warn!(%run_id, "Interrupted, abandoning run");
            eprintln!("Interrupted; run {} abandoned without a report", run_id);
            EXIT_FAILURE
        }
    }
}
