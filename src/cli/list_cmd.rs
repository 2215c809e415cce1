//! `list`: show the configured scenario catalog.

use std::fmt::Write as _;

use super::{has_flag, load_config_or_exit, EXIT_FAILURE, EXIT_SUCCESS};
use crate::scenario::Scenario;

pub fn run_list(args: &[String]) -> i32 {
    let config = match load_config_or_exit(args) {
        Ok(config) => config,
        Err(code) => return code,
    };

    if has_flag(args, "--json") {
        return match serde_json::to_string_pretty(&config.scenarios) {
            Ok(json) => {
                println!("{}", json);
                EXIT_SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to serialize catalog: {}", e);
                EXIT_FAILURE
            }
        };
    }
    print!("{}", render_catalog(&config.scenarios));
    EXIT_SUCCESS
}

/// Fixed-width table of the catalog.
pub fn render_catalog(scenarios: &[Scenario]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<28} {:<18} {:<9} {:<8} NEEDS",
        "ID", "KIND", "SEVERITY", "ENABLED"
    );
    for s in scenarios {
        let mut needs = Vec::new();
        if s.kind.requires_process() {
            needs.push("process");
        }
        if s.kind.requires_database() {
            needs.push("datastore");
        }
        let _ = writeln!(
            out,
            "{:<28} {:<18} {:<9} {:<8} {}",
            s.id,
            s.kind.as_str(),
            s.severity.as_str(),
            if s.enabled { "yes" } else { "no" },
            if needs.is_empty() { "-".to_string() } else { needs.join(",") }
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::default_catalog;

    #[test]
    fn test_catalog_table_lists_every_scenario() {
        let catalog = default_catalog();
        let table = render_catalog(&catalog);
        assert_eq!(table.lines().count(), catalog.len() + 1);
        for s in &catalog {
            assert!(table.contains(&s.id));
        }
    }

    #[test]
    fn test_disabled_scenario_marked() {
        let catalog: Vec<_> = default_catalog().into_iter().take(1).map(|s| s.disabled()).collect();
        let table = render_catalog(&catalog);
        let row = table.lines().nth(1).unwrap();
        assert!(row.contains(" no "));
    }
}
