//! Migration state display.

use console::style;

use community_migrate::config::Settings;
use community_migrate::importers::default_registry;
use community_migrate::Orchestrator;

use crate::cli::helpers::open_backends;

pub async fn cmd_status(settings: &Settings) -> anyhow::Result<()> {
    let backends = open_backends(settings, true, false).await?;
    let orchestrator = Orchestrator::new(default_registry()?);
    let states = orchestrator.status(&backends).await?;

    println!(
        "{:<20} {:<12} {:>10}  {}",
        "Entity", "State", "Rows", "Mappings"
    );
    println!("{}", "-".repeat(64));

    for state in states {
        let label = if state.completed {
            style(format!("{:<12}", "completed")).green().to_string()
        } else if state.mappings.iter().any(|(_, n)| *n > 0) {
            style(format!("{:<12}", "in progress")).yellow().to_string()
        } else {
            style(format!("{:<12}", "not started")).dim().to_string()
        };
        let mappings = state
            .mappings
            .iter()
            .map(|(ns, n)| format!("{}={}", ns, n))
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "{:<20} {} {:>10}  {}",
            state.entity, label, state.source_rows, mappings
        );
    }

    Ok(())
}
