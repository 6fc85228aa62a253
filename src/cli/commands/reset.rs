//! Reset command.

use console::style;

use community_migrate::config::Settings;
use community_migrate::importers::default_registry;
use community_migrate::Orchestrator;

use crate::cli::helpers::open_backends;

pub async fn cmd_reset(settings: &Settings, entity: &str, mappings: bool) -> anyhow::Result<()> {
    let backends = open_backends(settings, false, false).await?;
    let orchestrator = Orchestrator::new(default_registry()?);
    let removed = orchestrator.reset(&backends, entity, mappings).await?;

    if mappings {
        println!(
            "{} Reset {} and removed {} mappings",
            style("✓").green(),
            entity,
            removed
        );
    } else {
        println!(
            "{} Cleared completion marker for {}",
            style("✓").green(),
            entity
        );
    }
    Ok(())
}
