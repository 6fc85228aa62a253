//! Initialize command.

use console::style;

use community_migrate::config::Settings;

use crate::cli::helpers::open_target;

/// Create the data directory and target database.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;

    let db = open_target(settings).await?;
    let version = db.format_version().await?.unwrap_or_else(|| "unknown".to_string());

    println!(
        "{} Target database ready at {} (format {})",
        style("✓").green(),
        settings.target_database.display(),
        version
    );

    match &settings.source {
        Some(source) if source.exists() => {
            println!("  Legacy source: {}", source.display());
        }
        Some(source) => {
            println!(
                "{} Legacy source {} does not exist",
                style("!").yellow(),
                source.display()
            );
        }
        None => {
            println!("{} No legacy source configured", style("!").yellow());
            println!("  Set `source` in community-migrate.toml or export LEGACY_SOURCE");
        }
    }

    Ok(())
}
