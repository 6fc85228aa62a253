//! Migrate command.

use clap::Args;
use console::style;

use community_migrate::config::Settings;
use community_migrate::importers::default_registry;
use community_migrate::{EntityStatus, MigrationConfig, Orchestrator, RunReport};

use crate::cli::helpers::open_backends;
use crate::cli::progress::ConsoleReporter;

#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Entities to migrate (all when omitted); dependencies are not added
    entities: Vec<String>,

    /// Rows fetched per source query (defaults to the configured batch size)
    #[arg(short, long)]
    batch_size: Option<u64>,

    /// Stop each entity after this many rows
    #[arg(short, long)]
    limit: Option<u64>,

    /// Skip this many rows of each entity's source query
    #[arg(long, default_value = "0")]
    offset: u64,

    /// Make every decision but persist nothing
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Restrict user-owned entities to one legacy user
    #[arg(long = "user-id")]
    user_id: Option<i64>,

    /// Download avatars, logos and images
    #[arg(long)]
    download_media: bool,

    /// Re-run entities already marked completed
    #[arg(short, long)]
    force: bool,

    /// Print itemized per-record outcomes
    #[arg(long)]
    details: bool,
}

impl MigrateArgs {
    fn migration_config(&self, settings: &Settings) -> MigrationConfig {
        MigrationConfig {
            batch_size: self.batch_size.unwrap_or(settings.batch_size),
            limit: self.limit,
            offset: self.offset,
            dry_run: self.dry_run,
            user_id_filter: self.user_id,
            // Dry runs never touch the media directory.
            download_media: self.download_media && !self.dry_run,
            record_details: self.details,
            detail_limit: settings.detail_limit,
            force: self.force,
        }
    }
}

pub async fn cmd_migrate(settings: &Settings, args: MigrateArgs) -> anyhow::Result<()> {
    let config = args.migration_config(settings);
    let backends = open_backends(settings, true, config.download_media).await?;
    let orchestrator = Orchestrator::new(default_registry()?);
    let reporter = ConsoleReporter::new();

    if config.dry_run {
        println!(
            "{} Dry run: nothing will be written to {}",
            style("!").yellow(),
            settings.target_database.display()
        );
    }

    let report = orchestrator
        .run(&backends, &config, &args.entities, &reporter)
        .await?;

    print_summary(&report);
    if args.details {
        print_details(&report);
    }

    if !report.is_success() {
        anyhow::bail!("Migration finished with blocked or failed entities");
    }
    Ok(())
}

fn status_cell(status: &EntityStatus) -> String {
    let text = format!("{:<28}", status.to_string());
    match status {
        EntityStatus::Completed { .. } => style(text).green().to_string(),
        EntityStatus::Partial { .. } => style(text).yellow().to_string(),
        EntityStatus::AlreadyCompleted => style(text).dim().to_string(),
        EntityStatus::Blocked { .. } | EntityStatus::Failed { .. } => {
            style(text).red().to_string()
        }
    }
}

fn print_summary(report: &RunReport) {
    println!();
    println!(
        "{}",
        style(if report.dry_run {
            "Migration summary (dry run)"
        } else {
            "Migration summary"
        })
        .bold()
    );
    println!(
        "{:<20} {:<28} {:>9} {:>9} {:>9}",
        "Entity", "Status", "Migrated", "Skipped", "Failed"
    );
    println!("{}", "-".repeat(79));

    for (name, status) in &report.statuses {
        let counters = report.result.counters(name);
        println!(
            "{:<20} {} {:>9} {:>9} {:>9}",
            name,
            status_cell(status),
            counters.migrated,
            counters.skipped,
            counters.failed
        );
    }

    let totals = report.result.totals();
    println!("{}", "-".repeat(79));
    println!(
        "{:<20} {:<28} {:>9} {:>9} {:>9}",
        "total", "", totals.migrated, totals.skipped, totals.failed
    );

    for pass in &report.secondary {
        match &pass.error {
            None => println!(
                "  {} secondary pass for {} updated {}",
                style("✓").green(),
                pass.entity,
                pass.updated
            ),
            Some(e) => println!(
                "  {} secondary pass for {} failed: {}",
                style("✗").red(),
                pass.entity,
                e
            ),
        }
    }
}

fn print_details(report: &RunReport) {
    for entity in report.result.entities() {
        let details = report.result.details(entity);
        if details.is_empty() {
            continue;
        }
        println!();
        println!("{}", style(entity).bold());
        for detail in details {
            let source = detail
                .source_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string());
            let target = detail
                .target_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {:>8} -> {:<8} {:<9} {}",
                source,
                target,
                detail.outcome.as_str(),
                detail.summary
            );
        }
        let dropped = report.result.details_dropped(entity);
        if dropped > 0 {
            println!("  ... {} more not shown", dropped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: MigrateArgs,
    }

    #[test]
    fn test_migration_config_from_args() {
        let settings = Settings::default();
        let harness = Harness::parse_from([
            "cmigrate", "users", "groups", "--limit", "10", "--offset", "20", "--dry-run",
            "--download-media", "--user-id", "7",
        ]);
        assert_eq!(harness.args.entities, vec!["users", "groups"]);

        let config = harness.args.migration_config(&settings);
        assert_eq!(config.batch_size, settings.batch_size);
        assert_eq!(config.limit, Some(10));
        assert_eq!(config.offset, 20);
        assert!(config.dry_run);
        assert!(!config.download_media);
        assert_eq!(config.user_id_filter, Some(7));
    }
}
