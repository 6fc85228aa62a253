//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod init;
mod migrate;
mod plan;
mod reset;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use community_migrate::config::{load_settings_with_options, LoadOptions};

#[derive(Parser)]
#[command(name = "cmigrate")]
#[command(about = "Migrate a legacy community platform into the new application schema")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Resolve relative paths from current working directory instead of config file location
    #[arg(long, global = true)]
    cwd: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Create the target database and data directories
    Init,

    /// Run importers in dependency order
    Migrate(migrate::MigrateArgs),

    /// Show the resolved execution order
    Plan {
        /// Entities to plan (all when omitted)
        entities: Vec<String>,
    },

    /// Show completion state and mapping counts per entity
    Status,

    /// Clear an entity's completion marker
    Reset {
        /// Entity to reset
        entity: String,
        /// Also delete every identifier mapping the entity wrote
        #[arg(long)]
        mappings: bool,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        use_cwd: cli.cwd,
    };
    let (settings, _config) = load_settings_with_options(options)
        .await
        .map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Migrate(args) => migrate::cmd_migrate(&settings, args).await,
        Commands::Plan { entities } => plan::cmd_plan(&entities),
        Commands::Status => status::cmd_status(&settings).await,
        Commands::Reset { entity, mappings } => {
            reset::cmd_reset(&settings, &entity, mappings).await
        }
    }
}
