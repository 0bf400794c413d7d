//! ShadowDB CLI
//!
//! Command-line tools for managing shadow tables.
//!
//! # Commands
//!
//! - `migrate` - Build shadow tables from the source of truth
//! - `status` - Show per-type shadowing state
//! - `index` - Create, drop or inspect typed index columns
//! - `rollback` - Drop the shadow storage of a type
//! - `verify` - Compare sampled shadow rows with the source
//! - `batch` - Drive a resumable migration one step at a time
//! - `settings` - Show or change persisted settings

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use commands::CliResult;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// ShadowDB command-line tools.
#[derive(Parser)]
#[command(name = "shadowdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the SQLite database holding source and shadow tables
    #[arg(global = true, short, long)]
    database: Option<PathBuf>,

    /// Table prefix
    #[arg(global = true, long, default_value = "wp_")]
    prefix: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate records into shadow tables
    Migrate {
        /// Entity type to migrate
        #[arg(short, long = "type")]
        entity_type: Option<String>,

        /// Migrate every configured type
        #[arg(short, long)]
        all: bool,

        /// Records per page
        #[arg(short, long, default_value = "500")]
        batch: usize,

        /// Dry run - show what would be done
        #[arg(long)]
        dry_run: bool,
    },

    /// Show shadowing status
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Manage typed index columns
    Index {
        /// What to do
        #[arg(value_enum, default_value = "status")]
        action: IndexAction,

        /// Entity type (every configured type when omitted)
        #[arg(short, long = "type")]
        entity_type: Option<String>,
    },

    /// Drop the shadow storage of a type
    Rollback {
        /// Entity type to roll back
        #[arg(short, long = "type")]
        entity_type: String,

        /// Confirm the drop
        #[arg(short, long)]
        yes: bool,
    },

    /// Check shadow rows against the source of truth
    Verify {
        /// Entity type to check
        #[arg(short, long = "type")]
        entity_type: Option<String>,

        /// Check every configured type
        #[arg(short, long)]
        all: bool,

        /// Rows sampled per type
        #[arg(short, long)]
        sample: Option<usize>,

        /// Re-sync the entities found to differ
        #[arg(short, long)]
        repair: bool,
    },

    /// Drive a resumable migration
    Batch {
        /// What to do
        #[arg(value_enum)]
        action: BatchAction,

        /// Entity type
        #[arg(short, long = "type")]
        entity_type: String,
    },

    /// Show or change settings
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },

    /// Show version information
    Version,
}

#[derive(Clone, Copy, ValueEnum)]
enum IndexAction {
    Create,
    Drop,
    Status,
}

#[derive(Clone, Copy, ValueEnum)]
enum BatchAction {
    Start,
    Step,
    Progress,
    Cancel,
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print the persisted settings
    Show,
    /// Change persisted settings
    Set {
        /// Enable or disable write interception
        #[arg(long)]
        enabled: Option<bool>,

        /// Comma-separated entity types
        #[arg(long, value_delimiter = ',')]
        types: Option<Vec<String>>,

        /// Driver override (auto, native_json, lookup_table)
        #[arg(long)]
        driver: Option<String>,

        /// Push writes off the request path
        #[arg(long)]
        async_write: Option<bool>,
    },
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Commands::Version = cli.command {
        println!("ShadowDB CLI v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let path = cli.database.ok_or("Database path required (--database)")?;
    let ctx = commands::open_context(&path, &cli.prefix)?;

    match cli.command {
        Commands::Migrate {
            entity_type,
            all,
            batch,
            dry_run,
        } => {
            let types = commands::target_types(&ctx, entity_type, all)?;
            commands::migrate::run(&ctx, &types, batch, dry_run)?;
        }
        Commands::Status { format } => {
            commands::status::run(&ctx, &format)?;
        }
        Commands::Index { action, entity_type } => {
            let types = commands::target_types(&ctx, entity_type, true)?;
            match action {
                IndexAction::Create => commands::index::create(&ctx, &types)?,
                IndexAction::Drop => commands::index::drop(&ctx, &types)?,
                IndexAction::Status => commands::index::status(&ctx, &types)?,
            };
        }
        Commands::Rollback { entity_type, yes } => {
            commands::rollback::run(&ctx, &entity_type, yes)?;
        }
        Commands::Verify {
            entity_type,
            all,
            sample,
            repair,
        } => {
            let types = commands::target_types(&ctx, entity_type, all)?;
            let sample = sample.unwrap_or(ctx.config().integrity_sample_size);
            commands::verify::run(&ctx, &types, sample, repair)?;
        }
        Commands::Batch { action, entity_type } => {
            let batch = commands::batch::Batch::new(&ctx, &entity_type);
            match action {
                BatchAction::Start => batch.start()?,
                BatchAction::Step => batch.step()?,
                BatchAction::Progress => batch.progress()?,
                BatchAction::Cancel => batch.cancel()?,
            }
        }
        Commands::Settings { action } => match action.unwrap_or(SettingsAction::Show) {
            SettingsAction::Show => commands::settings::show(&ctx)?,
            SettingsAction::Set {
                enabled,
                types,
                driver,
                async_write,
            } => {
                let change = commands::settings::SettingsChange {
                    enabled,
                    types,
                    driver,
                    async_write,
                };
                commands::settings::set(&ctx, change)?;
            }
        },
        Commands::Version => {}
    }

    Ok(())
}
