//! zbackup CLI
//!
//! One-way replication of ZFS snapshots from a primary pool to a backup pool.
//!
//! # Commands
//!
//! - `sync` - Copy every missing snapshot to the backup pool
//! - `create` - Create a snapshot and replicate it
//! - `list` - Show snapshots on both pools
//! - `remove` - Delete a snapshot
//! - `restore-backup` - Replace the primary pool with a backup snapshot
//! - `restore-snapshot` - Roll the primary pool back to one of its snapshots

mod commands;
mod config;
mod terminal;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use terminal::{StdinConfirmer, TerminalReporter};
use tracing_subscriber::EnvFilter;
use zbackup_engine::{AssumeYes, BackupEngine, Confirmer};
use zbackup_store::ZfsStore;

/// One-way ZFS snapshot replication.
#[derive(Parser)]
#[command(name = "zbackup")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the config file
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy every snapshot the backup pool is missing
    Sync,

    /// Create a snapshot on the primary pool and replicate it
    Create {
        /// Snapshot name
        name: String,
    },

    /// List snapshots on both pools
    List,

    /// Delete a snapshot from both pools
    Remove {
        /// Snapshot name
        name: String,

        /// Only delete from the primary pool
        #[arg(long, conflicts_with = "backup")]
        primary: bool,

        /// Only delete from the backup pool
        #[arg(long)]
        backup: bool,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Replace the primary pool with a snapshot from another pool
    RestoreBackup {
        /// Snapshot to restore, as pool@snapshot
        reference: String,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Roll the primary pool back to one of its own snapshots
    RestoreSnapshot {
        /// Snapshot name on the primary pool
        name: String,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Show version information
    Version,
}

fn confirmer(yes: bool) -> Box<dyn Confirmer> {
    if yes {
        Box::new(AssumeYes)
    } else {
        Box::new(StdinConfirmer)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Commands::Version = cli.command {
        println!("zbackup v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = config::resolve(cli.config.as_deref())?;
    let engine =
        BackupEngine::new(config, ZfsStore::new())?.with_reporter(Arc::new(TerminalReporter));

    match cli.command {
        Commands::Sync => commands::sync::run(&engine)?,
        Commands::Create { name } => commands::create::run(&engine, &name)?,
        Commands::List => commands::list::run(&engine)?,
        Commands::Remove {
            name,
            primary,
            backup,
            yes,
        } => {
            let scope = commands::remove::scope(primary, backup);
            commands::remove::run(&engine, &name, scope, confirmer(yes).as_ref())?;
        }
        Commands::RestoreBackup { reference, yes } => {
            commands::restore::from_backup(&engine, &reference, confirmer(yes).as_ref())?;
        }
        Commands::RestoreSnapshot { name, yes } => {
            commands::restore::to_snapshot(&engine, &name, confirmer(yes).as_ref())?;
        }
        Commands::Version => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn remove_flags_parse() {
        let cli = Cli::try_parse_from(["zbackup", "remove", "nightly", "--backup", "-y"]).unwrap();
        match cli.command {
            Commands::Remove {
                name,
                primary,
                backup,
                yes,
            } => {
                assert_eq!(name, "nightly");
                assert!(!primary);
                assert!(backup);
                assert!(yes);
            }
            _ => panic!("expected remove"),
        }
    }

    #[test]
    fn primary_and_backup_conflict() {
        assert!(Cli::try_parse_from(["zbackup", "remove", "x", "--primary", "--backup"]).is_err());
    }

    #[test]
    fn global_config_flag() {
        let cli = Cli::try_parse_from(["zbackup", "sync", "--config", "/etc/zbackup.json"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/zbackup.json")));
        assert!(matches!(cli.command, Commands::Sync));
    }
}
