use clap::{Parser, Subcommand};

use super::subcommands::{AuditCommands, BackupCommands, ConfigCommands, SnapshotCommands};

/// `FileWarden` - safety gate for agent-driven filesystem operations.
#[derive(Parser, Debug)]
#[command(name = "filewarden")]
#[command(author = "theonlyhennygod")]
#[command(version = "0.1.0")]
#[command(about = "A safety gate for filesystem operations.", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show gate status (stores, pending confirmations, storage usage)
    Status,

    /// Dry-run an operation through path policy and risk scoring
    Check {
        /// Operation kind in snake_case (e.g. delete_files, move_files)
        operation: String,

        /// Paths the operation would touch
        #[arg(required = true)]
        paths: Vec<String>,

        /// Score the operation as recursive
        #[arg(short, long)]
        recursive: bool,
    },

    /// Inspect and maintain the audit trail
    Audit {
        #[command(subcommand)]
        audit_command: AuditCommands,
    },

    /// Manage content backups
    Backup {
        #[command(subcommand)]
        backup_command: BackupCommands,
    },

    /// Manage reversal snapshots
    Snapshot {
        #[command(subcommand)]
        snapshot_command: SnapshotCommands,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },
}
