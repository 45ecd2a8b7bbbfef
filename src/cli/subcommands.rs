use clap::Subcommand;
use serde::{Deserialize, Serialize};

/// Audit trail subcommands
#[derive(Subcommand, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditCommands {
    /// Show the most recent audit entries
    Recent {
        /// Maximum number of entries
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Aggregate statistics over a window
    Stats {
        /// Window size in days
        #[arg(short, long, default_value = "30")]
        days: u32,
        /// Restrict to one user
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Failed operations within a window
    Failed {
        #[arg(short, long, default_value = "7")]
        days: u32,
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
    /// High and critical risk operations within a window
    HighRisk {
        #[arg(short, long, default_value = "7")]
        days: u32,
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
    /// Export entries to a JSON file
    Export {
        /// Output file path
        output: String,
        #[arg(short, long)]
        user: Option<String>,
        #[arg(short, long, default_value = "30")]
        days: u32,
    },
    /// Apply the retention policy to the audit stores
    Cleanup,
}

/// Backup store subcommands
#[derive(Subcommand, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum BackupCommands {
    /// List backups, newest first
    List {
        #[arg(short, long, default_value = "30")]
        days: u32,
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Restore a backup's content to its original locations
    Restore {
        /// Backup id
        id: String,
    },
    /// Delete one backup
    Delete {
        /// Backup id
        id: String,
    },
    /// Show aggregate storage usage
    Info,
    /// Apply the storage cap and retention policy
    Cleanup,
}

/// Snapshot store subcommands
#[derive(Subcommand, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SnapshotCommands {
    /// Reverse a completed operation using its snapshot
    Rollback {
        /// Snapshot id
        id: String,
    },
    /// Remove expired snapshots
    Cleanup,
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConfigCommands {
    /// Print the active configuration
    Show,
    /// Print the config file path
    Path,
}
