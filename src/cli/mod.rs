pub mod commands;
pub mod subcommands;

pub use commands::{Cli, Commands};
pub use subcommands::{AuditCommands, BackupCommands, ConfigCommands, SnapshotCommands};
