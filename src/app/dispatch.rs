use std::path::Path;
use std::str::FromStr;

use anyhow::Result;

use crate::app::status::render_status;
use crate::audit::AuditEntry;
use crate::cli::{AuditCommands, BackupCommands, Cli, Commands, ConfigCommands, SnapshotCommands};
use crate::config::Config;
use crate::gate::FileGate;
use crate::risk::{OperationKind, OperationParams};

/// User id recorded for operations triggered from the command line.
const CLI_USER: &str = "cli";

/// Route a parsed command line to the right handler.
pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    // Config inspection must work even when the gate cannot open.
    if let Commands::Config { config_command } = &cli.command {
        return run_config(config_command, &config);
    }

    let gate = FileGate::open(config).await?;

    match cli.command {
        Commands::Status => {
            println!("{}", render_status(&gate).await);
        }
        Commands::Check {
            operation,
            paths,
            recursive,
        } => {
            run_check(&gate, &operation, &paths, recursive)?;
        }
        Commands::Audit { audit_command } => run_audit(&gate, audit_command).await?,
        Commands::Backup { backup_command } => run_backup(&gate, backup_command).await?,
        Commands::Snapshot { snapshot_command } => run_snapshot(&gate, snapshot_command).await?,
        Commands::Config { .. } => unreachable!("handled before the gate opens"),
    }

    Ok(())
}

fn run_config(command: &ConfigCommands, config: &Config) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            println!("{}", toml::to_string_pretty(config)?);
        }
        ConfigCommands::Path => {
            println!("{}", config.config_path.display());
        }
    }
    Ok(())
}

fn run_check(gate: &FileGate, operation: &str, paths: &[String], recursive: bool) -> Result<()> {
    let operation = OperationKind::from_str(operation)
        .map_err(|_| anyhow::anyhow!("unknown operation kind: {operation}"))?;
    let (batch, risk) = gate.dry_run(operation, paths, OperationParams { recursive })?;

    if !batch.allowed {
        println!("BLOCKED: {}", batch.rejection_summary());
        for decision in batch.decisions.iter().filter(|d| !d.allowed) {
            let reasons: Vec<String> = decision.reasons.iter().map(ToString::to_string).collect();
            println!("  {}  [{}]", decision.resolved.display(), reasons.join(", "));
        }
        return Ok(());
    }

    if let Some(risk) = risk {
        println!("Operation:    {operation}");
        println!("Risk level:   {} (score {})", risk.level, risk.score);
        println!(
            "Files:        {} ({} bytes)",
            risk.file_count, risk.total_bytes
        );
        if !risk.factors.is_empty() {
            println!("Factors:      {}", risk.factors.join(", "));
        }
        println!("Confirmation: {}", yes_no(risk.requires_confirmation));
        println!("Backup:       {}", yes_no(risk.requires_backup));
        println!("{}", risk.recommendation);
    }
    Ok(())
}

async fn run_audit(gate: &FileGate, command: AuditCommands) -> Result<()> {
    let audit = gate.audit();
    match command {
        AuditCommands::Recent { limit } => {
            print_entries(&audit.recent(limit).await?);
        }
        AuditCommands::Stats { days, user } => {
            let stats = audit.statistics(user.as_deref(), days).await?;
            println!("Audit statistics, last {} day(s)", stats.period_days);
            println!(
                "  Operations: {} total, {} successful ({:.1}%)",
                stats.total_operations, stats.successful_operations, stats.success_rate
            );
            println!(
                "  Throughput: {} files, {} bytes",
                stats.total_files_processed, stats.total_bytes_processed
            );
            if !stats.risk_distribution.is_empty() {
                println!("  By risk level:");
                for (level, count) in &stats.risk_distribution {
                    println!("    {level:<10} {count}");
                }
            }
            if !stats.top_operations.is_empty() {
                println!("  Top operations:");
                for (operation, count) in &stats.top_operations {
                    println!("    {operation:<20} {count}");
                }
            }
        }
        AuditCommands::Failed { days, limit } => {
            print_entries(&audit.failed(days, limit).await?);
        }
        AuditCommands::HighRisk { days, limit } => {
            print_entries(&audit.high_risk(days, limit).await?);
        }
        AuditCommands::Export { output, user, days } => {
            let count = audit
                .export(Path::new(&output), user.as_deref(), days)
                .await?;
            println!("Exported {count} entr(ies) to {output}");
        }
        AuditCommands::Cleanup => {
            let deleted = audit.cleanup().await?;
            println!("Removed {deleted} audit record(s) past retention");
        }
    }
    Ok(())
}

async fn run_backup(gate: &FileGate, command: BackupCommands) -> Result<()> {
    match command {
        BackupCommands::List { days, user } => {
            let backups = gate.backups().list_backups(user.as_deref(), days).await?;
            if backups.is_empty() {
                println!("No backups in the last {days} day(s)");
            }
            for record in backups {
                println!(
                    "{}  {}  {}  {} file(s), {} bytes",
                    record.id, record.timestamp, record.operation, record.file_count,
                    record.total_bytes
                );
            }
        }
        BackupCommands::Restore { id } => {
            let report = gate.restore_backup(&id, CLI_USER).await?;
            println!(
                "Restored {} item(s), skipped {}",
                report.restored, report.skipped
            );
            for failure in &report.failures {
                println!("  failed: {failure}");
            }
        }
        BackupCommands::Delete { id } => {
            if gate.backups().delete_backup(&id).await? {
                println!("Deleted backup {id}");
            } else {
                println!("No backup with id {id}");
            }
        }
        BackupCommands::Info => {
            let info = gate.backups().storage_info().await?;
            println!(
                "{} backup(s), {} file(s), {:.1}MB of {:.1}MB used ({:.1}%)",
                info.backup_count,
                info.total_files,
                to_mb(info.total_bytes),
                to_mb(info.limit_bytes),
                info.usage_percent
            );
        }
        BackupCommands::Cleanup => {
            let removed = gate.backups().cleanup().await?;
            println!("Removed {removed} backup(s)");
        }
    }
    Ok(())
}

async fn run_snapshot(gate: &FileGate, command: SnapshotCommands) -> Result<()> {
    match command {
        SnapshotCommands::Rollback { id } => {
            let report = gate.rollback(&id, CLI_USER).await?;
            println!(
                "Rollback {}: {} restored, {} failed, {} folder(s) removed",
                if report.success() { "succeeded" } else { "partial" },
                report.restored,
                report.failed,
                report.folders_removed
            );
            for error in &report.errors {
                println!("  {error}");
            }
        }
        SnapshotCommands::Cleanup => {
            let removed = gate.snapshots().cleanup_expired().await?;
            println!("Removed {removed} expired snapshot(s)");
        }
    }
    Ok(())
}

fn print_entries(entries: &[AuditEntry]) {
    if entries.is_empty() {
        println!("No matching audit entries");
        return;
    }
    for entry in entries {
        println!(
            "{}  {}  {:<8}  {:<10}  {}  {} path(s)",
            entry.timestamp,
            entry.user_id,
            entry.risk_level.to_string(),
            entry.status.to_string(),
            entry.operation,
            entry.paths.len()
        );
        if let Some(error) = &entry.error {
            println!("    error: {error}");
        }
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "required" } else { "not required" }
}

#[allow(clippy::cast_precision_loss)]
fn to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
