//! The long-lived gate service: policy, risk, backup, confirmation, snapshot
//! and audit wired together behind one object.
//!
//! Every collaborator is an owned instance injected at construction, so tests
//! and embedders can build isolated gates against their own directories.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::audit::{AuditEntry, AuditLogger, AuditStatus};
use crate::backup::{BackupManager, BackupRecord, RestoreReport};
use crate::config::Config;
use crate::confirm::{ConfirmDecision, ConfirmationManager, ConfirmationRequest};
use crate::error::{ResilienceError, Result};
use crate::policy::{BatchDecision, PathDecision, PathIntent, PathPolicy};
use crate::resilience::RateLimiter;
use crate::risk::{OperationKind, OperationParams, RiskAssessment, RiskAssessor, RiskLevel};
use crate::snapshot::{FileState, RollbackReport, Snapshot, SnapshotManager};

/// Outcome of submitting an operation to the gate.
#[derive(Debug, Clone)]
pub enum GateDecision {
    /// Path policy refused the batch. The operation must not execute.
    Blocked {
        decisions: Vec<PathDecision>,
        summary: String,
    },
    /// No confirmation needed. The caller may execute immediately.
    AutoApproved { risk: RiskAssessment },
    /// A challenge is pending. The caller must relay `request.message` and
    /// resolve it through [`FileGate::confirm`].
    ConfirmationRequired { request: ConfirmationRequest },
}

/// Counts from one maintenance sweep across all stores.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MaintenanceReport {
    pub audit_rows_deleted: u64,
    pub backups_removed: usize,
    pub snapshots_removed: usize,
}

pub struct FileGate {
    config: Config,
    policy: PathPolicy,
    assessor: RiskAssessor,
    audit: Arc<AuditLogger>,
    backups: BackupManager,
    snapshots: SnapshotManager,
    confirmations: ConfirmationManager,
    rate: RateLimiter,
}

impl FileGate {
    /// Build a gate from configuration, opening the audit store and the
    /// backup/snapshot directories it points at.
    pub async fn open(config: Config) -> Result<Self> {
        let policy = PathPolicy::from_config(&config.policy);
        let assessor = RiskAssessor::new(config.risk, config.backup.enabled);
        let audit = Arc::new(
            AuditLogger::open(
                &config.audit_dir(),
                config.audit.retention_days,
                &config.resilience,
            )
            .await,
        );
        let backups = BackupManager::from_config(config.backup_dir(), &config.backup);
        let snapshots = SnapshotManager::from_config(config.snapshot_dir(), &config.snapshot);
        let confirmations =
            ConfirmationManager::from_config(&config.confirmation, Arc::clone(&audit));
        let rate = RateLimiter::from_config(&config.resilience);

        info!(warden_dir = %config.warden_dir.display(), "gate opened");
        Ok(Self {
            config,
            policy,
            assessor,
            audit,
            backups,
            snapshots,
            confirmations,
            rate,
        })
    }

    /// Submit an operation for gating: policy, risk, optional backup, then
    /// either auto-approval or a pending confirmation challenge.
    pub async fn request_confirmation(
        &self,
        operation: OperationKind,
        raw_paths: &[String],
        user_id: &str,
        params: OperationParams,
    ) -> Result<GateDecision> {
        if !self.rate.acquire(1) {
            return Err(ResilienceError::RateLimited(1).into());
        }

        let (intent, must_exist) = intent_for(operation);
        let batch = self.policy.validate_batch(raw_paths, intent, must_exist)?;
        if !batch.allowed {
            let summary = batch.rejection_summary();
            self.record_blocked(operation, user_id, &batch, &summary)
                .await;
            return Ok(GateDecision::Blocked {
                decisions: batch.decisions,
                summary,
            });
        }

        let resolved: Vec<PathBuf> = batch.decisions.iter().map(|d| d.resolved.clone()).collect();
        let paths_text: Vec<String> = resolved.iter().map(|p| p.display().to_string()).collect();
        let risk = self
            .assessor
            .assess(operation, &resolved, params, &self.policy);

        if !risk.requires_confirmation {
            let mut entry = AuditEntry::new(
                user_id,
                operation.to_string(),
                risk.level,
                AuditStatus::Success,
                paths_text,
            );
            entry.total_bytes = risk.total_bytes;
            entry.details = serde_json::json!({
                "event": "auto_approved",
                "score": risk.score,
            });
            self.audit.record(entry).await;
            return Ok(GateDecision::AutoApproved { risk });
        }

        let backup_id = if risk.requires_backup {
            self.backup_before(operation, &resolved, user_id, risk.level)
                .await
        } else {
            None
        };

        let request = self
            .confirmations
            .open_request(operation, paths_text, risk, user_id, backup_id)
            .await;
        Ok(GateDecision::ConfirmationRequired { request })
    }

    /// Resolve a pending challenge with the user's free-text response.
    pub async fn confirm(&self, operation_id: &str, response: &str) -> Result<ConfirmDecision> {
        self.confirmations.confirm(operation_id, response).await
    }

    /// Cancel a pending challenge.
    pub async fn cancel(&self, operation_id: &str) -> Result<ConfirmationRequest> {
        self.confirmations.cancel(operation_id).await
    }

    pub fn pending(&self) -> Vec<ConfirmationRequest> {
        self.confirmations.list_pending()
    }

    /// Validate and score an operation without creating backups or pending
    /// state. Risk is only assessed when the batch passes policy.
    pub fn dry_run(
        &self,
        operation: OperationKind,
        raw_paths: &[String],
        params: OperationParams,
    ) -> Result<(BatchDecision, Option<RiskAssessment>)> {
        let (intent, must_exist) = intent_for(operation);
        let batch = self.policy.validate_batch(raw_paths, intent, must_exist)?;
        if !batch.allowed {
            return Ok((batch, None));
        }
        let resolved: Vec<PathBuf> = batch.decisions.iter().map(|d| d.resolved.clone()).collect();
        let risk = self
            .assessor
            .assess(operation, &resolved, params, &self.policy);
        Ok((batch, Some(risk)))
    }

    /// Record the terminal outcome of an approved operation. Returns the
    /// audit id so callers can reference the record.
    pub async fn record_execution(
        &self,
        operation: OperationKind,
        user_id: &str,
        paths: Vec<String>,
        risk_level: RiskLevel,
        snapshot_id: Option<String>,
        error: Option<String>,
    ) -> String {
        let status = if error.is_none() {
            AuditStatus::Success
        } else {
            AuditStatus::Failed
        };
        let mut entry = AuditEntry::new(user_id, operation.to_string(), risk_level, status, paths);
        entry.snapshot_id = snapshot_id;
        entry.error = error;
        entry.details = serde_json::json!({ "event": "executed" });
        self.audit.record(entry).await
    }

    /// Persist the reversal mapping for a just-executed mutation.
    pub async fn create_snapshot(
        &self,
        operation: OperationKind,
        file_states: Vec<FileState>,
        folders_created: Vec<PathBuf>,
        metadata: serde_json::Value,
    ) -> Result<Snapshot> {
        self.snapshots
            .create_snapshot(&operation.to_string(), file_states, folders_created, metadata)
            .await
    }

    /// Reverse a completed operation and audit the attempt.
    pub async fn rollback(&self, snapshot_id: &str, user_id: &str) -> Result<RollbackReport> {
        let report = self.snapshots.rollback(snapshot_id).await?;
        let status = if report.success() {
            AuditStatus::Success
        } else {
            AuditStatus::Failed
        };
        let mut entry =
            AuditEntry::new(user_id, "rollback", RiskLevel::Medium, status, Vec::new());
        entry.snapshot_id = Some(snapshot_id.to_string());
        entry.details = serde_json::json!({
            "event": "rollback",
            "restored": report.restored,
            "failed": report.failed,
            "folders_removed": report.folders_removed,
        });
        self.audit.record(entry).await;
        Ok(report)
    }

    pub async fn create_backup(
        &self,
        paths: &[PathBuf],
        operation: OperationKind,
        user_id: &str,
    ) -> Result<BackupRecord> {
        self.backups
            .create_backup(paths, &operation.to_string(), user_id)
            .await
    }

    /// Restore a backup and audit the attempt.
    pub async fn restore_backup(&self, backup_id: &str, user_id: &str) -> Result<RestoreReport> {
        let report = self.backups.restore_backup(backup_id).await?;
        let status = if report.failures.is_empty() {
            AuditStatus::Success
        } else {
            AuditStatus::Failed
        };
        let mut entry = AuditEntry::new(
            user_id,
            "restore_backup",
            RiskLevel::Medium,
            status,
            Vec::new(),
        );
        entry.details = serde_json::json!({
            "event": "backup_restored",
            "backup_id": backup_id,
            "restored": report.restored,
            "skipped": report.skipped,
            "failures": report.failures,
        });
        self.audit.record(entry).await;
        Ok(report)
    }

    /// Retention and storage-cap sweep across every store. Each sweep is
    /// best-effort; a failing store logs and yields a zero count.
    pub async fn cleanup(&self) -> MaintenanceReport {
        let audit_rows_deleted = match self.audit.cleanup().await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(error = %err, "audit cleanup failed");
                0
            }
        };
        let backups_removed = match self.backups.cleanup().await {
            Ok(count) => count,
            Err(err) => {
                warn!(error = %err, "backup cleanup failed");
                0
            }
        };
        let snapshots_removed = match self.snapshots.cleanup_expired().await {
            Ok(count) => count,
            Err(err) => {
                warn!(error = %err, "snapshot cleanup failed");
                0
            }
        };
        MaintenanceReport {
            audit_rows_deleted,
            backups_removed,
            snapshots_removed,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    pub fn snapshots(&self) -> &SnapshotManager {
        &self.snapshots
    }

    async fn record_blocked(
        &self,
        operation: OperationKind,
        user_id: &str,
        batch: &BatchDecision,
        summary: &str,
    ) {
        let paths = batch
            .decisions
            .iter()
            .map(|d| d.resolved.display().to_string())
            .collect();
        let mut entry = AuditEntry::new(
            user_id,
            operation.to_string(),
            RiskLevel::High,
            AuditStatus::Denied,
            paths,
        );
        entry.details = serde_json::json!({
            "event": "policy_blocked",
            "reasons": summary,
        });
        self.audit.record(entry).await;
        warn!(operation = %operation, user = %user_id, "operation blocked by path policy");
    }

    /// Backup failure never blocks the gated operation; it is flagged in the
    /// audit trail and the challenge proceeds without a backup id.
    async fn backup_before(
        &self,
        operation: OperationKind,
        paths: &[PathBuf],
        user_id: &str,
        risk_level: RiskLevel,
    ) -> Option<String> {
        match self.backups.create_backup(paths, &operation.to_string(), user_id).await {
            Ok(record) => Some(record.id),
            Err(err) => {
                warn!(operation = %operation, error = %err, "pre-operation backup failed");
                let mut entry = AuditEntry::new(
                    user_id,
                    operation.to_string(),
                    risk_level,
                    AuditStatus::Failed,
                    paths.iter().map(|p| p.display().to_string()).collect(),
                );
                entry.error = Some(err.to_string());
                entry.details = serde_json::json!({ "event": "backup_failed" });
                self.audit.record(entry).await;
                None
            }
        }
    }
}

/// Policy intent and existence requirement per operation kind.
fn intent_for(operation: OperationKind) -> (PathIntent, bool) {
    match operation {
        OperationKind::DeleteFiles
        | OperationKind::DeleteFolder
        | OperationKind::DeleteMultipleFolders
        | OperationKind::DeleteMixedItems => (PathIntent::Delete, true),
        OperationKind::MoveFolderContents
        | OperationKind::MoveFiles
        | OperationKind::RenameFile
        | OperationKind::BatchRename
        | OperationKind::OrganizeFolder
        | OperationKind::FlattenFolder => (PathIntent::Modify, true),
        OperationKind::CopyFolderContents | OperationKind::CopyFiles => (PathIntent::Read, true),
        OperationKind::CreateFolder | OperationKind::CreateFile => (PathIntent::Write, false),
        OperationKind::ScanFolder
        | OperationKind::SearchFiles
        | OperationKind::GetFileInfo
        | OperationKind::ReadFileContent
        | OperationKind::PreviewFile => (PathIntent::Read, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    async fn gate_rooted_at(warden: &Path, allowed: &Path) -> FileGate {
        let mut config = Config::load_or_init_at(warden).expect("config");
        config.policy.allowed_roots = vec![allowed.to_string_lossy().into_owned()];
        FileGate::open(config).await.expect("gate")
    }

    fn touch_many(dir: &Path, count: usize) -> Vec<String> {
        (0..count)
            .map(|i| {
                let p = dir.join(format!("f{i}.txt"));
                fs::write(&p, "x").expect("write");
                p.display().to_string()
            })
            .collect()
    }

    #[tokio::test]
    async fn read_only_scan_is_auto_approved() {
        let warden = TempDir::new().expect("tempdir");
        let files = TempDir::new().expect("tempdir");
        let gate = gate_rooted_at(warden.path(), files.path()).await;
        let paths = touch_many(files.path(), 3);

        let decision = gate
            .request_confirmation(
                OperationKind::ScanFolder,
                &paths,
                "u1",
                OperationParams::default(),
            )
            .await
            .expect("decision");
        match decision {
            GateDecision::AutoApproved { risk } => {
                assert_eq!(risk.level, RiskLevel::Safe);
                assert!(!risk.requires_confirmation);
            }
            other => panic!("expected auto-approval, got {other:?}"),
        }
        assert!(gate.pending().is_empty());
    }

    #[tokio::test]
    async fn forbidden_path_is_blocked_and_audited() {
        let warden = TempDir::new().expect("tempdir");
        let files = TempDir::new().expect("tempdir");
        let gate = gate_rooted_at(warden.path(), files.path()).await;
        let outside = TempDir::new().expect("tempdir");
        let stray = outside.path().join("stray.txt");
        fs::write(&stray, "x").expect("write");

        let decision = gate
            .request_confirmation(
                OperationKind::DeleteFiles,
                &[stray.display().to_string()],
                "u1",
                OperationParams::default(),
            )
            .await
            .expect("decision");
        match decision {
            GateDecision::Blocked { summary, .. } => {
                assert!(summary.contains("outside_allowed_roots"));
            }
            other => panic!("expected block, got {other:?}"),
        }

        let recent = gate.audit().recent(10).await.expect("recent");
        assert_eq!(recent[0].status, AuditStatus::Denied);
    }

    #[tokio::test]
    async fn delete_opens_challenge_with_backup() {
        let warden = TempDir::new().expect("tempdir");
        let files = TempDir::new().expect("tempdir");
        let gate = gate_rooted_at(warden.path(), files.path()).await;
        let paths = touch_many(files.path(), 60);

        let decision = gate
            .request_confirmation(
                OperationKind::DeleteFiles,
                &paths,
                "u1",
                OperationParams::default(),
            )
            .await
            .expect("decision");
        let request = match decision {
            GateDecision::ConfirmationRequired { request } => request,
            other => panic!("expected challenge, got {other:?}"),
        };
        assert!(request.risk.requires_backup);
        assert!(request.backup_id.is_some());
        assert_eq!(gate.pending().len(), 1);

        let backups = gate.backups().list_backups(Some("u1"), 1).await.expect("list");
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0].file_count, 60);

        let resolution = gate
            .confirm(&request.operation_id, "yes, confirm")
            .await
            .expect("confirm");
        assert!(resolution.confirmed);
        assert!(gate.pending().is_empty());
    }

    #[tokio::test]
    async fn executed_operation_can_be_rolled_back() {
        let warden = TempDir::new().expect("tempdir");
        let files = TempDir::new().expect("tempdir");
        let gate = gate_rooted_at(warden.path(), files.path()).await;

        let original = files.path().join("report.txt");
        let moved = files.path().join("archive").join("report.txt");
        fs::create_dir_all(files.path().join("archive")).expect("mkdir");
        fs::write(&original, "contents").expect("write");
        fs::rename(&original, &moved).expect("rename");

        let snapshot = gate
            .create_snapshot(
                OperationKind::MoveFiles,
                vec![FileState {
                    current: moved.display().to_string(),
                    original: original.display().to_string(),
                }],
                vec![files.path().join("archive")],
                serde_json::Value::Null,
            )
            .await
            .expect("snapshot");

        let report = gate
            .rollback(&snapshot.snapshot_id, "u1")
            .await
            .expect("rollback");
        assert!(report.success());
        assert!(original.exists());
        assert!(!moved.exists());
    }

    #[tokio::test]
    async fn dry_run_creates_no_state() {
        let warden = TempDir::new().expect("tempdir");
        let files = TempDir::new().expect("tempdir");
        let gate = gate_rooted_at(warden.path(), files.path()).await;
        let paths = touch_many(files.path(), 60);

        let (batch, risk) = gate
            .dry_run(
                OperationKind::DeleteFiles,
                &paths,
                OperationParams::default(),
            )
            .expect("dry run");
        assert!(batch.allowed);
        assert!(risk.expect("risk").requires_confirmation);
        assert!(gate.pending().is_empty());
        let backups = gate.backups().list_backups(None, 1).await.expect("list");
        assert!(backups.is_empty());
    }

    #[tokio::test]
    async fn cleanup_reports_counts() {
        let warden = TempDir::new().expect("tempdir");
        let files = TempDir::new().expect("tempdir");
        let gate = gate_rooted_at(warden.path(), files.path()).await;
        let report = gate.cleanup().await;
        assert_eq!(report.backups_removed, 0);
        assert_eq!(report.snapshots_removed, 0);
    }
}
