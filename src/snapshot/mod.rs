//! Reversal records for completed operations.
//!
//! A snapshot stores the mapping needed to undo a mutation: where each file
//! ended up versus where it came from, plus any folders the operation
//! created. Content backups are the backup manager's job; a snapshot only
//! remembers locations.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SnapshotConfig;
use crate::error::{Result, SnapshotError};

/// One moved file: where it is now and where it belongs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileState {
    pub current: String,
    pub original: String,
}

/// Reversal record persisted as one JSON document per id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub snapshot_id: String,
    pub operation: String,
    pub file_states: Vec<FileState>,
    pub folders_created: Vec<String>,
    pub metadata: serde_json::Value,
    pub created_at: String,
}

impl Snapshot {
    /// Moment this snapshot stops being usable for rollback.
    pub fn expires_at(&self, retention_hours: u32) -> Result<DateTime<Utc>> {
        let created = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|err| {
                SnapshotError::Store(format!(
                    "snapshot {} has invalid created_at: {err}",
                    self.snapshot_id
                ))
            })?
            .with_timezone(&Utc);
        Ok(created + chrono::Duration::hours(i64::from(retention_hours)))
    }

    pub fn is_expired(&self, retention_hours: u32) -> Result<bool> {
        Ok(Utc::now() > self.expires_at(retention_hours)?)
    }
}

/// Item-by-item outcome of a rollback. Partial failure is reported, never
/// swallowed.
#[derive(Debug, Clone, Default)]
pub struct RollbackReport {
    pub restored: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    pub folders_removed: usize,
}

impl RollbackReport {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Creates, loads and replays snapshots stored under one directory.
#[derive(Debug, Clone)]
pub struct SnapshotManager {
    dir: PathBuf,
    retention_hours: u32,
}

impl SnapshotManager {
    pub fn new(dir: PathBuf, retention_hours: u32) -> Self {
        Self {
            dir,
            retention_hours,
        }
    }

    pub fn from_config(dir: PathBuf, config: &SnapshotConfig) -> Self {
        Self::new(dir, config.retention_hours)
    }

    /// Persist a new snapshot. The write is flushed to disk before this
    /// returns: the caller may only treat the mutation as undoable once the
    /// record is durable, so persistence failure here is a hard error.
    pub async fn create_snapshot(
        &self,
        operation: &str,
        file_states: Vec<FileState>,
        folders_created: Vec<PathBuf>,
        metadata: serde_json::Value,
    ) -> Result<Snapshot> {
        let snapshot = Snapshot {
            snapshot_id: Uuid::new_v4().to_string(),
            operation: operation.to_string(),
            file_states,
            folders_created: folders_created
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
            metadata,
            created_at: Utc::now().to_rfc3339(),
        };

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|err| SnapshotError::Store(err.to_string()))?;
        let path = self.snapshot_path(&snapshot.snapshot_id);
        let json = serde_json::to_vec_pretty(&snapshot)
            .map_err(|err| SnapshotError::Store(err.to_string()))?;
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|err| SnapshotError::Store(err.to_string()))?;
        file.write_all(&json)
            .await
            .map_err(|err| SnapshotError::Store(err.to_string()))?;
        file.sync_all()
            .await
            .map_err(|err| SnapshotError::Store(err.to_string()))?;

        info!(
            snapshot_id = %snapshot.snapshot_id,
            operation = %snapshot.operation,
            files = snapshot.file_states.len(),
            "snapshot created"
        );
        Ok(snapshot)
    }

    pub async fn load_snapshot(&self, snapshot_id: &str) -> Result<Snapshot> {
        let path = self.snapshot_path(snapshot_id);
        if !path.exists() {
            return Err(SnapshotError::NotFound(snapshot_id.to_string()).into());
        }
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|err| SnapshotError::Store(err.to_string()))?;
        let snapshot = serde_json::from_str(&raw)
            .map_err(|err| SnapshotError::Store(format!("snapshot {snapshot_id}: {err}")))?;
        Ok(snapshot)
    }

    /// Replay a snapshot in reverse: move every file back to its original
    /// location, then remove created folders (deepest first, only if empty).
    ///
    /// Expiry is checked before any file is touched; an expired snapshot
    /// fails without side effects.
    pub async fn rollback(&self, snapshot_id: &str) -> Result<RollbackReport> {
        let snapshot = self.load_snapshot(snapshot_id).await?;
        if snapshot.is_expired(self.retention_hours)? {
            let expired_at = snapshot.expires_at(self.retention_hours)?;
            return Err(SnapshotError::Expired {
                snapshot_id: snapshot_id.to_string(),
                expired_at: expired_at.to_rfc3339(),
            }
            .into());
        }

        let mut report = RollbackReport::default();
        for state in &snapshot.file_states {
            let current = Path::new(&state.current);
            let original = Path::new(&state.original);
            if !current.exists() {
                debug!(path = %current.display(), "already gone, nothing to move back");
                continue;
            }
            if let Some(parent) = original.parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            match tokio::fs::rename(current, original).await {
                Ok(()) => {
                    report.restored += 1;
                    debug!(from = %current.display(), to = %original.display(), "file restored");
                }
                Err(err) => {
                    report.failed += 1;
                    report
                        .errors
                        .push(format!("{}: {err}", current.display()));
                }
            }
        }

        for folder in snapshot.folders_created.iter().rev() {
            let path = Path::new(folder);
            match remove_if_empty(path).await {
                Ok(true) => report.folders_removed += 1,
                Ok(false) => {}
                Err(err) => warn!(folder = %path.display(), error = %err, "folder removal failed"),
            }
        }

        info!(
            snapshot_id = %snapshot_id,
            restored = report.restored,
            failed = report.failed,
            "rollback complete"
        );
        Ok(report)
    }

    /// Delete every expired snapshot document. Returns the removed count.
    pub async fn cleanup_expired(&self) -> Result<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        let mut dir = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|err| SnapshotError::Store(err.to_string()))?;
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|err| SnapshotError::Store(err.to_string()))?
        {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(raw) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            let Ok(snapshot) = serde_json::from_str::<Snapshot>(&raw) else {
                warn!(file = %path.display(), "unreadable snapshot document");
                continue;
            };
            if snapshot.is_expired(self.retention_hours).unwrap_or(false) {
                if let Err(err) = tokio::fs::remove_file(&path).await {
                    warn!(snapshot_id = %snapshot.snapshot_id, error = %err, "cleanup failed");
                } else {
                    info!(snapshot_id = %snapshot.snapshot_id, "expired snapshot removed");
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    fn snapshot_path(&self, snapshot_id: &str) -> PathBuf {
        self.dir.join(format!("{snapshot_id}.json"))
    }
}

async fn remove_if_empty(path: &Path) -> std::io::Result<bool> {
    if !path.is_dir() {
        return Ok(false);
    }
    let mut dir = tokio::fs::read_dir(path).await?;
    if dir.next_entry().await?.is_some() {
        return Ok(false);
    }
    tokio::fs::remove_dir(path).await?;
    Ok(true)
}
