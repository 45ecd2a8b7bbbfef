//! Content backups taken before destructive operations.
//!
//! Each backup is a directory under the backup root holding copies of the
//! affected paths plus a `metadata.json` document describing them. The
//! metadata file is written last, so a record on disk always describes a
//! fully written backup.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::BackupConfig;
use crate::error::{BackupError, Result};

const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
}

/// One backed-up path inside a backup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupEntry {
    pub original: String,
    pub backup: String,
    pub kind: EntryKind,
    pub bytes: u64,
}

/// Metadata document stored alongside the copied content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: String,
    pub timestamp: String,
    pub operation: String,
    pub user_id: String,
    pub entries: Vec<BackupEntry>,
    pub total_bytes: u64,
    pub file_count: u64,
}

/// Item-by-item outcome of a restore.
#[derive(Debug, Clone, Default)]
pub struct RestoreReport {
    pub restored: usize,
    pub skipped: usize,
    pub failures: Vec<String>,
}

/// Aggregate storage usage across all backups.
#[derive(Debug, Clone, Serialize)]
pub struct StorageInfo {
    pub backup_count: usize,
    pub total_files: u64,
    pub total_bytes: u64,
    pub limit_bytes: u64,
    pub usage_percent: f64,
}

/// Copies path content aside before a destructive operation runs.
///
/// The sweep guard serializes backup creation against the eviction sweeps,
/// so a backup mid-write is never considered for deletion.
#[derive(Debug)]
pub struct BackupManager {
    root: PathBuf,
    max_total_bytes: u64,
    retention_days: u32,
    guard: Mutex<()>,
}

impl BackupManager {
    pub fn new(root: PathBuf, max_total_bytes: u64, retention_days: u32) -> Self {
        Self {
            root,
            max_total_bytes,
            retention_days,
            guard: Mutex::new(()),
        }
    }

    pub fn from_config(root: PathBuf, config: &BackupConfig) -> Self {
        Self::new(root, config.max_total_bytes, config.retention_days)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Copy `paths` into a new backup. A path that is missing or fails to
    /// copy is logged and skipped; the backup still covers the rest. The
    /// metadata write is the commit point.
    pub async fn create_backup(
        &self,
        paths: &[PathBuf],
        operation: &str,
        user_id: &str,
    ) -> Result<BackupRecord> {
        let record = {
            let _guard = self.guard.lock().await;

            let now = Utc::now();
            let suffix = Uuid::new_v4().simple().to_string();
            let id = format!(
                "backup_{}_{}_{}",
                now.format("%Y%m%d_%H%M%S"),
                operation,
                &suffix[..8]
            );
            let backup_dir = self.root.join(&id);
            tokio::fs::create_dir_all(&backup_dir)
                .await
                .map_err(BackupError::Io)?;

            let mut record = BackupRecord {
                id: id.clone(),
                timestamp: now.to_rfc3339(),
                operation: operation.to_string(),
                user_id: user_id.to_string(),
                entries: Vec::new(),
                total_bytes: 0,
                file_count: 0,
            };

            for path in paths {
                if !path.exists() {
                    warn!(path = %path.display(), "path missing, skipping backup");
                    continue;
                }
                let target = backup_dir.join(safe_relative(path));
                if let Some(parent) = target.parent() {
                    if let Err(err) = tokio::fs::create_dir_all(parent).await {
                        warn!(path = %path.display(), error = %err, "backup copy failed");
                        continue;
                    }
                }

                let copied = if path.is_dir() {
                    copy_dir_recursive(path, &target)
                        .await
                        .map(|(bytes, files)| (bytes, files, EntryKind::Directory))
                } else {
                    tokio::fs::copy(path, &target)
                        .await
                        .map(|bytes| (bytes, 1, EntryKind::File))
                };

                match copied {
                    Ok((bytes, files, kind)) => {
                        record.total_bytes += bytes;
                        record.file_count += files;
                        record.entries.push(BackupEntry {
                            original: path.display().to_string(),
                            backup: target.display().to_string(),
                            kind,
                            bytes,
                        });
                    }
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "backup copy failed");
                    }
                }
            }

            self.write_record(&record).await?;
            info!(
                backup_id = %record.id,
                files = record.file_count,
                bytes = record.total_bytes,
                "backup created"
            );
            record
        };

        if let Err(err) = self.cleanup().await {
            warn!(error = %err, "backup sweep after creation failed");
        }
        Ok(record)
    }

    /// Reverse-copy every entry of `backup_id` onto its original location,
    /// removing whatever currently occupies it first. Partial failures are
    /// reported per item, never silently swallowed.
    pub async fn restore_backup(&self, backup_id: &str) -> Result<RestoreReport> {
        let record = self
            .load_record(backup_id)
            .await?
            .ok_or_else(|| BackupError::NotFound(backup_id.to_string()))?;

        let mut report = RestoreReport::default();
        for entry in &record.entries {
            let backup_path = PathBuf::from(&entry.backup);
            let original = PathBuf::from(&entry.original);

            if !backup_path.exists() {
                warn!(path = %backup_path.display(), "backup content missing");
                report.skipped += 1;
                continue;
            }

            if let Err(err) = remove_existing(&original).await {
                report
                    .failures
                    .push(format!("{}: {err}", original.display()));
                continue;
            }

            let restored = match entry.kind {
                EntryKind::File => {
                    if let Some(parent) = original.parent() {
                        tokio::fs::create_dir_all(parent).await.ok();
                    }
                    tokio::fs::copy(&backup_path, &original).await.map(|_| ())
                }
                EntryKind::Directory => copy_dir_recursive(&backup_path, &original)
                    .await
                    .map(|_| ()),
            };
            match restored {
                Ok(()) => report.restored += 1,
                Err(err) => report
                    .failures
                    .push(format!("{}: {err}", original.display())),
            }
        }

        info!(
            backup_id = %backup_id,
            restored = report.restored,
            skipped = report.skipped,
            failed = report.failures.len(),
            "backup restored"
        );
        Ok(report)
    }

    /// Backups within the last `days`, newest first, optionally filtered by
    /// user.
    pub async fn list_backups(
        &self,
        user_id: Option<&str>,
        days: u32,
    ) -> Result<Vec<BackupRecord>> {
        let cutoff = (Utc::now() - chrono::Duration::days(i64::from(days))).to_rfc3339();
        let mut records: Vec<BackupRecord> = self
            .load_all()
            .await?
            .into_iter()
            .filter(|r| r.timestamp >= cutoff)
            .filter(|r| user_id.is_none_or(|u| r.user_id == u))
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    /// Delete one backup. Returns false if it did not exist.
    pub async fn delete_backup(&self, backup_id: &str) -> Result<bool> {
        let _guard = self.guard.lock().await;
        self.remove_backup_dir(backup_id).await
    }

    /// Run both eviction sweeps: oldest-first until under the storage cap,
    /// then anything older than the retention window. Returns the number of
    /// backups deleted.
    pub async fn cleanup(&self) -> Result<usize> {
        let _guard = self.guard.lock().await;

        let mut records = self.load_all().await?;
        records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        let mut total: u64 = records.iter().map(|r| r.total_bytes).sum();
        let mut deleted = 0;

        while total > self.max_total_bytes && !records.is_empty() {
            let oldest = records.remove(0);
            total = total.saturating_sub(oldest.total_bytes);
            if self.remove_backup_dir(&oldest.id).await? {
                info!(backup_id = %oldest.id, "evicted backup over storage cap");
                deleted += 1;
            }
        }

        let cutoff =
            (Utc::now() - chrono::Duration::days(i64::from(self.retention_days))).to_rfc3339();
        for record in records {
            if record.timestamp < cutoff && self.remove_backup_dir(&record.id).await? {
                info!(backup_id = %record.id, "removed expired backup");
                deleted += 1;
            }
        }

        Ok(deleted)
    }

    pub async fn storage_info(&self) -> Result<StorageInfo> {
        let records = self.load_all().await?;
        let total_bytes: u64 = records.iter().map(|r| r.total_bytes).sum();
        let total_files: u64 = records.iter().map(|r| r.file_count).sum();
        #[allow(clippy::cast_precision_loss)]
        let usage_percent = if self.max_total_bytes > 0 {
            total_bytes as f64 / self.max_total_bytes as f64 * 100.0
        } else {
            0.0
        };
        Ok(StorageInfo {
            backup_count: records.len(),
            total_files,
            total_bytes,
            limit_bytes: self.max_total_bytes,
            usage_percent,
        })
    }

    async fn write_record(&self, record: &BackupRecord) -> Result<()> {
        let path = self.root.join(&record.id).join(METADATA_FILE);
        let json = serde_json::to_vec_pretty(record).map_err(|err| BackupError::Metadata {
            backup_id: record.id.clone(),
            message: err.to_string(),
        })?;
        tokio::fs::write(&path, json)
            .await
            .map_err(BackupError::Io)?;
        Ok(())
    }

    async fn load_record(&self, backup_id: &str) -> Result<Option<BackupRecord>> {
        let path = self.root.join(backup_id).join(METADATA_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(BackupError::Io)?;
        let record = serde_json::from_str(&raw).map_err(|err| BackupError::Metadata {
            backup_id: backup_id.to_string(),
            message: err.to_string(),
        })?;
        Ok(Some(record))
    }

    async fn load_all(&self) -> Result<Vec<BackupRecord>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.root)
            .await
            .map_err(BackupError::Io)?;
        while let Some(item) = dir.next_entry().await.map_err(BackupError::Io)? {
            if !item.file_type().await.map_err(BackupError::Io)?.is_dir() {
                continue;
            }
            let Some(id) = item.file_name().to_str().map(str::to_string) else {
                continue;
            };
            match self.load_record(&id).await {
                Ok(Some(record)) => records.push(record),
                // No metadata: in-progress or orphaned, leave it alone.
                Ok(None) => {}
                Err(err) => warn!(backup_id = %id, error = %err, "unreadable backup metadata"),
            }
        }
        Ok(records)
    }

    async fn remove_backup_dir(&self, backup_id: &str) -> Result<bool> {
        let path = self.root.join(backup_id);
        if !path.exists() {
            return Ok(false);
        }
        tokio::fs::remove_dir_all(&path)
            .await
            .map_err(BackupError::Io)?;
        Ok(true)
    }
}

/// Mirror an absolute path under the backup directory: drop root and drive
/// prefixes, keep the rest of the component chain.
fn safe_relative(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| {
            !matches!(
                c,
                std::path::Component::RootDir | std::path::Component::Prefix(_)
            )
        })
        .collect()
}

async fn remove_existing(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        return Ok(());
    }
    if path.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    }
}

/// Copy a directory tree, returning (bytes, files) copied. Symlinks are
/// skipped.
async fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<(u64, u64)> {
    let mut bytes = 0u64;
    let mut files = 0u64;
    let mut stack = vec![(src.to_path_buf(), dst.to_path_buf())];
    while let Some((from, to)) = stack.pop() {
        tokio::fs::create_dir_all(&to).await?;
        let mut dir = tokio::fs::read_dir(&from).await?;
        while let Some(item) = dir.next_entry().await? {
            let file_type = item.file_type().await?;
            let target = to.join(item.file_name());
            if file_type.is_dir() {
                stack.push((item.path(), target));
            } else if file_type.is_file() {
                bytes += tokio::fs::copy(item.path(), &target).await?;
                files += 1;
            }
        }
    }
    Ok((bytes, files))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WardenError;

    fn manager(root: &Path) -> BackupManager {
        BackupManager::new(root.to_path_buf(), 5 * 1024 * 1024 * 1024, 30)
    }

    async fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.expect("mkdir");
        }
        tokio::fs::write(path, content).await.expect("write");
    }

    #[tokio::test]
    async fn create_backup_copies_files_and_records_sizes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let data = dir.path().join("data");
        write_file(&data.join("a.txt"), "hello").await;
        write_file(&data.join("nested/b.txt"), "world!").await;
        let single = dir.path().join("single.txt");
        write_file(&single, "xyz").await;

        let mgr = manager(&dir.path().join("backups"));
        let record = mgr
            .create_backup(&[data.clone(), single.clone()], "delete_files", "u1")
            .await
            .expect("backup");

        assert!(record.id.starts_with("backup_"));
        assert_eq!(record.entries.len(), 2);
        assert_eq!(record.file_count, 3);
        assert_eq!(record.total_bytes, 5 + 6 + 3);
        let dir_entry = record
            .entries
            .iter()
            .find(|e| e.kind == EntryKind::Directory)
            .expect("directory entry");
        assert!(PathBuf::from(&dir_entry.backup).join("nested/b.txt").exists());
    }

    #[tokio::test]
    async fn missing_paths_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let real = dir.path().join("real.txt");
        write_file(&real, "keep").await;
        let mgr = manager(&dir.path().join("backups"));

        let record = mgr
            .create_backup(
                &[real, dir.path().join("ghost.txt")],
                "move_files",
                "u1",
            )
            .await
            .expect("backup");
        assert_eq!(record.entries.len(), 1);
        assert_eq!(record.file_count, 1);
    }

    #[tokio::test]
    async fn restore_overwrites_current_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("doc.txt");
        write_file(&file, "original").await;
        let mgr = manager(&dir.path().join("backups"));
        let record = mgr
            .create_backup(std::slice::from_ref(&file), "rename_file", "u1")
            .await
            .expect("backup");

        write_file(&file, "clobbered").await;
        let report = mgr.restore_backup(&record.id).await.expect("restore");
        assert_eq!(report.restored, 1);
        assert!(report.failures.is_empty());
        let content = tokio::fs::read_to_string(&file).await.expect("read");
        assert_eq!(content, "original");
    }

    #[tokio::test]
    async fn restore_recreates_deleted_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let data = dir.path().join("project");
        write_file(&data.join("src/main.rs"), "fn main() {}").await;
        let mgr = manager(&dir.path().join("backups"));
        let record = mgr
            .create_backup(std::slice::from_ref(&data), "delete_folder", "u1")
            .await
            .expect("backup");

        tokio::fs::remove_dir_all(&data).await.expect("delete");
        let report = mgr.restore_backup(&record.id).await.expect("restore");
        assert_eq!(report.restored, 1);
        assert!(data.join("src/main.rs").exists());
    }

    #[tokio::test]
    async fn restore_unknown_id_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mgr = manager(&dir.path().join("backups"));
        let err = mgr.restore_backup("backup_nope").await.expect_err("missing");
        assert!(matches!(
            err,
            WardenError::Backup(BackupError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_backups_filters_by_user() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("f.txt");
        write_file(&file, "x").await;
        let mgr = manager(&dir.path().join("backups"));
        mgr.create_backup(std::slice::from_ref(&file), "op", "alice")
            .await
            .expect("backup");
        mgr.create_backup(std::slice::from_ref(&file), "op", "bob")
            .await
            .expect("backup");

        assert_eq!(mgr.list_backups(None, 30).await.expect("list").len(), 2);
        let alice = mgr.list_backups(Some("alice"), 30).await.expect("list");
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].user_id, "alice");
    }

    #[tokio::test]
    async fn storage_cap_evicts_oldest_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("big.txt");
        write_file(&file, &"x".repeat(600)).await;
        // Cap fits one 600-byte backup but not two.
        let mgr = BackupManager::new(dir.path().join("backups"), 1000, 30);

        let first = mgr
            .create_backup(std::slice::from_ref(&file), "op", "u1")
            .await
            .expect("backup");
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let second = mgr
            .create_backup(std::slice::from_ref(&file), "op", "u1")
            .await
            .expect("backup");

        let remaining = mgr.list_backups(None, 30).await.expect("list");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, second.id);
        assert!(!dir.path().join("backups").join(&first.id).exists());
    }

    #[tokio::test]
    async fn retention_sweep_removes_old_backups() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("f.txt");
        write_file(&file, "x").await;
        let mgr = manager(&dir.path().join("backups"));
        let record = mgr
            .create_backup(std::slice::from_ref(&file), "op", "u1")
            .await
            .expect("backup");

        // Age the record past the retention window.
        let mut aged = record.clone();
        aged.timestamp = (Utc::now() - chrono::Duration::days(31)).to_rfc3339();
        mgr.write_record(&aged).await.expect("rewrite");

        let deleted = mgr.cleanup().await.expect("cleanup");
        assert_eq!(deleted, 1);
        assert!(mgr.list_backups(None, 365).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn storage_info_aggregates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("f.txt");
        write_file(&file, "abcd").await;
        let mgr = manager(&dir.path().join("backups"));
        mgr.create_backup(std::slice::from_ref(&file), "op", "u1")
            .await
            .expect("backup");

        let info = mgr.storage_info().await.expect("info");
        assert_eq!(info.backup_count, 1);
        assert_eq!(info.total_files, 1);
        assert_eq!(info.total_bytes, 4);
        assert!(info.usage_percent > 0.0);
    }

    #[test]
    fn safe_relative_strips_root() {
        assert_eq!(
            safe_relative(Path::new("/home/user/docs")),
            PathBuf::from("home/user/docs")
        );
    }
}
