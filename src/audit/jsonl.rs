use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::io::AsyncWriteExt;

use super::types::AuditEntry;

/// Daily-rotated line-delimited mirror of the audit trail.
///
/// Secondary write path: the sqlite store is authoritative, this file exists
/// so the trail stays greppable and survives a broken database.
#[derive(Debug, Clone)]
pub struct JsonlAuditLog {
    dir: PathBuf,
}

impl JsonlAuditLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the file entries are appended to today.
    pub fn current_file(&self) -> PathBuf {
        let day = Utc::now().format("%Y-%m-%d");
        self.dir.join(format!("audit_{day}.jsonl"))
    }

    /// Append one entry as a single JSON line.
    pub async fn append(&self, entry: &AuditEntry) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("create audit directory {}", self.dir.display()))?;

        let mut line = serde_json::to_string(entry).context("serialize audit entry")?;
        line.push('\n');

        let path = self.current_file();
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("open audit log {}", path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("append to audit log {}", path.display()))?;
        file.flush().await?;
        Ok(())
    }

    /// Newest-first entries from today's file. Read fallback for when the
    /// sqlite store is unavailable; unparseable lines are skipped.
    pub async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        let path = self.current_file();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("read audit log {}", path.display()))?;
        let mut entries: Vec<AuditEntry> = raw
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        entries.reverse();
        entries.truncate(limit);
        Ok(entries)
    }

    /// Delete rotated files whose date component is older than `cutoff_day`
    /// (a `%Y-%m-%d` string). Returns the number of files removed.
    pub async fn delete_files_before(&self, cutoff_day: &str) -> Result<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        let mut dir = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("read audit directory {}", self.dir.display()))?;
        while let Some(item) = dir.next_entry().await? {
            let name = item.file_name();
            if let Some(day) = file_day(Path::new(&name)) {
                if day.as_str() < cutoff_day {
                    tokio::fs::remove_file(item.path()).await?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

fn file_day(name: &Path) -> Option<String> {
    let stem = name.file_name()?.to_str()?;
    let day = stem.strip_prefix("audit_")?.strip_suffix(".jsonl")?;
    Some(day.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::types::AuditStatus;
    use crate::risk::RiskLevel;

    fn entry(operation: &str) -> AuditEntry {
        AuditEntry::new(
            "u1",
            operation,
            RiskLevel::Low,
            AuditStatus::Success,
            vec!["/tmp/a".into()],
        )
    }

    #[tokio::test]
    async fn append_and_read_back_newest_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = JsonlAuditLog::new(dir.path());

        log.append(&entry("first")).await.expect("append");
        log.append(&entry("second")).await.expect("append");

        let entries = log.recent(10).await.expect("recent");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].operation, "second");
        assert_eq!(entries[1].operation, "first");
    }

    #[tokio::test]
    async fn recent_skips_corrupt_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = JsonlAuditLog::new(dir.path());
        log.append(&entry("good")).await.expect("append");
        tokio::fs::write(
            log.current_file(),
            format!(
                "{}\nnot json at all\n",
                serde_json::to_string(&entry("kept")).expect("json")
            ),
        )
        .await
        .expect("write");

        let entries = log.recent(10).await.expect("recent");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].operation, "kept");
    }

    #[tokio::test]
    async fn recent_on_missing_file_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = JsonlAuditLog::new(dir.path().join("nested"));
        assert!(log.recent(5).await.expect("recent").is_empty());
    }

    #[tokio::test]
    async fn delete_files_before_removes_only_older_days() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = JsonlAuditLog::new(dir.path());
        tokio::fs::create_dir_all(dir.path()).await.expect("mkdir");
        for day in ["2020-01-01", "2020-06-01", "2099-01-01"] {
            tokio::fs::write(dir.path().join(format!("audit_{day}.jsonl")), "{}\n")
                .await
                .expect("write");
        }
        tokio::fs::write(dir.path().join("unrelated.txt"), "x")
            .await
            .expect("write");

        let removed = log
            .delete_files_before("2020-07-01")
            .await
            .expect("cleanup");
        assert_eq!(removed, 2);
        assert!(dir.path().join("audit_2099-01-01.jsonl").exists());
        assert!(dir.path().join("unrelated.txt").exists());
    }
}
