use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, warn};

use super::jsonl::JsonlAuditLog;
use super::store::{AuditStore, SqliteAuditStore};
use super::types::{AuditEntry, AuditStatistics};
use crate::config::ResilienceConfig;
use crate::error::{AuditError, Result};
use crate::resilience::CircuitBreaker;

const EXPORT_FETCH_LIMIT: usize = 100_000;

/// Dual-backend audit facade: authoritative sqlite store plus a JSONL mirror.
///
/// Writes are best-effort on both backends. A gating decision never waits on
/// or fails because of an audit write; the sqlite path is guarded by a
/// circuit breaker so a broken database stops costing a connection attempt
/// per entry.
pub struct AuditLogger {
    store: Option<Box<dyn AuditStore>>,
    mirror: JsonlAuditLog,
    breaker: CircuitBreaker,
    retention_days: u32,
}

impl AuditLogger {
    pub fn new(
        store: Option<Box<dyn AuditStore>>,
        mirror: JsonlAuditLog,
        breaker: CircuitBreaker,
        retention_days: u32,
    ) -> Self {
        Self {
            store,
            mirror,
            breaker,
            retention_days,
        }
    }

    /// Open the audit directory layout: `audit.db` plus daily JSONL files.
    /// A database that cannot be opened degrades to mirror-only logging.
    pub async fn open(
        audit_dir: &Path,
        retention_days: u32,
        resilience: &ResilienceConfig,
    ) -> Self {
        if let Err(err) = tokio::fs::create_dir_all(audit_dir).await {
            warn!(dir = %audit_dir.display(), error = %err, "cannot create audit directory");
        }
        let db_path = audit_dir.join("audit.db");
        let store: Option<Box<dyn AuditStore>> = match SqliteAuditStore::open(&db_path).await {
            Ok(store) => Some(Box::new(store)),
            Err(err) => {
                warn!(
                    db = %db_path.display(),
                    error = %err,
                    "audit database unavailable, logging to JSONL mirror only"
                );
                None
            }
        };
        Self::new(
            store,
            JsonlAuditLog::new(audit_dir),
            CircuitBreaker::from_config("audit-store", resilience),
            retention_days,
        )
    }

    /// Record one entry on both backends. Never fails: backend errors are
    /// logged and swallowed so the caller's pipeline continues.
    pub async fn record(&self, entry: AuditEntry) -> String {
        let audit_id = entry.audit_id.clone();

        if let Some(store) = &self.store {
            match self.breaker.check() {
                Ok(()) => match store.append(&entry).await {
                    Ok(()) => self.breaker.on_success(),
                    Err(err) => {
                        self.breaker.on_failure();
                        warn!(audit_id = %audit_id, error = %err, "audit store write failed");
                    }
                },
                Err(err) => {
                    warn!(audit_id = %audit_id, error = %err, "audit store skipped");
                }
            }
        }

        if let Err(err) = self.mirror.append(&entry).await {
            warn!(audit_id = %audit_id, error = %err, "audit mirror write failed");
        }

        info!(
            audit_id = %audit_id,
            operation = %entry.operation,
            status = %entry.status,
            user = %entry.user_id,
            "audit recorded"
        );
        audit_id
    }

    /// Newest-first entries, from the store when healthy, otherwise from
    /// today's mirror file.
    pub async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        if let Some(store) = &self.store {
            if self.breaker.check().is_ok() {
                match store.recent(limit).await {
                    Ok(entries) => {
                        self.breaker.on_success();
                        return Ok(entries);
                    }
                    Err(err) => {
                        self.breaker.on_failure();
                        warn!(error = %err, "audit store read failed, using mirror");
                    }
                }
            }
        }
        self.mirror
            .recent(limit)
            .await
            .map_err(|err| AuditError::Query(err.to_string()).into())
    }

    pub async fn by_user(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AuditEntry>> {
        let store = self.require_store()?;
        store
            .by_user(user_id, limit, offset)
            .await
            .map_err(query_error)
    }

    pub async fn within_hours(&self, hours: u32, limit: usize) -> Result<Vec<AuditEntry>> {
        let store = self.require_store()?;
        let cutoff = Utc::now() - chrono::Duration::hours(i64::from(hours));
        store.since(cutoff, limit).await.map_err(query_error)
    }

    pub async fn high_risk(&self, days: u32, limit: usize) -> Result<Vec<AuditEntry>> {
        let store = self.require_store()?;
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
        store.high_risk(cutoff, limit).await.map_err(query_error)
    }

    pub async fn failed(&self, days: u32, limit: usize) -> Result<Vec<AuditEntry>> {
        let store = self.require_store()?;
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
        store.failed(cutoff, limit).await.map_err(query_error)
    }

    pub async fn statistics(
        &self,
        user_id: Option<&str>,
        days: u32,
    ) -> Result<AuditStatistics> {
        let store = self.require_store()?;
        store.statistics(user_id, days).await.map_err(query_error)
    }

    /// Retention sweep over both backends. Returns deleted store rows.
    pub async fn cleanup(&self) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(self.retention_days));
        let cutoff_day = cutoff.format("%Y-%m-%d").to_string();

        match self.mirror.delete_files_before(&cutoff_day).await {
            Ok(files) if files > 0 => info!(files, "removed rotated audit files"),
            Ok(_) => {}
            Err(err) => warn!(error = %err, "audit mirror cleanup failed"),
        }

        let store = self.require_store()?;
        let deleted = store.delete_older_than(cutoff).await.map_err(query_error)?;
        info!(deleted, retention_days = self.retention_days, "audit retention sweep");
        Ok(deleted)
    }

    /// Export filtered entries as a pretty-printed JSON array.
    pub async fn export(
        &self,
        output: &Path,
        user_id: Option<&str>,
        days: u32,
    ) -> Result<usize> {
        let store = self.require_store()?;
        let entries = match user_id {
            Some(user) => store
                .by_user(user, EXPORT_FETCH_LIMIT, 0)
                .await
                .map_err(query_error)?,
            None => {
                let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
                store
                    .since(cutoff, EXPORT_FETCH_LIMIT)
                    .await
                    .map_err(query_error)?
            }
        };
        let json = serde_json::to_vec_pretty(&entries)
            .map_err(|err| AuditError::Query(err.to_string()))?;
        tokio::fs::write(output, json)
            .await
            .map_err(|err| AuditError::Query(err.to_string()))?;
        info!(count = entries.len(), path = %output.display(), "exported audit entries");
        Ok(entries.len())
    }

    /// Today's mirror file path, for diagnostics output.
    pub fn mirror_file(&self) -> PathBuf {
        self.mirror.current_file()
    }

    fn require_store(&self) -> Result<&dyn AuditStore> {
        self.store
            .as_deref()
            .ok_or_else(|| AuditError::StoreUnavailable("audit database not open".into()).into())
    }
}

fn query_error(err: anyhow::Error) -> crate::error::WardenError {
    AuditError::Query(err.to_string()).into()
}
