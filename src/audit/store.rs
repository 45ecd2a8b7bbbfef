use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};

use super::types::{AuditEntry, AuditStatistics, AuditStatus};
use crate::risk::RiskLevel;

/// Async audit persistence contract.
pub trait AuditStore: Send + Sync {
    fn append<'a>(
        &'a self,
        entry: &'a AuditEntry,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    fn recent<'a>(
        &'a self,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AuditEntry>>> + Send + 'a>>;

    fn by_user<'a>(
        &'a self,
        user_id: &'a str,
        limit: usize,
        offset: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AuditEntry>>> + Send + 'a>>;

    fn since<'a>(
        &'a self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AuditEntry>>> + Send + 'a>>;

    fn high_risk<'a>(
        &'a self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AuditEntry>>> + Send + 'a>>;

    fn failed<'a>(
        &'a self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AuditEntry>>> + Send + 'a>>;

    fn statistics<'a>(
        &'a self,
        user_id: Option<&'a str>,
        days: u32,
    ) -> Pin<Box<dyn Future<Output = Result<AuditStatistics>> + Send + 'a>>;

    fn delete_older_than<'a>(
        &'a self,
        cutoff: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + 'a>>;
}

/// SQLite-backed audit store using sqlx async pool.
pub struct SqliteAuditStore {
    pool: SqlitePool,
}

const AUDIT_SCHEMA_META_TABLE: &str = "
CREATE TABLE IF NOT EXISTS audit_schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
)";
const AUDIT_SCHEMA_VERSION_KEY: &str = "audit_schema_version";
const AUDIT_SCHEMA_VERSION: u32 = 1;

const ENTRY_COLUMNS: &str = "audit_id, timestamp, user_id, operation, risk_level, status, \
     paths, file_count, total_bytes, success, details, snapshot_id, error";

async fn ensure_audit_schema_version(pool: &SqlitePool) -> Result<()> {
    sqlx::query(AUDIT_SCHEMA_META_TABLE)
        .execute(pool)
        .await
        .context("create audit_schema_meta table")?;

    let stored_version: Option<(String,)> =
        sqlx::query_as("SELECT value FROM audit_schema_meta WHERE key = $1")
            .bind(AUDIT_SCHEMA_VERSION_KEY)
            .fetch_optional(pool)
            .await
            .context("load audit schema version")?;

    if let Some((value,)) = stored_version {
        let parsed = value
            .parse::<u32>()
            .with_context(|| format!("invalid audit schema version value: {value}"))?;
        anyhow::ensure!(
            parsed == AUDIT_SCHEMA_VERSION,
            "incompatible audit schema version: stored={parsed}, expected={AUDIT_SCHEMA_VERSION}. \
compatibility is disabled; remove audit DB and restart."
        );
        return Ok(());
    }

    let legacy_table_count: (i64,) = sqlx::query_as(
        "SELECT COUNT(*)
         FROM sqlite_master
         WHERE type = 'table'
           AND name = 'audit_log'",
    )
    .fetch_one(pool)
    .await
    .context("detect legacy audit table")?;

    if legacy_table_count.0 > 0 {
        anyhow::bail!(
            "legacy audit database detected without schema version metadata. \
compatibility is disabled; remove audit DB and restart."
        );
    }

    sqlx::query("INSERT INTO audit_schema_meta (key, value) VALUES ($1, $2)")
        .bind(AUDIT_SCHEMA_VERSION_KEY)
        .bind(AUDIT_SCHEMA_VERSION.to_string())
        .execute(pool)
        .await
        .context("persist audit schema version")?;

    Ok(())
}

impl SqliteAuditStore {
    /// Create a new store with an existing pool and run migrations.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        ensure_audit_schema_version(&pool).await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS audit_log (
                 audit_id TEXT PRIMARY KEY,
                 timestamp TEXT NOT NULL,
                 user_id TEXT NOT NULL,
                 operation TEXT NOT NULL,
                 risk_level TEXT NOT NULL,
                 status TEXT NOT NULL,
                 paths TEXT NOT NULL,
                 file_count INTEGER NOT NULL,
                 total_bytes INTEGER NOT NULL,
                 success INTEGER NOT NULL,
                 details TEXT NOT NULL,
                 snapshot_id TEXT,
                 error TEXT
             )",
        )
        .execute(&pool)
        .await?;

        for index in [
            "CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp)",
            "CREATE INDEX IF NOT EXISTS idx_audit_user ON audit_log(user_id)",
            "CREATE INDEX IF NOT EXISTS idx_audit_operation ON audit_log(operation)",
            "CREATE INDEX IF NOT EXISTS idx_audit_risk ON audit_log(risk_level)",
            "CREATE INDEX IF NOT EXISTS idx_audit_status ON audit_log(status)",
        ] {
            sqlx::query(index).execute(&pool).await?;
        }

        Ok(Self { pool })
    }

    /// Open (creating if missing) a file-backed store at `db_path`.
    pub async fn open(db_path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("open audit database at {}", db_path.display()))?;
        Self::new(pool).await
    }

    /// Access the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn level_to_str(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::Safe => "safe",
        RiskLevel::Low => "low",
        RiskLevel::Medium => "medium",
        RiskLevel::High => "high",
        RiskLevel::Critical => "critical",
    }
}

fn str_to_level(value: &str) -> Result<RiskLevel> {
    match value {
        "safe" => Ok(RiskLevel::Safe),
        "low" => Ok(RiskLevel::Low),
        "medium" => Ok(RiskLevel::Medium),
        "high" => Ok(RiskLevel::High),
        "critical" => Ok(RiskLevel::Critical),
        _ => anyhow::bail!("unknown risk level: {value}"),
    }
}

fn status_to_str(status: AuditStatus) -> &'static str {
    match status {
        AuditStatus::Pending => "pending",
        AuditStatus::Success => "success",
        AuditStatus::Failed => "failed",
        AuditStatus::Denied => "denied",
        AuditStatus::Cancelled => "cancelled",
        AuditStatus::TimedOut => "timed_out",
    }
}

fn str_to_status(value: &str) -> Result<AuditStatus> {
    match value {
        "pending" => Ok(AuditStatus::Pending),
        "success" => Ok(AuditStatus::Success),
        "failed" => Ok(AuditStatus::Failed),
        "denied" => Ok(AuditStatus::Denied),
        "cancelled" => Ok(AuditStatus::Cancelled),
        "timed_out" => Ok(AuditStatus::TimedOut),
        _ => anyhow::bail!("unknown audit status: {value}"),
    }
}

fn map_entry_row(row: &SqliteRow) -> Result<AuditEntry> {
    let level_raw: String = row.try_get("risk_level")?;
    let status_raw: String = row.try_get("status")?;
    let paths_raw: String = row.try_get("paths")?;
    let details_raw: String = row.try_get("details")?;
    let file_count: i64 = row.try_get("file_count")?;
    let total_bytes: i64 = row.try_get("total_bytes")?;
    let success: i64 = row.try_get("success")?;

    Ok(AuditEntry {
        audit_id: row.try_get("audit_id")?,
        timestamp: row.try_get("timestamp")?,
        user_id: row.try_get("user_id")?,
        operation: row.try_get("operation")?,
        risk_level: str_to_level(&level_raw)?,
        status: str_to_status(&status_raw)?,
        paths: serde_json::from_str(&paths_raw).context("deserialize audit paths")?,
        #[allow(clippy::cast_sign_loss)]
        file_count: file_count as u64,
        #[allow(clippy::cast_sign_loss)]
        total_bytes: total_bytes as u64,
        success: success != 0,
        details: serde_json::from_str(&details_raw).context("deserialize audit details")?,
        snapshot_id: row.try_get("snapshot_id")?,
        error: row.try_get("error")?,
    })
}

impl AuditStore for SqliteAuditStore {
    fn append<'a>(
        &'a self,
        entry: &'a AuditEntry,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let paths_json = serde_json::to_string(&entry.paths)?;
            let details_json = serde_json::to_string(&entry.details)?;
            #[allow(clippy::cast_possible_wrap)]
            let file_count_i64 = entry.file_count as i64;
            #[allow(clippy::cast_possible_wrap)]
            let total_bytes_i64 = entry.total_bytes as i64;

            sqlx::query(
                "INSERT INTO audit_log
                 (audit_id, timestamp, user_id, operation, risk_level, status,
                  paths, file_count, total_bytes, success, details, snapshot_id, error)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            )
            .bind(&entry.audit_id)
            .bind(&entry.timestamp)
            .bind(&entry.user_id)
            .bind(&entry.operation)
            .bind(level_to_str(entry.risk_level))
            .bind(status_to_str(entry.status))
            .bind(&paths_json)
            .bind(file_count_i64)
            .bind(total_bytes_i64)
            .bind(i64::from(entry.success))
            .bind(&details_json)
            .bind(entry.snapshot_id.as_deref())
            .bind(entry.error.as_deref())
            .execute(&self.pool)
            .await
            .context("insert audit entry")?;

            Ok(())
        })
    }

    fn recent<'a>(
        &'a self,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AuditEntry>>> + Send + 'a>> {
        Box::pin(async move {
            #[allow(clippy::cast_possible_wrap)]
            let limit_i64 = limit as i64;
            let rows = sqlx::query(&format!(
                "SELECT {ENTRY_COLUMNS} FROM audit_log
                 ORDER BY timestamp DESC
                 LIMIT $1"
            ))
            .bind(limit_i64)
            .fetch_all(&self.pool)
            .await?;

            rows.iter().map(map_entry_row).collect()
        })
    }

    fn by_user<'a>(
        &'a self,
        user_id: &'a str,
        limit: usize,
        offset: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AuditEntry>>> + Send + 'a>> {
        Box::pin(async move {
            #[allow(clippy::cast_possible_wrap)]
            let limit_i64 = limit as i64;
            #[allow(clippy::cast_possible_wrap)]
            let offset_i64 = offset as i64;
            let rows = sqlx::query(&format!(
                "SELECT {ENTRY_COLUMNS} FROM audit_log
                 WHERE user_id = $1
                 ORDER BY timestamp DESC
                 LIMIT $2 OFFSET $3"
            ))
            .bind(user_id)
            .bind(limit_i64)
            .bind(offset_i64)
            .fetch_all(&self.pool)
            .await?;

            rows.iter().map(map_entry_row).collect()
        })
    }

    fn since<'a>(
        &'a self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AuditEntry>>> + Send + 'a>> {
        Box::pin(async move {
            #[allow(clippy::cast_possible_wrap)]
            let limit_i64 = limit as i64;
            let rows = sqlx::query(&format!(
                "SELECT {ENTRY_COLUMNS} FROM audit_log
                 WHERE timestamp > $1
                 ORDER BY timestamp DESC
                 LIMIT $2"
            ))
            .bind(cutoff.to_rfc3339())
            .bind(limit_i64)
            .fetch_all(&self.pool)
            .await?;

            rows.iter().map(map_entry_row).collect()
        })
    }

    fn high_risk<'a>(
        &'a self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AuditEntry>>> + Send + 'a>> {
        Box::pin(async move {
            #[allow(clippy::cast_possible_wrap)]
            let limit_i64 = limit as i64;
            let rows = sqlx::query(&format!(
                "SELECT {ENTRY_COLUMNS} FROM audit_log
                 WHERE timestamp > $1
                   AND risk_level IN ('high', 'critical')
                 ORDER BY timestamp DESC
                 LIMIT $2"
            ))
            .bind(cutoff.to_rfc3339())
            .bind(limit_i64)
            .fetch_all(&self.pool)
            .await?;

            rows.iter().map(map_entry_row).collect()
        })
    }

    fn failed<'a>(
        &'a self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AuditEntry>>> + Send + 'a>> {
        Box::pin(async move {
            #[allow(clippy::cast_possible_wrap)]
            let limit_i64 = limit as i64;
            let rows = sqlx::query(&format!(
                "SELECT {ENTRY_COLUMNS} FROM audit_log
                 WHERE timestamp > $1
                   AND success = 0
                 ORDER BY timestamp DESC
                 LIMIT $2"
            ))
            .bind(cutoff.to_rfc3339())
            .bind(limit_i64)
            .fetch_all(&self.pool)
            .await?;

            rows.iter().map(map_entry_row).collect()
        })
    }

    fn statistics<'a>(
        &'a self,
        user_id: Option<&'a str>,
        days: u32,
    ) -> Pin<Box<dyn Future<Output = Result<AuditStatistics>> + Send + 'a>> {
        Box::pin(async move {
            let cutoff = (Utc::now() - chrono::Duration::days(i64::from(days))).to_rfc3339();
            let user_filter = user_id.unwrap_or("");
            // Empty user filter matches every row via the OR arm.
            let where_clause = "WHERE timestamp > $1 AND ($2 = '' OR user_id = $2)";

            let (total,): (i64,) = sqlx::query_as(&format!(
                "SELECT COUNT(*) FROM audit_log {where_clause}"
            ))
            .bind(&cutoff)
            .bind(user_filter)
            .fetch_one(&self.pool)
            .await?;

            let (successful,): (i64,) = sqlx::query_as(&format!(
                "SELECT COUNT(*) FROM audit_log {where_clause} AND success = 1"
            ))
            .bind(&cutoff)
            .bind(user_filter)
            .fetch_one(&self.pool)
            .await?;

            let risk_rows: Vec<(String, i64)> = sqlx::query_as(&format!(
                "SELECT risk_level, COUNT(*) FROM audit_log {where_clause}
                 GROUP BY risk_level"
            ))
            .bind(&cutoff)
            .bind(user_filter)
            .fetch_all(&self.pool)
            .await?;

            let op_rows: Vec<(String, i64)> = sqlx::query_as(&format!(
                "SELECT operation, COUNT(*) as cnt FROM audit_log {where_clause}
                 GROUP BY operation
                 ORDER BY cnt DESC
                 LIMIT 10"
            ))
            .bind(&cutoff)
            .bind(user_filter)
            .fetch_all(&self.pool)
            .await?;

            let (files, bytes): (Option<i64>, Option<i64>) = sqlx::query_as(&format!(
                "SELECT SUM(file_count), SUM(total_bytes) FROM audit_log {where_clause}"
            ))
            .bind(&cutoff)
            .bind(user_filter)
            .fetch_one(&self.pool)
            .await?;

            #[allow(clippy::cast_sign_loss)]
            let to_u64 = |v: i64| v as u64;
            #[allow(clippy::cast_precision_loss)]
            let success_rate = if total > 0 {
                successful as f64 / total as f64 * 100.0
            } else {
                0.0
            };

            Ok(AuditStatistics {
                period_days: days,
                total_operations: to_u64(total),
                successful_operations: to_u64(successful),
                success_rate,
                risk_distribution: risk_rows
                    .into_iter()
                    .map(|(level, count)| (level, to_u64(count)))
                    .collect(),
                top_operations: op_rows
                    .into_iter()
                    .map(|(op, count)| (op, to_u64(count)))
                    .collect(),
                total_files_processed: files.map_or(0, to_u64),
                total_bytes_processed: bytes.map_or(0, to_u64),
            })
        })
    }

    fn delete_older_than<'a>(
        &'a self,
        cutoff: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + 'a>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM audit_log WHERE timestamp < $1")
                .bind(cutoff.to_rfc3339())
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{
        AUDIT_SCHEMA_META_TABLE, AUDIT_SCHEMA_VERSION_KEY, AuditStore, SqliteAuditStore,
    };
    use crate::audit::types::{AuditEntry, AuditStatus};
    use crate::risk::RiskLevel;
    use chrono::Utc;
    use sqlx::SqlitePool;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> SqliteAuditStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteAuditStore::new(pool).await.unwrap()
    }

    fn entry(user: &str, operation: &str, level: RiskLevel, status: AuditStatus) -> AuditEntry {
        AuditEntry::new(user, operation, level, status, vec!["/tmp/x".into()])
    }

    #[tokio::test]
    async fn append_then_recent_round_trips() {
        let store = store().await;
        let mut written = entry("u1", "delete_files", RiskLevel::High, AuditStatus::Success);
        written.total_bytes = 4096;
        written.snapshot_id = Some("snap-1".into());
        written.details = serde_json::json!({"backup_id": "b-1"});
        store.append(&written).await.unwrap();

        let loaded = store.recent(10).await.unwrap();
        assert_eq!(loaded.len(), 1);
        let got = &loaded[0];
        assert_eq!(got.audit_id, written.audit_id);
        assert_eq!(got.risk_level, RiskLevel::High);
        assert_eq!(got.status, AuditStatus::Success);
        assert_eq!(got.total_bytes, 4096);
        assert_eq!(got.snapshot_id.as_deref(), Some("snap-1"));
        assert_eq!(got.details["backup_id"], "b-1");
    }

    #[tokio::test]
    async fn by_user_filters_and_paginates() {
        let store = store().await;
        for i in 0..3 {
            store
                .append(&entry(
                    "alice",
                    &format!("op_{i}"),
                    RiskLevel::Low,
                    AuditStatus::Success,
                ))
                .await
                .unwrap();
        }
        store
            .append(&entry("bob", "scan_folder", RiskLevel::Safe, AuditStatus::Success))
            .await
            .unwrap();

        let alice = store.by_user("alice", 10, 0).await.unwrap();
        assert_eq!(alice.len(), 3);
        let page = store.by_user("alice", 2, 2).await.unwrap();
        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn high_risk_returns_only_high_and_critical() {
        let store = store().await;
        store
            .append(&entry("u", "scan_folder", RiskLevel::Safe, AuditStatus::Success))
            .await
            .unwrap();
        store
            .append(&entry("u", "delete_files", RiskLevel::High, AuditStatus::Success))
            .await
            .unwrap();
        store
            .append(&entry(
                "u",
                "delete_folder",
                RiskLevel::Critical,
                AuditStatus::Denied,
            ))
            .await
            .unwrap();

        let cutoff = Utc::now() - chrono::Duration::days(1);
        let risky = store.high_risk(cutoff, 10).await.unwrap();
        assert_eq!(risky.len(), 2);
        assert!(risky.iter().all(|e| e.risk_level >= RiskLevel::High));
    }

    #[tokio::test]
    async fn failed_excludes_successes() {
        let store = store().await;
        store
            .append(&entry("u", "move_files", RiskLevel::Low, AuditStatus::Success))
            .await
            .unwrap();
        store
            .append(&entry("u", "move_files", RiskLevel::Low, AuditStatus::Failed))
            .await
            .unwrap();
        store
            .append(&entry("u", "move_files", RiskLevel::Low, AuditStatus::TimedOut))
            .await
            .unwrap();

        let cutoff = Utc::now() - chrono::Duration::days(1);
        let failed = store.failed(cutoff, 10).await.unwrap();
        assert_eq!(failed.len(), 2);
        assert!(failed.iter().all(|e| !e.success));
    }

    #[tokio::test]
    async fn statistics_aggregate_counts_and_rate() {
        let store = store().await;
        let mut big = entry("u", "delete_files", RiskLevel::High, AuditStatus::Success);
        big.file_count = 10;
        big.total_bytes = 1000;
        store.append(&big).await.unwrap();
        store
            .append(&entry("u", "delete_files", RiskLevel::High, AuditStatus::Failed))
            .await
            .unwrap();
        store
            .append(&entry("u", "scan_folder", RiskLevel::Safe, AuditStatus::Success))
            .await
            .unwrap();

        let stats = store.statistics(None, 30).await.unwrap();
        assert_eq!(stats.total_operations, 3);
        assert_eq!(stats.successful_operations, 2);
        assert!((stats.success_rate - 66.66).abs() < 1.0);
        assert!(stats.total_files_processed >= 10);
        assert_eq!(stats.total_bytes_processed, 1000);
        let delete_count = stats
            .top_operations
            .iter()
            .find(|(op, _)| op == "delete_files")
            .map(|(_, n)| *n);
        assert_eq!(delete_count, Some(2));

        let none = store.statistics(Some("nobody"), 30).await.unwrap();
        assert_eq!(none.total_operations, 0);
        assert!(none.success_rate.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn delete_older_than_prunes_expired_rows() {
        let store = store().await;
        let mut old = entry("u", "move_files", RiskLevel::Low, AuditStatus::Success);
        old.timestamp = (Utc::now() - chrono::Duration::days(100)).to_rfc3339();
        store.append(&old).await.unwrap();
        store
            .append(&entry("u", "move_files", RiskLevel::Low, AuditStatus::Success))
            .await
            .unwrap();

        let cutoff = Utc::now() - chrono::Duration::days(90);
        let deleted = store.delete_older_than(cutoff).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.recent(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn new_rejects_legacy_unversioned_audit_database() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query("CREATE TABLE audit_log (audit_id TEXT PRIMARY KEY)")
            .execute(&pool)
            .await
            .unwrap();

        let err = match SqliteAuditStore::new(pool).await {
            Ok(_) => panic!("legacy unversioned audit DB must fail"),
            Err(err) => err,
        };
        assert!(
            err.to_string()
                .contains("legacy audit database detected without schema version metadata"),
            "unexpected error: {err}"
        );
    }

    #[tokio::test]
    async fn new_rejects_audit_schema_version_mismatch() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query(AUDIT_SCHEMA_META_TABLE)
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO audit_schema_meta (key, value) VALUES ($1, $2)")
            .bind(AUDIT_SCHEMA_VERSION_KEY)
            .bind("999")
            .execute(&pool)
            .await
            .unwrap();

        let err = match SqliteAuditStore::new(pool).await {
            Ok(_) => panic!("audit schema version mismatch must fail"),
            Err(err) => err,
        };
        assert!(
            err.to_string().contains("incompatible audit schema version"),
            "unexpected error: {err}"
        );
    }
}
