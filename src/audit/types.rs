use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::risk::RiskLevel;

/// Terminal and intermediate outcomes recorded for a gated operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditStatus {
    Pending,
    Success,
    Failed,
    Denied,
    Cancelled,
    TimedOut,
}

impl AuditStatus {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// One append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub audit_id: String,
    /// RFC 3339 UTC timestamp. Stored as TEXT; lexical order matches
    /// chronological order because every writer uses the same format.
    pub timestamp: String,
    pub user_id: String,
    pub operation: String,
    pub risk_level: RiskLevel,
    pub status: AuditStatus,
    pub paths: Vec<String>,
    pub file_count: u64,
    pub total_bytes: u64,
    pub success: bool,
    pub details: serde_json::Value,
    pub snapshot_id: Option<String>,
    pub error: Option<String>,
}

impl AuditEntry {
    /// Build a record with a fresh id and current timestamp. Optional fields
    /// start empty and are filled in by the caller before the write.
    pub fn new(
        user_id: impl Into<String>,
        operation: impl Into<String>,
        risk_level: RiskLevel,
        status: AuditStatus,
        paths: Vec<String>,
    ) -> Self {
        Self {
            audit_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().to_rfc3339(),
            user_id: user_id.into(),
            operation: operation.into(),
            risk_level,
            status,
            file_count: paths.len() as u64,
            paths,
            total_bytes: 0,
            success: status.is_success(),
            details: serde_json::Value::Null,
            snapshot_id: None,
            error: None,
        }
    }
}

/// Aggregate view over a query window, for the `audit stats` surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditStatistics {
    pub period_days: u32,
    pub total_operations: u64,
    pub successful_operations: u64,
    /// Percentage in `[0, 100]`; zero when the window is empty.
    pub success_rate: f64,
    pub risk_distribution: Vec<(String, u64)>,
    pub top_operations: Vec<(String, u64)>,
    pub total_files_processed: u64,
    pub total_bytes_processed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entry_derives_success_and_count() {
        let entry = AuditEntry::new(
            "user-1",
            "delete_files",
            RiskLevel::High,
            AuditStatus::Success,
            vec!["/tmp/a".into(), "/tmp/b".into()],
        );
        assert!(entry.success);
        assert_eq!(entry.file_count, 2);
        assert!(!entry.audit_id.is_empty());
    }

    #[test]
    fn non_success_statuses_flag_failure() {
        for status in [
            AuditStatus::Failed,
            AuditStatus::Denied,
            AuditStatus::Cancelled,
            AuditStatus::TimedOut,
            AuditStatus::Pending,
        ] {
            let entry =
                AuditEntry::new("u", "scan_folder", RiskLevel::Safe, status, Vec::new());
            assert!(!entry.success, "{status} must not count as success");
        }
    }

    #[test]
    fn status_display_is_snake_case() {
        assert_eq!(AuditStatus::TimedOut.to_string(), "timed_out");
        assert_eq!(AuditStatus::Success.to_string(), "success");
    }
}
