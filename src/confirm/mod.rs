//! Pending-confirmation state machine with risk-scaled challenge phrases.
//!
//! A request is owned exclusively by the in-memory pending table. Confirm,
//! cancel and the timeout task all resolve a request by removing it from
//! that table; whichever caller wins the removal is authoritative and the
//! losers observe `NotPending` without writing a second terminal record.

mod phrase;

pub use phrase::{challenge_message, critical_phrase, response_confirms};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditEntry, AuditLogger, AuditStatus};
use crate::config::ConfirmationConfig;
use crate::error::{ConfirmError, Result};
use crate::risk::{OperationKind, RiskAssessment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConfirmationStatus {
    Pending,
    Confirmed,
    Cancelled,
    TimedOut,
}

/// One open (or just-resolved) confirmation challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub operation_id: String,
    pub operation: OperationKind,
    pub paths: Vec<String>,
    pub risk: RiskAssessment,
    pub user_id: String,
    /// RFC 3339 UTC timestamp.
    pub created_at: String,
    pub backup_id: Option<String>,
    pub status: ConfirmationStatus,
    pub message: String,
}

impl ConfirmationRequest {
    /// Seconds since the request was opened. Zero on an unparseable stamp.
    #[allow(clippy::cast_sign_loss)]
    pub fn age_secs(&self) -> u64 {
        chrono::DateTime::parse_from_rfc3339(&self.created_at)
            .map(|created| (Utc::now() - created.with_timezone(&Utc)).num_seconds().max(0) as u64)
            .unwrap_or(0)
    }
}

/// Outcome of classifying a user response against a pending request.
#[derive(Debug, Clone)]
pub struct ConfirmDecision {
    pub confirmed: bool,
    pub request: ConfirmationRequest,
}

struct PendingEntry {
    request: ConfirmationRequest,
    timer: Option<tokio::task::JoinHandle<()>>,
}

type PendingTable = Arc<Mutex<HashMap<String, PendingEntry>>>;

/// Tracks pending confirmations and resolves them exactly once.
///
/// Every resolution writes one terminal audit record before the request
/// leaves the table, so the audit trail stays complete even if the caller
/// drops the returned request.
#[derive(Clone)]
pub struct ConfirmationManager {
    timeout: Duration,
    audit: Arc<AuditLogger>,
    pending: PendingTable,
}

impl ConfirmationManager {
    pub fn new(timeout: Duration, audit: Arc<AuditLogger>) -> Self {
        Self {
            timeout,
            audit,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn from_config(config: &ConfirmationConfig, audit: Arc<AuditLogger>) -> Self {
        Self::new(Duration::from_secs(config.timeout_secs), audit)
    }

    /// Open a challenge for an operation the risk assessor gated. Records a
    /// pending audit entry and schedules the timeout task.
    pub async fn open_request(
        &self,
        operation: OperationKind,
        paths: Vec<String>,
        risk: RiskAssessment,
        user_id: &str,
        backup_id: Option<String>,
    ) -> ConfirmationRequest {
        let operation_id = Uuid::new_v4().to_string();
        let message = phrase::challenge_message(operation, &risk, &paths);
        let request = ConfirmationRequest {
            operation_id: operation_id.clone(),
            operation,
            paths,
            risk,
            user_id: user_id.to_string(),
            created_at: Utc::now().to_rfc3339(),
            backup_id,
            status: ConfirmationStatus::Pending,
            message,
        };

        let mut entry = AuditEntry::new(
            user_id,
            operation.to_string(),
            request.risk.level,
            AuditStatus::Pending,
            request.paths.clone(),
        );
        entry.total_bytes = request.risk.total_bytes;
        entry.details = serde_json::json!({
            "event": "confirmation_requested",
            "operation_id": operation_id,
            "backup_id": request.backup_id,
            "timeout_secs": self.timeout.as_secs(),
        });
        self.audit.record(entry).await;

        self.lock_pending().insert(
            operation_id.clone(),
            PendingEntry {
                request: request.clone(),
                timer: None,
            },
        );

        let timer = tokio::spawn(Self::timeout_task(
            Arc::clone(&self.pending),
            Arc::clone(&self.audit),
            operation_id.clone(),
            self.timeout,
        ));

        // The request may already have resolved between insert and spawn.
        match self.lock_pending().get_mut(&operation_id) {
            Some(entry) => entry.timer = Some(timer),
            None => timer.abort(),
        }

        info!(
            operation_id = %request.operation_id,
            operation = %operation,
            risk = %request.risk.level,
            user = %request.user_id,
            "confirmation requested"
        );
        request
    }

    /// Classify a free-text response for a pending request. The request is
    /// resolved either way: a non-matching response cancels it and the
    /// caller must open a fresh request to retry.
    pub async fn confirm(&self, operation_id: &str, response: &str) -> Result<ConfirmDecision> {
        let entry = self
            .take(operation_id)
            .ok_or_else(|| ConfirmError::NotPending(operation_id.to_string()))?;
        if let Some(timer) = entry.timer {
            timer.abort();
        }

        let mut request = entry.request;
        let confirmed = phrase::response_confirms(request.risk.level, request.operation, response);
        let (status, reason) = if confirmed {
            request.status = ConfirmationStatus::Confirmed;
            (AuditStatus::Success, "user_confirmed")
        } else {
            request.status = ConfirmationStatus::Cancelled;
            (AuditStatus::Denied, "response_rejected")
        };

        self.audit
            .record(terminal_entry(&request, status, reason, Some(response)))
            .await;
        info!(
            operation_id = %request.operation_id,
            confirmed,
            "confirmation resolved"
        );
        Ok(ConfirmDecision { confirmed, request })
    }

    /// Explicitly cancel a pending request.
    pub async fn cancel(&self, operation_id: &str) -> Result<ConfirmationRequest> {
        let entry = self
            .take(operation_id)
            .ok_or_else(|| ConfirmError::NotPending(operation_id.to_string()))?;
        if let Some(timer) = entry.timer {
            timer.abort();
        }

        let mut request = entry.request;
        request.status = ConfirmationStatus::Cancelled;
        self.audit
            .record(terminal_entry(
                &request,
                AuditStatus::Cancelled,
                "user_cancelled",
                None,
            ))
            .await;
        info!(operation_id = %request.operation_id, "confirmation cancelled");
        Ok(request)
    }

    /// Open requests, oldest first.
    pub fn list_pending(&self) -> Vec<ConfirmationRequest> {
        let table = self.lock_pending();
        let mut requests: Vec<ConfirmationRequest> =
            table.values().map(|entry| entry.request.clone()).collect();
        requests.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        requests
    }

    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    async fn timeout_task(
        pending: PendingTable,
        audit: Arc<AuditLogger>,
        operation_id: String,
        timeout: Duration,
    ) {
        tokio::time::sleep(timeout).await;
        let entry = pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&operation_id);
        // None means confirm or cancel already won the removal.
        let Some(entry) = entry else { return };

        let mut request = entry.request;
        request.status = ConfirmationStatus::TimedOut;
        warn!(
            operation_id = %request.operation_id,
            timeout_secs = timeout.as_secs(),
            "confirmation timed out"
        );
        audit
            .record(terminal_entry(
                &request,
                AuditStatus::TimedOut,
                "timeout",
                None,
            ))
            .await;
    }

    fn take(&self, operation_id: &str) -> Option<PendingEntry> {
        self.lock_pending().remove(operation_id)
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<String, PendingEntry>> {
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn terminal_entry(
    request: &ConfirmationRequest,
    status: AuditStatus,
    reason: &str,
    response: Option<&str>,
) -> AuditEntry {
    let mut entry = AuditEntry::new(
        request.user_id.as_str(),
        request.operation.to_string(),
        request.risk.level,
        status,
        request.paths.clone(),
    );
    entry.total_bytes = request.risk.total_bytes;
    entry.details = serde_json::json!({
        "event": "confirmation_resolved",
        "operation_id": request.operation_id,
        "reason": reason,
        "response": response,
        "backup_id": request.backup_id,
    });
    entry
}
