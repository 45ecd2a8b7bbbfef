use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `FileWarden`.
///
/// Each subsystem defines its own error variant. Library callers can match on
/// these to decide recovery strategy; internal code continues to use
/// `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum WardenError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Path policy ─────────────────────────────────────────────────────
    #[error("policy: {0}")]
    Policy(#[from] PolicyError),

    // ── Confirmation ────────────────────────────────────────────────────
    #[error("confirmation: {0}")]
    Confirm(#[from] ConfirmError),

    // ── Backup ──────────────────────────────────────────────────────────
    #[error("backup: {0}")]
    Backup(#[from] BackupError),

    // ── Snapshot / rollback ─────────────────────────────────────────────
    #[error("snapshot: {0}")]
    Snapshot(#[from] SnapshotError),

    // ── Audit ───────────────────────────────────────────────────────────
    #[error("audit: {0}")]
    Audit(#[from] AuditError),

    // ── Resilience ──────────────────────────────────────────────────────
    #[error("resilience: {0}")]
    Resilience(#[from] ResilienceError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Path policy errors ─────────────────────────────────────────────────────

/// True failures of the policy layer. Path rejections are not errors; they
/// are carried as reason codes on the returned decision.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("batch of {got} paths exceeds limit of {limit}")]
    BatchTooLarge { got: usize, limit: usize },

    #[error("path {path} could not be resolved: {message}")]
    Unresolvable { path: String, message: String },
}

// ─── Confirmation errors ────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfirmError {
    #[error("operation {0} not found among pending confirmations")]
    NotPending(String),

    #[error("operation {operation_id} timed out after {timeout_secs}s")]
    TimedOut {
        operation_id: String,
        timeout_secs: u64,
    },
}

// ─── Backup errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("backup {0} not found")]
    NotFound(String),

    #[error("metadata for backup {backup_id} is unreadable: {message}")]
    Metadata {
        backup_id: String,
        message: String,
    },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Snapshot errors ────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot {0} not found")]
    NotFound(String),

    #[error("snapshot {snapshot_id} expired at {expired_at}")]
    Expired {
        snapshot_id: String,
        expired_at: String,
    },

    #[error("snapshot store: {0}")]
    Store(String),
}

// ─── Audit errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("query failed: {0}")]
    Query(String),

    #[error("schema migration failed: {0}")]
    Migration(String),

    #[error("store not available: {0}")]
    StoreUnavailable(String),

    #[error("sqlx: {0}")]
    Sqlx(String),
}

// ─── Resilience errors ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ResilienceError {
    #[error("circuit {name} open (retry after {retry_after_secs}s)")]
    CircuitOpen { name: String, retry_after_secs: u64 },

    #[error("retry budget exhausted after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    #[error("rate limited: {0} tokens unavailable")]
    RateLimited(u32),
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, WardenError>;
