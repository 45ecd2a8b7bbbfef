use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Warden home directory - computed from home, not serialized
    #[serde(skip)]
    pub warden_dir: PathBuf,
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub risk: RiskConfig,

    #[serde(default)]
    pub confirmation: ConfirmationConfig,

    #[serde(default)]
    pub backup: BackupConfig,

    #[serde(default)]
    pub snapshot: SnapshotConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub resilience: ResilienceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Base directories operations may touch. `~` is expanded on resolve.
    #[serde(default = "default_allowed_roots")]
    pub allowed_roots: Vec<String>,
    /// Roots that always reject, even when nested under an allowed root.
    #[serde(default = "default_forbidden_roots")]
    pub forbidden_roots: Vec<String>,
    /// Name fragments that reject any path containing them.
    #[serde(default = "default_forbidden_patterns")]
    pub forbidden_patterns: Vec<String>,
    /// Extensions that cannot be deleted or modified.
    #[serde(default = "default_protected_extensions")]
    pub protected_extensions: Vec<String>,
    /// Exact filenames protected from delete/modify.
    #[serde(default = "default_protected_filenames")]
    pub protected_filenames: Vec<String>,
    /// Name fragments that mark a path sensitive (signal, not a blocker).
    #[serde(default = "default_sensitive_names")]
    pub sensitive_names: Vec<String>,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_low_file_count")]
    pub low_file_count: usize,
    #[serde(default = "default_medium_file_count")]
    pub medium_file_count: usize,
    #[serde(default = "default_high_file_count")]
    pub high_file_count: usize,
    #[serde(default = "default_low_size_bytes")]
    pub low_size_bytes: u64,
    #[serde(default = "default_medium_size_bytes")]
    pub medium_size_bytes: u64,
    #[serde(default = "default_high_size_bytes")]
    pub high_size_bytes: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    #[serde(default = "default_confirmation_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Backup root directory. Empty means `<warden_dir>/backups`.
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default = "default_backup_max_total_bytes")]
    pub max_total_bytes: u64,
    #[serde(default = "default_backup_retention_days")]
    pub retention_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Snapshot store directory. Empty means `<warden_dir>/snapshots`.
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default = "default_snapshot_retention_hours")]
    pub retention_hours: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Audit directory holding the sqlite db and JSONL mirror.
    /// Empty means `<warden_dir>/audit`.
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default = "default_audit_retention_days")]
    pub retention_days: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResilienceConfig {
    #[serde(default = "default_breaker_failure_threshold")]
    pub breaker_failure_threshold: u32,
    #[serde(default = "default_breaker_recovery_secs")]
    pub breaker_recovery_secs: u64,
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,
    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,
    #[serde(default = "default_retry_backoff_multiplier")]
    pub retry_backoff_multiplier: f64,
    #[serde(default = "default_rate_limit_max_requests")]
    pub rate_limit_max_requests: u32,
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
}

fn default_allowed_roots() -> Vec<String> {
    vec![
        "~/Documents".into(),
        "~/Desktop".into(),
        "~/Downloads".into(),
        "~/Pictures".into(),
        "~/Videos".into(),
        "~/Music".into(),
        "~/Projects".into(),
        "~/workspace".into(),
        "/tmp/filewarden".into(),
    ]
}

fn default_forbidden_roots() -> Vec<String> {
    vec![
        "/System".into(),
        "/Library".into(),
        "/bin".into(),
        "/sbin".into(),
        "/usr/bin".into(),
        "/usr/sbin".into(),
        "/etc".into(),
        "/var".into(),
        "/private".into(),
        "~/.ssh".into(),
        "~/.aws".into(),
        "~/.config".into(),
    ]
}

fn default_forbidden_patterns() -> Vec<String> {
    vec![
        ".env".into(),
        "id_rsa".into(),
        "id_ed25519".into(),
        ".pem".into(),
        ".key".into(),
        "credentials".into(),
        "password".into(),
        "secret".into(),
        ".git".into(),
        ".svn".into(),
        "node_modules".into(),
        "__pycache__".into(),
    ]
}

fn default_protected_extensions() -> Vec<String> {
    vec![
        ".dll".into(),
        ".sys".into(),
        ".exe".into(),
        ".so".into(),
        ".dylib".into(),
        ".pem".into(),
        ".key".into(),
        ".p12".into(),
        ".pfx".into(),
    ]
}

fn default_protected_filenames() -> Vec<String> {
    vec![
        ".gitignore".into(),
        ".dockerignore".into(),
        "requirements.txt".into(),
        "package.json".into(),
        "Cargo.toml".into(),
        "go.mod".into(),
        "pom.xml".into(),
        "README.md".into(),
        "LICENSE".into(),
    ]
}

fn default_sensitive_names() -> Vec<String> {
    vec![
        "passwords".into(),
        "credentials".into(),
        "keys".into(),
        "certificates".into(),
        ".ssh".into(),
        ".gnupg".into(),
        ".aws".into(),
        "wallet".into(),
        "private".into(),
    ]
}

fn default_max_batch_size() -> usize {
    1_000
}

fn default_low_file_count() -> usize {
    10
}

fn default_medium_file_count() -> usize {
    50
}

fn default_high_file_count() -> usize {
    200
}

fn default_low_size_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_medium_size_bytes() -> u64 {
    100 * 1024 * 1024
}

fn default_high_size_bytes() -> u64 {
    500 * 1024 * 1024
}

fn default_confirmation_timeout_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

fn default_backup_max_total_bytes() -> u64 {
    5 * 1024 * 1024 * 1024
}

fn default_backup_retention_days() -> u32 {
    30
}

fn default_snapshot_retention_hours() -> u32 {
    24
}

fn default_audit_retention_days() -> u32 {
    90
}

fn default_breaker_failure_threshold() -> u32 {
    5
}

fn default_breaker_recovery_secs() -> u64 {
    30
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_initial_delay_ms() -> u64 {
    1_000
}

fn default_retry_backoff_multiplier() -> f64 {
    2.0
}

fn default_rate_limit_max_requests() -> u32 {
    60
}

fn default_rate_limit_window_secs() -> u64 {
    60
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allowed_roots: default_allowed_roots(),
            forbidden_roots: default_forbidden_roots(),
            forbidden_patterns: default_forbidden_patterns(),
            protected_extensions: default_protected_extensions(),
            protected_filenames: default_protected_filenames(),
            sensitive_names: default_sensitive_names(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            low_file_count: default_low_file_count(),
            medium_file_count: default_medium_file_count(),
            high_file_count: default_high_file_count(),
            low_size_bytes: default_low_size_bytes(),
            medium_size_bytes: default_medium_size_bytes(),
            high_size_bytes: default_high_size_bytes(),
        }
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_confirmation_timeout_secs(),
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            max_total_bytes: default_backup_max_total_bytes(),
            retention_days: default_backup_retention_days(),
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            dir: None,
            retention_hours: default_snapshot_retention_hours(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            dir: None,
            retention_days: default_audit_retention_days(),
        }
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            breaker_failure_threshold: default_breaker_failure_threshold(),
            breaker_recovery_secs: default_breaker_recovery_secs(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
            retry_backoff_multiplier: default_retry_backoff_multiplier(),
            rate_limit_max_requests: default_rate_limit_max_requests(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let home =
            UserDirs::new().map_or_else(|| PathBuf::from("."), |u| u.home_dir().to_path_buf());
        let warden_dir = home.join(".filewarden");

        Self {
            config_path: warden_dir.join("config.toml"),
            warden_dir,
            policy: PolicyConfig::default(),
            risk: RiskConfig::default(),
            confirmation: ConfirmationConfig::default(),
            backup: BackupConfig::default(),
            snapshot: SnapshotConfig::default(),
            audit: AuditConfig::default(),
            resilience: ResilienceConfig::default(),
        }
    }
}

impl Config {
    pub fn load_or_init() -> Result<Self> {
        let warden_dir = match std::env::var("FILEWARDEN_HOME") {
            Ok(dir) if !dir.is_empty() => PathBuf::from(shellexpand::tilde(&dir).into_owned()),
            _ => {
                let home = UserDirs::new()
                    .map(|u| u.home_dir().to_path_buf())
                    .context("Could not find home directory")?;
                home.join(".filewarden")
            }
        };
        Self::load_or_init_at(&warden_dir)
    }

    /// Load or create the config rooted at an explicit warden directory.
    pub fn load_or_init_at(warden_dir: &Path) -> Result<Self> {
        let config_path = warden_dir.join("config.toml");

        if !warden_dir.exists() {
            fs::create_dir_all(warden_dir).context("Failed to create .filewarden directory")?;
        }

        if config_path.exists() {
            let contents =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path = config_path;
            config.warden_dir = warden_dir.to_path_buf();
            config.validate()?;
            Ok(config)
        } else {
            let config = Self {
                config_path,
                warden_dir: warden_dir.to_path_buf(),
                ..Self::default()
            };
            config.validate()?;
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&self.config_path, toml_str).context("Failed to write config file")?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.policy.allowed_roots.is_empty() {
            anyhow::bail!("policy.allowed_roots must not be empty");
        }
        if self.policy.max_batch_size == 0 {
            anyhow::bail!("policy.max_batch_size must be >= 1");
        }
        if self.risk.low_file_count >= self.risk.medium_file_count
            || self.risk.medium_file_count >= self.risk.high_file_count
        {
            anyhow::bail!("risk file-count thresholds must be strictly increasing");
        }
        if self.risk.low_size_bytes >= self.risk.medium_size_bytes
            || self.risk.medium_size_bytes >= self.risk.high_size_bytes
        {
            anyhow::bail!("risk size thresholds must be strictly increasing");
        }
        if self.confirmation.timeout_secs == 0 {
            anyhow::bail!("confirmation.timeout_secs must be >= 1");
        }
        if self.resilience.retry_max_attempts == 0 {
            anyhow::bail!("resilience.retry_max_attempts must be >= 1");
        }
        if self.resilience.retry_backoff_multiplier < 1.0 {
            anyhow::bail!("resilience.retry_backoff_multiplier must be >= 1.0");
        }
        Ok(())
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.backup
            .dir
            .as_deref()
            .map_or_else(|| self.warden_dir.join("backups"), expand_path)
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.snapshot
            .dir
            .as_deref()
            .map_or_else(|| self.warden_dir.join("snapshots"), expand_path)
    }

    pub fn audit_dir(&self) -> PathBuf {
        self.audit
            .dir
            .as_deref()
            .map_or_else(|| self.warden_dir.join("audit"), expand_path)
    }
}

pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}
