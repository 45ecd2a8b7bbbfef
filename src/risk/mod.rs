use crate::config::RiskConfig;
use crate::policy::PathPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Every operation the gate knows how to score. Unknown operations do not
/// exist: callers pick a variant, and the lookup tables below are exhaustive.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OperationKind {
    // Destructive
    DeleteFiles,
    DeleteFolder,
    DeleteMultipleFolders,
    DeleteMixedItems,
    // Restructuring
    MoveFolderContents,
    CopyFolderContents,
    FlattenFolder,
    MoveFiles,
    RenameFile,
    BatchRename,
    OrganizeFolder,
    // Additive
    CopyFiles,
    CreateFolder,
    CreateFile,
    // Read-only
    ScanFolder,
    SearchFiles,
    GetFileInfo,
    ReadFileContent,
    PreviewFile,
}

impl OperationKind {
    /// Base score feeding the additive risk model. Delete-class operations
    /// score highest; read-only operations score zero.
    pub fn base_score(self) -> u32 {
        match self {
            Self::DeleteFolder | Self::DeleteMultipleFolders | Self::FlattenFolder => 60,
            Self::DeleteFiles | Self::DeleteMixedItems => 50,
            Self::MoveFolderContents | Self::CopyFolderContents => 35,
            Self::MoveFiles | Self::RenameFile | Self::BatchRename => 20,
            Self::OrganizeFolder => 15,
            Self::CopyFiles | Self::CreateFolder | Self::CreateFile => 5,
            Self::ScanFolder
            | Self::SearchFiles
            | Self::GetFileInfo
            | Self::ReadFileContent
            | Self::PreviewFile => 0,
        }
    }

    /// Operations that demand confirmation regardless of computed level.
    pub fn always_confirm(self) -> bool {
        matches!(
            self,
            Self::DeleteFiles
                | Self::DeleteFolder
                | Self::DeleteMultipleFolders
                | Self::DeleteMixedItems
                | Self::MoveFolderContents
                | Self::FlattenFolder
        )
    }

    /// Read-only operations that never require confirmation.
    pub fn never_confirm(self) -> bool {
        matches!(
            self,
            Self::ScanFolder
                | Self::SearchFiles
                | Self::GetFileInfo
                | Self::ReadFileContent
                | Self::PreviewFile
        )
    }

    /// Operations whose originals are worth a content backup.
    pub fn is_destructive(self) -> bool {
        matches!(
            self,
            Self::DeleteFiles
                | Self::DeleteFolder
                | Self::DeleteMultipleFolders
                | Self::DeleteMixedItems
                | Self::MoveFiles
                | Self::MoveFolderContents
        )
    }

    pub fn mutates_filesystem(self) -> bool {
        !self.never_confirm()
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RiskLevel {
    Safe,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: u32) -> Self {
        match score {
            80.. => Self::Critical,
            60..=79 => Self::High,
            35..=59 => Self::Medium,
            15..=34 => Self::Low,
            _ => Self::Safe,
        }
    }
}

/// Immutable scoring result, created once per operation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub score: u32,
    pub factors: Vec<String>,
    pub recommendation: String,
    pub requires_confirmation: bool,
    pub requires_backup: bool,
    pub file_count: usize,
    pub total_bytes: u64,
}

/// Extra signals accompanying an operation request.
#[derive(Debug, Clone, Copy, Default)]
pub struct OperationParams {
    pub recursive: bool,
}

/// Scores operations into risk levels. Deterministic given the same inputs
/// and filesystem state at call time; it reads file sizes, so it is not a
/// pure function of its arguments.
#[derive(Debug, Clone)]
pub struct RiskAssessor {
    config: RiskConfig,
    backups_enabled: bool,
}

impl RiskAssessor {
    pub fn new(config: RiskConfig, backups_enabled: bool) -> Self {
        Self {
            config,
            backups_enabled,
        }
    }

    pub fn assess(
        &self,
        operation: OperationKind,
        paths: &[PathBuf],
        params: OperationParams,
        policy: &PathPolicy,
    ) -> RiskAssessment {
        let mut score = operation.base_score();
        let mut factors = vec![format!("Operation type: {operation}")];

        let file_count = paths.len();
        if file_count > self.config.high_file_count {
            score += 40;
            factors.push(format!("High file count ({file_count} files)"));
        } else if file_count > self.config.medium_file_count {
            score += 25;
            factors.push(format!("Medium file count ({file_count} files)"));
        } else if file_count > self.config.low_file_count {
            score += 10;
            factors.push(format!("Low file count ({file_count} files)"));
        }

        let total_bytes = measure_total_size(paths);
        let size_mb = to_mb(total_bytes);
        if total_bytes > self.config.high_size_bytes {
            score += 30;
            factors.push(format!("Large total size ({size_mb:.1}MB)"));
        } else if total_bytes > self.config.medium_size_bytes {
            score += 20;
            factors.push(format!("Medium total size ({size_mb:.1}MB)"));
        } else if total_bytes > self.config.low_size_bytes {
            score += 10;
            factors.push(format!("Small total size ({size_mb:.1}MB)"));
        }

        if paths.iter().any(|p| policy.is_sensitive(p)) {
            score += 25;
            factors.push("Operating on sensitive directories".into());
        }

        if paths.iter().any(|p| is_protected_manifest(p)) {
            score += 20;
            factors.push("Protected files involved".into());
        }

        if params.recursive {
            score += 15;
            factors.push("Recursive operation".into());
        }

        if paths.iter().any(|p| looks_like_system_file(p)) {
            score += 30;
            factors.push("System files involved".into());
        }

        let score = score.min(100);
        let level = RiskLevel::from_score(score);
        let requires_confirmation = if operation.always_confirm() {
            true
        } else if operation.never_confirm() {
            false
        } else {
            level >= RiskLevel::Medium
        };
        let requires_backup =
            self.backups_enabled && operation.is_destructive() && level >= RiskLevel::Medium;

        let assessment = RiskAssessment {
            level,
            score,
            recommendation: recommendation(level, file_count, size_mb),
            factors,
            requires_confirmation,
            requires_backup,
            file_count,
            total_bytes,
        };

        info!(
            operation = %operation,
            risk = %level,
            score,
            file_count,
            requires_confirmation,
            "risk assessment completed"
        );

        assessment
    }
}

/// Recommendation text derives solely from the level so tests can match on
/// exact wording per level.
fn recommendation(level: RiskLevel, file_count: usize, size_mb: f64) -> String {
    match level {
        RiskLevel::Critical => format!(
            "CRITICAL: this operation affects {file_count} items ({size_mb:.1}MB). \
Review carefully before proceeding."
        ),
        RiskLevel::High => format!(
            "HIGH RISK: this will modify {file_count} items ({size_mb:.1}MB). \
A backup will be created automatically."
        ),
        RiskLevel::Medium => format!(
            "MODERATE: this will affect {file_count} items ({size_mb:.1}MB). \
Please confirm to proceed."
        ),
        RiskLevel::Low => format!("LOW RISK: this will modify {file_count} items ({size_mb:.1}MB)."),
        RiskLevel::Safe => "SAFE: read-only operation, no changes will be made.".into(),
    }
}

/// Heuristic signal only, never a security boundary. Matches lowercased path
/// text against executable extensions and OS directory names.
fn looks_like_system_file(path: &Path) -> bool {
    const INDICATORS: &[&str] = &[
        ".dll",
        ".sys",
        ".exe",
        ".so",
        ".dylib",
        "system32",
        "windows",
        "program files",
    ];
    let lowered = path.to_string_lossy().to_lowercase();
    INDICATORS.iter().any(|i| lowered.contains(i))
}

fn is_protected_manifest(path: &Path) -> bool {
    const PROTECTED: &[&str] = &[
        ".gitignore",
        ".dockerignore",
        "requirements.txt",
        "package.json",
        "Cargo.toml",
        "go.mod",
        "pom.xml",
        "README.md",
        "LICENSE",
    ];
    path.file_name()
        .map(|n| n.to_string_lossy())
        .is_some_and(|name| PROTECTED.iter().any(|p| *p == name))
}

/// Cumulative byte size over files and directory trees. Unreadable entries
/// count as zero rather than failing the assessment.
pub fn measure_total_size(paths: &[PathBuf]) -> u64 {
    let mut total = 0;
    for path in paths {
        if let Ok(meta) = std::fs::symlink_metadata(path) {
            if meta.is_file() {
                total += meta.len();
            } else if meta.is_dir() {
                total += dir_size(path);
            }
        }
    }
    total
}

fn dir_size(dir: &Path) -> u64 {
    let mut total = 0;
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    for entry in entries.flatten() {
        let Ok(meta) = entry.metadata() else { continue };
        if meta.is_file() {
            total += meta.len();
        } else if meta.is_dir() {
            total += dir_size(&entry.path());
        }
    }
    total
}

#[allow(clippy::cast_precision_loss)]
fn to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
