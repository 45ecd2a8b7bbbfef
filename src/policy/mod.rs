use crate::config::{PolicyConfig, expand_path};
use crate::error::PolicyError;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Intent behind touching a path. Protected-file checks only apply to
/// destructive intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathIntent {
    Read,
    Write,
    Modify,
    Delete,
}

impl PathIntent {
    fn is_destructive(self) -> bool {
        matches!(self, Self::Modify | Self::Delete)
    }
}

/// Why a path was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReasonCode {
    OutsideAllowedRoots,
    ForbiddenRoot,
    ForbiddenPattern,
    ProtectedExtension,
    ProtectedFile,
}

/// Per-path verdict. Computed fresh per call, never persisted.
#[derive(Debug, Clone)]
pub struct PathDecision {
    pub resolved: PathBuf,
    pub allowed: bool,
    /// Sensitive paths stay allowed but raise reported risk.
    pub sensitive: bool,
    pub reasons: Vec<ReasonCode>,
}

/// Batch verdict. All-or-nothing: one rejected path rejects the batch.
#[derive(Debug, Clone)]
pub struct BatchDecision {
    pub allowed: bool,
    pub decisions: Vec<PathDecision>,
}

impl BatchDecision {
    /// Flattened rejection summary, one line per rejected path.
    pub fn rejection_summary(&self) -> String {
        self.decisions
            .iter()
            .filter(|d| !d.allowed)
            .map(|d| {
                let reasons = d
                    .reasons
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("- {}: {reasons}", d.resolved.display())
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Classifies filesystem paths against configured roots and pattern sets.
/// Pure function of configuration plus the path itself; forbidden roots win
/// over allowed roots.
#[derive(Debug, Clone)]
pub struct PathPolicy {
    allowed_roots: Vec<PathBuf>,
    forbidden_roots: Vec<PathBuf>,
    forbidden_patterns: Vec<String>,
    protected_extensions: Vec<String>,
    protected_filenames: Vec<String>,
    sensitive_names: Vec<String>,
    max_batch_size: usize,
}

impl PathPolicy {
    pub fn from_config(config: &PolicyConfig) -> Self {
        Self {
            allowed_roots: config.allowed_roots.iter().map(|p| expand_path(p)).collect(),
            forbidden_roots: config
                .forbidden_roots
                .iter()
                .map(|p| expand_path(p))
                .collect(),
            forbidden_patterns: config
                .forbidden_patterns
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
            protected_extensions: config
                .protected_extensions
                .iter()
                .map(|e| e.to_lowercase())
                .collect(),
            protected_filenames: config.protected_filenames.clone(),
            sensitive_names: config
                .sensitive_names
                .iter()
                .map(|n| n.to_lowercase())
                .collect(),
            max_batch_size: config.max_batch_size,
        }
    }

    /// Classify a single path. Canonicalizes before any check so symlinks and
    /// `..` segments cannot dodge root matching. Rejections come back as
    /// reason codes on the decision; only unresolvable input is an error.
    pub fn classify(
        &self,
        raw: &str,
        intent: PathIntent,
        must_exist: bool,
    ) -> Result<PathDecision, PolicyError> {
        if raw.contains('\0') {
            return Err(PolicyError::Unresolvable {
                path: raw.replace('\0', "\\0"),
                message: "path contains a null byte".into(),
            });
        }

        let expanded = expand_path(raw);
        let resolved = resolve_path(&expanded, must_exist).map_err(|e| {
            PolicyError::Unresolvable {
                path: expanded.display().to_string(),
                message: e.to_string(),
            }
        })?;

        let mut reasons = Vec::new();

        if !self
            .allowed_roots
            .iter()
            .any(|root| resolved.starts_with(canonical_or_self(root)))
        {
            reasons.push(ReasonCode::OutsideAllowedRoots);
        }

        if self
            .forbidden_roots
            .iter()
            .any(|root| resolved.starts_with(canonical_or_self(root)))
        {
            reasons.push(ReasonCode::ForbiddenRoot);
        }

        if self.contains_forbidden_pattern(&resolved) {
            reasons.push(ReasonCode::ForbiddenPattern);
        }

        if intent.is_destructive() {
            if let Some(ext) = resolved.extension() {
                let dotted = format!(".{}", ext.to_string_lossy().to_lowercase());
                if self.protected_extensions.iter().any(|e| *e == dotted) {
                    reasons.push(ReasonCode::ProtectedExtension);
                }
            }
            if let Some(name) = resolved.file_name() {
                let name = name.to_string_lossy();
                if self.protected_filenames.iter().any(|f| *f == name) {
                    reasons.push(ReasonCode::ProtectedFile);
                }
            }
        }

        let sensitive = self.is_sensitive(&resolved);
        if sensitive {
            warn!(path = %resolved.display(), "touching sensitive path");
        }

        let decision = PathDecision {
            allowed: reasons.is_empty(),
            resolved,
            sensitive,
            reasons,
        };
        debug!(
            path = %decision.resolved.display(),
            allowed = decision.allowed,
            "path classified"
        );
        Ok(decision)
    }

    /// Validate a batch atomically: every path is classified, and a single
    /// rejection rejects the whole batch. Oversized batches are refused
    /// before any per-path work.
    pub fn validate_batch(
        &self,
        raw_paths: &[String],
        intent: PathIntent,
        must_exist: bool,
    ) -> Result<BatchDecision, PolicyError> {
        if raw_paths.len() > self.max_batch_size {
            return Err(PolicyError::BatchTooLarge {
                got: raw_paths.len(),
                limit: self.max_batch_size,
            });
        }

        let decisions = raw_paths
            .iter()
            .map(|raw| self.classify(raw, intent, must_exist))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(BatchDecision {
            allowed: decisions.iter().all(|d| d.allowed),
            decisions,
        })
    }

    pub fn is_sensitive(&self, path: &Path) -> bool {
        let lowered = path.to_string_lossy().to_lowercase();
        self.sensitive_names.iter().any(|n| lowered.contains(n))
    }

    fn contains_forbidden_pattern(&self, path: &Path) -> bool {
        let lowered = path.to_string_lossy().to_lowercase();
        self.forbidden_patterns.iter().any(|pattern| {
            lowered.contains(pattern)
                || path
                    .components()
                    .any(|c| c.as_os_str().to_string_lossy().eq_ignore_ascii_case(pattern))
        })
    }
}

/// Resolve to an absolute canonical path. Paths that do not exist yet are
/// resolved through their deepest existing ancestor so symlinked parents
/// still canonicalize; the trailing segments are normalized lexically.
fn resolve_path(path: &Path, must_exist: bool) -> std::io::Result<PathBuf> {
    match path.canonicalize() {
        Ok(resolved) => Ok(resolved),
        Err(e) if must_exist => Err(e),
        Err(_) => {
            let absolute = if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()?.join(path)
            };

            let mut base = absolute.clone();
            let mut tail = Vec::new();
            loop {
                if let Ok(resolved) = base.canonicalize() {
                    base = resolved;
                    break;
                }
                match base.file_name() {
                    Some(name) => {
                        tail.push(name.to_os_string());
                        base.pop();
                    }
                    None => break,
                }
            }

            let mut resolved = base;
            for segment in tail.iter().rev() {
                resolved.push(segment);
            }
            Ok(normalize_lexically(&resolved))
        }
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

fn canonical_or_self(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
