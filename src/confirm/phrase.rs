use crate::risk::{OperationKind, RiskAssessment, RiskLevel};

const NEGATIVE_WORDS: &[&str] = &["no", "cancel", "stop", "abort"];

/// Human verb used in challenge phrases and messages.
fn operation_verb(operation: OperationKind) -> &'static str {
    match operation {
        OperationKind::DeleteFiles
        | OperationKind::DeleteFolder
        | OperationKind::DeleteMultipleFolders
        | OperationKind::DeleteMixedItems => "delete",
        OperationKind::MoveFolderContents | OperationKind::MoveFiles => "move",
        OperationKind::CopyFolderContents | OperationKind::CopyFiles => "copy",
        OperationKind::FlattenFolder => "flatten",
        OperationKind::RenameFile | OperationKind::BatchRename => "rename",
        OperationKind::OrganizeFolder => "organize",
        OperationKind::CreateFolder | OperationKind::CreateFile => "create",
        OperationKind::ScanFolder
        | OperationKind::SearchFiles
        | OperationKind::GetFileInfo
        | OperationKind::ReadFileContent
        | OperationKind::PreviewFile => "proceed",
    }
}

/// The exact phrase a critical-risk request demands.
pub fn critical_phrase(operation: OperationKind) -> String {
    format!("confirm {}", operation_verb(operation))
}

/// Classify a free-text response against the risk-scaled phrase rules.
///
/// Critical requires the exact challenge phrase. High requires the word
/// "confirm". Everything else accepts "yes" or "confirm". Any negative word
/// in the response overrides a positive match.
pub fn response_confirms(level: RiskLevel, operation: OperationKind, response: &str) -> bool {
    let normalized = response.trim().to_lowercase();

    if level == RiskLevel::Critical {
        return normalized == critical_phrase(operation);
    }

    let words: Vec<&str> = normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    if words.iter().any(|w| NEGATIVE_WORDS.contains(w)) {
        return false;
    }

    match level {
        RiskLevel::High => words.contains(&"confirm"),
        _ => words.contains(&"yes") || words.contains(&"confirm"),
    }
}

/// Challenge text shown to the user. The demanded affirmative scales with
/// the assessed risk level.
pub fn challenge_message(
    operation: OperationKind,
    risk: &RiskAssessment,
    paths: &[String],
) -> String {
    let verb = operation_verb(operation);
    let target = match paths {
        [] => String::from("nothing"),
        [only] => only.clone(),
        [first, rest @ ..] => format!("{first} (+{} more)", rest.len()),
    };
    let size_mb = to_mb(risk.total_bytes);
    let summary = format!(
        "This will {verb} {} item(s) ({size_mb:.1}MB) at {target}.",
        risk.file_count
    );

    let instruction = match risk.level {
        RiskLevel::Critical => format!(
            "Type exactly '{}' to proceed, or 'cancel' to abort.",
            critical_phrase(operation)
        ),
        RiskLevel::High => "Say 'confirm' to proceed or 'cancel' to abort.".to_string(),
        _ => "Say 'yes' to proceed or 'no' to cancel.".to_string(),
    };

    format!("{summary}\n{}\n{instruction}", risk.recommendation)
}

#[allow(clippy::cast_precision_loss)]
fn to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn risk(level: RiskLevel) -> RiskAssessment {
        RiskAssessment {
            level,
            score: match level {
                RiskLevel::Critical => 85,
                RiskLevel::High => 65,
                RiskLevel::Medium => 40,
                RiskLevel::Low => 20,
                RiskLevel::Safe => 0,
            },
            factors: Vec::new(),
            recommendation: "Review before proceeding.".into(),
            requires_confirmation: true,
            requires_backup: false,
            file_count: 3,
            total_bytes: 1024,
        }
    }

    #[test]
    fn medium_accepts_yes_and_confirm() {
        let op = OperationKind::MoveFiles;
        assert!(response_confirms(RiskLevel::Medium, op, "yes please"));
        assert!(response_confirms(RiskLevel::Medium, op, "Confirm."));
        assert!(!response_confirms(RiskLevel::Medium, op, "maybe later"));
    }

    #[test]
    fn negative_word_overrides_positive() {
        let op = OperationKind::MoveFiles;
        assert!(!response_confirms(RiskLevel::Medium, op, "no thanks"));
        assert!(!response_confirms(RiskLevel::Medium, op, "yes, no, wait"));
        assert!(!response_confirms(RiskLevel::High, op, "confirm... cancel"));
    }

    #[test]
    fn substring_negatives_do_not_false_positive() {
        let op = OperationKind::MoveFiles;
        // "know" and "nothing" contain "no" but are not refusals.
        assert!(response_confirms(RiskLevel::Medium, op, "yes, I know"));
        assert!(response_confirms(
            RiskLevel::Medium,
            op,
            "nothing wrong with that, yes"
        ));
    }

    #[test]
    fn high_requires_confirm_keyword() {
        let op = OperationKind::DeleteFiles;
        assert!(!response_confirms(RiskLevel::High, op, "yes"));
        assert!(response_confirms(RiskLevel::High, op, "ok, confirm"));
    }

    #[test]
    fn critical_requires_exact_phrase() {
        let op = OperationKind::DeleteFolder;
        assert!(!response_confirms(RiskLevel::Critical, op, "confirm"));
        assert!(!response_confirms(
            RiskLevel::Critical,
            op,
            "yes confirm delete please"
        ));
        assert!(response_confirms(RiskLevel::Critical, op, "confirm delete"));
        assert!(response_confirms(
            RiskLevel::Critical,
            op,
            "  Confirm Delete  "
        ));
    }

    #[test]
    fn message_names_the_demanded_phrase() {
        let op = OperationKind::DeleteFolder;
        let critical = challenge_message(op, &risk(RiskLevel::Critical), &["/tmp/x".into()]);
        assert!(critical.contains("'confirm delete'"));

        let high = challenge_message(op, &risk(RiskLevel::High), &["/tmp/x".into()]);
        assert!(high.contains("'confirm'"));
        assert!(high.contains("'cancel'"));

        let medium = challenge_message(op, &risk(RiskLevel::Medium), &["/tmp/x".into()]);
        assert!(medium.contains("'yes'"));
    }

    #[test]
    fn message_summarizes_scope() {
        let msg = challenge_message(
            OperationKind::MoveFiles,
            &risk(RiskLevel::Medium),
            &["/tmp/a".into(), "/tmp/b".into(), "/tmp/c".into()],
        );
        assert!(msg.contains("3 item(s)"));
        assert!(msg.contains("/tmp/a (+2 more)"));
    }
}
