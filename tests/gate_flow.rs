//! End-to-end flows through the public gate API: challenge, confirmation,
//! execution recording, backup restore and timeout expiry.

use std::fs;
use std::path::Path;
use std::time::Duration;

use filewarden::audit::AuditStatus;
use filewarden::config::Config;
use filewarden::confirm::critical_phrase;
use filewarden::gate::{FileGate, GateDecision};
use filewarden::risk::{OperationKind, OperationParams, RiskLevel};
use tempfile::TempDir;

async fn gate_rooted_at(warden: &Path, allowed: &Path) -> FileGate {
    let mut config = Config::load_or_init_at(warden).expect("config");
    config.policy.allowed_roots = vec![allowed.to_string_lossy().into_owned()];
    FileGate::open(config).await.expect("gate")
}

fn touch_many(dir: &Path, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let p = dir.join(format!("f{i}.txt"));
            fs::write(&p, "payload").expect("write");
            p.display().to_string()
        })
        .collect()
}

#[tokio::test]
async fn gated_delete_runs_the_full_lifecycle() {
    let warden = TempDir::new().expect("tempdir");
    let files = TempDir::new().expect("tempdir");
    let gate = gate_rooted_at(warden.path(), files.path()).await;
    let paths = touch_many(files.path(), 60);

    let decision = gate
        .request_confirmation(
            OperationKind::DeleteFiles,
            &paths,
            "agent-7",
            OperationParams::default(),
        )
        .await
        .expect("decision");
    let request = match decision {
        GateDecision::ConfirmationRequired { request } => request,
        other => panic!("expected challenge, got {other:?}"),
    };
    assert_eq!(request.risk.level, RiskLevel::High);
    assert!(request.message.contains("confirm"));
    assert!(request.backup_id.is_some());

    let resolution = gate
        .confirm(&request.operation_id, "confirm")
        .await
        .expect("confirm");
    assert!(resolution.confirmed);

    for path in &paths {
        fs::remove_file(path).expect("delete");
    }
    let audit_id = gate
        .record_execution(
            OperationKind::DeleteFiles,
            "agent-7",
            paths,
            resolution.request.risk.level,
            None,
            None,
        )
        .await;
    assert!(!audit_id.is_empty());

    let recent = gate.audit().recent(10).await.expect("recent");
    assert_eq!(recent[0].status, AuditStatus::Success);
    assert_eq!(recent[0].operation, "delete_files");
    assert_eq!(recent[0].user_id, "agent-7");
}

#[tokio::test]
async fn critical_operation_demands_the_exact_phrase() {
    let warden = TempDir::new().expect("tempdir");
    let files = TempDir::new().expect("tempdir");
    let gate = gate_rooted_at(warden.path(), files.path()).await;
    let dirs: Vec<String> = (0..12)
        .map(|i| {
            let d = files.path().join(format!("bucket{i}"));
            fs::create_dir(&d).expect("mkdir");
            d.display().to_string()
        })
        .collect();

    let open_challenge = || async {
        let decision = gate
            .request_confirmation(
                OperationKind::DeleteFolder,
                &dirs,
                "agent-7",
                OperationParams { recursive: true },
            )
            .await
            .expect("decision");
        match decision {
            GateDecision::ConfirmationRequired { request } => request,
            other => panic!("expected challenge, got {other:?}"),
        }
    };

    let request = open_challenge().await;
    assert_eq!(request.risk.level, RiskLevel::Critical);
    let phrase = critical_phrase(OperationKind::DeleteFolder);
    assert!(request.message.contains(&phrase));

    // A bare "yes" is not enough at critical risk.
    let weak = gate
        .confirm(&request.operation_id, "yes")
        .await
        .expect("confirm");
    assert!(!weak.confirmed);
    assert!(gate.pending().is_empty());

    let request = open_challenge().await;
    let exact = gate
        .confirm(&request.operation_id, &phrase)
        .await
        .expect("confirm");
    assert!(exact.confirmed);
}

#[tokio::test]
async fn restore_returns_backed_up_content() {
    let warden = TempDir::new().expect("tempdir");
    let files = TempDir::new().expect("tempdir");
    let gate = gate_rooted_at(warden.path(), files.path()).await;
    let paths = touch_many(files.path(), 60);

    let decision = gate
        .request_confirmation(
            OperationKind::DeleteFiles,
            &paths,
            "agent-7",
            OperationParams::default(),
        )
        .await
        .expect("decision");
    let request = match decision {
        GateDecision::ConfirmationRequired { request } => request,
        other => panic!("expected challenge, got {other:?}"),
    };
    let backup_id = request.backup_id.clone().expect("backup id");
    gate.confirm(&request.operation_id, "confirm")
        .await
        .expect("confirm");

    for path in &paths {
        fs::remove_file(path).expect("delete");
    }
    assert!(!Path::new(&paths[0]).exists());

    let report = gate
        .restore_backup(&backup_id, "agent-7")
        .await
        .expect("restore");
    assert_eq!(report.restored, 60);
    assert!(report.failures.is_empty());
    assert_eq!(
        fs::read_to_string(&paths[0]).expect("read restored"),
        "payload"
    );
}

#[tokio::test]
async fn unanswered_challenge_times_out() {
    let warden = TempDir::new().expect("tempdir");
    let files = TempDir::new().expect("tempdir");
    let mut config = Config::load_or_init_at(warden.path()).expect("config");
    config.policy.allowed_roots = vec![files.path().to_string_lossy().into_owned()];
    config.confirmation.timeout_secs = 1;
    let gate = FileGate::open(config).await.expect("gate");
    let paths = touch_many(files.path(), 60);

    let decision = gate
        .request_confirmation(
            OperationKind::DeleteFiles,
            &paths,
            "agent-7",
            OperationParams::default(),
        )
        .await
        .expect("decision");
    let request = match decision {
        GateDecision::ConfirmationRequired { request } => request,
        other => panic!("expected challenge, got {other:?}"),
    };

    tokio::time::sleep(Duration::from_millis(1300)).await;

    let late = gate.confirm(&request.operation_id, "confirm").await;
    assert!(late.is_err());
    assert!(gate.pending().is_empty());

    let recent = gate.audit().recent(10).await.expect("recent");
    assert!(recent.iter().any(|e| e.status == AuditStatus::TimedOut));
}

#[tokio::test]
async fn maintenance_sweep_reports_every_store() {
    let warden = TempDir::new().expect("tempdir");
    let files = TempDir::new().expect("tempdir");
    let gate = gate_rooted_at(warden.path(), files.path()).await;

    let report = gate.cleanup().await;
    assert_eq!(report.audit_rows_deleted, 0);
    assert_eq!(report.backups_removed, 0);
    assert_eq!(report.snapshots_removed, 0);
}
