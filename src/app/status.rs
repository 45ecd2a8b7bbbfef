use crate::gate::FileGate;

/// One-screen summary of the gate: directories, pending confirmations and
/// storage usage.
pub async fn render_status(gate: &FileGate) -> String {
    let config = gate.config();
    let mut lines = vec![
        format!("◆ FileWarden v{}", env!("CARGO_PKG_VERSION")),
        String::new(),
        format!("Home       {}", config.warden_dir.display()),
        format!("Config     {}", config.config_path.display()),
        format!("Audit      {}", config.audit_dir().display()),
        format!("Backups    {}", config.backup_dir().display()),
        format!("Snapshots  {}", config.snapshot_dir().display()),
        String::new(),
    ];

    let pending = gate.pending();
    lines.push(format!("Pending confirmations: {}", pending.len()));
    for request in &pending {
        lines.push(format!(
            "  {}  {}  {} risk  {}s old",
            request.operation_id,
            request.operation,
            request.risk.level,
            request.age_secs()
        ));
    }

    match gate.backups().storage_info().await {
        Ok(info) => lines.push(format!(
            "Backup storage: {} backup(s), {:.1}MB of {:.1}MB ({:.1}%)",
            info.backup_count,
            to_mb(info.total_bytes),
            to_mb(info.limit_bytes),
            info.usage_percent
        )),
        Err(err) => lines.push(format!("Backup storage: unavailable ({err})")),
    }
    lines.push(format!(
        "Audit mirror:   {}",
        gate.audit().mirror_file().display()
    ));

    lines.join("\n")
}

#[allow(clippy::cast_precision_loss)]
fn to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
