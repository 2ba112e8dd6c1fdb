//! Prometheus `file_sd` output.

use std::path::{Path, PathBuf};

use anyhow::Context;
use uyuni_sd_discovery::{FileSdEntry, TargetGroup};

/// Renders target groups as a `file_sd` JSON document.
pub fn render(groups: &[TargetGroup]) -> anyhow::Result<String> {
    let entries: Vec<FileSdEntry> = groups.iter().flat_map(TargetGroup::to_file_sd).collect();
    let mut json = serde_json::to_string_pretty(&entries)?;
    json.push('\n');
    Ok(json)
}

/// Writes target groups to `path`, replacing the file atomically.
pub async fn write(path: &Path, groups: &[TargetGroup]) -> anyhow::Result<()> {
    let json = render(groups)?;
    let tmp = temp_path(path);

    tokio::fs::write(&tmp, json)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("failed to replace {}", path.display()))?;

    let targets: usize = groups.iter().map(|g| g.targets.len()).sum();
    tracing::info!(path = %path.display(), targets, "targets written");
    Ok(())
}

/// Sibling temporary file, so the rename stays on one filesystem.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
