use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use eternity_core::{
    archive_name, cap_size, latest_archived_ms, select_saves, EpochMs, SaveSelection,
    SaveSnapshot,
};
use tokio::fs;
use tracing::{info, warn};

use crate::controller::Controller;
use crate::download::download_save;
use crate::error::ControlError;

#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    pub folder: PathBuf,
    pub interval_secs: u64,
    pub skip_autosaves: bool,
    pub max_save_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub downloaded: usize,
    pub oversized: usize,
    pub failed: usize,
}

/// Newest timestamp encoded in the archive names under `dir`; 0 when the
/// directory is missing or holds nothing recognisable.
pub async fn last_archived_ms(dir: &Path) -> Result<EpochMs, ControlError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(latest_archived_ms(names))
}

/// Directory name for an instance, with path separators replaced.
fn instance_dir_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => format!("_{cleaned}"),
        _ => cleaned,
    }
}

/// Download a thinned-out history of every instance's saves into
/// `<folder>/<instance name>/`, continuing from what is already there.
///
/// Controller rejections and network errors are logged per save; local I/O
/// and malformed responses abort the run.
pub async fn archive_saves(
    controller: &dyn Controller,
    options: &ArchiveOptions,
) -> Result<ArchiveSummary, ControlError> {
    let hosts: HashMap<_, _> = controller
        .list_hosts()
        .await?
        .into_iter()
        .map(|h| (h.id, h))
        .collect();
    let instances = controller.list_instances().await?;
    let all_saves = controller.list_saves(None).await?;

    let interval_ms = i64::try_from(options.interval_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
    let mut summary = ArchiveSummary::default();

    for instance in &instances {
        let on_connected_host = instance
            .assigned_host
            .and_then(|id| hosts.get(&id))
            .is_some_and(|h| h.connected);
        if !on_connected_host {
            continue;
        }

        let dir = options.folder.join(instance_dir_name(&instance.name));
        fs::create_dir_all(&dir).await?;
        let baseline_ms = last_archived_ms(&dir).await?;

        let saves: Vec<SaveSnapshot> = all_saves
            .iter()
            .filter(|s| s.instance_id == instance.id)
            .cloned()
            .collect();
        let selection = SaveSelection {
            interval_ms,
            baseline_ms,
            skip_autosaves: options.skip_autosaves,
        };
        let capped = cap_size(select_saves(&saves, &selection), options.max_save_bytes);

        for save in &capped.oversized {
            warn!(
                instance = %instance.name,
                save = %save.name,
                size_mb = save.size as f64 / 1e6,
                "skipping save above size limit"
            );
        }
        summary.oversized += capped.oversized.len();

        for save in &capped.keep {
            let dest = dir.join(archive_name(save.mtime_ms));
            info!(
                instance = %instance.name,
                save = %save.name,
                size_mb = save.size as f64 / 1e6,
                "downloading {}",
                dest.display()
            );
            match download_save(controller, instance.id, &save.name, &dest).await {
                Ok(_) => summary.downloaded += 1,
                Err(e) if e.is_recoverable() => {
                    warn!(
                        instance = %instance.name,
                        save = %save.name,
                        error = %e,
                        "download failed"
                    );
                    summary.failed += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    Ok(summary)
}
