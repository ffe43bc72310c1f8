use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use eternity_core::InstanceId;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::controller::Controller;
use crate::error::ControlError;

/// Upper bound on candidate names tried for the staging file and the final name.
pub const MAX_NAME_TRIES: usize = 100;

fn with_name(path: &Path, name: String) -> PathBuf {
    path.with_file_name(name)
}

fn file_name(path: &Path) -> Result<String, ControlError> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            ControlError::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("{} has no file name", path.display()),
            ))
        })
}

fn exhausted(path: &Path) -> ControlError {
    ControlError::Io(std::io::Error::new(
        ErrorKind::AlreadyExists,
        format!("no free name near {} after {MAX_NAME_TRIES} tries", path.display()),
    ))
}

/// `save.zip.part`, `save.zip.1.part`, `save.zip.2.part`, ...
fn staging_candidate(dest: &Path, name: &str, n: usize) -> PathBuf {
    if n == 0 {
        with_name(dest, format!("{name}.part"))
    } else {
        with_name(dest, format!("{name}.{n}.part"))
    }
}

/// `save.zip`, `save-1.zip`, `save-2.zip`, ...
fn final_candidate(dest: &Path, name: &str, n: usize) -> PathBuf {
    if n == 0 {
        return dest.to_path_buf();
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => with_name(dest, format!("{stem}-{n}.{ext}")),
        _ => with_name(dest, format!("{name}-{n}")),
    }
}

/// Claim a staging file next to `dest`. Creation is exclusive, so a name
/// taken by a concurrent download just moves us to the next candidate.
async fn reserve_staging(dest: &Path) -> Result<(PathBuf, File), ControlError> {
    let name = file_name(dest)?;
    for n in 0..MAX_NAME_TRIES {
        let candidate = staging_candidate(dest, &name, n);
        if fs::try_exists(&candidate).await? {
            continue;
        }
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(exhausted(dest))
}

/// Give the finished staging file its first free final name.
///
/// A hard link fails with `AlreadyExists` instead of replacing the target, so
/// two downloads of the same save finishing together end up under different
/// names. The staging name is dropped once the link exists.
async fn publish(staging: &Path, dest: &Path) -> Result<PathBuf, ControlError> {
    let name = file_name(dest)?;
    for n in 0..MAX_NAME_TRIES {
        let candidate = final_candidate(dest, &name, n);
        match fs::hard_link(staging, &candidate).await {
            Ok(()) => {
                if let Err(e) = fs::remove_file(staging).await {
                    warn!(path = %staging.display(), error = %e, "could not remove staging file");
                }
                return Ok(candidate);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(exhausted(dest))
}

async fn stream_into(
    controller: &dyn Controller,
    instance: InstanceId,
    save: &str,
    dest: &Path,
    staging: &Path,
    mut file: File,
) -> Result<(PathBuf, u64), ControlError> {
    let stream = controller.request_download(instance, save).await?;
    debug!(%stream, save, "download stream ready");
    let written = controller.fetch_stream(&stream, &mut file).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    let target = publish(staging, dest).await?;
    Ok((target, written))
}

/// Download `save` of `instance` to `dest`, or to the first free `dest-N`
/// variant if `dest` already exists. Returns the path actually written.
///
/// Bytes go to a `.part` file first. It is linked into place only after the
/// stream completed, and removed on any failure.
pub async fn download_save(
    controller: &dyn Controller,
    instance: InstanceId,
    save: &str,
    dest: &Path,
) -> Result<PathBuf, ControlError> {
    let (staging, file) = reserve_staging(dest).await?;

    let finished = stream_into(controller, instance, save, dest, &staging, file).await;

    match finished {
        Ok((target, written)) => {
            info!(save, path = %target.display(), bytes = written, "downloaded save");
            Ok(target)
        }
        Err(e) => {
            if let Err(cleanup) = fs::remove_file(&staging).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!(
                        path = %staging.display(),
                        error = %cleanup,
                        "could not remove partial download"
                    );
                }
            }
            Err(e)
        }
    }
}
