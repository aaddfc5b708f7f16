//! Locating the file the downloader actually wrote

use super::OUTPUT_EXTENSIONS;
use std::collections::HashSet;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Find the downloaded file for `stem`.
///
/// Order: `<stem>.<ext>` for each known extension, then the bare stem, then the
/// newest regular file in `work_dir`. Anything listed in `preexisting` is
/// skipped at every step, so files from earlier runs (still being served, for
/// instance) are never returned.
pub async fn resolve_output(
    stem: &Path,
    work_dir: &Path,
    preexisting: &HashSet<PathBuf>,
) -> Option<PathBuf> {
    for ext in OUTPUT_EXTENSIONS {
        let candidate = with_extension(stem, ext);
        if !preexisting.contains(&candidate) && is_file(&candidate).await {
            return Some(candidate);
        }
    }

    if !preexisting.contains(stem) && is_file(stem).await {
        return Some(stem.to_path_buf());
    }

    match newest_file(work_dir, preexisting).await {
        Ok(Some(path)) => {
            warn!(
                stem = %stem.display(),
                found = %path.display(),
                "Downloader output not found at stem, using newest file in work dir"
            );
            Some(path)
        }
        Ok(None) => None,
        Err(e) => {
            warn!(work_dir = %work_dir.display(), error = %e, "Failed to scan work dir");
            None
        }
    }
}

/// Files present in `dir` right now, taken before the downloader starts
pub async fn existing_files(dir: &Path) -> HashSet<PathBuf> {
    let mut files = HashSet::new();
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return files;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        files.insert(entry.path());
    }
    files
}

/// Delete every file in the stem's directory whose name starts with the stem's
/// file name (finished output, `.part` fragments, intermediate streams),
/// except those listed in `preexisting`.
///
/// Returns the number of files removed.
pub async fn remove_partials(stem: &Path, preexisting: &HashSet<PathBuf>) -> usize {
    let (Some(dir), Some(prefix)) = (stem.parent(), stem.file_name()) else {
        return 0;
    };
    let prefix = prefix.to_string_lossy().into_owned();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => return 0,
    };

    let mut removed = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        if !entry.file_name().to_string_lossy().starts_with(&prefix) {
            continue;
        }
        let path = entry.path();
        if preexisting.contains(&path) {
            continue;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Removed partial download");
                removed += 1;
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial download"),
        }
    }
    removed
}

/// `stem` + "." + `ext`, without treating dots already in the stem as an extension
fn with_extension(stem: &Path, ext: &str) -> PathBuf {
    let mut name = OsString::from(stem.as_os_str());
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

async fn newest_file(dir: &Path, preexisting: &HashSet<PathBuf>) -> io::Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut newest: Option<(SystemTime, PathBuf)> = None;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if preexisting.contains(&path) {
            continue;
        }
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        // Creation time is not available on every filesystem
        let stamp = metadata
            .created()
            .or_else(|_| metadata.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);

        if newest.as_ref().is_none_or(|(best, _)| stamp > *best) {
            newest = Some((stamp, path));
        }
    }

    Ok(newest.map(|(_, path)| path))
}
