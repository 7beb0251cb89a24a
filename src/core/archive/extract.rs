// ─── Archive Extraction ───
// Zip unpacking for client archives (paths kept) and native bundles (flat).

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::progress::ProgressReporter;

fn open_archive(archive_path: &Path) -> LauncherResult<zip::ZipArchive<File>> {
    let file = File::open(archive_path).map_err(|source| LauncherError::io(archive_path, source))?;
    Ok(zip::ZipArchive::new(file)?)
}

fn write_entry<R: std::io::Read>(entry: &mut R, out_path: &Path) -> LauncherResult<()> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| LauncherError::io(parent, source))?;
    }
    let mut out = File::create(out_path).map_err(|source| LauncherError::io(out_path, source))?;
    std::io::copy(entry, &mut out).map_err(|source| LauncherError::io(out_path, source))?;
    Ok(())
}

/// Unpack every entry of `archive_path` under `dest_dir`, keeping relative
/// paths and overwriting existing files. Reports `(files_done, files_total,
/// entry_name)` after each file. Entries whose names would escape `dest_dir`
/// are skipped.
pub fn extract_all(
    archive_path: &Path,
    dest_dir: &Path,
    progress: &dyn ProgressReporter,
) -> LauncherResult<usize> {
    let mut archive = open_archive(archive_path)?;
    std::fs::create_dir_all(dest_dir).map_err(|source| LauncherError::io(dest_dir, source))?;

    let total_files = archive.file_names().filter(|name| !name.ends_with('/')).count() as u64;
    let mut written = 0usize;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let Some(relative) = entry.enclosed_name() else {
            warn!("Skipping unsafe archive entry {}", entry.name());
            continue;
        };
        let out_path = dest_dir.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|source| LauncherError::io(&out_path, source))?;
            continue;
        }

        write_entry(&mut entry, &out_path)?;
        written += 1;
        progress.report(written as u64, total_files, entry.name());
    }

    debug!("Extracted {} files from {:?} into {:?}", written, archive_path, dest_dir);
    Ok(written)
}

/// Write every file entry of `archive_path` directly into `dest_dir` under its
/// base name, discarding directory structure. Directory entries are skipped.
pub fn extract_flattened(archive_path: &Path, dest_dir: &Path) -> LauncherResult<Vec<PathBuf>> {
    let mut archive = open_archive(archive_path)?;
    std::fs::create_dir_all(dest_dir).map_err(|source| LauncherError::io(dest_dir, source))?;

    let mut extracted = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }

        let base_name = entry
            .enclosed_name()
            .and_then(|path| path.file_name().map(|name| name.to_os_string()));
        let Some(base_name) = base_name else {
            warn!("Skipping archive entry without a file name: {}", entry.name());
            continue;
        };

        let out_path = dest_dir.join(base_name);
        write_entry(&mut entry, &out_path)?;
        extracted.push(out_path);
    }

    debug!(
        "Extracted {} native files from {:?}",
        extracted.len(),
        archive_path
    );
    Ok(extracted)
}

// ── Off the async runtime ───────────────────────────

fn join_error(err: tokio::task::JoinError) -> LauncherError {
    LauncherError::Other(format!("Task join error: {err}"))
}

/// [`extract_all`] on the blocking pool. Progress is forwarded back and
/// reported from the calling task.
pub async fn unpack_all(
    archive_path: &Path,
    dest_dir: &Path,
    progress: &dyn ProgressReporter,
) -> LauncherResult<usize> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<(u64, u64, String)>();
    let archive_path = archive_path.to_path_buf();
    let dest_dir = dest_dir.to_path_buf();
    let task = tokio::task::spawn_blocking(move || {
        let forward = move |current: u64, total: u64, label: &str| {
            let _ = tx.send((current, total, label.to_string()));
        };
        extract_all(&archive_path, &dest_dir, &forward)
    });

    while let Some((current, total, label)) = rx.recv().await {
        progress.report(current, total, &label);
    }
    task.await.map_err(join_error)?
}

/// [`extract_flattened`] on the blocking pool.
pub async fn unpack_flattened(archive_path: &Path, dest_dir: &Path) -> LauncherResult<Vec<PathBuf>> {
    let archive_path = archive_path.to_path_buf();
    let dest_dir = dest_dir.to_path_buf();
    tokio::task::spawn_blocking(move || extract_flattened(&archive_path, &dest_dir))
        .await
        .map_err(join_error)?
}
