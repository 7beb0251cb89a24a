// ─── Self Update ───
// Newer launcher builds are downloaded, optionally verified, then handed to an
// external step that swaps the binary and restarts it.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::process::Stdio;

#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::integrity::{self, HashAlgorithm};
use crate::core::progress::ProgressReporter;

/// Remote update descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateInfo {
    #[serde(alias = "Version")]
    pub version: String,
    #[serde(rename = "downloadUrl", alias = "DownloadUrl", alias = "download_url")]
    pub download_url: String,
    /// Hex SHA-256 of the binary, checked before hand-off when present.
    #[serde(default, alias = "Sha256", skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Swaps `current_binary` for `new_binary` and starts it again.
///
/// Implementations run outside the current process; returning `Ok` means the
/// hand-off started, not that it finished.
pub trait BinaryReplacer: Send + Sync {
    fn replace_and_restart(&self, new_binary: &Path, current_binary: &Path) -> LauncherResult<()>;
}

fn parse_version(raw: &str) -> Option<Vec<u64>> {
    raw.trim()
        .trim_start_matches(['v', 'V'])
        .split('.')
        .map(|part| part.parse().ok())
        .collect()
}

/// Dotted numeric ordering; missing components count as zero.
pub fn compare_versions(a: &str, b: &str) -> Option<Ordering> {
    let a = parse_version(a)?;
    let b = parse_version(b)?;
    let len = a.len().max(b.len());
    let component = |v: &[u64], i: usize| v.get(i).copied().unwrap_or(0);
    Some(
        (0..len)
            .map(|i| component(&a, i).cmp(&component(&b, i)))
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal),
    )
}

pub fn is_newer(candidate: &str, current: &str) -> bool {
    match compare_versions(candidate, current) {
        Some(ordering) => ordering == Ordering::Greater,
        None => {
            warn!("Cannot compare versions {:?} and {:?}", candidate, current);
            false
        }
    }
}

/// The remote descriptor when it names a version strictly newer than
/// `current_version`.
#[instrument(skip(downloader))]
pub async fn check_for_update(
    downloader: &Downloader,
    url: &str,
    current_version: &str,
) -> LauncherResult<Option<UpdateInfo>> {
    let (info, _): (UpdateInfo, String) = downloader.fetch_json(url).await?;
    if is_newer(&info.version, current_version) {
        info!("Update available: {} -> {}", current_version, info.version);
        Ok(Some(info))
    } else {
        info!("Launcher {} is up to date (remote {})", current_version, info.version);
        Ok(None)
    }
}

/// Download the new binary to a temp path, verify it when the descriptor
/// carries a hash, then hand it to `replacer` together with the running
/// executable's path.
#[instrument(skip_all, fields(version = %info.version))]
pub async fn perform_update(
    downloader: &Downloader,
    info: &UpdateInfo,
    progress: &dyn ProgressReporter,
    replacer: &dyn BinaryReplacer,
) -> LauncherResult<()> {
    let current = std::env::current_exe().map_err(|source| LauncherError::io("current_exe", source))?;
    let staged = std::env::temp_dir().join(format!(
        "launcher_update_{}{}",
        Uuid::new_v4().simple(),
        std::env::consts::EXE_SUFFIX
    ));

    let result = stage_and_hand_off(downloader, info, progress, replacer, &staged, &current).await;
    if result.is_err() {
        if let Err(err) = tokio::fs::remove_file(&staged).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("Cannot remove staged update {:?}: {}", staged, err);
            }
        }
    }
    result
}

async fn stage_and_hand_off(
    downloader: &Downloader,
    info: &UpdateInfo,
    progress: &dyn ProgressReporter,
    replacer: &dyn BinaryReplacer,
    staged: &Path,
    current: &Path,
) -> LauncherResult<()> {
    let outcome = downloader
        .fetch(&info.download_url, &[], staged, progress)
        .await?;
    info!("Downloaded launcher {} ({} bytes)", info.version, outcome.bytes);

    if let Some(expected) = &info.sha256 {
        let actual = integrity::digest(staged, HashAlgorithm::Sha256).await?;
        if !actual.eq_ignore_ascii_case(expected.trim()) {
            return Err(LauncherError::Integrity {
                path: staged.to_string_lossy().to_string(),
                url: info.download_url.clone(),
                expected: expected.clone(),
                actual,
                size: outcome.bytes,
            });
        }
    }

    replacer.replace_and_restart(staged, current)
}

// ─── Script hand-off ───

/// Writes a platform script that waits, stops the running launcher, deletes
/// the old binary until it is gone, moves the new one in and starts it.
pub struct ScriptReplacer {
    script_dir: PathBuf,
}

impl Default for ScriptReplacer {
    fn default() -> Self {
        Self {
            script_dir: std::env::temp_dir(),
        }
    }
}

impl ScriptReplacer {
    pub fn new(script_dir: PathBuf) -> Self {
        Self { script_dir }
    }

    /// Write the script for this platform and return its path.
    pub fn write_script(&self, new_binary: &Path, current_binary: &Path) -> LauncherResult<PathBuf> {
        let (name, body) = if cfg!(target_os = "windows") {
            ("update_launcher.bat", windows_script(new_binary, current_binary))
        } else {
            (
                "update_launcher.sh",
                unix_script(new_binary, current_binary, std::process::id()),
            )
        };
        std::fs::create_dir_all(&self.script_dir)
            .map_err(|source| LauncherError::io(&self.script_dir, source))?;
        let path = self.script_dir.join(name);
        std::fs::write(&path, body).map_err(|source| LauncherError::io(&path, source))?;
        Ok(path)
    }
}

impl BinaryReplacer for ScriptReplacer {
    fn replace_and_restart(&self, new_binary: &Path, current_binary: &Path) -> LauncherResult<()> {
        let script = self.write_script(new_binary, current_binary)?;
        info!("Handing off to update script {:?}", script);

        let mut cmd = if cfg!(target_os = "windows") {
            let mut cmd = std::process::Command::new("cmd");
            cmd.arg("/C").arg(&script);
            cmd
        } else {
            let mut cmd = std::process::Command::new("sh");
            cmd.arg(&script);
            cmd
        };
        cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

        #[cfg(target_os = "windows")]
        {
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            const DETACHED_PROCESS: u32 = 0x00000008;
            cmd.creation_flags(CREATE_NO_WINDOW | DETACHED_PROCESS);
        }

        cmd.spawn().map_err(|source| LauncherError::Subprocess {
            program: script.to_string_lossy().to_string(),
            code: None,
            output: source.to_string(),
        })?;
        Ok(())
    }
}

fn windows_script(new_binary: &Path, current_binary: &Path) -> String {
    let current = current_binary.display();
    let image = current_binary
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    format!(
        "@echo off\r\n\
timeout /t 2 /nobreak > NUL\r\n\
taskkill /f /im \"{image}\" > NUL 2>&1\r\n\
:retry\r\n\
del \"{current}\" > NUL 2>&1\r\n\
if exist \"{current}\" (\r\n\
    timeout /t 1 /nobreak > NUL\r\n\
    goto retry\r\n\
)\r\n\
move \"{new}\" \"{current}\" > NUL 2>&1\r\n\
start \"\" \"{current}\"\r\n\
del \"%~f0\"\r\n",
        new = new_binary.display(),
    )
}

fn unix_script(new_binary: &Path, current_binary: &Path, pid: u32) -> String {
    let current = current_binary.display();
    format!(
        "#!/bin/sh\n\
sleep 2\n\
kill -9 {pid} 2>/dev/null\n\
while [ -e \"{current}\" ]; do\n\
    rm -f \"{current}\" 2>/dev/null || sleep 1\n\
done\n\
mv \"{new}\" \"{current}\"\n\
chmod +x \"{current}\"\n\
\"{current}\" >/dev/null 2>&1 &\n\
rm -f \"$0\"\n",
        new = new_binary.display(),
    )
}
