use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::core::error::{LauncherError, LauncherResult};

const LEASE_STALE_SECS: i64 = 60 * 10;
const LEASE_POLL: Duration = Duration::from_millis(250);

/// Exclusive claim on a content root, held for the duration of a
/// reconciliation or installation. The lock file lives beside the root so it
/// never shows up as an extraneous file inside it.
#[derive(Debug)]
pub struct ContentRootLease {
    path: PathBuf,
}

impl ContentRootLease {
    /// Wait until the root is free, then claim it.
    pub async fn acquire(root: &Path) -> LauncherResult<Self> {
        let lock_path = lease_path(root);
        if let Some(parent) = lock_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| LauncherError::io(parent, source))?;
        }

        let mut attempts = 0_u32;
        loop {
            attempts += 1;
            match tokio::fs::OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&lock_path)
                .await
            {
                Ok(mut file) => {
                    let payload = serde_json::to_vec(&LeaseHolder {
                        pid: std::process::id(),
                        timestamp: Utc::now().timestamp(),
                    })?;
                    file.write_all(&payload)
                        .await
                        .map_err(|source| LauncherError::io(&lock_path, source))?;
                    debug!("Acquired content root lease {:?}", lock_path);
                    return Ok(Self { path: lock_path });
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    reclaim_if_stale(&lock_path).await;
                    if attempts % 20 == 0 {
                        info!("Waiting for content root lease at {:?}", lock_path);
                    }
                    tokio::time::sleep(LEASE_POLL).await;
                }
                Err(source) => return Err(LauncherError::io(&lock_path, source)),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ContentRootLease {
    fn drop(&mut self) {
        if let Err(source) = std::fs::remove_file(&self.path) {
            warn!("Failed to release lease {:?}: {}", self.path, source);
        }
    }
}

fn lease_path(root: &Path) -> PathBuf {
    match (root.parent(), root.file_name()) {
        (Some(parent), Some(name)) => {
            parent.join(format!(".{}.lock", name.to_string_lossy()))
        }
        _ => std::env::temp_dir().join("launcher-content-root.lock"),
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LeaseHolder {
    pid: u32,
    timestamp: i64,
}

/// Remove the lock when its holder is gone or it is older than
/// `LEASE_STALE_SECS`. A lock without a readable payload is aged by its
/// modification time.
async fn reclaim_if_stale(lock_path: &Path) {
    let content = tokio::fs::read_to_string(lock_path).await.unwrap_or_default();
    let (pid, age) = match serde_json::from_str::<LeaseHolder>(&content) {
        Ok(holder) => (
            Some(holder.pid),
            Utc::now().timestamp().saturating_sub(holder.timestamp),
        ),
        Err(_) => match modified_age_secs(lock_path).await {
            Some(age) => (None, age),
            None => return,
        },
    };

    let expired = age > LEASE_STALE_SECS;
    let dead = pid.is_some_and(holder_is_dead);
    if !(expired || dead) {
        return;
    }

    warn!("Reclaiming stale lease {:?} (pid {:?}, age {}s)", lock_path, pid, age);
    match tokio::fs::remove_file(lock_path).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!("Cannot remove stale lease {:?}: {}", lock_path, err),
    }
}

async fn modified_age_secs(path: &Path) -> Option<i64> {
    let modified = tokio::fs::metadata(path).await.ok()?.modified().ok()?;
    let age = SystemTime::now()
        .duration_since(modified)
        .unwrap_or_default()
        .as_secs();
    Some(i64::try_from(age).unwrap_or(i64::MAX))
}

#[cfg(target_os = "linux")]
fn holder_is_dead(pid: u32) -> bool {
    !PathBuf::from(format!("/proc/{pid}")).exists()
}

#[cfg(not(target_os = "linux"))]
fn holder_is_dead(_pid: u32) -> bool {
    false
}
