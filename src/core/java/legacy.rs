use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::runtime::{locate_java_binary, EnvironmentSnapshot};
use crate::core::archive;
use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::progress::NullProgress;

/// Installs a runtime the game can start with after the current one was
/// rejected.
#[async_trait]
pub trait RuntimeInstaller: Send + Sync {
    /// `env` is the environment as it looked before installing; implementations
    /// skip work when it already holds a suitable runtime.
    async fn install(&self, env: &EnvironmentSnapshot) -> LauncherResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArtifactKind {
    Msi,
    Zip,
}

impl ArtifactKind {
    fn from_url(url: &str) -> Option<Self> {
        let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
        if path.ends_with(".msi") {
            Some(Self::Msi)
        } else if path.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }
}

/// Fetches the legacy runtime through the mirrored downloader and installs
/// it unattended (`.msi`) or unpacks it into `runtime_dir` (`.zip`).
pub struct LegacyRuntimeInstaller {
    downloader: Downloader,
    sources: Vec<String>,
    runtime_dir: PathBuf,
}

impl LegacyRuntimeInstaller {
    pub fn new(downloader: Downloader, sources: Vec<String>, runtime_dir: PathBuf) -> Self {
        Self {
            downloader,
            sources,
            runtime_dir,
        }
    }

    async fn run_msi(&self, package: &Path) -> LauncherResult<()> {
        info!("Running msiexec for {:?}", package);
        let status = Command::new("msiexec")
            .arg("/i")
            .arg(package)
            .args(["/quiet", "/norestart"])
            .status()
            .await
            .map_err(|source| LauncherError::io(package, source))?;

        if !status.success() {
            // 1603 is the generic fatal code, usually missing elevation.
            return Err(LauncherError::VersionIncompatibility(format!(
                "legacy runtime installer exited with {:?}",
                status.code()
            )));
        }
        Ok(())
    }

    async fn unpack_zip(&self, archive_path: &Path) -> LauncherResult<()> {
        archive::unpack_all(archive_path, &self.runtime_dir, &NullProgress).await?;

        let java = locate_java_binary(&self.runtime_dir);
        if !java.is_file() {
            return Err(LauncherError::VersionIncompatibility(format!(
                "no java binary inside {:?}",
                archive_path
            )));
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&java, std::fs::Permissions::from_mode(0o755))
                .map_err(|source| LauncherError::io(&java, source))?;
        }
        info!("Legacy runtime unpacked, java at {:?}", java);
        Ok(())
    }
}

#[async_trait]
impl RuntimeInstaller for LegacyRuntimeInstaller {
    #[instrument(skip(self, env))]
    async fn install(&self, env: &EnvironmentSnapshot) -> LauncherResult<()> {
        if env.has_legacy_runtime() {
            info!("Legacy runtime already present, skipping installation");
            return Ok(());
        }
        let Some((primary, fallbacks)) = self.sources.split_first() else {
            return Err(LauncherError::VersionIncompatibility(
                "no legacy runtime source configured".into(),
            ));
        };

        let package = std::env::temp_dir().join(format!("legacy_runtime_{}.download", Uuid::new_v4().simple()));
        let outcome = self
            .downloader
            .fetch(primary, fallbacks, &package, &NullProgress)
            .await?;

        let result = match ArtifactKind::from_url(&outcome.url) {
            Some(ArtifactKind::Msi) => {
                let msi = package.with_extension("msi");
                tokio::fs::rename(&package, &msi)
                    .await
                    .map_err(|source| LauncherError::io(&package, source))?;
                let result = self.run_msi(&msi).await;
                remove_package(&msi).await;
                result
            }
            Some(ArtifactKind::Zip) => {
                let result = self.unpack_zip(&package).await;
                remove_package(&package).await;
                result
            }
            None => {
                remove_package(&package).await;
                Err(LauncherError::VersionIncompatibility(format!(
                    "unsupported legacy runtime artifact {}",
                    outcome.url
                )))
            }
        };

        if let Err(err) = &result {
            warn!("Legacy runtime installation failed: {}", err);
        }
        result
    }
}

async fn remove_package(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        warn!("Cannot remove runtime package {:?}: {}", path, err);
    }
}
