use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Serialize;
use tokio::process::Command;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::libraries::{ensure_libraries, library_table, public_mirrors};
use crate::core::assets::AssetManager;
use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::java::{resolve_runtime, EnvironmentSnapshot};
use crate::core::process::{format_command_for_logs, CapturedOutput};
use crate::core::progress::ProgressReporter;
use crate::core::reconcile::ContentRootLease;
use crate::core::state::LauncherConfig;
use crate::core::version::{current_os_name, RuntimeVersionDescriptor};

/// Main class of the 1.12.2 Forge client.
pub const FORGE_MAIN_CLASS: &str = "net.minecraftforge.fml.client.Launcher";

/// Game argument template written into the descriptor.
pub const ARGUMENT_TEMPLATE: &str = "--username ${auth_player_name} --version ${version_name} \
--gameDir ${game_directory} --assetsDir ${assets_root} --assetIndex ${assets_index_name} \
--uuid ${auth_uuid} --accessToken ${auth_access_token} --userType ${user_type} \
--versionType ${version_type}";

const LAUNCHER_PROFILES: &str = "launcher_profiles.json";

/// Installation progress. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStage {
    NotInstalled,
    InstallerDownloaded,
    InstallerRun,
    VersionDescriptorWritten,
    LibrariesResolved,
    AssetsSynced,
    Installed,
}

/// What the caller needs to judge whether the install is good enough to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub stage: InstallStage,
    /// Coordinates of libraries no mirror could supply.
    pub missing_libraries: Vec<String>,
    /// Logical names of asset objects that failed.
    pub failed_assets: Vec<String>,
}

impl InstallReport {
    pub fn is_complete(&self) -> bool {
        self.missing_libraries.is_empty() && self.failed_assets.is_empty()
    }
}

/// Forge install: installer download and run, descriptor synthesis, library
/// resolution and asset sync.
pub struct InstallationPipeline<'a> {
    downloader: &'a Downloader,
    config: &'a LauncherConfig,
    java: Option<PathBuf>,
    library_mirrors: Vec<String>,
    stage: InstallStage,
}

impl<'a> InstallationPipeline<'a> {
    pub fn new(downloader: &'a Downloader, config: &'a LauncherConfig) -> Self {
        let library_mirrors = std::iter::once(config.libraries_mirror())
            .chain(public_mirrors())
            .collect();
        Self {
            downloader,
            config,
            java: None,
            library_mirrors,
            stage: InstallStage::NotInstalled,
        }
    }

    /// Run the installer with this runtime instead of discovering one.
    pub fn with_java(mut self, java: PathBuf) -> Self {
        self.java = Some(java);
        self
    }

    /// Replace the library mirror bases (own mirror first).
    pub fn with_library_mirrors(mut self, mirrors: Vec<String>) -> Self {
        self.library_mirrors = mirrors;
        self
    }

    pub fn stage(&self) -> InstallStage {
        self.stage
    }

    fn advance(&mut self, next: InstallStage) {
        debug_assert!(next > self.stage, "{:?} -> {:?}", self.stage, next);
        info!("Install stage {:?} -> {:?}", self.stage, next);
        self.stage = next;
    }

    /// Drive every stage. Soft failures (libraries, asset objects) land in the
    /// report; everything else aborts with the stage reached so far kept.
    #[instrument(skip(self, progress), fields(version = %self.config.version_id))]
    pub async fn run(&mut self, progress: &dyn ProgressReporter) -> LauncherResult<InstallReport> {
        let game_dir = self.config.game_dir.clone();
        tokio::fs::create_dir_all(&game_dir)
            .await
            .map_err(|source| LauncherError::io(&game_dir, source))?;
        let _lease = ContentRootLease::acquire(&game_dir).await?;

        let installer = std::env::temp_dir().join(format!("forge-installer-{}.jar", Uuid::new_v4().simple()));
        info!("Downloading Forge installer from {}", self.config.forge_installer_url);
        self.downloader
            .fetch(&self.config.forge_installer_url, &[], &installer, progress)
            .await?;
        self.advance(InstallStage::InstallerDownloaded);

        let java = self.installer_runtime().await?;
        ensure_launcher_profiles(&game_dir).await?;
        let result = run_installer(&java, &installer, &game_dir).await;
        if let Err(err) = tokio::fs::remove_file(&installer).await {
            warn!("Cannot remove installer {:?}: {}", installer, err);
        }
        result?;
        self.advance(InstallStage::InstallerRun);

        let descriptor = self.forge_descriptor()?;
        descriptor.save(&game_dir).await?;
        self.advance(InstallStage::VersionDescriptorWritten);

        let missing_libraries = ensure_libraries(
            self.downloader,
            &descriptor,
            &self.config.libraries_dir(),
            &self.library_mirrors,
            current_os_name(),
        )
        .await;
        self.advance(InstallStage::LibrariesResolved);

        let assets = AssetManager::new(self.downloader, &self.config.assets_base_url)
            .sync(&self.config.asset_index_id, &self.config.assets_dir(), progress)
            .await?;
        self.advance(InstallStage::AssetsSynced);

        self.advance(InstallStage::Installed);
        let report = InstallReport {
            stage: self.stage,
            missing_libraries,
            failed_assets: assets.failed,
        };
        if report.is_complete() {
            info!("Forge {} installed", self.config.forge_version);
        } else {
            warn!(
                "Forge {} installed with {} missing libraries and {} failed assets",
                self.config.forge_version,
                report.missing_libraries.len(),
                report.failed_assets.len()
            );
        }
        Ok(report)
    }

    async fn installer_runtime(&self) -> LauncherResult<PathBuf> {
        if let Some(java) = &self.java {
            return Ok(java.clone());
        }
        let legacy_dir = self.config.legacy_runtime_dir();
        let env = tokio::task::spawn_blocking(move || EnvironmentSnapshot::capture(&legacy_dir))
            .await
            .map_err(|e| LauncherError::Other(format!("runtime discovery failed: {}", e)))?;
        Ok(resolve_runtime(&env))
    }

    /// The descriptor for the configured version: fixed main class, fixed
    /// argument template and the fixed library table.
    pub fn forge_descriptor(&self) -> LauncherResult<RuntimeVersionDescriptor> {
        Ok(RuntimeVersionDescriptor {
            id: self.config.version_id.clone(),
            main_class: FORGE_MAIN_CLASS.to_string(),
            argument_template: ARGUMENT_TEMPLATE.to_string(),
            libraries: library_table(&self.config.libraries_mirror(), &self.config.forge_version)?,
        })
    }
}

/// The Forge installer refuses to run without a launcher profile file.
async fn ensure_launcher_profiles(game_dir: &Path) -> LauncherResult<()> {
    let path = game_dir.join(LAUNCHER_PROFILES);
    if path.exists() {
        return Ok(());
    }
    tokio::fs::write(&path, br#"{"profiles":{},"selectedProfile":null}"#)
        .await
        .map_err(|source| LauncherError::io(&path, source))
}

/// `java -jar <installer> --installClient` inside the game directory.
async fn run_installer(java: &Path, installer: &Path, game_dir: &Path) -> LauncherResult<()> {
    let mut cmd = Command::new(java);
    cmd.arg("-jar")
        .arg(installer)
        .arg("--installClient")
        .current_dir(game_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    info!("Running Forge installer: {}", format_command_for_logs(&cmd));

    let mut child = cmd.spawn().map_err(|source| LauncherError::Subprocess {
        program: java.to_string_lossy().to_string(),
        code: None,
        output: source.to_string(),
    })?;
    let output = CapturedOutput::attach(&mut child, "installer");
    let status = child
        .wait()
        .await
        .map_err(|source| LauncherError::io(installer, source))?;
    let output = output.finish().await;

    if !status.success() {
        return Err(LauncherError::Subprocess {
            program: "forge installer".into(),
            code: status.code(),
            output,
        });
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::http::build_http_client;
    use crate::core::loaders::libraries::required_artifacts;
    use crate::core::progress::NullProgress;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fake_java(dir: &Path, exit_code: i32) -> PathBuf {
        let java = dir.join("java");
        std::fs::write(
            &java,
            format!(
                "#!/bin/sh\n[ \"$3\" = \"--installClient\" ] || exit 64\necho \"installing client\"\necho \"warning\" >&2\nexit {exit_code}\n"
            ),
        )
        .unwrap();
        std::fs::set_permissions(&java, std::fs::Permissions::from_mode(0o755)).unwrap();
        java
    }

    async fn server_with_installer_and_index() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forge-installer.jar"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK-installer".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/1.12.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"objects": {}})))
            .mount(&server)
            .await;
        server
    }

    fn config_for(server: &MockServer, game_dir: &Path) -> LauncherConfig {
        LauncherConfig {
            base_url: format!("{}/", server.uri()),
            forge_installer_url: format!("{}/forge-installer.jar", server.uri()),
            assets_base_url: server.uri(),
            game_dir: game_dir.to_path_buf(),
            ..LauncherConfig::default()
        }
    }

    fn downloader() -> Downloader {
        Downloader::new(build_http_client(Duration::from_secs(5)).unwrap())
    }

    #[tokio::test]
    async fn soft_library_failure_still_reaches_installed() {
        let server = server_with_installer_and_index().await;
        let dir = tempfile::tempdir().unwrap();
        let game_dir = dir.path().join("game");
        let java = fake_java(dir.path(), 0);
        let config = config_for(&server, &game_dir);
        let downloader = downloader();

        // Everything is already on disk except guava.
        let mut pipeline = InstallationPipeline::new(&downloader, &config)
            .with_java(java)
            .with_library_mirrors(vec![
                format!("{}/own", server.uri()),
                format!("{}/central", server.uri()),
                format!("{}/github", server.uri()),
            ]);
        let descriptor = pipeline.forge_descriptor().unwrap();
        for library in &descriptor.libraries {
            if library.name == "com.google.guava:guava:21.0" {
                continue;
            }
            for artifact in required_artifacts(library, current_os_name()) {
                let dest = config.libraries_dir().join(&artifact.path);
                std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
                std::fs::write(dest, b"jar").unwrap();
            }
        }

        let report = pipeline.run(&NullProgress).await.unwrap();

        assert_eq!(report.stage, InstallStage::Installed);
        assert_eq!(pipeline.stage(), InstallStage::Installed);
        assert_eq!(report.missing_libraries, vec!["com.google.guava:guava:21.0".to_string()]);
        assert!(report.failed_assets.is_empty());
        assert!(!report.is_complete());

        assert!(game_dir.join(LAUNCHER_PROFILES).exists());
        let saved = RuntimeVersionDescriptor::load(&game_dir, "forge-1.12.2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved.main_class, FORGE_MAIN_CLASS);
        assert_eq!(saved.argument_template, ARGUMENT_TEMPLATE);

        // All three mirrors were asked for guava, in order.
        let guava_requests: Vec<String> = server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.url.path().to_string())
            .filter(|p| p.ends_with("guava-21.0.jar"))
            .collect();
        assert_eq!(guava_requests.len(), 3);
        assert!(guava_requests[0].starts_with("/own/"));
        assert!(guava_requests[1].starts_with("/central/"));
        assert!(guava_requests[2].starts_with("/github/"));
    }

    #[tokio::test]
    async fn installer_failure_is_fatal() {
        let server = server_with_installer_and_index().await;
        let dir = tempfile::tempdir().unwrap();
        let game_dir = dir.path().join("game");
        let config = config_for(&server, &game_dir);
        let downloader = downloader();

        let mut pipeline =
            InstallationPipeline::new(&downloader, &config).with_java(fake_java(dir.path(), 3));
        let err = pipeline.run(&NullProgress).await.unwrap_err();

        match err {
            LauncherError::Subprocess { code, output, .. } => {
                assert_eq!(code, Some(3));
                assert!(output.contains("installing client"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(pipeline.stage(), InstallStage::InstallerDownloaded);
        assert!(!crate::core::version::descriptor_path(&game_dir, "forge-1.12.2").exists());
    }

    #[tokio::test]
    async fn missing_installer_is_fatal() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(&server, &dir.path().join("game"));
        let downloader = downloader();

        let mut pipeline =
            InstallationPipeline::new(&downloader, &config).with_java(fake_java(dir.path(), 0));
        let err = pipeline.run(&NullProgress).await.unwrap_err();
        assert!(matches!(err, LauncherError::Network { .. }));
        assert_eq!(pipeline.stage(), InstallStage::NotInstalled);
    }
}
