// ─── Operations ───
// What a front end calls: each operation takes the shared state, runs one
// engine flow and logs the error it returns.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::core::auth::{TokenStore, UserSession};
use crate::core::error::LauncherResult;
use crate::core::http::{check_internet_connection, check_url_availability, network_info, NetworkInfo};
use crate::core::java::{
    detect_runtime_major_version, resolve_runtime, EnvironmentSnapshot, LegacyRuntimeInstaller,
};
use crate::core::launch::{GameProcess, RuntimeLauncher};
use crate::core::loaders::{install_client_archive, InstallReport, InstallationPipeline};
use crate::core::manifest::fetch_manifest;
use crate::core::progress::ProgressReporter;
use crate::core::reconcile::{ReconcileReport, ReconciliationEngine};
use crate::core::state::AppState;
use crate::core::update::{self, BinaryReplacer, UpdateInfo};
use crate::core::version::{descriptor_path, RuntimeVersionDescriptor};

fn logged<T>(operation: &str, result: LauncherResult<T>) -> LauncherResult<T> {
    if let Err(err) = &result {
        error!("{} failed: {}", operation, err);
    }
    result
}

/// Bring the game directory in line with the remote manifest.
pub async fn verify_game_files(
    state: &AppState,
    progress: &dyn ProgressReporter,
) -> LauncherResult<ReconcileReport> {
    let result = async {
        let config = &state.config;
        let manifest = fetch_manifest(&state.downloader, &config.base_url, &config.manifest_file).await?;
        let engine = ReconciliationEngine::new((*state.downloader).clone(), config.base_url.clone())
            .with_ignored(config.reconcile_ignore.clone());
        let report = engine.reconcile(&manifest, &config.game_dir, progress).await?;
        info!(
            "Game files verified: {} downloaded, {} deleted",
            report.downloaded, report.deleted
        );
        Ok(report)
    }
    .await;
    logged("File verification", result)
}

/// Download and unpack the packaged client into the game directory.
pub async fn install_client(state: &AppState, progress: &dyn ProgressReporter) -> LauncherResult<usize> {
    let config = &state.config;
    let result = install_client_archive(
        &state.downloader,
        &config.client_archive_url(),
        &config.game_dir,
        progress,
    )
    .await;
    logged("Client install", result)
}

/// Run the Forge installation.
pub async fn install_mod_loader(
    state: &AppState,
    progress: &dyn ProgressReporter,
) -> LauncherResult<InstallReport> {
    let mut pipeline = InstallationPipeline::new(&state.downloader, &state.config);
    let result = pipeline.run(progress).await;
    logged("Forge install", result)
}

/// Start the game for `user`; regenerated tokens go to `tokens`.
pub async fn launch_game(
    state: &AppState,
    user: UserSession,
    tokens: &dyn TokenStore,
    java: Option<PathBuf>,
) -> LauncherResult<GameProcess> {
    let config = &state.config;
    let installer = LegacyRuntimeInstaller::new(
        (*state.downloader).clone(),
        config.legacy_runtime_urls.clone(),
        config.legacy_runtime_dir(),
    );
    let mut launcher = RuntimeLauncher::new(config, &state.downloader, &installer, tokens);
    if let Some(java) = java {
        launcher = launcher.with_java(java);
    }
    let result = launcher.launch(user).await;
    logged("Launch", result)
}

pub async fn check_for_update(state: &AppState) -> LauncherResult<Option<UpdateInfo>> {
    let config = &state.config;
    let result =
        update::check_for_update(&state.downloader, &config.update_check_url, &config.current_version)
            .await;
    logged("Update check", result)
}

pub async fn perform_update(
    state: &AppState,
    info: &UpdateInfo,
    progress: &dyn ProgressReporter,
    replacer: &dyn BinaryReplacer,
) -> LauncherResult<()> {
    let result = update::perform_update(&state.downloader, info, progress, replacer).await;
    logged("Update", result)
}

/// Environment and connectivity summary for support requests.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsReport {
    pub launcher_version: String,
    pub os: String,
    pub game_dir: String,
    pub installed_version: Option<String>,
    pub java: String,
    pub java_major: u32,
    pub internet: bool,
    pub network: NetworkInfo,
    pub endpoints: Vec<String>,
}

pub async fn diagnose(state: &AppState) -> LauncherResult<DiagnosticsReport> {
    let config = &state.config;

    let installed_version = RuntimeVersionDescriptor::load(&config.game_dir, &config.version_id)
        .await
        .unwrap_or_else(|err| {
            error!(
                "Cannot read {:?}: {}",
                descriptor_path(&config.game_dir, &config.version_id),
                err
            );
            None
        })
        .map(|descriptor| descriptor.id);

    let legacy_dir = config.legacy_runtime_dir();
    let env = tokio::task::spawn_blocking(move || EnvironmentSnapshot::capture(&legacy_dir))
        .await
        .unwrap_or_default();
    let java = resolve_runtime(&env);
    let java_major = detect_runtime_major_version(&java).await;

    let internet = check_internet_connection(&state.http_client, &config.connectivity_check_url).await;
    if !internet {
        warn!("No internet connection via {}", config.connectivity_check_url);
    }
    let network = network_info().await;

    let urls = [
        config.manifest_url(),
        config.update_check_url.clone(),
        config.forge_installer_url.clone(),
        format!("{}/{}.json", config.assets_base_url.trim_end_matches('/'), config.asset_index_id),
    ];
    let mut endpoints = Vec::with_capacity(urls.len());
    for url in &urls {
        endpoints.push(check_url_availability(&state.http_client, url).await);
    }

    Ok(DiagnosticsReport {
        launcher_version: config.current_version.clone(),
        os: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
        game_dir: config.game_dir.to_string_lossy().to_string(),
        installed_version,
        java: java.to_string_lossy().to_string(),
        java_major,
        internet,
        network,
        endpoints,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::manifest::{FileEntry, Manifest};
    use crate::core::progress::NullProgress;
    use crate::core::state::LauncherConfig;
    use sha2::{Digest, Sha256};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn verify_downloads_and_prunes() {
        let server = MockServer::start().await;
        let body = b"mod bytes".to_vec();
        let manifest = Manifest {
            version: "1".into(),
            files: vec![FileEntry::new(
                "mods/a.jar",
                &hex::encode(Sha256::digest(&body)),
                body.len() as u64,
            )],
        };
        Mock::given(method("GET"))
            .and(path("/manifest.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&manifest))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/mods/a.jar"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let game_dir = dir.path().join("game");
        std::fs::create_dir_all(game_dir.join("mods")).unwrap();
        std::fs::write(game_dir.join("mods/stale.jar"), b"old").unwrap();

        let config = LauncherConfig {
            base_url: format!("{}/", server.uri()),
            game_dir: game_dir.clone(),
            ..LauncherConfig::default()
        };
        let state = AppState::new(config, dir.path().join("launcher_config.json")).unwrap();

        let report = verify_game_files(&state, &NullProgress).await.unwrap();

        assert_eq!(report.downloaded, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(std::fs::read(game_dir.join("mods/a.jar")).unwrap(), body);
        assert!(!game_dir.join("mods/stale.jar").exists());
    }

    #[tokio::test]
    async fn update_check_reads_configured_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/launcher/version.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "version": "0.0.1",
                "downloadUrl": "https://example.invalid/launcher"
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = LauncherConfig {
            update_check_url: format!("{}/launcher/version.json", server.uri()),
            current_version: "1.0.0".into(),
            ..LauncherConfig::default()
        };
        let state = AppState::new(config, dir.path().join("launcher_config.json")).unwrap();

        assert!(check_for_update(&state).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn diagnose_reports_connectivity_and_endpoints() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/generate_204"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = LauncherConfig {
            base_url: format!("{}/", server.uri()),
            connectivity_check_url: format!("{}/generate_204", server.uri()),
            update_check_url: format!("{}/launcher/version.json", server.uri()),
            forge_installer_url: format!("{}/forge.jar", server.uri()),
            assets_base_url: server.uri(),
            game_dir: dir.path().join("game"),
            data_dir: dir.path().join("data"),
            ..LauncherConfig::default()
        };
        let state = AppState::new(config, dir.path().join("launcher_config.json")).unwrap();

        let report = diagnose(&state).await.unwrap();

        assert!(report.internet);
        assert_eq!(report.installed_version, None);
        assert_eq!(report.endpoints.len(), 4);
        assert!(report.endpoints.iter().all(|line| line.contains("HTTP 404")), "{:?}", report.endpoints);
    }
}
