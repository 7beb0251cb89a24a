use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::info;

use super::config::LauncherConfig;
use crate::core::downloader::Downloader;
use crate::core::error::LauncherResult;
use crate::core::http::build_http_client;

/// Shared state handed to every operation: the loaded config plus one
/// HTTP client and downloader reused across calls.
pub struct AppState {
    pub config: LauncherConfig,
    pub config_path: PathBuf,
    pub http_client: Client,
    pub downloader: Arc<Downloader>,
}

impl AppState {
    pub fn new(config: LauncherConfig, config_path: PathBuf) -> LauncherResult<Self> {
        let http_client = build_http_client(Duration::from_secs(config.request_timeout_secs))?;
        let downloader = Arc::new(
            Downloader::new(http_client.clone()).with_concurrency(config.download_concurrency),
        );
        Ok(Self {
            config,
            config_path,
            http_client,
            downloader,
        })
    }

    /// Load the config at `config_path` (defaults when absent) and build the clients.
    pub async fn load(config_path: &Path) -> LauncherResult<Self> {
        let config = LauncherConfig::load_from(config_path).await?;
        info!(
            "Launcher {} using game dir {:?}",
            config.current_version, config.game_dir
        );
        Self::new(config, config_path.to_path_buf())
    }

    pub async fn save_config(&self) -> LauncherResult<()> {
        self.config.save_to(&self.config_path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_applies_download_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("launcher_config.json");
        std::fs::write(&path, r#"{"download_concurrency": 4}"#).unwrap();

        let state = AppState::load(&path).await.unwrap();
        assert_eq!(state.downloader.concurrency(), 4);

        state.save_config().await.unwrap();
        let saved = LauncherConfig::load_from(&path).await.unwrap();
        assert_eq!(saved.download_concurrency, 4);
    }
}
