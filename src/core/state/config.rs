use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::error::{LauncherError, LauncherResult};

const APP_DIR_NAME: &str = "MinecraftLauncher";
pub const CONFIG_FILE: &str = "launcher_config.json";

/// Every setting the launcher reads. Missing keys fall back to [`Default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// Content and library mirror base, always ending in `/`.
    pub base_url: String,
    pub manifest_file: String,

    pub current_version: String,
    pub update_check_url: String,

    pub forge_installer_url: String,
    pub forge_version: String,
    pub game_version: String,
    pub version_id: String,

    pub asset_index_id: String,
    pub assets_base_url: String,

    /// Fetched by diagnostics to tell "offline" from "mirror down".
    pub connectivity_check_url: String,

    pub game_dir: PathBuf,
    pub data_dir: PathBuf,

    pub max_memory: String,
    pub launch_grace_secs: u64,
    pub request_timeout_secs: u64,
    pub download_concurrency: usize,

    /// Relative path prefixes never treated as extraneous during reconciliation.
    pub reconcile_ignore: Vec<String>,
    /// Ordered sources for the legacy runtime artifact.
    pub legacy_runtime_urls: Vec<String>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        let base = default_base_dir();
        let base_url = "https://sqmccraft.online/minecraft/".to_string();
        let forge_version = "1.12.2-14.23.5.2860".to_string();
        Self {
            forge_installer_url: format!(
                "https://maven.minecraftforge.net/net/minecraftforge/forge/{0}/forge-{0}-installer.jar",
                forge_version
            ),
            update_check_url: format!("{}launcher/version.json", base_url),
            base_url,
            manifest_file: "manifest.json".into(),
            current_version: env!("CARGO_PKG_VERSION").into(),
            forge_version,
            game_version: "1.12.2".into(),
            version_id: "forge-1.12.2".into(),
            asset_index_id: "1.12".into(),
            assets_base_url: "https://resources.download.minecraft.net".into(),
            connectivity_check_url: "http://www.google.com".into(),
            game_dir: base.join(".minecrafttest"),
            data_dir: base.join(APP_DIR_NAME),
            max_memory: "2G".into(),
            launch_grace_secs: 2,
            request_timeout_secs: 60,
            download_concurrency: 1,
            reconcile_ignore: Vec::new(),
            legacy_runtime_urls: default_legacy_runtime_urls(),
        }
    }
}

impl LauncherConfig {
    /// `<platform data dir>/MinecraftLauncher/launcher_config.json`
    pub fn default_path() -> PathBuf {
        default_base_dir().join(APP_DIR_NAME).join(CONFIG_FILE)
    }

    /// Read the config file. A missing file yields defaults; a malformed one is an error.
    pub async fn load_from(path: &Path) -> LauncherResult<Self> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("No config at {:?}, using defaults", path);
                return Ok(Self::default());
            }
            Err(source) => return Err(LauncherError::io(path, source)),
        };
        let mut config: Self = serde_json::from_str(&raw)?;
        config.normalize();
        debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub async fn save_to(&self, path: &Path) -> LauncherResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| LauncherError::io(parent, source))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json)
            .await
            .map_err(|source| LauncherError::io(path, source))?;
        Ok(())
    }

    fn normalize(&mut self) {
        if !self.base_url.ends_with('/') {
            self.base_url.push('/');
        }
        if self.download_concurrency == 0 {
            warn!("download_concurrency 0 is invalid, using 1");
            self.download_concurrency = 1;
        }
    }

    pub fn manifest_url(&self) -> String {
        format!("{}{}", self.base_url, self.manifest_file)
    }

    /// Pre-packaged base client for the configured game version.
    pub fn client_archive_url(&self) -> String {
        format!("{}minecraft_client_{}.zip", self.base_url, self.game_version)
    }

    /// The project's own library mirror.
    pub fn libraries_mirror(&self) -> String {
        format!("{}libraries", self.base_url)
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.game_dir.join("libraries")
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.game_dir.join("assets")
    }

    pub fn natives_dir(&self) -> PathBuf {
        self.game_dir.join("natives")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    /// Where a zip-packaged legacy runtime is unpacked.
    pub fn legacy_runtime_dir(&self) -> PathBuf {
        self.data_dir.join("runtime").join("java8")
    }
}

fn default_base_dir() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn default_legacy_runtime_urls() -> Vec<String> {
    if cfg!(target_os = "windows") {
        const RELEASE: &str =
            "https://github.com/adoptium/temurin8-binaries/releases/download/jdk8u392-b08";
        vec![
            format!("{RELEASE}/OpenJDK8U-jre_x64_windows_hotspot_8u392b08.msi"),
            format!("{RELEASE}/OpenJDK8U-jdk_x64_windows_hotspot_8u392b08.msi"),
        ]
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = LauncherConfig::load_from(&dir.path().join(CONFIG_FILE))
            .await
            .unwrap();
        assert_eq!(config, LauncherConfig::default());
        assert_eq!(config.download_concurrency, 1);
        assert_eq!(config.request_timeout_secs, 60);
        assert!(config.game_dir.ends_with(".minecrafttest"));
    }

    #[tokio::test]
    async fn partial_file_keeps_defaults_for_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            r#"{"base_url": "https://mirror.example/game", "download_concurrency": 0}"#,
        )
        .unwrap();

        let config = LauncherConfig::load_from(&path).await.unwrap();
        assert_eq!(config.base_url, "https://mirror.example/game/");
        assert_eq!(config.manifest_url(), "https://mirror.example/game/manifest.json");
        assert_eq!(config.libraries_mirror(), "https://mirror.example/game/libraries");
        assert_eq!(config.download_concurrency, 1);
        assert_eq!(config.version_id, "forge-1.12.2");
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let config = LauncherConfig {
            max_memory: "4G".into(),
            reconcile_ignore: vec!["screenshots/".into()],
            ..LauncherConfig::default()
        };
        config.save_to(&path).await.unwrap();
        assert_eq!(LauncherConfig::load_from(&path).await.unwrap(), config);
    }

    #[tokio::test]
    async fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            LauncherConfig::load_from(&path).await,
            Err(LauncherError::Json(_))
        ));
    }
}
