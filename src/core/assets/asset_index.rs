use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::integrity::{self, HashAlgorithm};
use crate::core::progress::{NullProgress, ProgressReporter};

/// Top-level asset index JSON structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetIndex {
    pub objects: BTreeMap<String, AssetObject>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssetObject {
    /// SHA-1 of the object, also its storage name.
    pub hash: String,
    pub size: u64,
}

impl AssetObject {
    /// `xx/xxxxxxxx…` where `xx` is the first two hex characters of the hash.
    /// `None` unless the hash is 40 lowercase hex characters.
    pub fn relative_path(&self) -> Option<String> {
        if !is_sha1_hex(&self.hash) {
            return None;
        }
        Some(format!("{}/{}", &self.hash[..2], self.hash))
    }
}

fn is_sha1_hex(hash: &str) -> bool {
    hash.len() == 40 && hash.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Outcome of an asset sync. Individual object failures do not fail the sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetSyncReport {
    pub total: usize,
    pub already_present: usize,
    pub downloaded: usize,
    /// Logical names of objects that could not be fetched and verified.
    pub failed: Vec<String>,
}

pub fn index_path(assets_dir: &Path, index_id: &str) -> PathBuf {
    assets_dir.join("indexes").join(format!("{}.json", index_id))
}

/// Manages content-addressed asset downloads.
pub struct AssetManager<'a> {
    downloader: &'a Downloader,
    base_url: String,
}

impl<'a> AssetManager<'a> {
    pub fn new(downloader: &'a Downloader, base_url: &str) -> Self {
        Self {
            downloader,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Download the index `{base}/{index_id}.json`, store it under
    /// `indexes/`, then fetch every object not already present and verified.
    ///
    /// A failed index download is fatal; failed objects are only counted.
    #[instrument(skip(self, assets_dir, progress))]
    pub async fn sync(
        &self,
        index_id: &str,
        assets_dir: &Path,
        progress: &dyn ProgressReporter,
    ) -> LauncherResult<AssetSyncReport> {
        let index_url = format!("{}/{}.json", self.base_url, index_id);
        let (index, raw): (AssetIndex, String) = self.downloader.fetch_json(&index_url).await?;

        let index_file = index_path(assets_dir, index_id);
        if let Some(parent) = index_file.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| LauncherError::io(parent, source))?;
        }
        tokio::fs::write(&index_file, &raw)
            .await
            .map_err(|source| LauncherError::io(&index_file, source))?;

        let objects_dir = assets_dir.join("objects");
        let total = index.objects.len();
        let mut report = AssetSyncReport {
            total,
            ..AssetSyncReport::default()
        };

        let mut pending = Vec::new();
        for (name, object) in &index.objects {
            let Some(relative) = object.relative_path() else {
                warn!("Asset {} has an invalid hash {:?}", name, object.hash);
                report.failed.push(name.clone());
                continue;
            };
            let dest = objects_dir.join(&relative);
            if dest.is_file() && integrity::verify(&dest, &object.hash, HashAlgorithm::Sha1).await {
                report.already_present += 1;
                continue;
            }
            pending.push((name.as_str(), object, relative, dest));
        }

        info!(
            "Downloading {} asset objects ({} already cached)",
            pending.len(),
            report.already_present
        );

        let done = AtomicU64::new(report.already_present as u64);
        let results: Vec<(&str, bool)> = stream::iter(pending)
            .map(|(name, object, relative, dest)| {
                let done = &done;
                async move {
                    let ok = self.fetch_object(object, &relative, &dest).await;
                    let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                    progress.report(finished, total as u64, name);
                    (name, ok)
                }
            })
            .buffered(self.downloader.concurrency())
            .collect()
            .await;

        for (name, ok) in results {
            if ok {
                report.downloaded += 1;
            } else {
                report.failed.push(name.to_string());
            }
        }

        if report.failed.is_empty() {
            info!("Assets synced: {} downloaded", report.downloaded);
        } else {
            warn!(
                "Assets synced with {} failures out of {}",
                report.failed.len(),
                total
            );
        }
        Ok(report)
    }

    async fn fetch_object(&self, object: &AssetObject, relative: &str, dest: &Path) -> bool {
        let url = format!("{}/{}", self.base_url, relative);
        if let Err(err) = self.downloader.fetch(&url, &[], dest, &NullProgress).await {
            warn!("Asset {} failed: {}", object.hash, err);
            return false;
        }
        if integrity::verify(dest, &object.hash, HashAlgorithm::Sha1).await {
            debug!("Asset {} ok", object.hash);
            return true;
        }
        warn!("Asset {} failed SHA-1 verification", object.hash);
        if let Err(err) = tokio::fs::remove_file(dest).await {
            warn!("Cannot remove mismatched asset {:?}: {}", dest, err);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::http::build_http_client;
    use sha1::{Digest, Sha1};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sha1_hex(data: &[u8]) -> String {
        hex::encode(Sha1::digest(data))
    }

    #[tokio::test]
    async fn sync_counts_failures_without_aborting() {
        let server = MockServer::start().await;
        let good = sha1_hex(b"sound");
        let missing = sha1_hex(b"texture");
        let cached = sha1_hex(b"cached");

        let index = serde_json::json!({
            "objects": {
                "minecraft/sounds/a.ogg": {"hash": good, "size": 5},
                "minecraft/textures/b.png": {"hash": missing, "size": 7},
                "minecraft/lang/c.lang": {"hash": cached, "size": 6}
            }
        });
        Mock::given(method("GET"))
            .and(path("/1.12.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(index))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/{}/{}", &good[..2], good)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"sound".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let assets = dir.path().join("assets");
        let cached_path = assets.join("objects").join(&cached[..2]).join(&cached);
        std::fs::create_dir_all(cached_path.parent().unwrap()).unwrap();
        std::fs::write(&cached_path, b"cached").unwrap();

        let downloader = Downloader::new(build_http_client(Duration::from_secs(5)).unwrap());
        let report = AssetManager::new(&downloader, &server.uri())
            .sync("1.12", &assets, &NullProgress)
            .await
            .unwrap();

        assert_eq!(report.total, 3);
        assert_eq!(report.already_present, 1);
        assert_eq!(report.downloaded, 1);
        assert_eq!(report.failed, vec!["minecraft/textures/b.png".to_string()]);
        assert!(index_path(&assets, "1.12").exists());
        assert!(assets.join("objects").join(&good[..2]).join(&good).exists());
    }

    #[test]
    fn relative_path_requires_sha1_hex() {
        let object = |hash: &str| AssetObject {
            hash: hash.to_string(),
            size: 1,
        };
        let good = sha1_hex(b"a");
        assert_eq!(object(&good).relative_path(), Some(format!("{}/{}", &good[..2], good)));
        assert_eq!(object("../victim").relative_path(), None);
        assert_eq!(object(&good.to_uppercase()).relative_path(), None);
        assert_eq!(object(&good[..39]).relative_path(), None);
        assert_eq!(object("").relative_path(), None);
    }

    #[tokio::test]
    async fn traversal_hash_never_touches_files_outside_assets() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/1.12.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "objects": {"evil": {"hash": "../victim", "size": 1}}
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let assets = dir.path().join("assets");
        let victim = dir.path().join("victim");
        std::fs::write(&victim, b"keep me").unwrap();

        let downloader = Downloader::new(build_http_client(Duration::from_secs(5)).unwrap());
        let report = AssetManager::new(&downloader, &server.uri())
            .sync("1.12", &assets, &NullProgress)
            .await
            .unwrap();

        assert_eq!(report.failed, vec!["evil".to_string()]);
        assert_eq!(report.downloaded, 0);
        assert_eq!(std::fs::read(&victim).unwrap(), b"keep me");
    }

    #[tokio::test]
    async fn missing_index_is_fatal() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(build_http_client(Duration::from_secs(5)).unwrap());

        let err = AssetManager::new(&downloader, &server.uri())
            .sync("1.12", dir.path(), &NullProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::DownloadFailed { status: 404, .. }));
    }
}
