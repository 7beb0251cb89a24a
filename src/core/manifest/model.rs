use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult, SourceAttempt};

/// Remote listing of the files a content root must contain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    #[serde(alias = "Version", default)]
    pub version: String,
    #[serde(alias = "Files", default)]
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEntry {
    /// Slash-separated path relative to the content root.
    #[serde(alias = "Path")]
    pub path: String,
    /// Hex SHA-256 of the file contents.
    #[serde(alias = "Hash")]
    pub hash: String,
    #[serde(alias = "Size", default)]
    pub size: u64,
    /// Absent optional files are left alone; a corrupt copy is still replaced.
    #[serde(alias = "Required", default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl FileEntry {
    pub fn new(path: &str, hash: &str, size: u64) -> Self {
        Self {
            path: path.to_string(),
            hash: hash.to_string(),
            size,
            required: true,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

impl Manifest {
    /// Parse and validate a manifest body.
    pub fn from_json(raw: &str) -> LauncherResult<Self> {
        let manifest: Manifest = serde_json::from_str(raw)
            .map_err(|e| LauncherError::MissingManifestData(format!("unparsable manifest: {}", e)))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Reject duplicate paths and paths that could leave the content root.
    pub fn validate(&self) -> LauncherResult<()> {
        let mut seen = HashSet::with_capacity(self.files.len());
        for entry in &self.files {
            let normalized = normalize_entry_path(&entry.path);
            if !is_contained(&normalized) {
                return Err(LauncherError::MissingManifestData(format!(
                    "path escapes content root: {}",
                    entry.path
                )));
            }
            if entry.hash.trim().is_empty() {
                return Err(LauncherError::MissingManifestData(format!(
                    "entry without hash: {}",
                    entry.path
                )));
            }
            if !seen.insert(normalized) {
                return Err(LauncherError::MissingManifestData(format!(
                    "duplicate path: {}",
                    entry.path
                )));
            }
        }
        Ok(())
    }
}

pub(crate) fn normalize_entry_path(path: &str) -> String {
    path.replace('\\', "/")
}

fn is_contained(path: &str) -> bool {
    if path.is_empty() || path.starts_with('/') || path.contains(':') {
        return false;
    }
    path.split('/').all(|segment| segment != "..")
}

/// `GET {base_url}{manifest_file}`, parsed and validated.
pub async fn fetch_manifest(
    downloader: &Downloader,
    base_url: &str,
    manifest_file: &str,
) -> LauncherResult<Manifest> {
    let url = format!("{}{}", base_url, manifest_file);
    info!("Fetching manifest from {}", url);

    let response = downloader.client().get(&url).send().await.map_err(|e| {
        LauncherError::Network {
            target: url.clone(),
            attempts: vec![SourceAttempt {
                url: url.clone(),
                status: None,
                error: e.to_string(),
            }],
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(LauncherError::MissingManifestData(format!(
            "{} returned HTTP {}",
            url,
            status.as_u16()
        )));
    }

    let raw = response.text().await?;
    if raw.trim().is_empty() {
        return Err(LauncherError::MissingManifestData(format!("{} returned an empty body", url)));
    }

    let manifest = Manifest::from_json(&raw)?;
    debug!(
        "Manifest version {} lists {} files",
        manifest.version,
        manifest.files.len()
    );
    Ok(manifest)
}
