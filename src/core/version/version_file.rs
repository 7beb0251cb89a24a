// ─── Version File ───
// The runtime version descriptor written for the installed mod loader and the
// library entries it lists.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::rules::{self, LibraryRule};
use crate::core::error::{LauncherError, LauncherResult};

/// `versions/{id}/{id}.json`: how to start the game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeVersionDescriptor {
    pub id: String,
    pub main_class: String,
    /// Game argument template with `${placeholder}` tokens.
    #[serde(rename = "minecraftArguments")]
    pub argument_template: String,
    #[serde(default)]
    pub libraries: Vec<LibraryEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryEntry {
    /// Maven coordinate `group:artifact:version`.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads: Option<LibraryDownloads>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<LibraryRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryDownloads {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<LibraryArtifact>,
    /// Classifier name to artifact; `natives-*` keys hold platform bundles.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub classifiers: BTreeMap<String, LibraryArtifact>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryArtifact {
    /// Path relative to the libraries directory.
    pub path: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl LibraryEntry {
    pub fn artifact(&self) -> Option<&LibraryArtifact> {
        self.downloads.as_ref()?.artifact.as_ref()
    }

    pub fn is_allowed_for(&self, os_name: &str) -> bool {
        rules::applies(&self.rules, os_name)
    }

    /// Classifier artifacts whose key mentions `natives`.
    pub fn native_artifacts(&self) -> impl Iterator<Item = (&str, &LibraryArtifact)> {
        self.downloads
            .iter()
            .flat_map(|downloads| downloads.classifiers.iter())
            .filter(|(key, _)| key.contains("natives"))
            .map(|(key, artifact)| (key.as_str(), artifact))
    }
}

pub fn descriptor_path(game_dir: &Path, version_id: &str) -> PathBuf {
    game_dir
        .join("versions")
        .join(version_id)
        .join(format!("{}.json", version_id))
}

impl RuntimeVersionDescriptor {
    /// Read a previously written descriptor. `Ok(None)` when none exists.
    pub async fn load(game_dir: &Path, version_id: &str) -> LauncherResult<Option<Self>> {
        let path = descriptor_path(game_dir, version_id);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(LauncherError::Io { path, source }),
        };
        let descriptor: Self = serde_json::from_str(&raw)?;
        debug!(
            "Loaded descriptor {} with {} libraries",
            descriptor.id,
            descriptor.libraries.len()
        );
        Ok(Some(descriptor))
    }

    /// Persist as pretty JSON under `versions/{id}/{id}.json`.
    pub async fn save(&self, game_dir: &Path) -> LauncherResult<PathBuf> {
        let path = descriptor_path(game_dir, &self.id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| LauncherError::io(parent, source))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|source| LauncherError::io(&path, source))?;
        info!("Wrote version descriptor {:?}", path);
        Ok(path)
    }

    /// Libraries whose rules apply on `os_name`, in descriptor order.
    pub fn libraries_for<'a>(&'a self, os_name: &'a str) -> impl Iterator<Item = &'a LibraryEntry> {
        self.libraries
            .iter()
            .filter(move |lib| lib.is_allowed_for(os_name))
    }
}
