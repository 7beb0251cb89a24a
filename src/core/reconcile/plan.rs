use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::manifest::FileEntry;

/// What one reconciliation pass will change. A path is never in both lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationPlan {
    /// Entries to fetch, in manifest order.
    pub to_download: Vec<FileEntry>,
    /// Relative, slash-separated paths with no manifest entry.
    pub to_delete: Vec<String>,
}

impl ReconciliationPlan {
    pub fn is_empty(&self) -> bool {
        self.to_download.is_empty() && self.to_delete.is_empty()
    }
}

/// Regular files under a content root, keyed by their relative path with
/// `\` normalized to `/`. Rebuilt on every pass.
#[derive(Debug, Clone, Default)]
pub struct LocalContentTree {
    files: BTreeSet<String>,
}

impl LocalContentTree {
    /// Walk `root`. A missing root is an empty tree.
    pub fn scan(root: &Path) -> LauncherResult<Self> {
        let mut files = BTreeSet::new();
        if !root.exists() {
            return Ok(Self { files });
        }

        let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            let entries =
                std::fs::read_dir(&dir).map_err(|source| LauncherError::io(&dir, source))?;
            for entry in entries {
                let entry = entry.map_err(|source| LauncherError::io(&dir, source))?;
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .map_err(|source| LauncherError::io(&path, source))?;

                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    if let Ok(relative) = path.strip_prefix(root) {
                        files.insert(relative_key(relative));
                    }
                }
            }
        }

        Ok(Self { files })
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(String::as_str)
    }
}

fn relative_key(relative: &Path) -> String {
    relative.to_string_lossy().replace('\\', "/")
}
