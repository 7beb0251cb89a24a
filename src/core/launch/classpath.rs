// ─── Classpath Builder ───
// Ordered library paths for the runtime, followed by mod jars.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::core::version::RuntimeVersionDescriptor;

/// Classpath entries plus the libraries that were listed but not on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classpath {
    pub entries: Vec<String>,
    pub missing: Vec<String>,
}

impl Classpath {
    pub fn joined(&self) -> String {
        self.entries.join(get_classpath_separator())
    }
}

/// Every library whose rules apply on `os_name` and whose artifact exists
/// under `libraries_dir`, in descriptor order, then every `*.jar` in
/// `<content_root>/mods` sorted by name.
pub fn build_classpath(
    descriptor: &RuntimeVersionDescriptor,
    libraries_dir: &Path,
    content_root: &Path,
    os_name: &str,
) -> Classpath {
    let mut classpath = Classpath::default();

    for library in descriptor.libraries_for(os_name) {
        let Some(artifact) = library.artifact() else {
            continue;
        };
        let path = libraries_dir.join(&artifact.path);
        if path.is_file() {
            classpath.entries.push(safe_path_str(&path));
        } else {
            warn!("Library not found: {:?}", path);
            classpath.missing.push(library.name.clone());
        }
    }

    for jar in mod_jars(&content_root.join("mods")) {
        debug!("Adding mod {:?}", jar.file_name().unwrap_or_default());
        classpath.entries.push(safe_path_str(&jar));
    }

    dedup_preserving_order(&mut classpath.entries);
    classpath
}

fn mod_jars(mods_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(mods_dir) else {
        return Vec::new();
    };
    let mut jars: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_jar(path))
        .collect();
    jars.sort();
    jars
}

fn is_jar(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jar"))
}

fn dedup_preserving_order(entries: &mut Vec<String>) {
    let mut seen = HashSet::new();
    entries.retain(|entry| {
        let key = if cfg!(target_os = "windows") {
            entry.to_lowercase()
        } else {
            entry.clone()
        };
        seen.insert(key)
    });
}

/// Platform-specific Java classpath separator.
pub fn get_classpath_separator() -> &'static str {
    if cfg!(target_os = "windows") {
        ";"
    } else {
        ":"
    }
}

/// Canonical path as a string, without the `\\?\` prefix on Windows.
pub fn safe_path_str(path: &Path) -> String {
    let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let text = resolved.to_string_lossy().to_string();

    #[cfg(target_os = "windows")]
    {
        // The JVM rejects extended-length classpath entries.
        if let Some(stripped) = text.strip_prefix(r"\\?\") {
            return stripped.to_string();
        }
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::version::{LibraryArtifact, LibraryDownloads, LibraryEntry, LibraryRule};

    fn library(name: &str, path: &str, rules: Vec<LibraryRule>) -> LibraryEntry {
        LibraryEntry {
            name: name.into(),
            downloads: Some(LibraryDownloads {
                artifact: Some(LibraryArtifact {
                    path: path.into(),
                    url: String::new(),
                    sha1: None,
                    size: None,
                }),
                classifiers: Default::default(),
            }),
            rules,
        }
    }

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"jar").unwrap();
    }

    #[test]
    fn libraries_then_mods_with_missing_reported() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let libs = root.join("libraries");
        touch(&libs.join("a/a/1/a-1.jar"));
        touch(&libs.join("w/w/1/w-1.jar"));
        touch(&root.join("mods/zeta.jar"));
        touch(&root.join("mods/alpha.jar"));
        touch(&root.join("mods/readme.txt"));

        let descriptor = RuntimeVersionDescriptor {
            id: "forge-1.12.2".into(),
            main_class: "Main".into(),
            argument_template: String::new(),
            libraries: vec![
                library("a:a:1", "a/a/1/a-1.jar", vec![]),
                library("w:w:1", "w/w/1/w-1.jar", vec![LibraryRule::allow().on("windows")]),
                library("m:m:1", "m/m/1/m-1.jar", vec![]),
            ],
        };

        let cp = build_classpath(&descriptor, &libs, root, "linux");
        let names: Vec<_> = cp
            .entries
            .iter()
            .map(|e| Path::new(e).file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a-1.jar", "alpha.jar", "zeta.jar"]);
        assert_eq!(cp.missing, vec!["m:m:1".to_string()]);
        assert_eq!(cp.joined().matches(get_classpath_separator()).count(), 2);
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let mut entries = vec!["a".to_string(), "b".into(), "a".into()];
        dedup_preserving_order(&mut entries);
        assert_eq!(entries, vec!["a", "b"]);
    }
}
