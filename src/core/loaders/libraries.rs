// ─── Library Table ───
// The fixed set of libraries the 1.12.2 Forge runtime needs on its classpath.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{info, warn};

use crate::core::downloader::Downloader;
use crate::core::error::LauncherResult;
use crate::core::maven::{MavenArtifact, LEGACY_LIBRARIES_GITHUB, MAVEN_CENTRAL};
use crate::core::progress::NullProgress;
use crate::core::version::{LibraryArtifact, LibraryDownloads, LibraryEntry, RuntimeVersionDescriptor};

const GAME_LIBRARIES: &[&str] = &[
    "net.minecraft:launchwrapper:1.12",
    "org.lwjgl.lwjgl:lwjgl:2.9.4-nightly-20150209",
    "org.lwjgl.lwjgl:lwjgl_util:2.9.4-nightly-20150209",
    "com.mojang:patchy:1.1",
    "oshi-project:oshi-core:1.1",
    "net.java.dev.jna:jna:4.4.0",
    "net.java.dev.jna:platform:3.4.0",
    "com.ibm.icu:icu4j-core-mojang:51.2",
    "net.sf.jopt-simple:jopt-simple:5.0.3",
    "com.paulscode:codecjorbis:20101023",
    "com.paulscode:codecwav:20101023",
    "com.paulscode:libraryjavasound:20101123",
    "com.paulscode:librarylwjglopenal:20100824",
    "com.paulscode:soundsystem:20120107",
    "io.netty:netty-all:4.1.9.Final",
    "com.google.guava:guava:21.0",
    "org.apache.commons:commons-lang3:3.5",
    "commons-io:commons-io:2.5",
    "commons-codec:commons-codec:1.10",
    "com.google.code.gson:gson:2.8.0",
    "com.mojang:authlib:1.5.25",
    "com.mojang:realms:1.10.16",
    "org.apache.commons:commons-compress:1.8.1",
    "org.apache.httpcomponents:httpclient:4.3.3",
    "commons-logging:commons-logging:1.1.3",
    "org.apache.httpcomponents:httpcore:4.3.2",
    "it.unimi.dsi:fastutil:7.0.12_mojang",
    "com.mojang:netty:1.6",
];

/// Forge refuses to start without these on the classpath.
const LOG4J_LIBRARIES: &[&str] = &[
    "org.apache.logging.log4j:log4j-api:2.8.1",
    "org.apache.logging.log4j:log4j-core:2.8.1",
];

/// Platform bundles unpacked into the natives directory before launch.
const NATIVE_LIBRARIES: &[&str] = &["org.lwjgl.lwjgl:lwjgl-platform:2.9.4-nightly-20150209"];
const NATIVE_PLATFORMS: &[&str] = &["windows", "linux", "osx"];

fn artifact_for(artifact: &MavenArtifact, mirror: &str) -> LibraryArtifact {
    LibraryArtifact {
        path: artifact.repository_path(),
        url: artifact.url(mirror),
        sha1: None,
        size: None,
    }
}

fn plain_library(coordinate: &str, mirror: &str) -> LauncherResult<LibraryEntry> {
    let artifact = MavenArtifact::parse(coordinate)?;
    Ok(LibraryEntry {
        name: artifact.to_string(),
        downloads: Some(LibraryDownloads {
            artifact: Some(artifact_for(&artifact, mirror)),
            classifiers: BTreeMap::new(),
        }),
        rules: Vec::new(),
    })
}

fn native_library(coordinate: &str, mirror: &str) -> LauncherResult<LibraryEntry> {
    let artifact = MavenArtifact::parse(coordinate)?;
    let classifiers = NATIVE_PLATFORMS
        .iter()
        .map(|os| {
            let key = format!("natives-{}", os);
            let native = artifact.with_classifier(&key);
            (key, artifact_for(&native, mirror))
        })
        .collect();
    Ok(LibraryEntry {
        name: artifact.to_string(),
        downloads: Some(LibraryDownloads {
            artifact: None,
            classifiers,
        }),
        rules: Vec::new(),
    })
}

/// Every library the descriptor lists, in classpath order: Forge itself, the
/// game libraries, the Log4j pair, then native bundles. Artifact URLs point
/// at `mirror`, the project's own library mirror.
pub fn library_table(mirror: &str, forge_version: &str) -> LauncherResult<Vec<LibraryEntry>> {
    let forge = format!("net.minecraftforge:forge:{}", forge_version);
    std::iter::once(forge.as_str())
        .chain(GAME_LIBRARIES.iter().copied())
        .chain(LOG4J_LIBRARIES.iter().copied())
        .map(|coordinate| plain_library(coordinate, mirror))
        .chain(
            NATIVE_LIBRARIES
                .iter()
                .map(|coordinate| native_library(coordinate, mirror)),
        )
        .collect()
}

/// Ordered fallbacks for a library path after the own mirror.
pub fn public_mirrors() -> Vec<String> {
    vec![MAVEN_CENTRAL.to_string(), LEGACY_LIBRARIES_GITHUB.to_string()]
}

/// Primary URL and fallbacks for `path` given the mirror bases in order.
pub fn library_sources(path: &str, mirrors: &[String]) -> Option<(String, Vec<String>)> {
    let mut urls = mirrors
        .iter()
        .map(|base| format!("{}/{}", base.trim_end_matches('/'), path));
    let primary = urls.next()?;
    Some((primary, urls.collect()))
}

/// Artifacts of `library` that must be on disk for `os_name`: the main jar
/// and the matching `natives-{os}` bundle.
pub fn required_artifacts<'a>(
    library: &'a LibraryEntry,
    os_name: &str,
) -> impl Iterator<Item = &'a LibraryArtifact> {
    let native_key = format!("natives-{}", os_name);
    library.artifact().into_iter().chain(
        library
            .native_artifacts()
            .filter(move |(key, _)| *key == native_key)
            .map(|(_, artifact)| artifact),
    )
}

/// Fetch every absent artifact the descriptor needs on `os_name` through the
/// mirror chain. Returns the names of libraries that stayed missing.
pub async fn ensure_libraries(
    downloader: &Downloader,
    descriptor: &RuntimeVersionDescriptor,
    libraries_dir: &Path,
    mirrors: &[String],
    os_name: &str,
) -> Vec<String> {
    let mut missing = Vec::new();

    for library in descriptor.libraries_for(os_name) {
        for artifact in required_artifacts(library, os_name) {
            let dest = libraries_dir.join(&artifact.path);
            if dest.is_file() {
                continue;
            }
            let Some((primary, fallbacks)) = library_sources(&artifact.path, mirrors) else {
                missing.push(library.name.clone());
                continue;
            };
            info!("Library {} not found locally, downloading", library.name);
            if let Err(err) = downloader
                .fetch(&primary, &fallbacks, &dest, &NullProgress)
                .await
            {
                warn!("Library {} unavailable: {}", library.name, err);
                missing.push(library.name.clone());
            }
        }
    }
    missing.dedup();
    missing
}
