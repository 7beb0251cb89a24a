use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

/// Major version assumed whenever detection fails.
pub const FALLBACK_MAJOR_VERSION: u32 = 8;

/// Installation directories of the legacy runtime checked before anything else.
const WINDOWS_WELL_KNOWN: &[&str] = &[
    r"C:\Program Files\Java\jre1.8.0_461\bin\java.exe",
    r"C:\Program Files (x86)\Java\jre1.8.0_461\bin\java.exe",
    r"C:\Program Files\Eclipse Adoptium\jre-8.0.462.8-hotspot\bin\java.exe",
];
const UNIX_WELL_KNOWN: &[&str] = &[
    "/usr/lib/jvm/java-8-openjdk/jre/bin/java",
    "/usr/lib/jvm/java-8-openjdk-amd64/jre/bin/java",
    "/usr/lib/jvm/temurin-8-jre/bin/java",
];

// ─── Environment snapshot ───

/// A `java` binary found on `PATH` and the version string it reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRuntime {
    pub path: PathBuf,
    pub version: Option<String>,
}

/// Everything runtime discovery looks at, captured once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentSnapshot {
    /// Existing well-known binaries, in priority order.
    pub well_known: Vec<PathBuf>,
    /// `$JAVA_HOME/bin/java` when it exists.
    pub java_home: Option<PathBuf>,
    pub path_runtimes: Vec<PathRuntime>,
}

impl EnvironmentSnapshot {
    /// Read the real environment. `legacy_runtime_dir` is where the launcher
    /// unpacks its own legacy runtime; it is the first well-known location.
    ///
    /// Blocking: probes every `java` on `PATH`.
    pub fn capture(legacy_runtime_dir: &Path) -> Self {
        let mut well_known = Vec::new();
        if legacy_runtime_dir.exists() {
            let bundled = locate_java_binary(legacy_runtime_dir);
            if bundled.is_file() {
                well_known.push(bundled);
            }
        }
        let fixed = if cfg!(windows) {
            WINDOWS_WELL_KNOWN
        } else {
            UNIX_WELL_KNOWN
        };
        well_known.extend(fixed.iter().map(PathBuf::from).filter(|p| p.is_file()));

        let java_home = std::env::var_os("JAVA_HOME")
            .map(|home| PathBuf::from(home).join("bin").join(java_exe()))
            .filter(|p| p.is_file());

        let path_runtimes = std::env::var_os("PATH")
            .map(|raw| {
                std::env::split_paths(&raw)
                    .map(|dir| dir.join(java_exe()))
                    .filter(|p| p.is_file())
                    .map(|path| PathRuntime {
                        version: probe::version_string(&path),
                        path,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let snapshot = Self {
            well_known,
            java_home,
            path_runtimes,
        };
        debug!("Captured runtime environment: {:?}", snapshot);
        snapshot
    }

    /// Whether a runtime of the legacy `1.8` line is already available.
    pub fn has_legacy_runtime(&self) -> bool {
        !self.well_known.is_empty()
            || self
                .path_runtimes
                .iter()
                .any(|rt| rt.version.as_deref().is_some_and(is_legacy_version))
    }
}

fn is_legacy_version(version: &str) -> bool {
    version.starts_with("1.8")
}

/// Well-known locations, then `JAVA_HOME`, then the first `PATH` entry
/// reporting a `1.8` version.
pub fn locate_runtime(env: &EnvironmentSnapshot) -> Option<PathBuf> {
    if let Some(path) = env.well_known.first() {
        return Some(path.clone());
    }
    if let Some(home) = &env.java_home {
        return Some(home.clone());
    }
    env.path_runtimes
        .iter()
        .find(|rt| rt.version.as_deref().is_some_and(is_legacy_version))
        .map(|rt| rt.path.clone())
}

/// [`locate_runtime`] with the unqualified command name as the last resort.
pub fn resolve_runtime(env: &EnvironmentSnapshot) -> PathBuf {
    match locate_runtime(env) {
        Some(path) => {
            info!("Using Java runtime {:?}", path);
            path
        }
        None => {
            warn!("No Java runtime found, falling back to `java` from PATH");
            PathBuf::from("java")
        }
    }
}

// ─── Version detection ───

/// Run `java -version` and map the reported version to a major number.
#[instrument]
pub async fn detect_runtime_major_version(java: &Path) -> u32 {
    let output = Command::new(java)
        .arg("-version")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await;

    match output {
        Ok(output) => {
            let text = format!(
                "{}\n{}",
                String::from_utf8_lossy(&output.stderr),
                String::from_utf8_lossy(&output.stdout)
            );
            for line in text.lines().filter(|l| !l.trim().is_empty()) {
                debug!("[java -version] {}", line);
            }
            let major = parse_runtime_major_version(&text);
            info!("Detected Java major version {}", major);
            major
        }
        Err(err) => {
            warn!("Could not run {:?} -version: {}", java, err);
            FALLBACK_MAJOR_VERSION
        }
    }
}

/// `"1.8.0_291"` → 8, `"11.0.11"` → 11, `"17"` → 17, anything else → 8.
pub fn parse_runtime_major_version(output: &str) -> u32 {
    probe::parse_version_string(output)
        .and_then(|version| parse_major_version(&version))
        .unwrap_or(FALLBACK_MAJOR_VERSION)
}

fn parse_major_version(version: &str) -> Option<u32> {
    let mut parts = version.split(['.', '_', '-', '+']);
    let major: u32 = parts.next()?.parse().ok()?;
    if major == 1 {
        parts.next()?.parse().ok()
    } else {
        Some(major)
    }
}

// ─── JVM tuning ───

/// Collector tuning for the detected major version plus the baseline every
/// tier shares.
pub fn jvm_tuning_flags(major: u32, max_memory: &str) -> Vec<String> {
    let mut flags = vec![format!("-Xmx{}", max_memory)];

    let tier: &[&str] = if major <= 8 {
        &[
            "-XX:+UseConcMarkSweepGC",
            "-XX:+CMSIncrementalPacing",
            "-XX:+AggressiveOpts",
            "-XX:+UseFastAccessorMethods",
        ]
    } else if major <= 14 {
        &[
            "-XX:+UnlockExperimentalVMOptions",
            "-XX:+UseG1GC",
            "-XX:G1NewSizePercent=20",
            "-XX:G1ReservePercent=20",
            "-XX:MaxGCPauseMillis=50",
            "-XX:G1HeapRegionSize=32M",
        ]
    } else {
        &[
            "-XX:+UseG1GC",
            "-XX:G1NewSizePercent=20",
            "-XX:G1ReservePercent=20",
            "-XX:MaxGCPauseMillis=50",
            "-XX:G1HeapRegionSize=32M",
            "-XX:ParallelGCThreads=2",
            "-XX:ConcGCThreads=2",
            "-XX:+UnlockExperimentalVMOptions",
            "-XX:+DisableExplicitGC",
        ]
    };
    flags.extend(tier.iter().map(|s| s.to_string()));

    flags.extend(
        [
            "-XX:-OmitStackTraceInFastThrow",
            "-XX:+AlwaysPreTouch",
            "-Dfml.ignoreInvalidMinecraftCertificates=true",
            "-Dfml.ignorePatchDiscrepancies=true",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    flags
}

// ─── Binary layout ───

pub fn java_exe() -> &'static str {
    if cfg!(windows) {
        "java.exe"
    } else {
        "java"
    }
}

/// `bin/java` under `runtime_root`, the macOS bundle layout, or the first
/// `java` found below it.
pub fn locate_java_binary(runtime_root: &Path) -> PathBuf {
    let primary = runtime_root.join("bin").join(java_exe());
    if primary.exists() {
        return primary;
    }

    let mac_layout = runtime_root
        .join("Contents")
        .join("Home")
        .join("bin")
        .join(java_exe());
    if mac_layout.exists() {
        return mac_layout;
    }

    find_java_binary_recursive(runtime_root).unwrap_or(primary)
}

fn find_java_binary_recursive(root: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(root).ok()?;
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        let file_type = entry.file_type().ok()?;

        if file_type.is_file() {
            if path.file_name().and_then(|n| n.to_str()) == Some(java_exe()) {
                return Some(path);
            }
        } else if file_type.is_dir() {
            if let Some(found) = find_java_binary_recursive(&path) {
                return Some(found);
            }
        }
    }
    None
}

mod probe {
    use std::path::Path;
    use std::process::Command;

    use tracing::debug;

    /// Synchronous `-version` probe used while capturing the environment.
    pub fn version_string(path: &Path) -> Option<String> {
        let output = Command::new(path).arg("-version").output().ok()?;
        let text = format!(
            "{}\n{}",
            String::from_utf8_lossy(&output.stderr),
            String::from_utf8_lossy(&output.stdout)
        );
        debug!("Probing {:?}: {}", path, text.lines().next().unwrap_or(""));
        parse_version_string(&text)
    }

    /// The first quoted token on a line mentioning `version`.
    pub fn parse_version_string(output: &str) -> Option<String> {
        for line in output.lines().filter(|line| line.contains("version")) {
            if let Some(start) = line.find('"') {
                if let Some(end) = line[start + 1..].find('"') {
                    return Some(line[start + 1..start + 1 + end].to_string());
                }
            }
        }
        None
    }
}
