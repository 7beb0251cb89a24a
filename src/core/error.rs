use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// One source tried by the mirrored downloader, in the order it was tried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAttempt {
    pub url: String,
    /// HTTP status when the server answered; `None` for transport errors and timeouts.
    pub status: Option<u16>,
    pub error: String,
}

impl fmt::Display for SourceAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (HTTP {}: {})", self.url, status, self.error),
            None => write!(f, "{} ({})", self.url, self.error),
        }
    }
}

fn format_attempts(attempts: &[SourceAttempt]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Central error type for the entire launcher backend.
/// Every module returns `Result<T, LauncherError>`.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("All sources failed for {target}: {}", format_attempts(.attempts))]
    Network {
        target: String,
        attempts: Vec<SourceAttempt>,
    },

    // ── Integrity ───────────────────────────────────────
    #[error(
        "Hash mismatch for {path} from {url}: expected {expected}, got {actual} ({size} bytes)"
    )]
    Integrity {
        path: String,
        url: String,
        expected: String,
        actual: String,
        size: u64,
    },

    // ── Manifest ────────────────────────────────────────
    #[error("Manifest data missing or invalid: {0}")]
    MissingManifestData(String),

    // ── Subprocess ──────────────────────────────────────
    #[error("Process {program} failed (code {code:?}): {output}")]
    Subprocess {
        program: String,
        code: Option<i32>,
        output: String,
    },

    // ── Java ────────────────────────────────────────────
    #[error("Runtime version incompatible: {0}")]
    VersionIncompatibility(String),

    // ── Maven ───────────────────────────────────────────
    #[error("Invalid Maven coordinate: {0}")]
    InvalidMavenCoordinate(String),

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Archive ─────────────────────────────────────────
    #[error("Zip extraction error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type LauncherResult<T> = Result<T, LauncherError>;

impl LauncherError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LauncherError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<std::io::Error> for LauncherError {
    fn from(source: std::io::Error) -> Self {
        LauncherError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

// The UI boundary receives errors as human-readable strings.
impl serde::Serialize for LauncherError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
