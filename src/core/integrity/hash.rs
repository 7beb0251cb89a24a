// ─── Hash Verifier ───
// Streamed file digests. Manifest content is SHA-256, asset objects are SHA-1;
// the two digest spaces are never compared against each other.

use std::path::Path;

use sha1::Sha1;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::core::error::{LauncherError, LauncherResult};

const READ_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha1,
}

/// Lowercase hex digest of the file at `path`, read in fixed-size chunks.
pub async fn digest(path: &Path, algorithm: HashAlgorithm) -> LauncherResult<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|source| LauncherError::io(path, source))?;

    match algorithm {
        HashAlgorithm::Sha256 => hash_reader::<Sha256>(&mut file, path).await,
        HashAlgorithm::Sha1 => hash_reader::<Sha1>(&mut file, path).await,
    }
}

async fn hash_reader<D: Digest>(file: &mut tokio::fs::File, path: &Path) -> LauncherResult<String> {
    let mut hasher = D::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let read = file
            .read(&mut buf)
            .await
            .map_err(|source| LauncherError::io(path, source))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// `true` only when the file can be read and its digest equals `expected`
/// (case-insensitive). An unreadable file counts as corrupt.
pub async fn verify(path: &Path, expected: &str, algorithm: HashAlgorithm) -> bool {
    match digest(path, algorithm).await {
        Ok(actual) => actual.eq_ignore_ascii_case(expected.trim()),
        Err(err) => {
            debug!("Cannot verify {:?}: {}", path, err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
    const HELLO_SHA1: &str = "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";

    #[tokio::test]
    async fn digests_both_algorithms() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("hello.txt");
        tokio::fs::write(&file, b"hello").await.unwrap();

        assert_eq!(digest(&file, HashAlgorithm::Sha256).await.unwrap(), HELLO_SHA256);
        assert_eq!(digest(&file, HashAlgorithm::Sha1).await.unwrap(), HELLO_SHA1);
    }

    #[tokio::test]
    async fn verify_ignores_case() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("hello.txt");
        tokio::fs::write(&file, b"hello").await.unwrap();

        assert!(verify(&file, &HELLO_SHA256.to_uppercase(), HashAlgorithm::Sha256).await);
        assert!(!verify(&file, HELLO_SHA1, HashAlgorithm::Sha256).await);
    }

    #[tokio::test]
    async fn missing_file_is_not_verified() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!verify(&dir.path().join("absent"), HELLO_SHA256, HashAlgorithm::Sha256).await);
    }
}
