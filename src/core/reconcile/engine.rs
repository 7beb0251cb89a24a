use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{self, StreamExt};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, instrument, warn};

use super::lease::ContentRootLease;
use super::plan::{LocalContentTree, ReconciliationPlan};
use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::integrity::{self, HashAlgorithm};
use crate::core::manifest::{FileEntry, Manifest};
use crate::core::progress::{NullProgress, ProgressReporter};

const TEXT_EXTENSIONS: &[&str] = &["txt", "cfg", "properties", "json"];

/// Summary of a completed reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub downloaded: usize,
    pub deleted: usize,
    /// Extraneous files that could not be removed (for example, in use).
    pub delete_failures: usize,
    pub bytes: u64,
}

/// Drives downloads and deletions until a content root matches a manifest.
pub struct ReconciliationEngine {
    downloader: Downloader,
    base_url: String,
    ignored_prefixes: Vec<String>,
}

impl ReconciliationEngine {
    pub fn new(downloader: Downloader, base_url: impl Into<String>) -> Self {
        Self {
            downloader,
            base_url: base_url.into(),
            ignored_prefixes: Vec::new(),
        }
    }

    /// Relative path prefixes that are never treated as extraneous.
    pub fn with_ignored(mut self, prefixes: Vec<String>) -> Self {
        self.ignored_prefixes = prefixes;
        self
    }

    // ── Planning ────────────────────────────────────────

    /// Diff `root` against `manifest`.
    ///
    /// A present file whose hash does not match is deleted here, as soon as it
    /// is found, and queued for download.
    pub async fn plan(&self, manifest: &Manifest, root: &Path) -> LauncherResult<ReconciliationPlan> {
        let mut plan = ReconciliationPlan::default();

        for entry in &manifest.files {
            let local = root.join(&entry.path);
            if !local.is_file() {
                if entry.required {
                    debug!("Missing: {}", entry.path);
                    plan.to_download.push(entry.clone());
                }
                continue;
            }

            if integrity::verify(&local, &entry.hash, HashAlgorithm::Sha256).await {
                continue;
            }

            warn!("Corrupt: {} (hash mismatch), removing local copy", entry.path);
            if let Err(err) = tokio::fs::remove_file(&local).await {
                warn!("Cannot remove corrupt file {:?}: {}", local, err);
            }
            plan.to_download.push(entry.clone());
        }

        let listed: HashSet<String> = manifest
            .files
            .iter()
            .map(|entry| entry.path.replace('\\', "/"))
            .collect();
        let tree = LocalContentTree::scan(root)?;
        for path in tree.iter() {
            if listed.contains(path) || self.is_ignored(path) {
                continue;
            }
            plan.to_delete.push(path.to_string());
        }

        Ok(plan)
    }

    fn is_ignored(&self, relative: &str) -> bool {
        self.ignored_prefixes
            .iter()
            .any(|prefix| relative.starts_with(prefix.as_str()))
    }

    // ── Execution ───────────────────────────────────────

    /// Reconcile `root` against `manifest`, reporting `(done, total, path)`
    /// after every completed download.
    ///
    /// Deletions finish before the first download starts. Downloads run in
    /// manifest order through a pool bounded by the downloader's concurrency.
    /// The first network or integrity failure aborts the pass.
    #[instrument(skip(self, manifest, progress), fields(files = manifest.files.len()))]
    pub async fn reconcile(
        &self,
        manifest: &Manifest,
        root: &Path,
        progress: &dyn ProgressReporter,
    ) -> LauncherResult<ReconcileReport> {
        manifest.validate()?;
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|source| LauncherError::io(root, source))?;
        let _lease = ContentRootLease::acquire(root).await?;

        let plan = self.plan(manifest, root).await?;
        info!(
            "Reconciliation plan: {} to download, {} to delete",
            plan.to_download.len(),
            plan.to_delete.len()
        );

        let mut report = ReconcileReport::default();
        for relative in &plan.to_delete {
            let path = root.join(relative);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!("Deleted extraneous file {}", relative);
                    report.deleted += 1;
                }
                Err(err) => {
                    warn!("Could not delete extraneous file {}: {}", relative, err);
                    report.delete_failures += 1;
                }
            }
        }

        let total = plan.to_download.len() as u64;
        let bytes = AtomicU64::new(0);

        // Completions are yielded in manifest order whatever the pool size.
        let mut downloads = std::pin::pin!(stream::iter(plan.to_download.iter())
            .map(|entry| {
                let bytes = &bytes;
                async move {
                    let size = self.download_entry(entry, root).await?;
                    bytes.fetch_add(size, Ordering::Relaxed);
                    Ok::<_, LauncherError>(entry)
                }
            })
            .buffered(self.downloader.concurrency()));

        while let Some(entry) = downloads.next().await {
            let entry = entry?;
            report.downloaded += 1;
            progress.report(report.downloaded as u64, total, &entry.path);
        }

        report.bytes = bytes.load(Ordering::Relaxed);
        info!(
            "Reconciliation complete: {} downloaded, {} deleted",
            report.downloaded, report.deleted
        );
        Ok(report)
    }

    async fn download_entry(&self, entry: &FileEntry, root: &Path) -> LauncherResult<u64> {
        let url = format!("{}{}", self.base_url, entry.path);
        let dest = root.join(&entry.path);

        let outcome = self.downloader.fetch(&url, &[], &dest, &NullProgress).await?;
        let actual = integrity::digest(&dest, HashAlgorithm::Sha256).await?;
        if actual.eq_ignore_ascii_case(entry.hash.trim()) {
            return Ok(outcome.bytes);
        }

        let size = tokio::fs::metadata(&dest)
            .await
            .map(|m| m.len())
            .unwrap_or(outcome.bytes);
        log_mismatch_diagnostics(entry, &dest, &outcome.url, &actual, size).await;

        if let Err(err) = tokio::fs::remove_file(&dest).await {
            warn!("Cannot remove mismatched download {:?}: {}", dest, err);
        }

        Err(LauncherError::Integrity {
            path: entry.path.clone(),
            url: outcome.url,
            expected: entry.hash.clone(),
            actual,
            size,
        })
    }
}

async fn log_mismatch_diagnostics(
    entry: &FileEntry,
    dest: &Path,
    url: &str,
    actual: &str,
    size: u64,
) {
    error!(
        "Hash mismatch for {}: expected {}, got {}, size {} (manifest says {}), url {}",
        entry.path, entry.hash, actual, size, entry.size, url
    );

    let is_text = dest
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| TEXT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    if !is_text {
        return;
    }

    let Ok(content) = tokio::fs::read(dest).await else {
        return;
    };
    if let Some(variant) = line_ending_variant_matching(&content, &entry.hash) {
        warn!(
            "{} differs from the manifest only in line endings (matches the {} form)",
            entry.path, variant
        );
    }
}

/// `Some("LF")` / `Some("CRLF")` when converting `content` to that line-ending
/// form reproduces `expected`.
fn line_ending_variant_matching(content: &[u8], expected: &str) -> Option<&'static str> {
    let text = String::from_utf8_lossy(content);
    let lf = text.replace("\r\n", "\n");
    let crlf = lf.replace('\n', "\r\n");

    let matches = |candidate: &str| {
        hex::encode(Sha256::digest(candidate.as_bytes())).eq_ignore_ascii_case(expected.trim())
    };

    if matches(&lf) {
        Some("LF")
    } else if matches(&crlf) {
        Some("CRLF")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::http::build_http_client;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    fn sha256_hex(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    fn engine(server: &MockServer) -> ReconciliationEngine {
        let downloader = Downloader::new(build_http_client(Duration::from_secs(5)).unwrap());
        ReconciliationEngine::new(downloader, format!("{}/files/", server.uri()))
    }

    async fn serve(server: &MockServer, relative: &str, body: &[u8]) {
        Mock::given(method("GET"))
            .and(path(format!("/files/{}", relative)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn corrupt_required_and_extraneous_files_are_reconciled() {
        let server = MockServer::start().await;
        serve(&server, "a.txt", b"alpha").await;

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("game");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("a.txt"), b"tampered").unwrap();
        std::fs::write(root.join("c.txt"), b"unlisted").unwrap();

        let h1 = sha256_hex(b"alpha");
        let manifest = Manifest {
            version: "1".into(),
            files: vec![
                FileEntry::new("a.txt", &h1, 5),
                FileEntry::new("b.txt", &sha256_hex(b"beta"), 4).optional(),
            ],
        };

        let engine = engine(&server);
        let plan = engine.plan(&manifest, &root).await.unwrap();
        assert_eq!(
            plan.to_download.iter().map(|e| e.path.as_str()).collect::<Vec<_>>(),
            vec!["a.txt"]
        );
        assert_eq!(plan.to_delete, vec!["c.txt".to_string()]);
        assert!(!root.join("a.txt").exists(), "corrupt copy is removed during planning");

        let seen = Mutex::new(Vec::new());
        let reporter = |current: u64, total: u64, label: &str| {
            seen.lock().unwrap().push((current, total, label.to_string()));
        };
        let report = engine.reconcile(&manifest, &root, &reporter).await.unwrap();

        assert_eq!(report.downloaded, 1);
        assert!(integrity::verify(&root.join("a.txt"), &h1, HashAlgorithm::Sha256).await);
        assert!(!root.join("c.txt").exists());
        assert!(!root.join("b.txt").exists());
        assert_eq!(seen.into_inner().unwrap(), vec![(1, 1, "a.txt".to_string())]);

        let again = engine.plan(&manifest, &root).await.unwrap();
        assert!(again.is_empty(), "second pass must be a no-op: {again:?}");
    }

    #[tokio::test]
    async fn optional_entry_is_replaced_only_when_corrupt() {
        let server = MockServer::start().await;
        serve(&server, "opt.cfg", b"good").await;

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("game");
        std::fs::create_dir_all(&root).unwrap();

        let manifest = Manifest {
            version: "1".into(),
            files: vec![FileEntry::new("opt.cfg", &sha256_hex(b"good"), 4).optional()],
        };
        let engine = engine(&server);

        assert!(engine.plan(&manifest, &root).await.unwrap().to_download.is_empty());

        std::fs::write(root.join("opt.cfg"), b"bad").unwrap();
        let plan = engine.plan(&manifest, &root).await.unwrap();
        assert_eq!(plan.to_download.len(), 1);
    }

    #[tokio::test]
    async fn mismatch_after_download_fails_and_removes_file() {
        let server = MockServer::start().await;
        serve(&server, "mods/x.jar", b"served-bytes").await;

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("game");
        let expected = sha256_hex(b"expected-bytes");
        let manifest = Manifest {
            version: "1".into(),
            files: vec![FileEntry::new("mods/x.jar", &expected, 14)],
        };

        let err = engine(&server)
            .reconcile(&manifest, &root, &NullProgress)
            .await
            .unwrap_err();

        match err {
            LauncherError::Integrity {
                path,
                expected: exp,
                actual,
                size,
                ..
            } => {
                assert_eq!(path, "mods/x.jar");
                assert_eq!(exp, expected);
                assert_eq!(actual, sha256_hex(b"served-bytes"));
                assert_eq!(size, 12);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!root.join("mods/x.jar").exists());
    }

    #[tokio::test]
    async fn ignored_prefixes_survive_cleanup() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("game");
        std::fs::create_dir_all(root.join("saves")).unwrap();
        std::fs::write(root.join("saves").join("world.dat"), b"w").unwrap();
        std::fs::write(root.join("junk.tmp"), b"j").unwrap();

        let manifest = Manifest {
            version: "1".into(),
            files: Vec::new(),
        };
        let report = engine(&server)
            .with_ignored(vec!["saves/".into()])
            .reconcile(&manifest, &root, &NullProgress)
            .await
            .unwrap();

        assert_eq!(report.deleted, 1);
        assert!(root.join("saves").join("world.dat").exists());
        assert!(!root.join("junk.tmp").exists());
    }

    fn manifest_of(files: &[(&str, &[u8])]) -> Manifest {
        Manifest {
            version: "1".into(),
            files: files
                .iter()
                .map(|(name, body)| FileEntry::new(name, &sha256_hex(body), body.len() as u64))
                .collect(),
        }
    }

    fn recorder(
        seen: &Mutex<Vec<(u64, u64, String)>>,
    ) -> impl Fn(u64, u64, &str) + Send + Sync + '_ {
        move |current: u64, total: u64, label: &str| {
            seen.lock().unwrap().push((current, total, label.to_string()))
        }
    }

    #[tokio::test]
    async fn progress_follows_manifest_order() {
        let server = MockServer::start().await;
        let files: [(&str, &[u8]); 3] = [("mods/a.jar", b"a"), ("config/b.cfg", b"bb"), ("c.txt", b"ccc")];
        for (name, body) in files {
            serve(&server, name, body).await;
        }

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("game");
        let seen = Mutex::new(Vec::new());
        let report = engine(&server)
            .reconcile(&manifest_of(&files), &root, &recorder(&seen))
            .await
            .unwrap();

        assert_eq!(report.downloaded, 3);
        assert_eq!(report.bytes, 6);
        assert_eq!(
            seen.into_inner().unwrap(),
            vec![
                (1, 3, "mods/a.jar".to_string()),
                (2, 3, "config/b.cfg".to_string()),
                (3, 3, "c.txt".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn pooled_downloads_still_report_in_manifest_order() {
        let server = MockServer::start().await;
        let files: [(&str, &[u8]); 3] = [("slow.bin", b"1"), ("mid.bin", b"22"), ("fast.bin", b"333")];
        for ((name, body), delay) in files.iter().zip([400u64, 150, 0]) {
            Mock::given(method("GET"))
                .and(path(format!("/files/{}", name)))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_bytes(body.to_vec())
                        .set_delay(Duration::from_millis(delay)),
                )
                .mount(&server)
                .await;
        }

        let downloader = Downloader::new(build_http_client(Duration::from_secs(5)).unwrap())
            .with_concurrency(3);
        let engine = ReconciliationEngine::new(downloader, format!("{}/files/", server.uri()));

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("game");
        let seen = Mutex::new(Vec::new());
        let report = engine
            .reconcile(&manifest_of(&files), &root, &recorder(&seen))
            .await
            .unwrap();

        assert_eq!(report.downloaded, 3);
        let labels: Vec<String> = seen.into_inner().unwrap().into_iter().map(|(_, _, l)| l).collect();
        assert_eq!(labels, vec!["slow.bin", "mid.bin", "fast.bin"]);
        for (name, body) in files {
            assert_eq!(std::fs::read(root.join(name)).unwrap(), body);
        }
    }

    /// Serves `body` only once `gone` has been removed from disk.
    struct AfterDeletion {
        gone: PathBuf,
        body: Vec<u8>,
    }

    impl Respond for AfterDeletion {
        fn respond(&self, _request: &Request) -> ResponseTemplate {
            if self.gone.exists() {
                ResponseTemplate::new(409)
            } else {
                ResponseTemplate::new(200).set_body_bytes(self.body.clone())
            }
        }
    }

    #[tokio::test]
    async fn extraneous_files_are_deleted_before_downloads_start() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("game");
        std::fs::create_dir_all(root.join("mods")).unwrap();
        let stale = root.join("mods").join("old.jar");
        std::fs::write(&stale, b"old").unwrap();

        Mock::given(method("GET"))
            .and(path("/files/mods/new.jar"))
            .respond_with(AfterDeletion {
                gone: stale.clone(),
                body: b"new".to_vec(),
            })
            .expect(1)
            .mount(&server)
            .await;

        let report = engine(&server)
            .reconcile(&manifest_of(&[("mods/new.jar", b"new" as &[u8])]), &root, &NullProgress)
            .await
            .unwrap();

        assert_eq!(report.deleted, 1);
        assert_eq!(report.downloaded, 1);
        assert!(!stale.exists());
        assert_eq!(std::fs::read(root.join("mods/new.jar")).unwrap(), b"new");
    }

    #[tokio::test]
    async fn unreachable_file_aborts_with_network_error() {
        let server = MockServer::start().await;
        serve(&server, "a.txt", b"a").await;
        Mock::given(method("GET"))
            .and(path("/files/b.txt"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("game");
        let files: [(&str, &[u8]); 3] = [("a.txt", b"a"), ("b.txt", b"b"), ("c.txt", b"c")];
        let seen = Mutex::new(Vec::new());
        let err = engine(&server)
            .reconcile(&manifest_of(&files), &root, &recorder(&seen))
            .await
            .unwrap_err();

        match err {
            LauncherError::Network { attempts, .. } => {
                assert_eq!(attempts.len(), 1);
                assert_eq!(attempts[0].status, Some(503));
                assert!(attempts[0].url.ends_with("/files/b.txt"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(seen.into_inner().unwrap(), vec![(1, 3, "a.txt".to_string())]);
        assert!(!root.join("b.txt").exists());
        assert!(!root.join("c.txt").exists(), "pass stops at the first failure");
    }

    #[test]
    fn detects_line_ending_only_differences() {
        let lf = b"a=1\nb=2\n";
        let crlf = b"a=1\r\nb=2\r\n";
        assert_eq!(line_ending_variant_matching(crlf, &sha256_hex(lf)), Some("LF"));
        assert_eq!(line_ending_variant_matching(lf, &sha256_hex(crlf)), Some("CRLF"));
        assert_eq!(line_ending_variant_matching(lf, &sha256_hex(b"other")), None);
    }
}
