use std::path::Path;

use tracing::{info, instrument};
use uuid::Uuid;

use crate::core::archive;
use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::progress::ProgressReporter;

/// Download the packaged client from `url` and unpack it over `dest`,
/// keeping relative paths. Reports bytes while downloading, then one step
/// per extracted file. Returns the number of files written.
#[instrument(skip(downloader, progress))]
pub async fn install_client_archive(
    downloader: &Downloader,
    url: &str,
    dest: &Path,
    progress: &dyn ProgressReporter,
) -> LauncherResult<usize> {
    let archive_path = std::env::temp_dir().join(format!("minecraft_client_{}.zip", Uuid::new_v4().simple()));
    downloader.fetch(url, &[], &archive_path, progress).await?;

    let result = archive::unpack_all(&archive_path, dest, progress).await;

    if let Err(err) = tokio::fs::remove_file(&archive_path).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            return Err(LauncherError::io(&archive_path, err));
        }
    }
    let written = result?;
    info!("Client archive unpacked: {} files into {:?}", written, dest);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::http::build_http_client;
    use std::io::Write;
    use std::sync::Mutex;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_zip() -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::SimpleFileOptions::default();
            zip.add_directory("versions/", options).unwrap();
            zip.start_file("versions/1.12.2/1.12.2.jar", options).unwrap();
            zip.write_all(b"client").unwrap();
            zip.start_file("options.txt", options).unwrap();
            zip.write_all(b"lang:en_us").unwrap();
            zip.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[tokio::test]
    async fn downloads_and_unpacks_with_progress() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/minecraft_client_1.12.2.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(client_zip()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("options.txt"), b"old").unwrap();
        let downloader = Downloader::new(build_http_client(Duration::from_secs(5)).unwrap());
        let events = Mutex::new(Vec::new());
        let progress = |current: u64, total: u64, label: &str| {
            events.lock().unwrap().push((current, total, label.to_string()));
        };

        let written = install_client_archive(
            &downloader,
            &format!("{}/minecraft_client_1.12.2.zip", server.uri()),
            dir.path(),
            &progress,
        )
        .await
        .unwrap();

        assert_eq!(written, 2);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("options.txt")).unwrap(),
            "lang:en_us"
        );
        assert!(dir.path().join("versions/1.12.2/1.12.2.jar").is_file());
        let events = events.into_inner().unwrap();
        assert!(events.iter().any(|(c, t, l)| (*c, *t) == (2, 2) && l == "options.txt"));
    }

    #[tokio::test]
    async fn missing_archive_is_network_failure() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(build_http_client(Duration::from_secs(5)).unwrap());

        let err = install_client_archive(
            &downloader,
            &format!("{}/missing.zip", server.uri()),
            dir.path(),
            &crate::core::progress::NullProgress,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LauncherError::Network { .. }));
    }
}
