use std::path::Path;

use tracing::{debug, warn};

use crate::core::archive;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::version::RuntimeVersionDescriptor;

/// Unpack the `natives-{os_name}` bundle of every applicable library into
/// `natives_dir`, flattened. Bundles absent from `libraries_dir` are skipped
/// with a warning. Returns the number of files written.
pub async fn prepare_natives(
    descriptor: &RuntimeVersionDescriptor,
    libraries_dir: &Path,
    natives_dir: &Path,
    os_name: &str,
) -> LauncherResult<usize> {
    tokio::fs::create_dir_all(natives_dir)
        .await
        .map_err(|source| LauncherError::io(natives_dir, source))?;

    let native_key = format!("natives-{}", os_name);
    let mut written = 0;
    for library in descriptor.libraries_for(os_name) {
        for (key, artifact) in library.native_artifacts() {
            if key != native_key {
                continue;
            }
            let bundle = libraries_dir.join(&artifact.path);
            if !bundle.is_file() {
                warn!("Native bundle for {} not found at {:?}", library.name, bundle);
                continue;
            }
            let files = archive::unpack_flattened(&bundle, natives_dir).await?;
            debug!("Unpacked {} natives from {}", files.len(), library.name);
            written += files.len();
        }
    }
    Ok(written)
}
