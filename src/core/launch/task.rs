// ─── Launch Task ───
// Prepares the content root, spawns the game and watches the first seconds of
// its life.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;

use tokio::process::{Child, Command};
use tracing::{error, info, instrument, warn};

use super::arguments::{compose_arguments, LaunchArguments, LaunchOptions};
use super::classpath::safe_path_str;
use super::natives::prepare_natives;
use crate::core::assets::{index_path, AssetManager};
use crate::core::auth::{ensure_tokens, TokenStore, UserSession};
use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::java::{
    detect_runtime_major_version, jvm_tuning_flags, resolve_runtime, EnvironmentSnapshot,
    RuntimeInstaller,
};
use crate::core::loaders::{ensure_libraries, public_mirrors, InstallationPipeline};
use crate::core::process::{format_command_for_logs, CapturedOutput};
use crate::core::progress::NullProgress;
use crate::core::state::LauncherConfig;
use crate::core::version::{current_os_name, descriptor_path, RuntimeVersionDescriptor};

/// What a runtime prints when it rejects a JVM flag it does not know.
pub const UNRECOGNIZED_VM_OPTION: &str = "Unrecognized VM option";

/// Known failure signatures in game output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchDiagnostic {
    RejectedVmOption,
    CorruptedLibraryArchive,
    UnsupportedClassVersion,
}

pub fn detect_launch_diagnostic(output: &str) -> Option<LaunchDiagnostic> {
    if output.contains(UNRECOGNIZED_VM_OPTION) {
        return Some(LaunchDiagnostic::RejectedVmOption);
    }
    if output.contains("zip END header not found") {
        return Some(LaunchDiagnostic::CorruptedLibraryArchive);
    }
    if output.contains("UnsupportedClassVersionError") {
        return Some(LaunchDiagnostic::UnsupportedClassVersion);
    }
    None
}

pub fn diagnostic_message(diagnostic: LaunchDiagnostic) -> &'static str {
    match diagnostic {
        LaunchDiagnostic::RejectedVmOption => {
            "The Java runtime rejected a JVM option. Install Java 8 or point the launcher at a 1.8 runtime."
        }
        LaunchDiagnostic::CorruptedLibraryArchive => {
            "A library archive is damaged. Run `verify` to re-download the game files."
        }
        LaunchDiagnostic::UnsupportedClassVersion => {
            "The game needs a different Java version than the one selected."
        }
    }
}

/// A game process that survived the grace window.
pub struct GameProcess {
    child: Child,
    output: CapturedOutput,
    java: PathBuf,
}

impl GameProcess {
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the game to exit. Output keeps streaming into the log.
    pub async fn wait(mut self) -> LauncherResult<ExitStatus> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|source| LauncherError::io(&self.java, source))?;
        let output = self.output.finish().await;
        if status.success() {
            info!("Game exited normally");
        } else {
            warn!("Game exited with {}", status);
            if let Some(diagnostic) = detect_launch_diagnostic(&output) {
                warn!("{}", diagnostic_message(diagnostic));
            }
        }
        Ok(status)
    }

    pub async fn kill(&mut self) -> LauncherResult<()> {
        self.child
            .kill()
            .await
            .map_err(|source| LauncherError::io(&self.java, source))
    }
}

enum Attempt {
    Running(GameProcess),
    Exited { code: Option<i32>, output: String },
}

/// Starts the installed game for a user.
pub struct RuntimeLauncher<'a> {
    config: &'a LauncherConfig,
    downloader: &'a Downloader,
    installer: &'a dyn RuntimeInstaller,
    tokens: &'a dyn TokenStore,
    java: Option<PathBuf>,
    grace: Duration,
    library_mirrors: Vec<String>,
}

impl<'a> RuntimeLauncher<'a> {
    pub fn new(
        config: &'a LauncherConfig,
        downloader: &'a Downloader,
        installer: &'a dyn RuntimeInstaller,
        tokens: &'a dyn TokenStore,
    ) -> Self {
        let library_mirrors = std::iter::once(config.libraries_mirror())
            .chain(public_mirrors())
            .collect();
        Self {
            config,
            downloader,
            installer,
            tokens,
            java: None,
            grace: Duration::from_secs(config.launch_grace_secs),
            library_mirrors,
        }
    }

    /// Start the game with this runtime instead of discovering one.
    pub fn with_java(mut self, java: PathBuf) -> Self {
        self.java = Some(java);
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn with_library_mirrors(mut self, mirrors: Vec<String>) -> Self {
        self.library_mirrors = mirrors;
        self
    }

    /// Make sure the content root is runnable, then spawn the game.
    ///
    /// A process that exits within the grace window counts as a failed start.
    /// When its output shows the runtime rejected a VM option, the legacy
    /// runtime is installed and the start retried once.
    #[instrument(skip(self, user), fields(user = %user.display_name()))]
    pub async fn launch(&self, user: UserSession) -> LauncherResult<GameProcess> {
        let os_name = current_os_name();
        let descriptor = self.ensure_descriptor().await?;

        let missing = ensure_libraries(
            self.downloader,
            &descriptor,
            &self.config.libraries_dir(),
            &self.library_mirrors,
            os_name,
        )
        .await;
        if !missing.is_empty() {
            warn!("Launching with {} missing libraries: {:?}", missing.len(), missing);
        }

        self.ensure_assets().await?;
        prepare_natives(
            &descriptor,
            &self.config.libraries_dir(),
            &self.config.natives_dir(),
            os_name,
        )
        .await?;

        let session = ensure_tokens(user, self.tokens)?;

        let mut retried = false;
        loop {
            let env = self.capture_environment().await?;
            let java = match &self.java {
                Some(java) => java.clone(),
                None => resolve_runtime(&env),
            };
            let major = detect_runtime_major_version(&java).await;
            let options = LaunchOptions {
                libraries_dir: self.config.libraries_dir(),
                assets_index_id: self.config.asset_index_id.clone(),
                jvm_flags: jvm_tuning_flags(major, &self.config.max_memory),
                os_name: os_name.to_string(),
            };
            let arguments = compose_arguments(&descriptor, &session, &self.config.game_dir, &options);

            let (code, output) = match self.start(&java, &arguments).await? {
                Attempt::Running(process) => return Ok(process),
                Attempt::Exited { code, output } => (code, output),
            };
            let rejected =
                detect_launch_diagnostic(&output) == Some(LaunchDiagnostic::RejectedVmOption);
            let failure = LauncherError::Subprocess {
                program: java.to_string_lossy().to_string(),
                code,
                output,
            };
            if retried || !rejected {
                error!("Game exited immediately: {}", failure);
                return Err(failure);
            }

            warn!("Runtime rejected a VM option, installing the legacy runtime and retrying");
            if let Err(err) = self.installer.install(&env).await {
                error!("Legacy runtime installation failed: {}", err);
                return Err(failure);
            }
            retried = true;
        }
    }

    async fn ensure_descriptor(&self) -> LauncherResult<RuntimeVersionDescriptor> {
        let game_dir = &self.config.game_dir;
        let version_id = &self.config.version_id;
        if let Some(descriptor) = RuntimeVersionDescriptor::load(game_dir, version_id).await? {
            return Ok(descriptor);
        }

        info!("Version {} is not installed, installing", version_id);
        let mut pipeline = InstallationPipeline::new(self.downloader, self.config)
            .with_library_mirrors(self.library_mirrors.clone());
        if let Some(java) = &self.java {
            pipeline = pipeline.with_java(java.clone());
        }
        pipeline.run(&NullProgress).await?;

        RuntimeVersionDescriptor::load(game_dir, version_id)
            .await?
            .ok_or_else(|| {
                LauncherError::io(
                    descriptor_path(game_dir, version_id),
                    std::io::Error::new(std::io::ErrorKind::NotFound, "version descriptor missing"),
                )
            })
    }

    async fn ensure_assets(&self) -> LauncherResult<()> {
        let assets_dir = self.config.assets_dir();
        if index_path(&assets_dir, &self.config.asset_index_id).is_file() {
            return Ok(());
        }
        info!("Asset index {} missing, syncing assets", self.config.asset_index_id);
        let report = AssetManager::new(self.downloader, &self.config.assets_base_url)
            .sync(&self.config.asset_index_id, &assets_dir, &NullProgress)
            .await?;
        if !report.failed.is_empty() {
            warn!("{} asset objects could not be fetched", report.failed.len());
        }
        Ok(())
    }

    async fn capture_environment(&self) -> LauncherResult<EnvironmentSnapshot> {
        let legacy_dir = self.config.legacy_runtime_dir();
        tokio::task::spawn_blocking(move || EnvironmentSnapshot::capture(&legacy_dir))
            .await
            .map_err(|e| LauncherError::Other(format!("runtime discovery failed: {}", e)))
    }

    async fn start(&self, java: &Path, arguments: &LaunchArguments) -> LauncherResult<Attempt> {
        let game_dir = &self.config.game_dir;
        let mut cmd = Command::new(java);
        cmd.args(arguments.to_command_args())
            .current_dir(game_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        configure_native_library_env(&mut cmd, &self.config.natives_dir());
        configure_platform_spawn(&mut cmd);

        info!("Launching: {}", format_command_for_logs(&cmd));
        let mut child = cmd.spawn().map_err(|source| LauncherError::Subprocess {
            program: java.to_string_lossy().to_string(),
            code: None,
            output: source.to_string(),
        })?;
        let output = CapturedOutput::attach(&mut child, "game");
        info!("Game started with pid {:?}", child.id());

        let exited = tokio::select! {
            status = child.wait() => Some(status),
            _ = tokio::time::sleep(self.grace) => None,
        };

        match exited {
            None => Ok(Attempt::Running(GameProcess {
                child,
                output,
                java: java.to_path_buf(),
            })),
            Some(status) => {
                let status = status.map_err(|source| LauncherError::io(java, source))?;
                let output = output.finish().await;
                Ok(Attempt::Exited {
                    code: status.code(),
                    output,
                })
            }
        }
    }
}

fn configure_native_library_env(cmd: &mut Command, natives_dir: &Path) {
    let native_path = safe_path_str(natives_dir);

    if cfg!(target_os = "windows") {
        cmd.env("PATH", append_env_path("PATH", &native_path));
    } else if cfg!(target_os = "linux") {
        cmd.env("LD_LIBRARY_PATH", append_env_path("LD_LIBRARY_PATH", &native_path));
    } else if cfg!(target_os = "macos") {
        cmd.env("DYLD_LIBRARY_PATH", append_env_path("DYLD_LIBRARY_PATH", &native_path));
    }
}

fn configure_platform_spawn(cmd: &mut Command) {
    #[cfg(target_os = "windows")]
    {
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        cmd.creation_flags(CREATE_NO_WINDOW);
        cmd.env_remove("WT_SESSION");
        cmd.env_remove("TERM");
    }
    #[cfg(not(target_os = "windows"))]
    let _ = cmd;
}

fn append_env_path(var_name: &str, value: &str) -> String {
    let separator = if cfg!(target_os = "windows") {
        ";"
    } else {
        ":"
    };
    match std::env::var(var_name) {
        Ok(existing) if !existing.trim().is_empty() => {
            format!("{}{}{}", value, separator, existing)
        }
        _ => value.to_string(),
    }
}
