use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use launcher_lib::commands;
use launcher_lib::core::auth::{SessionFile, UserSession};
use launcher_lib::core::logging::init_logging;
use launcher_lib::core::progress::ProgressReporter;
use launcher_lib::core::update::ScriptReplacer;
use launcher_lib::{AppState, LauncherConfig, LauncherResult};

#[derive(Parser)]
#[command(name = "launcher", version, about = "Install, verify and launch the modded 1.12.2 client")]
struct Cli {
    /// Config file (default: launcher_config.json in the platform data dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Reconcile the game directory against the remote manifest
    Verify,
    /// Download and unpack the packaged client
    InstallClient,
    /// Run the Forge installer, write the version descriptor, fetch libraries and assets
    Install,
    /// Start the game
    Launch {
        /// Player name; defaults to the stored session
        #[arg(long)]
        username: Option<String>,
        /// Java executable to use instead of discovery
        #[arg(long)]
        java: Option<PathBuf>,
        /// Return once the game is running instead of waiting for it to exit
        #[arg(long, default_value_t = false)]
        detach: bool,
    },
    /// Check for a newer launcher and optionally install it
    Update {
        #[arg(long, default_value_t = false)]
        check_only: bool,
    },
    /// Print environment and endpoint reachability
    Diagnose,
}

/// Progress printed as one overwritten console line.
struct ConsoleProgress;

impl ProgressReporter for ConsoleProgress {
    fn report(&self, current: u64, total: u64, label: &str) {
        if total > 0 {
            eprint!("\r[{:>3}%] {}/{} {}\x1b[K", current * 100 / total, current, total, label);
        } else {
            eprint!("\r{} {}\x1b[K", current, label);
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(LauncherConfig::default_path);

    let state = match AppState::load(&config_path).await {
        Ok(state) => state,
        Err(err) => {
            eprintln!("Cannot load configuration {:?}: {}", config_path, err);
            return ExitCode::FAILURE;
        }
    };
    let _log_guard = match init_logging(&state.config.logs_dir()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Cannot initialize logging: {}", err);
            return ExitCode::FAILURE;
        }
    };
    info!("Launcher {} starting", state.config.current_version);

    match run(&state, cli.cmd).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            eprintln!("\n{}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(state: &AppState, cmd: Cmd) -> LauncherResult<()> {
    match cmd {
        Cmd::Verify => {
            let report = commands::verify_game_files(state, &ConsoleProgress).await?;
            eprintln!();
            println!(
                "{} downloaded, {} deleted, {} could not be deleted",
                report.downloaded, report.deleted, report.delete_failures
            );
        }
        Cmd::InstallClient => {
            let written = commands::install_client(state, &ConsoleProgress).await?;
            eprintln!();
            println!("{} files unpacked", written);
        }
        Cmd::Install => {
            let report = commands::install_mod_loader(state, &ConsoleProgress).await?;
            eprintln!();
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Cmd::Launch {
            username,
            java,
            detach,
        } => {
            let sessions = SessionFile::in_dir(&state.config.data_dir);
            let stored = sessions.load()?;
            let user = match (username, stored) {
                (Some(name), Some(stored)) if stored.username == name => stored,
                (Some(name), _) => UserSession::offline(&name),
                (None, Some(stored)) => stored,
                (None, None) => UserSession::offline(""),
            };
            let process = commands::launch_game(state, user, &sessions, java).await?;
            println!("Game running (pid {:?})", process.pid());
            if !detach {
                let status = process.wait().await?;
                println!("Game exited: {}", status);
            }
        }
        Cmd::Update { check_only } => match commands::check_for_update(state).await? {
            None => println!("Launcher {} is up to date", state.config.current_version),
            Some(update) if check_only => println!("Update available: {}", update.version),
            Some(update) => {
                commands::perform_update(state, &update, &ConsoleProgress, &ScriptReplacer::default())
                    .await?;
                eprintln!();
                println!("Installing {}; the launcher will restart", update.version);
            }
        },
        Cmd::Diagnose => {
            let report = commands::diagnose(state).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
