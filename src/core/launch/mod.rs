pub mod arguments;
pub mod classpath;
mod natives;
pub mod task;

pub use arguments::{compose_arguments, LaunchArguments, LaunchOptions};
pub use classpath::{build_classpath, Classpath};
pub use natives::prepare_natives;
pub use task::{detect_launch_diagnostic, diagnostic_message, GameProcess, LaunchDiagnostic, RuntimeLauncher};
