pub mod commands;
pub mod core;

pub use crate::core::error::{LauncherError, LauncherResult};
pub use crate::core::state::{AppState, LauncherConfig};
