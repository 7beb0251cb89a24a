mod client_archive;
pub mod forge;
pub mod libraries;

pub use client_archive::install_client_archive;
pub use forge::{InstallReport, InstallStage, InstallationPipeline};
pub use libraries::{ensure_libraries, library_table, public_mirrors, required_artifacts};
