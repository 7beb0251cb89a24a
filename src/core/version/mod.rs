pub mod rules;
pub mod version_file;

pub use rules::{applies, current_os_name, LibraryRule, OsRule, RuleAction};
pub use version_file::{
    descriptor_path, LibraryArtifact, LibraryDownloads, LibraryEntry, RuntimeVersionDescriptor,
};
