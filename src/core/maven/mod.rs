mod artifact;

pub use artifact::MavenArtifact;

/// Public repositories consulted after the project's own library mirror.
pub const MAVEN_CENTRAL: &str = "https://repo1.maven.org/maven2";
pub const LEGACY_LIBRARIES_GITHUB: &str =
    "https://raw.githubusercontent.com/minecraft-legacy/minecraft-libraries/master";
