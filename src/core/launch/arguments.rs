use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::classpath::{build_classpath, safe_path_str, Classpath};
use crate::core::auth::{UserSession, USER_TYPE};
use crate::core::version::RuntimeVersionDescriptor;

pub const VERSION_TYPE: &str = "custom";

/// Compatibility properties Forge 1.12.2 expects after the game arguments.
pub const FML_COMPAT_FLAGS: [&str; 2] = [
    "-Dfml.ignorePatchDiscrepancies=true",
    "-Dfml.ignoreInvalidMinecraftCertificates=true",
];

/// Inputs besides the descriptor and user that shape the command line.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub libraries_dir: PathBuf,
    pub assets_index_id: String,
    pub jvm_flags: Vec<String>,
    pub os_name: String,
}

/// The full command line, split the way it is assembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchArguments {
    pub jvm: Vec<String>,
    pub classpath: Classpath,
    pub main_class: String,
    pub game: Vec<String>,
}

impl LaunchArguments {
    /// Arguments after the runtime executable, in order.
    pub fn to_command_args(&self) -> Vec<String> {
        let mut args = self.jvm.clone();
        args.push("-cp".into());
        args.push(self.classpath.joined());
        args.push(self.main_class.clone());
        args.extend(self.game.iter().cloned());
        args
    }
}

/// Build the classpath and substitute the descriptor's argument template.
///
/// The template is split on whitespace before substitution so a value
/// containing spaces stays a single argument. A fresh session uuid is drawn on
/// every call. Unknown placeholders are left untouched.
pub fn compose_arguments(
    descriptor: &RuntimeVersionDescriptor,
    user: &UserSession,
    content_root: &Path,
    options: &LaunchOptions,
) -> LaunchArguments {
    let classpath = build_classpath(
        descriptor,
        &options.libraries_dir,
        content_root,
        &options.os_name,
    );

    let game_dir = safe_path_str(content_root);
    let assets_root = safe_path_str(&content_root.join("assets"));
    let session_uuid = Uuid::new_v4().simple().to_string();
    let access_token = user.access_token.clone().unwrap_or_default();

    let substitutions: [(&str, &str); 9] = [
        ("${auth_player_name}", user.display_name()),
        ("${version_name}", &descriptor.id),
        ("${game_directory}", &game_dir),
        ("${assets_root}", &assets_root),
        ("${assets_index_name}", &options.assets_index_id),
        ("${auth_uuid}", &session_uuid),
        ("${auth_access_token}", &access_token),
        ("${user_type}", USER_TYPE),
        ("${version_type}", VERSION_TYPE),
    ];

    let mut game: Vec<String> = descriptor
        .argument_template
        .split_whitespace()
        .map(|token| {
            substitutions
                .iter()
                .fold(token.to_string(), |acc, (key, value)| acc.replace(key, value))
        })
        .collect();
    game.extend(FML_COMPAT_FLAGS.iter().map(|s| s.to_string()));

    let mut jvm = options.jvm_flags.clone();
    jvm.push(format!(
        "-Djava.library.path={}",
        safe_path_str(&content_root.join("natives"))
    ));

    LaunchArguments {
        jvm,
        classpath,
        main_class: descriptor.main_class.clone(),
        game,
    }
}
