mod self_update;

pub use self_update::{
    check_for_update, compare_versions, is_newer, perform_update, BinaryReplacer, ScriptReplacer,
    UpdateInfo,
};
