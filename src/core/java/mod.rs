mod legacy;
pub mod runtime;

pub use legacy::{LegacyRuntimeInstaller, RuntimeInstaller};
pub use runtime::{
    detect_runtime_major_version, java_exe, jvm_tuning_flags, locate_runtime,
    parse_runtime_major_version, resolve_runtime, EnvironmentSnapshot, PathRuntime,
};
