mod hash;

pub use hash::{digest, verify, HashAlgorithm};
