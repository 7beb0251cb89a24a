pub(crate) mod extract;

pub use extract::{unpack_all, unpack_flattened};
