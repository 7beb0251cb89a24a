// ─── Manifest ───
// Remote listing of the content tree: one entry per file with its SHA-256.

mod model;

pub use model::{fetch_manifest, FileEntry, Manifest};
