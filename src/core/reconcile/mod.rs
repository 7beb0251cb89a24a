// ─── Reconciliation ───
// Brings a content root into agreement with a manifest: stale and corrupt
// files out, missing files in, every download verified.

mod engine;
mod lease;
mod plan;

pub use engine::{ReconcileReport, ReconciliationEngine};
pub use lease::ContentRootLease;
pub use plan::{LocalContentTree, ReconciliationPlan};
