// ─── Progress Reporting ───
// The UI observes long operations through `(current, total, label)` calls made
// synchronously on the flow doing the work.

/// Receives progress for downloads, reconciliation, extraction and installs.
///
/// Implementations must not block on the resource being worked on.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, current: u64, total: u64, label: &str);
}

impl<F> ProgressReporter for F
where
    F: Fn(u64, u64, &str) + Send + Sync,
{
    fn report(&self, current: u64, total: u64, label: &str) {
        self(current, total, label)
    }
}

/// Discards every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressReporter for NullProgress {
    fn report(&self, _current: u64, _total: u64, _label: &str) {}
}
