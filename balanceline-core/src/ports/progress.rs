//! Progress notification port

use crate::domain::ImportState;

/// Receives one notification per state transition of an import
pub trait ProgressObserver: Send + Sync {
    fn on_transition(&self, from: ImportState, to: ImportState);
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressObserver for NoopProgress {
    fn on_transition(&self, _from: ImportState, _to: ImportState) {}
}

impl<F> ProgressObserver for F
where
    F: Fn(ImportState, ImportState) + Send + Sync,
{
    fn on_transition(&self, from: ImportState, to: ImportState) {
        self(from, to)
    }
}
