//! Progress observer: the side channel for "round started",
//! "capability starting", and "capability finished" notifications.
//!
//! Every method is fallible, and every failure is swallowed by the caller:
//! rendering progress must never decide the outcome of an analysis.

use crate::error::ObserverError;

/// Opaque handle to one progress task, issued by [`ProgressObserver::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgressHandle(pub u64);

pub trait ProgressObserver: Send + Sync {
    /// Begin a task labelled `label`.
    fn start(&self, label: &str) -> Result<ProgressHandle, ObserverError>;

    /// Replace the task's current description.
    fn update(&self, handle: ProgressHandle, description: &str) -> Result<(), ObserverError>;

    /// Mark the task complete.
    fn complete(&self, handle: ProgressHandle) -> Result<(), ObserverError>;
}

/// An observer that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressObserver for NoopProgress {
    fn start(&self, _label: &str) -> Result<ProgressHandle, ObserverError> {
        Ok(ProgressHandle(0))
    }

    fn update(&self, _handle: ProgressHandle, _description: &str) -> Result<(), ObserverError> {
        Ok(())
    }

    fn complete(&self, _handle: ProgressHandle) -> Result<(), ObserverError> {
        Ok(())
    }
}

/// Calls into an observer and logs, rather than propagates, its failures.
///
/// Holds `None` when `start` itself failed; later calls become no-ops.
pub struct ProgressReporter<'a> {
    observer: &'a dyn ProgressObserver,
    handle: Option<ProgressHandle>,
}

impl<'a> ProgressReporter<'a> {
    pub fn start(observer: &'a dyn ProgressObserver, label: &str) -> Self {
        let handle = match observer.start(label) {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, label, "Progress start failed");
                None
            }
        };
        Self { observer, handle }
    }

    pub fn update(&self, description: &str) {
        let Some(handle) = self.handle else {
            return;
        };
        if let Err(e) = self.observer.update(handle, description) {
            tracing::warn!(error = %e, "Progress update failed");
        }
    }

    pub fn complete(self) {
        let Some(handle) = self.handle else {
            return;
        };
        if let Err(e) = self.observer.complete(handle) {
            tracing::warn!(error = %e, "Progress completion failed");
        }
    }
}
