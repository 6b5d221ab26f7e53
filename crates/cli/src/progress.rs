//! Console rendering of analysis progress.

use scanpilot_core::{ObserverError, ProgressHandle, ProgressObserver};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Prints `[label] description` lines for each progress task.
pub struct ConsoleProgress<W: Write + Send> {
    out: Mutex<W>,
    next: AtomicU64,
    labels: Mutex<HashMap<u64, String>>,
}

impl ConsoleProgress<std::io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }
}

impl<W: Write + Send> ConsoleProgress<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            next: AtomicU64::new(1),
            labels: Mutex::new(HashMap::new()),
        }
    }

    fn print(&self, handle: ProgressHandle, text: &str) -> Result<(), ObserverError> {
        let label = self
            .labels
            .lock()
            .map_err(|_| ObserverError("label table poisoned".into()))?
            .get(&handle.0)
            .cloned()
            .ok_or_else(|| ObserverError(format!("unknown progress task {}", handle.0)))?;
        let mut out = self.out.lock().map_err(|_| ObserverError("output poisoned".into()))?;
        writeln!(out, "[{label}] {text}").map_err(|e| ObserverError(e.to_string()))
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> ProgressObserver for ConsoleProgress<W> {
    fn start(&self, label: &str) -> Result<ProgressHandle, ObserverError> {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.labels
            .lock()
            .map_err(|_| ObserverError("label table poisoned".into()))?
            .insert(id, label.to_string());
        let handle = ProgressHandle(id);
        self.print(handle, "started")?;
        Ok(handle)
    }

    fn update(&self, handle: ProgressHandle, description: &str) -> Result<(), ObserverError> {
        self.print(handle, description)
    }

    fn complete(&self, handle: ProgressHandle) -> Result<(), ObserverError> {
        self.print(handle, "done")?;
        self.labels
            .lock()
            .map_err(|_| ObserverError("label table poisoned".into()))?
            .remove(&handle.0);
        Ok(())
    }
}
