//! Per-driver scan session state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;

/// One running read loop. At most one per driver at a time; the owning
/// driver replaces it only after stopping the previous one.
#[derive(Debug)]
pub(crate) struct ScanSession {
    task: JoinHandle<()>,
    scanning: Arc<AtomicBool>,
}

impl ScanSession {
    pub(crate) fn new(task: JoinHandle<()>, scanning: Arc<AtomicBool>) -> Self {
        Self { task, scanning }
    }

    /// Fresh scanning flag, shared between the driver and its read task.
    /// The task clears it when the loop ends on its own.
    pub(crate) fn new_flag() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(true))
    }

    pub(crate) fn is_active(&self) -> bool {
        self.scanning.load(Ordering::SeqCst) && !self.task.is_finished()
    }

    /// Stop the read loop. Flips the flag for polling loops and aborts the
    /// task so a pending blocking read is actively cancelled rather than
    /// left waiting for data that may never arrive.
    pub(crate) async fn stop(self) {
        self.scanning.store(false, Ordering::SeqCst);
        self.task.abort();
        // Either completion or cancellation is fine here.
        let _ = self.task.await;
    }
}
