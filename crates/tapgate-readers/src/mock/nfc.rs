//! Scriptable contactless backend.

use crate::nfc::{NfcBackend, NfcListener, TagNotification};
use std::sync::{Arc, Mutex};
use tapgate_core::{Result, TransportError};
use tokio::sync::mpsc;

#[derive(Default)]
struct MockNfcState {
    available: bool,
    fail_watch: Option<TransportError>,
    tag_tx: Option<mpsc::Sender<TagNotification>>,
}

/// Mock platform contactless stack.
pub struct MockNfc {
    shared: Arc<Mutex<MockNfcState>>,
}

/// Test-side control handle for [`MockNfc`].
#[derive(Clone)]
pub struct MockNfcHandle {
    shared: Arc<Mutex<MockNfcState>>,
}

impl MockNfc {
    /// Create a backend plus its control handle. The capability starts
    /// unavailable.
    pub fn new() -> (Self, MockNfcHandle) {
        let shared = Arc::new(Mutex::new(MockNfcState::default()));
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MockNfcHandle { shared },
        )
    }
}

impl NfcBackend for MockNfc {
    type Listener = MockNfcListener;

    async fn is_available(&self) -> bool {
        self.shared.lock().unwrap().available
    }

    async fn watch(&mut self) -> Result<Self::Listener> {
        let mut state = self.shared.lock().unwrap();
        if let Some(err) = state.fail_watch.take() {
            return Err(err);
        }
        let (tx, rx) = mpsc::channel(16);
        state.tag_tx = Some(tx);
        Ok(MockNfcListener { rx })
    }
}

/// Listener half produced by [`MockNfc::watch`].
pub struct MockNfcListener {
    rx: mpsc::Receiver<TagNotification>,
}

impl NfcListener for MockNfcListener {
    async fn next_tag(&mut self) -> Result<Option<TagNotification>> {
        Ok(self.rx.recv().await)
    }
}

impl MockNfcHandle {
    /// Flip platform capability presence.
    pub fn set_available(&self, available: bool) {
        self.shared.lock().unwrap().available = available;
    }

    /// Make the next `watch` call fail with the given error.
    pub fn fail_next_watch(&self, err: TransportError) {
        self.shared.lock().unwrap().fail_watch = Some(err);
    }

    /// Present a tag to the active listener. Returns `false` when no
    /// listener is registered or it has already been dropped.
    pub async fn present_tag(&self, tag: TagNotification) -> bool {
        let tx = self.shared.lock().unwrap().tag_tx.clone();
        match tx {
            Some(tx) => tx.send(tag).await.is_ok(),
            None => false,
        }
    }

    /// Whether a listener registration is currently live.
    pub fn has_listener(&self) -> bool {
        self.shared
            .lock()
            .unwrap()
            .tag_tx
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Close the notification source for good; the listener observes
    /// end-of-stream.
    pub fn close_source(&self) {
        self.shared.lock().unwrap().tag_tx = None;
    }
}
