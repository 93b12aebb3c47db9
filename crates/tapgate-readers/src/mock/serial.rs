//! Scriptable serial backend.

use crate::serial::{SerialBackend, SerialCandidate, SerialConnection};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tapgate_core::{Result, TransportError};
use tokio::sync::mpsc;

#[derive(Default)]
struct MockSerialState {
    ports: Vec<SerialCandidate>,
    open_errors: VecDeque<TransportError>,
    open_attempts: usize,
    data_tx: Option<mpsc::Sender<Vec<u8>>>,
}

/// Mock serial port service.
pub struct MockSerial {
    shared: Arc<Mutex<MockSerialState>>,
}

/// Test-side control handle for [`MockSerial`].
#[derive(Clone)]
pub struct MockSerialHandle {
    shared: Arc<Mutex<MockSerialState>>,
}

impl MockSerial {
    /// Create a backend plus its control handle. No ports are present
    /// initially.
    pub fn new() -> (Self, MockSerialHandle) {
        let shared = Arc::new(Mutex::new(MockSerialState::default()));
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MockSerialHandle { shared },
        )
    }
}

impl SerialBackend for MockSerial {
    type Connection = MockSerialConnection;

    async fn enumerate(&self) -> Result<Vec<SerialCandidate>> {
        Ok(self.shared.lock().unwrap().ports.clone())
    }

    async fn open(&mut self, port_name: &str, _baud: u32) -> Result<Self::Connection> {
        let mut state = self.shared.lock().unwrap();
        state.open_attempts += 1;
        if let Some(err) = state.open_errors.pop_front() {
            return Err(err);
        }
        if !state.ports.iter().any(|p| p.port_name == port_name) {
            return Err(TransportError::device_not_found(format!(
                "no such port: {port_name}"
            )));
        }
        let (tx, rx) = mpsc::channel(16);
        state.data_tx = Some(tx);
        Ok(MockSerialConnection { rx })
    }
}

/// Open port produced by [`MockSerial::open`].
pub struct MockSerialConnection {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl SerialConnection for MockSerialConnection {
    async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.rx.recv().await)
    }
}

impl MockSerialHandle {
    /// Attach a port with the given access bits.
    pub fn add_port(&self, port_name: &str, readable: bool, writable: bool) {
        self.shared.lock().unwrap().ports.push(SerialCandidate {
            port_name: port_name.to_string(),
            readable,
            writable,
        });
    }

    /// Detach a port.
    pub fn remove_port(&self, port_name: &str) {
        self.shared
            .lock()
            .unwrap()
            .ports
            .retain(|p| p.port_name != port_name);
    }

    /// Script one open failure; consumed per open attempt, in order.
    pub fn script_open_error(&self, err: TransportError) {
        self.shared.lock().unwrap().open_errors.push_back(err);
    }

    /// Number of open attempts made so far.
    pub fn open_attempts(&self) -> usize {
        self.shared.lock().unwrap().open_attempts
    }

    /// Stream bytes to the open port. Silently dropped when nothing is
    /// open.
    pub async fn feed(&self, bytes: Vec<u8>) {
        let tx = self.shared.lock().unwrap().data_tx.clone();
        if let Some(tx) = tx {
            let _ = tx.send(bytes).await;
        }
    }

    /// Close the data stream for good; the reader observes end-of-data.
    pub fn close_stream(&self) {
        self.shared.lock().unwrap().data_tx = None;
    }
}
