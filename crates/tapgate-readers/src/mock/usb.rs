//! Scriptable USB backend.

use crate::usb::{UsbBackend, UsbCandidate, UsbConnection};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tapgate_core::{Result, TransportError};

enum BulkItem {
    Frame(Vec<u8>),
    Error(TransportError),
}

struct MockUsbState {
    devices: Vec<UsbCandidate>,
    enumerate_fails: bool,
    fail_open: Option<TransportError>,
    interfaces: Vec<u8>,
    refused: HashSet<u8>,
    bulk: VecDeque<BulkItem>,
    disconnected: bool,
}

impl Default for MockUsbState {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            enumerate_fails: false,
            fail_open: None,
            interfaces: vec![0],
            refused: HashSet::new(),
            bulk: VecDeque::new(),
            disconnected: false,
        }
    }
}

/// Mock USB enumeration and device service.
pub struct MockUsb {
    shared: Arc<Mutex<MockUsbState>>,
}

/// Test-side control handle for [`MockUsb`].
#[derive(Clone)]
pub struct MockUsbHandle {
    shared: Arc<Mutex<MockUsbState>>,
}

impl MockUsb {
    /// Create a backend plus its control handle. No devices are attached
    /// initially.
    pub fn new() -> (Self, MockUsbHandle) {
        let shared = Arc::new(Mutex::new(MockUsbState::default()));
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MockUsbHandle { shared },
        )
    }
}

impl UsbBackend for MockUsb {
    type Connection = MockUsbConnection;

    async fn enumerate(&self) -> Result<Vec<UsbCandidate>> {
        let state = self.shared.lock().unwrap();
        if state.enumerate_fails {
            return Err(TransportError::transport_io("enumeration unavailable"));
        }
        Ok(state.devices.clone())
    }

    async fn open(&mut self, id: &str) -> Result<Self::Connection> {
        let mut state = self.shared.lock().unwrap();
        if let Some(err) = state.fail_open.take() {
            return Err(err);
        }
        if !state.devices.iter().any(|d| d.id == id) {
            return Err(TransportError::device_not_found(format!(
                "no such device: {id}"
            )));
        }
        Ok(MockUsbConnection {
            shared: Arc::clone(&self.shared),
        })
    }
}

/// Open device produced by [`MockUsb::open`]. Shares scripted state with
/// the handle so frames and failures queued after open still apply.
pub struct MockUsbConnection {
    shared: Arc<Mutex<MockUsbState>>,
}

impl UsbConnection for MockUsbConnection {
    fn interfaces(&self) -> Vec<u8> {
        self.shared.lock().unwrap().interfaces.clone()
    }

    async fn claim_interface(&mut self, interface: u8) -> Result<()> {
        let state = self.shared.lock().unwrap();
        if state.refused.contains(&interface) {
            return Err(TransportError::interface_unavailable(format!(
                "interface {interface} refused"
            )));
        }
        Ok(())
    }

    async fn read_bulk(&mut self, _endpoint: u8) -> Result<Option<Vec<u8>>> {
        let mut state = self.shared.lock().unwrap();
        if state.disconnected {
            return Err(TransportError::device_not_found("device unplugged"));
        }
        match state.bulk.pop_front() {
            Some(BulkItem::Frame(bytes)) => Ok(Some(bytes)),
            Some(BulkItem::Error(err)) => Err(err),
            None => Ok(None),
        }
    }
}

impl MockUsbHandle {
    /// Attach a device candidate.
    pub fn add_device(&self, candidate: UsbCandidate) {
        self.shared.lock().unwrap().devices.push(candidate);
    }

    /// Make enumeration fail (or recover).
    pub fn fail_enumeration(&self, fails: bool) {
        self.shared.lock().unwrap().enumerate_fails = fails;
    }

    /// Make the next `open` call fail with the given error.
    pub fn fail_next_open(&self, err: TransportError) {
        self.shared.lock().unwrap().fail_open = Some(err);
    }

    /// Replace the interface list the open device advertises.
    pub fn set_interfaces(&self, interfaces: Vec<u8>) {
        self.shared.lock().unwrap().interfaces = interfaces;
    }

    /// Refuse claims on one interface.
    pub fn refuse_interface(&self, interface: u8) {
        self.shared.lock().unwrap().refused.insert(interface);
    }

    /// Queue frame bytes; delivered on the next bulk poll of any endpoint.
    pub fn queue_frame(&self, bytes: Vec<u8>) {
        self.shared
            .lock()
            .unwrap()
            .bulk
            .push_back(BulkItem::Frame(bytes));
    }

    /// Queue a one-shot read error ahead of any later frames.
    pub fn queue_read_error(&self, err: TransportError) {
        self.shared
            .lock()
            .unwrap()
            .bulk
            .push_back(BulkItem::Error(err));
    }

    /// Simulate an unplug: every further bulk poll fails definitively.
    pub fn disconnect(&self) {
        self.shared.lock().unwrap().disconnected = true;
    }
}
