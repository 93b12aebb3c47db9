//! Contactless/NFC transport driver.
//!
//! The platform contactless stack delivers asynchronous "tag read"
//! notifications with optional serial-number metadata and optional payload
//! records. This driver treats the stack as an injected [`NfcBackend`]: it
//! never implements the platform side itself, which also makes the whole
//! lifecycle testable against [`mock::MockNfc`](crate::mock::MockNfc).
//!
//! UID extraction prefers the tag metadata; when no serial number is
//! delivered (or it cannot be classified), the payload records fall back
//! through the frame codec, first parsable record wins.

#![allow(async_fn_in_trait)]

use crate::events::{ScanEvent, frame_to_event};
use crate::session::ScanSession;
use crate::traits::TransportDriver;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tapgate_codec::FrameCodec;
use tapgate_core::{
    ConnectionStatus, DeviceDescriptor, Result, TransportKind,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One asynchronous tag-read notification from the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagNotification {
    /// Serial-number bytes from the tag metadata, when the platform
    /// delivered them.
    pub serial_number: Option<Vec<u8>>,

    /// Decoded payload records, in delivery order.
    pub payloads: Vec<String>,
}

impl TagNotification {
    /// Notification carrying only a serial number.
    pub fn with_serial(serial: Vec<u8>) -> Self {
        Self {
            serial_number: Some(serial),
            payloads: Vec::new(),
        }
    }

    /// Notification carrying only payload records.
    pub fn with_payloads(payloads: Vec<String>) -> Self {
        Self {
            serial_number: None,
            payloads,
        }
    }
}

/// Injected platform contactless stack.
pub trait NfcBackend: Send + Sync + 'static {
    /// Notification listener produced by [`watch`](Self::watch).
    type Listener: NfcListener;

    /// Whether the platform NFC capability is present right now.
    async fn is_available(&self) -> bool;

    /// Register for tag notifications. May suspend while the platform
    /// asks the user to authorize the capability.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the capability is missing or the
    /// grant is refused.
    async fn watch(&mut self) -> Result<Self::Listener>;
}

/// Receiving half of a tag-notification registration.
///
/// Dropping the listener deregisters it from the platform, which is how
/// `stop_scan` interrupts a pending wait.
pub trait NfcListener: Send + 'static {
    /// Wait for the next tag notification.
    ///
    /// `Ok(None)` means the notification source closed for good; the read
    /// loop then ends and is reported as stopped, not crashed.
    ///
    /// # Errors
    ///
    /// A delivery error is reported through the error hook and the loop
    /// keeps listening.
    fn next_tag(
        &mut self,
    ) -> impl std::future::Future<Output = Result<Option<TagNotification>>> + Send;
}

/// Driver for the platform contactless channel.
pub struct NfcTransport<B: NfcBackend> {
    backend: B,
    descriptor: DeviceDescriptor,
    codec: FrameCodec,
    events: mpsc::Sender<ScanEvent>,
    session: Option<ScanSession>,
}

impl<B: NfcBackend> NfcTransport<B> {
    /// Create the driver with its event sender installed.
    pub fn new(backend: B, events: mpsc::Sender<ScanEvent>, codec: FrameCodec) -> Self {
        Self {
            backend,
            descriptor: DeviceDescriptor::new(
                TransportKind::Nfc,
                "nfc",
                "Platform NFC reader",
            ),
            codec,
            events,
            session: None,
        }
    }

    /// Decode one notification into a card event, metadata first.
    fn decode_tag(codec: &FrameCodec, tag: &TagNotification) -> Option<ScanEvent> {
        if let Some(serial) = &tag.serial_number {
            let uid: String = serial.iter().map(|b| format!("{:02X}", b)).collect();
            if let Some(frame) = codec.parse(&uid) {
                return Some(ScanEvent::CardDetected(frame_to_event(
                    frame,
                    TransportKind::Nfc,
                )));
            }
            debug!(transport = %TransportKind::Nfc, uid, "tag serial did not classify, trying payloads");
        }

        for payload in &tag.payloads {
            if let Some(frame) = codec.parse(payload) {
                return Some(ScanEvent::CardDetected(frame_to_event(
                    frame,
                    TransportKind::Nfc,
                )));
            }
        }
        None
    }

    async fn read_loop(
        mut listener: B::Listener,
        codec: FrameCodec,
        events: mpsc::Sender<ScanEvent>,
        scanning: Arc<AtomicBool>,
    ) {
        while scanning.load(Ordering::SeqCst) {
            match listener.next_tag().await {
                Ok(Some(tag)) => match Self::decode_tag(&codec, &tag) {
                    Some(event) => {
                        if events.send(event).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        debug!(transport = %TransportKind::Nfc, "unparsable tag notification dropped");
                    }
                },
                Ok(None) => {
                    info!(transport = %TransportKind::Nfc, "notification source closed");
                    break;
                }
                Err(e) => {
                    let report = ScanEvent::TransportError {
                        transport: TransportKind::Nfc,
                        message: e.to_string(),
                    };
                    if events.send(report).await.is_err() {
                        break;
                    }
                }
            }
        }
        scanning.store(false, Ordering::SeqCst);
        let _ = events
            .send(ScanEvent::ScanStopped {
                transport: TransportKind::Nfc,
            })
            .await;
    }
}

impl<B: NfcBackend> TransportDriver for NfcTransport<B> {
    fn kind(&self) -> TransportKind {
        TransportKind::Nfc
    }

    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn is_scanning(&self) -> bool {
        self.session.as_ref().is_some_and(ScanSession::is_active)
    }

    async fn check_availability(&mut self) -> bool {
        let available = self.backend.is_available().await;
        self.descriptor.set_status(if available {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        });
        debug!(transport = %TransportKind::Nfc, available, "availability probe");
        available
    }

    async fn start_scan(&mut self) -> Result<()> {
        if self.is_scanning() {
            debug!(transport = %TransportKind::Nfc, "start requested while scanning, ignoring");
            return Ok(());
        }

        let listener = match self.backend.watch().await {
            Ok(listener) => listener,
            Err(e) => {
                warn!(transport = %TransportKind::Nfc, error = %e, "failed to register tag listener");
                self.descriptor.set_status(ConnectionStatus::Error);
                return Err(e);
            }
        };

        self.descriptor.set_status(ConnectionStatus::Connected);
        let scanning = ScanSession::new_flag();
        let task = tokio::spawn(Self::read_loop(
            listener,
            self.codec.clone(),
            self.events.clone(),
            Arc::clone(&scanning),
        ));
        self.session = Some(ScanSession::new(task, scanning));
        info!(transport = %TransportKind::Nfc, "scan started");
        Ok(())
    }

    async fn stop_scan(&mut self) {
        if let Some(session) = self.session.take() {
            session.stop().await;
            info!(transport = %TransportKind::Nfc, "scan stopped");
        }
    }

    async fn check_health(&mut self) -> bool {
        self.check_availability().await
    }
}
