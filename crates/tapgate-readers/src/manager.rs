//! Unified scan coordinator.
//!
//! [`UnifiedManager`] owns the registry and the event channel: it starts
//! every available transport, settles all start attempts before judging
//! the outcome (one failing channel never cancels the others), and
//! multiplexes the drivers' events into one consumer stream. Degraded
//! operation is the normal case; only zero available or zero started
//! readers is an error.

use crate::config::AcquireConfig;
use crate::events::{ScanEvent, frame_to_event};
use crate::nfc::{NfcBackend, NfcTransport};
use crate::registry::ReaderRegistry;
use crate::serial::{SerialBackend, SerialTransport};
use crate::traits::TransportDriver;
use crate::usb::{UsbBackend, UsbTransport};
use tapgate_codec::FrameCodec;
use tapgate_core::{DriverStatus, HealthReport, TransportKind};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Coordinator-level failures. Per-transport errors stay on the event
/// stream; only whole-fleet conditions surface here.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AcquireError {
    /// No transport has a reachable device candidate.
    #[error("no available readers")]
    NoAvailableReaders,

    /// Every available transport failed to start.
    #[error("all readers failed to start")]
    AllReadersFailed,

    /// An injected payload matched none of the frame rules.
    #[error("payload not recognized as a card frame: {payload:?}")]
    Unparsable {
        /// The rejected payload.
        payload: String,
    },

    /// The consumer dropped the event stream.
    #[error("event stream closed by consumer")]
    StreamClosed,
}

/// What a start attempt actually achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Transports now scanning.
    pub started: Vec<TransportKind>,

    /// Transports that were available but failed to start, with the
    /// failure description. Each failure is also mirrored onto the event
    /// stream.
    pub failed: Vec<(TransportKind, String)>,
}

impl ScanOutcome {
    /// Whether scanning is running on fewer channels than were available.
    pub fn is_degraded(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Consumer half of the unified event stream.
pub struct EventStream {
    rx: mpsc::Receiver<ScanEvent>,
}

impl EventStream {
    /// Wait for the next event. `None` means every producer is gone (the
    /// manager was shut down).
    pub async fn recv(&mut self) -> Option<ScanEvent> {
        self.rx.recv().await
    }
}

/// Owner of all transport drivers and the unified event channel.
pub struct UnifiedManager<N: NfcBackend, U: UsbBackend, S: SerialBackend> {
    registry: ReaderRegistry<N, U, S>,
    events: mpsc::Sender<ScanEvent>,
    codec: FrameCodec,
}

impl<N: NfcBackend, U: UsbBackend, S: SerialBackend> UnifiedManager<N, U, S> {
    /// Build the manager from the three transport backends. The event
    /// channel is created here and its sender installed into every driver
    /// at construction, so no event can be produced before a consumer
    /// exists.
    pub fn new(nfc: N, usb: U, serial: S, config: AcquireConfig) -> (Self, EventStream) {
        Self::with_codec(nfc, usb, serial, config, FrameCodec::new())
    }

    /// Like [`new`](Self::new), with a custom frame codec (extra
    /// manufacturer prefixes, for instance) shared by every driver.
    pub fn with_codec(
        nfc: N,
        usb: U,
        serial: S,
        config: AcquireConfig,
        codec: FrameCodec,
    ) -> (Self, EventStream) {
        let (tx, rx) = mpsc::channel(config.event_channel_capacity.max(1));
        let registry = ReaderRegistry::new(
            NfcTransport::new(nfc, tx.clone(), codec.clone()),
            UsbTransport::new(usb, tx.clone(), codec.clone(), config.clone()),
            SerialTransport::new(serial, tx.clone(), codec.clone(), config),
        );
        (
            Self {
                registry,
                events: tx,
                codec,
            },
            EventStream { rx },
        )
    }

    /// Probe every transport and start all available ones.
    ///
    /// All start attempts settle before the outcome is judged. Individual
    /// failures are reported both in the returned [`ScanOutcome`] and as
    /// [`ScanEvent::TransportError`] on the stream, and do not prevent the
    /// other transports from scanning.
    ///
    /// # Errors
    ///
    /// [`AcquireError::NoAvailableReaders`] when no transport has a
    /// candidate; [`AcquireError::AllReadersFailed`] when every available
    /// transport failed to start.
    pub async fn start_scanning(&mut self) -> Result<ScanOutcome, AcquireError> {
        let available = self.registry.refresh().await;
        if available.is_empty() {
            warn!("no available readers");
            return Err(AcquireError::NoAvailableReaders);
        }

        let (nfc, usb, serial) = tokio::join!(
            start_if(&mut self.registry.nfc, available.contains(&TransportKind::Nfc)),
            start_if(&mut self.registry.usb, available.contains(&TransportKind::Usb)),
            start_if(
                &mut self.registry.serial,
                available.contains(&TransportKind::Serial)
            ),
        );

        let mut outcome = ScanOutcome {
            started: Vec::new(),
            failed: Vec::new(),
        };
        for attempt in [nfc, usb, serial].into_iter().flatten() {
            match attempt {
                (kind, Ok(())) => outcome.started.push(kind),
                (kind, Err(e)) => {
                    warn!(transport = %kind, error = %e, "reader failed to start");
                    let _ = self
                        .events
                        .send(ScanEvent::TransportError {
                            transport: kind,
                            message: e.to_string(),
                        })
                        .await;
                    outcome.failed.push((kind, e.to_string()));
                }
            }
        }

        if outcome.started.is_empty() {
            return Err(AcquireError::AllReadersFailed);
        }
        info!(started = ?outcome.started, failed = outcome.failed.len(), "scanning");
        Ok(outcome)
    }

    /// Stop every running scan session. Idempotent; transports that were
    /// never started are skipped.
    pub async fn stop_scanning(&mut self) {
        self.registry.nfc.stop_scan().await;
        self.registry.usb.stop_scan().await;
        self.registry.serial.stop_scan().await;
    }

    /// Push a payload through the frame codec and onto the event stream
    /// as if the given transport had produced it. Test and demo hook; the
    /// event is indistinguishable from a hardware read.
    ///
    /// # Errors
    ///
    /// [`AcquireError::Unparsable`] when the payload matches no frame
    /// rule; [`AcquireError::StreamClosed`] when the consumer is gone.
    pub async fn inject_card(
        &self,
        payload: &str,
        transport: TransportKind,
    ) -> Result<(), AcquireError> {
        let frame = self
            .codec
            .parse(payload)
            .ok_or_else(|| AcquireError::Unparsable {
                payload: payload.to_string(),
            })?;
        self.events
            .send(ScanEvent::CardDetected(frame_to_event(frame, transport)))
            .await
            .map_err(|_| AcquireError::StreamClosed)
    }

    /// Probe every transport and return the currently reachable kinds.
    pub async fn refresh(&mut self) -> Vec<TransportKind> {
        self.registry.refresh().await
    }

    /// Diagnostics snapshot of every driver.
    pub fn status(&self) -> Vec<DriverStatus> {
        self.registry.all_drivers_status()
    }

    /// Live health check across all transports.
    pub async fn check_health(&mut self) -> HealthReport {
        self.registry.check_health().await
    }

    /// Stop all sessions and close the event stream. After the in-flight
    /// events drain, the consumer's `recv` returns `None`.
    pub async fn shutdown(mut self) {
        self.stop_scanning().await;
        info!("manager shut down");
        // Dropping self drops the last sender.
    }
}

/// Start one driver when its transport is available. `None` means the
/// transport was skipped, not that it failed.
async fn start_if<D: TransportDriver>(
    driver: &mut D,
    enabled: bool,
) -> Option<(TransportKind, tapgate_core::Result<()>)> {
    if !enabled {
        return None;
    }
    let kind = driver.kind();
    Some((kind, driver.start_scan().await))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockNfc, MockSerial, MockUsb};
    use tapgate_core::TransportError;

    fn manager() -> (
        UnifiedManager<MockNfc, MockUsb, MockSerial>,
        crate::mock::MockNfcHandle,
        crate::mock::MockUsbHandle,
        crate::mock::MockSerialHandle,
        EventStream,
    ) {
        let (nfc, nfc_handle) = MockNfc::new();
        let (usb, usb_handle) = MockUsb::new();
        let (serial, serial_handle) = MockSerial::new();
        let (manager, stream) =
            UnifiedManager::new(nfc, usb, serial, AcquireConfig::default());
        (manager, nfc_handle, usb_handle, serial_handle, stream)
    }

    #[tokio::test]
    async fn test_no_available_readers() {
        let (mut manager, _nfc, _usb, _serial, _stream) = manager();
        let result = manager.start_scanning().await;
        assert!(matches!(result, Err(AcquireError::NoAvailableReaders)));
    }

    #[tokio::test]
    async fn test_all_readers_failed() {
        let (mut manager, nfc, _usb, _serial, _stream) = manager();
        nfc.set_available(true);
        nfc.fail_next_watch(TransportError::permission_denied("grant refused"));

        let result = manager.start_scanning().await;
        assert!(matches!(result, Err(AcquireError::AllReadersFailed)));
    }

    #[tokio::test]
    async fn test_inject_unparsable_payload() {
        let (manager, _nfc, _usb, _serial, _stream) = manager();
        let result = manager.inject_card("hello world", TransportKind::Nfc).await;
        assert!(matches!(result, Err(AcquireError::Unparsable { .. })));
    }

    #[tokio::test]
    async fn test_inject_reaches_stream_with_provenance() {
        let (manager, _nfc, _usb, _serial, mut stream) = manager();
        manager
            .inject_card("04A1B2C3", TransportKind::Serial)
            .await
            .unwrap();

        match stream.recv().await.unwrap() {
            ScanEvent::CardDetected(card) => {
                assert_eq!(card.uid, "04A1B2C3");
                assert_eq!(card.transport, TransportKind::Serial);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_inject_after_stream_dropped() {
        let (manager, _nfc, _usb, _serial, stream) = manager();
        drop(stream);
        let result = manager.inject_card("04A1B2C3", TransportKind::Usb).await;
        assert!(matches!(result, Err(AcquireError::StreamClosed)));
    }

    #[tokio::test]
    async fn test_stop_before_start_is_noop() {
        let (mut manager, _nfc, _usb, _serial, _stream) = manager();
        manager.stop_scanning().await;
        assert!(manager.status().iter().all(|s| !s.scanning));
    }

    #[tokio::test]
    async fn test_shutdown_closes_stream() {
        let (mut manager, nfc, _usb, _serial, mut stream) = manager();
        nfc.set_available(true);
        manager.start_scanning().await.unwrap();
        manager.shutdown().await;

        // Drain whatever the stopping sessions emitted; the stream must
        // then terminate.
        while let Some(event) = stream.recv().await {
            assert!(!matches!(event, ScanEvent::CardDetected(_)));
        }
    }
}
