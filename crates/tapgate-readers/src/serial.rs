//! Serial transport driver.
//!
//! Serial readers are the simplest channel: open a port at a configured
//! baud rate and pull whatever the firmware streams out. The driver layer
//! adds what the raw port lacks: usability filtering during enumeration
//! (a port must be both readable and writable to count), a bounded
//! open-retry loop with linear backoff for ports still settling after
//! hot-plug, and end-of-data detection so an unplugged adapter ends the
//! session cleanly instead of crashing it.
//!
//! Port enumeration and I/O are an injected [`SerialBackend`]; the
//! `hardware-serial` feature provides the `serialport` implementation.

#![allow(async_fn_in_trait)]

use crate::AcquireConfig;
use crate::events::{ScanEvent, frame_to_event};
use crate::session::ScanSession;
use crate::traits::TransportDriver;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tapgate_codec::FrameCodec;
use tapgate_core::{
    ConnectionStatus, DeviceDescriptor, Result, TransportError, TransportKind,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One enumerable serial port candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialCandidate {
    /// System port name (`/dev/ttyUSB0`, `COM3`).
    pub port_name: String,

    /// Whether the port advertises read access.
    pub readable: bool,

    /// Whether the port advertises write access.
    pub writable: bool,
}

impl SerialCandidate {
    /// A port counts as a reader candidate only when it is usable in both
    /// directions.
    pub fn is_usable(&self) -> bool {
        self.readable && self.writable
    }
}

/// Injected serial port enumeration and open service.
pub trait SerialBackend: Send + Sync + 'static {
    /// Open connection type.
    type Connection: SerialConnection;

    /// Enumerate currently present ports.
    ///
    /// # Errors
    ///
    /// Enumeration failures bubble up; availability probes downgrade them
    /// to "disconnected" rather than escalating.
    async fn enumerate(&self) -> Result<Vec<SerialCandidate>>;

    /// Open a port at the given baud rate.
    ///
    /// # Errors
    ///
    /// Returns the [`TransportError`] taxonomy kind matching the OS
    /// refusal. [`TransportError::DeviceBusy`] is the only retryable kind.
    async fn open(&mut self, port_name: &str, baud: u32) -> Result<Self::Connection>;
}

/// An open serial port owned exclusively by the read loop.
pub trait SerialConnection: Send + 'static {
    /// Pull the next chunk of streamed bytes.
    ///
    /// `Ok(None)` signals end-of-data: the adapter was unplugged or the
    /// stream closed, and the session ends cleanly.
    ///
    /// # Errors
    ///
    /// A mid-session read error is reported through the event stream and
    /// the loop keeps pulling.
    fn read_chunk(
        &mut self,
    ) -> impl std::future::Future<Output = Result<Option<Vec<u8>>>> + Send;
}

/// Driver for the serial channel.
pub struct SerialTransport<B: SerialBackend> {
    backend: B,
    descriptor: DeviceDescriptor,
    codec: FrameCodec,
    config: AcquireConfig,
    events: mpsc::Sender<ScanEvent>,
    session: Option<ScanSession>,
    /// Port name from a previous successful open, preferred on restart.
    associated: Option<String>,
}

impl<B: SerialBackend> SerialTransport<B> {
    /// Create the driver with its event sender installed.
    pub fn new(
        backend: B,
        events: mpsc::Sender<ScanEvent>,
        codec: FrameCodec,
        config: AcquireConfig,
    ) -> Self {
        Self {
            backend,
            descriptor: DeviceDescriptor::new(TransportKind::Serial, "serial", "Serial card reader"),
            codec,
            config,
            events,
            session: None,
            associated: None,
        }
    }

    fn select_port<'a>(&self, candidates: &'a [SerialCandidate]) -> Option<&'a SerialCandidate> {
        if let Some(associated) = &self.associated
            && let Some(known) = candidates
                .iter()
                .find(|c| &c.port_name == associated && c.is_usable())
        {
            debug!(transport = %TransportKind::Serial, port = %known.port_name, "reusing previously associated port");
            return Some(known);
        }
        candidates.iter().find(|c| c.is_usable())
    }

    /// Open with bounded retries. Only [`TransportError::DeviceBusy`] is
    /// retried; the backoff grows linearly per attempt so a port still
    /// settling after hot-plug gets time without stalling startup forever.
    async fn open_with_retry(&mut self, port_name: &str) -> Result<B::Connection> {
        let attempts = self.config.serial_open_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.backend.open(port_name, self.config.serial_baud).await {
                Ok(conn) => return Ok(conn),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let backoff = self.config.serial_backoff(attempt);
                    warn!(
                        transport = %TransportKind::Serial,
                        port = port_name,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "open busy, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn read_loop(
        mut conn: B::Connection,
        codec: FrameCodec,
        events: mpsc::Sender<ScanEvent>,
        scanning: Arc<AtomicBool>,
    ) {
        while scanning.load(Ordering::SeqCst) {
            match conn.read_chunk().await {
                Ok(Some(bytes)) => {
                    let text = String::from_utf8_lossy(&bytes);
                    match codec.parse(&text) {
                        Some(frame) => {
                            let event = ScanEvent::CardDetected(frame_to_event(
                                frame,
                                TransportKind::Serial,
                            ));
                            if events.send(event).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            debug!(transport = %TransportKind::Serial, "unparsable chunk dropped");
                        }
                    }
                }
                Ok(None) => {
                    info!(transport = %TransportKind::Serial, "end of data, ending session");
                    break;
                }
                Err(e) => {
                    let report = ScanEvent::TransportError {
                        transport: TransportKind::Serial,
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
                transport: TransportKind::Serial,
            })
            .await;
    }
}

impl<B: SerialBackend> TransportDriver for SerialTransport<B> {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn is_scanning(&self) -> bool {
        self.session.as_ref().is_some_and(ScanSession::is_active)
    }

    async fn check_availability(&mut self) -> bool {
        let available = match self.backend.enumerate().await {
            Ok(candidates) => candidates.iter().any(SerialCandidate::is_usable),
            Err(e) => {
                debug!(transport = %TransportKind::Serial, error = %e, "enumeration failed, treating as disconnected");
                false
            }
        };
        self.descriptor.set_status(if available {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        });
        available
    }

    async fn start_scan(&mut self) -> Result<()> {
        if self.is_scanning() {
            debug!(transport = %TransportKind::Serial, "start requested while scanning, ignoring");
            return Ok(());
        }

        let candidates = self.backend.enumerate().await?;
        let Some(candidate) = self.select_port(&candidates).cloned() else {
            self.descriptor.set_status(ConnectionStatus::Error);
            return Err(TransportError::device_not_found("no usable serial port"));
        };

        let conn = match self.open_with_retry(&candidate.port_name).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(transport = %TransportKind::Serial, port = %candidate.port_name, error = %e, "open failed");
                self.descriptor.set_status(ConnectionStatus::Error);
                return Err(e);
            }
        };

        self.descriptor = {
            let mut desc = DeviceDescriptor::new(
                TransportKind::Serial,
                &candidate.port_name,
                "Serial card reader",
            )
            .with_port_name(&candidate.port_name);
            desc.set_status(ConnectionStatus::Connected);
            desc
        };
        self.associated = Some(candidate.port_name.clone());

        let scanning = ScanSession::new_flag();
        let task = tokio::spawn(Self::read_loop(
            conn,
            self.codec.clone(),
            self.events.clone(),
            Arc::clone(&scanning),
        ));
        self.session = Some(ScanSession::new(task, scanning));
        info!(transport = %TransportKind::Serial, port = %candidate.port_name, "scan started");
        Ok(())
    }

    async fn stop_scan(&mut self) {
        if let Some(session) = self.session.take() {
            session.stop().await;
            info!(transport = %TransportKind::Serial, "scan stopped");
        }
    }

    /// Re-verify that the associated port is still present and usable, not
    /// merely that some port exists.
    async fn check_health(&mut self) -> bool {
        match &self.associated {
            Some(port) => {
                let healthy = match self.backend.enumerate().await {
                    Ok(candidates) => candidates
                        .iter()
                        .any(|c| &c.port_name == port && c.is_usable()),
                    Err(_) => false,
                };
                self.descriptor.set_status(if healthy {
                    ConnectionStatus::Connected
                } else {
                    ConnectionStatus::Error
                });
                healthy
            }
            None => self.check_availability().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSerial;
    use tokio::time::{Duration, timeout};

    fn fast_config() -> AcquireConfig {
        AcquireConfig {
            serial_open_attempts: 3,
            serial_backoff_step_ms: 5,
            ..AcquireConfig::default()
        }
    }

    fn driver(
        config: AcquireConfig,
    ) -> (SerialTransport<MockSerial>, crate::mock::MockSerialHandle, mpsc::Receiver<ScanEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let (backend, handle) = MockSerial::new();
        (
            SerialTransport::new(backend, tx, FrameCodec::new(), config),
            handle,
            rx,
        )
    }

    #[tokio::test]
    async fn test_read_only_port_is_not_usable() {
        let (mut serial, handle, _rx) = driver(fast_config());
        handle.add_port("/dev/ttyUSB0", true, false);
        assert!(!serial.check_availability().await);

        handle.add_port("/dev/ttyUSB1", true, true);
        assert!(serial.check_availability().await);
    }

    #[tokio::test]
    async fn test_stream_feeds_codec() {
        let (mut serial, handle, mut rx) = driver(fast_config());
        handle.add_port("/dev/ttyUSB0", true, true);

        serial.start_scan().await.unwrap();
        handle.feed(b"1234ABCD5678EF\r\n".to_vec()).await;

        let event = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        match event {
            ScanEvent::CardDetected(card) => {
                assert_eq!(card.uid, "1234ABCD5678EF");
                assert_eq!(card.transport, TransportKind::Serial);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        serial.stop_scan().await;
    }

    #[tokio::test]
    async fn test_busy_port_retried_with_backoff() {
        let (mut serial, handle, _rx) = driver(fast_config());
        handle.add_port("/dev/ttyACM0", true, true);
        handle.script_open_error(TransportError::device_busy("still settling"));
        handle.script_open_error(TransportError::device_busy("still settling"));

        serial.start_scan().await.unwrap();
        assert!(serial.is_scanning());
        assert_eq!(handle.open_attempts(), 3);
        serial.stop_scan().await;
    }

    #[tokio::test]
    async fn test_busy_exhausts_attempts() {
        let (mut serial, handle, _rx) = driver(fast_config());
        handle.add_port("/dev/ttyACM0", true, true);
        for _ in 0..3 {
            handle.script_open_error(TransportError::device_busy("still settling"));
        }

        let result = serial.start_scan().await;
        assert!(matches!(result, Err(TransportError::DeviceBusy { .. })));
        assert_eq!(handle.open_attempts(), 3);
        assert!(!serial.is_scanning());
    }

    #[tokio::test]
    async fn test_permission_denied_is_not_retried() {
        let (mut serial, handle, _rx) = driver(fast_config());
        handle.add_port("/dev/ttyS0", true, true);
        handle.script_open_error(TransportError::permission_denied("not in dialout group"));

        let result = serial.start_scan().await;
        assert!(matches!(result, Err(TransportError::PermissionDenied { .. })));
        assert_eq!(handle.open_attempts(), 1);
    }

    #[tokio::test]
    async fn test_end_of_data_reports_stopped() {
        let (mut serial, handle, mut rx) = driver(fast_config());
        handle.add_port("/dev/ttyUSB0", true, true);

        serial.start_scan().await.unwrap();
        handle.close_stream();

        let event = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(
            event,
            ScanEvent::ScanStopped {
                transport: TransportKind::Serial
            }
        );
        assert!(!serial.is_scanning());
    }

    #[tokio::test]
    async fn test_health_tracks_associated_port() {
        let (mut serial, handle, _rx) = driver(fast_config());
        handle.add_port("/dev/ttyUSB0", true, true);

        serial.start_scan().await.unwrap();
        assert!(serial.check_health().await);

        handle.remove_port("/dev/ttyUSB0");
        handle.add_port("/dev/ttyUSB1", true, true);
        // Some port exists, but not the one this session is bound to.
        assert!(!serial.check_health().await);
        serial.stop_scan().await;
    }

    #[tokio::test]
    async fn test_no_usable_port_fails_start() {
        let (mut serial, handle, _rx) = driver(fast_config());
        handle.add_port("/dev/ttyS9", false, true);

        let result = serial.start_scan().await;
        assert!(matches!(result, Err(TransportError::DeviceNotFound { .. })));
    }
}
