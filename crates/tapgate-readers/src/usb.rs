//! Generic USB transport driver.
//!
//! Vendor card readers rarely present a standard protocol over USB, so
//! this driver is deliberately speculative: it prefers devices whose
//! name carries a known reader keyword, falls back to the first
//! enumerable device when nothing matches (logged as a guess, never an
//! error), claims whatever interface the OS will hand over, and polls a
//! configurable set of bulk endpoints round-robin, feeding whatever bytes
//! arrive through the frame codec. A poll that yields no data is silence,
//! not an error.
//!
//! OS enumeration and authorization are an injected [`UsbBackend`]; the
//! `hardware-usb` feature provides the `rusb` implementation.

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

/// One enumerable USB device candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbCandidate {
    /// Stable identifier (bus/address path).
    pub id: String,

    /// Human-readable device name, best-effort.
    pub name: String,

    /// Vendor identifier, when readable.
    pub vendor_id: Option<u16>,

    /// Product identifier, when readable.
    pub product_id: Option<u16>,
}

/// Injected OS device-enumeration and authorization service for USB.
pub trait UsbBackend: Send + Sync + 'static {
    /// Open connection type.
    type Connection: UsbConnection;

    /// Enumerate currently attached devices.
    ///
    /// # Errors
    ///
    /// Enumeration failures bubble up; availability probes downgrade them
    /// to "disconnected" rather than escalating.
    async fn enumerate(&self) -> Result<Vec<UsbCandidate>>;

    /// Open a device by candidate id. May suspend on a user/OS-mediated
    /// authorization step.
    ///
    /// # Errors
    ///
    /// Returns the [`TransportError`] taxonomy kind matching the OS
    /// refusal (not found, permission denied, busy, invalid state).
    async fn open(&mut self, id: &str) -> Result<Self::Connection>;
}

/// An open USB device owned exclusively by the read loop.
pub trait UsbConnection: Send + 'static {
    /// Interface numbers offered by the active configuration.
    fn interfaces(&self) -> Vec<u8>;

    /// Claim an interface.
    ///
    /// # Errors
    ///
    /// Refused claims (protected or reserved interfaces) surface as
    /// [`TransportError::InterfaceUnavailable`]; the caller falls back to
    /// the next interface, or to no claim at all.
    async fn claim_interface(&mut self, interface: u8) -> Result<()>;

    /// Attempt a bulk read on one endpoint.
    ///
    /// `Ok(None)` is silence within the poll window. A
    /// [`TransportError::DeviceNotFound`] error signals definitive closure
    /// (device unplugged); any other error is a mid-session I/O failure
    /// that the loop reports and survives.
    fn read_bulk(
        &mut self,
        endpoint: u8,
    ) -> impl std::future::Future<Output = Result<Option<Vec<u8>>>> + Send;
}

/// Driver for the generic USB channel.
pub struct UsbTransport<B: UsbBackend> {
    backend: B,
    descriptor: DeviceDescriptor,
    codec: FrameCodec,
    config: AcquireConfig,
    events: mpsc::Sender<ScanEvent>,
    session: Option<ScanSession>,
    /// Device id from a previous successful open, preferred on restart.
    associated: Option<String>,
}

impl<B: UsbBackend> UsbTransport<B> {
    /// Create the driver with its event sender installed.
    pub fn new(
        backend: B,
        events: mpsc::Sender<ScanEvent>,
        codec: FrameCodec,
        config: AcquireConfig,
    ) -> Self {
        Self {
            backend,
            descriptor: DeviceDescriptor::new(TransportKind::Usb, "usb", "USB card reader"),
            codec,
            config,
            events,
            session: None,
            associated: None,
        }
    }

    /// Pick the candidate to open: previously associated device first,
    /// then keyword match, then a logged speculative fallback to the
    /// first enumerable device.
    fn select_candidate<'a>(&self, candidates: &'a [UsbCandidate]) -> Option<&'a UsbCandidate> {
        if let Some(associated) = &self.associated
            && let Some(known) = candidates.iter().find(|c| &c.id == associated)
        {
            debug!(transport = %TransportKind::Usb, id = %known.id, "reusing previously associated device");
            return Some(known);
        }

        let matched = candidates.iter().find(|c| {
            let name = c.name.to_lowercase();
            self.config.usb_keywords.iter().any(|k| name.contains(k))
        });
        if let Some(candidate) = matched {
            info!(transport = %TransportKind::Usb, name = %candidate.name, "keyword match");
            return Some(candidate);
        }

        // Not an error: proceed speculatively, but keep the guess
        // distinguishable from a confident match in the diagnostics log.
        let first = candidates.first()?;
        warn!(
            transport = %TransportKind::Usb,
            name = %first.name,
            "no reader keyword matched; falling back speculatively to first device"
        );
        Some(first)
    }

    /// Claim an interface, iterating past refused ones. Returns the
    /// claimed interface number, or `None` when scanning must proceed
    /// without a claim and rely purely on bulk transfer attempts.
    async fn claim_any_interface(conn: &mut B::Connection) -> Option<u8> {
        for interface in conn.interfaces() {
            match conn.claim_interface(interface).await {
                Ok(()) => {
                    debug!(transport = %TransportKind::Usb, interface, "interface claimed");
                    return Some(interface);
                }
                Err(e) => {
                    debug!(
                        transport = %TransportKind::Usb,
                        interface,
                        error = %e,
                        "interface refused, trying next"
                    );
                }
            }
        }
        warn!(
            transport = %TransportKind::Usb,
            "no claimable interface; continuing with bulk transfers only"
        );
        None
    }

    async fn read_loop(
        mut conn: B::Connection,
        codec: FrameCodec,
        config: AcquireConfig,
        events: mpsc::Sender<ScanEvent>,
        scanning: Arc<AtomicBool>,
    ) {
        let endpoints = if config.usb_endpoints.is_empty() {
            vec![1]
        } else {
            config.usb_endpoints.clone()
        };
        let mut cursor = 0usize;
        let mut ticker = tokio::time::interval(config.usb_poll_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        // Cancellation is checked every cycle; the sleep between polls is
        // bounded by the configured interval.
        while scanning.load(Ordering::SeqCst) {
            ticker.tick().await;
            let endpoint = endpoints[cursor % endpoints.len()];
            cursor = cursor.wrapping_add(1);

            match conn.read_bulk(endpoint).await {
                Ok(Some(bytes)) => {
                    let text = String::from_utf8_lossy(&bytes);
                    match codec.parse(&text) {
                        Some(frame) => {
                            let event =
                                ScanEvent::CardDetected(frame_to_event(frame, TransportKind::Usb));
                            if events.send(event).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            debug!(transport = %TransportKind::Usb, endpoint, "unparsable frame dropped");
                        }
                    }
                }
                Ok(None) => {} // silence, keep polling
                Err(TransportError::DeviceNotFound { detail }) => {
                    info!(transport = %TransportKind::Usb, detail, "device gone, ending session");
                    break;
                }
                Err(e) => {
                    let report = ScanEvent::TransportError {
                        transport: TransportKind::Usb,
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
                transport: TransportKind::Usb,
            })
            .await;
    }
}

impl<B: UsbBackend> TransportDriver for UsbTransport<B> {
    fn kind(&self) -> TransportKind {
        TransportKind::Usb
    }

    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn is_scanning(&self) -> bool {
        self.session.as_ref().is_some_and(ScanSession::is_active)
    }

    async fn check_availability(&mut self) -> bool {
        let available = match self.backend.enumerate().await {
            Ok(candidates) => !candidates.is_empty(),
            Err(e) => {
                debug!(transport = %TransportKind::Usb, error = %e, "enumeration failed, treating as disconnected");
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
            debug!(transport = %TransportKind::Usb, "start requested while scanning, ignoring");
            return Ok(());
        }

        let candidates = self.backend.enumerate().await?;
        let Some(candidate) = self.select_candidate(&candidates).cloned() else {
            self.descriptor.set_status(ConnectionStatus::Error);
            return Err(TransportError::device_not_found(
                "no enumerable USB device",
            ));
        };

        let mut conn = match self.backend.open(&candidate.id).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(transport = %TransportKind::Usb, id = %candidate.id, error = %e, "open failed");
                self.descriptor.set_status(ConnectionStatus::Error);
                return Err(e);
            }
        };

        self.descriptor = {
            let mut desc =
                DeviceDescriptor::new(TransportKind::Usb, &candidate.id, &candidate.name);
            if let (Some(vid), Some(pid)) = (candidate.vendor_id, candidate.product_id) {
                desc = desc.with_usb_ids(vid, pid);
            }
            desc.set_status(ConnectionStatus::Connected);
            desc
        };
        self.associated = Some(candidate.id.clone());

        // InterfaceUnavailable downgrades: scanning proceeds unclaimed.
        let _claimed = Self::claim_any_interface(&mut conn).await;

        let scanning = ScanSession::new_flag();
        let task = tokio::spawn(Self::read_loop(
            conn,
            self.codec.clone(),
            self.config.clone(),
            self.events.clone(),
            Arc::clone(&scanning),
        ));
        self.session = Some(ScanSession::new(task, scanning));
        info!(transport = %TransportKind::Usb, id = %candidate.id, "scan started");
        Ok(())
    }

    async fn stop_scan(&mut self) {
        if let Some(session) = self.session.take() {
            session.stop().await;
            info!(transport = %TransportKind::Usb, "scan stopped");
        }
    }

    async fn check_health(&mut self) -> bool {
        self.check_availability().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockUsb;
    use tokio::time::{Duration, timeout};

    fn fast_config() -> AcquireConfig {
        AcquireConfig {
            usb_poll_interval_ms: 5,
            ..AcquireConfig::default()
        }
    }

    fn driver(
        config: AcquireConfig,
    ) -> (UsbTransport<MockUsb>, crate::mock::MockUsbHandle, mpsc::Receiver<ScanEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let (backend, handle) = MockUsb::new();
        (
            UsbTransport::new(backend, tx, FrameCodec::new(), config),
            handle,
            rx,
        )
    }

    #[tokio::test]
    async fn test_unavailable_when_nothing_enumerable() {
        let (mut usb, _handle, _rx) = driver(fast_config());
        assert!(!usb.check_availability().await);
        assert!(!usb.descriptor().is_connected());
    }

    #[tokio::test]
    async fn test_enumeration_failure_downgrades_to_disconnected() {
        let (mut usb, handle, _rx) = driver(fast_config());
        handle.fail_enumeration(true);
        assert!(!usb.check_availability().await);
    }

    #[tokio::test]
    async fn test_keyword_match_preferred_over_first_device() {
        let (mut usb, handle, _rx) = driver(fast_config());
        handle.add_device(UsbCandidate {
            id: "1-1".to_string(),
            name: "Generic Hub".to_string(),
            vendor_id: Some(0x1d6b),
            product_id: Some(0x0002),
        });
        handle.add_device(UsbCandidate {
            id: "1-2".to_string(),
            name: "ACR122U PICC Interface".to_string(),
            vendor_id: Some(0x072f),
            product_id: Some(0x2200),
        });

        usb.start_scan().await.unwrap();
        assert_eq!(usb.descriptor().id, "1-2");
        assert_eq!(usb.descriptor().vendor_id, Some(0x072f));
        usb.stop_scan().await;
    }

    #[tokio::test]
    async fn test_speculative_fallback_to_first_device() {
        let (mut usb, handle, _rx) = driver(fast_config());
        handle.add_device(UsbCandidate {
            id: "2-1".to_string(),
            name: "Unknown Widget".to_string(),
            vendor_id: None,
            product_id: None,
        });

        usb.start_scan().await.unwrap();
        assert_eq!(usb.descriptor().id, "2-1");
        usb.stop_scan().await;
    }

    #[tokio::test]
    async fn test_associated_device_reused_on_restart() {
        let (mut usb, handle, _rx) = driver(fast_config());
        handle.add_device(UsbCandidate {
            id: "3-1".to_string(),
            name: "pn532 board".to_string(),
            vendor_id: None,
            product_id: None,
        });

        usb.start_scan().await.unwrap();
        usb.stop_scan().await;

        // A better keyword match appearing later must not steal the slot.
        handle.add_device(UsbCandidate {
            id: "3-2".to_string(),
            name: "ACR122U".to_string(),
            vendor_id: None,
            product_id: None,
        });
        usb.start_scan().await.unwrap();
        assert_eq!(usb.descriptor().id, "3-1");
        usb.stop_scan().await;
    }

    #[tokio::test]
    async fn test_refused_interfaces_fall_back_and_still_scan() {
        let (mut usb, handle, mut rx) = driver(fast_config());
        handle.add_device(UsbCandidate {
            id: "4-1".to_string(),
            name: "contactless reader".to_string(),
            vendor_id: None,
            product_id: None,
        });
        handle.set_interfaces(vec![0, 1]);
        handle.refuse_interface(0);
        handle.refuse_interface(1);

        usb.start_scan().await.unwrap();
        handle.queue_frame(b"04A1B2C3".to_vec());

        let event = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        match event {
            ScanEvent::CardDetected(card) => {
                assert_eq!(card.uid, "04A1B2C3");
                assert_eq!(card.transport, TransportKind::Usb);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        usb.stop_scan().await;
    }

    #[tokio::test]
    async fn test_silent_polls_are_not_errors() {
        let (mut usb, handle, mut rx) = driver(fast_config());
        handle.add_device(UsbCandidate {
            id: "5-1".to_string(),
            name: "rfid reader".to_string(),
            vendor_id: None,
            product_id: None,
        });

        usb.start_scan().await.unwrap();
        let silent = timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(silent.is_err());
        usb.stop_scan().await;
    }

    #[tokio::test]
    async fn test_io_error_reported_and_loop_survives() {
        let (mut usb, handle, mut rx) = driver(fast_config());
        handle.add_device(UsbCandidate {
            id: "6-1".to_string(),
            name: "smart card reader".to_string(),
            vendor_id: None,
            product_id: None,
        });

        usb.start_scan().await.unwrap();
        handle.queue_read_error(TransportError::transport_io("bulk stall"));
        handle.queue_frame(b"04A1B2C3".to_vec());

        let first = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert!(matches!(
            first,
            ScanEvent::TransportError {
                transport: TransportKind::Usb,
                ..
            }
        ));

        let second = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert!(matches!(second, ScanEvent::CardDetected(_)));
        usb.stop_scan().await;
    }

    #[tokio::test]
    async fn test_unplug_ends_session_as_stopped() {
        let (mut usb, handle, mut rx) = driver(fast_config());
        handle.add_device(UsbCandidate {
            id: "7-1".to_string(),
            name: "mifare reader".to_string(),
            vendor_id: None,
            product_id: None,
        });

        usb.start_scan().await.unwrap();
        handle.disconnect();

        let event = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(
            event,
            ScanEvent::ScanStopped {
                transport: TransportKind::Usb
            }
        );
        assert!(!usb.is_scanning());
    }

    #[tokio::test]
    async fn test_open_failure_is_terminal_for_start() {
        let (mut usb, handle, _rx) = driver(fast_config());
        handle.add_device(UsbCandidate {
            id: "8-1".to_string(),
            name: "proximity reader".to_string(),
            vendor_id: None,
            product_id: None,
        });
        handle.fail_next_open(TransportError::permission_denied("user dismissed picker"));

        let result = usb.start_scan().await;
        assert!(matches!(result, Err(TransportError::PermissionDenied { .. })));
        assert!(!usb.is_scanning());
    }
}
