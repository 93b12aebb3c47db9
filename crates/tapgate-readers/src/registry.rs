//! Driver registry.
//!
//! Owns exactly one driver per transport kind and answers availability
//! and health questions across all of them. Probes run concurrently: the
//! three drivers are disjoint fields, so the futures borrow independently
//! and a slow probe on one channel never delays the others.

use crate::nfc::{NfcBackend, NfcTransport};
use crate::serial::{SerialBackend, SerialTransport};
use crate::traits::{TransportDriver, status_of};
use crate::usb::{UsbBackend, UsbTransport};
use tapgate_core::{DriverStatus, HealthReport, TransportKind};
use tracing::debug;

/// One driver per transport kind.
pub struct ReaderRegistry<N: NfcBackend, U: UsbBackend, S: SerialBackend> {
    pub(crate) nfc: NfcTransport<N>,
    pub(crate) usb: UsbTransport<U>,
    pub(crate) serial: SerialTransport<S>,
}

impl<N: NfcBackend, U: UsbBackend, S: SerialBackend> ReaderRegistry<N, U, S> {
    pub(crate) fn new(
        nfc: NfcTransport<N>,
        usb: UsbTransport<U>,
        serial: SerialTransport<S>,
    ) -> Self {
        Self { nfc, usb, serial }
    }

    /// Probe all transports concurrently and update their descriptors.
    /// Returns the kinds that currently have a reachable candidate.
    pub async fn refresh(&mut self) -> Vec<TransportKind> {
        let (nfc, usb, serial) = tokio::join!(
            self.nfc.check_availability(),
            self.usb.check_availability(),
            self.serial.check_availability(),
        );

        let mut available = Vec::new();
        if nfc {
            available.push(TransportKind::Nfc);
        }
        if usb {
            available.push(TransportKind::Usb);
        }
        if serial {
            available.push(TransportKind::Serial);
        }
        debug!(?available, "availability refresh");
        available
    }

    /// Kinds whose last probe found a reachable candidate. Does not
    /// re-probe; call [`refresh`](Self::refresh) for live state.
    pub fn available_drivers(&self) -> Vec<TransportKind> {
        [
            (&self.nfc as &dyn DriverView, TransportKind::Nfc),
            (&self.usb as &dyn DriverView, TransportKind::Usb),
            (&self.serial as &dyn DriverView, TransportKind::Serial),
        ]
        .into_iter()
        .filter(|(d, _)| d.connected())
        .map(|(_, k)| k)
        .collect()
    }

    /// Diagnostics snapshot of every driver.
    pub fn all_drivers_status(&self) -> Vec<DriverStatus> {
        vec![
            status_of(&self.nfc),
            status_of(&self.usb),
            status_of(&self.serial),
        ]
    }

    /// Live health check across all transports, recomputed on every call.
    pub async fn check_health(&mut self) -> HealthReport {
        let (nfc, usb, serial) = tokio::join!(
            self.nfc.check_health(),
            self.usb.check_health(),
            self.serial.check_health(),
        );

        let mut report = HealthReport::default();
        for (kind, healthy) in [
            (TransportKind::Nfc, nfc),
            (TransportKind::Usb, usb),
            (TransportKind::Serial, serial),
        ] {
            if healthy {
                report.healthy.push(kind);
            } else {
                report.unhealthy.push(kind);
            }
        }
        report
    }
}

/// Object-safe slice of the driver contract, for uniform iteration where
/// the concrete generic types differ.
trait DriverView {
    fn connected(&self) -> bool;
}

impl<D: TransportDriver> DriverView for D {
    fn connected(&self) -> bool {
        self.descriptor().is_connected()
    }
}
