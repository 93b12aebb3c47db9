//! Transport driver contract.
//!
//! The three transport variants differ completely in how bytes arrive
//! (platform notifications, bulk polling, stream pulls) but share one
//! lifecycle contract, defined here as a native-async trait
//! (Edition 2024 RPITIT, no `async_trait` macro needed). The registry and
//! the scan coordinator drive every variant exclusively through this
//! trait; variant-specific knobs stay on the concrete types.

#![allow(async_fn_in_trait)]

use tapgate_core::{DeviceDescriptor, DriverStatus, Result, TransportKind};

/// One transport's full connection lifecycle.
///
/// Implementations own their device handle exclusively: a handle is never
/// shared between drivers or reused after [`stop_scan`] without a fresh
/// open. Driver state (connected/scanning flags, descriptor) is mutated
/// only through these methods, never reached into from outside.
///
/// [`stop_scan`]: TransportDriver::stop_scan
pub trait TransportDriver: Send + Sync {
    /// Transport kind of this driver (the provenance tag its events carry).
    fn kind(&self) -> TransportKind;

    /// Descriptor of the current or last-seen device candidate.
    fn descriptor(&self) -> &DeviceDescriptor;

    /// Whether a scan session is currently running.
    fn is_scanning(&self) -> bool;

    /// Best-effort probe of whether at least one candidate device is
    /// currently reachable. Updates the descriptor's connection status.
    /// Never fails: probe errors downgrade to "disconnected".
    async fn check_availability(&mut self) -> bool;

    /// Open a device and enter the continuous read loop.
    ///
    /// Prefers a previously associated device when one is still present;
    /// otherwise device selection may involve a user- or OS-mediated
    /// authorization step. Parsed card events are emitted through the
    /// event sender installed at construction.
    ///
    /// Calling this while already scanning is a no-op: at most one scan
    /// session exists per driver.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`](tapgate_core::TransportError) when no
    /// device can be opened after exhausting the variant's retry policy.
    /// The failure is terminal for this driver's start attempt only and
    /// never affects the other transports.
    async fn start_scan(&mut self) -> Result<()>;

    /// Release the open device and the read loop.
    ///
    /// Idempotent and safe to call when not scanning. Actively cancels a
    /// pending blocking read rather than waiting for it to complete.
    async fn stop_scan(&mut self);

    /// Live health check. Recomputed on every call: hardware availability
    /// changes outside this process's control, so the result is never
    /// cached.
    async fn check_health(&mut self) -> bool;
}

/// Diagnostics snapshot for any driver.
pub(crate) fn status_of<D: TransportDriver>(driver: &D) -> DriverStatus {
    DriverStatus {
        transport: driver.kind(),
        name: driver.descriptor().name.clone(),
        connected: driver.descriptor().is_connected(),
        scanning: driver.is_scanning(),
    }
}
