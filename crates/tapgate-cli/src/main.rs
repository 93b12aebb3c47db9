//! Demo driver for the unified card acquisition layer.
//!
//! Runs the full manager stack over mock hardware: brings up all three
//! transports, scripts a handful of card presentations, prints every
//! event from the unified stream, and shuts down cleanly. Useful for
//! eyeballing the event flow without any reader attached.
//!
//! `RUST_LOG=debug cargo run -p tapgate-cli` shows the driver internals.

use anyhow::Result;
use tapgate_readers::mock::{MockNfc, MockSerial, MockUsb};
use tapgate_readers::usb::UsbCandidate;
use tapgate_readers::{AcquireConfig, ScanEvent, TagNotification, UnifiedManager};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("tapgate {} (mock hardware demo)", tapgate_core::VERSION);

    let (nfc, nfc_ctl) = MockNfc::new();
    let (usb, usb_ctl) = MockUsb::new();
    let (serial, serial_ctl) = MockSerial::new();

    nfc_ctl.set_available(true);
    usb_ctl.add_device(UsbCandidate {
        id: "1-4".to_string(),
        name: "ACR122U contactless reader".to_string(),
        vendor_id: Some(0x072f),
        product_id: Some(0x2200),
    });
    serial_ctl.add_port("/dev/ttyUSB0", true, true);

    let config = AcquireConfig {
        usb_poll_interval_ms: 100,
        ..AcquireConfig::default()
    };
    let (mut manager, mut events) = UnifiedManager::new(nfc, usb, serial, config);

    let outcome = manager.start_scanning().await?;
    info!(started = ?outcome.started, "scanning");

    // Script one card per channel.
    nfc_ctl
        .present_tag(TagNotification::with_serial(vec![0x04, 0xA1, 0xB2, 0xC3]))
        .await;
    usb_ctl.queue_frame(b"1234ABCD5678EF".to_vec());
    serial_ctl
        .feed(b"3B 8F 80 01 80 4F 0C A0 00 00 03 06\r\n".to_vec())
        .await;

    let mut seen = 0;
    while seen < 3 {
        match events.recv().await {
            Some(ScanEvent::CardDetected(card)) => {
                seen += 1;
                println!(
                    "[{}] {} ({}, {})",
                    card.transport,
                    card.uid,
                    card.family.name(),
                    card.manufacturer
                );
            }
            Some(ScanEvent::TransportError { transport, message }) => {
                eprintln!("[{transport}] error: {message}");
            }
            Some(ScanEvent::ScanStopped { transport }) => {
                eprintln!("[{transport}] stopped");
            }
            // ScanEvent is #[non_exhaustive]; no other variants exist today.
            Some(_) => {}
            None => break,
        }
    }

    for status in manager.status() {
        println!(
            "{}: connected={} scanning={}",
            status.transport, status.connected, status.scanning
        );
    }

    manager.shutdown().await;
    Ok(())
}
