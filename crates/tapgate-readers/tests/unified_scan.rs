//! End-to-end scan coordination over mock hardware.

use tapgate_readers::mock::{MockNfc, MockSerial, MockUsb};
use tapgate_readers::{
    AcquireConfig, AcquireError, EventStream, ScanEvent, TagNotification, TransportError,
    UnifiedManager, UsbCandidate,
};
use tapgate_core::{CardFamily, TransportKind};
use tokio::time::{Duration, timeout};

fn fast_config() -> AcquireConfig {
    AcquireConfig {
        usb_poll_interval_ms: 5,
        serial_backoff_step_ms: 5,
        ..AcquireConfig::default()
    }
}

fn manager() -> (
    UnifiedManager<MockNfc, MockUsb, MockSerial>,
    tapgate_readers::mock::MockNfcHandle,
    tapgate_readers::mock::MockUsbHandle,
    tapgate_readers::mock::MockSerialHandle,
    EventStream,
) {
    let (nfc, nfc_handle) = MockNfc::new();
    let (usb, usb_handle) = MockUsb::new();
    let (serial, serial_handle) = MockSerial::new();
    let (manager, stream) = UnifiedManager::new(nfc, usb, serial, fast_config());
    (manager, nfc_handle, usb_handle, serial_handle, stream)
}

async fn next_event(stream: &mut EventStream) -> ScanEvent {
    timeout(Duration::from_secs(1), stream.recv())
        .await
        .expect("event within deadline")
        .expect("stream open")
}

fn reader_candidate(id: &str) -> UsbCandidate {
    UsbCandidate {
        id: id.to_string(),
        name: "ACR122U contactless reader".to_string(),
        vendor_id: Some(0x072f),
        product_id: Some(0x2200),
    }
}

#[tokio::test]
async fn degraded_start_keeps_working_transports() {
    let (mut manager, nfc, usb, serial, mut stream) = manager();
    nfc.set_available(true);
    serial.add_port("/dev/ttyUSB0", true, true);
    usb.add_device(reader_candidate("1-4"));
    usb.fail_next_open(TransportError::permission_denied("user dismissed picker"));

    let outcome = manager.start_scanning().await.unwrap();
    assert!(outcome.is_degraded());
    assert_eq!(
        outcome.started,
        vec![TransportKind::Nfc, TransportKind::Serial]
    );
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].0, TransportKind::Usb);

    // The failure is mirrored onto the stream exactly once.
    match next_event(&mut stream).await {
        ScanEvent::TransportError { transport, .. } => {
            assert_eq!(transport, TransportKind::Usb);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    // Surviving transports still deliver cards, each under its own tag.
    nfc.present_tag(TagNotification::with_serial(vec![0x04, 0xA1, 0xB2, 0xC3]))
        .await;
    match next_event(&mut stream).await {
        ScanEvent::CardDetected(card) => {
            assert_eq!(card.uid, "04A1B2C3");
            assert_eq!(card.family, CardFamily::MifareClassic);
            assert_eq!(card.manufacturer, "NXP Semiconductors");
            assert_eq!(card.transport, TransportKind::Nfc);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    serial.feed(b"1234ABCD5678EF\r\n".to_vec()).await;
    match next_event(&mut stream).await {
        ScanEvent::CardDetected(card) => {
            assert_eq!(card.uid, "1234ABCD5678EF");
            assert_eq!(card.family, CardFamily::MifareUltralight);
            assert_eq!(card.transport, TransportKind::Serial);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    manager.stop_scanning().await;
}

#[tokio::test]
async fn no_hardware_anywhere_is_an_error_not_a_hang() {
    let (mut manager, _nfc, _usb, _serial, mut stream) = manager();
    let result = manager.start_scanning().await;
    assert!(matches!(result, Err(AcquireError::NoAvailableReaders)));
    assert!(
        timeout(Duration::from_millis(50), stream.recv()).await.is_err(),
        "no events before any reader starts"
    );
}

#[tokio::test]
async fn every_available_reader_failing_is_terminal() {
    let (mut manager, nfc, usb, _serial, mut stream) = manager();
    nfc.set_available(true);
    nfc.fail_next_watch(TransportError::device_not_found("capability removed"));
    usb.add_device(reader_candidate("2-1"));
    usb.fail_next_open(TransportError::device_busy("claimed elsewhere"));

    let result = manager.start_scanning().await;
    assert!(matches!(result, Err(AcquireError::AllReadersFailed)));

    // Both failures are still reported individually.
    let mut failed = Vec::new();
    for _ in 0..2 {
        match next_event(&mut stream).await {
            ScanEvent::TransportError { transport, .. } => failed.push(transport),
            other => panic!("unexpected event: {:?}", other),
        }
    }
    failed.sort_by_key(|k| format!("{k}"));
    assert_eq!(failed, vec![TransportKind::Nfc, TransportKind::Usb]);
}

#[tokio::test]
async fn busy_serial_port_settles_after_retries() {
    let (mut manager, _nfc, _usb, serial, mut stream) = manager();
    serial.add_port("/dev/ttyACM0", true, true);
    serial.script_open_error(TransportError::device_busy("settling"));
    serial.script_open_error(TransportError::device_busy("settling"));

    let outcome = manager.start_scanning().await.unwrap();
    assert!(!outcome.is_degraded());
    assert_eq!(outcome.started, vec![TransportKind::Serial]);
    assert_eq!(serial.open_attempts(), 3);

    serial.feed(b"04A1B2C3".to_vec()).await;
    assert!(matches!(
        next_event(&mut stream).await,
        ScanEvent::CardDetected(_)
    ));
    manager.stop_scanning().await;
}

#[tokio::test]
async fn usb_frames_flow_through_keyword_matched_device() {
    let (mut manager, _nfc, usb, _serial, mut stream) = manager();
    usb.add_device(UsbCandidate {
        id: "3-1".to_string(),
        name: "Generic Hub".to_string(),
        vendor_id: None,
        product_id: None,
    });
    usb.add_device(reader_candidate("3-2"));

    manager.start_scanning().await.unwrap();
    usb.queue_frame(b"3B 8F 80 01 80 4F 0C A0 00 00 03 06".to_vec());

    match next_event(&mut stream).await {
        ScanEvent::CardDetected(card) => {
            assert_eq!(card.uid, "ATR-format");
            assert_eq!(card.family, CardFamily::AtrFrame);
            assert_eq!(card.transport, TransportKind::Usb);
            assert!(card.raw_frame.is_some());
        }
        other => panic!("unexpected event: {:?}", other),
    }
    manager.stop_scanning().await;
}

#[tokio::test]
async fn unplug_mid_session_stops_only_that_transport() {
    let (mut manager, nfc, usb, _serial, mut stream) = manager();
    nfc.set_available(true);
    usb.add_device(reader_candidate("4-1"));

    manager.start_scanning().await.unwrap();
    usb.disconnect();

    match next_event(&mut stream).await {
        ScanEvent::ScanStopped { transport } => assert_eq!(transport, TransportKind::Usb),
        other => panic!("unexpected event: {:?}", other),
    }

    // NFC keeps delivering after the USB session ended.
    nfc.present_tag(TagNotification::with_serial(vec![0xDE, 0xAD, 0xBE, 0xEF]))
        .await;
    match next_event(&mut stream).await {
        ScanEvent::CardDetected(card) => {
            assert_eq!(card.uid, "DEADBEEF");
            assert_eq!(card.transport, TransportKind::Nfc);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    let statuses = manager.status();
    let usb_status = statuses
        .iter()
        .find(|s| s.transport == TransportKind::Usb)
        .unwrap();
    assert!(!usb_status.scanning);

    manager.stop_scanning().await;
}

#[tokio::test]
async fn restart_after_stop_reuses_the_same_device() {
    let (mut manager, _nfc, usb, _serial, mut stream) = manager();
    usb.add_device(UsbCandidate {
        id: "5-1".to_string(),
        name: "pn532 board".to_string(),
        vendor_id: None,
        product_id: None,
    });

    manager.start_scanning().await.unwrap();
    manager.stop_scanning().await;

    usb.add_device(reader_candidate("5-2"));
    manager.start_scanning().await.unwrap();

    usb.queue_frame(b"04A1B2C3".to_vec());
    assert!(matches!(
        next_event(&mut stream).await,
        ScanEvent::CardDetected(_)
    ));

    let statuses = manager.status();
    let usb_status = statuses
        .iter()
        .find(|s| s.transport == TransportKind::Usb)
        .unwrap();
    assert_eq!(usb_status.name, "pn532 board");

    manager.stop_scanning().await;
}

#[tokio::test]
async fn health_report_tracks_live_hardware() {
    let (mut manager, nfc, _usb, serial, _stream) = manager();
    nfc.set_available(true);
    serial.add_port("/dev/ttyUSB0", true, true);

    let report = manager.check_health().await;
    assert!(report.is_healthy(TransportKind::Nfc));
    assert!(report.is_healthy(TransportKind::Serial));
    assert!(!report.is_healthy(TransportKind::Usb));

    // Never cached: the next call sees the capability withdrawn.
    nfc.set_available(false);
    let report = manager.check_health().await;
    assert!(!report.is_healthy(TransportKind::Nfc));
}

#[tokio::test]
async fn injected_cards_are_indistinguishable_from_hardware_reads() {
    let (manager, _nfc, _usb, _serial, mut stream) = manager();

    manager
        .inject_card("  04a1b2c3  ", TransportKind::Usb)
        .await
        .unwrap();
    match next_event(&mut stream).await {
        ScanEvent::CardDetected(card) => {
            assert_eq!(card.uid, "04A1B2C3");
            assert_eq!(card.transport, TransportKind::Usb);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    let result = manager.inject_card("hello world", TransportKind::Nfc).await;
    assert!(matches!(result, Err(AcquireError::Unparsable { .. })));
}

#[tokio::test]
async fn shutdown_terminates_the_stream() {
    let (mut manager, nfc, _usb, _serial, mut stream) = manager();
    nfc.set_available(true);
    manager.start_scanning().await.unwrap();
    manager.shutdown().await;

    let end = timeout(Duration::from_secs(1), async {
        while let Some(event) = stream.recv().await {
            assert!(!matches!(event, ScanEvent::CardDetected(_)));
        }
    })
    .await;
    assert!(end.is_ok(), "stream must terminate after shutdown");
}
