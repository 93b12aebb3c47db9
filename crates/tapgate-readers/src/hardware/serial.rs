//! serialport backend for the serial channel.
//!
//! Reads run in bounded 500 ms windows under `spawn_blocking` with the
//! port taken out and returned each cycle; a window that times out is
//! silence, not end-of-data.

use crate::serial::{SerialBackend, SerialCandidate, SerialConnection};
use serialport::{DataBits, Parity, SerialPort, StopBits};
use std::io::Read;
use std::time::Duration;
use tapgate_core::{Result, TransportError};

const READ_WINDOW: Duration = Duration::from_millis(500);

fn map_serialport(e: serialport::Error) -> TransportError {
    match e.kind() {
        serialport::ErrorKind::NoDevice => {
            TransportError::device_not_found(format!("serial: {e}"))
        }
        serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
            TransportError::permission_denied(format!("serial: {e}"))
        }
        _ if e.to_string().to_lowercase().contains("busy") => {
            TransportError::device_busy(format!("serial: {e}"))
        }
        _ => TransportError::transport_io(format!("serial: {e}")),
    }
}

/// OS serial port service.
pub struct SerialportBackend;

impl SerialportBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SerialportBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialBackend for SerialportBackend {
    type Connection = SerialportConnection;

    async fn enumerate(&self) -> Result<Vec<SerialCandidate>> {
        tokio::task::spawn_blocking(|| {
            let ports = serialport::available_ports().map_err(map_serialport)?;
            // The OS enumeration has no access bits; an unusable port
            // surfaces at open time instead.
            Ok(ports
                .into_iter()
                .map(|p| SerialCandidate {
                    port_name: p.port_name,
                    readable: true,
                    writable: true,
                })
                .collect())
        })
        .await
        .map_err(|e| TransportError::transport_io(format!("serial task: {e}")))?
    }

    async fn open(&mut self, port_name: &str, baud: u32) -> Result<Self::Connection> {
        let port_name = port_name.to_string();
        tokio::task::spawn_blocking(move || {
            let port = serialport::new(&port_name, baud)
                .data_bits(DataBits::Eight)
                .stop_bits(StopBits::One)
                .parity(Parity::None)
                .timeout(READ_WINDOW)
                .open()
                .map_err(map_serialport)?;
            Ok(SerialportConnection { port: Some(port) })
        })
        .await
        .map_err(|e| TransportError::transport_io(format!("serial task: {e}")))?
    }
}

/// Open serial port.
pub struct SerialportConnection {
    port: Option<Box<dyn SerialPort>>,
}

impl SerialConnection for SerialportConnection {
    async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            let mut port = self
                .port
                .take()
                .ok_or_else(|| TransportError::invalid_state("serial port lost mid-session"))?;
            let (port, outcome) = tokio::task::spawn_blocking(move || {
                let mut buf = [0u8; 256];
                let outcome = port.read(&mut buf).map(|n| buf[..n].to_vec());
                (port, outcome)
            })
            .await
            .map_err(|e| TransportError::transport_io(format!("serial task: {e}")))?;
            self.port = Some(port);

            match outcome {
                Ok(bytes) if bytes.is_empty() => return Ok(None),
                Ok(bytes) => return Ok(Some(bytes)),
                // Bounded window elapsed without data; next cycle.
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::BrokenPipe
                            | std::io::ErrorKind::NotConnected
                            | std::io::ErrorKind::UnexpectedEof
                    ) =>
                {
                    // Adapter gone: end-of-data, not a crash.
                    return Ok(None);
                }
                Err(e) => return Err(TransportError::from(e)),
            }
        }
    }
}
