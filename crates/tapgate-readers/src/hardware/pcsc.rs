//! PC/SC backend for the contactless channel.
//!
//! Polls reader status in bounded one-second windows under
//! `spawn_blocking`, so `stop_scan`'s abort takes effect between windows.
//! The UID is read with the standard `FF CA 00 00 00` get-data APDU; a
//! reader that answers it with an error status is reported, not fatal.

use crate::nfc::{NfcBackend, NfcListener, TagNotification};
use pcsc::{Context, Protocols, ReaderState, Scope, ShareMode, State};
use std::ffi::CString;
use std::time::Duration;
use tapgate_core::{Result, TransportError};
use tracing::debug;

const GET_UID_APDU: [u8; 5] = [0xFF, 0xCA, 0x00, 0x00, 0x00];
const STATUS_POLL_WINDOW: Duration = Duration::from_secs(1);

fn map_pcsc(e: pcsc::Error) -> TransportError {
    match e {
        pcsc::Error::NoService
        | pcsc::Error::NoReadersAvailable
        | pcsc::Error::ReaderUnavailable
        | pcsc::Error::UnknownReader => {
            TransportError::device_not_found(format!("pcsc: {e}"))
        }
        pcsc::Error::SharingViolation => TransportError::device_busy(format!("pcsc: {e}")),
        other => TransportError::transport_io(format!("pcsc: {other}")),
    }
}

/// Platform smart-card service as the contactless backend.
pub struct PcscNfc;

impl PcscNfc {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PcscNfc {
    fn default() -> Self {
        Self::new()
    }
}

impl NfcBackend for PcscNfc {
    type Listener = PcscListener;

    async fn is_available(&self) -> bool {
        tokio::task::spawn_blocking(|| {
            let ctx = Context::establish(Scope::User).ok()?;
            let mut buf = [0u8; 2048];
            let mut readers = ctx.list_readers(&mut buf).ok()?;
            readers.next().map(|_| ())
        })
        .await
        .ok()
        .flatten()
        .is_some()
    }

    async fn watch(&mut self) -> Result<Self::Listener> {
        tokio::task::spawn_blocking(|| {
            let ctx = Context::establish(Scope::User).map_err(map_pcsc)?;
            let mut buf = [0u8; 2048];
            let reader = {
                let mut readers = ctx.list_readers(&mut buf).map_err(map_pcsc)?;
                readers
                    .next()
                    .ok_or_else(|| TransportError::device_not_found("no pcsc readers"))?
                    .to_owned()
            };
            Ok(PcscListener {
                ctx,
                reader,
                card_present: false,
            })
        })
        .await
        .map_err(|e| TransportError::transport_io(format!("pcsc task: {e}")))?
    }
}

enum PollStep {
    Tag(Vec<u8>),
    Idle { present: bool },
    Closed,
}

/// Edge-triggered card watcher over one PC/SC reader.
pub struct PcscListener {
    ctx: Context,
    reader: CString,
    card_present: bool,
}

impl PcscListener {
    /// One bounded status poll. Emits a UID only on the absent-to-present
    /// edge so a card left on the reader produces a single event.
    fn poll_once(ctx: &Context, reader: &CString, was_present: bool) -> Result<PollStep> {
        let mut states = [ReaderState::new(reader.clone(), State::UNAWARE)];
        match ctx.get_status_change(STATUS_POLL_WINDOW, &mut states) {
            Ok(()) => {}
            Err(pcsc::Error::Timeout) => {
                return Ok(PollStep::Idle {
                    present: was_present,
                });
            }
            Err(pcsc::Error::UnknownReader | pcsc::Error::ReaderUnavailable) => {
                return Ok(PollStep::Closed);
            }
            Err(e) => return Err(map_pcsc(e)),
        }

        let present = states[0].event_state().contains(State::PRESENT);
        if !present || was_present {
            return Ok(PollStep::Idle { present });
        }

        let card = ctx
            .connect(reader, ShareMode::Shared, Protocols::ANY)
            .map_err(map_pcsc)?;
        let mut response = [0u8; 64];
        let answer = card.transmit(&GET_UID_APDU, &mut response).map_err(map_pcsc)?;
        let Some((sw, uid)) = answer
            .len()
            .checked_sub(2)
            .map(|n| (&answer[n..], &answer[..n]))
        else {
            return Err(TransportError::transport_io("truncated APDU response"));
        };
        if sw != [0x90, 0x00] {
            return Err(TransportError::transport_io(format!(
                "get-uid APDU refused: {:02X}{:02X}",
                sw[0], sw[1]
            )));
        }
        Ok(PollStep::Tag(uid.to_vec()))
    }
}

impl NfcListener for PcscListener {
    async fn next_tag(&mut self) -> Result<Option<TagNotification>> {
        loop {
            let ctx = self.ctx.clone();
            let reader = self.reader.clone();
            let was_present = self.card_present;
            let step =
                tokio::task::spawn_blocking(move || Self::poll_once(&ctx, &reader, was_present))
                    .await
                    .map_err(|e| TransportError::transport_io(format!("pcsc task: {e}")))??;

            match step {
                PollStep::Tag(uid) => {
                    self.card_present = true;
                    debug!(bytes = uid.len(), "pcsc uid read");
                    return Ok(Some(TagNotification::with_serial(uid)));
                }
                PollStep::Idle { present } => self.card_present = present,
                PollStep::Closed => return Ok(None),
            }
        }
    }
}
