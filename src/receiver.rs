//! Message Receiver: reads whatever the peer sent and looks for the reboot
//! command.
//!
//! Each readable event reads at most [`RECV_BUFFER_SIZE`] bytes; anything
//! beyond that stays in the stream and is picked up by the next event as a
//! separate chunk. There is no framing: a chunk is the reboot command only if
//! it is exactly the eight bytes `reboot!!`.

use tracing::{debug, error, info};

use crate::channel::PeerChannel;
use crate::exit::{ExitCondition, ExitState};

/// Capacity of the receive buffer.
pub const RECV_BUFFER_SIZE: usize = 32;

/// Control payload that requests a simulated reboot.
pub const REBOOT_COMMAND: &[u8] = b"reboot!!";

/// Classification of one received chunk.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Payload {
    /// The reboot control command.
    Reboot,
    /// Anything else, including an empty read.
    Data,
}

/// Classify a received chunk.
#[must_use]
pub fn classify(payload: &[u8]) -> Payload {
    if !payload.is_empty() && payload == REBOOT_COMMAND {
        Payload::Reboot
    } else {
        Payload::Data
    }
}

/// Render `payload` for logging, replacing non-printable bytes with `.`.
#[must_use]
pub fn render_printable(payload: &[u8]) -> String {
    payload
        .iter()
        .map(|&byte| {
            if byte.is_ascii_graphic() || byte == b' ' {
                char::from(byte)
            } else {
                '.'
            }
        })
        .collect()
}

/// Readable-event handler owning the receive buffer.
#[derive(Debug)]
pub struct MessageReceiver {
    buf: [u8; RECV_BUFFER_SIZE],
}

impl Default for MessageReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageReceiver {
    /// Receiver with a zeroed buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: [0; RECV_BUFFER_SIZE],
        }
    }

    /// Handle one readable event on `channel`.
    ///
    /// Returns the classification of the chunk, or `None` if the read failed.
    pub async fn on_readable<C: PeerChannel>(
        &mut self,
        channel: &mut C,
        state: &mut ExitState,
    ) -> Option<Payload> {
        self.buf.fill(0);

        let received = match channel.recv(&mut self.buf).await {
            Ok(received) => received.min(RECV_BUFFER_SIZE),
            Err(err) => {
                error!(%err, "unable to receive message");
                state.set(ExitCondition::ReceiveFailed);
                return None;
            }
        };

        let chunk = &self.buf[..received];
        if received == 0 {
            // A closed peer stays readable and yields empty reads.
            debug!("received zero bytes");
        } else {
            info!(bytes = received, payload = %render_printable(chunk), "received");
        }

        let payload = classify(chunk);
        if payload == Payload::Reboot {
            info!("simulated reboot command received");
            state.set(ExitCondition::SimulatedReboot);
        }
        Some(payload)
    }
}
