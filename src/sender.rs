//! Periodic Sender: one sequenced message per timer tick.
//!
//! Messages are `hl-app-to-rt-app-adding` followed by a two-digit sequence
//! number cycling 00..=99. The counter lives in [`PeriodicSender`], which the
//! supervisor keeps across simulated reboots, so numbering carries on after a
//! restart instead of starting over.
//!
//! Sends are fire-and-forget. A short write is reported and the remainder is
//! dropped; there is no retry and no partial-write loop.

use tracing::{error, info, warn};

use crate::channel::PeerChannel;
use crate::event_loop::{EventLoop, TimerRegistration};
use crate::exit::{ExitCondition, ExitState};

/// Fixed prefix of every outbound message.
pub const MESSAGE_PREFIX: &str = "hl-app-to-rt-app-adding";

/// Sequence numbers cycle through `0..SEQUENCE_MODULUS`.
pub const SEQUENCE_MODULUS: u8 = 100;

/// Wrapping sequence number in `[0, 100)`.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct SequenceCounter(u8);

impl SequenceCounter {
    /// Current value.
    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }

    /// Return the current value and step to the next one, wrapping 99 to 0.
    pub fn advance(&mut self) -> u8 {
        let current = self.0;
        self.0 = (current + 1) % SEQUENCE_MODULUS;
        current
    }
}

/// Outbound message for sequence number `sequence`.
#[must_use]
pub fn format_message(sequence: u8) -> String {
    format!("{MESSAGE_PREFIX}{sequence:02}")
}

/// Timer-driven message source.
#[derive(Debug, Default)]
pub struct PeriodicSender {
    counter: SequenceCounter,
}

impl PeriodicSender {
    /// Sender starting at sequence number 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number the next message will carry.
    #[must_use]
    pub fn counter(&self) -> SequenceCounter {
        self.counter
    }

    /// Format the next message and advance the counter.
    pub fn next_message(&mut self) -> String {
        format_message(self.counter.advance())
    }

    /// Handle one expiry of the send timer.
    ///
    /// The expiry is acknowledged first; if that fails nothing is sent.
    pub async fn on_timer<L: EventLoop>(
        &mut self,
        event_loop: &mut L,
        timer: &TimerRegistration,
        channel: &mut L::Channel,
        state: &mut ExitState,
    ) {
        if let Err(err) = event_loop.consume_timer(timer) {
            error!(%err, "failed to consume send timer event");
            state.set(ExitCondition::TimerConsumeFailed);
            return;
        }

        self.send_next(channel, state).await;
    }

    /// Write the next message to `channel`.
    pub async fn send_next<C: PeerChannel>(&mut self, channel: &mut C, state: &mut ExitState) {
        let message = self.next_message();
        info!(%message, "sending");

        let expected = message.len();
        match channel.send(message.as_bytes()).await {
            Ok(0) => {
                error!(expected, "peer accepted zero bytes");
                state.set(ExitCondition::SendFailed);
            }
            Ok(sent) if sent < expected => {
                warn!(sent, expected, "short write to peer, remainder dropped");
            }
            Ok(_) => {}
            Err(err) => {
                error!(%err, "unable to send message");
                state.set(ExitCondition::SendFailed);
            }
        }
    }
}
