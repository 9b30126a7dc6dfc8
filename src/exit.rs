//! Typed exit conditions and the per-session exit state.
//!
//! Every failure in a session is converted into exactly one [`ExitCondition`].
//! [`ExitState`] holds the condition for the current session attempt and
//! enforces first-failure-wins: once the condition leaves
//! [`ExitCondition::Success`] no later handler can overwrite it.
//!
//! Termination signals never touch `ExitState` directly. The signal path only
//! cancels a [`CancellationToken`]; the session loop folds that token into the
//! state when it next checks the loop condition.

use std::fmt::{Display, Formatter};

use tokio_util::sync::CancellationToken;

/// Reason a session (and possibly the process) ended.
///
/// The discriminant is the process exit status. `SimulatedReboot` is handled
/// inside the process and never reaches [`std::process::exit`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum ExitCondition {
    /// Session is still running, or the process ended cleanly.
    Success = 0,
    /// A termination signal was received.
    TerminatedBySignal = 1,
    /// The periodic timer event could not be acknowledged.
    TimerConsumeFailed = 2,
    /// Writing a message to the peer failed.
    SendFailed = 3,
    /// Reading from the peer failed or timed out.
    ReceiveFailed = 4,
    /// The event loop could not be created.
    EventLoopInitFailed = 5,
    /// The periodic send timer could not be registered.
    TimerInitFailed = 6,
    /// The connection to the peer could not be opened.
    ConnectFailed = 7,
    /// The receive timeout could not be applied to the connection.
    SocketOptionFailed = 8,
    /// The connection could not be registered for readable events.
    RegisterIoFailed = 9,
    /// Waiting on the event loop failed for a reason other than interruption.
    EventLoopRunFailed = 10,
    /// The peer asked for a simulated reboot.
    SimulatedReboot = 11,
}

impl ExitCondition {
    /// Numeric process exit status for this condition.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// `true` for conditions that end the process rather than loop.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::SimulatedReboot)
    }
}

impl Display for ExitCondition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Success => "success",
            Self::TerminatedBySignal => "terminated by signal",
            Self::TimerConsumeFailed => "timer consume failed",
            Self::SendFailed => "send failed",
            Self::ReceiveFailed => "receive failed",
            Self::EventLoopInitFailed => "event loop init failed",
            Self::TimerInitFailed => "timer init failed",
            Self::ConnectFailed => "connect failed",
            Self::SocketOptionFailed => "socket option failed",
            Self::RegisterIoFailed => "register io failed",
            Self::EventLoopRunFailed => "event loop run failed",
            Self::SimulatedReboot => "simulated reboot",
        };
        write!(f, "{label} ({})", self.code())
    }
}

impl From<ExitCondition> for std::process::ExitCode {
    fn from(condition: ExitCondition) -> Self {
        Self::from(condition.code())
    }
}

/// Exit condition for one session attempt.
///
/// Handlers receive `&mut ExitState` and call [`set`](Self::set); the session
/// loop calls [`current`](Self::current) at the top of every iteration.
#[derive(Debug)]
pub struct ExitState {
    condition: ExitCondition,
    shutdown: CancellationToken,
}

impl ExitState {
    /// Fresh state in [`ExitCondition::Success`], observing `shutdown`.
    #[must_use]
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            condition: ExitCondition::Success,
            shutdown,
        }
    }

    /// Record `condition` unless an earlier failure already won.
    pub fn set(&mut self, condition: ExitCondition) {
        if self.condition == ExitCondition::Success {
            self.condition = condition;
        }
    }

    /// Current condition, with a pending termination signal folded in.
    pub fn current(&mut self) -> ExitCondition {
        if self.shutdown.is_cancelled() {
            self.set(ExitCondition::TerminatedBySignal);
        }
        self.condition
    }

    /// `true` while nothing has ended the session.
    pub fn is_running(&mut self) -> bool {
        self.current() == ExitCondition::Success
    }
}
