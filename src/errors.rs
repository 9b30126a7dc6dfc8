//! Error types for process bootstrap.
//!
//! Failures inside a running session are not errors in this sense: they are
//! recorded as an [`ExitCondition`](crate::exit::ExitCondition) and end the
//! session. `AppError` covers everything that happens before the first
//! session starts (configuration, logging, signal registration).

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Process exit status used for bootstrap failures.
///
/// Sits just past the range occupied by
/// [`ExitCondition`](crate::exit::ExitCondition) codes.
pub const BOOTSTRAP_FAILURE_CODE: u8 = 12;

/// Application error enumeration covering all bootstrap failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Local socket name resolution or listener failure.
    Ipc(String),
    /// Signal handler registration failure.
    Signal(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Ipc(msg) => write!(f, "ipc: {msg}"),
            Self::Signal(msg) => write!(f, "signal: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}
