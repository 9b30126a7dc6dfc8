#![forbid(unsafe_code)]

//! High-level side of an intercore mailbox.
//!
//! A [`Supervisor`](supervisor::Supervisor) runs sessions against a
//! [`Platform`](event_loop::Platform). Each session sends a sequenced message
//! to the real-time peer once per period, logs whatever the peer sends back,
//! and restarts in-process when the peer sends `reboot!!`.

pub mod channel;
pub mod config;
pub mod errors;
pub mod event_loop;
pub mod exit;
pub mod receiver;
pub mod sender;
pub mod session;
pub mod supervisor;

pub use config::SessionConfig;
pub use errors::{AppError, Result};
pub use exit::ExitCondition;
