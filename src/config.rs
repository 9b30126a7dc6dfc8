//! Session configuration parsing and validation.
//!
//! Every field defaults to the reference constant, so an empty file (or no
//! file at all) yields the stock behavior: talk to the fixed peer, send once
//! per second, time out receives after five seconds, pause ten seconds on a
//! simulated reboot.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use crate::{AppError, Result};

/// Component identifier of the real-time peer application.
pub const DEFAULT_PEER_ID: &str = "005180bc-402f-4cb3-a662-72937dbcde47";

fn default_peer_id() -> Uuid {
    Uuid::from_u128(0x0051_80bc_402f_4cb3_a662_7293_7dbc_de47)
}

fn default_send_period_seconds() -> u64 {
    1
}

fn default_recv_timeout_seconds() -> u64 {
    5
}

fn default_reboot_delay_seconds() -> u64 {
    10
}

/// Configuration shared by every session of one process.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct SessionConfig {
    /// Stable identifier of the peer to connect to.
    #[serde(default = "default_peer_id")]
    pub peer_id: Uuid,
    /// Interval between outbound messages.
    #[serde(default = "default_send_period_seconds")]
    pub send_period_seconds: u64,
    /// Receive timeout applied to the peer connection.
    #[serde(default = "default_recv_timeout_seconds")]
    pub recv_timeout_seconds: u64,
    /// Pause between teardown and re-initialization on a simulated reboot.
    #[serde(default = "default_reboot_delay_seconds")]
    pub reboot_delay_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            peer_id: default_peer_id(),
            send_period_seconds: default_send_period_seconds(),
            recv_timeout_seconds: default_recv_timeout_seconds(),
            reboot_delay_seconds: default_reboot_delay_seconds(),
        }
    }
}

impl SessionConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Period of the send timer.
    #[must_use]
    pub fn send_period(&self) -> Duration {
        Duration::from_secs(self.send_period_seconds)
    }

    /// Receive timeout for the peer connection.
    #[must_use]
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_secs(self.recv_timeout_seconds)
    }

    /// Length of the simulated reboot window.
    #[must_use]
    pub fn reboot_delay(&self) -> Duration {
        Duration::from_secs(self.reboot_delay_seconds)
    }

    fn validate(&self) -> Result<()> {
        if self.send_period_seconds == 0 {
            return Err(AppError::Config(
                "send_period_seconds must be greater than zero".into(),
            ));
        }

        if self.recv_timeout_seconds == 0 {
            return Err(AppError::Config(
                "recv_timeout_seconds must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}
