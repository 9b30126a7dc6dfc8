//! Restart Supervisor: the outermost control loop.
//!
//! Runs sessions back to back for as long as each one ends in
//! [`ExitCondition::SimulatedReboot`], pausing for the configured reboot
//! window in between. Any other condition is returned to the caller, which
//! turns it into the process exit status.
//!
//! Termination signals are registered once for the whole process with
//! [`install_termination_handler`]. tokio's signal driver owns the OS-level
//! handler, which only records the signal and wakes the runtime; the listener
//! task spawned here then cancels the shutdown token, which is the single
//! set-only flag every session observes.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::event_loop::Platform;
use crate::exit::ExitCondition;
use crate::sender::PeriodicSender;
use crate::session::run_session;
use crate::Result;

/// Register SIGTERM (and Ctrl-C) handling for the process lifetime.
///
/// The returned task cancels `shutdown` on the first signal and exits.
///
/// # Errors
///
/// Returns `AppError::Signal` if the SIGTERM handler cannot be installed.
pub fn install_termination_handler(shutdown: CancellationToken) -> Result<JoinHandle<()>> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).map_err(|err| {
            crate::AppError::Signal(format!("failed to register SIGTERM handler: {err}"))
        })?;

        Ok(tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => {}
                result = tokio::signal::ctrl_c() => {
                    if let Err(err) = result {
                        warn!(%err, "ctrl-c handler failed, relying on SIGTERM only");
                        sigterm.recv().await;
                    }
                }
            }
            shutdown.cancel();
        }))
    }

    #[cfg(not(unix))]
    {
        Ok(tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(%err, "ctrl-c signal handler failed");
                return;
            }
            shutdown.cancel();
        }))
    }
}

/// Owner of everything that outlives a single session.
pub struct Supervisor<P: Platform> {
    platform: P,
    config: SessionConfig,
    sender: PeriodicSender,
    shutdown: CancellationToken,
    sessions_started: u64,
}

impl<P: Platform> Supervisor<P> {
    /// New supervisor; `shutdown` is the token cancelled by the signal path.
    #[must_use]
    pub fn new(platform: P, config: SessionConfig, shutdown: CancellationToken) -> Self {
        Self {
            platform,
            config,
            sender: PeriodicSender::new(),
            shutdown,
            sessions_started: 0,
        }
    }

    /// Number of sessions started so far.
    #[must_use]
    pub fn sessions_started(&self) -> u64 {
        self.sessions_started
    }

    /// Shared sender, exposing the sequence counter.
    #[must_use]
    pub fn sender(&self) -> &PeriodicSender {
        &self.sender
    }

    /// Platform the sessions run on.
    #[must_use]
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Run sessions until one ends with a terminal condition.
    pub async fn run(&mut self) -> ExitCondition {
        loop {
            self.sessions_started += 1;
            let condition = run_session(
                &mut self.platform,
                &self.config,
                &mut self.sender,
                &self.shutdown,
            )
            .await;

            if condition.is_terminal() {
                return condition;
            }

            if let Some(condition) = self.simulate_reboot().await {
                return condition;
            }
        }
    }

    /// Sit out the reboot window. Returns a terminal condition if a signal
    /// arrived during the pause.
    async fn simulate_reboot(&self) -> Option<ExitCondition> {
        let delay = self.config.reboot_delay();
        info!(delay_seconds = delay.as_secs(), "simulating reboot");

        tokio::select! {
            biased;

            () = self.shutdown.cancelled() => {
                warn!("reboot wait interrupted");
            }
            () = tokio::time::sleep(delay) => {}
        }

        info!("re-initialising");
        self.shutdown
            .is_cancelled()
            .then_some(ExitCondition::TerminatedBySignal)
    }
}
