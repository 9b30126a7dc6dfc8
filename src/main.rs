#![forbid(unsafe_code)]

//! `intercore-comms` — high-level intercore mailbox application.
//!
//! Sends a sequenced message to the real-time peer every period, logs the
//! replies, and performs an in-process restart whenever the peer sends the
//! reboot command. The process exit status is the numeric
//! [`ExitCondition`] of the session that ended it.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use intercore_comms::errors::BOOTSTRAP_FAILURE_CODE;
use intercore_comms::event_loop::TokioPlatform;
use intercore_comms::supervisor::{install_termination_handler, Supervisor};
use intercore_comms::{AppError, ExitCondition, Result, SessionConfig};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "intercore-comms", about = "High-level intercore mailbox application", version, long_about = None)]
struct Cli {
    /// Optional TOML configuration file; built-in defaults apply without it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> ExitCode {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("{err}");
        return ExitCode::from(BOOTSTRAP_FAILURE_CODE);
    }

    info!("high-level intercore comms application");
    info!("sends data to, and receives data from, a real-time capable application");

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "configuration rejected");
            return ExitCode::from(BOOTSTRAP_FAILURE_CODE);
        }
    };

    // One current-thread runtime for the whole process: every handler runs
    // to completion on this thread.
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(%err, "failed to build tokio runtime");
            return ExitCondition::EventLoopInitFailed.into();
        }
    };

    match runtime.block_on(run(config)) {
        Ok(condition) => {
            info!(%condition, "application exiting");
            condition.into()
        }
        Err(err) => {
            error!(%err, "startup failed");
            ExitCode::from(BOOTSTRAP_FAILURE_CODE)
        }
    }
}

async fn run(config: SessionConfig) -> Result<ExitCondition> {
    let shutdown = CancellationToken::new();
    let signal_task = install_termination_handler(shutdown.clone())?;

    let platform = TokioPlatform::new(shutdown.clone());
    let mut supervisor = Supervisor::new(platform, config, shutdown);
    let condition = supervisor.run().await;

    signal_task.abort();
    Ok(condition)
}

fn load_config(path: Option<&Path>) -> Result<SessionConfig> {
    match path {
        Some(path) => SessionConfig::load_from_path(path),
        None => Ok(SessionConfig::default()),
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
