#![forbid(unsafe_code)]

//! `intercore-peer` — development stand-in for the real-time application.
//!
//! Listens on the local socket derived from the peer identifier, echoes every
//! chunk it receives, and optionally answers with the reboot command after a
//! number of messages so the restart path can be exercised without hardware.

use clap::Parser;
use interprocess::local_socket::{tokio::prelude::*, GenericNamespaced, ListenerOptions, ToNsName};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{info, info_span, warn, Instrument};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use intercore_comms::channel::socket_name;
use intercore_comms::config::DEFAULT_PEER_ID;
use intercore_comms::receiver::{render_printable, REBOOT_COMMAND};
use intercore_comms::AppError;

#[derive(Debug, Parser)]
#[command(
    name = "intercore-peer",
    about = "Local stand-in for the real-time intercore peer",
    version,
    long_about = None
)]
struct Cli {
    /// Component identifier to listen on (must match the application's `peer_id`).
    #[arg(long, default_value = DEFAULT_PEER_ID)]
    peer_id: Uuid,

    /// Send the reboot command after this many messages on a connection.
    #[arg(long)]
    reboot_after: Option<u32>,

    /// Do not echo received messages back.
    #[arg(long)]
    silent: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), AppError> {
    let args = Cli::parse();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init()
        .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?;

    let name = socket_name(&args.peer_id);
    let listener_name = name
        .as_str()
        .to_ns_name::<GenericNamespaced>()
        .map_err(|err| AppError::Ipc(format!("invalid socket name '{name}': {err}")))?;
    let listener = ListenerOptions::new()
        .name(listener_name)
        .create_tokio()
        .map_err(|err| AppError::Ipc(format!("failed to create listener: {err}")))?;

    info!(socket = %name, "peer listening");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("peer shutting down");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok(stream) => {
                    serve(stream, &args)
                        .instrument(info_span!("peer_conn"))
                        .await;
                }
                Err(err) => warn!(%err, "accept failed"),
            }
        }
    }
}

/// Serve one connection until the application hangs up.
async fn serve(stream: interprocess::local_socket::tokio::Stream, args: &Cli) {
    let (mut reader, mut writer) = stream.split();
    let mut buf = [0_u8; 64];
    let mut messages: u32 = 0;

    info!("application connected");
    loop {
        let received = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(received) => received,
            Err(err) => {
                warn!(%err, "read failed");
                break;
            }
        };
        let chunk = &buf[..received];
        info!(bytes = received, payload = %render_printable(chunk), "received");
        messages += 1;

        // The reboot command goes out on its own so it is not merged with an
        // echo into one chunk.
        if args.reboot_after.is_some_and(|after| messages >= after) {
            info!("requesting reboot");
            if let Err(err) = writer.write_all(REBOOT_COMMAND).await {
                warn!(%err, "reboot request failed");
                break;
            }
            messages = 0;
        } else if !args.silent {
            if let Err(err) = writer.write_all(chunk).await {
                warn!(%err, "echo failed");
                break;
            }
        }
    }
    info!("application disconnected");
}
