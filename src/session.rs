//! Session Controller: one connect / run / teardown cycle.
//!
//! A session acquires, in order, an event loop, the send timer, the peer
//! connection, the receive timeout, and the readable registration. The first
//! step that fails records its [`ExitCondition`] and skips the rest. Whatever
//! was acquired is released on the way out, whether the session ended by a
//! failed init step, a failed handler, a signal, or a reboot command.
//!
//! While running, the controller waits on the event loop with no timeout and
//! dispatches each ready event to the [`PeriodicSender`] or
//! [`MessageReceiver`]. The exit condition is only checked between events, so
//! a handler always runs to completion.

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::channel::PeerChannel;
use crate::config::SessionConfig;
use crate::event_loop::{
    Event, EventLoop, IoRegistration, Platform, RunOutcome, TimerRegistration,
};
use crate::exit::{ExitCondition, ExitState};
use crate::receiver::MessageReceiver;
use crate::sender::PeriodicSender;

/// Resources held by a live session. Each is present only once acquired.
struct Resources<P: Platform> {
    event_loop: Option<P::Loop>,
    timer: Option<TimerRegistration>,
    channel: Option<P::Channel>,
    io: Option<IoRegistration>,
}

impl<P: Platform> Resources<P> {
    fn empty() -> Self {
        Self {
            event_loop: None,
            timer: None,
            channel: None,
            io: None,
        }
    }
}

/// Run one session against `platform` and return why it ended.
///
/// `sender` is borrowed rather than created here so its sequence counter
/// survives simulated reboots.
pub async fn run_session<P: Platform>(
    platform: &mut P,
    config: &SessionConfig,
    sender: &mut PeriodicSender,
    shutdown: &CancellationToken,
) -> ExitCondition {
    let span = info_span!("session", peer = %config.peer_id);
    async move {
        info!("running main loop");

        let mut state = ExitState::new(shutdown.clone());
        let mut resources = Resources::<P>::empty();
        let mut receiver = MessageReceiver::new();

        if let Err(condition) = initialize(platform, config, &mut resources).await {
            state.set(condition);
        }

        while state.is_running() {
            dispatch_once(&mut resources, sender, &mut receiver, &mut state).await;
        }

        teardown(resources).await;

        let condition = state.current();
        info!(%condition, "session ended");
        condition
    }
    .instrument(span)
    .await
}

/// Acquire every session resource, stopping at the first failure.
async fn initialize<P: Platform>(
    platform: &mut P,
    config: &SessionConfig,
    resources: &mut Resources<P>,
) -> Result<(), ExitCondition> {
    let event_loop = platform.create_event_loop().map_err(|err| {
        error!(%err, "could not create event loop");
        ExitCondition::EventLoopInitFailed
    })?;
    let event_loop = resources.event_loop.insert(event_loop);

    let timer = event_loop
        .register_timer(config.send_period())
        .map_err(|err| {
            error!(%err, "could not register send timer");
            ExitCondition::TimerInitFailed
        })?;
    resources.timer = Some(timer);

    let channel = platform.connect(&config.peer_id).await.map_err(|err| {
        error!(%err, peer = %config.peer_id, "unable to connect to peer");
        ExitCondition::ConnectFailed
    })?;
    let channel = resources.channel.insert(channel);

    channel
        .set_recv_timeout(config.recv_timeout())
        .map_err(|err| {
            error!(%err, "unable to set receive timeout");
            ExitCondition::SocketOptionFailed
        })?;

    let io = event_loop.register_readable(channel).map_err(|err| {
        error!(%err, "unable to register channel for readable events");
        ExitCondition::RegisterIoFailed
    })?;
    resources.io = Some(io);

    debug!("session initialized");
    Ok(())
}

/// Wait for one event and run its handler.
async fn dispatch_once<P: Platform>(
    resources: &mut Resources<P>,
    sender: &mut PeriodicSender,
    receiver: &mut MessageReceiver,
    state: &mut ExitState,
) {
    let (Some(event_loop), Some(timer), Some(channel)) = (
        resources.event_loop.as_mut(),
        resources.timer.as_ref(),
        resources.channel.as_mut(),
    ) else {
        // Unreachable after a successful init; treat as a loop failure.
        error!("dispatch attempted without initialized resources");
        state.set(ExitCondition::EventLoopRunFailed);
        return;
    };

    let outcome = event_loop.run_once(Some(&mut *channel), None).await;
    match outcome {
        RunOutcome::Dispatched(Event::Timer(id)) if id == timer.id() => {
            sender.on_timer(event_loop, timer, channel, state).await;
        }
        RunOutcome::Dispatched(Event::Readable(id))
            if resources.io.as_ref().is_some_and(|io| io.id() == id) =>
        {
            receiver.on_readable(channel, state).await;
        }
        RunOutcome::Dispatched(event) => {
            warn!(?event, "event for unknown registration ignored");
        }
        RunOutcome::TimedOut => {}
        RunOutcome::Interrupted => {
            debug!("event loop wait interrupted");
        }
        RunOutcome::Failed(err) if err.kind() == std::io::ErrorKind::Interrupted => {
            debug!(%err, "event loop wait interrupted");
        }
        RunOutcome::Failed(err) => {
            error!(%err, "event loop failed");
            state.set(ExitCondition::EventLoopRunFailed);
        }
    }
}

/// Release every acquired resource, logging failures and continuing.
async fn teardown<P: Platform>(resources: Resources<P>) {
    let Resources {
        event_loop,
        timer,
        channel,
        io,
    } = resources;

    if let Some(mut event_loop) = event_loop {
        if let Some(timer) = timer {
            if let Err(err) = event_loop.unregister_timer(timer) {
                warn!(%err, "could not dispose send timer");
            }
        }
        if let Some(io) = io {
            if let Err(err) = event_loop.unregister_io(io) {
                warn!(%err, "could not unregister channel");
            }
        }
        if let Err(err) = event_loop.close() {
            warn!(%err, "could not close event loop");
        }
    }

    if let Some(mut channel) = channel {
        info!("closing peer connection");
        if let Err(err) = channel.close().await {
            warn!(%err, "could not close peer connection");
        }
    }
}
