//! Event loop capability and its tokio-backed implementation.
//!
//! The session never talks to tokio directly. It needs four things from an
//! event loop: register a periodic timer, register the peer channel for
//! readable events, wait for the next ready event, and release registrations.
//! [`EventLoop`] captures exactly that surface and [`Platform`] adds the two
//! per-session factories (create a loop, connect to the peer), which lets the
//! tests drive a session against a scripted fake.
//!
//! `run_once` reports the ready event instead of invoking a callback; the
//! session dispatches it to the sender or receiver. Events are reported one
//! per call, timers before the channel when both are ready.

use std::collections::BTreeMap;
use std::future::{poll_fn, Future};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::channel::{self, LocalSocketChannel, PeerChannel};

/// Identifier of one registration inside an event loop.
pub type RegistrationId = u64;

/// Owned handle to a registered periodic timer.
#[derive(Debug, PartialEq, Eq)]
pub struct TimerRegistration {
    id: RegistrationId,
}

impl TimerRegistration {
    /// Wrap a raw registration id. Only event loop implementations call this.
    #[must_use]
    pub fn new(id: RegistrationId) -> Self {
        Self { id }
    }

    /// Raw registration id.
    #[must_use]
    pub fn id(&self) -> RegistrationId {
        self.id
    }
}

/// Owned handle to a readable-event registration.
#[derive(Debug, PartialEq, Eq)]
pub struct IoRegistration {
    id: RegistrationId,
}

impl IoRegistration {
    /// Wrap a raw registration id. Only event loop implementations call this.
    #[must_use]
    pub fn new(id: RegistrationId) -> Self {
        Self { id }
    }

    /// Raw registration id.
    #[must_use]
    pub fn id(&self) -> RegistrationId {
        self.id
    }
}

/// A ready event reported by [`EventLoop::run_once`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Event {
    /// The timer with this id expired.
    Timer(RegistrationId),
    /// The channel registered under this id is readable.
    Readable(RegistrationId),
}

/// Result of one wait on the event loop.
#[derive(Debug)]
pub enum RunOutcome {
    /// An event is ready and must be dispatched.
    Dispatched(Event),
    /// The wait timed out with nothing ready.
    TimedOut,
    /// The wait was interrupted by an external signal.
    Interrupted,
    /// The wait itself failed.
    Failed(io::Error),
}

/// Boxed future returned by [`EventLoop::run_once`].
pub type RunFuture<'a> = Pin<Box<dyn Future<Output = RunOutcome> + 'a>>;

/// Minimal event loop capability used by a session.
pub trait EventLoop {
    /// Channel type this loop can watch.
    type Channel: PeerChannel;

    /// Register a timer that expires every `period`, first after one period.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the loop cannot hold another timer.
    fn register_timer(&mut self, period: Duration) -> io::Result<TimerRegistration>;

    /// Acknowledge an expiry of `timer` reported by `run_once`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the timer is unknown or has no pending expiry.
    fn consume_timer(&mut self, timer: &TimerRegistration) -> io::Result<()>;

    /// Watch `channel` for readable events.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the channel cannot be registered.
    fn register_readable(&mut self, channel: &Self::Channel) -> io::Result<IoRegistration>;

    /// Wait until an event is ready, `timeout` elapses, or the wait is
    /// interrupted. `None` waits indefinitely.
    fn run_once<'a>(
        &'a mut self,
        channel: Option<&'a mut Self::Channel>,
        timeout: Option<Duration>,
    ) -> RunFuture<'a>;

    /// Release a timer registration.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the registration is unknown to this loop.
    fn unregister_timer(&mut self, timer: TimerRegistration) -> io::Result<()>;

    /// Release a readable-event registration.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the registration is unknown to this loop.
    fn unregister_io(&mut self, io: IoRegistration) -> io::Result<()>;

    /// Close the loop. Registrations still held are dropped.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the loop could not be shut down cleanly.
    fn close(self) -> io::Result<()>;
}

/// Boxed future returned by [`Platform::connect`].
pub type ConnectFuture<'a, C> = Pin<Box<dyn Future<Output = io::Result<C>> + 'a>>;

/// Per-session factories for the event loop and the peer connection.
pub trait Platform {
    /// Peer connection type.
    type Channel: PeerChannel;
    /// Event loop type able to watch [`Self::Channel`].
    type Loop: EventLoop<Channel = Self::Channel>;

    /// Create a fresh event loop.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the loop cannot be created.
    fn create_event_loop(&mut self) -> io::Result<Self::Loop>;

    /// Connect to the peer with stable identifier `peer`.
    fn connect<'a>(&'a mut self, peer: &'a Uuid) -> ConnectFuture<'a, Self::Channel>;
}

struct TimerSlot {
    interval: Interval,
    pending: bool,
}

/// [`EventLoop`] running on the ambient tokio runtime.
///
/// Timers are tokio intervals; readability is delegated to
/// [`PeerChannel::readable`]. A cancelled `interrupt` token makes every wait
/// return [`RunOutcome::Interrupted`].
pub struct TokioEventLoop {
    timers: BTreeMap<RegistrationId, TimerSlot>,
    io: Option<RegistrationId>,
    ids: Arc<AtomicU64>,
    interrupt: CancellationToken,
}

impl TokioEventLoop {
    /// Create an empty loop drawing registration ids from `ids`.
    #[must_use]
    pub fn new(ids: Arc<AtomicU64>, interrupt: CancellationToken) -> Self {
        Self {
            timers: BTreeMap::new(),
            io: None,
            ids,
            interrupt,
        }
    }

    fn allocate_id(&self) -> RegistrationId {
        self.ids.fetch_add(1, Ordering::Relaxed)
    }
}

fn unknown_registration(id: RegistrationId) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("unknown registration {id}"),
    )
}

impl EventLoop for TokioEventLoop {
    type Channel = LocalSocketChannel;

    fn register_timer(&mut self, period: Duration) -> io::Result<TimerRegistration> {
        if period.is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "timer period must be greater than zero",
            ));
        }
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let id = self.allocate_id();
        self.timers.insert(
            id,
            TimerSlot {
                interval,
                pending: false,
            },
        );
        Ok(TimerRegistration::new(id))
    }

    fn consume_timer(&mut self, timer: &TimerRegistration) -> io::Result<()> {
        let slot = self
            .timers
            .get_mut(&timer.id())
            .ok_or_else(|| unknown_registration(timer.id()))?;
        if !slot.pending {
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "timer has no pending expiry",
            ));
        }
        slot.pending = false;
        Ok(())
    }

    fn register_readable(&mut self, _channel: &Self::Channel) -> io::Result<IoRegistration> {
        if self.io.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "a channel is already registered",
            ));
        }
        let id = self.allocate_id();
        self.io = Some(id);
        Ok(IoRegistration::new(id))
    }

    fn run_once<'a>(
        &'a mut self,
        channel: Option<&'a mut Self::Channel>,
        timeout: Option<Duration>,
    ) -> RunFuture<'a> {
        Box::pin(async move {
            let Self {
                timers,
                io,
                interrupt,
                ..
            } = self;
            let io = *io;

            let next_timer = poll_fn(|cx| {
                for (id, slot) in timers.iter_mut() {
                    if slot.interval.poll_tick(cx).is_ready() {
                        slot.pending = true;
                        return Poll::Ready(*id);
                    }
                }
                Poll::Pending
            });

            let readable = async {
                match (io, channel) {
                    (Some(id), Some(channel)) => match channel.readable().await {
                        Ok(()) => RunOutcome::Dispatched(Event::Readable(id)),
                        Err(err) => RunOutcome::Failed(err),
                    },
                    _ => std::future::pending().await,
                }
            };

            let expiry = async {
                match timeout {
                    Some(limit) => tokio::time::sleep(limit).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;

                () = interrupt.cancelled() => RunOutcome::Interrupted,
                id = next_timer => RunOutcome::Dispatched(Event::Timer(id)),
                outcome = readable => outcome,
                () = expiry => RunOutcome::TimedOut,
            }
        })
    }

    fn unregister_timer(&mut self, timer: TimerRegistration) -> io::Result<()> {
        self.timers
            .remove(&timer.id())
            .map(|_| ())
            .ok_or_else(|| unknown_registration(timer.id()))
    }

    fn unregister_io(&mut self, io: IoRegistration) -> io::Result<()> {
        match self.io {
            Some(id) if id == io.id() => {
                self.io = None;
                Ok(())
            }
            _ => Err(unknown_registration(io.id())),
        }
    }

    fn close(self) -> io::Result<()> {
        Ok(())
    }
}

/// [`Platform`] backed by tokio and `interprocess` local sockets.
///
/// Registration ids keep increasing across sessions so handles from a torn
/// down session can never alias a live one.
pub struct TokioPlatform {
    ids: Arc<AtomicU64>,
    interrupt: CancellationToken,
}

impl TokioPlatform {
    /// New platform whose loops are interrupted by `interrupt`.
    #[must_use]
    pub fn new(interrupt: CancellationToken) -> Self {
        Self {
            ids: Arc::new(AtomicU64::new(1)),
            interrupt,
        }
    }
}

impl Platform for TokioPlatform {
    type Channel = LocalSocketChannel;
    type Loop = TokioEventLoop;

    fn create_event_loop(&mut self) -> io::Result<Self::Loop> {
        Ok(TokioEventLoop::new(
            Arc::clone(&self.ids),
            self.interrupt.clone(),
        ))
    }

    fn connect<'a>(&'a mut self, peer: &'a Uuid) -> ConnectFuture<'a, Self::Channel> {
        Box::pin(channel::connect_peer(peer))
    }
}
