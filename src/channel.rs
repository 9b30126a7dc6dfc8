//! Peer Channel: the duplex byte stream to the real-time peer.
//!
//! [`PeerChannel`] is the capability the session needs from a connection.
//! [`LocalSocketChannel`] implements it on top of an `interprocess` local
//! socket whose name is derived from the peer's component identifier, so the
//! peer only has to listen on the same identifier.
//!
//! ## Semantics
//!
//! - `send` makes one non-blocking write attempt and reports the byte count.
//!   Short writes are visible to the caller and never retried here. A peer
//!   that stops reading fills the socket buffer; the attempt then fails with
//!   [`io::ErrorKind::WouldBlock`] instead of waiting.
//! - `recv` performs a single read of at most `buf.len()` bytes, bounded by
//!   the receive timeout. Expiry is reported as [`io::ErrorKind::TimedOut`].
//! - `readable` resolves once a `recv` would not block: data is buffered,
//!   the peer closed the stream, or the stream failed. A failure observed
//!   while waiting is kept and returned by the next `recv`.

use std::future::{poll_fn, Future};
use std::io;
use std::pin::Pin;
use std::task::Poll;
use std::time::Duration;

use interprocess::local_socket::tokio::{prelude::*, RecvHalf, SendHalf, Stream};
use interprocess::local_socket::{GenericNamespaced, ToNsName};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::debug;
use uuid::Uuid;

/// Boxed future returned by channel operations.
pub type ChannelFuture<'a, T> = Pin<Box<dyn Future<Output = io::Result<T>> + 'a>>;

/// Duplex byte stream to the peer.
pub trait PeerChannel {
    /// Bound every subsequent `recv` by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::InvalidInput`] for a zero timeout.
    fn set_recv_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Resolve when the next `recv` will not block.
    fn readable(&mut self) -> ChannelFuture<'_, ()>;

    /// Write `buf` with a single write attempt that does not wait for the
    /// peer to drain its buffer.
    fn send<'a>(&'a mut self, buf: &'a [u8]) -> ChannelFuture<'a, usize>;

    /// Read at most `buf.len()` bytes with a single read call.
    fn recv<'a>(&'a mut self, buf: &'a mut [u8]) -> ChannelFuture<'a, usize>;

    /// Shut the stream down. The channel must not be used afterwards.
    fn close(&mut self) -> ChannelFuture<'_, ()>;
}

/// Local socket name for the peer with identifier `peer`.
#[must_use]
pub fn socket_name(peer: &Uuid) -> String {
    format!("intercore-{}", peer.hyphenated())
}

/// Open a connection to the peer identified by `peer`.
///
/// # Errors
///
/// Returns the underlying I/O error if the name is not valid on this platform
/// or nobody is listening on it.
pub async fn connect_peer(peer: &Uuid) -> io::Result<LocalSocketChannel> {
    let name = socket_name(peer);
    let ns_name = name.as_str().to_ns_name::<GenericNamespaced>()?;
    let stream = Stream::connect(ns_name).await?;
    debug!(socket = %name, "peer connection established");
    Ok(LocalSocketChannel::new(stream))
}

/// [`PeerChannel`] over an `interprocess` tokio local socket.
pub struct LocalSocketChannel {
    reader: BufReader<RecvHalf>,
    writer: SendHalf,
    recv_timeout: Option<Duration>,
    pending_error: Option<io::Error>,
}

impl LocalSocketChannel {
    /// Wrap an already connected stream.
    #[must_use]
    pub fn new(stream: Stream) -> Self {
        let (reader, writer) = stream.split();
        Self {
            reader: BufReader::new(reader),
            writer,
            recv_timeout: None,
            pending_error: None,
        }
    }
}

impl PeerChannel for LocalSocketChannel {
    fn set_recv_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        if timeout.is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "receive timeout must be greater than zero",
            ));
        }
        self.recv_timeout = Some(timeout);
        Ok(())
    }

    fn readable(&mut self) -> ChannelFuture<'_, ()> {
        Box::pin(async move {
            if self.pending_error.is_some() || !self.reader.buffer().is_empty() {
                return Ok(());
            }
            // Fill without consuming; EOF shows up as an empty buffer and
            // counts as readable, like a closed socket does for poll(2).
            if let Err(err) = self.reader.fill_buf().await {
                self.pending_error = Some(err);
            }
            Ok(())
        })
    }

    fn send<'a>(&'a mut self, buf: &'a [u8]) -> ChannelFuture<'a, usize> {
        Box::pin(async move {
            let mut writer = Pin::new(&mut self.writer);
            poll_fn(|cx| match writer.as_mut().poll_write(cx, buf) {
                Poll::Pending => Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::WouldBlock,
                    "peer is not accepting data",
                ))),
                ready => ready,
            })
            .await
        })
    }

    fn recv<'a>(&'a mut self, buf: &'a mut [u8]) -> ChannelFuture<'a, usize> {
        Box::pin(async move {
            if let Some(err) = self.pending_error.take() {
                return Err(err);
            }
            match self.recv_timeout {
                Some(limit) => tokio::time::timeout(limit, self.reader.read(buf))
                    .await
                    .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "receive timed out"))?,
                None => self.reader.read(buf).await,
            }
        })
    }

    fn close(&mut self) -> ChannelFuture<'_, ()> {
        Box::pin(async move { self.writer.shutdown().await })
    }
}
