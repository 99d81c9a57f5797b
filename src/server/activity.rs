// Connection activity tracking
// Tells the connection task which timeout currently applies

use std::cell::Cell;
use std::io;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::config::PerformanceConfig;

/// Per-connection time limits
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// From the first byte of a request (or from accept) to a parsed head
    pub read: Duration,
    /// Response in progress, and the close after shutdown or expiry
    pub write: Duration,
    /// Keep-alive wait between requests
    pub idle: Duration,
}

impl Limits {
    pub const fn from_config(performance: &PerformanceConfig) -> Self {
        let write = Duration::from_secs(performance.write_timeout);
        // Without keep-alive hyper closes after the response; give it the write budget
        let idle = if performance.keep_alive_timeout > 0 {
            Duration::from_secs(performance.keep_alive_timeout)
        } else {
            write
        };
        Self {
            read: Duration::from_secs(performance.read_timeout),
            write,
            idle,
        }
    }
}

/// What the connection is waiting on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ReadingHead,
    Responding,
    Idle,
}

/// Shared between the stream, the service and the connection task
pub struct Activity {
    last: Cell<Instant>,
    request_started: Cell<Option<Instant>>,
    in_flight: Cell<usize>,
    /// Wakes the connection task when a tighter deadline starts
    pub changed: Notify,
}

impl Activity {
    /// A fresh connection owes its first request head within the read limit
    pub fn new() -> Rc<Self> {
        let now = Instant::now();
        Rc::new(Self {
            last: Cell::new(now),
            request_started: Cell::new(Some(now)),
            in_flight: Cell::new(0),
            changed: Notify::new(),
        })
    }

    pub fn begin_request(&self) {
        self.in_flight.set(self.in_flight.get() + 1);
        self.request_started.set(None);
        self.last.set(Instant::now());
    }

    pub fn end_request(&self) {
        self.in_flight.set(self.in_flight.get().saturating_sub(1));
        self.last.set(Instant::now());
    }

    fn record_read(&self) {
        let now = Instant::now();
        self.last.set(now);
        if self.in_flight.get() == 0 && self.request_started.get().is_none() {
            self.request_started.set(Some(now));
            self.changed.notify_one();
        }
    }

    fn record_write(&self) {
        self.last.set(Instant::now());
    }

    /// Current deadline and the phase it belongs to
    pub fn deadline(&self, limits: &Limits) -> (Instant, Phase) {
        if self.in_flight.get() > 0 {
            (self.last.get() + limits.write, Phase::Responding)
        } else if let Some(started) = self.request_started.get() {
            (started + limits.read, Phase::ReadingHead)
        } else {
            (self.last.get() + limits.idle, Phase::Idle)
        }
    }
}

/// `TcpStream` that reports reads and writes to its `Activity`
pub struct TrackedStream {
    inner: TcpStream,
    activity: Rc<Activity>,
}

impl TrackedStream {
    pub const fn new(inner: TcpStream, activity: Rc<Activity>) -> Self {
        Self { inner, activity }
    }
}

impl AsyncRead for TrackedStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let res = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = res {
            if buf.filled().len() > before {
                this.activity.record_read();
            }
        }
        res
    }
}

impl AsyncWrite for TrackedStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let res = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = res {
            if n > 0 {
                this.activity.record_write();
            }
        }
        res
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let res = Pin::new(&mut this.inner).poll_write_vectored(cx, bufs);
        if let Poll::Ready(Ok(n)) = res {
            if n > 0 {
                this.activity.record_write();
            }
        }
        res
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
