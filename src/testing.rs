//! Connector doubles for tests.

use crate::connector::Connector;
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;

/// Every dial fails with `ConnectionRefused`.
#[derive(Debug, Default)]
pub struct FailingConnector {
    attempts: AtomicUsize,
}

impl FailingConnector {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Connector for FailingConnector {
    type Stream = tokio::io::Sink;

    fn addr(&self) -> &str {
        "unreachable:1234"
    }

    async fn connect(&self) -> io::Result<Self::Stream> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Err(io::Error::from(io::ErrorKind::ConnectionRefused))
    }
}

/// Hands out scripted `tokio_test` mocks in order, then refuses.
pub struct MockConnector {
    mocks: Mutex<VecDeque<tokio_test::io::Mock>>,
}

impl MockConnector {
    pub fn new(mocks: Vec<tokio_test::io::Mock>) -> Self {
        Self {
            mocks: Mutex::new(mocks.into()),
        }
    }
}

impl Connector for MockConnector {
    type Stream = tokio_test::io::Mock;

    fn addr(&self) -> &str {
        "mock:1234"
    }

    async fn connect(&self) -> io::Result<Self::Stream> {
        let next = self.mocks.lock().unwrap().pop_front();
        next.ok_or_else(|| io::Error::from(io::ErrorKind::ConnectionRefused))
    }
}

/// Accepts every write, at most `chunk` bytes at a time, and records sizes.
///
/// Optionally refuses the first dials, and optionally breaks every stream
/// once it has accepted a fixed number of bytes.
pub struct RecordingConnector {
    chunk: usize,
    writes: Arc<Mutex<Vec<usize>>>,
    connections: AtomicUsize,
    attempts: AtomicUsize,
    refuse: usize,
    limit: Option<usize>,
    limited: usize,
}

impl RecordingConnector {
    pub fn new(chunk: usize) -> Self {
        Self {
            chunk,
            writes: Arc::new(Mutex::new(Vec::new())),
            connections: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
            refuse: 0,
            limit: None,
            limited: 0,
        }
    }

    /// Refuse the first `dials` connection attempts.
    pub fn refuse_first(mut self, dials: usize) -> Self {
        self.refuse = dials;
        self
    }

    /// Fail every write with `BrokenPipe` after `bytes` were accepted on
    /// that connection.
    pub fn break_after(mut self, bytes: usize) -> Self {
        self.limit = Some(bytes);
        self.limited = usize::MAX;
        self
    }

    /// Like [`RecordingConnector::break_after`], for the first connection only.
    pub fn break_first(mut self, bytes: usize) -> Self {
        self.limit = Some(bytes);
        self.limited = 1;
        self
    }

    /// Number of successful dials.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Sizes of all accepted writes across all connections.
    pub fn writes(&self) -> Arc<Mutex<Vec<usize>>> {
        Arc::clone(&self.writes)
    }
}

impl Connector for RecordingConnector {
    type Stream = RecordingStream;

    fn addr(&self) -> &str {
        "recording:1234"
    }

    async fn connect(&self) -> io::Result<Self::Stream> {
        if self.attempts.fetch_add(1, Ordering::SeqCst) < self.refuse {
            tokio::task::yield_now().await;
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused));
        }
        let index = self.connections.fetch_add(1, Ordering::SeqCst);
        Ok(RecordingStream {
            chunk: self.chunk,
            remaining: if index < self.limited { self.limit } else { None },
            writes: Arc::clone(&self.writes),
        })
    }
}

pub struct RecordingStream {
    chunk: usize,
    remaining: Option<usize>,
    writes: Arc<Mutex<Vec<usize>>>,
}

impl AsyncWrite for RecordingStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut n = buf.len().min(self.chunk);
        if let Some(remaining) = self.remaining {
            if remaining == 0 {
                return Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)));
            }
            n = n.min(remaining);
            self.remaining = Some(remaining - n);
        }
        self.writes.lock().unwrap().push(n);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
