//! Connection worker.
//!
//! Owns one connection for its whole life: dial, then write frames from the
//! work queue until the queue closes, shutdown is requested, or the socket
//! fails. A failed worker reports its retirement and exits; it never
//! reconnects by itself.

use crate::connector::Connector;
use crate::counter::ByteReporter;
use crate::error::WorkerError;
use crate::events::{RetirementSignal, WorkerEvent};
use crate::queue::WorkReceiver;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Everything a worker needs, handed over by the dispatcher.
pub struct ConnectionWorker<C: Connector> {
    pub id: u64,
    pub connector: Arc<C>,
    pub work: WorkReceiver,
    pub reporter: ByteReporter,
    pub retirement: RetirementSignal,
    pub shutdown: CancellationToken,
    /// Wait this long before dialing (reconnect backoff).
    pub delay: Duration,
}

impl<C: Connector> ConnectionWorker<C> {
    pub async fn run(self) {
        let id = self.id;

        if !self.delay.is_zero() {
            trace!(worker = id, delay = ?self.delay, "Delaying reconnect");
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = tokio::time::sleep(self.delay) => {}
            }
        }

        let connected = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return,
            result = self.connector.connect() => result,
        };

        let mut stream = match connected {
            Ok(stream) => stream,
            Err(source) => {
                let reason = WorkerError::Dial {
                    addr: self.connector.addr().to_string(),
                    source,
                };
                warn!(worker = id, error = %reason, "Connection failed");
                self.retire(reason, false).await;
                return;
            }
        };
        info!(worker = id, addr = self.connector.addr(), "Connected");

        let mut written: u64 = 0;
        let mut frames: u64 = 0;
        loop {
            // Shutdown wins over buffered work; an in-flight write is never interrupted
            let item = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => None,
                item = self.work.next() => item,
            };

            let Some(frame) = item else {
                break;
            };

            match write_frame(&mut stream, &frame, &self.reporter).await {
                Ok(n) => {
                    written += n as u64;
                    frames += 1;
                    debug!(worker = id, bytes = n, "Wrote frame");
                    self.retirement
                        .notify(WorkerEvent::FrameWritten { worker: id })
                        .await;
                }
                Err((n, source)) => {
                    written += n as u64;
                    let reason = WorkerError::Write { written, source };
                    warn!(worker = id, error = %reason, "Connection lost");
                    self.retire(reason, frames > 0).await;
                    return;
                }
            }
        }

        if let Err(e) = stream.shutdown().await {
            trace!(worker = id, error = %e, "Shutdown after close");
        }
        debug!(worker = id, frames, bytes = written, "Connection closed");
        self.retirement
            .notify(WorkerEvent::ClosedGracefully { worker: id })
            .await;
    }

    async fn retire(&self, reason: WorkerError, streamed: bool) {
        self.retirement
            .notify(WorkerEvent::Failed {
                worker: self.id,
                reason,
                streamed,
            })
            .await;
    }
}

/// Write `frame` fully, reporting every partial write as it happens.
///
/// On failure returns the bytes of this frame that did get written.
async fn write_frame<S>(
    stream: &mut S,
    frame: &[u8],
    reporter: &ByteReporter,
) -> Result<usize, (usize, io::Error)>
where
    S: AsyncWrite + Unpin,
{
    let mut offset = 0;
    while offset < frame.len() {
        match stream.write(&frame[offset..]).await {
            Ok(0) => {
                return Err((offset, io::Error::from(io::ErrorKind::WriteZero)));
            }
            Ok(n) => {
                offset += n;
                reporter.report(n);
                trace!(bytes = n, "Partial write");
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err((offset, e)),
        }
    }
    Ok(offset)
}
