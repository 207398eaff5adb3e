//! Worker lifecycle events.
//!
//! Workers announce every completed frame and how they ended; the dispatcher
//! consumes the events and applies its replacement and run-once policy.
//! Failure detection lives in the worker, recovery policy lives in the
//! dispatcher.

use crate::error::WorkerError;
use tokio::sync::mpsc;
use tracing::trace;

/// Progress or end of a worker.
#[derive(Debug)]
pub enum WorkerEvent {
    /// One frame copy was written in full.
    FrameWritten { worker: u64 },
    /// Dial or write failure. `streamed` is true if the worker completed at
    /// least one frame write before failing.
    Failed {
        worker: u64,
        reason: WorkerError,
        streamed: bool,
    },
    /// The work queue closed; the worker exited without error.
    ClosedGracefully { worker: u64 },
}

impl WorkerEvent {
    pub fn worker(&self) -> u64 {
        match self {
            WorkerEvent::FrameWritten { worker }
            | WorkerEvent::Failed { worker, .. }
            | WorkerEvent::ClosedGracefully { worker } => *worker,
        }
    }
}

/// Create a retirement channel.
///
/// A full channel makes workers wait in [`RetirementSignal::notify`]; the
/// dispatcher drains it for as long as it runs and dropping the receiving
/// half releases every waiting sender.
pub fn retirement_channel(capacity: usize) -> (RetirementSignal, RetirementEvents) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (RetirementSignal { tx }, RetirementEvents { rx })
}

/// Sending half, cloned into every worker.
#[derive(Debug, Clone)]
pub struct RetirementSignal {
    tx: mpsc::Sender<WorkerEvent>,
}

impl RetirementSignal {
    pub async fn notify(&self, event: WorkerEvent) {
        if let Err(e) = self.tx.send(event).await {
            // Dispatcher already stopped; nobody will replace this worker
            trace!(worker = e.0.worker(), "Worker event after dispatcher exit");
        }
    }
}

/// Receiving half, owned by the dispatcher.
#[derive(Debug)]
pub struct RetirementEvents {
    rx: mpsc::Receiver<WorkerEvent>,
}

impl RetirementEvents {
    pub async fn recv(&mut self) -> Option<WorkerEvent> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[tokio::test]
    async fn test_delivers_events_in_order() {
        let (signal, mut events) = retirement_channel(3);
        signal
            .notify(WorkerEvent::Failed {
                worker: 1,
                reason: WorkerError::Dial {
                    addr: "localhost:1".to_string(),
                    source: io::Error::from(io::ErrorKind::ConnectionRefused),
                },
                streamed: false,
            })
            .await;
        signal.notify(WorkerEvent::FrameWritten { worker: 2 }).await;
        signal.notify(WorkerEvent::ClosedGracefully { worker: 2 }).await;

        let first = events.recv().await.unwrap();
        assert!(matches!(first, WorkerEvent::Failed { worker: 1, streamed: false, .. }));
        assert!(matches!(
            events.recv().await.unwrap(),
            WorkerEvent::FrameWritten { worker: 2 }
        ));
        assert_eq!(events.recv().await.unwrap().worker(), 2);
    }

    #[tokio::test]
    async fn test_notify_after_receiver_dropped() {
        let (signal, events) = retirement_channel(1);
        drop(events);
        signal.notify(WorkerEvent::ClosedGracefully { worker: 3 }).await;
    }
}
