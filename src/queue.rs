//! Bounded work queue between the dispatcher and the workers.
//!
//! Single producer, many consumers. The receiver is shared behind an async
//! mutex; whichever worker holds the lock takes the next item.

use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Create a queue holding at most `depth` pending frames.
pub fn work_queue(depth: usize) -> (WorkSender, WorkReceiver) {
    let (tx, rx) = mpsc::channel(depth.max(1));
    (
        WorkSender { tx },
        WorkReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

/// Producer half. Dropping it closes the queue once buffered items drain.
#[derive(Debug)]
pub struct WorkSender {
    tx: mpsc::Sender<Bytes>,
}

impl WorkSender {
    /// Wait for capacity, then enqueue one item.
    ///
    /// Cancel safe: if the future is dropped before capacity is available
    /// nothing is enqueued. Returns false if every receiver is gone.
    pub async fn send(&self, item: Bytes) -> bool {
        match self.tx.reserve().await {
            Ok(permit) => {
                permit.send(item);
                true
            }
            Err(_) => false,
        }
    }
}

/// Consumer half, cloned into every worker.
#[derive(Debug, Clone)]
pub struct WorkReceiver {
    rx: Arc<Mutex<mpsc::Receiver<Bytes>>>,
}

impl WorkReceiver {
    /// Next item, or `None` once the sender is dropped and the queue is empty.
    pub async fn next(&self) -> Option<Bytes> {
        self.rx.lock().await.recv().await
    }
}
