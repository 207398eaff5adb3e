//! Aggregation of bytes written across all connections.
//!
//! Workers hold a [`ByteReporter`] and only ever add to the total. A single
//! task sums the reports; it finishes once every reporter has been dropped,
//! so [`ByteCounter::total`] can only resolve after all workers are gone.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// Write-only handle used by workers.
#[derive(Debug, Clone)]
pub struct ByteReporter {
    tx: mpsc::UnboundedSender<u64>,
}

impl ByteReporter {
    /// Record `bytes` as successfully written.
    pub fn report(&self, bytes: usize) {
        if bytes == 0 {
            return;
        }
        // The aggregator lives until the last reporter is gone
        let _ = self.tx.send(bytes as u64);
    }
}

/// Running total of bytes written, read once at shutdown.
pub struct ByteCounter {
    tx: mpsc::UnboundedSender<u64>,
    aggregator: JoinHandle<u64>,
}

impl ByteCounter {
    /// Start the aggregation task on the current runtime.
    pub fn start() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<u64>();
        let aggregator = tokio::spawn(async move {
            let mut total: u64 = 0;
            while let Some(bytes) = rx.recv().await {
                total += bytes;
            }
            trace!(total, "Byte counter drained");
            total
        });

        Self { tx, aggregator }
    }

    pub fn reporter(&self) -> ByteReporter {
        ByteReporter {
            tx: self.tx.clone(),
        }
    }

    /// Final total. Waits until every outstanding reporter is dropped.
    pub async fn total(self) -> Result<u64, tokio::task::JoinError> {
        drop(self.tx);
        self.aggregator.await
    }
}
