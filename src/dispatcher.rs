//! Dispatcher control loop.
//!
//! Keeps the worker population at N and the work queue full. The loop waits
//! on three things, in priority order:
//!
//! 1. shutdown requested: stop spawning, close the queue, exit
//! 2. a worker retired: spawn a replacement (after backoff) unless shutting down
//! 3. queue capacity: enqueue another copy of the frame
//!
//! The bounded queue is the only throttle; when it is full the enqueue
//! simply stays pending while the other two branches remain live.
//!
//! In run-once mode the enqueue branch stops after N copies, plus one for
//! every copy lost to a write failure, and the loop ends once N copies have
//! been written in full. Failures until then are replaced as usual.

use crate::backoff::Backoff;
use crate::config::{BackoffConfig, Config};
use crate::connector::Connector;
use crate::counter::ByteReporter;
use crate::error::WorkerError;
use crate::events::{retirement_channel, RetirementSignal, WorkerEvent};
use crate::frame::Frame;
use crate::queue::{work_queue, WorkReceiver};
use crate::worker::ConnectionWorker;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Dispatcher knobs taken from the resolved configuration.
#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    pub connections: usize,
    pub once: bool,
    pub backoff: BackoffConfig,
}

impl From<&Config> for DispatchSettings {
    fn from(config: &Config) -> Self {
        Self {
            connections: config.connections,
            once: config.once,
            backoff: config.backoff,
        }
    }
}

/// Counters collected over one dispatcher run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    /// Workers started, initial population included.
    pub spawned: u64,
    /// Dial or write failures observed.
    pub failures: u64,
    /// Workers that reported a graceful close while the loop was running.
    pub closed: u64,
    /// Frame copies put on the work queue.
    pub enqueued: u64,
    /// Frame copies written in full while the loop was running.
    pub written: u64,
    /// Replacements started without delay because their predecessor had
    /// streamed.
    pub immediate: u64,
}

pub struct Dispatcher<C: Connector> {
    settings: DispatchSettings,
    frame: Frame,
    connector: Arc<C>,
    reporter: ByteReporter,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl<C: Connector> Dispatcher<C> {
    /// Workers are spawned on `tracker`; the caller joins them after
    /// [`Dispatcher::run`] returns.
    pub fn new(
        settings: DispatchSettings,
        frame: Frame,
        connector: C,
        reporter: ByteReporter,
        shutdown: CancellationToken,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            settings,
            frame,
            connector: Arc::new(connector),
            reporter,
            shutdown,
            tracker,
        }
    }

    /// Run until shutdown, or until the single pass is written in run-once mode.
    pub async fn run(self) -> DispatchStats {
        let Dispatcher {
            settings,
            frame,
            connector,
            reporter,
            shutdown,
            tracker,
        } = self;

        let (work_tx, work_rx) = work_queue(settings.connections);
        let (retirement, mut events) = retirement_channel(settings.connections);
        let mut population = Population {
            connector,
            work: work_rx,
            reporter,
            retirement,
            shutdown: shutdown.clone(),
            tracker,
            next_id: 0,
        };
        let mut backoff = Backoff::new(settings.backoff);
        let mut stats = DispatchStats::default();
        let pass = settings.connections as u64;
        // Run-once copies taken off the queue by workers that then failed
        let mut lost: u64 = 0;

        for _ in 0..settings.connections {
            population.spawn(Duration::ZERO);
            stats.spawned += 1;
        }
        info!(
            connections = settings.connections,
            once = settings.once,
            frame_bytes = frame.len(),
            "Dispatcher started"
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, closing work queue");
                    break;
                }

                Some(event) = events.recv() => {
                    match event {
                        WorkerEvent::FrameWritten { worker } => {
                            stats.written += 1;
                            if settings.once && stats.written >= pass {
                                info!(
                                    worker,
                                    frames = stats.written,
                                    "Single pass written, closing work queue"
                                );
                                break;
                            }
                        }
                        WorkerEvent::Failed { worker, reason, streamed } => {
                            stats.failures += 1;
                            if matches!(reason, WorkerError::Write { .. }) {
                                lost += 1;
                            }
                            // A retirement racing with shutdown is never replaced
                            if shutdown.is_cancelled() {
                                debug!(worker, "Not replacing worker during shutdown");
                            } else {
                                if streamed {
                                    backoff.reset();
                                }
                                let delay = backoff.next_delay();
                                if delay.is_zero() {
                                    stats.immediate += 1;
                                }
                                warn!(
                                    worker,
                                    error = %reason,
                                    delay_ms = delay.as_millis() as u64,
                                    "Worker retired, spawning replacement"
                                );
                                population.spawn(delay);
                                stats.spawned += 1;
                            }
                        }
                        WorkerEvent::ClosedGracefully { worker } => {
                            stats.closed += 1;
                            debug!(worker, "Worker closed");
                        }
                    }
                }

                sent = work_tx.send(frame.work_item()), if !settings.once || stats.enqueued < pass + lost => {
                    if !sent {
                        warn!("Work queue has no consumers left");
                        break;
                    }
                    stats.enqueued += 1;
                    if settings.once && stats.enqueued == pass + lost {
                        debug!(frames = stats.enqueued, "Single pass queued");
                    }
                }
            }
        }

        drop(work_tx);
        debug!(
            spawned = stats.spawned,
            failures = stats.failures,
            enqueued = stats.enqueued,
            written = stats.written,
            "Dispatcher stopped"
        );
        stats
    }
}

/// Spawns connection workers sharing one queue, reporter and signal.
struct Population<C: Connector> {
    connector: Arc<C>,
    work: WorkReceiver,
    reporter: ByteReporter,
    retirement: RetirementSignal,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    next_id: u64,
}

impl<C: Connector> Population<C> {
    fn spawn(&mut self, delay: Duration) {
        let worker = ConnectionWorker {
            id: self.next_id,
            connector: Arc::clone(&self.connector),
            work: self.work.clone(),
            reporter: self.reporter.clone(),
            retirement: self.retirement.clone(),
            shutdown: self.shutdown.clone(),
            delay,
        };
        self.next_id += 1;
        self.tracker.spawn(worker.run());
    }
}
