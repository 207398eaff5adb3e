//! Run lifecycle: cancellation wiring, final join and byte total.

use crate::config::Config;
use crate::connector::Connector;
use crate::counter::ByteCounter;
use crate::dispatcher::{DispatchSettings, DispatchStats, Dispatcher};
use crate::error::RunError;
use crate::frame::Frame;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Exit status used when a second interrupt forces the process down.
const FORCED_EXIT_CODE: i32 = 130;

/// Outcome of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub bytes_written: u64,
    pub dispatch: DispatchStats,
}

impl RunSummary {
    pub fn mebibytes(&self) -> u64 {
        self.bytes_written / (1 << 20)
    }
}

/// Cancel `shutdown` on the first interrupt; exit immediately on the second.
pub fn install_interrupt_handler(shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Unable to listen for interrupts");
            return;
        }
        info!("Got interrupt, shutting down");
        shutdown.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Second interrupt, exiting without waiting for connections");
            std::process::exit(FORCED_EXIT_CODE);
        }
    })
}

/// Cancel `shutdown` once `duration` has elapsed.
pub fn install_deadline(shutdown: CancellationToken, duration: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = tokio::time::sleep(duration) => {
                info!(secs = duration.as_secs_f64(), "Run duration elapsed, shutting down");
                shutdown.cancel();
            }
        }
    })
}

/// Stream `frame` until `shutdown` fires (or one pass completes in run-once
/// mode), then join every worker and read the byte total.
pub async fn run<C: Connector>(
    config: &Config,
    frame: &Frame,
    connector: C,
    shutdown: CancellationToken,
) -> Result<RunSummary, RunError> {
    if let Some(duration) = config.duration {
        install_deadline(shutdown.clone(), duration);
    }

    let counter = ByteCounter::start();
    let tracker = TaskTracker::new();

    let dispatch = Dispatcher::new(
        DispatchSettings::from(config),
        frame.clone(),
        connector,
        counter.reporter(),
        shutdown.clone(),
        tracker.clone(),
    )
    .run()
    .await;

    tracker.close();
    info!(workers = tracker.len(), "Waiting for connections to finish");
    tracker.wait().await;

    let bytes_written = counter.total().await?;
    let summary = RunSummary {
        bytes_written,
        dispatch,
    };
    info!(
        bytes = summary.bytes_written,
        mib = summary.mebibytes(),
        spawned = dispatch.spawned,
        failures = dispatch.failures,
        closed = dispatch.closed,
        frames = dispatch.written,
        "Total written"
    );
    Ok(summary)
}
