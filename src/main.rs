//! pixelstream: streams an image to a pixelflut canvas.
//!
//! The image is serialized once into `PX <x> <y> <color>` commands in a
//! random order, then written over N concurrent TCP connections until
//! interrupted:
//! - Failed connections are replaced, with bounded exponential backoff
//! - One interrupt drains the connections and reports the bytes written
//! - Run-once mode sends a single pass per connection and exits
//! - Configuration via CLI arguments or TOML file

mod backoff;
mod config;
mod connector;
mod counter;
mod dispatcher;
mod error;
mod events;
mod frame;
mod lifecycle;
mod pixel;
mod queue;
#[cfg(test)]
mod testing;
mod worker;

use config::Config;
use connector::TcpConnector;
use frame::FrameBuilder;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        image = %config.image.display(),
        host = %config.host,
        x = config.offset_x,
        y = config.offset_y,
        connections = config.connections,
        once = config.once,
        "Starting pixelstream"
    );

    let seed = config.resolve_seed();
    if !config.deterministic {
        info!(seed, "rand seed");
    }

    // Nothing to stream without an image; decode errors end the process here
    let image = frame::load_image(&config.image)?;
    let frame = FrameBuilder::new(config.offset_x, config.offset_y, seed).build(&image);
    info!(pixels = frame.pixel_count(), "Image loaded");
    info!(bytes = frame.len(), "Length of pixel data");
    if frame.is_empty() {
        warn!("Image has no pixels, nothing to stream");
        return Ok(());
    }

    let mut runtime = tokio::runtime::Builder::new_multi_thread();
    runtime.enable_all();
    if let Some(threads) = config.threads {
        runtime.worker_threads(threads);
    }
    let runtime = runtime.build()?;

    runtime.block_on(async {
        let shutdown = CancellationToken::new();
        lifecycle::install_interrupt_handler(shutdown.clone());

        let connector = TcpConnector::from_config(&config);
        lifecycle::run(&config, &frame, connector, shutdown).await
    })?;

    Ok(())
}
