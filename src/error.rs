//! Error types.
//!
//! Startup errors (`ImageDecodeError`) are fatal and surface from `main`.
//! `WorkerError` never propagates as control flow: it travels as data inside
//! a retirement event so the dispatcher can decide on a replacement.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The source image could not be turned into pixels.
#[derive(Debug, Error)]
pub enum ImageDecodeError {
    /// The file could not be read.
    #[error("failed to read image '{}': {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    /// Unsupported format, or a truncated or corrupt file.
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Why a connection worker retired.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The TCP connection could not be established (includes timeouts).
    #[error("dial {addr}: {source}")]
    Dial { addr: String, source: io::Error },

    /// A socket write failed after `written` bytes on this connection.
    #[error("write failed after {written} bytes: {source}")]
    Write { written: u64, source: io::Error },
}

/// Errors from the streaming run itself, after startup.
#[derive(Debug, Error)]
pub enum RunError {
    /// The byte aggregation task panicked or was cancelled.
    #[error("byte counter task failed: {0}")]
    Counter(#[from] tokio::task::JoinError),
}
