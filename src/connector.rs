//! Outbound connection establishment.
//!
//! Workers dial through a [`Connector`] so tests can substitute in-memory
//! streams for real sockets.

use crate::config::Config;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::net::TcpStream;
use tracing::debug;

/// Something that can open a write stream to the canvas server.
pub trait Connector: Send + Sync + 'static {
    type Stream: AsyncWrite + Unpin + Send + 'static;

    /// Human readable peer address, for logs and errors.
    fn addr(&self) -> &str;

    fn connect(&self) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// Dials the configured `host:port` over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
    timeout: Duration,
    send_buffer: Option<usize>,
    no_delay: bool,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
            send_buffer: None,
            no_delay: false,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            send_buffer: config.send_buffer,
            no_delay: config.no_delay,
            ..Self::new(config.host.clone(), config.connect_timeout)
        }
    }

    fn configure(&self, stream: &TcpStream) -> io::Result<()> {
        if self.no_delay {
            stream.set_nodelay(true)?;
        }
        if let Some(size) = self.send_buffer {
            let socket = socket2::SockRef::from(stream);
            socket.set_send_buffer_size(size)?;
            let actual = socket.send_buffer_size()?;
            debug!(requested = size, actual, "Set send buffer size");
        }
        Ok(())
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn addr(&self) -> &str {
        &self.addr
    }

    async fn connect(&self) -> io::Result<TcpStream> {
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(self.addr.as_str()))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect timed out after {:?}", self.timeout),
                )
            })??;
        self.configure(&stream)?;
        Ok(stream)
    }
}
