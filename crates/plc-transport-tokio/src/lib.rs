//! A [`plc_core::Socket`] backed by a real `tokio::net::TcpStream`.
//!
//! This is the collaborator a dialect crate hands to `Plc::spawn` (via its
//! socket factory closure) on any platform where the PLC gateway is reached
//! over plain TCP. Construction is lazy: [`TcpSocket::new`] only records the
//! address; the stream itself opens in [`Socket::connect`], matching
//! `plc-core`'s "fresh socket per connection attempt" contract.

use std::time::Duration;

use async_trait::async_trait;
use socket2::SockRef;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use plc_core::{Socket, Status};

/// Linger behavior applied to the socket once connected. `None` follows
/// the platform default (an immediate, kernel-async close).
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpSocketConfig {
    linger: Option<Duration>,
}

impl TcpSocketConfig {
    pub const fn new() -> Self {
        TcpSocketConfig { linger: None }
    }

    pub fn with_linger(mut self, linger: Option<Duration>) -> Self {
        self.linger = linger;
        self
    }
}

/// A not-yet-connected or connected TCP socket for one PLC gateway.
pub struct TcpSocket {
    host: String,
    port: u16,
    config: TcpSocketConfig,
    stream: Option<TcpStream>,
}

impl TcpSocket {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        TcpSocket {
            host: host.into(),
            port,
            config: TcpSocketConfig::new(),
            stream: None,
        }
    }

    pub fn with_config(mut self, config: TcpSocketConfig) -> Self {
        self.config = config;
        self
    }

    fn apply_socket_options(&self, stream: &TcpStream) {
        if let Some(linger) = self.config.linger {
            let sock_ref = SockRef::from(stream);
            if let Err(err) = sock_ref.set_linger(Some(linger)) {
                warn!(%err, "failed to set SO_LINGER");
            }
        }
        if let Err(err) = stream.set_nodelay(true) {
            warn!(%err, "failed to set TCP_NODELAY");
        }
    }
}

#[async_trait]
impl Socket for TcpSocket {
    async fn connect(&mut self) -> Status {
        match TcpStream::connect((self.host.as_str(), self.port)).await {
            Ok(stream) => {
                self.apply_socket_options(&stream);
                debug!(host = %self.host, port = self.port, "tcp connected");
                self.stream = Some(stream);
                Status::Ok
            }
            Err(err) => {
                warn!(%err, host = %self.host, port = self.port, "tcp connect failed");
                Status::Retry
            }
        }
    }

    async fn write_all(&mut self, buf: &[u8]) -> Status {
        let Some(stream) = self.stream.as_mut() else {
            return Status::NullPtr;
        };
        match stream.write_all(buf).await {
            Ok(()) => Status::Ok,
            Err(err) => {
                warn!(%err, "tcp write failed");
                Status::Retry
            }
        }
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Status> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(Status::NullPtr);
        };
        match stream.read(buf).await {
            Ok(n) => Ok(n),
            Err(err) => {
                warn!(%err, "tcp read failed");
                Err(Status::Retry)
            }
        }
    }

    async fn shutdown(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
    }
}
