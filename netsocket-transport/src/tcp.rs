/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! Outbound TCP dialing.
//!
//! [`Connector`] is the only thing the session manager knows about the
//! network. [`TcpConnector`] resolves the endpoint host, prefers IPv4
//! addresses, and tries each address in turn until one accepts.

use async_trait::async_trait;
use log::{debug, info, warn};
use netsocket_types::Endpoint;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Error type for connection attempts.
///
/// Keeps the failure category so callers can tell an unresolvable host from
/// a refused or timed out connection.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectError {
    /// The host name did not resolve to any address.
    #[error("host '{host}' is unreachable: {reason}")]
    HostUnreachable { host: String, reason: String },
    /// Every resolved address refused or failed the connection.
    #[error("connection to {endpoint} failed: {reason}")]
    ConnectFailed {
        endpoint: Endpoint,
        kind: io::ErrorKind,
        reason: String,
    },
    /// No address accepted the connection within the configured timeout.
    #[error("connection to {endpoint} timed out after {after:?}")]
    Timeout { endpoint: Endpoint, after: Duration },
}

impl ConnectError {
    /// The underlying I/O error kind, if the failure came from the socket.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::ConnectFailed { kind, .. } => Some(*kind),
            Self::Timeout { .. } => Some(io::ErrorKind::TimedOut),
            Self::HostUnreachable { .. } => None,
        }
    }
}

/// Opens a duplex byte stream to an endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    async fn connect(&self, endpoint: &Endpoint) -> Result<Self::Stream, ConnectError>;
}

/// Tokio TCP connector.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    connect_timeout: Option<Duration>,
}

impl TcpConnector {
    /// A connector that waits for the OS connect timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the whole connect attempt (all resolved addresses) by `timeout`.
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    async fn resolve(endpoint: &Endpoint) -> Result<Vec<SocketAddr>, ConnectError> {
        let resolved = tokio::net::lookup_host((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|e| ConnectError::HostUnreachable {
                host: endpoint.host.clone(),
                reason: e.to_string(),
            })?;

        let mut addrs: Vec<SocketAddr> = resolved.collect();
        if addrs.is_empty() {
            return Err(ConnectError::HostUnreachable {
                host: endpoint.host.clone(),
                reason: "no addresses returned".to_string(),
            });
        }
        // Stable sort keeps resolver order within each family.
        addrs.sort_by_key(|addr| !addr.is_ipv4());
        Ok(addrs)
    }

    async fn dial(endpoint: &Endpoint) -> Result<TcpStream, ConnectError> {
        let addrs = Self::resolve(endpoint).await?;
        debug!("{endpoint} resolved to {addrs:?}");

        let mut last_error: Option<io::Error> = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!("Failed to set TCP_NODELAY on {addr}: {e}");
                    }
                    return Ok(stream);
                }
                Err(e) => {
                    debug!("Connect to {addr} failed: {e}");
                    last_error = Some(e);
                }
            }
        }

        let error = last_error
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no address tried"));
        Err(ConnectError::ConnectFailed {
            endpoint: endpoint.clone(),
            kind: error.kind(),
            reason: error.to_string(),
        })
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, endpoint: &Endpoint) -> Result<TcpStream, ConnectError> {
        info!("Connecting to {endpoint}");

        let stream = match self.connect_timeout {
            Some(after) => tokio::time::timeout(after, Self::dial(endpoint))
                .await
                .map_err(|_| ConnectError::Timeout {
                    endpoint: endpoint.clone(),
                    after,
                })??,
            None => Self::dial(endpoint).await?,
        };

        info!("Connected to {endpoint}");
        Ok(stream)
    }
}
