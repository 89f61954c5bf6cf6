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

//! Error taxonomy for the session manager and the wireless associator.
//!
//! None of these are fatal to the process. Each is logged where it happens
//! and either returned to the caller or published as a
//! [`SessionEvent::Error`](crate::SessionEvent::Error).

use netsocket_transport::ConnectError;
use netsocket_types::Endpoint;
use std::fmt;
use std::io;
use thiserror::Error;

/// Errors raised while a session is opening, running, or closing.
#[derive(Error, Debug, Clone)]
pub enum SessionError {
    /// The endpoint could not be opened. Terminal for the run.
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error("read from {endpoint} failed: {reason}")]
    Read {
        endpoint: Endpoint,
        kind: io::ErrorKind,
        reason: String,
    },
    #[error("write to {endpoint} failed: {reason}")]
    Write {
        endpoint: Endpoint,
        kind: io::ErrorKind,
        reason: String,
    },
    #[error("closing connection to {endpoint} failed: {reason}")]
    Close { endpoint: Endpoint, reason: String },
    /// `send` was called while no session was open.
    #[error("session is not open")]
    NotOpen,
    /// The outgoing text would be split into several lines.
    #[error("message contains a line terminator")]
    InvalidMessage,
}

impl SessionError {
    pub(crate) fn read(endpoint: &Endpoint, error: &io::Error) -> Self {
        Self::Read {
            endpoint: endpoint.clone(),
            kind: error.kind(),
            reason: error.to_string(),
        }
    }

    pub(crate) fn write(endpoint: &Endpoint, error: &io::Error) -> Self {
        Self::Write {
            endpoint: endpoint.clone(),
            kind: error.kind(),
            reason: error.to_string(),
        }
    }

    pub(crate) fn close(endpoint: &Endpoint, error: &io::Error) -> Self {
        Self::Close {
            endpoint: endpoint.clone(),
            reason: error.to_string(),
        }
    }

    pub fn is_connect(&self) -> bool {
        matches!(self, Self::Connect(_))
    }
}

/// Errors reported by a [`WirelessManager`](crate::wifi::WirelessManager) backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WirelessError {
    /// The backend refused the request (the API's failure sentinel).
    #[error("request rejected by the wireless subsystem: {0}")]
    Rejected(String),
    #[error("wireless subsystem unavailable: {0}")]
    Unavailable(String),
    #[error("`{command}` failed: {reason}")]
    CommandFailed { command: String, reason: String },
    #[error("unexpected output from wireless subsystem: {0}")]
    Parse(String),
}

/// One of the three calls that move the interface to another network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssociationStep {
    Disconnect,
    Enable,
    Reconnect,
}

impl fmt::Display for AssociationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssociationStep::Disconnect => "disconnect",
            AssociationStep::Enable => "enable",
            AssociationStep::Reconnect => "reconnect",
        };
        f.write_str(name)
    }
}

fn join_steps(steps: &[AssociationStep]) -> String {
    steps
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised while steering the wireless interface to a named network.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssociationError {
    /// The backend declined the network profile. No session restart follows.
    #[error("network profile for '{ssid}' was rejected: {source}")]
    ConfigRejected {
        ssid: String,
        #[source]
        source: WirelessError,
    },
    #[error("no configured network matches '{ssid}'")]
    NetworkNotFound { ssid: String },
    #[error("listing configured networks failed: {0}")]
    ListFailed(#[source] WirelessError),
    /// At least one of disconnect/enable/reconnect failed. All three were attempted.
    #[error("association with '{ssid}' failed at: {}", join_steps(.failed))]
    StepsFailed {
        ssid: String,
        failed: Vec<AssociationStep>,
    },
    #[error("wireless radio unavailable: {reason}")]
    WifiUnavailable { reason: String },
}
