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

//! Framework-agnostic event types for the session manager.
//!
//! Every received line and every failure is published on the channel returned
//! by [`SessionManager::new`](crate::SessionManager::new). A UI, a CLI, or a
//! test subscribes there instead of scraping logs.

use crate::error::SessionError;
use netsocket_types::{Endpoint, SessionState};
use std::fmt;

/// Identifies one run of the session manager. Starts at 1 and increases on
/// every `start`, so events from a replaced run can be told apart.
pub type SessionId = u64;

/// Why a session reached `Closed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// `stop` was called, or the manager was dropped or restarted.
    Stopped,
    /// The endpoint could not be opened.
    ConnectFailed,
    /// The greeting could not be written.
    HandshakeFailed,
    /// The peer closed its side of the stream.
    PeerClosed,
    /// A read failed under the terminate policy.
    ReadFailed,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CloseReason::Stopped => "stopped",
            CloseReason::ConnectFailed => "connect failed",
            CloseReason::HandshakeFailed => "handshake failed",
            CloseReason::PeerClosed => "peer closed the connection",
            CloseReason::ReadFailed => "read failed",
        };
        f.write_str(text)
    }
}

/// Events emitted by a [`SessionManager`](crate::SessionManager).
#[derive(Clone, Debug)]
pub enum SessionEvent {
    /// The session moved to a new lifecycle state.
    StateChanged {
        session: SessionId,
        state: SessionState,
    },

    /// The connection is open and the greeting has been sent.
    Connected {
        session: SessionId,
        endpoint: Endpoint,
    },

    /// A line arrived from the peer, terminator stripped.
    LineReceived { session: SessionId, line: String },

    /// A failure that was logged at its origin.
    Error {
        session: SessionId,
        error: SessionError,
    },

    /// The session released its connection. Always the last event of a run.
    Closed {
        session: SessionId,
        reason: CloseReason,
    },
}

impl SessionEvent {
    pub fn session(&self) -> SessionId {
        match self {
            SessionEvent::StateChanged { session, .. }
            | SessionEvent::Connected { session, .. }
            | SessionEvent::LineReceived { session, .. }
            | SessionEvent::Error { session, .. }
            | SessionEvent::Closed { session, .. } => *session,
        }
    }
}
