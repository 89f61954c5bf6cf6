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

//! The session manager and the task that owns each session run.
//!
//! A run is a single Tokio task holding the connection halves. `send` and
//! `stop` never touch the connection directly; they are commands delivered
//! to that task, so a stop can never race a write on a closed handle.

mod manager;
mod run;

pub use manager::{SessionManager, STOP_TIMEOUT};

use crate::config::{ClientConfig, ReadErrorPolicy};
use crate::error::SessionError;
use crate::events::{CloseReason, SessionEvent, SessionId};
use log::trace;
use netsocket_types::{Endpoint, SessionState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

/// Per-manager settings shared by every run.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub endpoint: Endpoint,
    pub greeting: String,
    pub read_errors: ReadErrorPolicy,
    /// Report a read error when no line arrives within this window.
    pub read_timeout: Option<Duration>,
    pub read_retry_delay: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for SessionSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            greeting: config.greeting.clone(),
            read_errors: config.read_errors,
            read_timeout: config.read_timeout(),
            read_retry_delay: config.read_retry_delay(),
        }
    }
}

pub(crate) enum Command {
    Send {
        line: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Stop,
}

/// Publishes state changes and events for one run.
#[derive(Clone)]
pub(crate) struct Reporter {
    session: SessionId,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: Arc<watch::Sender<SessionState>>,
}

impl Reporter {
    pub(crate) fn new(
        session: SessionId,
        events: mpsc::UnboundedSender<SessionEvent>,
        state: Arc<watch::Sender<SessionState>>,
    ) -> Self {
        Self {
            session,
            events,
            state,
        }
    }

    pub(crate) fn state(&self, state: SessionState) {
        self.state.send_replace(state);
        self.emit(SessionEvent::StateChanged {
            session: self.session,
            state,
        });
    }

    pub(crate) fn connected(&self, endpoint: Endpoint) {
        self.emit(SessionEvent::Connected {
            session: self.session,
            endpoint,
        });
    }

    pub(crate) fn line(&self, line: String) {
        self.emit(SessionEvent::LineReceived {
            session: self.session,
            line,
        });
    }

    pub(crate) fn error(&self, error: SessionError) {
        self.emit(SessionEvent::Error {
            session: self.session,
            error,
        });
    }

    pub(crate) fn closed(&self, reason: CloseReason) {
        self.state(SessionState::Closed);
        self.emit(SessionEvent::Closed {
            session: self.session,
            reason,
        });
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            trace!("Session {}: event receiver dropped", self.session);
        }
    }
}
