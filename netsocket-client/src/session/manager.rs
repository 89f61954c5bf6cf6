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

use super::run::SessionRun;
use super::{Command, Reporter, SessionSettings};
use crate::config::ClientConfig;
use crate::error::SessionError;
use crate::events::{CloseReason, SessionEvent, SessionId};
use log::{debug, info, warn};
use netsocket_transport::line::contains_terminator;
use netsocket_transport::{Connector, TcpConnector};
use netsocket_types::{Endpoint, SessionState};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;

/// How long `stop` waits for the session task before aborting it.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

struct ActiveSession {
    id: SessionId,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
    reporter: Reporter,
}

impl ActiveSession {
    async fn shutdown(mut self) {
        if self.task.is_finished() {
            debug!("Session {} already closed", self.id);
            return;
        }
        let _ = self.commands.send(Command::Stop);
        match tokio::time::timeout(STOP_TIMEOUT, &mut self.task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Session {} task failed: {e}", self.id);
                self.reporter.closed(CloseReason::Stopped);
            }
            Err(_) => {
                warn!(
                    "Session {} did not stop within {:?}, aborting",
                    self.id, STOP_TIMEOUT
                );
                self.task.abort();
                self.reporter.closed(CloseReason::Stopped);
            }
        }
    }
}

/// Owns at most one live connection to the configured endpoint.
///
/// `start` returns immediately; connecting, the greeting and the read loop
/// all happen on a spawned task. Progress is published as [`SessionEvent`]s on
/// the receiver returned by [`SessionManager::new`] and as a
/// [`SessionState`] on a watch channel.
///
/// Must be used from within a Tokio runtime.
pub struct SessionManager<C: Connector = TcpConnector> {
    settings: Arc<SessionSettings>,
    connector: Arc<C>,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: Arc<watch::Sender<SessionState>>,
    active: Mutex<Option<ActiveSession>>,
    last_id: AtomicU64,
}

impl SessionManager<TcpConnector> {
    /// Builds a TCP session manager from a loaded configuration.
    pub fn from_config(config: &ClientConfig) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let connector = TcpConnector::new().with_connect_timeout(config.connect_timeout());
        Self::new(SessionSettings::from(config), connector)
    }
}

impl<C: Connector> SessionManager<C> {
    pub fn new(
        settings: SessionSettings,
        connector: C,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(SessionState::Idle);
        let manager = Self {
            settings: Arc::new(settings),
            connector: Arc::new(connector),
            events,
            state: Arc::new(state),
            active: Mutex::new(None),
            last_id: AtomicU64::new(0),
        };
        (manager, rx)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.settings.endpoint
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Id of the most recently started run, if any.
    pub fn session_id(&self) -> Option<SessionId> {
        match self.last_id.load(Ordering::SeqCst) {
            0 => None,
            id => Some(id),
        }
    }

    /// Opens a new session, stopping the current one first.
    ///
    /// Returns once the session task is spawned. Connection failures are
    /// reported as events, not returned here. Replacing a live run waits for
    /// it to close, which takes at most [`STOP_TIMEOUT`] when the run is stuck
    /// in a write; `send` and `stop` calls made meanwhile wait as well.
    pub async fn start(&self) -> SessionId {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            info!("Restarting: stopping session {}", previous.id);
            previous.shutdown().await;
        }

        let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let reporter = Reporter::new(id, self.events.clone(), Arc::clone(&self.state));
        reporter.state(SessionState::Idle);

        info!("Session {id}: opening {}", self.settings.endpoint);
        let run = SessionRun {
            id,
            settings: Arc::clone(&self.settings),
            connector: Arc::clone(&self.connector),
            commands: commands_rx,
            reporter: reporter.clone(),
        };
        let task = tokio::spawn(run.run());
        *active = Some(ActiveSession {
            id,
            commands,
            task,
            reporter,
        });
        id
    }

    /// Writes `text` followed by a line terminator and flushes it.
    pub async fn send(&self, text: impl Into<String>) -> Result<(), SessionError> {
        let line = text.into();
        if contains_terminator(&line) {
            return Err(SessionError::InvalidMessage);
        }
        let (reply, response) = oneshot::channel();
        {
            let active = self.active.lock().await;
            let session = active.as_ref().ok_or(SessionError::NotOpen)?;
            session
                .commands
                .send(Command::Send { line, reply })
                .map_err(|_| SessionError::NotOpen)?;
        }
        // A run that ends before answering drops the reply sender.
        response.await.unwrap_or(Err(SessionError::NotOpen))
    }

    /// Closes the current session. Calling it again, or before `start`,
    /// does nothing.
    pub async fn stop(&self) {
        let mut active = self.active.lock().await;
        match active.take() {
            Some(session) => {
                info!("Stopping session {}", session.id);
                session.shutdown().await;
            }
            None => debug!("stop: no session to close"),
        }
    }

    /// Waits until the state satisfies `predicate` or `timeout` elapses.
    pub async fn wait_for_state<F>(&self, timeout: Duration, mut predicate: F) -> Option<SessionState>
    where
        F: FnMut(SessionState) -> bool,
    {
        let mut rx = self.subscribe_state();
        let wait = async {
            loop {
                let state = *rx.borrow_and_update();
                if predicate(state) {
                    return Some(state);
                }
                if rx.changed().await.is_err() {
                    return None;
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.ok().flatten()
    }
}

impl<C: Connector> Drop for SessionManager<C> {
    fn drop(&mut self) {
        if let Some(session) = self.active.get_mut().take() {
            let _ = session.commands.send(Command::Stop);
        }
    }
}
