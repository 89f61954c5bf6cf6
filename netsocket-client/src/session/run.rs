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

use super::{Command, Reporter, SessionSettings};
use crate::config::ReadErrorPolicy;
use crate::error::SessionError;
use crate::events::{CloseReason, SessionId};
use log::{debug, error, info, warn};
use netsocket_transport::line::{self, LineReader, LineWriter};
use netsocket_transport::Connector;
use netsocket_types::SessionState;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// The task body for one session run. Owns the connection for its whole life.
pub(crate) struct SessionRun<C: Connector> {
    pub(crate) id: SessionId,
    pub(crate) settings: Arc<SessionSettings>,
    pub(crate) connector: Arc<C>,
    pub(crate) commands: mpsc::UnboundedReceiver<Command>,
    pub(crate) reporter: Reporter,
}

enum Opened<S> {
    Stream(S),
    Failed(SessionError),
    Stopped,
}

impl<C: Connector> SessionRun<C> {
    pub(crate) async fn run(mut self) {
        self.reporter.state(SessionState::Opening);
        let stream = match self.open().await {
            Opened::Stream(stream) => stream,
            Opened::Failed(err) => {
                error!("Session {}: {err}", self.id);
                self.reporter.error(err);
                self.reporter.closed(CloseReason::ConnectFailed);
                return;
            }
            Opened::Stopped => {
                info!("Session {}: stopped while connecting", self.id);
                self.reporter.closed(CloseReason::Stopped);
                return;
            }
        };
        self.reporter.state(SessionState::Open);
        info!(
            "Session {}: connected to {}",
            self.id, self.settings.endpoint
        );

        let (mut reader, mut writer) = line::split(stream);
        if let Err(e) = writer.write_line(&self.settings.greeting).await {
            let err = SessionError::write(&self.settings.endpoint, &e);
            error!("Session {}: greeting not sent: {err}", self.id);
            self.reporter.error(err);
            self.close(&mut writer).await;
            self.reporter.closed(CloseReason::HandshakeFailed);
            return;
        }
        debug!("Session {}: greeting sent", self.id);
        self.reporter.connected(self.settings.endpoint.clone());

        self.reporter.state(SessionState::Reading);
        let reason = self.read_loop(&mut reader, &mut writer).await;
        self.close(&mut writer).await;
        info!("Session {}: closed ({reason})", self.id);
        self.reporter.closed(reason);
    }

    /// Connects while still answering commands, so `stop` cancels a slow
    /// connect and `send` gets `NotOpen` instead of waiting.
    async fn open(&mut self) -> Opened<C::Stream> {
        let connector = Arc::clone(&self.connector);
        let settings = Arc::clone(&self.settings);
        let connect = connector.connect(&settings.endpoint);
        tokio::pin!(connect);
        loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(Command::Send { reply, .. }) => {
                        let _ = reply.send(Err(SessionError::NotOpen));
                    }
                    Some(Command::Stop) | None => return Opened::Stopped,
                },
                result = &mut connect => {
                    return match result {
                        Ok(stream) => Opened::Stream(stream),
                        Err(e) => Opened::Failed(e.into()),
                    };
                }
            }
        }
    }

    async fn read_loop<R, W>(
        &mut self,
        reader: &mut LineReader<R>,
        writer: &mut LineWriter<W>,
    ) -> CloseReason
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        // A zero window would expire before any read could complete.
        let read_timeout = self.settings.read_timeout.filter(|t| !t.is_zero());
        let mut deadline = read_timeout.map(|t| Instant::now() + t);
        let mut resume_at: Option<Instant> = None;

        loop {
            let pause = resume_at;
            let idle = deadline;
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(Command::Send { line, reply }) => {
                        let result = self.write(writer, &line).await;
                        let _ = reply.send(result);
                    }
                    Some(Command::Stop) | None => return CloseReason::Stopped,
                },
                result = async {
                    if let Some(at) = pause {
                        sleep_until(at).await;
                    }
                    reader.read_line().await
                } => {
                    resume_at = None;
                    match result {
                        Ok(Some(line)) => {
                            debug!("Session {}: received {line:?}", self.id);
                            self.reporter.line(line);
                            deadline = read_timeout.map(|t| Instant::now() + t);
                        }
                        Ok(None) => {
                            info!("Session {}: peer closed the connection", self.id);
                            return CloseReason::PeerClosed;
                        }
                        Err(e) => {
                            if !self.read_failed(&e) {
                                return CloseReason::ReadFailed;
                            }
                            let resume = Instant::now() + self.settings.read_retry_delay;
                            resume_at = Some(resume);
                            deadline = read_timeout.map(|t| resume + t);
                        }
                    }
                }
                _ = async {
                    match idle {
                        Some(at) => sleep_until(at).await,
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    let e = io::Error::new(io::ErrorKind::TimedOut, "no line received before the read timeout");
                    if !self.read_failed(&e) {
                        return CloseReason::ReadFailed;
                    }
                    let resume = Instant::now() + self.settings.read_retry_delay;
                    resume_at = Some(resume);
                    deadline = read_timeout.map(|t| resume + t);
                }
            }
        }
    }

    /// Reports a read failure. Returns whether the loop should keep reading.
    fn read_failed(&self, e: &io::Error) -> bool {
        let err = SessionError::read(&self.settings.endpoint, e);
        match self.settings.read_errors {
            ReadErrorPolicy::Terminate => {
                error!("Session {}: {err}", self.id);
                self.reporter.error(err);
                false
            }
            ReadErrorPolicy::KeepReading => {
                warn!("Session {}: {err}, reading again", self.id);
                self.reporter.error(err);
                true
            }
        }
    }

    async fn write<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut LineWriter<W>,
        line: &str,
    ) -> Result<(), SessionError> {
        match writer.write_line(line).await {
            Ok(()) => {
                debug!("Session {}: sent {line:?}", self.id);
                Ok(())
            }
            Err(e) => {
                let err = SessionError::write(&self.settings.endpoint, &e);
                warn!("Session {}: {err}", self.id);
                self.reporter.error(err.clone());
                Err(err)
            }
        }
    }

    async fn close<W: AsyncWrite + Unpin>(&self, writer: &mut LineWriter<W>) {
        self.reporter.state(SessionState::Closing);
        let result = match tokio::time::timeout(CLOSE_TIMEOUT, writer.shutdown()).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "shutdown did not complete",
            )),
        };
        if let Err(e) = result {
            let err = SessionError::close(&self.settings.endpoint, &e);
            warn!("Session {}: {err}", self.id);
            self.reporter.error(err);
        }
    }
}
