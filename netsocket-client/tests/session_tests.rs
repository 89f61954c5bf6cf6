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

//! Session manager tests against loopback peers.

use async_trait::async_trait;
use netsocket_client::{
    CloseReason, ReadErrorPolicy, SessionError, SessionEvent, SessionManager, SessionSettings,
    STOP_TIMEOUT,
};
use netsocket_transport::{ConnectError, Connector, TcpConnector};
use netsocket_types::{Endpoint, SessionState, GREETING};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream, ReadBuf,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;

const WAIT: Duration = Duration::from_secs(5);

async fn local_listener() -> (TcpListener, Endpoint) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, Endpoint::new("127.0.0.1", port))
}

fn settings_for(endpoint: Endpoint) -> SessionSettings {
    SessionSettings {
        endpoint,
        ..SessionSettings::default()
    }
}

fn tcp_manager(
    settings: SessionSettings,
) -> (SessionManager, UnboundedReceiver<SessionEvent>) {
    SessionManager::new(settings, TcpConnector::new())
}

async fn next_event(events: &mut UnboundedReceiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

/// Collects events up to and including the first `Closed`.
async fn events_until_closed(events: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    loop {
        let event = next_event(events).await;
        let done = matches!(event, SessionEvent::Closed { .. });
        seen.push(event);
        if done {
            return seen;
        }
    }
}

async fn wait_for_line(events: &mut UnboundedReceiver<SessionEvent>) -> String {
    loop {
        match next_event(events).await {
            SessionEvent::LineReceived { line, .. } => return line,
            SessionEvent::Closed { reason, .. } => panic!("closed before a line arrived: {reason}"),
            _ => {}
        }
    }
}

fn close_reason(events: &[SessionEvent]) -> Option<CloseReason> {
    events.iter().find_map(|event| match event {
        SessionEvent::Closed { reason, .. } => Some(*reason),
        _ => None,
    })
}

fn errors(events: &[SessionEvent]) -> Vec<&SessionError> {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::Error { error, .. } => Some(error),
            _ => None,
        })
        .collect()
}

/// Never finishes connecting.
struct StalledConnector;

#[async_trait]
impl Connector for StalledConnector {
    type Stream = DuplexStream;

    async fn connect(&self, _endpoint: &Endpoint) -> Result<DuplexStream, ConnectError> {
        std::future::pending().await
    }
}

/// Hands out a stream whose peer is already gone, so every write fails.
struct BrokenConnector;

#[async_trait]
impl Connector for BrokenConnector {
    type Stream = DuplexStream;

    async fn connect(&self, _endpoint: &Endpoint) -> Result<DuplexStream, ConnectError> {
        let (ours, theirs) = tokio::io::duplex(64);
        drop(theirs);
        Ok(ours)
    }
}

/// A connection on which no read or write ever completes.
struct StuckStream;

impl AsyncRead for StuckStream {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Pending
    }
}

impl AsyncWrite for StuckStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Pending
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Pending
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Pending
    }
}

struct StuckConnector;

#[async_trait]
impl Connector for StuckConnector {
    type Stream = StuckStream;

    async fn connect(&self, _endpoint: &Endpoint) -> Result<StuckStream, ConnectError> {
        Ok(StuckStream)
    }
}

/// Collects every event published within `window`.
async fn events_within(
    events: &mut UnboundedReceiver<SessionEvent>,
    window: Duration,
) -> Vec<SessionEvent> {
    let until = tokio::time::Instant::now() + window;
    let mut seen = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout_at(until, events.recv()).await {
        seen.push(event);
    }
    seen
}

#[tokio::test]
async fn test_greeting_is_first_line() {
    let (listener, endpoint) = local_listener().await;
    let (manager, mut events) = tcp_manager(settings_for(endpoint.clone()));

    let id = manager.start().await;
    assert_eq!(manager.session_id(), Some(id));

    let (socket, _) = listener.accept().await.unwrap();
    let mut lines = BufReader::new(socket).lines();
    assert_eq!(lines.next_line().await.unwrap().as_deref(), Some(GREETING));

    loop {
        if let SessionEvent::Connected { session, endpoint: connected } = next_event(&mut events).await {
            assert_eq!(session, id);
            assert_eq!(connected, endpoint);
            break;
        }
    }
    assert!(manager
        .wait_for_state(WAIT, |state| state == SessionState::Reading)
        .await
        .is_some());
    manager.stop().await;
}

#[tokio::test]
async fn test_nothing_listening_closes_with_one_error() {
    let (listener, endpoint) = local_listener().await;
    drop(listener);
    let (manager, mut events) = tcp_manager(settings_for(endpoint));

    manager.start().await;
    let seen = events_until_closed(&mut events).await;

    let errors = errors(&seen);
    assert_eq!(errors.len(), 1, "expected exactly one error: {seen:?}");
    assert!(errors[0].is_connect());
    assert_eq!(close_reason(&seen), Some(CloseReason::ConnectFailed));
    assert!(!seen.iter().any(|event| matches!(
        event,
        SessionEvent::StateChanged {
            state: SessionState::Open | SessionState::Reading,
            ..
        }
    )));
    assert_eq!(manager.state(), SessionState::Closed);
    assert!(matches!(manager.send("hi").await, Err(SessionError::NotOpen)));
}

#[tokio::test]
async fn test_stop_twice_is_benign() {
    let (listener, endpoint) = local_listener().await;
    let (manager, mut events) = tcp_manager(settings_for(endpoint));

    // Before any start.
    manager.stop().await;
    assert_eq!(manager.state(), SessionState::Idle);

    manager.start().await;
    let _peer = listener.accept().await.unwrap();
    manager
        .wait_for_state(WAIT, |state| state == SessionState::Reading)
        .await
        .unwrap();

    manager.stop().await;
    manager.stop().await;
    let seen = events_until_closed(&mut events).await;
    assert_eq!(close_reason(&seen), Some(CloseReason::Stopped));
    assert_eq!(manager.state(), SessionState::Closed);

    // Exactly one Closed for the run.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_send_round_trip() {
    let (listener, endpoint) = local_listener().await;
    let (manager, mut events) = tcp_manager(settings_for(endpoint));

    manager.start().await;
    let (socket, _) = listener.accept().await.unwrap();
    let (read, mut write) = socket.into_split();
    let mut lines = BufReader::new(read).lines();
    assert_eq!(lines.next_line().await.unwrap().as_deref(), Some(GREETING));

    manager
        .wait_for_state(WAIT, |state| state.is_open())
        .await
        .unwrap();
    manager.send("ping").await.unwrap();
    let sent = lines.next_line().await.unwrap().unwrap();
    assert_eq!(sent, "ping");

    write.write_all(format!("{sent}\n").as_bytes()).await.unwrap();
    assert_eq!(wait_for_line(&mut events).await, "ping");
    manager.stop().await;
}

#[tokio::test]
async fn test_send_rejects_embedded_terminators() {
    let (listener, endpoint) = local_listener().await;
    let (manager, _events) = tcp_manager(settings_for(endpoint));

    manager.start().await;
    let _peer = listener.accept().await.unwrap();
    manager
        .wait_for_state(WAIT, |state| state.is_open())
        .await
        .unwrap();

    assert!(matches!(
        manager.send("two\nlines").await,
        Err(SessionError::InvalidMessage)
    ));
    assert!(matches!(
        manager.send("carriage\r").await,
        Err(SessionError::InvalidMessage)
    ));
    manager.stop().await;
}

#[tokio::test]
async fn test_inbound_lines_arrive_in_order() {
    let (listener, endpoint) = local_listener().await;
    let (manager, mut events) = tcp_manager(settings_for(endpoint));

    manager.start().await;
    let (mut socket, _) = listener.accept().await.unwrap();
    socket.write_all(b"one\ntwo\r\nthree\n").await.unwrap();

    assert_eq!(wait_for_line(&mut events).await, "one");
    assert_eq!(wait_for_line(&mut events).await, "two");
    assert_eq!(wait_for_line(&mut events).await, "three");
    manager.stop().await;
}

#[tokio::test]
async fn test_stop_unblocks_pending_read() {
    let (listener, endpoint) = local_listener().await;
    let (manager, mut events) = tcp_manager(settings_for(endpoint));

    manager.start().await;
    let (mut socket, _) = listener.accept().await.unwrap();
    manager
        .wait_for_state(WAIT, |state| state == SessionState::Reading)
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(1), manager.stop())
        .await
        .expect("stop should not wait on the peer");
    let seen = events_until_closed(&mut events).await;
    assert_eq!(close_reason(&seen), Some(CloseReason::Stopped));

    // The peer may still talk; nothing reaches the client after Closed.
    let _ = socket.write_all(b"too late\n").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_ack_ping_then_peer_closes() {
    let (listener, endpoint) = local_listener().await;
    let (manager, mut events) = tcp_manager(settings_for(endpoint));

    let peer = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.into_split();
        let mut lines = BufReader::new(read).lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some(GREETING));
        write.write_all(b"ACK\n").await.unwrap();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("ping"));
        // Dropping both halves closes the connection.
    });

    manager.start().await;
    assert_eq!(wait_for_line(&mut events).await, "ACK");
    manager.send("ping").await.unwrap();
    peer.await.unwrap();

    let seen = events_until_closed(&mut events).await;
    assert_eq!(close_reason(&seen), Some(CloseReason::PeerClosed));
    assert_eq!(manager.state(), SessionState::Closed);
    assert!(matches!(manager.send("again").await, Err(SessionError::NotOpen)));
}

#[tokio::test]
async fn test_read_timeout_ends_session_by_default() {
    let (listener, endpoint) = local_listener().await;
    let settings = SessionSettings {
        read_timeout: Some(Duration::from_millis(100)),
        ..settings_for(endpoint)
    };
    let (manager, mut events) = tcp_manager(settings);

    manager.start().await;
    let _peer = listener.accept().await.unwrap();
    let seen = events_until_closed(&mut events).await;

    assert_eq!(close_reason(&seen), Some(CloseReason::ReadFailed));
    match errors(&seen).as_slice() {
        [SessionError::Read { kind, .. }] => assert_eq!(*kind, io::ErrorKind::TimedOut),
        other => panic!("expected one read error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_keep_reading_survives_read_errors() {
    let (listener, endpoint) = local_listener().await;
    let settings = SessionSettings {
        read_errors: ReadErrorPolicy::KeepReading,
        read_timeout: Some(Duration::from_millis(50)),
        read_retry_delay: Duration::from_millis(10),
        ..settings_for(endpoint)
    };
    let (manager, mut events) = tcp_manager(settings);

    manager.start().await;
    let (mut socket, _) = listener.accept().await.unwrap();

    let mut read_errors = 0;
    while read_errors < 2 {
        match next_event(&mut events).await {
            SessionEvent::Error {
                error: SessionError::Read { .. },
                ..
            } => read_errors += 1,
            SessionEvent::Closed { reason, .. } => panic!("session closed: {reason}"),
            _ => {}
        }
    }

    socket.write_all(b"still here\n").await.unwrap();
    assert_eq!(wait_for_line(&mut events).await, "still here");
    assert!(manager.is_open());
    manager.stop().await;
}

#[tokio::test]
async fn test_restart_replaces_live_session() {
    let (listener, endpoint) = local_listener().await;
    let (manager, mut events) = tcp_manager(settings_for(endpoint));

    let first = manager.start().await;
    let (_first_peer, _) = listener.accept().await.unwrap();
    manager
        .wait_for_state(WAIT, |state| state == SessionState::Reading)
        .await
        .unwrap();

    let second = manager.start().await;
    assert!(second > first);
    let (socket, _) = listener.accept().await.unwrap();
    let mut lines = BufReader::new(socket).lines();
    assert_eq!(lines.next_line().await.unwrap().as_deref(), Some(GREETING));

    let seen = events_until_closed(&mut events).await;
    assert!(matches!(
        seen.last(),
        Some(SessionEvent::Closed {
            reason: CloseReason::Stopped,
            ..
        })
    ));
    assert!(seen.iter().all(|event| event.session() == first));

    loop {
        if let SessionEvent::Connected { session, .. } = next_event(&mut events).await {
            assert_eq!(session, second);
            break;
        }
    }
    manager.stop().await;
}

#[tokio::test]
async fn test_stop_cancels_pending_connect() {
    let (manager, mut events) =
        SessionManager::new(SessionSettings::default(), StalledConnector);

    manager.start().await;
    manager
        .wait_for_state(WAIT, |state| state == SessionState::Opening)
        .await
        .unwrap();
    assert!(matches!(manager.send("early").await, Err(SessionError::NotOpen)));

    tokio::time::timeout(Duration::from_secs(1), manager.stop())
        .await
        .expect("stop should cancel the connect");
    let seen = events_until_closed(&mut events).await;
    assert_eq!(close_reason(&seen), Some(CloseReason::Stopped));
    assert!(errors(&seen).is_empty());
}

#[tokio::test]
async fn test_failed_greeting_closes_session() {
    let (manager, mut events) = SessionManager::new(SessionSettings::default(), BrokenConnector);

    manager.start().await;
    let seen = events_until_closed(&mut events).await;

    assert_eq!(close_reason(&seen), Some(CloseReason::HandshakeFailed));
    assert!(matches!(
        errors(&seen).first(),
        Some(SessionError::Write { .. })
    ));
    assert!(!seen
        .iter()
        .any(|event| matches!(event, SessionEvent::Connected { .. })));
}

#[tokio::test]
async fn test_stop_closes_connection_for_peer() {
    let (listener, endpoint) = local_listener().await;
    let (manager, mut events) = tcp_manager(settings_for(endpoint));

    manager.start().await;
    let (socket, _) = listener.accept().await.unwrap();
    let mut lines = BufReader::new(socket).lines();
    assert_eq!(lines.next_line().await.unwrap().as_deref(), Some(GREETING));

    manager.stop().await;
    let eof = tokio::time::timeout(Duration::from_secs(1), lines.next_line())
        .await
        .expect("peer should see the connection close");
    assert_eq!(eof.unwrap(), None);

    let seen = events_until_closed(&mut events).await;
    assert_eq!(close_reason(&seen), Some(CloseReason::Stopped));
}

#[tokio::test]
async fn test_keep_reading_pauses_after_read_timeout() {
    let (listener, endpoint) = local_listener().await;
    let settings = SessionSettings {
        read_errors: ReadErrorPolicy::KeepReading,
        read_timeout: Some(Duration::from_millis(50)),
        read_retry_delay: Duration::from_millis(200),
        ..settings_for(endpoint)
    };
    let (manager, mut events) = tcp_manager(settings);

    manager.start().await;
    let _peer = listener.accept().await.unwrap();
    let seen = events_within(&mut events, Duration::from_millis(500)).await;

    // Timeouts fire around 50ms and 300ms; the retry delay spaces them out.
    let read_errors = errors(&seen).len();
    assert!(
        (1..=3).contains(&read_errors),
        "expected a few spaced read errors, got {read_errors}"
    );
    assert_eq!(close_reason(&seen), None);
    manager.stop().await;
}

#[tokio::test]
async fn test_zero_read_timeout_disables_idle_check() {
    let (listener, endpoint) = local_listener().await;
    let settings = SessionSettings {
        read_errors: ReadErrorPolicy::KeepReading,
        read_timeout: Some(Duration::ZERO),
        ..settings_for(endpoint)
    };
    let (manager, mut events) = tcp_manager(settings);

    manager.start().await;
    let _peer = listener.accept().await.unwrap();
    let seen = events_within(&mut events, Duration::from_millis(200)).await;

    assert!(errors(&seen).is_empty(), "unexpected errors: {seen:?}");
    assert!(manager.is_open());
    manager.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_restart_aborts_stuck_run_after_stop_timeout() {
    let (manager, mut events) = SessionManager::new(SessionSettings::default(), StuckConnector);

    let first = manager.start().await;
    manager
        .wait_for_state(WAIT, |state| state == SessionState::Open)
        .await
        .unwrap();

    let started = tokio::time::Instant::now();
    let second = manager.start().await;
    let waited = started.elapsed();
    assert!(waited >= STOP_TIMEOUT, "restart returned after {waited:?}");
    assert!(waited < STOP_TIMEOUT + Duration::from_secs(1));
    assert!(second > first);

    let seen = events_until_closed(&mut events).await;
    assert!(seen.iter().all(|event| event.session() == first));
    assert_eq!(close_reason(&seen), Some(CloseReason::Stopped));
}
