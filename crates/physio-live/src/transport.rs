//! # WebSocket Transport
//!
//! WebSocket client to the analysis service with automatic reconnection.
//!
//! ## Connection Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    WebSocket Connection States                          │
//! │                                                                         │
//! │  ┌────────────┐    connect()    ┌────────────┐                         │
//! │  │Disconnected│ ──────────────► │ Connecting │                         │
//! │  └────────────┘                 └─────┬──────┘                         │
//! │        ▲                              │                                 │
//! │        │                    success   │   failure                       │
//! │        │                        ┌─────┴─────┐                          │
//! │        │                        ▼           ▼                           │
//! │        │              ┌────────────┐  ┌────────────┐                   │
//! │        │              │ Connected  │  │ Backoff    │ ─► RetryFailed{n} │
//! │        │              └─────┬──────┘  └─────┬──────┘                   │
//! │        │                    │               │                           │
//! │        │        disconnect/error            │  timer expired            │
//! │        │        ─► Disconnected             │                           │
//! │        │                    ▼               │                           │
//! │        │              ┌────────────┐        │                           │
//! │        └───────────── │Reconnecting│ ◄──────┘                          │
//! │                       └────────────┘                                    │
//! │                                                                         │
//! │  BACKOFF: 500ms, 1s, 2s ... capped at 60s.                             │
//! │  max_retries > 0 bounds consecutive failures, then GaveUp.             │
//! │  Frames queued before a (re)connect are stale and discarded.           │
//! │  SHUTDOWN: flush control messages, wait for the save reply, close.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, RwLock};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::error::{LiveError, LiveResult};
use crate::feedback::{ChannelEvent, CONTROL_CAPACITY, INBOUND_CAPACITY, OUTBOUND_CAPACITY};
use crate::protocol::FeedbackMessage;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Transport State
// =============================================================================

/// Connection state for the WebSocket transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting before the next attempt.
    Backoff,
    Reconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Backoff => write!(f, "backoff"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

// =============================================================================
// Transport Configuration
// =============================================================================

/// Configuration for the WebSocket transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// WebSocket URL of the analysis service.
    pub url: String,

    pub connect_timeout: Duration,

    pub initial_backoff: Duration,

    pub max_backoff: Duration,

    /// Consecutive failed attempts before giving up (0 = infinite).
    pub max_retries: u32,

    /// Ping interval for keepalive.
    pub ping_interval: Duration,

    /// How long to wait for the reply to `end_session` before closing.
    pub save_reply_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            url: String::new(),
            connect_timeout: Duration::from_secs(10),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
            max_retries: 0, // Infinite
            ping_interval: Duration::from_secs(30),
            save_reply_timeout: Duration::from_secs(3),
        }
    }
}

// =============================================================================
// Transport Handle
// =============================================================================

/// Handle for interacting with a running transport.
#[derive(Clone)]
pub struct TransportHandle {
    outgoing_tx: mpsc::Sender<FeedbackMessage>,
    control_tx: mpsc::Sender<FeedbackMessage>,
    state: Arc<RwLock<ConnectionState>>,
    shutdown_tx: mpsc::Sender<()>,
}

impl TransportHandle {
    /// Sender for outgoing frames.
    pub fn sender(&self) -> mpsc::Sender<FeedbackMessage> {
        self.outgoing_tx.clone()
    }

    /// Sender for control messages, delivered ahead of frames and on shutdown.
    pub fn control_sender(&self) -> mpsc::Sender<FeedbackMessage> {
        self.control_tx.clone()
    }

    pub(crate) fn shutdown_sender(&self) -> mpsc::Sender<()> {
        self.shutdown_tx.clone()
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub async fn is_connected(&self) -> bool {
        *self.state.read().await == ConnectionState::Connected
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> LiveResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| LiveError::ChannelError("Failed to send shutdown signal".into()))
    }
}

// =============================================================================
// WebSocket Transport
// =============================================================================

/// How a connection loop ended.
enum LoopExit {
    /// Shutdown requested or the subscriber went away.
    Stop,
    /// Connection dropped; reconnect.
    Lost,
}

/// WebSocket transport with automatic reconnection.
pub struct Transport {
    config: TransportConfig,
    state: Arc<RwLock<ConnectionState>>,
    outgoing_rx: mpsc::Receiver<FeedbackMessage>,
    control_rx: mpsc::Receiver<FeedbackMessage>,
    events_tx: mpsc::Sender<ChannelEvent>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl Transport {
    /// Creates a transport and spawns its background task.
    ///
    /// Returns a handle and the receiver for channel events.
    pub fn spawn(config: TransportConfig) -> (TransportHandle, mpsc::Receiver<ChannelEvent>) {
        let (outgoing_tx, outgoing_rx) = mpsc::channel::<FeedbackMessage>(OUTBOUND_CAPACITY);
        let (control_tx, control_rx) = mpsc::channel::<FeedbackMessage>(CONTROL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel::<ChannelEvent>(INBOUND_CAPACITY);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let state = Arc::new(RwLock::new(ConnectionState::Disconnected));

        let transport = Transport {
            config,
            state: state.clone(),
            outgoing_rx,
            control_rx,
            events_tx,
            shutdown_rx,
        };

        tokio::spawn(transport.run());

        let handle = TransportHandle {
            outgoing_tx,
            control_tx,
            state,
            shutdown_tx,
        };

        (handle, events_rx)
    }

    /// Main transport loop.
    async fn run(mut self) {
        info!(url = %self.config.url, "Transport starting");

        let mut backoff = self.create_backoff();
        let mut failures = 0u32;

        loop {
            // A dropped handle counts as shutdown.
            if !matches!(self.shutdown_rx.try_recv(), Err(TryRecvError::Empty)) {
                info!("Transport received shutdown signal");
                break;
            }

            *self.state.write().await = ConnectionState::Connecting;

            match self.connect_with_timeout().await {
                Ok(ws_stream) => {
                    info!("WebSocket connected");
                    *self.state.write().await = ConnectionState::Connected;
                    backoff.reset();
                    failures = 0;
                    self.discard_stale_frames();

                    if !self.publish(ChannelEvent::Connected).await {
                        break;
                    }

                    match self.connection_loop(ws_stream).await {
                        Ok(LoopExit::Stop) => break,
                        Ok(LoopExit::Lost) => info!("Connection closed by service"),
                        Err(e) => warn!(?e, "Connection loop ended"),
                    }
                    self.discard_stale_frames();

                    if !self.publish(ChannelEvent::Disconnected).await {
                        break;
                    }
                }
                Err(e) => {
                    error!(?e, retryable = e.is_retryable(), "Failed to connect");
                    failures += 1;
                    if !self.publish(ChannelEvent::RetryFailed { attempt: failures }).await {
                        break;
                    }
                }
            }

            *self.state.write().await = ConnectionState::Backoff;

            if self.config.max_retries > 0 && failures >= self.config.max_retries {
                error!(
                    max_retries = self.config.max_retries,
                    "Max reconnection attempts reached"
                );
                let _ = self.publish(ChannelEvent::GaveUp).await;
                break;
            }

            if let Some(duration) = backoff.next_backoff() {
                debug!(?duration, attempt = failures, "Waiting before reconnect");

                tokio::select! {
                    _ = tokio::time::sleep(duration) => {
                        *self.state.write().await = ConnectionState::Reconnecting;
                    }
                    _ = self.shutdown_rx.recv() => {
                        info!("Shutdown during backoff");
                        break;
                    }
                }
            } else {
                error!("Backoff exhausted");
                let _ = self.publish(ChannelEvent::GaveUp).await;
                break;
            }
        }

        *self.state.write().await = ConnectionState::Disconnected;
        info!("Transport stopped");
    }

    /// Drops frames captured for a connection that no longer exists.
    fn discard_stale_frames(&mut self) {
        let mut discarded = 0usize;
        while self.outgoing_rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!(discarded, "Discarded stale frames");
        }
    }

    /// Forwards an event to the subscriber. False once it is gone.
    async fn publish(&self, event: ChannelEvent) -> bool {
        if self.events_tx.send(event).await.is_err() {
            debug!("Event receiver dropped");
            return false;
        }
        true
    }

    async fn connect_with_timeout(&self) -> LiveResult<WsStream> {
        let connect_future = connect_async(self.config.url.as_str());

        match timeout(self.config.connect_timeout, connect_future).await {
            Ok(Ok((ws_stream, response))) => {
                debug!(status = ?response.status(), "WebSocket handshake complete");
                Ok(ws_stream)
            }
            Ok(Err(e)) => Err(LiveError::from(e)),
            Err(_) => Err(LiveError::Timeout(
                self.config.connect_timeout.as_millis() as u64,
            )),
        }
    }

    /// Sending and receiving on one connection.
    async fn connection_loop(&mut self, ws_stream: WsStream) -> LiveResult<LoopExit> {
        let (mut write, mut read) = ws_stream.split();

        let mut ping_interval = tokio::time::interval(self.config.ping_interval);
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        // Set once end_session is on the wire; shutdown then waits for the reply.
        let mut end_sent = false;

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown signal received, closing connection");
                    self.close_gracefully(&mut write, &mut read, end_sent).await?;
                    return Ok(LoopExit::Stop);
                }

                Some(msg) = self.control_rx.recv() => {
                    end_sent |= matches!(msg, FeedbackMessage::EndSession(_));
                    let json = msg.to_json()?;
                    debug!(msg_type = %msg.type_name(), "Sending control message");
                    write.send(WsMessage::Text(json.into())).await?;
                }

                outgoing = self.outgoing_rx.recv() => {
                    let Some(msg) = outgoing else {
                        // The subscription is gone; its control messages may still be queued.
                        self.close_gracefully(&mut write, &mut read, end_sent).await?;
                        return Ok(LoopExit::Stop);
                    };
                    let json = msg.to_json()?;
                    debug!(msg_type = %msg.type_name(), "Sending message");
                    write.send(WsMessage::Text(json.into())).await?;
                }

                incoming = read.next() => {
                    let Some(result) = incoming else {
                        return Ok(LoopExit::Lost);
                    };
                    match result {
                        Ok(WsMessage::Text(text)) => {
                            match FeedbackMessage::from_json(&text) {
                                Ok(msg) => {
                                    debug!(msg_type = %msg.type_name(), "Received message");
                                    if !self.publish(ChannelEvent::Message(msg)).await {
                                        return Ok(LoopExit::Stop);
                                    }
                                }
                                Err(e) => {
                                    warn!(?e, "Failed to parse message");
                                }
                            }
                        }
                        Ok(WsMessage::Ping(data)) => {
                            write.send(WsMessage::Pong(data)).await?;
                        }
                        Ok(WsMessage::Pong(_)) => {
                            debug!("Received pong");
                        }
                        Ok(WsMessage::Close(frame)) => {
                            info!(?frame, "Received close frame");
                            return Ok(LoopExit::Lost);
                        }
                        Ok(WsMessage::Binary(_)) => {
                            warn!("Received unexpected binary message");
                        }
                        Ok(WsMessage::Frame(_)) => {}
                        Err(e) => {
                            error!(?e, "WebSocket error");
                            return Err(LiveError::from(e));
                        }
                    }
                }

                _ = ping_interval.tick() => {
                    write.send(WsMessage::Ping(vec![].into())).await?;
                    debug!("Sent ping");
                }
            }
        }
    }

    /// Delivers queued control messages, waits for the save reply if
    /// `end_session` went out, then closes. Queued frames are dropped.
    async fn close_gracefully(
        &mut self,
        write: &mut SplitSink<WsStream, WsMessage>,
        read: &mut SplitStream<WsStream>,
        mut end_sent: bool,
    ) -> LiveResult<()> {
        while let Ok(msg) = self.control_rx.try_recv() {
            end_sent |= matches!(msg, FeedbackMessage::EndSession(_));
            let json = msg.to_json()?;
            write.send(WsMessage::Text(json.into())).await?;
        }
        if end_sent {
            self.await_save_reply(read).await;
        }
        let _ = write.send(WsMessage::Close(None)).await;
        Ok(())
    }

    /// Reads until the service answers `end_session`, the connection closes
    /// or `save_reply_timeout` passes. Only the reply is forwarded.
    async fn await_save_reply(&self, read: &mut SplitStream<WsStream>) {
        let wait = async {
            while let Some(Ok(message)) = read.next().await {
                let WsMessage::Text(text) = message else {
                    continue;
                };
                match FeedbackMessage::from_json(&text) {
                    Ok(msg @ (FeedbackMessage::SessionSaved { .. }
                    | FeedbackMessage::SessionError { .. })) => {
                        debug!(msg_type = %msg.type_name(), "Received save reply");
                        let _ = self.publish(ChannelEvent::Message(msg)).await;
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => warn!(?e, "Failed to parse message"),
                }
            }
        };

        if timeout(self.config.save_reply_timeout, wait).await.is_err() {
            warn!(
                timeout_ms = self.config.save_reply_timeout.as_millis() as u64,
                "No reply to end_session"
            );
        }
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.config.initial_backoff,
            max_interval: self.config.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Backoff.to_string(), "backoff");
    }

    #[test]
    fn test_transport_config_default() {
        let config = TransportConfig::default();
        assert_eq!(config.initial_backoff, Duration::from_millis(500));
        assert_eq!(config.max_backoff, Duration::from_secs(60));
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.save_reply_timeout, Duration::from_secs(3));
    }

    /// Local analysis service stand-in: accepts WebSocket connections.
    async fn local_service() -> (tokio::net::TcpListener, TransportConfig) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = TransportConfig {
            url: format!("ws://{}/feedback", listener.local_addr().unwrap()),
            connect_timeout: Duration::from_secs(2),
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(20),
            save_reply_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        (listener, config)
    }

    async fn accept(listener: &tokio::net::TcpListener) -> WebSocketStream<TcpStream> {
        let (stream, _) = listener.accept().await.unwrap();
        tokio_tungstenite::accept_async(stream).await.unwrap()
    }

    async fn next_message(ws: &mut WebSocketStream<TcpStream>) -> FeedbackMessage {
        loop {
            match ws.next().await {
                Some(Ok(WsMessage::Text(text))) => return FeedbackMessage::from_json(&text).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("connection ended: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_frames_queued_before_reconnect_are_discarded() {
        let (listener, config) = local_service().await;
        let (first_tx, first_rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            ws.close(None).await.unwrap();
            drop(ws);

            let mut ws = accept(&listener).await;
            let _ = first_tx.send(next_message(&mut ws).await);
            while ws.next().await.is_some() {}
        });

        let (handle, mut events) = Transport::spawn(config);
        assert_eq!(events.recv().await, Some(ChannelEvent::Connected));
        assert_eq!(events.recv().await, Some(ChannelEvent::Disconnected));

        let frames = handle.sender();
        for seq in 1..=3 {
            frames
                .try_send(FeedbackMessage::frame(vec![1], seq * 100, seq))
                .unwrap();
        }

        assert_eq!(events.recv().await, Some(ChannelEvent::Connected));
        frames
            .try_send(FeedbackMessage::frame(vec![2], 900, 9))
            .unwrap();

        match first_rx.await.unwrap() {
            FeedbackMessage::Frame(frame) => assert_eq!(frame.seq, 9),
            other => panic!("expected a fresh frame, got {:?}", other),
        }
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_delivers_end_session_and_waits_for_reply() {
        let (listener, config) = local_service().await;

        tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            loop {
                if let FeedbackMessage::EndSession(_) = next_message(&mut ws).await {
                    break;
                }
            }
            let reply = FeedbackMessage::SessionSaved {
                message: "Session saved successfully".into(),
            };
            ws.send(WsMessage::Text(reply.to_json().unwrap().into()))
                .await
                .unwrap();
            while ws.next().await.is_some() {}
        });

        let (handle, mut events) = Transport::spawn(config);
        assert_eq!(events.recv().await, Some(ChannelEvent::Connected));

        handle
            .control_sender()
            .try_send(FeedbackMessage::end_session("s-1", "patient-1", "program-1"))
            .unwrap();
        handle.shutdown().await.unwrap();

        assert_eq!(
            events.recv().await,
            Some(ChannelEvent::Message(FeedbackMessage::SessionSaved {
                message: "Session saved successfully".into()
            }))
        );
        assert_eq!(events.recv().await, None);
    }

    #[tokio::test]
    async fn test_unreachable_service_reports_failures_then_gives_up() {
        // Port 9 (discard) on localhost is closed in test environments.
        let config = TransportConfig {
            url: "ws://127.0.0.1:9/feedback".into(),
            connect_timeout: Duration::from_millis(500),
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            max_retries: 2,
            ..Default::default()
        };

        let (handle, mut events) = Transport::spawn(config);

        assert_eq!(events.recv().await, Some(ChannelEvent::RetryFailed { attempt: 1 }));
        assert_eq!(events.recv().await, Some(ChannelEvent::RetryFailed { attempt: 2 }));
        assert_eq!(events.recv().await, Some(ChannelEvent::GaveUp));
        assert_eq!(events.recv().await, None);
        assert!(!handle.is_connected().await);
    }
}
