//! # Feedback Sources
//!
//! The seam between a session and whatever produces form feedback.
//!
//! ## Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        FeedbackSource                                   │
//! │                                                                         │
//! │   subscribe() ──► FeedbackSubscription                                 │
//! │                    ├── frames:   bounded, drops when full (try_send)   │
//! │                    ├── control:  end_session, never behind frames      │
//! │                    ├── inbound:  ChannelEvent stream                   │
//! │                    └── close() ──► Farewell (waits for the save reply) │
//! │                                                                         │
//! │  ┌──────────────────┐ ┌──────────────────┐ ┌──────────────────┐        │
//! │  │ RemoteFeedback   │ │ SimulatedFeedback│ │ ScriptedFeedback │        │
//! │  │ WebSocket to the │ │ Random cues on a │ │ Driven by a test │        │
//! │  │ analysis service │ │ fixed interval   │ │ or a demo script │        │
//! │  └──────────────────┘ └──────────────────┘ └──────────────────┘        │
//! │                                                                         │
//! │  OfflineFeedback refuses every subscription.                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tracing::debug;

use physio_core::{BodyPart, ChannelError};

use crate::error::{LiveError, LiveResult};
use crate::protocol::FeedbackMessage;
use crate::transport::{Transport, TransportConfig};

/// Outbound queue depth. Frames beyond this are dropped, never buffered.
pub const OUTBOUND_CAPACITY: usize = 8;

/// Control queue depth. A session sends at most one `end_session`.
pub const CONTROL_CAPACITY: usize = 4;

/// Inbound event queue depth.
pub const INBOUND_CAPACITY: usize = 64;

// =============================================================================
// Channel Events
// =============================================================================

/// Everything a subscription delivers to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The link is up.
    Connected,
    /// The link dropped; the source is reconnecting.
    Disconnected,
    /// A reconnect attempt failed.
    RetryFailed { attempt: u32 },
    /// The source stopped trying.
    GaveUp,
    /// A protocol message from the service.
    Message(FeedbackMessage),
}

// =============================================================================
// Subscription
// =============================================================================

/// A live subscription to a feedback source.
///
/// Frames and control messages travel on separate queues so a backlog of
/// frames can never crowd out `end_session`.
pub struct FeedbackSubscription {
    frames: mpsc::Sender<FeedbackMessage>,
    control: mpsc::Sender<FeedbackMessage>,
    inbound: mpsc::Receiver<ChannelEvent>,
    shutdown_tx: mpsc::Sender<()>,
}

impl FeedbackSubscription {
    pub fn new(
        frames: mpsc::Sender<FeedbackMessage>,
        control: mpsc::Sender<FeedbackMessage>,
        inbound: mpsc::Receiver<ChannelEvent>,
        shutdown_tx: mpsc::Sender<()>,
    ) -> Self {
        FeedbackSubscription {
            frames,
            control,
            inbound,
            shutdown_tx,
        }
    }

    /// Queues a message without waiting. Frames go to the frame queue and are
    /// dropped when it is full; everything else goes to the control queue.
    pub fn try_send(&self, message: FeedbackMessage) -> Result<(), ChannelError> {
        let queue = match message {
            FeedbackMessage::Frame(_) => &self.frames,
            _ => &self.control,
        };
        queue.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => ChannelError::SendFailed,
            TrySendError::Closed(_) => ChannelError::Disconnected,
        })
    }

    /// Next event. `None` once the source is gone.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.inbound.recv().await
    }

    /// Unsubscribes. Queued control messages are still delivered; queued
    /// frames are not. The returned [`Farewell`] carries the service's reply
    /// to `end_session`. Dropping it closes the inbound side.
    pub fn close(self) -> Farewell {
        let _ = self.shutdown_tx.try_send(());
        Farewell {
            inbound: self.inbound,
        }
    }
}

/// Inbound side of a closed subscription.
pub struct Farewell {
    inbound: mpsc::Receiver<ChannelEvent>,
}

impl Farewell {
    /// Waits for `session_saved` or `session_error`, skipping anything else.
    /// `None` once the source has stopped. Cancel safe.
    pub async fn reply(&mut self) -> Option<FeedbackMessage> {
        while let Some(event) = self.inbound.recv().await {
            if let ChannelEvent::Message(
                message @ (FeedbackMessage::SessionSaved { .. }
                | FeedbackMessage::SessionError { .. }),
            ) = event
            {
                return Some(message);
            }
        }
        None
    }
}

// =============================================================================
// Source Trait
// =============================================================================

/// Producer of feedback subscriptions. One subscription per session.
pub trait FeedbackSource: Send + Sync {
    /// Opens a new subscription. Must be called inside a Tokio runtime.
    fn subscribe(&self) -> LiveResult<FeedbackSubscription>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

// =============================================================================
// Remote Source
// =============================================================================

/// WebSocket connection to the pose-analysis service.
pub struct RemoteFeedback {
    config: TransportConfig,
}

impl RemoteFeedback {
    /// Creates a remote source after checking the URL.
    pub fn new(config: TransportConfig) -> LiveResult<Self> {
        let url = url::Url::parse(&config.url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(LiveError::InvalidUrl(format!(
                "Feedback URL must start with ws:// or wss://, got: {}",
                config.url
            )));
        }
        Ok(RemoteFeedback { config })
    }
}

impl FeedbackSource for RemoteFeedback {
    fn subscribe(&self) -> LiveResult<FeedbackSubscription> {
        let (handle, events) = Transport::spawn(self.config.clone());
        debug!(url = %self.config.url, "Remote feedback subscribed");
        Ok(FeedbackSubscription::new(
            handle.sender(),
            handle.control_sender(),
            events,
            handle.shutdown_sender(),
        ))
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

// =============================================================================
// Offline Source
// =============================================================================

/// No feedback service. Every subscription is refused, so sessions run with
/// the "live feedback unavailable" banner.
pub struct OfflineFeedback;

impl FeedbackSource for OfflineFeedback {
    fn subscribe(&self) -> LiveResult<FeedbackSubscription> {
        Err(LiveError::ChannelError("Live feedback is disabled".into()))
    }

    fn name(&self) -> &'static str {
        "offline"
    }
}

// =============================================================================
// Scripted Source
// =============================================================================

/// Deterministic source whose events are pushed by the holder of the
/// matching [`ScriptController`].
///
/// ## Usage
/// ```rust,ignore
/// let (source, mut script) = ScriptedFeedback::new();
/// let handle = controller.spawn(plan, camera, Arc::new(source))?;
/// handle.start_camera().await?;
///
/// let mut peer = script.next_peer().await.unwrap();
/// peer.connect().await;
/// peer.alert("Tuck your elbows in!", BodyPart::UpperArm, None).await;
/// ```
pub struct ScriptedFeedback {
    peers_tx: mpsc::UnboundedSender<ScriptedPeer>,
}

/// Receives the far end of every subscription made on a [`ScriptedFeedback`].
pub struct ScriptController {
    peers_rx: mpsc::UnboundedReceiver<ScriptedPeer>,
}

impl ScriptedFeedback {
    pub fn new() -> (ScriptedFeedback, ScriptController) {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        (ScriptedFeedback { peers_tx }, ScriptController { peers_rx })
    }
}

impl FeedbackSource for ScriptedFeedback {
    fn subscribe(&self) -> LiveResult<FeedbackSubscription> {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(INBOUND_CAPACITY);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        self.peers_tx
            .send(ScriptedPeer {
                events_tx,
                outbound_rx,
                control_rx,
                shutdown_rx,
                closed: false,
            })
            .map_err(|_| LiveError::ChannelError("Script controller dropped".into()))?;

        Ok(FeedbackSubscription::new(
            outbound_tx,
            control_tx,
            events_rx,
            shutdown_tx,
        ))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

impl ScriptController {
    /// Waits for the next subscription.
    pub async fn next_peer(&mut self) -> Option<ScriptedPeer> {
        self.peers_rx.recv().await
    }

    /// Returns a subscription made earlier, if any.
    pub fn try_next_peer(&mut self) -> Option<ScriptedPeer> {
        self.peers_rx.try_recv().ok()
    }
}

/// The service side of one scripted subscription.
pub struct ScriptedPeer {
    events_tx: mpsc::Sender<ChannelEvent>,
    outbound_rx: mpsc::Receiver<FeedbackMessage>,
    control_rx: mpsc::Receiver<FeedbackMessage>,
    shutdown_rx: mpsc::Receiver<()>,
    closed: bool,
}

impl ScriptedPeer {
    /// Pushes a raw event. Returns false once the subscriber is gone.
    pub async fn send(&self, event: ChannelEvent) -> bool {
        self.events_tx.send(event).await.is_ok()
    }

    pub async fn connect(&self) -> bool {
        self.send(ChannelEvent::Connected).await
    }

    pub async fn lose_connection(&self) -> bool {
        self.send(ChannelEvent::Disconnected).await
    }

    pub async fn retry_failed(&self, attempt: u32) -> bool {
        self.send(ChannelEvent::RetryFailed { attempt }).await
    }

    pub async fn alert(&self, message: &str, body_part: BodyPart, timestamp_ms: Option<u64>) -> bool {
        self.send(ChannelEvent::Message(FeedbackMessage::correction_alert(
            message,
            body_part,
            timestamp_ms,
        )))
        .await
    }

    pub async fn encourage(&self, message: &str) -> bool {
        self.send(ChannelEvent::Message(FeedbackMessage::encouragement(message)))
            .await
    }

    pub async fn annotate(&self, image: Vec<u8>, frame_ts_ms: Option<u64>) -> bool {
        self.send(ChannelEvent::Message(FeedbackMessage::annotated_frame(
            image,
            frame_ts_ms,
        )))
        .await
    }

    /// Next frame the session sent. `None` once the subscription is dropped.
    pub async fn next_frame(&mut self) -> Option<FeedbackMessage> {
        self.outbound_rx.recv().await
    }

    /// Drains everything queued so far: frames first, then control messages.
    pub fn drain_outbound(&mut self) -> Vec<FeedbackMessage> {
        let mut drained = Vec::new();
        while let Ok(message) = self.outbound_rx.try_recv() {
            drained.push(message);
        }
        while let Ok(message) = self.control_rx.try_recv() {
            drained.push(message);
        }
        drained
    }

    /// Answers `end_session` the way the analysis service does.
    pub async fn acknowledge_save(&self, message: &str) -> bool {
        self.send(ChannelEvent::Message(FeedbackMessage::SessionSaved {
            message: message.to_string(),
        }))
        .await
    }

    /// True once the session closed its subscription.
    pub fn is_closed(&mut self) -> bool {
        if !self.closed {
            self.closed = match self.shutdown_rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => true,
                Err(TryRecvError::Empty) => false,
            };
        }
        self.closed
    }
}
