//! # Session Controller
//!
//! Runs one exercise session: owns its state, its timers, the camera and the
//! feedback subscription, and applies every input through the reducer.
//!
//! ## Actor Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SessionActor (one task)                        │
//! │                                                                         │
//! │   SessionHandle ──► commands ──┐                                        │
//! │                                │   biased select!                       │
//! │   dwell timer (one-shot) ──────┤   1. commands                          │
//! │                                ├─► 2. dwell expiry                      │
//! │   FeedbackSubscription ────────┤   3. channel events                    │
//! │   Farewell (after close) ──────┤   4. save reply or its deadline        │
//! │                                │   5. frame cadence tick                │
//! │   frame cadence (interval) ────┘                                        │
//! │                                                                         │
//! │   every input ──► SessionState::apply ──► effects, run in order         │
//! │                                                                         │
//! │   effects touch: cadence │ dwell │ subscription │ camera │ sink         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing outside the actor mutates the state. Timers and the subscription
//! are owned fields, so dropping them on teardown cancels them: no callback
//! can fire after the session has completed.

use std::collections::VecDeque;
use std::future::pending;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, sleep, Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, error, info, warn};

use physio_core::{
    AnnotatedFrame, CameraError, ChannelError, Effect, LinkEvent, SessionId, SessionInput,
    SessionPlan, SessionRules, SessionState, UserIntent, DEFAULT_DWELL_MS,
    DEFAULT_FRAME_INTERVAL_MS,
};

use crate::camera::{CaptureDevice, DeviceGate, DeviceLease};
use crate::error::{LiveError, LiveResult};
use crate::feedback::{ChannelEvent, Farewell, FeedbackSource, FeedbackSubscription};
use crate::protocol::FeedbackMessage;
use crate::sink::CompletionSink;

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Things worth telling the user that are not part of the session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// Camera acquisition failed; a retry is possible.
    CameraFailed { error: CameraError },
    /// The analysis service acknowledged a save.
    FeedbackSaved { message: String },
    /// The analysis service reported an error.
    FeedbackError { message: String },
    /// The completion sink accepted the summary.
    SummaryRecorded { session_id: SessionId },
    /// The completion sink failed. The session is still complete.
    SummaryFailed { message: String },
}

/// Receives session updates (implemented by the view layer).
pub trait SessionEventEmitter: Send + Sync {
    /// Called after every input that changed the state.
    fn emit_state(&self, state: &SessionState);

    /// Swaps the displayed annotated frame.
    fn present_frame(&self, frame: &AnnotatedFrame);

    fn emit_notice(&self, notice: &SessionNotice);
}

/// No-op event emitter for testing.
pub struct NoOpEmitter;

impl SessionEventEmitter for NoOpEmitter {
    fn emit_state(&self, _state: &SessionState) {}
    fn present_frame(&self, _frame: &AnnotatedFrame) {}
    fn emit_notice(&self, _notice: &SessionNotice) {}
}

/// Logs state changes and notices. Used by the terminal runner.
pub struct TracingEmitter;

impl SessionEventEmitter for TracingEmitter {
    fn emit_state(&self, state: &SessionState) {
        info!(
            session_id = %state.session_id,
            status = %state.status,
            set = state.current_set,
            rep = state.current_rep,
            alert = state.active_alert.as_ref().map(|a| a.message.as_str()),
            link = ?state.link,
            banner = state.link_banner,
            "Session state"
        );
    }

    fn present_frame(&self, frame: &AnnotatedFrame) {
        debug!(bytes = frame.image.len(), frame_ts_ms = ?frame.frame_ts_ms, "Annotated frame");
    }

    fn emit_notice(&self, notice: &SessionNotice) {
        info!(?notice, "Session notice");
    }
}

// =============================================================================
// Settings
// =============================================================================

/// Runtime timing for a controller.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Frame capture cadence while running.
    pub frame_interval: Duration,

    /// How long a correction alert holds the session.
    pub dwell: Duration,

    /// How long a completed session listens for the service's reply to
    /// `end_session`.
    pub save_reply_timeout: Duration,

    /// Command queue depth per session.
    pub command_buffer: usize,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        ControllerSettings {
            frame_interval: Duration::from_millis(DEFAULT_FRAME_INTERVAL_MS),
            dwell: Duration::from_millis(DEFAULT_DWELL_MS),
            save_reply_timeout: Duration::from_secs(3),
            command_buffer: 32,
        }
    }
}

impl ControllerSettings {
    /// Replaces zero durations and buffers with their defaults.
    pub fn normalized(mut self) -> Self {
        let defaults = ControllerSettings::default();
        if self.frame_interval.is_zero() {
            warn!(fallback = ?defaults.frame_interval, "Frame interval must be non-zero, using default");
            self.frame_interval = defaults.frame_interval;
        }
        if self.dwell.is_zero() {
            warn!(fallback = ?defaults.dwell, "Dwell must be non-zero, using default");
            self.dwell = defaults.dwell;
        }
        if self.command_buffer == 0 {
            self.command_buffer = defaults.command_buffer;
        }
        self
    }
}

// =============================================================================
// Commands & Handle
// =============================================================================

#[derive(Debug)]
enum Command {
    StartCamera {
        reply: oneshot::Sender<Result<(), CameraError>>,
    },
    StopCamera {
        reply: oneshot::Sender<()>,
    },
    Intent {
        intent: UserIntent,
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionState>,
    },
    Leave {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to a running session.
///
/// Every call waits until the actor has applied it, so a `state()` issued
/// after `pause()` returns observes the pause.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    session_id: SessionId,
}

impl SessionHandle {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Acquires the camera. On success the session starts running and the
    /// feedback channel opens. Failures leave the session waiting for a retry.
    pub async fn start_camera(&self) -> LiveResult<()> {
        self.request(|reply| Command::StartCamera { reply })
            .await?
            .map_err(LiveError::from)
    }

    /// Releases the camera without ending the session.
    pub async fn stop_camera(&self) -> LiveResult<()> {
        self.request(|reply| Command::StopCamera { reply }).await
    }

    pub async fn pause(&self) -> LiveResult<()> {
        self.intent(UserIntent::Pause).await
    }

    pub async fn resume(&self) -> LiveResult<()> {
        self.intent(UserIntent::Resume).await
    }

    pub async fn skip_rep(&self) -> LiveResult<()> {
        self.intent(UserIntent::SkipRep).await
    }

    /// Goes back to rep 1 of set 1.
    pub async fn reset_progress(&self) -> LiveResult<()> {
        self.intent(UserIntent::ResetProgress).await
    }

    /// Completes the session and records its summary. Idempotent.
    pub async fn end_session(&self) -> LiveResult<()> {
        match self.intent(UserIntent::End).await {
            Err(LiveError::SessionClosed) => Ok(()),
            other => other,
        }
    }

    /// Tears the session down without a summary and stops the actor.
    /// Returns once the camera has been released. Idempotent.
    pub async fn leave(&self) -> LiveResult<()> {
        match self.request(|reply| Command::Leave { reply }).await {
            Err(LiveError::SessionClosed) => Ok(()),
            other => other,
        }
    }

    /// Snapshot of the current state.
    pub async fn state(&self) -> LiveResult<SessionState> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// True once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn intent(&self, intent: UserIntent) -> LiveResult<()> {
        self.request(|reply| Command::Intent { intent, reply }).await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> LiveResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| LiveError::SessionClosed)?;
        response.await.map_err(|_| LiveError::SessionClosed)
    }
}

// =============================================================================
// Controller (builder + spawner)
// =============================================================================

/// Spawns sessions that share a camera gate, a sink and an emitter.
#[derive(Clone)]
pub struct SessionController {
    gate: DeviceGate,
    sink: Arc<dyn CompletionSink>,
    emitter: Arc<dyn SessionEventEmitter>,
    settings: ControllerSettings,
    rules: SessionRules,
}

impl SessionController {
    pub fn new(gate: DeviceGate, sink: Arc<dyn CompletionSink>) -> Self {
        SessionController {
            gate,
            sink,
            emitter: Arc::new(NoOpEmitter),
            settings: ControllerSettings::default(),
            rules: SessionRules::default(),
        }
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn SessionEventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    /// Zero durations fall back to the defaults; see [`ControllerSettings::normalized`].
    pub fn with_settings(mut self, settings: ControllerSettings) -> Self {
        self.settings = settings.normalized();
        self
    }

    pub fn with_rules(mut self, rules: SessionRules) -> Self {
        self.rules = rules;
        self
    }

    /// Creates a session for `plan` and starts its actor.
    ///
    /// The session starts `Idle`; nothing is acquired until `start_camera()`.
    pub fn spawn(
        &self,
        plan: SessionPlan,
        camera: Box<dyn CaptureDevice>,
        feedback: Arc<dyn FeedbackSource>,
    ) -> LiveResult<SessionHandle> {
        let state = SessionState::new(&plan, self.rules)?;
        let session_id = state.session_id.clone();
        let (commands_tx, commands_rx) = mpsc::channel(self.settings.command_buffer);

        info!(
            session_id = %session_id,
            user_id = %plan.user_id,
            program_id = %plan.program_id,
            camera = camera.name(),
            feedback = feedback.name(),
            "Session created"
        );

        let actor = SessionActor {
            state,
            plan,
            settings: self.settings.clone(),
            gate: self.gate.clone(),
            camera,
            lease: None,
            feedback,
            link: None,
            farewell: None,
            sink: self.sink.clone(),
            emitter: self.emitter.clone(),
            cadence: None,
            dwell: None,
            started_at: Instant::now(),
            frame_seq: 0,
            frames_dropped: 0,
            abandoning: false,
        };
        tokio::spawn(actor.run(commands_rx));

        Ok(SessionHandle {
            commands: commands_tx,
            session_id,
        })
    }
}

// =============================================================================
// Supervisor
// =============================================================================

/// Keeps at most one session alive. Beginning a new one leaves the previous
/// one first, so its camera is released before the new session can ask.
pub struct SessionSupervisor {
    controller: SessionController,
    current: Option<SessionHandle>,
}

impl SessionSupervisor {
    pub fn new(controller: SessionController) -> Self {
        SessionSupervisor {
            controller,
            current: None,
        }
    }

    pub async fn begin(
        &mut self,
        plan: SessionPlan,
        camera: Box<dyn CaptureDevice>,
        feedback: Arc<dyn FeedbackSource>,
    ) -> LiveResult<SessionHandle> {
        if let Some(previous) = self.current.take() {
            debug!(session_id = %previous.session_id(), "Leaving previous session");
            previous.leave().await?;
        }

        let handle = self.controller.spawn(plan, camera, feedback)?;
        self.current = Some(handle.clone());
        Ok(handle)
    }

    pub fn current(&self) -> Option<&SessionHandle> {
        self.current.as_ref()
    }

    pub async fn shutdown(&mut self) -> LiveResult<()> {
        if let Some(handle) = self.current.take() {
            handle.leave().await?;
        }
        Ok(())
    }
}

// =============================================================================
// Session Actor
// =============================================================================

struct SessionActor {
    state: SessionState,
    plan: SessionPlan,
    settings: ControllerSettings,

    gate: DeviceGate,
    camera: Box<dyn CaptureDevice>,
    /// Held from acquisition until the camera is released.
    lease: Option<DeviceLease>,

    feedback: Arc<dyn FeedbackSource>,
    link: Option<FeedbackSubscription>,
    /// Closed subscription still waiting for the reply to `end_session`.
    farewell: Option<(Farewell, Pin<Box<Sleep>>)>,

    sink: Arc<dyn CompletionSink>,
    emitter: Arc<dyn SessionEventEmitter>,

    cadence: Option<Interval>,
    /// Pending dwell timer and the alert generation it belongs to.
    dwell: Option<(u64, Pin<Box<Sleep>>)>,

    started_at: Instant,
    frame_seq: u64,
    frames_dropped: u64,
    /// Set while leaving; suppresses the end-session message.
    abandoning: bool,
}

impl SessionActor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        debug!(session_id = %self.state.session_id, "Session actor started");
        self.emitter.emit_state(&self.state);

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(command) => {
                        if let ControlFlow::Break(reply) = self.handle_command(command).await {
                            commands.close();
                            let _ = reply.send(());
                            break;
                        }
                    }
                    None => {
                        debug!(session_id = %self.state.session_id, "All handles dropped");
                        self.abandon().await;
                        break;
                    }
                },

                generation = dwell_elapsed(&mut self.dwell) => {
                    self.dwell = None;
                    self.dispatch(SessionInput::DwellElapsed { generation }).await;
                }

                event = next_channel_event(&mut self.link) => {
                    self.on_channel_event(event).await;
                }

                reply = save_reply(&mut self.farewell) => {
                    self.farewell = None;
                    match reply {
                        Some(message) => self.on_service_reply(message),
                        None => debug!(session_id = %self.state.session_id, "No reply to end_session"),
                    }
                }

                _ = next_tick(&mut self.cadence) => {
                    self.capture_frame().await;
                }
            }
        }

        info!(
            session_id = %self.state.session_id,
            status = %self.state.status,
            frames_sent = self.frame_seq,
            frames_dropped = self.frames_dropped,
            "Session actor stopped"
        );
    }

    /// Breaks with the reply of a `Leave`, to be sent once the queue is closed.
    async fn handle_command(&mut self, command: Command) -> ControlFlow<oneshot::Sender<()>> {
        match command {
            Command::StartCamera { reply } => {
                let result = self.start_camera().await;
                let _ = reply.send(result);
            }
            Command::StopCamera { reply } => {
                self.dispatch(SessionInput::CameraStopped).await;
                let _ = reply.send(());
            }
            Command::Intent { intent, reply } => {
                debug!(?intent, "User intent");
                self.dispatch(SessionInput::User(intent)).await;
                let _ = reply.send(());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.state.clone());
            }
            Command::Leave { reply } => {
                self.abandon().await;
                return ControlFlow::Break(reply);
            }
        }
        ControlFlow::Continue(())
    }

    // =========================================================================
    // Camera
    // =========================================================================

    async fn start_camera(&mut self) -> Result<(), CameraError> {
        if self.state.is_completed() || self.state.camera_active {
            return Ok(());
        }

        self.dispatch(SessionInput::CameraRequested).await;

        match self.acquire_camera().await {
            Ok(lease) => {
                info!(session_id = %self.state.session_id, camera = self.camera.name(), "Camera acquired");
                self.lease = Some(lease);
                self.dispatch(SessionInput::CameraAcquired).await;
                Ok(())
            }
            Err(err) => {
                warn!(session_id = %self.state.session_id, %err, "Camera acquisition failed");
                self.dispatch(SessionInput::CameraFailed(err)).await;
                self.emitter
                    .emit_notice(&SessionNotice::CameraFailed { error: err });
                Err(err)
            }
        }
    }

    /// Gate first, then the device. The lease is dropped if opening fails.
    async fn acquire_camera(&mut self) -> Result<DeviceLease, CameraError> {
        let lease = self.gate.acquire().await?;
        self.camera.open().await?;
        Ok(lease)
    }

    async fn release_camera(&mut self) {
        self.camera.close().await;
        self.lease = None;
        debug!(session_id = %self.state.session_id, "Camera released");
    }

    async fn capture_frame(&mut self) {
        if !self.state.emits_frames() || self.link.is_none() {
            self.cadence = None;
            return;
        }

        let image = match self.camera.capture().await {
            Ok(image) => image,
            Err(err) => {
                warn!(%err, "Frame capture failed");
                return;
            }
        };

        self.frame_seq += 1;
        let message = FeedbackMessage::frame(image, self.elapsed_ms(), self.frame_seq);

        if let Some(link) = &self.link {
            match link.try_send(message) {
                Ok(()) => {}
                Err(ChannelError::SendFailed) => {
                    self.frames_dropped += 1;
                    debug!(seq = self.frame_seq, "Outbound queue full, frame dropped");
                }
                Err(ChannelError::Disconnected) => {
                    debug!(seq = self.frame_seq, "Feedback channel closed, frame dropped");
                }
            }
        }
    }

    // =========================================================================
    // Feedback Channel
    // =========================================================================

    async fn on_channel_event(&mut self, event: Option<ChannelEvent>) {
        let input = match event {
            None => {
                warn!(session_id = %self.state.session_id, "Feedback source closed");
                self.link = None;
                SessionInput::Link(LinkEvent::GaveUp)
            }
            Some(ChannelEvent::Connected) => SessionInput::Link(LinkEvent::Connected),
            Some(ChannelEvent::Disconnected) => SessionInput::Link(LinkEvent::Lost),
            Some(ChannelEvent::RetryFailed { attempt }) => {
                SessionInput::Link(LinkEvent::RetryFailed { attempt })
            }
            Some(ChannelEvent::GaveUp) => SessionInput::Link(LinkEvent::GaveUp),
            Some(ChannelEvent::Message(
                message @ (FeedbackMessage::SessionSaved { .. }
                | FeedbackMessage::SessionError { .. }),
            )) => {
                self.on_service_reply(message);
                return;
            }
            Some(ChannelEvent::Message(message)) => {
                let kind = message.type_name();
                match message.into_feedback_event() {
                    Ok(Some(event)) => SessionInput::Feedback(event),
                    Ok(None) => {
                        debug!(kind, "Ignoring inbound message");
                        return;
                    }
                    Err(e) => {
                        warn!(kind, error = %e, "Dropping malformed feedback message");
                        return;
                    }
                }
            }
        };

        self.dispatch(input).await;
    }

    fn on_service_reply(&self, message: FeedbackMessage) {
        match message {
            FeedbackMessage::SessionSaved { message } => {
                info!(%message, "Feedback service saved session");
                self.emitter
                    .emit_notice(&SessionNotice::FeedbackSaved { message });
            }
            FeedbackMessage::SessionError { error } => {
                warn!(%error, "Feedback service reported an error");
                self.emitter
                    .emit_notice(&SessionNotice::FeedbackError { message: error });
            }
            other => debug!(kind = other.type_name(), "Ignoring service reply"),
        }
    }

    /// Sends `end_session` unless leaving, then keeps listening for the
    /// reply until `save_reply_timeout`.
    fn close_feedback_channel(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };

        if self.abandoning {
            drop(link.close());
            debug!(session_id = %self.state.session_id, "Feedback channel closed");
            return;
        }

        let end = FeedbackMessage::end_session(
            self.state.session_id.as_str(),
            &self.plan.user_id,
            &self.plan.program_id,
        );
        match link.try_send(end) {
            Ok(()) => {
                let deadline = Box::pin(sleep(self.settings.save_reply_timeout));
                self.farewell = Some((link.close(), deadline));
            }
            Err(e) => {
                warn!(error = %e, "Could not queue end_session");
                drop(link.close());
            }
        }
        debug!(session_id = %self.state.session_id, "Feedback channel closed");
    }

    // =========================================================================
    // Reducer Plumbing
    // =========================================================================

    /// Applies an input and every follow-up input its effects produce.
    async fn dispatch(&mut self, input: SessionInput) {
        let before = self.state.clone();
        let mut queue = VecDeque::from([input]);

        while let Some(input) = queue.pop_front() {
            let effects = self.state.apply(input);
            for effect in effects {
                if let Some(follow_up) = self.run_effect(effect).await {
                    queue.push_back(follow_up);
                }
            }
        }

        if self.state.status != before.status {
            info!(
                session_id = %self.state.session_id,
                from = %before.status,
                to = %self.state.status,
                "Session transition"
            );
        }
        if self.state != before {
            self.emitter.emit_state(&self.state);
        }
    }

    async fn run_effect(&mut self, effect: Effect) -> Option<SessionInput> {
        match effect {
            Effect::StopFrameCadence => {
                self.cadence = None;
            }
            Effect::StartFrameCadence => {
                let period = self.settings.frame_interval;
                let mut cadence = interval_at(Instant::now() + period, period);
                cadence.set_missed_tick_behavior(MissedTickBehavior::Skip);
                self.cadence = Some(cadence);
            }
            Effect::ScheduleDwell { generation } => {
                self.dwell = Some((generation, Box::pin(sleep(self.settings.dwell))));
            }
            Effect::CancelDwell => {
                self.dwell = None;
            }
            Effect::OpenFeedbackChannel => match self.feedback.subscribe() {
                Ok(subscription) => {
                    info!(
                        session_id = %self.state.session_id,
                        source = self.feedback.name(),
                        "Feedback channel opened"
                    );
                    self.link = Some(subscription);
                }
                Err(e) => {
                    warn!(error = %e, "Feedback subscription failed; continuing without live feedback");
                    return Some(SessionInput::Link(LinkEvent::GaveUp));
                }
            },
            Effect::CloseFeedbackChannel => self.close_feedback_channel(),
            Effect::ReleaseCamera => self.release_camera().await,
            Effect::PresentFrame(frame) => self.emitter.present_frame(&frame),
            Effect::RecordSummary => self.record_summary(),
        }
        None
    }

    /// Hands the summary to the sink without blocking the actor.
    fn record_summary(&self) {
        let summary = self
            .state
            .summary(&self.plan, self.elapsed_ms(), chrono::Utc::now());
        let sink = self.sink.clone();
        let emitter = self.emitter.clone();

        tokio::spawn(async move {
            match sink.record(&summary).await {
                Ok(()) => emitter.emit_notice(&SessionNotice::SummaryRecorded {
                    session_id: summary.session_id.clone(),
                }),
                Err(e) => {
                    error!(session_id = %summary.session_id, error = %e, "Failed to record session summary");
                    emitter.emit_notice(&SessionNotice::SummaryFailed {
                        message: e.to_string(),
                    });
                }
            }
        });
    }

    /// Teardown without a summary.
    async fn abandon(&mut self) {
        self.abandoning = true;
        self.dispatch(SessionInput::Abandoned).await;

        // Completed sessions have nothing left; this covers a camera that was
        // stopped but never released through the reducer.
        self.dwell = None;
        self.cadence = None;
        if self.lease.is_some() {
            self.release_camera().await;
        }
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started_at.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

async fn dwell_elapsed(dwell: &mut Option<(u64, Pin<Box<Sleep>>)>) -> u64 {
    match dwell {
        Some((generation, timer)) => {
            timer.as_mut().await;
            *generation
        }
        None => pending().await,
    }
}

async fn next_channel_event(link: &mut Option<FeedbackSubscription>) -> Option<ChannelEvent> {
    match link {
        Some(subscription) => subscription.recv().await,
        None => pending().await,
    }
}

async fn save_reply(farewell: &mut Option<(Farewell, Pin<Box<Sleep>>)>) -> Option<FeedbackMessage> {
    match farewell {
        Some((farewell, deadline)) => tokio::select! {
            reply = farewell.reply() => reply,
            _ = deadline.as_mut() => None,
        },
        None => pending().await,
    }
}

async fn next_tick(cadence: &mut Option<Interval>) {
    match cadence {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
