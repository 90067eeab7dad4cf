//! # Session State Machine
//!
//! `SessionState` and its reducer: `(SessionState, SessionInput) -> (SessionState, [Effect])`.
//!
//! ## Why a reducer
//! Every transition is a pure function of the current state and one input.
//! Timers, the camera and the feedback channel live in physio-live; the
//! reducer asks for them through [`Effect`]s and learns about them through
//! [`SessionInput`]s. Transitions can be tested without any I/O.
//!
//! ## Transition Table
//! ```text
//! ┌──────────────────┬──────────────────────────────┬─────────────────────────┐
//! │ status           │ input                        │ result                  │
//! ├──────────────────┼──────────────────────────────┼─────────────────────────┤
//! │ Idle             │ CameraRequested              │ AwaitingCamera          │
//! │ Idle/Awaiting    │ CameraAcquired               │ Running + open channel  │
//! │ Idle/Awaiting    │ CameraFailed(e)              │ AwaitingCamera, error=e │
//! │ Running          │ Pause                        │ Paused                  │
//! │ Paused           │ Resume                       │ Running                 │
//! │ Running/Paused   │ CorrectionAlert (fresh)      │ CorrectionPause + dwell │
//! │ CorrectionPause  │ Pause / Resume               │ queue / unqueue pause   │
//! │ CorrectionPause  │ DwellElapsed(current gen)    │ Paused if queued,       │
//! │                  │                              │ else Running            │
//! │ non-terminal     │ SkipRep at last rep/set      │ Completed + summary     │
//! │ non-terminal     │ End                          │ Completed + summary     │
//! │ non-terminal     │ Abandoned                    │ Completed, no summary   │
//! │ Completed        │ anything                     │ unchanged               │
//! └──────────────────┴──────────────────────────────┴─────────────────────────┘
//! ```
//!
//! ## Teardown Order
//! Ending (or abandoning) a session yields effects in this order:
//! `StopFrameCadence → CancelDwell → CloseFeedbackChannel → ReleaseCamera → RecordSummary`.
//! Effects that do not apply (no dwell active, camera already stopped) are omitted.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CameraError, CoreResult};
use crate::types::{
    AnnotatedFrame, BodyPart, CorrectionAlert, FeedbackEvent, FeedbackLink, LinkEvent, SessionId,
    SessionPlan, SessionStatus, SessionSummary, UserIntent,
};
use crate::validation::validate_plan;
use crate::{DEFAULT_FEEDBACK_MESSAGE, DEFAULT_FRAME_INTERVAL_MS, DEFAULT_RECONNECT_BANNER_AFTER};

// =============================================================================
// Session Rules
// =============================================================================

/// Per-session constants the reducer needs. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SessionRules {
    /// Length of one feedback cycle (one frame interval), in ms.
    /// A correction alert older than the displayed frame by more than this is stale.
    pub feedback_cycle_ms: u64,

    /// Consecutive reconnect failures before `link_banner` is raised.
    pub reconnect_banner_after: u32,
}

impl Default for SessionRules {
    fn default() -> Self {
        SessionRules {
            feedback_cycle_ms: DEFAULT_FRAME_INTERVAL_MS,
            reconnect_banner_after: DEFAULT_RECONNECT_BANNER_AFTER,
        }
    }
}

// =============================================================================
// Inputs and Effects
// =============================================================================

/// Everything that can drive a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionInput {
    /// `startCamera()` was called; acquisition is in flight.
    CameraRequested,
    /// Exclusive access to the capture device was granted.
    CameraAcquired,
    /// Acquisition failed.
    CameraFailed(CameraError),
    /// `stopCamera()` was called.
    CameraStopped,
    /// A user control.
    User(UserIntent),
    /// Data from the feedback channel.
    Feedback(FeedbackEvent),
    /// A dwell timer fired. Only the current generation counts.
    DwellElapsed { generation: u64 },
    /// Feedback channel connectivity changed.
    Link(LinkEvent),
    /// The view navigated away without ending the session.
    Abandoned,
}

/// Side effects requested by a transition, executed in order by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Cancel the periodic frame-capture timer.
    StopFrameCadence,
    /// Arm the periodic frame-capture timer.
    StartFrameCadence,
    /// Arm the correction dwell timer for `generation`.
    ScheduleDwell { generation: u64 },
    /// Cancel the active dwell timer.
    CancelDwell,
    /// Subscribe to the feedback channel.
    OpenFeedbackChannel,
    /// Unsubscribe from the feedback channel.
    CloseFeedbackChannel,
    /// Release the capture device.
    ReleaseCamera,
    /// Swap the displayed annotated frame.
    PresentFrame(AnnotatedFrame),
    /// Hand the session summary to the completion sink.
    RecordSummary,
}

/// Result of [`reduce`].
#[derive(Debug, Clone)]
pub struct Transition {
    pub state: SessionState,
    pub effects: Vec<Effect>,
}

// =============================================================================
// Session State
// =============================================================================

/// The single mutable aggregate of one exercise session.
///
/// ## Invariants
/// - `active_alert.is_some()` iff `status == CorrectionPause`
/// - `1 ≤ current_set ≤ total_sets`, `1 ≤ current_rep ≤ total_reps`
/// - progress never decreases except through `UserIntent::ResetProgress`
/// - once `Completed`, nothing but counters of dropped input changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SessionState {
    pub session_id: SessionId,
    pub status: SessionStatus,

    pub current_set: u32,
    pub current_rep: u32,
    pub total_sets: u32,
    pub total_reps: u32,

    /// Present only in `CorrectionPause`.
    pub active_alert: Option<CorrectionAlert>,
    /// Most recent encouragement text.
    pub last_feedback_message: String,
    /// User pause requested during a correction pause, applied on dwell expiry.
    pub pending_user_pause: bool,

    pub camera_active: bool,
    /// Last acquisition failure, cleared on success. Drives the retry affordance.
    pub camera_error: Option<CameraError>,

    pub link: FeedbackLink,
    /// Non-fatal "live feedback unavailable" banner.
    pub link_banner: bool,

    /// Capture timestamp of the annotated frame currently displayed.
    pub displayed_frame_ts_ms: Option<u64>,

    pub corrections: u32,
    pub stale_alerts_dropped: u32,
    pub frames_presented: u64,
    pub completed_all_reps: bool,

    /// Bumped for every accepted alert; ties dwell timers to their alert.
    pub dwell_generation: u64,

    pub rules: SessionRules,
}

impl SessionState {
    /// Creates the state for a validated plan.
    pub fn new(plan: &SessionPlan, rules: SessionRules) -> CoreResult<Self> {
        validate_plan(plan)?;

        Ok(SessionState {
            session_id: SessionId::generate(),
            status: SessionStatus::Idle,
            current_set: plan.start_set,
            current_rep: plan.start_rep,
            total_sets: plan.total_sets,
            total_reps: plan.total_reps,
            active_alert: None,
            last_feedback_message: DEFAULT_FEEDBACK_MESSAGE.to_string(),
            pending_user_pause: false,
            camera_active: false,
            camera_error: None,
            link: FeedbackLink::Offline,
            link_banner: false,
            displayed_frame_ts_ms: None,
            corrections: 0,
            stale_alerts_dropped: 0,
            frames_presented: 0,
            completed_all_reps: false,
            dwell_generation: 0,
            rules,
        })
    }

    /// Frames are captured and sent only while this holds.
    pub fn emits_frames(&self) -> bool {
        self.camera_active && self.status == SessionStatus::Running && self.link == FeedbackLink::Live
    }

    pub fn is_completed(&self) -> bool {
        self.status.is_terminal()
    }

    /// Builds the completion summary.
    pub fn summary(
        &self,
        plan: &SessionPlan,
        duration_ms: u64,
        ended_at: chrono::DateTime<chrono::Utc>,
    ) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            user_id: plan.user_id.clone(),
            program_id: plan.program_id.clone(),
            exercise: plan.exercise.clone(),
            final_set: self.current_set,
            final_rep: self.current_rep,
            duration_ms,
            corrections: self.corrections,
            completed_all_reps: self.completed_all_reps,
            ended_at,
        }
    }

    /// Applies one input in place and returns the effects to execute.
    pub fn apply(&mut self, input: SessionInput) -> Vec<Effect> {
        let was_emitting = self.emits_frames();
        let mut effects = Vec::new();

        match input {
            SessionInput::CameraRequested => self.on_camera_requested(),
            SessionInput::CameraAcquired => self.on_camera_acquired(&mut effects),
            SessionInput::CameraFailed(err) => self.on_camera_failed(err),
            SessionInput::CameraStopped => self.on_camera_stopped(&mut effects),
            SessionInput::User(intent) => self.on_user(intent, &mut effects),
            SessionInput::Feedback(event) => self.on_feedback(event, &mut effects),
            SessionInput::DwellElapsed { generation } => self.on_dwell_elapsed(generation),
            SessionInput::Link(event) => self.on_link(event),
            SessionInput::Abandoned => {
                if !self.is_completed() {
                    self.finish(&mut effects, false);
                }
            }
        }

        // Cadence changes bracket everything else: a stop happens before any
        // teardown step, a start only after the state is settled.
        let emitting = self.emits_frames();
        if was_emitting && !emitting {
            effects.insert(0, Effect::StopFrameCadence);
        } else if !was_emitting && emitting {
            effects.push(Effect::StartFrameCadence);
        }

        debug_assert_eq!(
            self.active_alert.is_some(),
            self.status == SessionStatus::CorrectionPause
        );

        effects
    }

    // =========================================================================
    // Camera
    // =========================================================================

    fn on_camera_requested(&mut self) {
        if self.status == SessionStatus::Idle {
            self.status = SessionStatus::AwaitingCamera;
        }
    }

    fn on_camera_acquired(&mut self, effects: &mut Vec<Effect>) {
        if self.is_completed() {
            // Acquisition finished after the session ended.
            effects.push(Effect::ReleaseCamera);
            return;
        }

        self.camera_active = true;
        self.camera_error = None;

        if matches!(self.status, SessionStatus::Idle | SessionStatus::AwaitingCamera) {
            self.status = SessionStatus::Running;
        }

        if !self.link.is_subscribed() {
            self.link = FeedbackLink::Connecting;
            effects.push(Effect::OpenFeedbackChannel);
        }
    }

    fn on_camera_failed(&mut self, err: CameraError) {
        if self.is_completed() {
            return;
        }

        self.camera_error = Some(err);
        if matches!(self.status, SessionStatus::Idle | SessionStatus::AwaitingCamera) {
            self.status = SessionStatus::AwaitingCamera;
        }
    }

    fn on_camera_stopped(&mut self, effects: &mut Vec<Effect>) {
        if self.camera_active {
            self.camera_active = false;
            effects.push(Effect::ReleaseCamera);
        }
    }

    // =========================================================================
    // User Intents
    // =========================================================================

    fn on_user(&mut self, intent: UserIntent, effects: &mut Vec<Effect>) {
        if self.is_completed() {
            return;
        }

        match intent {
            UserIntent::Pause => match self.status {
                SessionStatus::Running => self.status = SessionStatus::Paused,
                SessionStatus::CorrectionPause => self.pending_user_pause = true,
                _ => {}
            },
            UserIntent::Resume => match self.status {
                SessionStatus::Paused => self.status = SessionStatus::Running,
                SessionStatus::CorrectionPause => self.pending_user_pause = false,
                _ => {}
            },
            UserIntent::SkipRep => self.skip_rep(effects),
            UserIntent::ResetProgress => {
                self.current_rep = 1;
                self.current_set = 1;
            }
            UserIntent::End => self.finish(effects, true),
        }
    }

    fn skip_rep(&mut self, effects: &mut Vec<Effect>) {
        if self.current_rep < self.total_reps {
            self.current_rep += 1;
        } else if self.current_set < self.total_sets {
            self.current_rep = 1;
            self.current_set += 1;
        } else {
            self.completed_all_reps = true;
            self.finish(effects, true);
        }
    }

    /// Moves to `Completed` and tears everything down.
    fn finish(&mut self, effects: &mut Vec<Effect>, record: bool) {
        if self.status == SessionStatus::CorrectionPause {
            effects.push(Effect::CancelDwell);
        }
        self.active_alert = None;
        self.pending_user_pause = false;
        self.status = SessionStatus::Completed;

        if self.link.is_subscribed() {
            self.link = FeedbackLink::Offline;
            effects.push(Effect::CloseFeedbackChannel);
        }
        self.link_banner = false;

        if self.camera_active {
            self.camera_active = false;
            effects.push(Effect::ReleaseCamera);
        }

        if record {
            effects.push(Effect::RecordSummary);
        }
    }

    // =========================================================================
    // Feedback Events
    // =========================================================================

    fn on_feedback(&mut self, event: FeedbackEvent, effects: &mut Vec<Effect>) {
        if self.is_completed() {
            return;
        }

        match event {
            FeedbackEvent::AnnotatedFrame(frame) => {
                if !self.camera_active {
                    return;
                }
                // Last received wins, even if it was captured earlier.
                if let Some(ts) = frame.frame_ts_ms {
                    self.displayed_frame_ts_ms = Some(ts);
                }
                self.frames_presented += 1;
                effects.push(Effect::PresentFrame(frame));
            }
            FeedbackEvent::CorrectionAlert {
                message,
                body_part,
                frame_ts_ms,
            } => self.on_correction_alert(message, body_part, frame_ts_ms, effects),
            FeedbackEvent::Encouragement { message } => {
                self.last_feedback_message = message;
            }
        }
    }

    fn on_correction_alert(
        &mut self,
        message: String,
        body_part: BodyPart,
        frame_ts_ms: Option<u64>,
        effects: &mut Vec<Effect>,
    ) {
        let queued_pause = match self.status {
            SessionStatus::Running => false,
            // A pause the user asked for before the alert landed is kept as
            // the intent to restore once the correction clears.
            SessionStatus::Paused => true,
            _ => return,
        };

        if self.is_stale(frame_ts_ms) {
            self.stale_alerts_dropped += 1;
            return;
        }

        self.status = SessionStatus::CorrectionPause;
        self.active_alert = Some(CorrectionAlert { message, body_part });
        self.pending_user_pause = queued_pause;
        self.corrections += 1;
        self.dwell_generation += 1;
        effects.push(Effect::ScheduleDwell {
            generation: self.dwell_generation,
        });
    }

    /// An alert is stale when its frame predates the displayed one by more
    /// than one feedback cycle.
    fn is_stale(&self, alert_ts: Option<u64>) -> bool {
        match (alert_ts, self.displayed_frame_ts_ms) {
            (Some(alert_ts), Some(shown)) => {
                alert_ts.saturating_add(self.rules.feedback_cycle_ms) < shown
            }
            _ => false,
        }
    }

    fn on_dwell_elapsed(&mut self, generation: u64) {
        if self.status != SessionStatus::CorrectionPause || generation != self.dwell_generation {
            return;
        }

        self.active_alert = None;
        self.status = if self.pending_user_pause {
            SessionStatus::Paused
        } else {
            SessionStatus::Running
        };
        self.pending_user_pause = false;
    }

    // =========================================================================
    // Link Events
    // =========================================================================

    fn on_link(&mut self, event: LinkEvent) {
        // Late events from a channel we already closed.
        if !self.link.is_subscribed() || self.is_completed() {
            return;
        }

        match event {
            LinkEvent::Connected => {
                self.link = FeedbackLink::Live;
                self.link_banner = false;
            }
            LinkEvent::Lost => {
                self.link = FeedbackLink::Reconnecting { attempt: 0 };
            }
            LinkEvent::RetryFailed { attempt } => {
                self.link = FeedbackLink::Reconnecting { attempt };
                if attempt >= self.rules.reconnect_banner_after {
                    self.link_banner = true;
                }
            }
            LinkEvent::GaveUp => {
                self.link = FeedbackLink::Unavailable;
                self.link_banner = true;
            }
        }
    }
}

/// Pure reducer: consumes a state and one input, returns the next state and
/// the effects to run.
pub fn reduce(mut state: SessionState, input: SessionInput) -> Transition {
    let effects = state.apply(input);
    Transition { state, effects }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> SessionPlan {
        SessionPlan::new("patient-1", "bicep_curl_program_001")
    }

    fn alert(message: &str, body_part: BodyPart, ts: Option<u64>) -> SessionInput {
        SessionInput::Feedback(FeedbackEvent::CorrectionAlert {
            message: message.to_string(),
            body_part,
            frame_ts_ms: ts,
        })
    }

    fn frame(ts: u64) -> SessionInput {
        SessionInput::Feedback(FeedbackEvent::AnnotatedFrame(AnnotatedFrame {
            image: vec![0xff, 0xd8],
            frame_ts_ms: Some(ts),
        }))
    }

    /// Camera granted and feedback channel connected.
    fn live(plan: &SessionPlan) -> SessionState {
        let mut state = SessionState::new(plan, SessionRules::default()).unwrap();
        state.apply(SessionInput::CameraRequested);
        state.apply(SessionInput::CameraAcquired);
        let effects = state.apply(SessionInput::Link(LinkEvent::Connected));
        assert_eq!(effects, vec![Effect::StartFrameCadence]);
        state
    }

    fn count(effects: &[Effect], wanted: &Effect) -> usize {
        effects.iter().filter(|e| *e == wanted).count()
    }

    #[test]
    fn test_new_state_starts_idle_at_plan_position() {
        let state = SessionState::new(&plan().starting_at(2, 4), SessionRules::default()).unwrap();
        assert_eq!(state.status, SessionStatus::Idle);
        assert_eq!((state.current_set, state.current_rep), (2, 4));
        assert_eq!(state.last_feedback_message, DEFAULT_FEEDBACK_MESSAGE);
        assert!(state.active_alert.is_none());
    }

    #[test]
    fn test_new_state_rejects_invalid_plan() {
        let result = SessionState::new(&SessionPlan::new("", "p"), SessionRules::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_camera_granted_starts_running_and_opens_channel() {
        let mut state = SessionState::new(&plan(), SessionRules::default()).unwrap();
        assert!(state.apply(SessionInput::CameraRequested).is_empty());
        assert_eq!(state.status, SessionStatus::AwaitingCamera);

        let effects = state.apply(SessionInput::CameraAcquired);
        assert_eq!(state.status, SessionStatus::Running);
        assert_eq!(effects, vec![Effect::OpenFeedbackChannel]);
        assert_eq!(state.link, FeedbackLink::Connecting);
        // No frames until the channel is live.
        assert!(!state.emits_frames());
    }

    #[test]
    fn test_camera_denied_keeps_awaiting_and_opens_nothing() {
        let mut state = SessionState::new(&plan(), SessionRules::default()).unwrap();
        state.apply(SessionInput::CameraRequested);
        let effects = state.apply(SessionInput::CameraFailed(CameraError::PermissionDenied));

        assert!(effects.is_empty());
        assert_eq!(state.status, SessionStatus::AwaitingCamera);
        assert_eq!(state.camera_error, Some(CameraError::PermissionDenied));
        assert_eq!(state.link, FeedbackLink::Offline);

        // Retry succeeds and clears the error.
        state.apply(SessionInput::CameraRequested);
        state.apply(SessionInput::CameraAcquired);
        assert_eq!(state.camera_error, None);
        assert_eq!(state.status, SessionStatus::Running);
    }

    #[test]
    fn test_stop_camera_is_idempotent_and_keeps_status() {
        let mut state = live(&plan());

        let effects = state.apply(SessionInput::CameraStopped);
        assert_eq!(effects, vec![Effect::StopFrameCadence, Effect::ReleaseCamera]);
        assert_eq!(state.status, SessionStatus::Running);

        assert!(state.apply(SessionInput::CameraStopped).is_empty());
    }

    #[test]
    fn test_restart_camera_does_not_reopen_channel() {
        let mut state = live(&plan());
        state.apply(SessionInput::CameraStopped);

        let effects = state.apply(SessionInput::CameraAcquired);
        assert_eq!(effects, vec![Effect::StartFrameCadence]);
    }

    #[test]
    fn test_pause_resume_toggle() {
        let mut state = live(&plan());

        assert_eq!(
            state.apply(SessionInput::User(UserIntent::Pause)),
            vec![Effect::StopFrameCadence]
        );
        assert_eq!(state.status, SessionStatus::Paused);

        assert_eq!(
            state.apply(SessionInput::User(UserIntent::Resume)),
            vec![Effect::StartFrameCadence]
        );
        assert_eq!(state.status, SessionStatus::Running);
    }

    #[test]
    fn test_skip_scenario_rolls_over_into_next_set() {
        let plan = plan().with_totals(3, 10).starting_at(1, 4);
        let mut state = live(&plan);

        for _ in 0..6 {
            state.apply(SessionInput::User(UserIntent::SkipRep));
        }
        assert_eq!((state.current_rep, state.current_set), (10, 1));

        state.apply(SessionInput::User(UserIntent::SkipRep));
        assert_eq!((state.current_rep, state.current_set), (1, 2));
        assert_eq!(state.status, SessionStatus::Running);
    }

    #[test]
    fn test_skip_never_exceeds_totals_and_completes_once() {
        let plan = plan().with_totals(3, 10);
        let mut state = live(&plan);
        let mut summaries = 0;

        for _ in 0..50 {
            let effects = state.apply(SessionInput::User(UserIntent::SkipRep));
            summaries += count(&effects, &Effect::RecordSummary);
            assert!(state.current_rep >= 1 && state.current_rep <= state.total_reps);
            assert!(state.current_set >= 1 && state.current_set <= state.total_sets);
        }

        assert_eq!(summaries, 1);
        assert_eq!(state.status, SessionStatus::Completed);
        assert!(state.completed_all_reps);
        assert_eq!((state.current_rep, state.current_set), (10, 3));
    }

    #[test]
    fn test_completion_by_skip_tears_down() {
        let plan = plan().with_totals(1, 1);
        let mut state = live(&plan);

        let effects = state.apply(SessionInput::User(UserIntent::SkipRep));
        assert_eq!(
            effects,
            vec![
                Effect::StopFrameCadence,
                Effect::CloseFeedbackChannel,
                Effect::ReleaseCamera,
                Effect::RecordSummary,
            ]
        );
        assert!(!state.camera_active);
        assert_eq!(state.link, FeedbackLink::Offline);
    }

    #[test]
    fn test_end_session_is_idempotent() {
        let mut state = live(&plan());

        let first = state.apply(SessionInput::User(UserIntent::End));
        let second = state.apply(SessionInput::User(UserIntent::End));

        assert_eq!(count(&first, &Effect::RecordSummary), 1);
        assert!(second.is_empty());
        assert_eq!(state.status, SessionStatus::Completed);
    }

    #[test]
    fn test_end_from_idle_records_summary() {
        let mut state = SessionState::new(&plan(), SessionRules::default()).unwrap();
        let effects = state.apply(SessionInput::User(UserIntent::End));
        assert_eq!(effects, vec![Effect::RecordSummary]);
    }

    #[test]
    fn test_end_during_correction_cancels_dwell_in_order() {
        let mut state = live(&plan());
        state.apply(alert("Tuck your elbows in!", BodyPart::UpperArm, None));

        let effects = state.apply(SessionInput::User(UserIntent::End));
        assert_eq!(
            effects,
            vec![
                Effect::CancelDwell,
                Effect::CloseFeedbackChannel,
                Effect::ReleaseCamera,
                Effect::RecordSummary,
            ]
        );
        assert!(state.active_alert.is_none());
    }

    #[test]
    fn test_completed_is_terminal() {
        let mut state = live(&plan());
        state.apply(SessionInput::User(UserIntent::End));
        let snapshot = state.clone();

        for input in [
            SessionInput::User(UserIntent::SkipRep),
            SessionInput::User(UserIntent::ResetProgress),
            SessionInput::User(UserIntent::Pause),
            alert("Don't swing your back!", BodyPart::Back, None),
            frame(100),
            SessionInput::Link(LinkEvent::Connected),
            SessionInput::DwellElapsed { generation: 1 },
            SessionInput::CameraStopped,
            SessionInput::Abandoned,
        ] {
            assert!(state.apply(input).is_empty());
        }
        assert_eq!(state, snapshot);
    }

    #[test]
    fn test_late_camera_grant_after_end_releases_device() {
        let mut state = SessionState::new(&plan(), SessionRules::default()).unwrap();
        state.apply(SessionInput::CameraRequested);
        state.apply(SessionInput::User(UserIntent::End));

        let effects = state.apply(SessionInput::CameraAcquired);
        assert_eq!(effects, vec![Effect::ReleaseCamera]);
        assert!(!state.camera_active);
        assert_eq!(state.status, SessionStatus::Completed);
    }

    #[test]
    fn test_correction_alert_scenario() {
        let mut state = live(&plan());

        let effects = state.apply(alert("Tuck your elbows in!", BodyPart::UpperArm, None));
        assert_eq!(
            effects,
            vec![Effect::StopFrameCadence, Effect::ScheduleDwell { generation: 1 }]
        );
        assert_eq!(state.status, SessionStatus::CorrectionPause);
        assert_eq!(
            state.active_alert,
            Some(CorrectionAlert {
                message: "Tuck your elbows in!".to_string(),
                body_part: BodyPart::UpperArm,
            })
        );

        let effects = state.apply(SessionInput::DwellElapsed { generation: 1 });
        assert_eq!(effects, vec![Effect::StartFrameCadence]);
        assert_eq!(state.status, SessionStatus::Running);
        assert!(state.active_alert.is_none());
        assert_eq!(state.corrections, 1);
    }

    #[test]
    fn test_pause_before_alert_is_honored_after_dwell() {
        let mut state = live(&plan());
        state.apply(SessionInput::User(UserIntent::Pause));

        let effects = state.apply(alert("Tuck your elbows in!", BodyPart::UpperArm, None));
        assert_eq!(effects, vec![Effect::ScheduleDwell { generation: 1 }]);
        assert_eq!(state.status, SessionStatus::CorrectionPause);

        state.apply(SessionInput::DwellElapsed { generation: 1 });
        assert_eq!(state.status, SessionStatus::Paused);
        assert!(state.active_alert.is_none());
        assert!(!state.pending_user_pause);
    }

    #[test]
    fn test_pause_during_correction_is_queued_once() {
        let mut state = live(&plan());
        state.apply(alert("Control the forearm descent", BodyPart::Forearm, None));

        assert!(state.apply(SessionInput::User(UserIntent::Pause)).is_empty());
        assert!(state.apply(SessionInput::User(UserIntent::Pause)).is_empty());
        assert_eq!(state.status, SessionStatus::CorrectionPause);
        assert!(state.pending_user_pause);

        state.apply(SessionInput::DwellElapsed { generation: 1 });
        assert_eq!(state.status, SessionStatus::Paused);

        // Applied exactly once: the next resume is a plain resume.
        state.apply(SessionInput::User(UserIntent::Resume));
        assert_eq!(state.status, SessionStatus::Running);
    }

    #[test]
    fn test_resume_during_correction_cancels_queued_pause() {
        let mut state = live(&plan());
        state.apply(alert("Don't swing your back!", BodyPart::Back, None));
        state.apply(SessionInput::User(UserIntent::Pause));
        state.apply(SessionInput::User(UserIntent::Resume));

        state.apply(SessionInput::DwellElapsed { generation: 1 });
        assert_eq!(state.status, SessionStatus::Running);
    }

    #[test]
    fn test_alert_ignored_outside_running_or_paused() {
        // Idle
        let mut state = SessionState::new(&plan(), SessionRules::default()).unwrap();
        let before = state.clone();
        assert!(state.apply(alert("x", BodyPart::Back, None)).is_empty());
        assert_eq!(state, before);

        // AwaitingCamera
        state.apply(SessionInput::CameraRequested);
        let before = state.clone();
        assert!(state.apply(alert("x", BodyPart::Back, None)).is_empty());
        assert_eq!(state, before);

        // CorrectionPause: a second alert starts no second dwell timer.
        let mut state = live(&plan());
        state.apply(alert("first", BodyPart::Back, None));
        let before = state.clone();
        assert!(state.apply(alert("second", BodyPart::Forearm, None)).is_empty());
        assert_eq!(state, before);
    }

    #[test]
    fn test_stale_dwell_generation_is_ignored() {
        let mut state = live(&plan());
        state.apply(alert("first", BodyPart::Back, None));
        state.apply(SessionInput::DwellElapsed { generation: 1 });
        state.apply(alert("second", BodyPart::Forearm, None));
        assert_eq!(state.dwell_generation, 2);

        assert!(state.apply(SessionInput::DwellElapsed { generation: 1 }).is_empty());
        assert_eq!(state.status, SessionStatus::CorrectionPause);

        state.apply(SessionInput::DwellElapsed { generation: 2 });
        assert_eq!(state.status, SessionStatus::Running);
    }

    #[test]
    fn test_annotated_frames_last_write_wins() {
        let mut state = live(&plan());

        let effects = state.apply(frame(300));
        assert!(matches!(effects.as_slice(), [Effect::PresentFrame(_)]));
        state.apply(frame(200));

        assert_eq!(state.displayed_frame_ts_ms, Some(200));
        assert_eq!(state.frames_presented, 2);
        assert_eq!(state.status, SessionStatus::Running);
    }

    #[test]
    fn test_annotated_frame_dropped_without_camera() {
        let mut state = live(&plan());
        state.apply(SessionInput::CameraStopped);
        assert!(state.apply(frame(100)).is_empty());
        assert_eq!(state.frames_presented, 0);
    }

    #[test]
    fn test_stale_alert_is_dropped() {
        let mut state = live(&plan());
        state.apply(frame(500));

        // 300 + 100 < 500: more than one cycle behind.
        assert!(state.apply(alert("old", BodyPart::Back, Some(300))).is_empty());
        assert_eq!(state.status, SessionStatus::Running);
        assert_eq!(state.stale_alerts_dropped, 1);

        // Exactly one cycle behind is still applied.
        state.apply(alert("recent", BodyPart::Back, Some(400)));
        assert_eq!(state.status, SessionStatus::CorrectionPause);
    }

    #[test]
    fn test_encouragement_updates_message() {
        let mut state = live(&plan());
        state.apply(SessionInput::Feedback(FeedbackEvent::Encouragement {
            message: "Good form!".to_string(),
        }));
        assert_eq!(state.last_feedback_message, "Good form!");
        assert_eq!(state.status, SessionStatus::Running);
    }

    #[test]
    fn test_link_loss_pauses_frames_and_raises_banner() {
        let mut state = live(&plan());

        let effects = state.apply(SessionInput::Link(LinkEvent::Lost));
        assert_eq!(effects, vec![Effect::StopFrameCadence]);
        assert_eq!(state.status, SessionStatus::Running);
        assert_eq!(state.link, FeedbackLink::Reconnecting { attempt: 0 });

        state.apply(SessionInput::Link(LinkEvent::RetryFailed { attempt: 2 }));
        assert!(!state.link_banner);
        state.apply(SessionInput::Link(LinkEvent::RetryFailed { attempt: 3 }));
        assert!(state.link_banner);

        let effects = state.apply(SessionInput::Link(LinkEvent::Connected));
        assert_eq!(effects, vec![Effect::StartFrameCadence]);
        assert!(!state.link_banner);
    }

    #[test]
    fn test_link_gave_up_leaves_session_usable() {
        let mut state = live(&plan());
        state.apply(SessionInput::Link(LinkEvent::GaveUp));
        assert_eq!(state.link, FeedbackLink::Unavailable);
        assert!(state.link_banner);

        state.apply(SessionInput::User(UserIntent::SkipRep));
        assert_eq!(state.current_rep, 2);

        let effects = state.apply(SessionInput::User(UserIntent::End));
        assert!(effects.contains(&Effect::RecordSummary));
    }

    #[test]
    fn test_link_events_ignored_when_not_subscribed() {
        let mut state = SessionState::new(&plan(), SessionRules::default()).unwrap();
        state.apply(SessionInput::Link(LinkEvent::Connected));
        assert_eq!(state.link, FeedbackLink::Offline);
    }

    #[test]
    fn test_reset_progress() {
        let mut state = live(&plan().starting_at(2, 7));
        state.apply(SessionInput::User(UserIntent::ResetProgress));
        assert_eq!((state.current_set, state.current_rep), (1, 1));
    }

    #[test]
    fn test_abandon_tears_down_without_summary() {
        let mut state = live(&plan());
        let effects = state.apply(SessionInput::Abandoned);
        assert_eq!(
            effects,
            vec![
                Effect::StopFrameCadence,
                Effect::CloseFeedbackChannel,
                Effect::ReleaseCamera,
            ]
        );
        assert_eq!(state.status, SessionStatus::Completed);
    }

    #[test]
    fn test_reduce_is_pure() {
        let state = live(&plan());
        let before = state.clone();
        let step = reduce(state, SessionInput::User(UserIntent::SkipRep));
        assert_eq!(before.current_rep, 1);
        assert_eq!(step.state.current_rep, 2);
        assert!(step.effects.is_empty());
    }

    #[test]
    fn test_summary_fields() {
        let plan = plan().with_totals(1, 2);
        let mut state = live(&plan);
        state.apply(alert("Tuck your elbows in!", BodyPart::UpperArm, None));
        state.apply(SessionInput::DwellElapsed { generation: 1 });
        state.apply(SessionInput::User(UserIntent::SkipRep));
        state.apply(SessionInput::User(UserIntent::SkipRep));

        let ended_at = chrono::Utc::now();
        let summary = state.summary(&plan, 42_000, ended_at);
        assert_eq!(summary.session_id, state.session_id);
        assert_eq!(summary.user_id, "patient-1");
        assert_eq!((summary.final_set, summary.final_rep), (1, 2));
        assert_eq!(summary.duration_ms, 42_000);
        assert_eq!(summary.corrections, 1);
        assert!(summary.completed_all_reps);
    }
}
