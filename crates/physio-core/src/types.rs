//! # Domain Types
//!
//! Core domain types used throughout Physio Live.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  SessionPlan    │   │ SessionStatus   │   │ CorrectionAlert │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  user_id        │   │  Idle           │   │  message        │       │
//! │  │  program_id     │   │  AwaitingCamera │   │  body_part      │       │
//! │  │  total_sets     │   │  Running        │   └─────────────────┘       │
//! │  │  total_reps     │   │  Paused         │                              │
//! │  │  start_set/rep  │   │  CorrectionPause│   ┌─────────────────┐       │
//! │  └─────────────────┘   │  Completed      │   │  FeedbackLink   │       │
//! │                        └─────────────────┘   │  Offline ... Live│       │
//! │  ┌─────────────────┐   ┌─────────────────┐   └─────────────────┘       │
//! │  │ FeedbackEvent   │   │   UserIntent    │                              │
//! │  │ AnnotatedFrame  │   │ Pause / Resume  │   ┌─────────────────┐       │
//! │  │ CorrectionAlert │   │ SkipRep / End   │   │ SessionSummary  │       │
//! │  │ Encouragement   │   │ ResetProgress   │   │ (to the sink)   │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::{DEFAULT_TOTAL_REPS, DEFAULT_TOTAL_SETS};

// =============================================================================
// Session Identity
// =============================================================================

/// Opaque session identifier. A fresh UUID v4 per session, never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a new identifier.
    pub fn generate() -> Self {
        SessionId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Session Plan
// =============================================================================

/// Everything needed to create a session, passed explicitly at creation.
///
/// The program chosen by the therapist and the patient it is assigned to
/// travel together in this struct instead of through shared app state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SessionPlan {
    pub user_id: String,
    pub program_id: String,
    /// Display name of the exercise (e.g. "Bicep Curls").
    pub exercise: String,
    pub total_sets: u32,
    pub total_reps: u32,
    /// Set the patient resumes at (1-based).
    pub start_set: u32,
    /// Rep the patient resumes at (1-based).
    pub start_rep: u32,
}

impl SessionPlan {
    /// Plan with the default program shape, starting at rep 1 of set 1.
    pub fn new(user_id: impl Into<String>, program_id: impl Into<String>) -> Self {
        SessionPlan {
            user_id: user_id.into(),
            program_id: program_id.into(),
            exercise: "Bicep Curls".to_string(),
            total_sets: DEFAULT_TOTAL_SETS,
            total_reps: DEFAULT_TOTAL_REPS,
            start_set: 1,
            start_rep: 1,
        }
    }

    pub fn with_totals(mut self, total_sets: u32, total_reps: u32) -> Self {
        self.total_sets = total_sets;
        self.total_reps = total_reps;
        self
    }

    pub fn starting_at(mut self, set: u32, rep: u32) -> Self {
        self.start_set = set;
        self.start_rep = rep;
        self
    }

    pub fn with_exercise(mut self, exercise: impl Into<String>) -> Self {
        self.exercise = exercise.into();
        self
    }
}

// =============================================================================
// Session Status
// =============================================================================

/// Lifecycle status of one exercise session.
///
/// ```text
///  Idle ──startCamera──► AwaitingCamera ──granted──► Running ◄──resume── Paused
///                             │  ▲                    │  ▲ ──pause──►   │
///                        denied │                alert│  │dwell        alert
///                             ▼  │                    ▼  │              │
///                        AwaitingCamera           CorrectionPause ◄─────┘
///
///  any non-terminal ──endSession / last skip──► Completed (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    AwaitingCamera,
    Running,
    Paused,
    /// System-initiated pause while a correction alert is displayed.
    CorrectionPause,
    /// Terminal. No further rep/set/alert mutation.
    Completed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "idle"),
            SessionStatus::AwaitingCamera => write!(f, "awaiting_camera"),
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Paused => write!(f, "paused"),
            SessionStatus::CorrectionPause => write!(f, "correction_pause"),
            SessionStatus::Completed => write!(f, "completed"),
        }
    }
}

// =============================================================================
// Body Part
// =============================================================================

/// Body part named by a correction alert.
///
/// The first three come from the client-side correction catalog, the joint
/// names from the pose-analysis service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum BodyPart {
    UpperArm,
    Forearm,
    Back,
    LeftElbow,
    RightElbow,
    LeftShoulder,
    RightShoulder,
    ShouldersTilted,
}

impl BodyPart {
    pub fn as_str(&self) -> &'static str {
        match self {
            BodyPart::UpperArm => "upper_arm",
            BodyPart::Forearm => "forearm",
            BodyPart::Back => "back",
            BodyPart::LeftElbow => "left_elbow",
            BodyPart::RightElbow => "right_elbow",
            BodyPart::LeftShoulder => "left_shoulder",
            BodyPart::RightShoulder => "right_shoulder",
            BodyPart::ShouldersTilted => "shoulders_tilted",
        }
    }
}

impl std::fmt::Display for BodyPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BodyPart {
    type Err = crate::error::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "upper_arm" => Ok(BodyPart::UpperArm),
            "forearm" => Ok(BodyPart::Forearm),
            "back" => Ok(BodyPart::Back),
            "left_elbow" => Ok(BodyPart::LeftElbow),
            "right_elbow" => Ok(BodyPart::RightElbow),
            "left_shoulder" => Ok(BodyPart::LeftShoulder),
            "right_shoulder" => Ok(BodyPart::RightShoulder),
            "shoulders_tilted" | "shoulders" => Ok(BodyPart::ShouldersTilted),
            other => Err(crate::error::ValidationError::InvalidFormat {
                field: "body_part".to_string(),
                reason: format!("unknown body part '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Alerts, Frames and Feedback Events
// =============================================================================

/// A correction currently shown to the patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CorrectionAlert {
    pub message: String,
    pub body_part: BodyPart,
}

/// An annotated frame returned by the analysis service (skeleton overlay).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedFrame {
    /// Encoded image bytes (JPEG).
    pub image: Vec<u8>,
    /// Capture timestamp of the camera frame this annotation was computed
    /// from, in ms since session start. `None` when the service does not echo it.
    pub frame_ts_ms: Option<u64>,
}

/// Events delivered by the feedback channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackEvent {
    /// Pure presentation update.
    AnnotatedFrame(AnnotatedFrame),

    /// Poor form detected.
    CorrectionAlert {
        message: String,
        body_part: BodyPart,
        /// Capture timestamp of the frame the alert refers to.
        frame_ts_ms: Option<u64>,
    },

    /// Non-alert encouragement text ("Good form!").
    Encouragement { message: String },
}

/// User-initiated controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserIntent {
    Pause,
    Resume,
    SkipRep,
    /// Explicit reset back to rep 1 of set 1.
    ResetProgress,
    End,
}

/// Connectivity changes reported by the feedback channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Connected,
    Lost,
    RetryFailed { attempt: u32 },
    /// The transport stopped retrying.
    GaveUp,
}

// =============================================================================
// Feedback Link (state-visible)
// =============================================================================

/// Feedback channel health as shown to the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum FeedbackLink {
    /// Not subscribed.
    #[default]
    Offline,
    Connecting,
    Live,
    /// Connection lost; "reconnecting" indication.
    Reconnecting { attempt: u32 },
    /// Transport gave up. Session continues without live feedback.
    Unavailable,
}

impl FeedbackLink {
    pub fn is_subscribed(&self) -> bool {
        !matches!(self, FeedbackLink::Offline)
    }
}

// =============================================================================
// Session Summary
// =============================================================================

/// Emitted once per session to the completion sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub user_id: String,
    pub program_id: String,
    pub exercise: String,
    pub final_set: u32,
    pub final_rep: u32,
    pub duration_ms: u64,
    /// Correction alerts applied during the session.
    pub corrections: u32,
    /// True when the session ended by finishing the last rep of the last set.
    pub completed_all_reps: bool,
    #[ts(as = "String")]
    pub ended_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_are_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn test_plan_builders() {
        let plan = SessionPlan::new("u1", "p1")
            .with_totals(3, 10)
            .starting_at(1, 4)
            .with_exercise("Lateral Raise");
        assert_eq!(plan.start_rep, 4);
        assert_eq!(plan.start_set, 1);
        assert_eq!(plan.exercise, "Lateral Raise");
    }

    #[test]
    fn test_body_part_parsing() {
        assert_eq!("upper_arm".parse::<BodyPart>().unwrap(), BodyPart::UpperArm);
        assert_eq!("Shoulders".parse::<BodyPart>().unwrap(), BodyPart::ShouldersTilted);
        assert!("tail".parse::<BodyPart>().is_err());
    }

    #[test]
    fn test_body_part_serde_matches_display() {
        let json = serde_json::to_string(&BodyPart::LeftElbow).unwrap();
        assert_eq!(json, format!("\"{}\"", BodyPart::LeftElbow));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(SessionStatus::CorrectionPause.to_string(), "correction_pause");
        assert!(SessionStatus::Completed.is_terminal());
        assert!(!SessionStatus::Paused.is_terminal());
    }

    #[test]
    fn test_feedback_link_tagging() {
        let json = serde_json::to_value(FeedbackLink::Reconnecting { attempt: 2 }).unwrap();
        assert_eq!(json["state"], "reconnecting");
        assert_eq!(json["attempt"], 2);
        assert!(!FeedbackLink::Offline.is_subscribed());
        assert!(FeedbackLink::Unavailable.is_subscribed());
    }
}
