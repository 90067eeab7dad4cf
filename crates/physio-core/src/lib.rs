//! # physio-core: Pure Session Logic for Physio Live
//!
//! This crate is the **heart** of the guided exercise flow. It contains the
//! session state machine as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Physio Live Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     View layer (web client)                     │   │
//! │  │     Camera panel ──► Rep counter ──► Alert banner ──► Summary   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ SessionState snapshots                 │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               physio-live (controller actor)                    │   │
//! │  │   camera lease, frame cadence, dwell timer, feedback channel    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ SessionInput / Effect                  │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ physio-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  session  │  │   error   │  │ validation│  │   │
//! │  │   │ SessionPlan│ │  reducer  │  │CameraError│  │   plans   │  │   │
//! │  │   │ BodyPart  │  │  Effects  │  │ChannelErr │  │   ids     │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO TIMERS • NO NETWORK • PURE TRANSITIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (SessionPlan, BodyPart, FeedbackEvent, ...)
//! - [`session`] - `SessionState` and the `(state, input) -> (state, effects)` reducer
//! - [`error`] - Domain error types
//! - [`validation`] - Plan and identifier validation
//!
//! ## Example Usage
//!
//! ```rust
//! use physio_core::session::{reduce, Effect, SessionInput, SessionState};
//! use physio_core::types::{SessionPlan, SessionStatus, UserIntent};
//!
//! let plan = SessionPlan::new("patient-1", "bicep_curl_program_001");
//! let state = SessionState::new(&plan, Default::default()).unwrap();
//!
//! let step = reduce(state, SessionInput::CameraRequested);
//! let step = reduce(step.state, SessionInput::CameraAcquired);
//! assert_eq!(step.state.status, SessionStatus::Running);
//! assert!(step.effects.contains(&Effect::OpenFeedbackChannel));
//!
//! let step = reduce(step.state, SessionInput::User(UserIntent::SkipRep));
//! assert_eq!(step.state.current_rep, 2);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod session;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CameraError, ChannelError, CoreError, CoreResult, ValidationError};
pub use session::{reduce, Effect, SessionInput, SessionRules, SessionState, Transition};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// How long a correction alert stays on screen before auto-resume (ms).
pub const DEFAULT_DWELL_MS: u64 = 3_500;

/// Interval between captured frames while the session is running (ms).
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 100;

/// Reconnect failures tolerated before the view shows the degraded banner.
pub const DEFAULT_RECONNECT_BANNER_AFTER: u32 = 3;

/// Default program shape (bicep curls: 3 sets of 10).
pub const DEFAULT_TOTAL_SETS: u32 = 3;
pub const DEFAULT_TOTAL_REPS: u32 = 10;

/// Upper bounds accepted by plan validation.
pub const MAX_TOTAL_SETS: u32 = 20;
pub const MAX_TOTAL_REPS: u32 = 100;

/// Encouragement shown before the feedback service says anything.
pub const DEFAULT_FEEDBACK_MESSAGE: &str = "Nice control, keep breathing";
