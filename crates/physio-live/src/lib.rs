//! # physio-live: Session Runtime for Physio Live
//!
//! This crate runs guided exercise sessions. It drives the pure reducer from
//! `physio-core` with real timers, an exclusive capture device and a live
//! feedback channel to the pose-analysis service.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Session Runtime                                  │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                SessionController / SessionSupervisor             │  │
//! │  │                                                                  │  │
//! │  │  Spawns one SessionActor per session, hands out SessionHandle    │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │  DeviceGate    │  │ FeedbackSource │  │  CompletionSink        │    │
//! │  │                │  │                │  │                        │    │
//! │  │ One camera     │  │ Remote (WS),   │  │ tracing / channel /    │    │
//! │  │ holder at a    │  │ simulated,     │  │ JSON lines file        │    │
//! │  │ time           │  │ offline, script│  │                        │    │
//! │  └────────────────┘  └───────┬────────┘  └────────────────────────┘    │
//! │                              │                                          │
//! │                      ┌───────▼────────┐                                 │
//! │                      │   Transport    │                                 │
//! │                      │ WebSocket with │                                 │
//! │                      │ auto-reconnect │                                 │
//! │                      └────────────────┘                                 │
//! │                                                                         │
//! │  VIEW EVENTS (SessionEventEmitter):                                    │
//! │  • emit_state    - SessionState after every change                     │
//! │  • present_frame - annotated frame to display                           │
//! │  • emit_notice   - camera failures, save acknowledgements               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`controller`] - Session actor, handle, controller and supervisor
//! - [`camera`] - Capture device trait, device gate, synthetic camera
//! - [`feedback`] - Feedback source trait and its remote/offline/scripted sources
//! - [`simulator`] - Simulated feedback source
//! - [`transport`] - WebSocket client with reconnection
//! - [`protocol`] - Wire messages exchanged with the analysis service
//! - [`sink`] - Completion sinks for session summaries
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Runtime error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use physio_live::{
//!     DeviceGate, LiveConfig, SessionController, SimulatedFeedback, SyntheticCamera, TracingSink,
//! };
//!
//! let config = LiveConfig::load_or_default(None);
//! let controller = SessionController::new(
//!     DeviceGate::new(config.camera_acquire_timeout()),
//!     Arc::new(TracingSink),
//! )
//! .with_settings(config.controller_settings())
//! .with_rules(config.rules());
//!
//! let session = controller.spawn(
//!     config.plan(),
//!     Box::new(SyntheticCamera::new()),
//!     Arc::new(SimulatedFeedback::new(config.simulation_config())),
//! )?;
//!
//! session.start_camera().await?;
//! session.skip_rep().await?;
//! session.end_session().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod camera;
pub mod config;
pub mod controller;
pub mod error;
pub mod feedback;
pub mod protocol;
pub mod simulator;
pub mod sink;
pub mod transport;

// =============================================================================
// Re-exports
// =============================================================================

pub use camera::{CameraProbe, CaptureDevice, DeviceGate, DeviceLease, SyntheticBehavior, SyntheticCamera};
pub use config::{FeedbackMode, LiveConfig};
pub use controller::{
    ControllerSettings, NoOpEmitter, SessionController, SessionEventEmitter, SessionHandle,
    SessionNotice, SessionSupervisor, TracingEmitter,
};
pub use error::{LiveError, LiveResult, PersistenceError};
pub use feedback::{
    ChannelEvent, Farewell, FeedbackSource, FeedbackSubscription, OfflineFeedback, RemoteFeedback,
    ScriptController, ScriptedFeedback, ScriptedPeer,
};
pub use protocol::FeedbackMessage;
pub use simulator::{SimulatedFeedback, SimulationConfig};
pub use sink::{ChannelSink, CompletionSink, JsonlSink, TracingSink};
pub use transport::{ConnectionState, Transport, TransportConfig, TransportHandle};
