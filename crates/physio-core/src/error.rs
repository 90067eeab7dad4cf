//! # Error Types
//!
//! Domain-specific error types for physio-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  physio-core errors (this file)                                        │
//! │  ├── CoreError        - Session creation failures                      │
//! │  ├── ValidationError  - Plan / identifier validation failures          │
//! │  ├── CameraError      - Capture device acquisition (state-visible)     │
//! │  └── ChannelError     - Feedback channel I/O (state-visible)           │
//! │                                                                         │
//! │  physio-live errors (separate crate)                                   │
//! │  ├── LiveError        - Config, transport, protocol failures           │
//! │  └── PersistenceError - Session summary recording                      │
//! │                                                                         │
//! │  Camera/Channel errors never cross the controller as exceptions:       │
//! │  they become flags on SessionState for the view to render.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

// =============================================================================
// Core Error
// =============================================================================

/// Errors raised while creating or driving a session.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The session plan failed validation.
    #[error("Invalid session plan: {0}")]
    InvalidPlan(#[from] ValidationError),

    /// An operation that needs a live session reached a completed one.
    #[error("Session {session_id} is already completed")]
    SessionCompleted { session_id: String },
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Camera Error
// =============================================================================

/// Capture device acquisition failures.
///
/// ## User Workflow
/// ```text
/// "Enable Camera" pressed
///      │
///      ▼
/// startCamera() ──► PermissionDenied
///      │
///      ▼
/// status stays AwaitingCamera, camera_error = PermissionDenied
///      │
///      ▼
/// UI shows retry affordance (non-fatal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CameraError {
    /// The user or platform refused camera access.
    #[error("Camera permission denied")]
    PermissionDenied,

    /// No device, device busy, or acquisition timed out.
    #[error("Camera device unavailable")]
    DeviceUnavailable,
}

// =============================================================================
// Channel Error
// =============================================================================

/// Feedback channel failures. Recovered locally by reconnecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ChannelError {
    /// The connection to the analysis service dropped.
    #[error("Feedback channel disconnected")]
    Disconnected,

    /// An outbound message could not be handed to the channel.
    #[error("Failed to send on feedback channel")]
    SendFailed,
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "user_id".to_string(),
        };
        assert_eq!(err.to_string(), "user_id is required");

        let err = ValidationError::OutOfRange {
            field: "total_reps".to_string(),
            min: 1,
            max: 100,
        };
        assert_eq!(err.to_string(), "total_reps must be between 1 and 100");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "program_id".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::InvalidPlan(_)));
        assert!(core_err.to_string().contains("program_id"));
    }

    #[test]
    fn test_camera_error_wire_names() {
        assert_eq!(
            serde_json::to_string(&CameraError::PermissionDenied).unwrap(),
            "\"permission_denied\""
        );
        assert_eq!(
            serde_json::to_string(&CameraError::DeviceUnavailable).unwrap(),
            "\"device_unavailable\""
        );
    }
}
