//! # Live Error Types
//!
//! Error types for the session runtime.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Live Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Protocol            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Connection     │  │  InvalidMessage         │ │
//! │  │  InvalidUrl     │  │  Disconnected   │  │  SerializationFailed    │ │
//! │  │  ConfigLoad/Save│  │  Timeout        │  │  DeserializationFailed  │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │    Session      │  │  Persistence    │                              │
//! │  │                 │  │  (own type)     │                              │
//! │  │  Camera         │  │  WriteFailed    │                              │
//! │  │  Core           │  │  SinkClosed     │                              │
//! │  │  SessionClosed  │  │                 │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use physio_core::{CameraError, CoreError};

/// Result type alias for runtime operations.
pub type LiveResult<T> = Result<T, LiveError>;

/// Runtime error type.
///
/// Camera and channel failures inside a running session never surface here:
/// the controller folds them into `SessionState`. These errors reach callers
/// only at the edges (config load, session creation, a closed handle).
#[derive(Debug, Error)]
pub enum LiveError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid feedback service URL.
    #[error("Invalid feedback URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Failed to establish the WebSocket connection.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// WebSocket disconnected unexpectedly.
    #[error("Disconnected from feedback service")]
    Disconnected,

    /// Connection timeout.
    #[error("Connection timeout after {0} ms")]
    Timeout(u64),

    /// TLS/SSL error.
    #[error("TLS error: {0}")]
    TlsError(String),

    /// WebSocket protocol error.
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// Message parsed but its content is unusable.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Failed to serialize message.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Failed to deserialize message.
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    // =========================================================================
    // Session Errors
    // =========================================================================
    /// Camera acquisition failed.
    #[error(transparent)]
    Camera(#[from] CameraError),

    /// Session could not be created.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The session actor has shut down.
    #[error("Session is closed")]
    SessionClosed,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for LiveError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            LiveError::DeserializationFailed(err.to_string())
        } else {
            LiveError::SerializationFailed(err.to_string())
        }
    }
}

impl From<url::ParseError> for LiveError {
    fn from(err: url::ParseError) -> Self {
        LiveError::InvalidUrl(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for LiveError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed => LiveError::Disconnected,
            WsError::AlreadyClosed => LiveError::Disconnected,
            WsError::Protocol(p) => LiveError::WebSocketError(p.to_string()),
            WsError::Io(io) => LiveError::ConnectionFailed(io.to_string()),
            WsError::Tls(tls) => LiveError::TlsError(tls.to_string()),
            other => LiveError::WebSocketError(other.to_string()),
        }
    }
}

impl From<std::io::Error> for LiveError {
    fn from(err: std::io::Error) -> Self {
        LiveError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for LiveError {
    fn from(err: toml::de::Error) -> Self {
        LiveError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for LiveError {
    fn from(err: toml::ser::Error) -> Self {
        LiveError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl LiveError {
    /// Returns true if the transport should retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LiveError::ConnectionFailed(_)
                | LiveError::Disconnected
                | LiveError::Timeout(_)
                | LiveError::WebSocketError(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            LiveError::InvalidConfig(_)
                | LiveError::InvalidUrl(_)
                | LiveError::ConfigLoadFailed(_)
                | LiveError::ConfigSaveFailed(_)
        )
    }
}

// =============================================================================
// Persistence Error
// =============================================================================

/// Failures while handing a summary to a completion sink.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The summary could not be written.
    #[error("Failed to write session summary: {0}")]
    WriteFailed(String),

    /// The summary could not be encoded.
    #[error("Failed to encode session summary: {0}")]
    EncodeFailed(String),

    /// The receiving side of the sink is gone.
    #[error("Completion sink is closed")]
    SinkClosed,
}

impl From<std::io::Error> for PersistenceError {
    fn from(err: std::io::Error) -> Self {
        PersistenceError::WriteFailed(err.to_string())
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::EncodeFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(LiveError::ConnectionFailed("refused".into()).is_retryable());
        assert!(LiveError::Disconnected.is_retryable());
        assert!(LiveError::Timeout(10_000).is_retryable());

        assert!(!LiveError::InvalidConfig("bad".into()).is_retryable());
        assert!(!LiveError::SessionClosed.is_retryable());
        assert!(!LiveError::Camera(CameraError::PermissionDenied).is_retryable());
    }

    #[test]
    fn test_config_errors() {
        assert!(LiveError::InvalidUrl("x".into()).is_config_error());
        assert!(!LiveError::Disconnected.is_config_error());
    }

    #[test]
    fn test_json_error_conversion() {
        let err: LiveError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, LiveError::DeserializationFailed(_)));
    }

    #[test]
    fn test_camera_error_is_transparent() {
        let err: LiveError = CameraError::DeviceUnavailable.into();
        assert_eq!(err.to_string(), "Camera device unavailable");
    }
}
