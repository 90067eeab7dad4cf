//! # Feedback Protocol Messages
//!
//! Message types exchanged with the pose-analysis service.
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Feedback Protocol Messages                           │
//! │                                                                         │
//! │  FRAME STREAM (client → service, every frame interval)                 │
//! │  ─────────────────────────────────────────────────────                 │
//! │  client  ───► frame { image, timestamp_ms, seq }                       │
//! │  service ◄─── annotated_frame { image, frame_ts_ms? }                  │
//! │                                                                         │
//! │  FORM FEEDBACK (service → client, whenever detected)                   │
//! │  ───────────────────────────────────────────────────                   │
//! │  service ◄─── correction_alert { message, body_part, timestamp_ms? }   │
//! │  service ◄─── encouragement { message }                                │
//! │                                                                         │
//! │  SESSION END                                                           │
//! │  ───────────                                                           │
//! │  client  ───► end_session { session_id, user_id, program_id }          │
//! │  service ◄─── session_saved { message } | session_error { error }      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! JSON text frames using serde's adjacently tagged enum:
//! ```json
//! { "type": "correction_alert", "payload": { "message": "...", "body_part": "back" } }
//! ```
//! Images are base64 JPEG. Inbound images may carry a
//! `data:image/jpeg;base64,` prefix, which is stripped.

use serde::{Deserialize, Serialize};

use physio_core::{AnnotatedFrame, BodyPart, FeedbackEvent};

use crate::error::{LiveError, LiveResult};

// =============================================================================
// Main Message Enum (Tagged Union)
// =============================================================================

/// All feedback channel messages, in both directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum FeedbackMessage {
    // =========================================================================
    // Outbound
    // =========================================================================
    /// One captured camera frame.
    Frame(FramePayload),

    /// The patient ended the session; the service persists its own record.
    EndSession(EndSessionPayload),

    // =========================================================================
    // Inbound
    // =========================================================================
    /// Skeleton overlay for a previously sent frame.
    AnnotatedFrame(AnnotatedFramePayload),

    /// Poor form detected.
    CorrectionAlert(CorrectionAlertPayload),

    /// Positive feedback.
    Encouragement { message: String },

    /// The service stored its session record.
    SessionSaved { message: String },

    /// The service failed to store its session record.
    SessionError { error: String },
}

/// Outbound camera frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramePayload {
    /// JPEG bytes, base64 on the wire.
    #[serde(with = "base64_bytes")]
    pub image: Vec<u8>,

    /// Capture time in ms since the session started.
    pub timestamp_ms: u64,

    /// Per-session frame sequence number.
    pub seq: u64,
}

/// Outbound end-of-session notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndSessionPayload {
    pub session_id: String,
    pub user_id: String,
    pub program_id: String,
}

/// Inbound annotated frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedFramePayload {
    #[serde(with = "base64_bytes")]
    pub image: Vec<u8>,

    /// Echo of the source frame's `timestamp_ms`, when the service provides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_ts_ms: Option<u64>,
}

/// Inbound correction alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionAlertPayload {
    pub message: String,

    /// Body part name, parsed leniently (see [`BodyPart`]'s `FromStr`).
    pub body_part: String,

    /// `timestamp_ms` of the frame the alert was computed from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
}

// =============================================================================
// Constructors and Conversions
// =============================================================================

impl FeedbackMessage {
    pub fn frame(image: Vec<u8>, timestamp_ms: u64, seq: u64) -> Self {
        FeedbackMessage::Frame(FramePayload {
            image,
            timestamp_ms,
            seq,
        })
    }

    pub fn end_session(session_id: &str, user_id: &str, program_id: &str) -> Self {
        FeedbackMessage::EndSession(EndSessionPayload {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            program_id: program_id.to_string(),
        })
    }

    pub fn correction_alert(
        message: impl Into<String>,
        body_part: BodyPart,
        timestamp_ms: Option<u64>,
    ) -> Self {
        FeedbackMessage::CorrectionAlert(CorrectionAlertPayload {
            message: message.into(),
            body_part: body_part.as_str().to_string(),
            timestamp_ms,
        })
    }

    pub fn encouragement(message: impl Into<String>) -> Self {
        FeedbackMessage::Encouragement {
            message: message.into(),
        }
    }

    pub fn annotated_frame(image: Vec<u8>, frame_ts_ms: Option<u64>) -> Self {
        FeedbackMessage::AnnotatedFrame(AnnotatedFramePayload { image, frame_ts_ms })
    }

    /// Wire tag of this message.
    pub fn type_name(&self) -> &'static str {
        match self {
            FeedbackMessage::Frame(_) => "frame",
            FeedbackMessage::EndSession(_) => "end_session",
            FeedbackMessage::AnnotatedFrame(_) => "annotated_frame",
            FeedbackMessage::CorrectionAlert(_) => "correction_alert",
            FeedbackMessage::Encouragement { .. } => "encouragement",
            FeedbackMessage::SessionSaved { .. } => "session_saved",
            FeedbackMessage::SessionError { .. } => "session_error",
        }
    }

    pub fn to_json(&self) -> LiveResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> LiveResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Converts an inbound message into the event the reducer consumes.
    ///
    /// Returns `Ok(None)` for messages that carry no session input
    /// (outbound kinds, save acknowledgements).
    pub fn into_feedback_event(self) -> LiveResult<Option<FeedbackEvent>> {
        match self {
            FeedbackMessage::AnnotatedFrame(payload) => {
                Ok(Some(FeedbackEvent::AnnotatedFrame(AnnotatedFrame {
                    image: payload.image,
                    frame_ts_ms: payload.frame_ts_ms,
                })))
            }
            FeedbackMessage::CorrectionAlert(payload) => {
                let body_part = payload
                    .body_part
                    .parse::<BodyPart>()
                    .map_err(|e| LiveError::InvalidMessage(e.to_string()))?;
                Ok(Some(FeedbackEvent::CorrectionAlert {
                    message: payload.message,
                    body_part,
                    frame_ts_ms: payload.timestamp_ms,
                }))
            }
            FeedbackMessage::Encouragement { message } => {
                Ok(Some(FeedbackEvent::Encouragement { message }))
            }
            _ => Ok(None),
        }
    }
}

// =============================================================================
// Base64 Image Encoding
// =============================================================================

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        // data URLs: "data:image/jpeg;base64,<payload>"
        let encoded = match text.split_once(',') {
            Some((_, data)) => data,
            None => text.as_str(),
        };
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_wire_shape() {
        let msg = FeedbackMessage::frame(vec![0xff, 0xd8, 0xff], 1_200, 12);
        let json: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();

        assert_eq!(json["type"], "frame");
        assert_eq!(json["payload"]["image"], "/9j/");
        assert_eq!(json["payload"]["timestamp_ms"], 1_200);
        assert_eq!(json["payload"]["seq"], 12);
    }

    #[test]
    fn test_end_session_wire_shape() {
        let msg = FeedbackMessage::end_session("s-1", "patient-1", "bicep_curl_program_001");
        let json: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();

        assert_eq!(json["type"], "end_session");
        assert_eq!(json["payload"]["user_id"], "patient-1");
        assert_eq!(json["payload"]["program_id"], "bicep_curl_program_001");
    }

    #[test]
    fn test_parse_correction_alert() {
        let json = r#"{"type":"correction_alert","payload":{"message":"Don't swing your back!","body_part":"back","timestamp_ms":900}}"#;
        let event = FeedbackMessage::from_json(json)
            .unwrap()
            .into_feedback_event()
            .unwrap();

        assert_eq!(
            event,
            Some(FeedbackEvent::CorrectionAlert {
                message: "Don't swing your back!".to_string(),
                body_part: BodyPart::Back,
                frame_ts_ms: Some(900),
            })
        );
    }

    #[test]
    fn test_alert_without_timestamp() {
        let json = r#"{"type":"correction_alert","payload":{"message":"Level your shoulders","body_part":"shoulders"}}"#;
        let event = FeedbackMessage::from_json(json)
            .unwrap()
            .into_feedback_event()
            .unwrap();

        assert!(matches!(
            event,
            Some(FeedbackEvent::CorrectionAlert {
                body_part: BodyPart::ShouldersTilted,
                frame_ts_ms: None,
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_body_part_is_invalid() {
        let msg = FeedbackMessage::CorrectionAlert(CorrectionAlertPayload {
            message: "?".into(),
            body_part: "tail".into(),
            timestamp_ms: None,
        });
        assert!(matches!(
            msg.into_feedback_event(),
            Err(LiveError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_annotated_frame_accepts_data_url() {
        let json = r#"{"type":"annotated_frame","payload":{"image":"data:image/jpeg;base64,/9j/"}}"#;
        let event = FeedbackMessage::from_json(json)
            .unwrap()
            .into_feedback_event()
            .unwrap();

        assert_eq!(
            event,
            Some(FeedbackEvent::AnnotatedFrame(AnnotatedFrame {
                image: vec![0xff, 0xd8, 0xff],
                frame_ts_ms: None,
            }))
        );
    }

    #[test]
    fn test_bad_base64_is_rejected() {
        let json = r#"{"type":"annotated_frame","payload":{"image":"***"}}"#;
        assert!(matches!(
            FeedbackMessage::from_json(json),
            Err(LiveError::DeserializationFailed(_))
        ));
    }

    #[test]
    fn test_service_acknowledgements_carry_no_event() {
        let saved = FeedbackMessage::from_json(
            r#"{"type":"session_saved","payload":{"message":"Session saved successfully"}}"#,
        )
        .unwrap();
        assert_eq!(saved.type_name(), "session_saved");
        assert_eq!(saved.into_feedback_event().unwrap(), None);
    }
}
