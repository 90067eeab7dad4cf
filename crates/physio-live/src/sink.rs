//! # Completion Sinks
//!
//! Where session summaries go once a session completes.
//!
//! The controller hands the summary to the sink from a detached task after
//! teardown. Failures are logged and surfaced as a notice; they never block
//! or fail the session.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::info;

use physio_core::SessionSummary;

use crate::error::PersistenceError;

#[async_trait]
pub trait CompletionSink: Send + Sync {
    async fn record(&self, summary: &SessionSummary) -> Result<(), PersistenceError>;
}

// =============================================================================
// Tracing Sink
// =============================================================================

/// Logs the summary and nothing else.
pub struct TracingSink;

#[async_trait]
impl CompletionSink for TracingSink {
    async fn record(&self, summary: &SessionSummary) -> Result<(), PersistenceError> {
        info!(
            session_id = %summary.session_id,
            user_id = %summary.user_id,
            program_id = %summary.program_id,
            final_set = summary.final_set,
            final_rep = summary.final_rep,
            corrections = summary.corrections,
            duration_ms = summary.duration_ms,
            completed_all_reps = summary.completed_all_reps,
            "Session completed"
        );
        Ok(())
    }
}

// =============================================================================
// Channel Sink
// =============================================================================

/// Forwards summaries to an embedding application.
pub struct ChannelSink {
    tx: mpsc::Sender<SessionSummary>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (ChannelSink, mpsc::Receiver<SessionSummary>) {
        let (tx, rx) = mpsc::channel(capacity);
        (ChannelSink { tx }, rx)
    }
}

#[async_trait]
impl CompletionSink for ChannelSink {
    async fn record(&self, summary: &SessionSummary) -> Result<(), PersistenceError> {
        self.tx
            .send(summary.clone())
            .await
            .map_err(|_| PersistenceError::SinkClosed)
    }
}

// =============================================================================
// JSON Lines Sink
// =============================================================================

/// Appends one JSON object per session to a local file.
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonlSink { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl CompletionSink for JsonlSink {
    async fn record(&self, summary: &SessionSummary) -> Result<(), PersistenceError> {
        let mut line = serde_json::to_string(summary)?;
        line.push('\n');

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        info!(path = ?self.path, session_id = %summary.session_id, "Session summary appended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use physio_core::SessionId;

    fn summary(final_rep: u32) -> SessionSummary {
        SessionSummary {
            session_id: SessionId::generate(),
            user_id: "patient-1".into(),
            program_id: "bicep_curl_program_001".into(),
            exercise: "Bicep Curls".into(),
            final_set: 1,
            final_rep,
            duration_ms: 30_000,
            corrections: 2,
            completed_all_reps: false,
            ended_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_jsonl_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::new(dir.path().join("records").join("sessions.jsonl"));

        sink.record(&summary(4)).await.unwrap();
        sink.record(&summary(7)).await.unwrap();

        let contents = tokio::fs::read_to_string(sink.path()).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let second: SessionSummary = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.final_rep, 7);
        assert_eq!(second.corrections, 2);
    }

    #[tokio::test]
    async fn test_channel_sink() {
        let (sink, mut rx) = ChannelSink::new(1);
        let sent = summary(3);
        sink.record(&sent).await.unwrap();
        assert_eq!(rx.recv().await, Some(sent));

        drop(rx);
        assert!(matches!(
            sink.record(&summary(3)).await,
            Err(PersistenceError::SinkClosed)
        ));
    }

    #[tokio::test]
    async fn test_tracing_sink_never_fails() {
        assert!(TracingSink.record(&summary(1)).await.is_ok());
    }
}
