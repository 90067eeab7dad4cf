//! # Physio Session Runner
//!
//! Terminal driver for one guided exercise session.
//!
//! ## Controls
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  p  pause          r  resume         s  skip rep       0  reset        │
//! │  c  start camera   x  stop camera    e  end session    n  new session  │
//! │  ?  status         q  quit (leave without saving)                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```text
//! physio-session [path/to/session.toml]
//!
//! PHYSIO_FEEDBACK_MODE=remote PHYSIO_FEEDBACK_URL=ws://localhost:5001/feedback physio-session
//! RUST_LOG=physio=trace physio-session
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use physio_core::SessionStatus;
use physio_live::{
    CompletionSink, DeviceGate, FeedbackMode, FeedbackSource, JsonlSink, LiveConfig,
    OfflineFeedback, RemoteFeedback, SessionController, SessionHandle, SessionSupervisor,
    SimulatedFeedback, SyntheticCamera, TracingEmitter, TracingSink,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    // An explicit path must load; the default location may be missing.
    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => LiveConfig::load(Some(path)).context("Failed to load session config")?,
        None => LiveConfig::load_or_default(None),
    };
    info!(
        user_id = %config.patient.user_id,
        program_id = %config.program.id,
        feedback = %config.feedback.mode,
        "Configuration loaded"
    );

    let sink: Arc<dyn CompletionSink> = match config.summary_path() {
        Some(path) => {
            info!(?path, "Recording session summaries");
            Arc::new(JsonlSink::new(path))
        }
        None => Arc::new(TracingSink),
    };
    let feedback = feedback_source(&config)?;

    let controller = SessionController::new(DeviceGate::new(config.camera_acquire_timeout()), sink)
        .with_emitter(Arc::new(TracingEmitter))
        .with_settings(config.controller_settings())
        .with_rules(config.rules());
    let mut supervisor = SessionSupervisor::new(controller);

    let mut session = begin_session(&mut supervisor, &config, &feedback).await?;
    print_controls();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = shutdown_signal() => None,
        };
        let Some(line) = line else {
            break;
        };

        match line.trim() {
            "p" | "pause" => session.pause().await?,
            "r" | "resume" => session.resume().await?,
            "s" | "skip" => session.skip_rep().await?,
            "0" | "reset" => session.reset_progress().await?,
            "c" | "camera" => start_camera(&session).await,
            "x" | "stop" => session.stop_camera().await?,
            "e" | "end" => session.end_session().await?,
            "n" | "new" => session = begin_session(&mut supervisor, &config, &feedback).await?,
            "?" | "status" => print_status(&session).await?,
            "q" | "quit" => break,
            "" => {}
            other => warn!(command = other, "Unknown command (? for status)"),
        }
    }

    let completed = session
        .state()
        .await
        .map(|state| state.status == SessionStatus::Completed)
        .unwrap_or(false);
    supervisor.shutdown().await?;

    if completed {
        // The summary is written from a background task.
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    info!("Session runner stopped");
    Ok(())
}

/// Initializes the tracing subscriber.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=physio=trace` - Show trace for physio crates only
/// - Default: INFO level, DEBUG for physio crates
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,physio=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn feedback_source(config: &LiveConfig) -> anyhow::Result<Arc<dyn FeedbackSource>> {
    let source: Arc<dyn FeedbackSource> = match config.feedback.mode {
        FeedbackMode::Remote => Arc::new(
            RemoteFeedback::new(config.transport_config())
                .context("Invalid feedback service settings")?,
        ),
        FeedbackMode::Simulated => Arc::new(SimulatedFeedback::new(config.simulation_config())),
        FeedbackMode::Offline => Arc::new(OfflineFeedback),
    };
    Ok(source)
}

/// Leaves the current session (if any) and starts a fresh one.
async fn begin_session(
    supervisor: &mut SessionSupervisor,
    config: &LiveConfig,
    feedback: &Arc<dyn FeedbackSource>,
) -> anyhow::Result<SessionHandle> {
    let session = supervisor
        .begin(config.plan(), Box::new(SyntheticCamera::new()), feedback.clone())
        .await
        .context("Failed to start session")?;
    info!(session_id = %session.session_id(), "Session started");

    start_camera(&session).await;
    Ok(session)
}

/// Camera failures are not fatal: the session waits and `c` retries.
async fn start_camera(session: &SessionHandle) {
    if let Err(e) = session.start_camera().await {
        warn!(error = %e, "Camera unavailable; press 'c' to retry");
    }
}

async fn print_status(session: &SessionHandle) -> anyhow::Result<()> {
    let state = session.state().await?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

fn print_controls() {
    println!("p pause | r resume | s skip rep | 0 reset | c camera | x stop camera");
    println!("e end session | n new session | ? status | q quit");
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
