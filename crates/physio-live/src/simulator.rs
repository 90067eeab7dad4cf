//! # Simulated Feedback
//!
//! Stand-in for the pose-analysis service when none is reachable.
//!
//! Every `interval` the simulator raises a correction alert with probability
//! `alert_probability`, otherwise an encouragement. Frames sent to it are
//! echoed back as annotated frames so the camera panel stays live.
//!
//! ```text
//!   t=0 ──► Connected
//!   every frame  ──► annotated_frame (echo, same timestamp)
//!   every 6s     ──► p=0.3: correction_alert   (catalog below)
//!                    else:  encouragement
//!   end_session  ──► session_saved
//! ```

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use physio_core::BodyPart;

use crate::error::LiveResult;
use crate::feedback::{
    ChannelEvent, FeedbackSource, FeedbackSubscription, CONTROL_CAPACITY, INBOUND_CAPACITY,
    OUTBOUND_CAPACITY,
};
use crate::protocol::FeedbackMessage;

/// Corrections the simulator can raise.
pub const CORRECTION_CATALOG: &[(&str, BodyPart)] = &[
    ("Tuck your elbows in!", BodyPart::UpperArm),
    ("Don't swing your back!", BodyPart::Back),
    ("Control the forearm descent", BodyPart::Forearm),
];

/// Encouragements the simulator can send.
pub const ENCOURAGEMENTS: &[&str] = &["Good form!", "Keep it steady", "Nice pace"];

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Time between cues.
    pub interval: Duration,

    /// Chance that a cue is a correction alert.
    pub alert_probability: f64,

    /// Fixed RNG seed for reproducible runs.
    pub seed: Option<u64>,

    /// Echo outbound frames back as annotated frames.
    pub echo_frames: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            interval: Duration::from_secs(6),
            alert_probability: 0.3,
            seed: None,
            echo_frames: true,
        }
    }
}

// =============================================================================
// Source
// =============================================================================

pub struct SimulatedFeedback {
    config: SimulationConfig,
}

impl SimulatedFeedback {
    /// A zero cue interval falls back to the default.
    pub fn new(mut config: SimulationConfig) -> Self {
        if config.interval.is_zero() {
            let fallback = SimulationConfig::default().interval;
            warn!(?fallback, "Simulation interval must be non-zero, using default");
            config.interval = fallback;
        }
        SimulatedFeedback { config }
    }
}

impl FeedbackSource for SimulatedFeedback {
    fn subscribe(&self) -> LiveResult<FeedbackSubscription> {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(INBOUND_CAPACITY);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        tokio::spawn(run(
            self.config.clone(),
            rng,
            outbound_rx,
            control_rx,
            events_tx,
            shutdown_rx,
        ));

        Ok(FeedbackSubscription::new(
            outbound_tx,
            control_tx,
            events_rx,
            shutdown_tx,
        ))
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

/// Picks the next cue.
pub fn next_cue<R: Rng>(rng: &mut R, alert_probability: f64) -> FeedbackMessage {
    if rng.gen_bool(alert_probability.clamp(0.0, 1.0)) {
        let (message, body_part) = CORRECTION_CATALOG
            .choose(rng)
            .copied()
            .unwrap_or(CORRECTION_CATALOG[0]);
        FeedbackMessage::correction_alert(message, body_part, None)
    } else {
        let message = ENCOURAGEMENTS.choose(rng).copied().unwrap_or(ENCOURAGEMENTS[0]);
        FeedbackMessage::encouragement(message)
    }
}

/// The reply the analysis service gives to a control message, if any.
fn control_reply(message: FeedbackMessage) -> Option<ChannelEvent> {
    match message {
        FeedbackMessage::EndSession(payload) => {
            debug!(session_id = %payload.session_id, "Simulated save");
            Some(ChannelEvent::Message(FeedbackMessage::SessionSaved {
                message: "Session saved successfully".to_string(),
            }))
        }
        _ => None,
    }
}

async fn run(
    config: SimulationConfig,
    mut rng: StdRng,
    mut outbound_rx: mpsc::Receiver<FeedbackMessage>,
    mut control_rx: mpsc::Receiver<FeedbackMessage>,
    events_tx: mpsc::Sender<ChannelEvent>,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    info!(interval = ?config.interval, p = config.alert_probability, "Simulated feedback started");

    if events_tx.send(ChannelEvent::Connected).await.is_err() {
        return;
    }

    let mut cues = interval_at(Instant::now() + config.interval, config.interval);
    cues.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let event = tokio::select! {
            _ = shutdown_rx.recv() => break,

            Some(message) = control_rx.recv() => match control_reply(message) {
                Some(reply) => reply,
                None => continue,
            },

            outgoing = outbound_rx.recv() => match outgoing {
                Some(FeedbackMessage::Frame(frame)) if config.echo_frames => {
                    ChannelEvent::Message(FeedbackMessage::annotated_frame(
                        frame.image,
                        Some(frame.timestamp_ms),
                    ))
                }
                Some(_) => continue,
                None => break,
            },

            _ = cues.tick() => {
                let cue = next_cue(&mut rng, config.alert_probability);
                debug!(cue = %cue.type_name(), "Simulated cue");
                ChannelEvent::Message(cue)
            }
        };

        if events_tx.send(event).await.is_err() {
            break;
        }
    }

    // Control messages queued at close still get their reply.
    while let Ok(message) = control_rx.try_recv() {
        if let Some(reply) = control_reply(message) {
            let _ = events_tx.send(reply).await;
        }
    }

    info!("Simulated feedback stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_certain_alert() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            match next_cue(&mut rng, 1.0) {
                FeedbackMessage::CorrectionAlert(payload) => {
                    assert!(CORRECTION_CATALOG
                        .iter()
                        .any(|(message, _)| *message == payload.message));
                }
                other => panic!("expected alert, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_never_alert() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            assert!(matches!(
                next_cue(&mut rng, 0.0),
                FeedbackMessage::Encouragement { .. }
            ));
        }
    }

    #[test]
    fn test_seeded_runs_repeat() {
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        for _ in 0..10 {
            assert_eq!(next_cue(&mut a, 0.3), next_cue(&mut b, 0.3));
        }
    }

    #[test]
    fn test_catalog_alerts_parse() {
        for (message, body_part) in CORRECTION_CATALOG {
            let event = FeedbackMessage::correction_alert(*message, *body_part, None)
                .into_feedback_event()
                .unwrap();
            assert!(event.is_some());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_echo_and_cues() {
        let source = SimulatedFeedback::new(SimulationConfig {
            alert_probability: 1.0,
            seed: Some(1),
            ..Default::default()
        });
        let mut subscription = source.subscribe().unwrap();

        assert_eq!(subscription.recv().await, Some(ChannelEvent::Connected));

        subscription
            .try_send(FeedbackMessage::frame(vec![0xff, 0xd8], 300, 3))
            .unwrap();
        assert_eq!(
            subscription.recv().await,
            Some(ChannelEvent::Message(FeedbackMessage::annotated_frame(
                vec![0xff, 0xd8],
                Some(300)
            )))
        );

        // The first cue arrives one interval after subscribing.
        match subscription.recv().await {
            Some(ChannelEvent::Message(FeedbackMessage::CorrectionAlert(_))) => {}
            other => panic!("expected alert, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_session_is_acknowledged() {
        let source = SimulatedFeedback::new(SimulationConfig::default());
        let mut subscription = source.subscribe().unwrap();
        assert_eq!(subscription.recv().await, Some(ChannelEvent::Connected));

        subscription
            .try_send(FeedbackMessage::end_session("s-1", "u", "p"))
            .unwrap();
        assert!(matches!(
            subscription.recv().await,
            Some(ChannelEvent::Message(FeedbackMessage::SessionSaved { .. }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_reply_survives_close() {
        let source = SimulatedFeedback::new(SimulationConfig::default());
        let mut subscription = source.subscribe().unwrap();
        assert_eq!(subscription.recv().await, Some(ChannelEvent::Connected));

        subscription
            .try_send(FeedbackMessage::end_session("s-1", "u", "p"))
            .unwrap();
        let mut farewell = subscription.close();
        assert!(matches!(
            farewell.reply().await,
            Some(FeedbackMessage::SessionSaved { .. })
        ));
        assert_eq!(farewell.reply().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_falls_back_to_default() {
        let source = SimulatedFeedback::new(SimulationConfig {
            interval: Duration::ZERO,
            alert_probability: 0.0,
            seed: Some(3),
            ..Default::default()
        });
        assert_eq!(source.config.interval, SimulationConfig::default().interval);

        let mut subscription = source.subscribe().unwrap();
        assert_eq!(subscription.recv().await, Some(ChannelEvent::Connected));
        assert!(matches!(
            subscription.recv().await,
            Some(ChannelEvent::Message(FeedbackMessage::Encouragement { .. }))
        ));
    }
}
