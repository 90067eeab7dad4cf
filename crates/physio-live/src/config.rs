//! # Session Configuration
//!
//! Configuration for the session runtime.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     PHYSIO_FEEDBACK_MODE=remote                                        │
//! │     PHYSIO_FEEDBACK_URL=ws://localhost:5001/feedback                   │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/physio-live/session.toml (Linux)                         │
//! │     ~/Library/Application Support/com.physio.live/session.toml (macOS) │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     simulated feedback, bicep curls 3 x 10                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # session.toml
//! [patient]
//! user_id = "patient-1"
//!
//! [program]
//! id = "bicep_curl_program_001"
//! exercise = "Bicep Curls"
//! total_sets = 3
//! total_reps = 10
//! start_rep = 4
//!
//! [session]
//! frame_interval_ms = 100
//! dwell_ms = 3500
//! save_reply_timeout_ms = 3000
//!
//! [feedback]
//! mode = "remote"  # remote | simulated | offline
//! url = "ws://localhost:5001/feedback"
//!
//! [feedback.simulation]
//! interval_ms = 6000
//! alert_probability = 0.3
//!
//! [record]
//! summary_path = "/var/lib/physio/sessions.jsonl"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use physio_core::validation::validate_plan;
use physio_core::{
    SessionPlan, SessionRules, DEFAULT_DWELL_MS, DEFAULT_FRAME_INTERVAL_MS,
    DEFAULT_RECONNECT_BANNER_AFTER, DEFAULT_TOTAL_REPS, DEFAULT_TOTAL_SETS,
};

use crate::controller::ControllerSettings;
use crate::error::{LiveError, LiveResult};
use crate::simulator::SimulationConfig;
use crate::transport::TransportConfig;

// =============================================================================
// Feedback Mode
// =============================================================================

/// Where form feedback comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackMode {
    /// WebSocket to the pose-analysis service.
    Remote,

    /// Local simulator (random cues).
    #[default]
    Simulated,

    /// No feedback channel. The session runs without live feedback.
    Offline,
}

impl std::fmt::Display for FeedbackMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedbackMode::Remote => write!(f, "remote"),
            FeedbackMode::Simulated => write!(f, "simulated"),
            FeedbackMode::Offline => write!(f, "offline"),
        }
    }
}

impl std::str::FromStr for FeedbackMode {
    type Err = LiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "remote" | "service" => Ok(FeedbackMode::Remote),
            "simulated" | "simulation" | "sim" => Ok(FeedbackMode::Simulated),
            "offline" | "disabled" => Ok(FeedbackMode::Offline),
            other => Err(LiveError::InvalidConfig(format!(
                "Unknown feedback mode: '{}'. Valid options: remote, simulated, offline",
                other
            ))),
        }
    }
}

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientConfig {
    pub user_id: String,
}

impl Default for PatientConfig {
    fn default() -> Self {
        PatientConfig {
            user_id: "local-patient".to_string(),
        }
    }
}

/// The assigned program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramConfig {
    pub id: String,

    #[serde(default = "default_exercise")]
    pub exercise: String,

    #[serde(default = "default_total_sets")]
    pub total_sets: u32,

    #[serde(default = "default_total_reps")]
    pub total_reps: u32,

    #[serde(default = "default_start")]
    pub start_set: u32,

    #[serde(default = "default_start")]
    pub start_rep: u32,
}

fn default_exercise() -> String {
    "Bicep Curls".to_string()
}
fn default_total_sets() -> u32 {
    DEFAULT_TOTAL_SETS
}
fn default_total_reps() -> u32 {
    DEFAULT_TOTAL_REPS
}
fn default_start() -> u32 {
    1
}

impl Default for ProgramConfig {
    fn default() -> Self {
        ProgramConfig {
            id: "bicep_curl_program_001".to_string(),
            exercise: default_exercise(),
            total_sets: default_total_sets(),
            total_reps: default_total_reps(),
            start_set: default_start(),
            start_rep: default_start(),
        }
    }
}

/// Session timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Interval between captured frames (ms).
    #[serde(default = "default_frame_interval")]
    pub frame_interval_ms: u64,

    /// How long a correction alert holds the session (ms).
    #[serde(default = "default_dwell")]
    pub dwell_ms: u64,

    /// Maximum wait for the camera (ms).
    #[serde(default = "default_camera_timeout")]
    pub camera_acquire_timeout_ms: u64,

    /// Reconnect failures before the degraded banner shows.
    #[serde(default = "default_banner_after")]
    pub reconnect_banner_after: u32,

    /// How long to wait for the service to confirm a save (ms).
    #[serde(default = "default_save_reply_timeout")]
    pub save_reply_timeout_ms: u64,
}

fn default_frame_interval() -> u64 {
    DEFAULT_FRAME_INTERVAL_MS
}
fn default_dwell() -> u64 {
    DEFAULT_DWELL_MS
}
fn default_camera_timeout() -> u64 {
    5_000
}
fn default_banner_after() -> u32 {
    DEFAULT_RECONNECT_BANNER_AFTER
}
fn default_save_reply_timeout() -> u64 {
    3_000
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            frame_interval_ms: default_frame_interval(),
            dwell_ms: default_dwell(),
            camera_acquire_timeout_ms: default_camera_timeout(),
            reconnect_banner_after: default_banner_after(),
            save_reply_timeout_ms: default_save_reply_timeout(),
        }
    }
}

/// Simulator knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSettings {
    #[serde(default = "default_sim_interval")]
    pub interval_ms: u64,

    #[serde(default = "default_alert_probability")]
    pub alert_probability: f64,

    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_sim_interval() -> u64 {
    6_000
}
fn default_alert_probability() -> f64 {
    0.3
}

impl Default for SimulationSettings {
    fn default() -> Self {
        SimulationSettings {
            interval_ms: default_sim_interval(),
            alert_probability: default_alert_probability(),
            seed: None,
        }
    }
}

/// Feedback channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackSettings {
    #[serde(default)]
    pub mode: FeedbackMode,

    /// WebSocket URL of the analysis service (remote mode).
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Consecutive reconnect failures before giving up (0 = infinite).
    #[serde(default)]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    #[serde(default)]
    pub simulation: SimulationSettings,
}

fn default_connect_timeout() -> u64 {
    10
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    60
}

impl Default for FeedbackSettings {
    fn default() -> Self {
        FeedbackSettings {
            mode: FeedbackMode::default(),
            url: None,
            connect_timeout_secs: default_connect_timeout(),
            max_retries: 0,
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            simulation: SimulationSettings::default(),
        }
    }
}

/// Where completed session summaries are written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordSettings {
    /// JSON lines file. Defaults to the platform data dir.
    #[serde(default)]
    pub summary_path: Option<PathBuf>,
}

// =============================================================================
// Main Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiveConfig {
    #[serde(default)]
    pub patient: PatientConfig,

    #[serde(default)]
    pub program: ProgramConfig,

    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub feedback: FeedbackSettings,

    #[serde(default)]
    pub record: RecordSettings,
}

impl LiveConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (session.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> LiveResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading session config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load session config: {}. Using defaults.", e);
            Self::default()
        })
    }

    pub fn save(&self, config_path: Option<PathBuf>) -> LiveResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| LiveError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Session config saved");
        Ok(())
    }

    pub fn validate(&self) -> LiveResult<()> {
        validate_plan(&self.plan()).map_err(|e| LiveError::InvalidConfig(e.to_string()))?;

        if self.session.frame_interval_ms == 0 {
            return Err(LiveError::InvalidConfig(
                "frame_interval_ms must be greater than 0".into(),
            ));
        }
        if self.session.dwell_ms == 0 {
            return Err(LiveError::InvalidConfig("dwell_ms must be greater than 0".into()));
        }
        if self.feedback.simulation.interval_ms == 0 {
            return Err(LiveError::InvalidConfig(
                "feedback.simulation.interval_ms must be greater than 0".into(),
            ));
        }

        let p = self.feedback.simulation.alert_probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(LiveError::InvalidConfig(format!(
                "alert_probability must be between 0 and 1, got {}",
                p
            )));
        }

        if self.feedback.mode == FeedbackMode::Remote {
            let url = self.feedback.url.as_deref().ok_or_else(|| {
                LiveError::InvalidConfig("feedback.url is required in remote mode".into())
            })?;
            let parsed = url::Url::parse(url)?;
            if !matches!(parsed.scheme(), "ws" | "wss") {
                return Err(LiveError::InvalidUrl(format!(
                    "Feedback URL must start with ws:// or wss://, got: {}",
                    url
                )));
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("PHYSIO_USER_ID") {
            debug!(user_id = %id, "Overriding user ID from environment");
            self.patient.user_id = id;
        }

        if let Ok(id) = std::env::var("PHYSIO_PROGRAM_ID") {
            self.program.id = id;
        }

        if let Ok(mode) = std::env::var("PHYSIO_FEEDBACK_MODE") {
            match mode.parse() {
                Ok(parsed) => {
                    debug!(mode = %mode, "Overriding feedback mode from environment");
                    self.feedback.mode = parsed;
                }
                Err(e) => warn!(%e, "Ignoring PHYSIO_FEEDBACK_MODE"),
            }
        }

        if let Ok(url) = std::env::var("PHYSIO_FEEDBACK_URL") {
            debug!(url = %url, "Overriding feedback URL from environment");
            self.feedback.url = Some(url);
        }

        if let Ok(dwell) = std::env::var("PHYSIO_DWELL_MS") {
            if let Ok(ms) = dwell.parse::<u64>() {
                self.session.dwell_ms = ms;
            }
        }

        if let Ok(interval) = std::env::var("PHYSIO_FRAME_INTERVAL_MS") {
            if let Ok(ms) = interval.parse::<u64>() {
                self.session.frame_interval_ms = ms;
            }
        }

        if let Ok(seed) = std::env::var("PHYSIO_SIM_SEED") {
            if let Ok(seed) = seed.parse::<u64>() {
                self.feedback.simulation.seed = Some(seed);
            }
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "physio", "live")
    }

    fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("session.toml"))
    }

    // =========================================================================
    // Derived Settings
    // =========================================================================

    /// The plan a session is created from.
    pub fn plan(&self) -> SessionPlan {
        SessionPlan::new(&self.patient.user_id, &self.program.id)
            .with_exercise(&self.program.exercise)
            .with_totals(self.program.total_sets, self.program.total_reps)
            .starting_at(self.program.start_set, self.program.start_rep)
    }

    pub fn rules(&self) -> SessionRules {
        SessionRules {
            feedback_cycle_ms: self.session.frame_interval_ms,
            reconnect_banner_after: self.session.reconnect_banner_after,
        }
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            frame_interval: Duration::from_millis(self.session.frame_interval_ms),
            dwell: Duration::from_millis(self.session.dwell_ms),
            save_reply_timeout: Duration::from_millis(self.session.save_reply_timeout_ms),
            ..Default::default()
        }
    }

    pub fn camera_acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.session.camera_acquire_timeout_ms)
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            url: self.feedback.url.clone().unwrap_or_default(),
            connect_timeout: Duration::from_secs(self.feedback.connect_timeout_secs),
            initial_backoff: Duration::from_millis(self.feedback.initial_backoff_ms),
            max_backoff: Duration::from_secs(self.feedback.max_backoff_secs),
            max_retries: self.feedback.max_retries,
            save_reply_timeout: Duration::from_millis(self.session.save_reply_timeout_ms),
            ..Default::default()
        }
    }

    pub fn simulation_config(&self) -> SimulationConfig {
        SimulationConfig {
            interval: Duration::from_millis(self.feedback.simulation.interval_ms),
            alert_probability: self.feedback.simulation.alert_probability,
            seed: self.feedback.simulation.seed,
            ..Default::default()
        }
    }

    /// Summary file, falling back to the platform data dir.
    pub fn summary_path(&self) -> Option<PathBuf> {
        self.record.summary_path.clone().or_else(|| {
            Self::project_dirs().map(|dirs| dirs.data_dir().join("sessions.jsonl"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feedback_mode_parsing() {
        assert_eq!("remote".parse::<FeedbackMode>().unwrap(), FeedbackMode::Remote);
        assert_eq!("SIM".parse::<FeedbackMode>().unwrap(), FeedbackMode::Simulated);
        assert_eq!("disabled".parse::<FeedbackMode>().unwrap(), FeedbackMode::Offline);
        assert!("carrier-pigeon".parse::<FeedbackMode>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = LiveConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.feedback.mode, FeedbackMode::Simulated);
        assert_eq!(config.session.dwell_ms, 3_500);
        assert_eq!(config.session.frame_interval_ms, 100);
        assert_eq!(config.rules(), SessionRules::default());
    }

    #[test]
    fn test_parse_partial_file() {
        let config: LiveConfig = toml::from_str(
            r#"
            [patient]
            user_id = "patient-7"

            [program]
            id = "bicep_curl_program_001"
            start_rep = 4

            [feedback]
            mode = "remote"
            url = "ws://localhost:5001/feedback"
            "#,
        )
        .unwrap();

        assert!(config.validate().is_ok());
        let plan = config.plan();
        assert_eq!(plan.user_id, "patient-7");
        assert_eq!((plan.start_set, plan.start_rep), (1, 4));
        assert_eq!((plan.total_sets, plan.total_reps), (3, 10));
        assert_eq!(config.transport_config().url, "ws://localhost:5001/feedback");
    }

    #[test]
    fn test_config_validation() {
        let mut config = LiveConfig::default();

        config.feedback.mode = FeedbackMode::Remote;
        assert!(config.validate().is_err());

        config.feedback.url = Some("http://localhost:5001".into());
        assert!(matches!(config.validate(), Err(LiveError::InvalidUrl(_))));

        config.feedback.url = Some("wss://analysis.example.com/ws".into());
        assert!(config.validate().is_ok());

        config.program.start_rep = 11;
        assert!(config.validate().unwrap_err().is_config_error());

        let mut config = LiveConfig::default();
        config.feedback.simulation.alert_probability = 1.5;
        assert!(config.validate().is_err());

        let mut config = LiveConfig::default();
        config.session.dwell_ms = 0;
        assert!(config.validate().is_err());

        let mut config = LiveConfig::default();
        config.feedback.simulation.interval_ms = 0;
        assert!(config.validate().unwrap_err().is_config_error());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");

        let mut config = LiveConfig::default();
        config.program.start_rep = 4;
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[program]"));
        assert!(contents.contains("[feedback.simulation]"));

        let loaded: LiveConfig = toml::from_str(&contents).unwrap();
        assert_eq!(loaded.program.start_rep, 4);
    }

    #[test]
    fn test_derived_settings() {
        let mut config = LiveConfig::default();
        config.session.dwell_ms = 2_000;
        config.feedback.simulation.seed = Some(9);

        assert_eq!(config.controller_settings().dwell, Duration::from_millis(2_000));
        assert_eq!(config.simulation_config().seed, Some(9));
        assert_eq!(config.simulation_config().interval, Duration::from_secs(6));
        assert_eq!(
            config.controller_settings().save_reply_timeout,
            config.transport_config().save_reply_timeout
        );
    }
}
