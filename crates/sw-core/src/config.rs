//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries the
//! scheduler budgets, the enabled downstream stages, and catch-up sweep
//! settings. Every section defaults sensibly so a completely empty `{}` file
//! is valid.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::Result;
use crate::work::QueueKind;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub stages: StageConfig,
    pub sweep: SweepConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    ///
    /// This is intentionally string-based so the caller can read the file
    /// however it sees fit (async, embedded, etc.).
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let sched = &self.scheduler;

        if sched.primary_capacity == 0 {
            warnings.push("scheduler.primary_capacity is 0; it will be treated as 1".into());
        }
        if sched.secondary_capacity == 0 {
            warnings.push("scheduler.secondary_capacity is 0; it will be treated as 1".into());
        }
        if sched.cooldown_secs > 0 && sched.primary_capacity > 1 {
            warnings.push(format!(
                "scheduler.cooldown_secs is {} but only applies when primary_capacity is 1 (currently {})",
                sched.cooldown_secs, sched.primary_capacity
            ));
        }
        if sched.throttle_secs == 0 {
            warnings
                .push("scheduler.throttle_secs is 0; workers will spin on every arrival".into());
        }

        if self.stages.intro_skip && !self.stages.media_info {
            warnings.push(
                "stages.intro_skip is enabled but stages.media_info is not; no items will be handed off"
                    .into(),
            );
        }

        if self.sweep.enabled && self.sweep.interval_secs == 0 {
            warnings.push("sweep.interval_secs is 0; sweeps will run back-to-back".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Budget sizes and pacing for the queue workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Permits shared by all extraction-type work.
    pub primary_capacity: usize,
    /// Permits for season aggregation and metadata-only refresh.
    pub secondary_capacity: usize,
    /// Delay after a cooldown-signalling unit of work; only honored when
    /// `primary_capacity` is 1.
    pub cooldown_secs: u64,
    /// Minimum spacing between cycle starts of one worker.
    #[serde(default = "default_throttle_secs")]
    pub throttle_secs: u64,
    /// Continuously drain the queues in the background.
    #[serde(default = "default_true")]
    pub catchup: bool,
}

fn default_throttle_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl SchedulerConfig {
    /// Primary capacity clamped to at least one permit.
    pub fn primary(&self) -> usize {
        self.primary_capacity.max(1)
    }

    /// Secondary capacity clamped to at least one permit.
    pub fn secondary(&self) -> usize {
        self.secondary_capacity.max(1)
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_secs(self.throttle_secs)
    }

    /// The pacing delay to apply after a cooldown signal, if any.
    ///
    /// `None` unless the live primary budget is serialized to a single
    /// permit.
    pub fn cooldown_for(&self, primary_capacity: usize) -> Option<Duration> {
        (primary_capacity == 1 && self.cooldown_secs > 0)
            .then(|| Duration::from_secs(self.cooldown_secs))
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            primary_capacity: 1,
            secondary_capacity: 1,
            cooldown_secs: 0,
            throttle_secs: default_throttle_secs(),
            catchup: true,
        }
    }
}

/// Which downstream stages are enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    pub media_info: bool,
    pub fingerprint: bool,
    pub intro_skip: bool,
    pub episode_refresh: bool,
}

impl StageConfig {
    pub fn is_enabled(&self, kind: QueueKind) -> bool {
        match kind {
            QueueKind::MediaInfo => self.media_info,
            QueueKind::Fingerprint => self.fingerprint,
            QueueKind::IntroSkip => self.intro_skip,
            QueueKind::EpisodeRefresh => self.episode_refresh,
        }
    }
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            media_info: true,
            fingerprint: true,
            intro_skip: true,
            episode_refresh: false,
        }
    }
}

/// Periodic catch-up sweep settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub enabled: bool,
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
}

fn default_sweep_interval() -> u64 {
    3600
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_sweep_interval(),
        }
    }
}
