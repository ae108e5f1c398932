//! Layered configuration for the pulse pipeline.
//!
//! The trust, learning, and threshold constants the algorithm depends on are
//! deliberately tunable rather than contractual; they live here, load from
//! TOML, and can be overridden per deployment through `PULSE_`-prefixed
//! environment variables.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use pulse_signals::denoise::DenoiseConfig;
use pulse_signals::dsp::ConditionerConfig;
use pulse_signals::forecast::ForecastConfig;
use pulse_signals::peaks::PeakConfig;
use pulse_signals::reference::TrackerConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("config validation error: {0}")]
    Validation(String),
    #[error("environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),
}

/// Session-level tunables not owned by an individual pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Clean-sample history capacity (FIFO)
    pub history_capacity: usize,
    /// True-interval buffer capacity (FIFO)
    pub past_intervals_capacity: usize,
    /// Forecast horizon in seconds; sized to bridge the next acquisition gap
    pub forecast_horizon_s: f32,
    /// Rounds between vitals records for the persistence collaborator
    pub vitals_every_rounds: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_capacity: 240,
            past_intervals_capacity: 120,
            forecast_horizon_s: 10.0,
            vitals_every_rounds: 5,
        }
    }
}

/// Root configuration aggregating every stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PulseConfig {
    pub conditioner: ConditionerConfig,
    pub tracker: TrackerConfig,
    pub denoise: DenoiseConfig,
    pub peaks: PeakConfig,
    pub forecast: ForecastConfig,
    pub session: SessionConfig,
}

impl PulseConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: PulseConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides.
    /// Example: `PULSE_DENOISE_TRUST_THRESHOLD=0.4`
    pub fn from_file_with_env<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PULSE_*` environment overrides to the loaded values.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        use std::env;

        fn parse<T: std::str::FromStr>(name: &str, val: String) -> Result<T, ConfigError> {
            val.parse()
                .map_err(|_| ConfigError::Validation(format!("invalid {}", name)))
        }

        if let Ok(val) = env::var("PULSE_DENOISE_TRUST_THRESHOLD") {
            self.denoise.trust_threshold = parse("PULSE_DENOISE_TRUST_THRESHOLD", val)?;
        }
        if let Ok(val) = env::var("PULSE_DENOISE_MU") {
            self.denoise.mu = parse("PULSE_DENOISE_MU", val)?;
        }
        if let Ok(val) = env::var("PULSE_DENOISE_STREAK_LIMIT") {
            self.denoise.artifact_streak_limit = parse("PULSE_DENOISE_STREAK_LIMIT", val)?;
        }
        if let Ok(val) = env::var("PULSE_FORECAST_MIN_HISTORY") {
            self.forecast.min_history = parse("PULSE_FORECAST_MIN_HISTORY", val)?;
        }
        if let Ok(val) = env::var("PULSE_SESSION_FORECAST_HORIZON_S") {
            self.session.forecast_horizon_s = parse("PULSE_SESSION_FORECAST_HORIZON_S", val)?;
        }
        if let Ok(val) = env::var("PULSE_PEAKS_MISSED_BEAT_FACTOR") {
            self.peaks.missed_beat_factor = parse("PULSE_PEAKS_MISSED_BEAT_FACTOR", val)?;
        }

        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Conditioner
        if self.conditioner.low_cut_hz <= 0.0 || self.conditioner.high_cut_hz <= self.conditioner.low_cut_hz {
            return Err(ConfigError::Validation(
                "conditioner band edges must satisfy 0 < low < high".to_string(),
            ));
        }
        if self.conditioner.order == 0 || self.conditioner.order > 8 {
            return Err(ConfigError::Validation(
                "conditioner.order must be in [1, 8]".to_string(),
            ));
        }

        // Tracker
        if self.tracker.stretch_min <= 0.0 || self.tracker.stretch_max <= self.tracker.stretch_min {
            return Err(ConfigError::Validation(
                "tracker stretch bounds must satisfy 0 < min < max".to_string(),
            ));
        }
        if self.tracker.full_steps == 0 || self.tracker.narrowed_steps == 0 {
            return Err(ConfigError::Validation(
                "tracker step counts must be positive".to_string(),
            ));
        }

        // Denoiser
        let d = &self.denoise;
        if !(0.0..=1.0).contains(&d.min_trust) || !(0.0..=1.0).contains(&d.max_trust) || d.min_trust >= d.max_trust {
            return Err(ConfigError::Validation(
                "denoise trust bounds must satisfy 0 <= min < max <= 1".to_string(),
            ));
        }
        if d.trust_threshold < d.min_trust || d.trust_threshold > d.max_trust {
            return Err(ConfigError::Validation(
                "denoise.trust_threshold must lie within the trust bounds".to_string(),
            ));
        }
        if d.mu <= 0.0 || d.trust_gamma <= 0.0 {
            return Err(ConfigError::Validation(
                "denoise.mu and denoise.trust_gamma must be positive".to_string(),
            ));
        }
        if d.amplitude_low <= 0.0 || d.amplitude_high <= d.amplitude_low {
            return Err(ConfigError::Validation(
                "denoise amplitude band must satisfy 0 < low < high".to_string(),
            ));
        }
        if d.artifact_streak_limit == 0 {
            return Err(ConfigError::Validation(
                "denoise.artifact_streak_limit must be positive".to_string(),
            ));
        }

        // Peaks
        let p = &self.peaks;
        if p.min_distance_gap_factor <= 0.0 || p.default_min_distance_s <= 0.0 {
            return Err(ConfigError::Validation(
                "peak separation constraints must be positive".to_string(),
            ));
        }
        if p.gap_ema_alpha <= 0.0 || p.gap_ema_alpha > 1.0 {
            return Err(ConfigError::Validation(
                "peaks.gap_ema_alpha must be in (0, 1]".to_string(),
            ));
        }
        if p.missed_beat_factor <= 1.0 {
            return Err(ConfigError::Validation(
                "peaks.missed_beat_factor must exceed 1".to_string(),
            ));
        }

        // Forecaster
        if self.forecast.min_history < 3 {
            return Err(ConfigError::Validation(
                "forecast.min_history must be at least 3".to_string(),
            ));
        }
        if self.forecast.max_order == 0 || self.forecast.max_steps == 0 {
            return Err(ConfigError::Validation(
                "forecast.max_order and forecast.max_steps must be positive".to_string(),
            ));
        }

        // Session
        let s = &self.session;
        if s.history_capacity == 0 || s.past_intervals_capacity == 0 {
            return Err(ConfigError::Validation(
                "session buffer capacities must be positive".to_string(),
            ));
        }
        if s.forecast_horizon_s <= 0.0 {
            return Err(ConfigError::Validation(
                "session.forecast_horizon_s must be positive".to_string(),
            ));
        }
        if s.vitals_every_rounds == 0 {
            return Err(ConfigError::Validation(
                "session.vitals_every_rounds must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Export configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Save configuration to a file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = self
            .to_toml_string()
            .map_err(|e| ConfigError::Validation(format!("TOML serialization error: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }
}
