//! Pipeline configuration from environment variables

use crate::signal_core::saccades::SaccadeConfig;
use crate::signal_core::series::Kernel;
use crate::signal_core::square_wave::DecoderConfig;
use crate::signal_core::ClockChannels;
use std::env;

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub container_path: String,
    pub checkpoint_dir: String,
    pub chain_base: String,
    pub save_checkpoints: bool,
    pub skip_existing: bool,
    pub stages: Vec<String>,
    pub likelihood_threshold: f64,
    pub frame_rate: f64,
    pub smoothing_time: f64,
    pub kernel: Kernel,
    pub velocity_percentile: f64,
    pub min_peak_distance: usize,
    pub window_before: usize,
    pub window_after: usize,
    pub frame_channel: String,
    pub stimulus_channel: String,
    pub block_count_path: String,
    pub acquisition_sample_rate: f64,
    pub decoder_epsilon: f64,
    pub decoder_dropped_width: usize,
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let container_path = env::var("GAZEFLOW_CONTAINER_PATH")
            .map_err(|_| ConfigError::MissingVariable("GAZEFLOW_CONTAINER_PATH".to_string()))?;

        let kernel_name = env::var("GAZEFLOW_KERNEL").unwrap_or_else(|_| "hann".to_string());
        let kernel = match Kernel::parse(&kernel_name) {
            Some(kernel) => kernel,
            None => {
                log::warn!("Invalid GAZEFLOW_KERNEL '{}', defaulting to hann", kernel_name);
                Kernel::Hann
            }
        };

        let stages = env::var("GAZEFLOW_STAGES")
            .unwrap_or_else(|_| "SaccadeDetector,ClockAligner".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            container_path,
            checkpoint_dir: env::var("GAZEFLOW_CHECKPOINT_DIR")
                .unwrap_or_else(|_| "checkpoints".to_string()),
            chain_base: env::var("GAZEFLOW_CHAIN_BASE")
                .unwrap_or_else(|_| "session".to_string()),
            save_checkpoints: env_flag("GAZEFLOW_SAVE_CHECKPOINTS", true),
            skip_existing: env_flag("GAZEFLOW_SKIP_EXISTING", true),
            stages,
            likelihood_threshold: env_f64("GAZEFLOW_LIKELIHOOD_THRESHOLD", 0.95),
            frame_rate: env_f64("GAZEFLOW_FRAME_RATE", 200.0),
            smoothing_time: env_f64("GAZEFLOW_SMOOTHING_TIME", 0.025),
            kernel,
            velocity_percentile: env_f64("GAZEFLOW_VELOCITY_PERCENTILE", 99.0),
            min_peak_distance: env_usize("GAZEFLOW_MIN_PEAK_DISTANCE", 20),
            window_before: env_usize("GAZEFLOW_WINDOW_BEFORE", 20),
            window_after: env_usize("GAZEFLOW_WINDOW_AFTER", 30),
            frame_channel: env::var("GAZEFLOW_FRAME_CHANNEL")
                .unwrap_or_else(|_| "labjack/frame_sync".to_string()),
            stimulus_channel: env::var("GAZEFLOW_STIMULUS_CHANNEL")
                .unwrap_or_else(|_| "labjack/stimulus_sync".to_string()),
            block_count_path: env::var("GAZEFLOW_BLOCK_COUNT_PATH")
                .unwrap_or_else(|_| "stimulus/block_count".to_string()),
            acquisition_sample_rate: env_f64("GAZEFLOW_ACQUISITION_SAMPLE_RATE", 1000.0),
            decoder_epsilon: env_f64("GAZEFLOW_DECODER_EPSILON", 1e-3),
            decoder_dropped_width: env_usize("GAZEFLOW_DECODER_DROPPED_WIDTH", 1),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stages.is_empty() {
            return Err(ConfigError::InvalidValue(
                "GAZEFLOW_STAGES must name at least one stage".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.likelihood_threshold) {
            return Err(ConfigError::InvalidValue(format!(
                "likelihood threshold must be within [0, 1], got {}",
                self.likelihood_threshold
            )));
        }
        if self.frame_rate <= 0.0 || self.acquisition_sample_rate <= 0.0 {
            return Err(ConfigError::InvalidValue(
                "frame rate and acquisition sample rate must be positive".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.velocity_percentile) {
            return Err(ConfigError::InvalidValue(format!(
                "velocity percentile must be within [0, 100], got {}",
                self.velocity_percentile
            )));
        }
        Ok(())
    }

    pub fn saccade_config(&self) -> SaccadeConfig {
        SaccadeConfig {
            likelihood_threshold: self.likelihood_threshold,
            frame_rate: self.frame_rate,
            smoothing_time: self.smoothing_time,
            kernel: self.kernel,
            velocity_percentile: self.velocity_percentile,
            min_peak_distance: self.min_peak_distance,
            window_before: self.window_before,
            window_after: self.window_after,
            ..SaccadeConfig::default()
        }
    }

    pub fn clock_channels(&self) -> ClockChannels {
        ClockChannels {
            frame_channel: self.frame_channel.clone(),
            stimulus_channel: self.stimulus_channel.clone(),
        }
    }

    pub fn decoder_config(&self) -> DecoderConfig {
        DecoderConfig {
            epsilon: self.decoder_epsilon,
            dropped_width: self.decoder_dropped_width,
            ..DecoderConfig::default()
        }
    }
}

fn env_f64(var: &str, default: f64) -> f64 {
    env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_usize(var: &str, default: usize) -> usize {
    env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_flag(var: &str, default: bool) -> bool {
    env::var(var)
        .ok()
        .and_then(|s| s.to_lowercase().parse().ok())
        .unwrap_or(default)
}
