//! Signal Core - Deterministic numeric pipeline
//!
//! Everything that turns raw traces into derived arrays: the square-wave
//! pulse decoder used for clock alignment, the masked-series transforms and
//! decomposition behind saccade detection, and the multi-clock binning
//! aligner. All transforms are pure functions over f64 slices with NaN as
//! the missing-sample sentinel.

pub mod align;
pub mod pca;
pub mod predictor;
pub mod saccades;
pub mod series;
pub mod square_wave;
pub mod stats;

pub use align::{ClockAligner, ClockChannels};
pub use predictor::{DirectionLabeler, Estimator, Predictor, Transformer};
pub use saccades::{SaccadeConfig, SaccadeDetector};
pub use square_wave::{DecoderConfig, Pulse, PulseState, SquareWaveDecoder};

use crate::session_core::StageError;

/// Numeric-layer error, mapped into the stage taxonomy at the boundary.
#[derive(Debug)]
pub enum SignalError {
    /// The recording itself is unusable for the requested analysis.
    DataQuality(String),
}

impl std::fmt::Display for SignalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalError::DataQuality(detail) => write!(f, "Data quality error: {}", detail),
        }
    }
}

impl std::error::Error for SignalError {}

impl From<SignalError> for StageError {
    fn from(err: SignalError) -> Self {
        match err {
            SignalError::DataQuality(detail) => StageError::DataQuality(detail),
        }
    }
}
