//! Opaque predictor collaborators and the direction-labeling stage
//!
//! Model internals (training, feature engineering, serialization) live
//! outside this crate. The pipeline only ever sees array-in/array-out trait
//! objects, mirroring how the database writer is injected elsewhere.

use super::SignalError;
use crate::session_core::{
    Array, RequiredValue, ResolvedInputs, Stage, StageError, StageOutput, ValueSource,
};

/// Opaque classifier/regressor: one prediction per waveform row.
pub trait Predictor {
    fn predict(&self, waveforms: &Array) -> Result<Vec<f64>, SignalError>;
}

/// A predictor that can also be fitted in place.
pub trait Estimator: Predictor {
    fn fit(&mut self, waveforms: &Array, targets: &[f64]) -> Result<(), SignalError>;
}

/// Invertible value transform (e.g. a label scaler applied upstream).
pub trait Transformer {
    fn transform(&self, values: &[f64]) -> Vec<f64>;
    fn inverse_transform(&self, values: &[f64]) -> Vec<f64>;
}

/// Labels each saccade waveform with a movement direction via an injected
/// predictor.
pub struct DirectionLabeler {
    predictor: Box<dyn Predictor>,
}

impl DirectionLabeler {
    pub fn new(predictor: Box<dyn Predictor>) -> Self {
        Self { predictor }
    }
}

impl Stage for DirectionLabeler {
    fn name(&self) -> &'static str {
        "DirectionLabeler"
    }

    fn description(&self) -> &'static str {
        "movement direction predicted for each saccade candidate"
    }

    fn required_values(&self) -> Vec<RequiredValue> {
        vec![RequiredValue::new(
            "waveforms",
            ValueSource::stage("SaccadeDetector", "waveforms"),
        )]
    }

    fn saved_keys(&self) -> &'static [&'static str] {
        &["direction_labels"]
    }

    fn descriptions(&self) -> &'static [(&'static str, &'static str)] {
        &[(
            "direction_labels",
            "predicted direction label per saccade, aligned with peak_indices",
        )]
    }

    fn compute(&self, inputs: &ResolvedInputs) -> Result<StageOutput, StageError> {
        let waveforms = inputs.get("waveforms")?;
        let rows = waveforms.rows().ok_or_else(|| {
            StageError::DataQuality("waveforms input must be a 2-D array".to_string())
        })?;

        let labels = self.predictor.predict(waveforms)?;
        if labels.len() != rows {
            return Err(StageError::ContractViolation(format!(
                "predictor returned {} label(s) for {} waveform(s)",
                labels.len(),
                rows
            )));
        }

        let mut output = StageOutput::new();
        output.insert("direction_labels", "label", Array::from_vec(labels));
        Ok(output)
    }
}
