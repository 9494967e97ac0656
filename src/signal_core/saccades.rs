//! SaccadeDetector - putative-saccade extraction stage
//!
//! A fixed-order pipeline of pure array transforms over the 2-D gaze trace:
//! likelihood thresholding, re-indexing onto the corrected frame timeline,
//! short-gap interpolation, principal-component decomposition, correlation
//! reorientation, kernel smoothing, and velocity-peak extraction. The output
//! is the ordered set of candidate waveform windows every downstream
//! direction/epoch stage consumes.

use super::pca::{principal_components, reorient};
use super::series::{
    apply_likelihood_threshold, diff, find_peaks, frame_offsets, interpolate_all,
    interpolate_gaps, missing_mask, reindex, remask, round_to_odd, smooth, Kernel,
};
use super::stats::nan_mean;
use crate::session_core::{
    Array, RequiredValue, ResolvedInputs, Stage, StageError, StageOutput, ValueSource,
};

#[derive(Debug, Clone)]
pub struct SaccadeConfig {
    /// Raw container paths for the four input arrays.
    pub x_path: String,
    pub y_path: String,
    pub likelihood_path: String,
    pub timestamps_path: String,
    /// Samples below this detection confidence are treated as missing.
    pub likelihood_threshold: f64,
    /// Assumed video frame rate in Hz.
    pub frame_rate: f64,
    /// Smoothing time constant in seconds; the window length is
    /// `round_to_odd(smoothing_time * frame_rate)`.
    pub smoothing_time: f64,
    pub kernel: Kernel,
    /// Velocity threshold as a percentile of the smoothed speed trace.
    pub velocity_percentile: f64,
    /// Minimum separation between accepted velocity peaks, in frames.
    pub min_peak_distance: usize,
    /// Waveform window offsets around each peak (asymmetric by default).
    pub window_before: usize,
    pub window_after: usize,
    /// Longest missing run the short-gap interpolation will fill.
    pub max_interp_gap: usize,
}

impl Default for SaccadeConfig {
    fn default() -> Self {
        Self {
            x_path: "eyetracking/gaze_x".to_string(),
            y_path: "eyetracking/gaze_y".to_string(),
            likelihood_path: "eyetracking/likelihood".to_string(),
            timestamps_path: "eyetracking/timestamps".to_string(),
            likelihood_threshold: 0.95,
            frame_rate: 200.0,
            smoothing_time: 0.025,
            kernel: Kernel::Hann,
            velocity_percentile: 99.0,
            min_peak_distance: 20,
            window_before: 20,
            window_after: 30,
            max_interp_gap: 4,
        }
    }
}

pub struct SaccadeDetector {
    config: SaccadeConfig,
}

impl SaccadeDetector {
    pub fn new(config: SaccadeConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(SaccadeConfig::default())
    }
}

impl Stage for SaccadeDetector {
    fn name(&self) -> &'static str {
        "SaccadeDetector"
    }

    fn description(&self) -> &'static str {
        "putative saccade candidates extracted from gaze velocity peaks"
    }

    fn required_values(&self) -> Vec<RequiredValue> {
        vec![
            RequiredValue::new("gaze_x", ValueSource::raw(self.config.x_path.clone())),
            RequiredValue::new("gaze_y", ValueSource::raw(self.config.y_path.clone())),
            RequiredValue::new(
                "likelihood",
                ValueSource::raw(self.config.likelihood_path.clone()),
            ),
            RequiredValue::new(
                "timestamps",
                ValueSource::raw(self.config.timestamps_path.clone()),
            ),
        ]
    }

    fn saved_keys(&self) -> &'static [&'static str] {
        &[
            "waveforms",
            "peak_indices",
            "corrected_horizontal",
            "corrected_vertical",
        ]
    }

    fn descriptions(&self) -> &'static [(&'static str, &'static str)] {
        &[
            (
                "waveforms",
                "primary-axis waveform window around each velocity peak",
            ),
            (
                "peak_indices",
                "corrected frame index of each velocity peak, ascending",
            ),
            (
                "corrected_horizontal",
                "reoriented, smoothed primary gaze axis on the corrected timeline",
            ),
            (
                "corrected_vertical",
                "reoriented, smoothed secondary gaze axis on the corrected timeline",
            ),
        ]
    }

    fn compute(&self, inputs: &ResolvedInputs) -> Result<StageOutput, StageError> {
        let cfg = &self.config;
        let x_raw = inputs.vector("gaze_x")?;
        let y_raw = inputs.vector("gaze_y")?;
        let likelihood = inputs.vector("likelihood")?;
        let timestamps = inputs.vector("timestamps")?;

        if x_raw.len() != y_raw.len()
            || x_raw.len() != likelihood.len()
            || x_raw.len() != timestamps.len()
        {
            return Err(StageError::DataQuality(format!(
                "gaze inputs disagree on length (x={}, y={}, likelihood={}, timestamps={})",
                x_raw.len(),
                y_raw.len(),
                likelihood.len(),
                timestamps.len()
            )));
        }

        // 1. Threshold by detection confidence.
        let mut x = x_raw.to_vec();
        let mut y = y_raw.to_vec();
        apply_likelihood_threshold(&mut x, likelihood, cfg.likelihood_threshold);
        apply_likelihood_threshold(&mut y, likelihood, cfg.likelihood_threshold);

        // 2. Temporal correction: re-index onto the corrected timeline.
        let offsets = frame_offsets(timestamps);
        let mut x = reindex(&x, &offsets);
        let mut y = reindex(&y, &offsets);

        // 3. Short-gap interpolation.
        interpolate_gaps(&mut x, cfg.max_interp_gap);
        interpolate_gaps(&mut y, cfg.max_interp_gap);

        // 4. Decomposition. Imputed values exist only to make the projection
        // well-defined; the mask is restored immediately after.
        let mask: Vec<bool> = missing_mask(&x)
            .iter()
            .zip(missing_mask(&y).iter())
            .map(|(&mx, &my)| mx || my)
            .collect();
        let x_imputed = impute_mean(&x);
        let y_imputed = impute_mean(&y);
        let (mut primary, mut secondary) = principal_components(&x_imputed, &y_imputed)?;
        remask(&mut primary, &mask);
        remask(&mut secondary, &mask);

        // 5. Reorientation against the corrected raw axes.
        reorient(&mut primary, &x)?;
        reorient(&mut secondary, &y)?;

        // 6. Smoothing on a fully interpolated copy, then re-mask.
        let window = round_to_odd(cfg.smoothing_time * cfg.frame_rate);
        let primary_full = smooth(&filled(&primary)?, window, cfg.kernel);
        let secondary_full = smooth(&filled(&secondary)?, window, cfg.kernel);
        let mut corrected_horizontal = primary_full.clone();
        let mut corrected_vertical = secondary_full.clone();
        remask(&mut corrected_horizontal, &mask);
        remask(&mut corrected_vertical, &mask);

        // 7. Peak extraction on the continuous primary axis.
        let velocity = smooth(&diff(&primary_full), window, cfg.kernel);
        let speed: Vec<f64> = velocity.iter().map(|v| v.abs()).collect();
        let peaks = find_peaks(&speed, cfg.velocity_percentile, cfg.min_peak_distance);

        let span = cfg.window_before + cfg.window_after;
        let mut rows: Vec<f64> = Vec::new();
        let mut kept: Vec<f64> = Vec::new();
        for peak in peaks {
            if peak < cfg.window_before || peak + cfg.window_after > primary_full.len() {
                log::warn!(
                    "Discarding saccade candidate at frame {}: window runs off the trace",
                    peak
                );
                continue;
            }
            rows.extend_from_slice(&primary_full[peak - cfg.window_before..peak + cfg.window_after]);
            kept.push(peak as f64);
        }

        let waveforms = Array::matrix(kept.len(), span, rows)
            .map_err(|e| StageError::DataQuality(e.to_string()))?;

        log::info!(
            "SaccadeDetector: {} candidate(s) from {} corrected frames",
            kept.len(),
            primary_full.len()
        );

        let mut output = StageOutput::new();
        output.insert("waveforms", "au", waveforms);
        output.insert("peak_indices", "frame", Array::from_vec(kept));
        output.insert(
            "corrected_horizontal",
            "au",
            Array::from_vec(corrected_horizontal),
        );
        output.insert(
            "corrected_vertical",
            "au",
            Array::from_vec(corrected_vertical),
        );
        Ok(output)
    }
}

/// Replace NaN samples with the finite mean.
fn impute_mean(values: &[f64]) -> Vec<f64> {
    let mean = nan_mean(values);
    values
        .iter()
        .map(|v| if v.is_finite() { *v } else { mean })
        .collect()
}

/// Fully interpolated copy; an entirely-missing trace cannot be filled.
fn filled(values: &[f64]) -> Result<Vec<f64>, StageError> {
    let mut full = values.to_vec();
    interpolate_all(&mut full);
    if full.iter().any(|v| !v.is_finite()) {
        return Err(StageError::DataQuality(
            "gaze trace is entirely missing after thresholding".to_string(),
        ));
    }
    Ok(full)
}
