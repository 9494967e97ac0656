//! ClockAligner - multi-clock event binning stage
//!
//! The eye camera, the stimulus generator and the acquisition device each
//! run their own clock. Both the video-frame sync and the stimulus sync are
//! recorded as square waves on the acquisition device, so decoding the two
//! channels gives every frame and every stimulus block a position on one
//! shared time base. Saccade peaks (frame indices) are then binned into
//! stimulus blocks through that base.

use super::square_wave::{DecoderConfig, Pulse, PulseState, SquareWaveDecoder};
use crate::session_core::{
    Array, RequiredValue, ResolvedInputs, Stage, StageError, StageOutput, ValueSource,
};

/// Sentinel block index for saccades outside every stimulus block.
pub const UNKNOWN_BLOCK: f64 = -1.0;

/// The two acquisition channels the aligner decodes. A value object injected
/// into one generic aligner; device-specific wiring lives in configuration,
/// not in subclasses.
#[derive(Debug, Clone)]
pub struct ClockChannels {
    /// Raw path of the channel marking video-frame boundaries.
    pub frame_channel: String,
    /// Raw path of the channel marking stimulus-block boundaries.
    pub stimulus_channel: String,
}

pub struct ClockAligner {
    channels: ClockChannels,
    block_count_path: String,
    decoder_config: DecoderConfig,
    /// Acquisition device sample rate in Hz.
    sample_rate: f64,
}

impl ClockAligner {
    pub fn new(
        channels: ClockChannels,
        block_count_path: impl Into<String>,
        decoder_config: DecoderConfig,
        sample_rate: f64,
    ) -> Self {
        Self {
            channels,
            block_count_path: block_count_path.into(),
            decoder_config,
            sample_rate,
        }
    }
}

/// Right-open digitization: time `t` belongs to window `i` iff
/// `start_i <= t < stop_i`. One convention for every binning pass.
pub fn digitize(time: f64, windows: &[Pulse]) -> Option<usize> {
    windows
        .iter()
        .position(|w| (w.start as f64) <= time && time < (w.stop as f64))
}

impl Stage for ClockAligner {
    fn name(&self) -> &'static str {
        "ClockAligner"
    }

    fn description(&self) -> &'static str {
        "saccade peaks binned into stimulus blocks on the acquisition clock"
    }

    fn required_values(&self) -> Vec<RequiredValue> {
        vec![
            RequiredValue::new(
                "frame_signal",
                ValueSource::raw(self.channels.frame_channel.clone()),
            ),
            RequiredValue::new(
                "stimulus_signal",
                ValueSource::raw(self.channels.stimulus_channel.clone()),
            ),
            RequiredValue::new(
                "block_count",
                ValueSource::raw(self.block_count_path.clone()),
            ),
            RequiredValue::new(
                "peak_indices",
                ValueSource::stage("SaccadeDetector", "peak_indices"),
            ),
        ]
    }

    fn saved_keys(&self) -> &'static [&'static str] {
        &["stimulus_block_indices", "frame_times"]
    }

    fn descriptions(&self) -> &'static [(&'static str, &'static str)] {
        &[
            (
                "stimulus_block_indices",
                "stimulus block containing each saccade peak, -1 when outside every block",
            ),
            (
                "frame_times",
                "acquisition-clock time of each video frame onset, seconds",
            ),
        ]
    }

    fn compute(&self, inputs: &ResolvedInputs) -> Result<StageOutput, StageError> {
        let frame_signal = inputs.vector("frame_signal")?;
        let stimulus_signal = inputs.vector("stimulus_signal")?;
        let block_count = inputs.vector("block_count")?;
        let peak_indices = inputs.vector("peak_indices")?;

        let declared_blocks = match block_count.first() {
            Some(&count) if count.is_finite() && count >= 0.0 => count as usize,
            _ => {
                return Err(StageError::DataQuality(
                    "stimulus block count is missing or not a number".to_string(),
                ))
            }
        };

        let decoder = SquareWaveDecoder::new(self.decoder_config.clone());
        let frame_windows: Vec<Pulse> = decoder
            .decode(frame_signal)?
            .into_iter()
            .filter(|p| p.state == PulseState::High)
            .collect();
        let stimulus_windows: Vec<Pulse> = decoder
            .decode(stimulus_signal)?
            .into_iter()
            .filter(|p| p.state == PulseState::High)
            .collect();

        // Cardinality is the whole guarantee: a mismatch means the capture
        // is corrupted or incomplete, not something to paper over.
        if stimulus_windows.len() != declared_blocks {
            return Err(StageError::DataQuality(format!(
                "stimulus metadata declares {} block(s) but {} stimulus pulse(s) were decoded",
                declared_blocks,
                stimulus_windows.len()
            )));
        }

        let frame_times: Vec<f64> = frame_windows
            .iter()
            .map(|w| w.start as f64 / self.sample_rate)
            .collect();

        let mut block_indices = Vec::with_capacity(peak_indices.len());
        for &peak in peak_indices {
            let frame = if peak.is_finite() && peak >= 0.0 {
                peak as usize
            } else {
                log::warn!("Saccade peak index {} is not a valid frame", peak);
                block_indices.push(UNKNOWN_BLOCK);
                continue;
            };
            let frame_window = match frame_windows.get(frame) {
                Some(window) => window,
                None => {
                    log::warn!(
                        "Saccade peak at frame {} is beyond the {} decoded frame pulses",
                        frame,
                        frame_windows.len()
                    );
                    block_indices.push(UNKNOWN_BLOCK);
                    continue;
                }
            };
            match digitize(frame_window.start as f64, &stimulus_windows) {
                Some(block) => block_indices.push(block as f64),
                None => {
                    log::warn!(
                        "Saccade peak at frame {} falls outside every stimulus block",
                        frame
                    );
                    block_indices.push(UNKNOWN_BLOCK);
                }
            }
        }

        let mut output = StageOutput::new();
        output.insert(
            "stimulus_block_indices",
            "block",
            Array::from_vec(block_indices),
        );
        output.insert("frame_times", "s", Array::from_vec(frame_times));
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// 4000-sample acquisition capture: the frame channel pulses high for 2
    /// samples every 4 (1000 frames), the stimulus channel holds high for
    /// 900 samples out of every 1000 (4 blocks).
    fn frame_signal() -> Vec<f64> {
        let mut samples = Vec::with_capacity(4000);
        for _ in 0..1000 {
            samples.extend([5.0, 5.0, 0.0, 0.0]);
        }
        samples
    }

    fn stimulus_signal() -> Vec<f64> {
        let mut samples = Vec::with_capacity(4000);
        for _ in 0..4 {
            samples.extend(std::iter::repeat(5.0).take(900));
            samples.extend(std::iter::repeat(0.0).take(100));
        }
        samples
    }

    fn make_inputs(peaks: &[f64], block_count: f64) -> ResolvedInputs {
        let mut values = HashMap::new();
        values.insert("frame_signal".to_string(), Array::from_vec(frame_signal()));
        values.insert(
            "stimulus_signal".to_string(),
            Array::from_vec(stimulus_signal()),
        );
        values.insert(
            "block_count".to_string(),
            Array::from_vec(vec![block_count]),
        );
        values.insert(
            "peak_indices".to_string(),
            Array::from_vec(peaks.to_vec()),
        );
        ResolvedInputs::new(values)
    }

    fn make_aligner() -> ClockAligner {
        ClockAligner::new(
            ClockChannels {
                frame_channel: "labjack/frame_sync".to_string(),
                stimulus_channel: "labjack/stimulus_sync".to_string(),
            },
            "stimulus/block_count",
            DecoderConfig::default(),
            1000.0,
        )
    }

    fn pull<'a>(output: &'a StageOutput, key: &str) -> Vec<f64> {
        output
            .entries()
            .iter()
            .find(|(k, _, _)| k == key)
            .map(|(_, _, array)| array.vector().unwrap().to_vec())
            .unwrap()
    }

    #[test]
    fn test_peaks_binned_into_blocks() {
        let aligner = make_aligner();
        // Frame 300 starts at sample 1200 (block 1), frame 700 at 2800
        // (block 2).
        let output = aligner.compute(&make_inputs(&[300.0, 700.0], 4.0)).unwrap();

        assert_eq!(pull(&output, "stimulus_block_indices"), vec![1.0, 2.0]);
    }

    #[test]
    fn test_frame_times_on_acquisition_clock() {
        let aligner = make_aligner();
        let output = aligner.compute(&make_inputs(&[], 4.0)).unwrap();

        let frame_times = pull(&output, "frame_times");
        assert_eq!(frame_times.len(), 1000);
        assert_eq!(frame_times[0], 0.0);
        // Frame 10 starts at sample 40; 1 kHz makes that 0.04 s.
        assert!((frame_times[10] - 0.04).abs() < 1e-12);
    }

    #[test]
    fn test_block_count_mismatch_is_hard_error() {
        let aligner = make_aligner();
        let result = aligner.compute(&make_inputs(&[300.0], 5.0));

        match result {
            Err(StageError::DataQuality(detail)) => {
                assert!(detail.contains("5"), "detail: {}", detail);
                assert!(detail.contains("4"), "detail: {}", detail);
            }
            other => panic!("Expected DataQuality, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_peak_between_blocks_gets_sentinel() {
        let aligner = make_aligner();
        // Frame 230 starts at sample 920, inside the low span after block 0.
        let output = aligner.compute(&make_inputs(&[230.0], 4.0)).unwrap();

        assert_eq!(pull(&output, "stimulus_block_indices"), vec![UNKNOWN_BLOCK]);
    }

    #[test]
    fn test_peak_beyond_frame_pulses_gets_sentinel() {
        let aligner = make_aligner();
        let output = aligner.compute(&make_inputs(&[5000.0], 4.0)).unwrap();

        assert_eq!(pull(&output, "stimulus_block_indices"), vec![UNKNOWN_BLOCK]);
    }

    #[test]
    fn test_digitize_right_open_edges() {
        let windows = [
            Pulse { start: 0, stop: 10, state: PulseState::High },
            Pulse { start: 20, stop: 30, state: PulseState::High },
        ];

        assert_eq!(digitize(0.0, &windows), Some(0));
        assert_eq!(digitize(9.999, &windows), Some(0));
        // stop is exclusive.
        assert_eq!(digitize(10.0, &windows), None);
        assert_eq!(digitize(20.0, &windows), Some(1));
        assert_eq!(digitize(30.0, &windows), None);
    }
}
