//! Square-wave pulse decoder
//!
//! Converts one noisy analog/digital channel into an ordered list of
//! (start, stop, state) pulses that exactly partitions the sample range.
//! The decoded pulse edges are the shared time base that cross-references
//! frame indices, stimulus blocks and spike times recorded on different
//! clocks.

use super::stats::median;
use super::SignalError;

/// Binary level of one decoded pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseState {
    Low,
    High,
}

impl PulseState {
    pub fn sign(&self) -> i8 {
        match self {
            PulseState::Low => -1,
            PulseState::High => 1,
        }
    }

    fn from_sign(sign: i8) -> Self {
        if sign > 0 {
            PulseState::High
        } else {
            PulseState::Low
        }
    }
}

/// Maximal run of samples sharing one binary state: `[start, stop)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulse {
    pub start: usize,
    pub stop: usize,
    pub state: PulseState,
}

impl Pulse {
    pub fn duration(&self) -> usize {
        self.stop - self.start
    }
}

/// Decoder configuration.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Low reference level; inferred as the channel minimum when None.
    pub low: Option<f64>,
    /// High reference level; inferred as the channel maximum when None.
    pub high: Option<f64>,
    /// Tolerance for epsilon-equality against the reference levels.
    pub epsilon: f64,
    /// Maximum width (samples) of a transient treated as a dropped sample;
    /// 0 disables the correction.
    pub dropped_width: usize,
    /// Warn when a Low pulse lasts longer than this multiple of the median
    /// Low-pulse duration; None disables the check.
    pub large_gap_multiplier: Option<f64>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            low: None,
            high: None,
            epsilon: 1e-3,
            dropped_width: 1,
            large_gap_multiplier: Some(4.0),
        }
    }
}

pub struct SquareWaveDecoder {
    config: DecoderConfig,
}

impl SquareWaveDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(DecoderConfig::default())
    }

    /// Decode one channel into an ordered, gap-free pulse partition.
    ///
    /// A flip is confirmed only if the signal does not revert to the
    /// pre-flip state within `dropped_width` samples, so a single anomalous
    /// sample inside a long pulse does not fragment it. A flip at the last
    /// sample is always confirmed (no lookahead past the array end).
    /// Ambiguous samples never trigger a flip by themselves.
    pub fn decode(&self, channel: &[f64]) -> Result<Vec<Pulse>, SignalError> {
        if channel.is_empty() {
            return Ok(Vec::new());
        }

        let low = self
            .config
            .low
            .unwrap_or_else(|| channel.iter().copied().fold(f64::INFINITY, f64::min));
        let high = self
            .config
            .high
            .unwrap_or_else(|| channel.iter().copied().fold(f64::NEG_INFINITY, f64::max));
        if !low.is_finite() || !high.is_finite() {
            return Err(SignalError::DataQuality(
                "square-wave channel contains no finite reference levels".to_string(),
            ));
        }

        let edges: Vec<i8> = channel
            .iter()
            .map(|&v| {
                if (v - low).abs() <= self.config.epsilon {
                    -1
                } else if (v - high).abs() <= self.config.epsilon {
                    1
                } else {
                    0
                }
            })
            .collect();

        let mut state = match edges.iter().find(|&&e| e != 0) {
            Some(&first) => first,
            None => {
                return Err(SignalError::DataQuality(
                    "square-wave channel never reaches its reference levels".to_string(),
                ))
            }
        };

        let mut pulses = Vec::new();
        let mut window_start = 0usize;
        for (i, &edge) in edges.iter().enumerate() {
            if edge == 0 || edge == state {
                continue;
            }
            // Tentative flip: dropped-sample lookahead. Reverting to the
            // pre-flip state within the window means the flip was noise.
            let lookahead_end = (i + self.config.dropped_width).min(edges.len() - 1);
            let reverts = edges[i + 1..=lookahead_end].iter().any(|&e| e == state);
            if reverts {
                continue;
            }
            pulses.push(Pulse {
                start: window_start,
                stop: i,
                state: PulseState::from_sign(state),
            });
            window_start = i;
            state = edge;
        }
        pulses.push(Pulse {
            start: window_start,
            stop: channel.len(),
            state: PulseState::from_sign(state),
        });

        self.check_low_pulse_gaps(&pulses);
        Ok(pulses)
    }

    /// Flag likely corrupted or missing acquisition segments: a Low pulse
    /// far longer than the median Low duration. Non-fatal.
    fn check_low_pulse_gaps(&self, pulses: &[Pulse]) {
        let multiplier = match self.config.large_gap_multiplier {
            Some(m) => m,
            None => return,
        };
        let durations: Vec<f64> = pulses
            .iter()
            .filter(|p| p.state == PulseState::Low)
            .map(|p| p.duration() as f64)
            .collect();
        if durations.len() < 2 {
            return;
        }
        let median_duration = median(&durations);
        for (index, &duration) in durations.iter().enumerate() {
            if duration > multiplier * median_duration {
                log::warn!(
                    "Low pulse {} lasts {} samples, {:.1}x the median ({}); \
                     acquisition segment may be corrupted",
                    index,
                    duration,
                    duration / median_duration,
                    median_duration
                );
            }
        }
    }
}
