//! Masked-series transforms for gaze traces
//!
//! The saccade pipeline works on 1-D traces indexed by video frame, with NaN
//! marking missing captures. These transforms implement the fixed-order
//! steps: likelihood thresholding, re-indexing onto a corrected timeline,
//! gap interpolation, kernel smoothing, differencing and peak extraction.

use super::stats::{median, percentile};

/// Convolution kernel shape for the smoothing steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    Boxcar,
    Hann,
}

impl Kernel {
    /// Normalized window weights of the given odd length.
    pub fn weights(&self, len: usize) -> Vec<f64> {
        let raw: Vec<f64> = match self {
            Kernel::Boxcar => vec![1.0; len],
            Kernel::Hann => (0..len)
                .map(|i| {
                    let phase = std::f64::consts::PI * i as f64 / (len - 1).max(1) as f64;
                    phase.sin().powi(2)
                })
                .collect(),
        };
        let total: f64 = raw.iter().sum();
        raw.iter().map(|w| w / total).collect()
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "boxcar" => Some(Kernel::Boxcar),
            "hann" => Some(Kernel::Hann),
            _ => None,
        }
    }
}

/// Mask samples whose detection likelihood falls below the threshold.
pub fn apply_likelihood_threshold(values: &mut [f64], likelihood: &[f64], threshold: f64) {
    for (value, &lik) in values.iter_mut().zip(likelihood.iter()) {
        if !lik.is_finite() || lik < threshold {
            *value = f64::NAN;
        }
    }
}

/// Corrected-timeline slot for each raw sample.
///
/// Frame timestamps are not perfectly periodic; each inter-timestamp
/// interval spans `round(dt / median_dt)` slots, so a dropped capture shows
/// up as a skipped slot. A zero step would stack two captures on one slot,
/// so steps are floored at one.
pub fn frame_offsets(timestamps: &[f64]) -> Vec<usize> {
    if timestamps.len() < 2 {
        return (0..timestamps.len()).collect();
    }
    let intervals: Vec<f64> = timestamps.windows(2).map(|w| w[1] - w[0]).collect();
    let median_dt = median(&intervals);

    let mut offsets = Vec::with_capacity(timestamps.len());
    let mut position = 0usize;
    offsets.push(0);
    for dt in intervals {
        let step = if median_dt > 0.0 && dt.is_finite() {
            ((dt / median_dt).round() as usize).max(1)
        } else {
            1
        };
        position += step;
        offsets.push(position);
    }
    offsets
}

/// Place samples onto the corrected timeline, NaN-filling skipped slots.
pub fn reindex(values: &[f64], offsets: &[usize]) -> Vec<f64> {
    let corrected_len = offsets.last().map_or(0, |last| last + 1);
    let mut corrected = vec![f64::NAN; corrected_len];
    for (&value, &slot) in values.iter().zip(offsets.iter()) {
        corrected[slot] = value;
    }
    corrected
}

/// Linearly interpolate NaN runs no longer than `max_gap`, between bounding
/// valid samples. Longer runs and runs touching either array end stay NaN.
pub fn interpolate_gaps(values: &mut [f64], max_gap: usize) {
    let len = values.len();
    let mut i = 0;
    while i < len {
        if values[i].is_finite() {
            i += 1;
            continue;
        }
        let start = i;
        while i < len && !values[i].is_finite() {
            i += 1;
        }
        let gap = i - start;
        // Bounded on both sides and short enough?
        if start == 0 || i == len || gap > max_gap {
            continue;
        }
        let left = values[start - 1];
        let right = values[i];
        let span = (gap + 1) as f64;
        for (offset, slot) in (start..i).enumerate() {
            let weight = (offset + 1) as f64 / span;
            values[slot] = left * (1.0 - weight) + right * weight;
        }
    }
}

/// Fill every NaN: interior runs linearly, edge runs by holding the nearest
/// valid sample. Used before convolution, which needs a continuous trace.
pub fn interpolate_all(values: &mut [f64]) {
    let len = values.len();
    interpolate_gaps(values, len);

    if let Some(first) = values.iter().position(|v| v.is_finite()) {
        let fill = values[first];
        for slot in values.iter_mut().take(first) {
            *slot = fill;
        }
    }
    if let Some(last) = values.iter().rposition(|v| v.is_finite()) {
        let fill = values[last];
        for slot in values.iter_mut().skip(last + 1) {
            *slot = fill;
        }
    }
}

/// Missing-sample mask (true = missing).
pub fn missing_mask(values: &[f64]) -> Vec<bool> {
    values.iter().map(|v| !v.is_finite()).collect()
}

/// Re-apply a missing mask after an imputation round trip.
pub fn remask(values: &mut [f64], mask: &[bool]) {
    for (value, &missing) in values.iter_mut().zip(mask.iter()) {
        if missing {
            *value = f64::NAN;
        }
    }
}

/// Round a window length to the nearest odd integer, at least 1.
pub fn round_to_odd(value: f64) -> usize {
    let rounded = value.round().max(1.0) as usize;
    if rounded % 2 == 0 {
        rounded + 1
    } else {
        rounded
    }
}

/// Same-length convolution with the given odd window, renormalizing at the
/// edges over the in-range weights.
pub fn smooth(values: &[f64], window: usize, kernel: Kernel) -> Vec<f64> {
    if window <= 1 || values.len() < 2 {
        return values.to_vec();
    }
    let weights = kernel.weights(window);
    let half = window / 2;
    let len = values.len();

    let mut out = Vec::with_capacity(len);
    for center in 0..len {
        let mut acc = 0.0;
        let mut weight_sum = 0.0;
        for (tap, &w) in weights.iter().enumerate() {
            let index = center as isize + tap as isize - half as isize;
            if index < 0 || index >= len as isize {
                continue;
            }
            let sample = values[index as usize];
            if sample.is_finite() {
                acc += w * sample;
                weight_sum += w;
            }
        }
        out.push(if weight_sum > 0.0 { acc / weight_sum } else { f64::NAN });
    }
    out
}

/// Forward difference; output index i holds `values[i+1] - values[i]`.
pub fn diff(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Local maxima at or above the given percentile of the finite samples,
/// separated by at least `min_distance`. Ties inside the exclusion radius
/// resolve to the taller peak. Returned indices are ascending.
pub fn find_peaks(values: &[f64], threshold_percentile: f64, min_distance: usize) -> Vec<usize> {
    let threshold = percentile(values, threshold_percentile);
    if !threshold.is_finite() {
        return Vec::new();
    }

    let mut candidates: Vec<usize> = Vec::new();
    for i in 1..values.len().saturating_sub(1) {
        let v = values[i];
        if v.is_finite() && v >= threshold && v > values[i - 1] && v >= values[i + 1] {
            candidates.push(i);
        }
    }

    // Greedy by height, then restore chronological order.
    candidates.sort_by(|&a, &b| {
        values[b]
            .partial_cmp(&values[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut accepted: Vec<usize> = Vec::new();
    for candidate in candidates {
        if accepted
            .iter()
            .all(|&peak| candidate.abs_diff(peak) >= min_distance)
        {
            accepted.push(candidate);
        }
    }
    accepted.sort_unstable();
    accepted
}
