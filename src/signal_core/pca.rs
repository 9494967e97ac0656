//! Decomposition and reorientation of 2-D gaze traces
//!
//! The corrected (x, y) trace is projected onto its two principal components
//! so the primary axis captures the dominant movement direction. Principal
//! axes come with an arbitrary sign, so each projected axis is reoriented
//! against its raw counterpart by correlation; an ambiguous correlation is a
//! hard failure rather than a guessed sign.

use super::stats::pearson;
use super::SignalError;

/// Minimum |r| for a correlation to determine an orientation.
const ORIENTATION_R_THRESHOLD: f64 = 0.05;
/// Maximum p-value for a correlation to determine an orientation.
const ORIENTATION_P_THRESHOLD: f64 = 0.05;

/// Project the centered (x, y) trace onto its two principal components.
///
/// Inputs must be NaN-free (mean-imputed upstream) and equal length. Returns
/// (primary, secondary) ordered by explained variance.
pub fn principal_components(
    x: &[f64],
    y: &[f64],
) -> Result<(Vec<f64>, Vec<f64>), SignalError> {
    if x.len() != y.len() || x.is_empty() {
        return Err(SignalError::DataQuality(
            "decomposition requires equal-length, non-empty axes".to_string(),
        ));
    }

    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut cxx = 0.0;
    let mut cxy = 0.0;
    let mut cyy = 0.0;
    for (&xv, &yv) in x.iter().zip(y.iter()) {
        let dx = xv - mean_x;
        let dy = yv - mean_y;
        cxx += dx * dx;
        cxy += dx * dy;
        cyy += dy * dy;
    }
    cxx /= n;
    cxy /= n;
    cyy /= n;

    if cxx == 0.0 && cyy == 0.0 {
        return Err(SignalError::DataQuality(
            "decomposition undefined for a constant trace".to_string(),
        ));
    }

    // Closed-form eigendecomposition of the 2x2 covariance matrix.
    let trace = cxx + cyy;
    let discriminant = ((trace * trace) / 4.0 - (cxx * cyy - cxy * cxy)).max(0.0);
    let lambda_1 = trace / 2.0 + discriminant.sqrt();

    let (v1, v2) = if cxy.abs() > f64::EPSILON {
        let v1 = normalize((lambda_1 - cyy, cxy));
        // Second axis is the perpendicular.
        (v1, (-v1.1, v1.0))
    } else if cxx >= cyy {
        ((1.0, 0.0), (0.0, 1.0))
    } else {
        ((0.0, 1.0), (1.0, 0.0))
    };

    let primary: Vec<f64> = x
        .iter()
        .zip(y.iter())
        .map(|(&xv, &yv)| v1.0 * (xv - mean_x) + v1.1 * (yv - mean_y))
        .collect();
    let secondary: Vec<f64> = x
        .iter()
        .zip(y.iter())
        .map(|(&xv, &yv)| v2.0 * (xv - mean_x) + v2.1 * (yv - mean_y))
        .collect();

    Ok((primary, secondary))
}

fn normalize(v: (f64, f64)) -> (f64, f64) {
    let norm = (v.0 * v.0 + v.1 * v.1).sqrt();
    (v.0 / norm, v.1 / norm)
}

/// Sign-correct a projected axis against its raw counterpart.
///
/// Pairwise-complete correlation; a clearly negative correlation flips the
/// axis in place, a clearly positive one keeps it. Anything short of
/// |r| > 0.05 with p < 0.05 leaves the orientation undetermined, which is a
/// hard failure. Returns whether the axis was flipped.
pub fn reorient(projected: &mut [f64], reference: &[f64]) -> Result<bool, SignalError> {
    let (r, p) = pearson(projected, reference).ok_or_else(|| {
        SignalError::DataQuality(
            "orientation correlation undefined (too few valid samples or constant axis)"
                .to_string(),
        )
    })?;

    if p < ORIENTATION_P_THRESHOLD && r > ORIENTATION_R_THRESHOLD {
        return Ok(false);
    }
    if p < ORIENTATION_P_THRESHOLD && r < -ORIENTATION_R_THRESHOLD {
        for value in projected.iter_mut() {
            *value = -*value;
        }
        return Ok(true);
    }
    Err(SignalError::DataQuality(format!(
        "ambiguous orientation correlation (r={:.4}, p={:.4})",
        r, p
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trace(n: usize) -> (Vec<f64>, Vec<f64>) {
        // Dominant horizontal movement with a weaker independent vertical.
        let x: Vec<f64> = (0..n).map(|i| 3.0 * (0.05 * i as f64).sin()).collect();
        let y: Vec<f64> = (0..n).map(|i| (0.083 * i as f64).cos()).collect();
        (x, y)
    }

    #[test]
    fn test_primary_axis_tracks_dominant_variance() {
        let (x, y) = sample_trace(500);
        let (primary, secondary) = principal_components(&x, &y).unwrap();

        let var =
            |v: &[f64]| v.iter().map(|s| s * s).sum::<f64>() / v.len() as f64;
        assert!(
            var(&primary) > var(&secondary),
            "Primary axis must carry the larger variance"
        );

        // Primary should be (anti)correlated with x, the dominant raw axis.
        let (r, p) = pearson(&primary, &x).unwrap();
        assert!(r.abs() > 0.9, "Expected strong |r|, got {}", r);
        assert!(p < 0.05);
    }

    #[test]
    fn test_constant_trace_rejected() {
        let x = vec![1.0; 10];
        let y = vec![2.0; 10];
        assert!(principal_components(&x, &y).is_err());
    }

    #[test]
    fn test_reorient_flips_anticorrelated_axis() {
        let reference: Vec<f64> = (0..100).map(|i| (0.1 * i as f64).sin()).collect();
        let mut projected: Vec<f64> = reference.iter().map(|v| -v).collect();

        let flipped = reorient(&mut projected, &reference).unwrap();
        assert!(flipped);
        let (r, _) = pearson(&projected, &reference).unwrap();
        assert!((r - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_reorient_keeps_correlated_axis() {
        let reference: Vec<f64> = (0..100).map(|i| (0.1 * i as f64).sin()).collect();
        let mut projected = reference.clone();

        let flipped = reorient(&mut projected, &reference).unwrap();
        assert!(!flipped);
        assert_eq!(projected, reference);
    }

    #[test]
    fn test_reorient_ambiguous_is_hard_error() {
        // Orthogonal signals: r near zero, orientation undetermined.
        let reference: Vec<f64> = (0..200)
            .map(|i| if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        let mut projected: Vec<f64> = (0..200).map(|i| i as f64).collect();

        let result = reorient(&mut projected, &reference);
        assert!(matches!(result, Err(SignalError::DataQuality(_))));
    }

    #[test]
    fn test_reorient_ignores_nan_samples() {
        let reference: Vec<f64> = (0..100).map(|i| (0.1 * i as f64).sin()).collect();
        let mut projected: Vec<f64> = reference.iter().map(|v| -v).collect();
        projected[10] = f64::NAN;
        projected[50] = f64::NAN;

        let flipped = reorient(&mut projected, &reference).unwrap();
        assert!(flipped);
        // NaN samples stay NaN after the flip.
        assert!(projected[10].is_nan());
    }
}
