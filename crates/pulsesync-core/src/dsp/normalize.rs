//! Amplitude normalization

use crate::stats;
use crate::types::DEGENERATE_EPSILON;

/// Z-score normalize: zero mean, unit (population) variance
///
/// A constant input, whose standard deviation is below
/// [`DEGENERATE_EPSILON`], maps to all zeros instead of dividing by ~0.
///
/// # Example
/// ```
/// use pulsesync_core::dsp::normalize::zscore;
///
/// assert_eq!(zscore(&[3.0, 3.0, 3.0]), vec![0.0, 0.0, 0.0]);
/// let z = zscore(&[1.0, 2.0, 3.0]);
/// assert!(z[1].abs() < 1e-12);
/// ```
pub fn zscore(signal: &[f64]) -> Vec<f64> {
    let sd = stats::std_dev(signal);
    if sd < DEGENERATE_EPSILON {
        return vec![0.0; signal.len()];
    }
    let m = stats::mean(signal);
    signal.iter().map(|x| (x - m) / sd).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zscore_moments() {
        let signal: Vec<f64> = (0..500).map(|i| 40.0 + 3.0 * (i as f64 * 0.07).sin()).collect();
        let z = zscore(&signal);
        assert!(stats::mean(&z).abs() < 1e-9);
        assert!((stats::std_dev(&z) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_zscore_constant_and_empty() {
        assert!(zscore(&[7.5; 64]).iter().all(|&v| v == 0.0));
        assert!(zscore(&[]).is_empty());
    }
}
