//! Normalized cross-correlation lag estimation
//!
//! `R[τ] = Σ x'[i]·y'[i+τ] / sqrt(Σx'²·Σy'²)` with `x' = x − mean(x)`,
//! evaluated for `τ ∈ [−max_lag, +max_lag]` through an FFT of twice the
//! signal length. A positive lag means channel B trails channel A.
//!
//! The integer peak is refined with a 3-point parabola:
//!
//! ```text
//! offset = (y₋₁ − y₊₁) / (2·(y₋₁ − 2·y₀ + y₊₁))
//! ```

use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::config::LagConfig;
use crate::spectral::fft::{forward_in_place, inverse_in_place};
use crate::stats;
use crate::types::{InputIssue, DEGENERATE_EPSILON};

/// Minimum samples for a correlation to mean anything
const MIN_SAMPLES: usize = 8;

/// Result of one lag estimation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LagEstimate {
    /// Refined lag in milliseconds
    pub lag_ms: f64,
    /// Normalized correlation at the integer peak (−1..1)
    pub correlation: f64,
    /// Integer lag at the correlation peak (samples)
    pub lag_samples: i64,
    /// Sub-sample refined lag (fractional samples)
    pub refined_lag_samples: f64,
    /// Half the prominence of the peak over its neighbouring valleys (0..1)
    pub peak_sharpness: f64,
    /// Correlation could be computed
    pub is_valid: bool,
    /// `correlation` exceeds the configured minimum
    pub is_reliable: bool,
    /// `lag_ms` lies in the plausible range
    pub is_plausible: bool,
    /// Diagnostic text when the estimate is invalid, unreliable or implausible
    pub message: Option<String>,
}

impl LagEstimate {
    fn invalid(issue: InputIssue) -> Self {
        Self {
            message: Some(issue.to_string()),
            ..Default::default()
        }
    }

    /// Valid, reliable and plausible
    pub fn is_usable(&self) -> bool {
        self.is_valid && self.is_reliable && self.is_plausible
    }
}

/// Normalized cross-correlation over `[-max_lag, max_lag]`
///
/// Entry `max_lag + τ` holds `R[τ]`. Returns `None` when either signal is
/// (near) constant; the caller reports that as degenerate.
///
/// # Example
/// ```
/// use pulsesync_core::lag::xcorr::normalized_xcorr;
/// use rustfft::FftPlanner;
///
/// let x: Vec<f64> = (0..64).map(|i| (i as f64 * 0.4).sin()).collect();
/// let r = normalized_xcorr(&mut FftPlanner::new(), &x, &x, 5).unwrap();
/// assert_eq!(r.len(), 11);
/// assert!((r[5] - 1.0).abs() < 1e-9);
/// ```
pub fn normalized_xcorr(
    planner: &mut FftPlanner<f64>,
    x: &[f64],
    y: &[f64],
    max_lag: usize,
) -> Option<Vec<f64>> {
    let n = x.len().min(y.len());
    if n == 0 {
        return None;
    }
    let (x, y) = (&x[..n], &y[..n]);
    let mx = stats::mean(x);
    let my = stats::mean(y);
    let ex: f64 = x.iter().map(|v| (v - mx).powi(2)).sum();
    let ey: f64 = y.iter().map(|v| (v - my).powi(2)).sum();
    let norm = (ex * ey).sqrt();
    if ex / (n as f64) < DEGENERATE_EPSILON
        || ey / (n as f64) < DEGENERATE_EPSILON
        || norm < DEGENERATE_EPSILON
    {
        return None;
    }

    let max_lag = max_lag.min(n - 1);
    let fft_size = (2 * n).next_power_of_two();
    let pad = |s: &[f64], m: f64| -> Vec<Complex<f64>> {
        s.iter()
            .map(|&v| Complex::new(v - m, 0.0))
            .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
            .take(fft_size)
            .collect()
    };
    let mut fx = pad(x, mx);
    let mut fy = pad(y, my);
    forward_in_place(planner, &mut fx).ok()?;
    forward_in_place(planner, &mut fy).ok()?;

    // conj(X)·Y gives Σ x[i]·y[i+τ] at index τ (negative τ wraps)
    for (a, b) in fx.iter_mut().zip(&fy) {
        *a = a.conj() * b;
    }
    inverse_in_place(planner, &mut fx).ok()?;

    let scale = 1.0 / (fft_size as f64 * norm);
    let out = (-(max_lag as i64)..=max_lag as i64)
        .map(|tau| {
            let idx = if tau < 0 {
                (fft_size as i64 + tau) as usize
            } else {
                tau as usize
            };
            (fx[idx].re * scale).clamp(-1.0, 1.0)
        })
        .collect();
    Some(out)
}

/// Sub-sample offset of a peak from its two neighbours
///
/// Returns 0 when the parabola is flat. The offset is clamped to ±0.5.
pub fn parabolic_offset(y_prev: f64, y0: f64, y_next: f64) -> f64 {
    let denom = y_prev - 2.0 * y0 + y_next;
    if denom.abs() < DEGENERATE_EPSILON {
        return 0.0;
    }
    ((y_prev - y_next) / (2.0 * denom)).clamp(-0.5, 0.5)
}

/// Half the height of `r[peak]` above the higher of its two flanking valleys
///
/// Each valley is found by walking downhill from the peak until the
/// correlation rises again or the range ends.
pub fn peak_sharpness(r: &[f64], peak: usize) -> f64 {
    if r.len() < 2 || peak >= r.len() {
        return 0.0;
    }
    let mut left = peak;
    while left > 0 && r[left - 1] <= r[left] {
        left -= 1;
    }
    let mut right = peak;
    while right + 1 < r.len() && r[right + 1] <= r[right] {
        right += 1;
    }
    let base = r[left].max(r[right]);
    ((r[peak] - base) / 2.0).clamp(0.0, 1.0)
}

/// Cross-correlation lag estimator for one sample rate
pub struct LagEstimator {
    config: LagConfig,
    sample_rate: f64,
    planner: FftPlanner<f64>,
}

impl std::fmt::Debug for LagEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LagEstimator")
            .field("config", &self.config)
            .field("sample_rate", &self.sample_rate)
            .finish_non_exhaustive()
    }
}

impl LagEstimator {
    /// Create an estimator for signals sampled at `sample_rate` Hz
    pub fn new(config: &LagConfig, sample_rate: f64) -> Self {
        Self {
            config: config.clone(),
            sample_rate,
            planner: FftPlanner::new(),
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn config(&self) -> &LagConfig {
        &self.config
    }

    /// Largest searched lag in samples
    pub fn max_lag_samples(&self) -> usize {
        (self.config.max_lag_s * self.sample_rate).round().max(1.0) as usize
    }

    /// Estimate how far `b` trails `a`
    ///
    /// # Arguments
    /// * `a` - Channel A (reference) samples
    /// * `b` - Channel B samples on the same timeline
    ///
    /// # Returns
    /// An estimate that is invalid for empty, mismatched, short or
    /// constant inputs, never an error.
    pub fn estimate(&mut self, a: &[f64], b: &[f64]) -> LagEstimate {
        if self.sample_rate <= 0.0 {
            return LagEstimate::invalid(InputIssue::InvalidSampleRate(self.sample_rate));
        }
        if a.len() != b.len() {
            return LagEstimate::invalid(InputIssue::LengthMismatch {
                left: a.len(),
                right: b.len(),
            });
        }
        if a.len() < MIN_SAMPLES {
            return LagEstimate::invalid(InputIssue::TooShort {
                len: a.len(),
                min: MIN_SAMPLES,
            });
        }

        let max_lag = self.max_lag_samples();
        let Some(r) = normalized_xcorr(&mut self.planner, a, b, max_lag) else {
            tracing::debug!(samples = a.len(), "lag_degenerate_signal");
            return LagEstimate::invalid(InputIssue::Degenerate);
        };
        let estimate = self.estimate_from_correlation(&r);
        tracing::debug!(
            lag_ms = %format!("{:.2}", estimate.lag_ms),
            correlation = %format!("{:.3}", estimate.correlation),
            reliable = estimate.is_reliable,
            plausible = estimate.is_plausible,
            "lag_estimated"
        );
        estimate
    }

    /// Peak pick and refine an already computed correlation sequence
    /// centered on lag zero
    pub fn estimate_from_correlation(&self, r: &[f64]) -> LagEstimate {
        let max_lag = (r.len() / 2) as i64;
        let Some(peak) = (0..r.len()).max_by(|&i, &j| {
            r[i].partial_cmp(&r[j]).unwrap_or(std::cmp::Ordering::Equal)
        }) else {
            return LagEstimate::invalid(InputIssue::TooShort { len: 0, min: 1 });
        };

        let offset = if peak == 0 || peak + 1 == r.len() {
            0.0
        } else {
            parabolic_offset(r[peak - 1], r[peak], r[peak + 1])
        };
        let lag_samples = peak as i64 - max_lag;
        let refined_lag_samples = lag_samples as f64 + offset;
        let lag_ms = refined_lag_samples * 1000.0 / self.sample_rate;
        let correlation = r[peak];

        let is_reliable = correlation > self.config.min_correlation;
        let (lo, hi) = self.config.plausible_ms;
        let is_plausible = (lo..=hi).contains(&lag_ms);
        let message = if !is_reliable {
            Some(format!(
                "correlation {:.2} is below {:.2}",
                correlation, self.config.min_correlation
            ))
        } else if !is_plausible {
            Some(format!(
                "lag {:.1} ms is outside {:.0}..{:.0} ms",
                lag_ms, lo, hi
            ))
        } else {
            None
        };

        LagEstimate {
            lag_ms,
            correlation,
            lag_samples,
            refined_lag_samples,
            peak_sharpness: peak_sharpness(r, peak),
            is_valid: true,
            is_reliable,
            is_plausible,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const FS: f64 = 100.0;

    fn pulse(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let t = i as f64 / FS;
                (2.0 * PI * 1.2 * t).sin() + 0.4 * (2.0 * PI * 2.4 * t + 0.7).sin()
            })
            .collect()
    }

    fn delayed(x: &[f64], k: usize) -> Vec<f64> {
        let mut out = vec![x[0]; k];
        out.extend_from_slice(&x[..x.len() - k]);
        out
    }

    fn estimator() -> LagEstimator {
        LagEstimator::new(&LagConfig::default(), FS)
    }

    #[test]
    fn test_self_correlation_is_zero_lag() {
        let x = pulse(2000);
        let est = estimator().estimate(&x, &x);
        assert!(est.is_valid);
        assert_eq!(est.lag_samples, 0);
        assert!(est.lag_ms.abs() <= 10.0);
        assert!((est.correlation - 1.0).abs() < 1e-6);
        // Zero lag is not a plausible transit time
        assert!(!est.is_plausible);
        assert!(est.message.is_some());
    }

    #[test]
    fn test_recovers_integer_delay() {
        let x = pulse(3000);
        let y = delayed(&x, 10);
        let est = estimator().estimate(&x, &y);
        assert!(est.is_usable(), "{:?}", est.message);
        assert_eq!(est.lag_samples, 10);
        assert!((est.lag_ms - 100.0).abs() < 5.0, "lag {}", est.lag_ms);
    }

    #[test]
    fn test_negative_lag_when_a_trails() {
        let x = pulse(3000);
        let y = delayed(&x, 7);
        let est = estimator().estimate(&y, &x);
        assert_eq!(est.lag_samples, -7);
        assert!(!est.is_plausible);
    }

    #[test]
    fn test_constant_signal_is_invalid() {
        let x = pulse(500);
        let est = estimator().estimate(&x, &[2.0; 500]);
        assert!(!est.is_valid);
        assert_eq!(est.message.as_deref(), Some("signal variance is near zero"));
        assert!(normalized_xcorr(&mut FftPlanner::new(), &x, &[2.0; 500], 10).is_none());
    }

    #[test]
    fn test_mismatched_and_empty_inputs() {
        let est = estimator().estimate(&[1.0, 2.0, 3.0], &[1.0]);
        assert!(!est.is_valid);
        assert!(!estimator().estimate(&[], &[]).is_valid);
    }

    #[test]
    fn test_parabolic_offset() {
        // Symmetric neighbours: no offset
        assert_eq!(parabolic_offset(0.5, 1.0, 0.5), 0.0);
        // Right neighbour higher: peak shifts right
        assert!(parabolic_offset(0.4, 1.0, 0.8) > 0.0);
        // Flat: guarded
        assert_eq!(parabolic_offset(1.0, 1.0, 1.0), 0.0);
    }

    #[test]
    fn test_fractional_delay_refinement() {
        // Sampled continuous delay of 10.4 samples
        let n = 3000;
        let shift = 10.4 / FS;
        let x: Vec<f64> = (0..n).map(|i| (2.0 * PI * 1.2 * i as f64 / FS).sin()).collect();
        let y: Vec<f64> = (0..n)
            .map(|i| (2.0 * PI * 1.2 * (i as f64 / FS - shift)).sin())
            .collect();
        let est = estimator().estimate(&x, &y);
        assert!((est.refined_lag_samples - 10.4).abs() < 0.15, "{}", est.refined_lag_samples);
    }

    #[test]
    fn test_peak_sharpness() {
        let r = [0.0, -0.8, 0.2, 1.0, 0.1, -0.6, 0.3];
        // Valleys at -0.8 and -0.6 -> (1.0 - (-0.6)) / 2
        assert!((peak_sharpness(&r, 3) - 0.8).abs() < 1e-12);
        assert_eq!(peak_sharpness(&[0.5, 0.5], 0), 0.0);
    }
}
