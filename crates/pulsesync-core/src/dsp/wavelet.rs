//! Haar wavelet denoising
//!
//! Multi-level Haar DWT, universal thresholding of every detail band and
//! inverse transform. The noise level is estimated from the finest detail
//! band with the median absolute deviation (`sigma = MAD / 0.6745`) and
//! the threshold is `sigma * sqrt(2 ln N)`.
//!
//! Inputs are mirror-padded to the next power of two and truncated back,
//! so any length can be denoised. With a zero threshold the round trip
//! reproduces the input to floating-point precision.

use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_1_SQRT_2;

use crate::stats;

/// MAD to standard deviation factor for Gaussian noise
const MAD_TO_SIGMA: f64 = 0.6745;

/// How detail coefficients are shrunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdMode {
    /// `sign(d) * max(|d| - t, 0)`
    Soft,
    /// `d` if `|d| > t`, else 0
    Hard,
}

impl ThresholdMode {
    #[inline]
    pub fn apply(self, d: f64, threshold: f64) -> f64 {
        match self {
            ThresholdMode::Soft => d.signum() * (d.abs() - threshold).max(0.0),
            ThresholdMode::Hard => {
                if d.abs() > threshold {
                    d
                } else {
                    0.0
                }
            }
        }
    }
}

/// Mirror-pad to the next power of two without repeating the edge sample
///
/// `[a, b, c]` becomes `[a, b, c, b]`.
pub fn mirror_pad(signal: &[f64]) -> Vec<f64> {
    let n = signal.len();
    let target = n.next_power_of_two();
    let mut out = Vec::with_capacity(target);
    out.extend_from_slice(signal);
    if n < 2 {
        out.resize(target, signal.first().copied().unwrap_or(0.0));
        return out;
    }
    // Reflect back and forth until the target length is reached
    let period = 2 * (n - 1);
    let mut k = n;
    while out.len() < target {
        let m = k % period;
        let idx = if m < n { m } else { period - m };
        out.push(signal[idx]);
        k += 1;
    }
    out
}

/// In-place multi-level forward Haar transform
///
/// After the call, `data[..len >> levels]` holds the approximation and the
/// detail bands follow, coarsest first. `data.len()` must be a power of two.
/// Returns the number of levels actually applied.
pub fn haar_forward(data: &mut [f64], levels: usize) -> usize {
    let mut len = data.len();
    let mut scratch = vec![0.0; len];
    let mut applied = 0;
    while applied < levels && len >= 2 {
        let half = len / 2;
        for i in 0..half {
            let a = data[2 * i];
            let b = data[2 * i + 1];
            scratch[i] = (a + b) * FRAC_1_SQRT_2;
            scratch[half + i] = (a - b) * FRAC_1_SQRT_2;
        }
        data[..len].copy_from_slice(&scratch[..len]);
        len = half;
        applied += 1;
    }
    applied
}

/// Inverse of [`haar_forward`] for `levels` levels
pub fn haar_inverse(data: &mut [f64], levels: usize) {
    let n = data.len();
    let mut scratch = vec![0.0; n];
    for level in (0..levels).rev() {
        let len = n >> level;
        let half = len / 2;
        for i in 0..half {
            let s = data[i];
            let d = data[half + i];
            scratch[2 * i] = (s + d) * FRAC_1_SQRT_2;
            scratch[2 * i + 1] = (s - d) * FRAC_1_SQRT_2;
        }
        data[..len].copy_from_slice(&scratch[..len]);
    }
}

/// Universal threshold estimated from the finest detail band
///
/// `finest` are the level-1 detail coefficients, `n` the signal length.
pub fn universal_threshold(finest: &[f64], n: usize) -> f64 {
    if finest.is_empty() || n < 2 {
        return 0.0;
    }
    let abs: Vec<f64> = finest.iter().map(|d| d.abs()).collect();
    let sigma = stats::median(&abs) / MAD_TO_SIGMA;
    sigma * (2.0 * (n as f64).ln()).sqrt()
}

/// Denoise with an explicit threshold
pub fn denoise_with_threshold(
    signal: &[f64],
    levels: usize,
    mode: ThresholdMode,
    threshold: f64,
) -> Vec<f64> {
    let n = signal.len();
    if n < 2 || levels == 0 {
        return signal.to_vec();
    }
    let mut data = mirror_pad(signal);
    let padded = data.len();
    let applied = haar_forward(&mut data, levels);
    let approx_len = padded >> applied;
    for d in &mut data[approx_len..] {
        *d = mode.apply(*d, threshold);
    }
    haar_inverse(&mut data, applied);
    data.truncate(n);
    data
}

/// Denoise with the universal threshold
///
/// # Example
/// ```
/// use pulsesync_core::dsp::wavelet::{denoise, ThresholdMode};
///
/// let noisy: Vec<f64> = (0..256)
///     .map(|i| (i as f64 * 0.05).sin() + if i % 2 == 0 { 0.05 } else { -0.05 })
///     .collect();
/// let clean = denoise(&noisy, 4, ThresholdMode::Soft);
/// assert_eq!(clean.len(), noisy.len());
/// ```
pub fn denoise(signal: &[f64], levels: usize, mode: ThresholdMode) -> Vec<f64> {
    let n = signal.len();
    if n < 2 || levels == 0 {
        return signal.to_vec();
    }
    let mut data = mirror_pad(signal);
    let padded = data.len();
    haar_forward(&mut data, 1);
    let threshold = universal_threshold(&data[padded / 2..], n);
    tracing::trace!(threshold = %format!("{:.5}", threshold), levels, "wavelet_threshold");
    denoise_with_threshold(signal, levels, mode, threshold)
}
