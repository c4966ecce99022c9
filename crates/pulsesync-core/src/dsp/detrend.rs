//! Baseline drift removal
//!
//! Slow illumination changes and tissue movement add a baseline that dwarfs
//! the pulsatile component. Either subtract a centered moving average or
//! run a first-order IIR high-pass.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Detrending strategy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DetrendMethod {
    /// Subtract a centered moving average of `window_s` seconds
    MovingAverage { window_s: f64 },
    /// First-order IIR high-pass at `cutoff_hz`
    HighPass { cutoff_hz: f64 },
}

impl DetrendMethod {
    /// Apply to `signal` sampled at `sample_rate`
    pub fn apply(&self, signal: &[f64], sample_rate: f64) -> Vec<f64> {
        match *self {
            DetrendMethod::MovingAverage { window_s } => {
                let window = (window_s * sample_rate).round().max(1.0) as usize;
                subtract_moving_average(signal, window)
            }
            DetrendMethod::HighPass { cutoff_hz } => {
                highpass_first_order(signal, sample_rate, cutoff_hz)
            }
        }
    }
}

/// Subtract a centered moving average of `window` samples
///
/// Uses prefix sums so the cost does not depend on the window. Near the
/// edges the window shrinks to the samples that exist.
pub fn subtract_moving_average(signal: &[f64], window: usize) -> Vec<f64> {
    let n = signal.len();
    if n == 0 {
        return Vec::new();
    }
    let half = window.max(1) / 2;

    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    let mut acc = 0.0;
    for &x in signal {
        acc += x;
        prefix.push(acc);
    }

    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(n);
            let avg = (prefix[hi] - prefix[lo]) / (hi - lo) as f64;
            signal[i] - avg
        })
        .collect()
}

/// First-order IIR high-pass
///
/// `y[i] = a * (y[i-1] + x[i] - x[i-1])` with `a = RC / (RC + dt)` and
/// `RC = 1 / (2 pi fc)`. The output starts at zero and a constant input
/// stays at zero, so a DC offset produces no start-up step.
pub fn highpass_first_order(signal: &[f64], sample_rate: f64, cutoff_hz: f64) -> Vec<f64> {
    if signal.is_empty() || sample_rate <= 0.0 || cutoff_hz <= 0.0 {
        return signal.to_vec();
    }
    let rc = 1.0 / (2.0 * PI * cutoff_hz);
    let dt = 1.0 / sample_rate;
    let alpha = rc / (rc + dt);

    let mut out = Vec::with_capacity(signal.len());
    let mut prev_y = 0.0;
    let mut prev_x = signal[0];
    out.push(0.0);
    for &x in &signal[1..] {
        let y = alpha * (prev_y + x - prev_x);
        out.push(y);
        prev_y = y;
        prev_x = x;
    }
    out
}
