//! Systolic peak detection on a conditioned channel
//!
//! Local maxima above an adaptive threshold `mean + 0.3·(max − mean)`.
//! Peaks closer than the refractory period collapse onto the larger one.

use crate::stats;

/// Fraction of the mean-to-max span used as the detection threshold
pub const THRESHOLD_FRACTION: f64 = 0.3;

/// Shortest plausible beat interval (200 bpm)
pub const REFRACTORY_S: f64 = 0.3;

/// Indices of systolic peaks in `signal` sampled at `sample_rate` Hz
///
/// # Example
/// ```
/// use pulsesync_core::quality::peaks::detect_peaks;
///
/// let fs = 100.0;
/// let wave: Vec<f64> = (0..1000)
///     .map(|i| (2.0 * std::f64::consts::PI * 1.0 * i as f64 / fs).sin())
///     .collect();
/// // One peak per second, at 0.25 s into each cycle
/// assert_eq!(detect_peaks(&wave, fs), vec![25, 125, 225, 325, 425, 525, 625, 725, 825, 925]);
/// ```
pub fn detect_peaks(signal: &[f64], sample_rate: f64) -> Vec<usize> {
    if signal.len() < 3 || sample_rate <= 0.0 {
        return Vec::new();
    }
    let mean = stats::mean(signal);
    let max = signal.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max - mean <= 0.0 {
        return Vec::new();
    }
    let threshold = mean + THRESHOLD_FRACTION * (max - mean);
    let min_dist = (REFRACTORY_S * sample_rate).round().max(1.0) as usize;

    let mut peaks: Vec<usize> = Vec::new();
    for i in 1..signal.len() - 1 {
        let v = signal[i];
        if v > threshold && v > signal[i - 1] && v >= signal[i + 1] {
            match peaks.last_mut() {
                Some(last) if i - *last < min_dist => {
                    if v > signal[*last] {
                        *last = i;
                    }
                }
                _ => peaks.push(i),
            }
        }
    }
    peaks
}

/// Consecutive peak intervals in seconds
pub fn peak_intervals_s(peaks: &[usize], sample_rate: f64) -> Vec<f64> {
    if sample_rate <= 0.0 {
        return Vec::new();
    }
    peaks
        .windows(2)
        .map(|w| (w[1] - w[0]) as f64 / sample_rate)
        .collect()
}

/// Heart rate from the median peak interval, 0 with fewer than two peaks
pub fn heart_rate_bpm(peaks: &[usize], sample_rate: f64) -> f64 {
    let intervals = peak_intervals_s(peaks, sample_rate);
    let median = stats::median(&intervals);
    if median > 0.0 {
        60.0 / median
    } else {
        0.0
    }
}
