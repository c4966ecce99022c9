//! Pulse foot (upstroke onset) detection and beat pairing
//!
//! For each systolic peak the preceding trough is searched within 0.6 of
//! the median beat interval. The foot is then either the fractional
//! sample where the upstroke crosses `trough + fraction·(peak − trough)`
//! or the middle of the steepest rising step.

use serde::{Deserialize, Serialize};

use crate::quality::peaks;
use crate::stats;
use crate::sync::drift::ArtifactMask;

/// Trough search reach as a fraction of the median beat interval
pub const TROUGH_SEARCH_FRACTION: f64 = 0.6;

/// Beat interval assumed when fewer than two peaks exist (seconds)
const FALLBACK_INTERVAL_S: f64 = 1.0;

/// How the foot is located on the upstroke
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FootMethod {
    /// Crossing of a fraction of the trough-to-peak amplitude
    ThresholdCrossing { fraction: f64 },
    /// Steepest rising sample-to-sample step
    MaxSlope,
}

/// One detected beat
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PulseFoot {
    /// Foot position in fractional samples
    pub position: f64,
    pub trough: usize,
    pub peak: usize,
}

/// Feet of one channel plus the beat interval they were found with
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FootDetection {
    pub feet: Vec<PulseFoot>,
    /// Median peak-to-peak interval in samples (0 with fewer than two peaks)
    pub median_interval: f64,
}

/// Locate the foot of every beat in a conditioned signal
///
/// # Example
/// ```
/// use pulsesync_core::consensus::foot::{detect_feet, FootMethod};
///
/// let fs = 100.0;
/// let wave: Vec<f64> = (0..1000)
///     .map(|i| (2.0 * std::f64::consts::PI * i as f64 / fs).sin())
///     .collect();
/// let found = detect_feet(&wave, fs, FootMethod::ThresholdCrossing { fraction: 0.5 });
/// // The first beat is truncated; the next foot is the zero crossing at 100
/// assert!((found.feet[0].position - 100.0).abs() < 0.05);
/// ```
pub fn detect_feet(signal: &[f64], sample_rate: f64, method: FootMethod) -> FootDetection {
    let peak_idx = peaks::detect_peaks(signal, sample_rate);
    let intervals: Vec<f64> = peak_idx.windows(2).map(|w| (w[1] - w[0]) as f64).collect();
    let median_interval = stats::median(&intervals);
    let reach_base = if median_interval > 0.0 {
        median_interval
    } else {
        FALLBACK_INTERVAL_S * sample_rate
    };
    let reach = (TROUGH_SEARCH_FRACTION * reach_base).round().max(1.0) as usize;

    let mut feet = Vec::with_capacity(peak_idx.len());
    let mut floor = 0usize;
    for &peak in &peak_idx {
        let start = peak.saturating_sub(reach).max(floor);
        floor = peak + 1;
        if peak <= start + 1 {
            continue;
        }
        let trough = (start..peak)
            .min_by(|&i, &j| {
                signal[i]
                    .partial_cmp(&signal[j])
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(start);
        // A trough on the first sample is a truncated beat
        if trough == 0 {
            continue;
        }
        if let Some(position) = locate_foot(signal, trough, peak, method) {
            feet.push(PulseFoot {
                position,
                trough,
                peak,
            });
        }
    }

    tracing::trace!(
        peaks = peak_idx.len(),
        feet = feet.len(),
        median_interval = %format!("{:.1}", median_interval),
        "feet_detected"
    );
    FootDetection {
        feet,
        median_interval,
    }
}

fn locate_foot(signal: &[f64], trough: usize, peak: usize, method: FootMethod) -> Option<f64> {
    match method {
        FootMethod::ThresholdCrossing { fraction } => {
            let level = signal[trough] + fraction * (signal[peak] - signal[trough]);
            (trough..peak).find_map(|j| {
                let (lo, hi) = (signal[j], signal[j + 1]);
                if lo <= level && level <= hi && hi > lo {
                    Some(j as f64 + (level - lo) / (hi - lo))
                } else {
                    None
                }
            })
        }
        FootMethod::MaxSlope => (trough..peak)
            .max_by(|&i, &j| {
                let si = signal[i + 1] - signal[i];
                let sj = signal[j + 1] - signal[j];
                si.partial_cmp(&sj).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|j| j as f64 + 0.5),
    }
}

/// Delays (B foot − A foot, in samples) of paired beats
///
/// Each A foot pairs with the nearest B foot when the delay is within
/// `max_delay` samples. Pairs with either foot on a masked sample are
/// dropped.
pub fn pair_feet(
    a: &[PulseFoot],
    b: &[PulseFoot],
    max_delay: f64,
    mask: Option<&ArtifactMask>,
) -> Vec<f64> {
    let masked = |pos: f64| mask.is_some_and(|m| m.is_bad(pos.floor().max(0.0) as usize));
    let mut delays = Vec::with_capacity(a.len());
    let mut cursor = 0usize;
    for fa in a {
        // b is ordered; advance while the next foot is at least as close
        while cursor + 1 < b.len()
            && (b[cursor + 1].position - fa.position).abs() <= (b[cursor].position - fa.position).abs()
        {
            cursor += 1;
        }
        let Some(fb) = b.get(cursor) else {
            break;
        };
        let delay = fb.position - fa.position;
        if delay.abs() > max_delay || masked(fa.position) || masked(fb.position) {
            continue;
        }
        delays.push(delay);
    }
    delays
}
