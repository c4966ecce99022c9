//! Clock drift, jitter and frame-drop diagnostics
//!
//! The two capture devices run on independent clocks. Comparing the
//! head-to-head and tail-to-tail offsets between the channels over the
//! elapsed recording time gives the inter-channel drift rate; the spread of
//! consecutive intervals gives per-channel jitter. Clock error only
//! accumulates while both streams run, so the head is taken where the later
//! stream starts and a staggered start is not mistaken for drift.

use serde::{Deserialize, Serialize};

use crate::config::SyncConfig;
use crate::stats;
use crate::types::{TimestampedSample, NANOS_PER_MS, NANOS_PER_SEC};

/// Drift at or above this magnitude (ms per second) is unacceptable
pub const MAX_ACCEPTABLE_DRIFT_MS_PER_S: f64 = 5.0;

/// Timing statistics of one channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelTiming {
    /// Samples analysed
    pub sample_count: usize,
    /// Average observed rate in Hz
    pub observed_rate_hz: f64,
    /// Standard deviation of consecutive intervals in ms
    pub jitter_ms: f64,
    /// Median interval in ms, the expected frame spacing
    pub median_interval_ms: f64,
    /// Intervals longer than `drop_factor` x the expected interval
    pub frame_drops: usize,
    /// Gaps `(start_ns, end_ns)` flagged as frame drops
    #[serde(skip)]
    pub drop_gaps: Vec<(i64, i64)>,
    /// Samples that arrived out of order
    pub reordered: usize,
    /// Samples dropped for repeating a timestamp
    pub duplicates: usize,
}

/// Inter-channel timing report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub channel_a: ChannelTiming,
    pub channel_b: ChannelTiming,
    /// Rate at which channel B's clock runs away from channel A's (ms/s)
    pub drift_ms_per_second: f64,
    /// `|drift| < 5 ms/s`
    pub is_acceptable: bool,
}

impl DriftReport {
    /// Total frame drops over both channels
    pub fn total_frame_drops(&self) -> usize {
        self.channel_a.frame_drops + self.channel_b.frame_drops
    }
}

/// Rate, jitter and drop statistics for one sorted channel
pub fn channel_timing(samples: &[TimestampedSample], drop_factor: f64) -> ChannelTiming {
    if samples.len() < 2 {
        return ChannelTiming {
            sample_count: samples.len(),
            ..Default::default()
        };
    }

    let intervals_ns: Vec<f64> = samples
        .windows(2)
        .map(|w| (w[1].timestamp_ns - w[0].timestamp_ns) as f64)
        .collect();

    let duration_s =
        (samples[samples.len() - 1].timestamp_ns - samples[0].timestamp_ns) as f64 / NANOS_PER_SEC;
    let observed_rate_hz = if duration_s > 0.0 {
        intervals_ns.len() as f64 / duration_s
    } else {
        0.0
    };

    let expected_ns = stats::median(&intervals_ns);
    let limit_ns = expected_ns * drop_factor;
    let drop_gaps: Vec<(i64, i64)> = samples
        .windows(2)
        .filter(|w| (w[1].timestamp_ns - w[0].timestamp_ns) as f64 > limit_ns)
        .map(|w| (w[0].timestamp_ns, w[1].timestamp_ns))
        .collect();

    ChannelTiming {
        sample_count: samples.len(),
        observed_rate_hz,
        jitter_ms: stats::std_dev(&intervals_ns) / NANOS_PER_MS,
        median_interval_ms: expected_ns / NANOS_PER_MS,
        frame_drops: drop_gaps.len(),
        drop_gaps,
        reordered: 0,
        duplicates: 0,
    }
}

/// Timestamp of the sample closest to `target_ns` in a sorted channel
fn nearest_timestamp(samples: &[TimestampedSample], target_ns: i64) -> Option<i64> {
    let idx = samples.partition_point(|s| s.timestamp_ns < target_ns);
    let after = samples.get(idx).map(|s| s.timestamp_ns);
    let before = idx.checked_sub(1).map(|i| samples[i].timestamp_ns);
    match (before, after) {
        (Some(lo), Some(hi)) if target_ns - lo <= hi - target_ns => Some(lo),
        (_, Some(hi)) => Some(hi),
        (lo, None) => lo,
    }
}

/// Inter-channel drift in ms per second
///
/// Each channel's head is its sample nearest the later of the two first
/// timestamps. The head offset and the tail offset `lastB - lastA` are
/// compared; their difference over channel A's elapsed time from its head
/// is the drift rate. Streams from identical clocks give ~0 whether or not
/// they started together.
pub fn drift_ms_per_second(a: &[TimestampedSample], b: &[TimestampedSample]) -> f64 {
    let (Some(a0), Some(a1), Some(b0), Some(b1)) = (a.first(), a.last(), b.first(), b.last())
    else {
        return 0.0;
    };

    let origin_ns = a0.timestamp_ns.max(b0.timestamp_ns);
    let (Some(head_a), Some(head_b)) = (
        nearest_timestamp(a, origin_ns),
        nearest_timestamp(b, origin_ns),
    ) else {
        return 0.0;
    };

    let head_ns = (head_b - head_a) as f64;
    let tail_ns = (b1.timestamp_ns - a1.timestamp_ns) as f64;

    let elapsed_a = (a1.timestamp_ns - head_a) as f64;
    let elapsed_ns = if elapsed_a > 0.0 {
        elapsed_a
    } else {
        (b1.timestamp_ns - head_b) as f64
    };
    if elapsed_ns <= 0.0 {
        return 0.0;
    }

    ((tail_ns - head_ns) / NANOS_PER_MS) / (elapsed_ns / NANOS_PER_SEC)
}

/// Build the full drift report for two sorted channels
pub fn analyze_drift(
    a: &[TimestampedSample],
    b: &[TimestampedSample],
    config: &SyncConfig,
) -> DriftReport {
    let channel_a = channel_timing(a, config.drop_factor);
    let channel_b = channel_timing(b, config.drop_factor);
    let drift = drift_ms_per_second(a, b);
    let is_acceptable = drift.abs() < MAX_ACCEPTABLE_DRIFT_MS_PER_S;

    tracing::debug!(
        rate_a_hz = %format!("{:.2}", channel_a.observed_rate_hz),
        rate_b_hz = %format!("{:.2}", channel_b.observed_rate_hz),
        jitter_a_ms = %format!("{:.2}", channel_a.jitter_ms),
        jitter_b_ms = %format!("{:.2}", channel_b.jitter_ms),
        drops = channel_a.frame_drops + channel_b.frame_drops,
        drift_ms_per_s = %format!("{:.3}", drift),
        "drift_analyzed"
    );

    DriftReport {
        channel_a,
        channel_b,
        drift_ms_per_second: drift,
        is_acceptable,
    }
}

/// Per-sample artifact mask over the unified timeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMask {
    /// `true` where the grid point lies in a bad window
    pub bad: Vec<bool>,
    /// Bad windows as half-open index ranges `[start, end)`
    pub bad_windows: Vec<(usize, usize)>,
}

impl ArtifactMask {
    /// Mask with every sample good
    pub fn clean(len: usize) -> Self {
        Self {
            bad: vec![false; len],
            bad_windows: Vec::new(),
        }
    }

    /// Fraction of masked samples in `[start, end)`
    pub fn bad_fraction(&self, start: usize, end: usize) -> f64 {
        let end = end.min(self.bad.len());
        if start >= end {
            return 0.0;
        }
        self.bad[start..end].iter().filter(|&&b| b).count() as f64 / (end - start) as f64
    }

    /// Whether sample `index` is masked
    pub fn is_bad(&self, index: usize) -> bool {
        self.bad.get(index).copied().unwrap_or(false)
    }

    /// Fraction of all samples masked
    pub fn total_bad_fraction(&self) -> f64 {
        self.bad_fraction(0, self.bad.len())
    }

    /// Longest run of unmasked samples as `[start, end)`
    ///
    /// `(0, 0)` when every sample is masked or the mask is empty.
    pub fn longest_clean_run(&self) -> (usize, usize) {
        let mut best = (0, 0);
        let mut start = 0;
        for (i, &bad) in self.bad.iter().chain(std::iter::once(&true)).enumerate() {
            if bad {
                if i - start > best.1 - best.0 {
                    best = (start, i);
                }
                start = i + 1;
            }
        }
        best
    }
}

/// Mark bad windows on the unified grid
///
/// A grid point scores 1 when it falls inside a frame-drop gap of either
/// channel, plus `motion / motion_mask_px` (capped at 1) when motion
/// magnitudes are supplied. Windows of `mask_window_s` stepped by half a
/// window whose mean score exceeds `max_artifact_density` are bad.
pub fn build_artifact_mask(
    grid_ns: &[i64],
    drift: &DriftReport,
    motion_px: Option<&[f64]>,
    config: &SyncConfig,
) -> ArtifactMask {
    let n = grid_ns.len();
    if n == 0 {
        return ArtifactMask::default();
    }

    let mut score = vec![0.0f64; n];
    for gaps in [&drift.channel_a.drop_gaps, &drift.channel_b.drop_gaps] {
        let mut cursor = 0usize;
        for &(gap_start, gap_end) in gaps.iter() {
            while cursor < n && grid_ns[cursor] <= gap_start {
                cursor += 1;
            }
            let mut i = cursor;
            while i < n && grid_ns[i] < gap_end {
                score[i] = 1.0;
                i += 1;
            }
        }
    }
    if let Some(motion) = motion_px {
        for (s, m) in score.iter_mut().zip(motion) {
            *s = (*s + (m / config.motion_mask_px).clamp(0.0, 1.0)).min(1.0);
        }
    }

    let rate_hz = if n > 1 {
        (n - 1) as f64 * NANOS_PER_SEC / (grid_ns[n - 1] - grid_ns[0]).max(1) as f64
    } else {
        1.0
    };
    let window = ((config.mask_window_s * rate_hz).round() as usize).clamp(1, n);
    let step = (window / 2).max(1);

    let mut mask = ArtifactMask::clean(n);
    let mut start = 0usize;
    loop {
        let end = (start + window).min(n);
        let density = score[start..end].iter().sum::<f64>() / (end - start) as f64;
        if density > config.max_artifact_density {
            mask.bad[start..end].iter_mut().for_each(|b| *b = true);
            match mask.bad_windows.last_mut() {
                Some(last) if last.1 >= start => last.1 = end,
                _ => mask.bad_windows.push((start, end)),
            }
        }
        if end == n {
            break;
        }
        start += step;
    }

    if !mask.bad_windows.is_empty() {
        tracing::debug!(
            windows = mask.bad_windows.len(),
            bad_fraction = %format!("{:.3}", mask.total_bad_fraction()),
            "artifact_windows_masked"
        );
    }
    mask
}
