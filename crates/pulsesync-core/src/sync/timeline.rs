//! Resampling of two independently-clocked streams onto one timeline
//!
//! Both channels are sanitized (sorted, duplicate timestamps dropped),
//! clipped to their common time range and linearly interpolated onto a
//! fixed-rate grid. Grid points outside a channel's samples clamp to the
//! channel's first/last value; nothing is extrapolated.

use serde::{Deserialize, Serialize};

use crate::types::{Channel, InputIssue, TimestampedSample, NANOS_PER_SEC};

/// Two channels resampled onto one fixed-rate grid
///
/// Invariant: `timestamps_ns`, `values_a` and `values_b` have equal length
/// and timestamps are strictly increasing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnifiedSeries {
    /// Grid timestamps in nanoseconds
    pub timestamps_ns: Vec<i64>,
    /// Channel A resampled onto the grid
    pub values_a: Vec<f64>,
    /// Channel B resampled onto the grid
    pub values_b: Vec<f64>,
    /// Grid rate in Hz
    pub sample_rate_hz: f64,
    /// False when the inputs were empty or did not overlap
    pub is_valid: bool,
    /// Diagnostic text for invalid series
    pub message: Option<String>,
}

impl UnifiedSeries {
    /// Invalid series carrying a diagnostic
    pub fn invalid(sample_rate_hz: f64, issue: InputIssue) -> Self {
        Self {
            sample_rate_hz,
            is_valid: false,
            message: Some(issue.to_string()),
            ..Default::default()
        }
    }

    /// Number of grid points
    pub fn len(&self) -> usize {
        self.timestamps_ns.len()
    }

    /// Whether the grid is empty
    pub fn is_empty(&self) -> bool {
        self.timestamps_ns.is_empty()
    }

    /// Covered duration in seconds (first to last grid point)
    pub fn duration_s(&self) -> f64 {
        match (self.timestamps_ns.first(), self.timestamps_ns.last()) {
            (Some(first), Some(last)) => (last - first) as f64 / NANOS_PER_SEC,
            _ => 0.0,
        }
    }

    /// Values of one channel
    pub fn values(&self, channel: Channel) -> &[f64] {
        match channel {
            Channel::A => &self.values_a,
            Channel::B => &self.values_b,
        }
    }
}

/// Outcome of sorting and de-duplicating a raw channel
#[derive(Debug, Clone, Default)]
pub struct SanitizedChannel {
    /// Samples in strictly increasing timestamp order
    pub samples: Vec<TimestampedSample>,
    /// Samples that arrived out of order
    pub reordered: usize,
    /// Samples dropped because their timestamp repeated
    pub duplicates: usize,
}

/// Sort by timestamp and drop samples that repeat a timestamp
///
/// Upstream capture may deliver frames slightly out of order; the first
/// sample seen for a given timestamp wins.
pub fn sanitize(raw: &[TimestampedSample]) -> SanitizedChannel {
    let reordered = raw
        .windows(2)
        .filter(|w| w[1].timestamp_ns < w[0].timestamp_ns)
        .count();

    let mut samples = raw.to_vec();
    samples.sort_by_key(|s| s.timestamp_ns);
    let before = samples.len();
    samples.dedup_by_key(|s| s.timestamp_ns);
    let duplicates = before - samples.len();

    if reordered > 0 || duplicates > 0 {
        tracing::debug!(reordered, duplicates, "channel_sanitized");
    }

    SanitizedChannel {
        samples,
        reordered,
        duplicates,
    }
}

/// Overlapping time range `[max(firstA, firstB), min(lastA, lastB)]`
///
/// Returns `None` when either channel is empty or the range is empty.
pub fn overlap_range(a: &[TimestampedSample], b: &[TimestampedSample]) -> Option<(i64, i64)> {
    let start = a.first()?.timestamp_ns.max(b.first()?.timestamp_ns);
    let end = a.last()?.timestamp_ns.min(b.last()?.timestamp_ns);
    (start < end).then_some((start, end))
}

/// Fixed-rate grid over `[start_ns, end_ns]`
///
/// Grid point `i` sits at `start + round(i * 1e9 / rate)`, so the length is
/// `floor(duration * rate) + 1`.
pub fn build_grid(start_ns: i64, end_ns: i64, rate_hz: f64) -> Vec<i64> {
    if end_ns < start_ns || rate_hz <= 0.0 {
        return Vec::new();
    }
    let step_ns = NANOS_PER_SEC / rate_hz;
    let count = ((end_ns - start_ns) as f64 / step_ns).floor() as usize + 1;
    (0..count)
        .map(|i| start_ns + (i as f64 * step_ns).round() as i64)
        .filter(|&t| t <= end_ns)
        .collect()
}

/// Linearly interpolate a sorted channel at sorted query times
///
/// Uses a single forward cursor, so the cost is linear in both inputs.
/// Queries before the first sample or after the last clamp to the edge
/// values.
pub fn interpolate_onto(samples: &[TimestampedSample], grid: &[i64]) -> Vec<f64> {
    let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
        return vec![0.0; grid.len()];
    };

    let mut out = Vec::with_capacity(grid.len());
    let mut cursor = 0usize;
    for &t in grid {
        if t <= first.timestamp_ns {
            out.push(first.value);
            continue;
        }
        if t >= last.timestamp_ns {
            out.push(last.value);
            continue;
        }
        while cursor + 1 < samples.len() && samples[cursor + 1].timestamp_ns < t {
            cursor += 1;
        }
        let left = samples[cursor];
        let right = samples[(cursor + 1).min(samples.len() - 1)];
        let span = (right.timestamp_ns - left.timestamp_ns) as f64;
        let value = if span <= 0.0 {
            left.value
        } else {
            let frac = (t - left.timestamp_ns) as f64 / span;
            left.value + (right.value - left.value) * frac
        };
        out.push(value);
    }
    out
}

/// Resamples channel pairs onto a fixed-rate unified timeline
///
/// # Example
/// ```
/// use pulsesync_core::sync::timeline::TimestampSynchronizer;
/// use pulsesync_core::types::TimestampedSample;
///
/// let a: Vec<_> = (0..31).map(|i| TimestampedSample::new(i * 33_333_333, 1.0)).collect();
/// let b: Vec<_> = (0..61).map(|i| TimestampedSample::new(i * 16_666_667, 1.0)).collect();
///
/// let sync = TimestampSynchronizer::new(100.0);
/// let unified = sync.resample(&a, &b);
/// assert!(unified.is_valid);
/// assert!(unified.values_a.iter().all(|&v| (v - 1.0).abs() < 1e-12));
/// ```
#[derive(Debug, Clone)]
pub struct TimestampSynchronizer {
    target_rate_hz: f64,
}

impl TimestampSynchronizer {
    /// Create a synchronizer producing `target_rate_hz` grids
    pub fn new(target_rate_hz: f64) -> Self {
        Self { target_rate_hz }
    }

    /// Unified grid rate
    pub fn target_rate_hz(&self) -> f64 {
        self.target_rate_hz
    }

    /// Sanitize both raw channels and resample their overlap
    pub fn resample(&self, a: &[TimestampedSample], b: &[TimestampedSample]) -> UnifiedSeries {
        let a = sanitize(a);
        let b = sanitize(b);
        self.resample_sorted(&a.samples, &b.samples)
    }

    /// Resample channels already in strictly increasing timestamp order
    pub fn resample_sorted(
        &self,
        a: &[TimestampedSample],
        b: &[TimestampedSample],
    ) -> UnifiedSeries {
        if self.target_rate_hz <= 0.0 || !self.target_rate_hz.is_finite() {
            return UnifiedSeries::invalid(
                self.target_rate_hz,
                InputIssue::InvalidSampleRate(self.target_rate_hz),
            );
        }
        if a.is_empty() {
            return UnifiedSeries::invalid(self.target_rate_hz, InputIssue::EmptyChannel(Channel::A));
        }
        if b.is_empty() {
            return UnifiedSeries::invalid(self.target_rate_hz, InputIssue::EmptyChannel(Channel::B));
        }
        let Some((start_ns, end_ns)) = overlap_range(a, b) else {
            tracing::debug!(
                a_first = a[0].timestamp_ns,
                b_first = b[0].timestamp_ns,
                "no_channel_overlap"
            );
            return UnifiedSeries::invalid(self.target_rate_hz, InputIssue::NoOverlap);
        };

        let timestamps_ns = build_grid(start_ns, end_ns, self.target_rate_hz);
        let values_a = interpolate_onto(a, &timestamps_ns);
        let values_b = interpolate_onto(b, &timestamps_ns);

        tracing::debug!(
            points = timestamps_ns.len(),
            overlap_s = %format!("{:.3}", (end_ns - start_ns) as f64 / NANOS_PER_SEC),
            rate_hz = self.target_rate_hz,
            "timeline_resampled"
        );

        UnifiedSeries {
            timestamps_ns,
            values_a,
            values_b,
            sample_rate_hz: self.target_rate_hz,
            is_valid: true,
            message: None,
        }
    }
}
