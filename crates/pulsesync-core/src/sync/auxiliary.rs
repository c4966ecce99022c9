//! Auxiliary per-frame metrics broadcast onto the unified timeline
//!
//! Capture reports motion magnitude, saturation fraction and inertial RMS
//! at its own, usually lower, cadence. Series with timestamps are linearly
//! interpolated onto the grid; series without timestamps are stretched over
//! the grid by proportional nearest index.

use serde::{Deserialize, Serialize};

use super::timeline::interpolate_onto;
use crate::types::TimestampedSample;

/// One auxiliary metric stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuxiliarySeries {
    /// Capture times in nanoseconds, same length as `values` when present
    pub timestamps_ns: Option<Vec<i64>>,
    pub values: Vec<f64>,
}

impl AuxiliarySeries {
    /// Series without timing, spread evenly over whatever grid it meets
    pub fn untimed(values: Vec<f64>) -> Self {
        Self {
            timestamps_ns: None,
            values,
        }
    }

    /// Series with per-value capture times
    pub fn timed(timestamps_ns: Vec<i64>, values: Vec<f64>) -> Self {
        Self {
            timestamps_ns: Some(timestamps_ns),
            values,
        }
    }

    /// Resample onto the unified grid
    ///
    /// Returns `None` for an empty series. A timestamp vector whose length
    /// does not match the values falls back to index broadcasting.
    pub fn resample(&self, grid_ns: &[i64]) -> Option<Vec<f64>> {
        if self.values.is_empty() {
            return None;
        }
        match &self.timestamps_ns {
            Some(ts) if ts.len() == self.values.len() => {
                let mut samples: Vec<TimestampedSample> = ts
                    .iter()
                    .zip(&self.values)
                    .map(|(&t, &v)| TimestampedSample::new(t, v))
                    .collect();
                samples.sort_by_key(|s| s.timestamp_ns);
                samples.dedup_by_key(|s| s.timestamp_ns);
                Some(interpolate_onto(&samples, grid_ns))
            }
            Some(ts) => {
                tracing::warn!(
                    timestamps = ts.len(),
                    values = self.values.len(),
                    "aux_timestamp_mismatch_using_index_broadcast"
                );
                Some(broadcast_by_index(&self.values, grid_ns.len()))
            }
            None => Some(broadcast_by_index(&self.values, grid_ns.len())),
        }
    }
}

/// Stretch `values` to `len` points by proportional nearest index
pub fn broadcast_by_index(values: &[f64], len: usize) -> Vec<f64> {
    if values.is_empty() || len == 0 {
        return Vec::new();
    }
    if len == 1 {
        return vec![values[0]];
    }
    let last = (values.len() - 1) as f64;
    (0..len)
        .map(|i| {
            let pos = i as f64 * last / (len - 1) as f64;
            values[(pos.round() as usize).min(values.len() - 1)]
        })
        .collect()
}

/// Optional auxiliary metrics accompanying a recording
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuxiliaryMetrics {
    /// Region-of-interest motion magnitude in pixels
    pub motion_px: Option<AuxiliarySeries>,
    /// Fraction of saturated pixels (0..1)
    pub saturation: Option<AuxiliarySeries>,
    /// Inertial sensor RMS
    pub inertial_rms: Option<AuxiliarySeries>,
}

/// Auxiliary metrics resampled onto the unified grid
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignedAuxiliary {
    pub motion_px: Option<Vec<f64>>,
    pub saturation: Option<Vec<f64>>,
    pub inertial_rms: Option<Vec<f64>>,
}

impl AuxiliaryMetrics {
    /// Resample every present metric onto `grid_ns`
    pub fn align(&self, grid_ns: &[i64]) -> AlignedAuxiliary {
        AlignedAuxiliary {
            motion_px: self.motion_px.as_ref().and_then(|s| s.resample(grid_ns)),
            saturation: self.saturation.as_ref().and_then(|s| s.resample(grid_ns)),
            inertial_rms: self.inertial_rms.as_ref().and_then(|s| s.resample(grid_ns)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_stretches_short_series() {
        let out = broadcast_by_index(&[1.0, 2.0, 3.0], 5);
        assert_eq!(out, vec![1.0, 2.0, 2.0, 3.0, 3.0]);
    }

    #[test]
    fn test_broadcast_edge_cases() {
        assert!(broadcast_by_index(&[], 4).is_empty());
        assert_eq!(broadcast_by_index(&[7.0], 3), vec![7.0, 7.0, 7.0]);
        assert_eq!(broadcast_by_index(&[1.0, 2.0], 1), vec![1.0]);
    }

    #[test]
    fn test_timed_series_interpolates() {
        let series = AuxiliarySeries::timed(vec![0, 100], vec![0.0, 10.0]);
        let out = series.resample(&[0, 25, 50, 100, 150]).unwrap();
        assert_eq!(out, vec![0.0, 2.5, 5.0, 10.0, 10.0]);
    }

    #[test]
    fn test_mismatched_timestamps_fall_back() {
        let series = AuxiliarySeries::timed(vec![0], vec![1.0, 2.0]);
        let out = series.resample(&[0, 1, 2]).unwrap();
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_align_skips_missing_metrics() {
        let metrics = AuxiliaryMetrics {
            motion_px: Some(AuxiliarySeries::untimed(vec![1.0, 2.0])),
            ..Default::default()
        };
        let aligned = metrics.align(&[0, 1, 2, 3]);
        assert_eq!(aligned.motion_px.unwrap().len(), 4);
        assert!(aligned.saturation.is_none());
        assert!(aligned.inertial_rms.is_none());
    }
}
