//! Signal quality index
//!
//! Per-channel score (0–100) from an SNR score, a peak-regularity score
//! and optional motion / inertial / saturation penalties. Only the
//! components that are present take part; their weights renormalize to 1.
//!
//! The cross-channel confidence blends the weakest channel score with the
//! correlation peak value and its sharpness.

use serde::{Deserialize, Serialize};

use crate::config::QualityConfig;
use crate::dsp::chain::ConditionedChannel;
use crate::quality::peaks;
use crate::stats;
use crate::sync::auxiliary::AlignedAuxiliary;

/// Fewest peaks (two intervals) that make a regularity score
pub const MIN_PEAKS_FOR_REGULARITY: usize = 3;

/// Mean auxiliary levels over an analysis window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AuxiliaryLevels {
    pub motion_px: Option<f64>,
    pub inertial_rms: Option<f64>,
    pub saturation: Option<f64>,
}

impl AuxiliaryLevels {
    /// Means of whatever aligned metrics exist
    pub fn from_aligned(aligned: &AlignedAuxiliary) -> Self {
        let mean = |v: &Option<Vec<f64>>| v.as_deref().filter(|s| !s.is_empty()).map(stats::mean);
        Self {
            motion_px: mean(&aligned.motion_px),
            inertial_rms: mean(&aligned.inertial_rms),
            saturation: mean(&aligned.saturation),
        }
    }
}

/// Quality of one conditioned channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelQuality {
    /// Composite score, always within 0..=100
    pub score: f64,
    pub snr_db: f64,
    pub snr_score: f64,
    pub regularity_score: f64,
    /// Penalties (0 = none, 100 = worst) for the metrics that were supplied
    pub motion_penalty: Option<f64>,
    pub inertial_penalty: Option<f64>,
    pub saturation_penalty: Option<f64>,
    pub peak_count: usize,
    /// Coefficient of variation of the peak intervals
    pub interval_cv: f64,
    /// Heart rate from the median peak interval
    pub heart_rate_bpm: f64,
}

/// Cross-channel confidence and the reportability gate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombinedConfidence {
    /// Lower of the two channel scores
    pub weakest_score: f64,
    pub correlation: f64,
    pub peak_sharpness: f64,
    /// Weighted blend, 0..=1
    pub confidence: f64,
    pub reportable: bool,
}

/// Map an SNR in dB onto 0..=100
///
/// Linear up to `snr_full_db`; never below the floor score.
pub fn snr_score(snr_db: f64, config: &QualityConfig) -> f64 {
    if snr_db >= config.snr_full_db {
        100.0
    } else if snr_db <= 0.0 {
        config.snr_floor_score
    } else {
        (100.0 * snr_db / config.snr_full_db).max(config.snr_floor_score)
    }
}

/// `max(0, 100·(1 − cv/ceiling))`
pub fn regularity_score(interval_cv: f64, config: &QualityConfig) -> f64 {
    (100.0 * (1.0 - interval_cv / config.cv_ceiling)).max(0.0)
}

/// Linear 0..100 ramp of `value` across `(low, high)`
pub fn ramp_penalty(value: f64, (low, high): (f64, f64)) -> f64 {
    if high <= low {
        return if value > low { 100.0 } else { 0.0 };
    }
    100.0 * ((value - low) / (high - low)).clamp(0.0, 1.0)
}

/// Signal quality engine
#[derive(Debug, Clone)]
pub struct QualityEngine {
    config: QualityConfig,
}

impl QualityEngine {
    pub fn new(config: &QualityConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Score one conditioned channel
    ///
    /// # Arguments
    /// * `channel` - Output of the conditioning chain
    /// * `sample_rate` - Rate of the unified timeline in Hz
    /// * `aux` - Mean auxiliary levels for this channel's capture
    pub fn assess(
        &self,
        channel: &ConditionedChannel,
        sample_rate: f64,
        aux: &AuxiliaryLevels,
    ) -> ChannelQuality {
        let c = &self.config;
        let snr_db = channel.snr_db();
        let snr = snr_score(snr_db, c);

        let peak_idx = if channel.is_degenerate {
            Vec::new()
        } else {
            peaks::detect_peaks(&channel.values, sample_rate)
        };
        let intervals = peaks::peak_intervals_s(&peak_idx, sample_rate);
        let (interval_cv, regularity) = if peak_idx.len() >= MIN_PEAKS_FOR_REGULARITY {
            let cv = stats::coefficient_of_variation(&intervals);
            (cv, regularity_score(cv, c))
        } else {
            (0.0, 0.0)
        };

        let motion_penalty = aux.motion_px.map(|v| ramp_penalty(v, c.motion_range_px));
        let inertial_penalty = aux
            .inertial_rms
            .map(|v| ramp_penalty(v, c.inertial_range_rms));
        let saturation_penalty = aux
            .saturation
            .map(|v| ramp_penalty(v, c.saturation_range));

        let mut weighted = c.snr_weight * snr + c.regularity_weight * regularity;
        let mut total = c.snr_weight + c.regularity_weight;
        for (penalty, weight) in [
            (motion_penalty, c.motion_weight),
            (inertial_penalty, c.inertial_weight),
            (saturation_penalty, c.saturation_weight),
        ] {
            if let Some(p) = penalty {
                weighted += weight * (100.0 - p);
                total += weight;
            }
        }
        let score = if total > 0.0 {
            (weighted / total).clamp(0.0, 100.0)
        } else {
            0.0
        };

        tracing::debug!(
            score = %format!("{:.1}", score),
            snr_db = %format!("{:.1}", snr_db),
            peaks = peak_idx.len(),
            cv = %format!("{:.3}", interval_cv),
            "channel_quality"
        );

        ChannelQuality {
            score,
            snr_db,
            snr_score: snr,
            regularity_score: regularity,
            motion_penalty,
            inertial_penalty,
            saturation_penalty,
            peak_count: peak_idx.len(),
            interval_cv,
            heart_rate_bpm: peaks::heart_rate_bpm(&peak_idx, sample_rate),
        }
    }

    /// Blend both channel scores with the correlation peak
    ///
    /// # Example
    /// ```
    /// use pulsesync_core::config::QualityConfig;
    /// use pulsesync_core::quality::{ChannelQuality, QualityEngine};
    ///
    /// let engine = QualityEngine::new(&QualityConfig::default());
    /// let good = ChannelQuality { score: 100.0, ..Default::default() };
    /// let combined = engine.combine(&good, &good, 1.0, 1.0);
    /// assert!((combined.confidence - 1.0).abs() < 1e-12);
    /// assert!(combined.reportable);
    /// ```
    pub fn combine(
        &self,
        a: &ChannelQuality,
        b: &ChannelQuality,
        correlation: f64,
        peak_sharpness: f64,
    ) -> CombinedConfidence {
        let c = &self.config;
        let weakest_score = a.score.min(b.score);
        let total = c.confidence_weakest_weight
            + c.confidence_correlation_weight
            + c.confidence_sharpness_weight;
        let blend = c.confidence_weakest_weight * weakest_score / 100.0
            + c.confidence_correlation_weight * correlation.clamp(0.0, 1.0)
            + c.confidence_sharpness_weight * peak_sharpness.clamp(0.0, 1.0);
        let confidence = if total > 0.0 {
            (blend / total).clamp(0.0, 1.0)
        } else {
            0.0
        };
        CombinedConfidence {
            weakest_score,
            correlation,
            peak_sharpness,
            confidence,
            reportable: confidence >= c.reportable_threshold,
        }
    }

    pub fn reportable_threshold(&self) -> f64 {
        self.config.reportable_threshold
    }
}
