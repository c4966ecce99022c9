//! Pipeline configuration
//!
//! Every tunable threshold of the engine lives here with its default. The
//! weighting constants in [`QualityConfig`] are empirically tuned and meant
//! to be re-validated against reference recordings, not treated as
//! invariants. All sections use `#[serde(default)]` so a partial JSON file
//! only overrides what it names.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consensus::foot::FootMethod;
use crate::dsp::detrend::DetrendMethod;
use crate::dsp::wavelet::ThresholdMode;

/// Errors raised while validating or parsing a configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    #[error("{field} range is empty: {low}..{high}")]
    EmptyRange {
        field: &'static str,
        low: f64,
        high: f64,
    },

    #[error("filter order must be an even number between 2 and 8, got {0}")]
    FilterOrder(usize),

    #[error("band-pass high cutoff {high_hz} Hz must be below Nyquist ({nyquist_hz} Hz)")]
    AboveNyquist { high_hz: f64, nyquist_hz: f64 },

    #[error("{field} must be within 0..=1, got {value}")]
    NotFraction { field: &'static str, value: f64 },

    #[error("wavelet levels must be between 1 and 12, got {0}")]
    WaveletLevels(usize),

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Timestamp synchronizer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Unified timeline rate in Hz
    pub target_rate_hz: f64,
    /// An interval longer than this multiple of the expected interval is a frame drop
    pub drop_factor: f64,
    /// Artifact mask window length in seconds
    pub mask_window_s: f64,
    /// Windows whose artifact density exceeds this fraction are marked bad
    pub max_artifact_density: f64,
    /// Motion magnitude (pixels) above which a grid point counts as an artifact
    pub motion_mask_px: f64,
    /// A result with a larger masked share of the timeline is not reportable
    pub max_masked_fraction: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            target_rate_hz: crate::DEFAULT_TARGET_RATE_HZ,
            drop_factor: 1.5,
            mask_window_s: 2.0,
            max_artifact_density: 0.25,
            motion_mask_px: 8.0,
            max_masked_fraction: 0.5,
        }
    }
}

/// Wavelet denoising settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveletConfig {
    pub enabled: bool,
    pub levels: usize,
    pub mode: ThresholdMode,
}

impl Default for WaveletConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            levels: 4,
            mode: ThresholdMode::Soft,
        }
    }
}

/// Conditioning chain settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DspConfig {
    pub detrend: DetrendMethod,
    /// Band-pass lower cutoff in Hz
    pub low_cut_hz: f64,
    /// Band-pass upper cutoff in Hz
    pub high_cut_hz: f64,
    /// Butterworth order per side (sections = order / 2)
    pub filter_order: usize,
    /// Run the band-pass forward and backward for zero phase shift
    pub zero_phase: bool,
    pub wavelet: WaveletConfig,
}

impl Default for DspConfig {
    fn default() -> Self {
        Self {
            detrend: DetrendMethod::HighPass { cutoff_hz: 0.3 },
            low_cut_hz: 0.7,
            high_cut_hz: 4.0,
            filter_order: 4,
            zero_phase: true,
            wavelet: WaveletConfig::default(),
        }
    }
}

/// Spectral / harmonic analyzer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralConfig {
    /// Physiological range searched for the fundamental (Hz)
    pub fundamental_band_hz: (f64, f64),
    /// Cardiac sub-band used for spectral entropy and SNR (Hz)
    pub entropy_band_hz: (f64, f64),
    /// Harmonics are searched within +/- this many bins of k * f0
    pub harmonic_search_bins: usize,
    /// Half-width in bins of each signal window used for SNR
    pub snr_window_bins: usize,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            fundamental_band_hz: (0.7, 3.0),
            entropy_band_hz: (0.5, 5.0),
            harmonic_search_bins: 2,
            snr_window_bins: 2,
        }
    }
}

/// Lag estimator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LagConfig {
    /// Largest lag searched in either direction (seconds)
    pub max_lag_s: f64,
    /// Correlation above which an estimate is reliable
    pub min_correlation: f64,
    /// Physiologically plausible lag range (ms)
    pub plausible_ms: (f64, f64),
    /// Stability window length (seconds, clamped to 8..=20)
    pub window_s: f64,
    /// Fraction of the window shared by consecutive windows
    pub overlap: f64,
    /// Windows at or below this correlation are discarded
    pub window_min_correlation: f64,
    /// Lag standard deviation below which the estimate is stable (ms)
    pub stable_std_ms: f64,
}

impl LagConfig {
    /// Stability window clamped to the supported 8..=20 s range
    pub fn effective_window_s(&self) -> f64 {
        self.window_s.clamp(8.0, 20.0)
    }
}

impl Default for LagConfig {
    fn default() -> Self {
        Self {
            max_lag_s: 2.0,
            min_correlation: 0.7,
            plausible_ms: (30.0, 200.0),
            window_s: 15.0,
            overlap: 0.5,
            window_min_correlation: 0.3,
            stable_std_ms: 25.0,
        }
    }
}

/// Signal quality engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// SNR at or above which the SNR score is 100 (dB)
    pub snr_full_db: f64,
    /// Score assigned at or below 0 dB
    pub snr_floor_score: f64,
    /// Interval CV at which the regularity score reaches 0
    pub cv_ceiling: f64,
    /// Motion penalty ramps 0..100 across this range (pixels)
    pub motion_range_px: (f64, f64),
    /// Inertial penalty ramps 0..100 across this range (RMS)
    pub inertial_range_rms: (f64, f64),
    /// Saturation penalty ramps 0..100 across this range (fraction)
    pub saturation_range: (f64, f64),
    pub snr_weight: f64,
    pub regularity_weight: f64,
    pub motion_weight: f64,
    pub inertial_weight: f64,
    pub saturation_weight: f64,
    /// Combined confidence weight of the weakest channel score
    pub confidence_weakest_weight: f64,
    /// Combined confidence weight of the correlation peak value
    pub confidence_correlation_weight: f64,
    /// Combined confidence weight of the correlation peak sharpness
    pub confidence_sharpness_weight: f64,
    /// Confidence at or above which a result is reportable
    pub reportable_threshold: f64,
    /// Minimum spacing between streaming quality updates (ms)
    pub emit_interval_ms: u64,
    /// Streaming quality analysis window (seconds)
    pub stream_window_s: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            snr_full_db: 15.0,
            snr_floor_score: 10.0,
            cv_ceiling: 0.4,
            motion_range_px: (0.5, 10.0),
            inertial_range_rms: (0.02, 0.5),
            saturation_range: (0.01, 0.2),
            snr_weight: 0.5,
            regularity_weight: 0.5,
            motion_weight: 0.2,
            inertial_weight: 0.15,
            saturation_weight: 0.1,
            confidence_weakest_weight: 0.5,
            confidence_correlation_weight: 0.3,
            confidence_sharpness_weight: 0.2,
            reportable_threshold: 0.60,
            emit_interval_ms: 400,
            stream_window_s: 10.0,
        }
    }
}

/// Consensus engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub foot_method: FootMethod,
    /// Minimum paired beats for the foot-to-foot method to contribute
    pub min_beats: usize,
    /// Method spread above which the methods are considered in disagreement (ms)
    pub disagreement_ms: f64,
    /// Confidence multiplier applied on disagreement
    pub disagreement_penalty: f64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            foot_method: FootMethod::ThresholdCrossing { fraction: 0.2 },
            min_beats: 3,
            disagreement_ms: 20.0,
            disagreement_penalty: 0.5,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub sync: SyncConfig,
    pub dsp: DspConfig,
    pub spectral: SpectralConfig,
    pub lag: LagConfig,
    pub quality: QualityConfig,
    pub consensus: ConsensusConfig,
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

fn range(field: &'static str, (low, high): (f64, f64)) -> Result<(), ConfigError> {
    if low < high {
        Ok(())
    } else {
        Err(ConfigError::EmptyRange { field, low, high })
    }
}

fn fraction(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::NotFraction { field, value })
    }
}

impl PipelineConfig {
    /// Parse a (possibly partial) JSON document and validate it
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every value the engine divides by or iterates over
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("sync.target_rate_hz", self.sync.target_rate_hz)?;
        positive("sync.drop_factor", self.sync.drop_factor)?;
        positive("sync.mask_window_s", self.sync.mask_window_s)?;
        fraction("sync.max_artifact_density", self.sync.max_artifact_density)?;
        positive("sync.motion_mask_px", self.sync.motion_mask_px)?;
        fraction("sync.max_masked_fraction", self.sync.max_masked_fraction)?;

        let d = &self.dsp;
        positive("dsp.low_cut_hz", d.low_cut_hz)?;
        range("dsp.band", (d.low_cut_hz, d.high_cut_hz))?;
        let nyquist_hz = self.sync.target_rate_hz / 2.0;
        if d.high_cut_hz >= nyquist_hz {
            return Err(ConfigError::AboveNyquist {
                high_hz: d.high_cut_hz,
                nyquist_hz,
            });
        }
        if d.filter_order < 2 || d.filter_order > 8 || d.filter_order % 2 != 0 {
            return Err(ConfigError::FilterOrder(d.filter_order));
        }
        if d.wavelet.levels == 0 || d.wavelet.levels > 12 {
            return Err(ConfigError::WaveletLevels(d.wavelet.levels));
        }
        match d.detrend {
            DetrendMethod::HighPass { cutoff_hz } => positive("dsp.detrend.cutoff_hz", cutoff_hz)?,
            DetrendMethod::MovingAverage { window_s } => {
                positive("dsp.detrend.window_s", window_s)?
            }
        }

        range("spectral.fundamental_band_hz", self.spectral.fundamental_band_hz)?;
        range("spectral.entropy_band_hz", self.spectral.entropy_band_hz)?;

        let l = &self.lag;
        positive("lag.max_lag_s", l.max_lag_s)?;
        range("lag.plausible_ms", l.plausible_ms)?;
        positive("lag.window_s", l.window_s)?;
        if !(0.0..1.0).contains(&l.overlap) {
            return Err(ConfigError::NotFraction {
                field: "lag.overlap",
                value: l.overlap,
            });
        }
        positive("lag.stable_std_ms", l.stable_std_ms)?;

        let q = &self.quality;
        positive("quality.snr_full_db", q.snr_full_db)?;
        positive("quality.cv_ceiling", q.cv_ceiling)?;
        range("quality.motion_range_px", q.motion_range_px)?;
        range("quality.inertial_range_rms", q.inertial_range_rms)?;
        range("quality.saturation_range", q.saturation_range)?;
        fraction("quality.reportable_threshold", q.reportable_threshold)?;
        positive("quality.stream_window_s", q.stream_window_s)?;

        fraction(
            "consensus.disagreement_penalty",
            self.consensus.disagreement_penalty,
        )?;
        positive("consensus.disagreement_ms", self.consensus.disagreement_ms)?;
        if let FootMethod::ThresholdCrossing { fraction: f } = self.consensus.foot_method {
            fraction("consensus.foot_method.fraction", f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sync.target_rate_hz, 100.0);
        assert_eq!(config.dsp.filter_order, 4);
        assert_eq!(config.lag.plausible_ms, (30.0, 200.0));
        assert_eq!(config.quality.reportable_threshold, 0.60);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{"sync": {"target_rate_hz": 50.0}}"#;
        let config = PipelineConfig::from_json_str(json).unwrap();
        assert_eq!(config.sync.target_rate_hz, 50.0);
        assert_eq!(config.sync.drop_factor, 1.5);
        assert_eq!(config.dsp.low_cut_hz, 0.7);
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = PipelineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_odd_filter_order_rejected() {
        let mut config = PipelineConfig::default();
        config.dsp.filter_order = 3;
        assert!(matches!(config.validate(), Err(ConfigError::FilterOrder(3))));
    }

    #[test]
    fn test_cutoff_above_nyquist_rejected() {
        let mut config = PipelineConfig::default();
        config.sync.target_rate_hz = 6.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::AboveNyquist { .. })
        ));
    }

    #[test]
    fn test_invalid_json_reports_error() {
        let result = PipelineConfig::from_json_str("{not json");
        assert!(matches!(result, Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_round_trip_json() {
        let mut config = PipelineConfig::default();
        config.dsp.wavelet.enabled = true;
        config.dsp.wavelet.mode = ThresholdMode::Hard;
        let json = config.to_json_string().unwrap();
        let loaded = PipelineConfig::from_json_str(&json).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_window_clamped() {
        let mut config = PipelineConfig::default();
        config.lag.window_s = 40.0;
        assert_eq!(config.lag.effective_window_s(), 20.0);
        config.lag.window_s = 2.0;
        assert_eq!(config.lag.effective_window_s(), 8.0);
    }

    #[test]
    fn test_zero_motion_mask_rejected() {
        let mut config = PipelineConfig::default();
        config.sync.motion_mask_px = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotPositive {
                field: "sync.motion_mask_px",
                ..
            })
        ));
        config.sync.motion_mask_px = 8.0;
        config.sync.max_masked_fraction = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::NotFraction { .. })));
    }
}
