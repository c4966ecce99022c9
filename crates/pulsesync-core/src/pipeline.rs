//! End-to-end PTT pipeline
//!
//! Runs one analysis window through every stage in order:
//!
//! 1. Sanitize both raw channels and measure their clocks (drift, jitter,
//!    frame drops)
//! 2. Resample the overlap onto a unified grid
//! 3. Align auxiliary metrics and build the artifact mask
//! 4. Condition each channel and extract harmonic features
//! 5. Estimate the lag by cross-correlation on the longest unmasked run,
//!    plus sliding-window stability
//! 6. Score each channel and blend the combined confidence
//! 7. Foot-to-foot estimate and multi-method consensus
//! 8. Gate reportability on drift, masked share and lag stability
//!
//! Degenerate input never panics; the report carries an invalid
//! [`PttResult`] with the reason instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, PipelineConfig};
use crate::consensus::ptt::{ConsensusEngine, FootToFootEstimate, PttResult};
use crate::dsp::chain::ConditioningChain;
use crate::lag::stability::{analyze_stability, StabilityReport};
use crate::lag::xcorr::{LagEstimate, LagEstimator};
use crate::quality::sqi::{AuxiliaryLevels, ChannelQuality, CombinedConfidence, QualityEngine};
use crate::spectral::harmonic::{HarmonicAnalyzer, HarmonicFeatures};
use crate::stream::ring::SampleRing;
use crate::sync::auxiliary::AuxiliaryMetrics;
use crate::sync::drift::{analyze_drift, build_artifact_mask, ArtifactMask, DriftReport};
use crate::sync::timeline::{sanitize, TimestampSynchronizer, UnifiedSeries};
use crate::types::TimestampedSample;

/// Raw input for one analysis window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionInput {
    pub channel_a: Vec<TimestampedSample>,
    pub channel_b: Vec<TimestampedSample>,
    pub auxiliary_a: AuxiliaryMetrics,
    pub auxiliary_b: AuxiliaryMetrics,
}

impl SessionInput {
    /// Input with no auxiliary metrics
    pub fn new(channel_a: Vec<TimestampedSample>, channel_b: Vec<TimestampedSample>) -> Self {
        Self {
            channel_a,
            channel_b,
            ..Default::default()
        }
    }

    pub fn with_auxiliary(mut self, auxiliary_a: AuxiliaryMetrics, auxiliary_b: AuxiliaryMetrics) -> Self {
        self.auxiliary_a = auxiliary_a;
        self.auxiliary_b = auxiliary_b;
        self
    }
}

/// Everything the pipeline learned about one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub generated_at: DateTime<Utc>,
    pub series: UnifiedSeries,
    pub drift: DriftReport,
    pub artifact_mask: ArtifactMask,
    pub harmonics_a: HarmonicFeatures,
    pub harmonics_b: HarmonicFeatures,
    pub quality_a: ChannelQuality,
    pub quality_b: ChannelQuality,
    pub combined: CombinedConfidence,
    pub lag: LagEstimate,
    /// Unified-sample range `[start, end)` the headline correlation ran on
    pub lag_window: (usize, usize),
    pub stability: StabilityReport,
    pub foot_to_foot: FootToFootEstimate,
    pub ptt: PttResult,
}

impl PipelineReport {
    fn invalid(series: UnifiedSeries, drift: DriftReport) -> Self {
        let reason = series
            .message
            .clone()
            .unwrap_or_else(|| "unified series is invalid".to_string());
        Self {
            generated_at: Utc::now(),
            series,
            drift,
            artifact_mask: ArtifactMask::default(),
            harmonics_a: HarmonicFeatures::default(),
            harmonics_b: HarmonicFeatures::default(),
            quality_a: ChannelQuality::default(),
            quality_b: ChannelQuality::default(),
            combined: CombinedConfidence::default(),
            lag: LagEstimate::default(),
            lag_window: (0, 0),
            stability: StabilityReport::default(),
            foot_to_foot: FootToFootEstimate::default(),
            ptt: PttResult::invalid(reason),
        }
    }

    /// The window produced a PTT measurement, reportable or not
    pub fn is_valid(&self) -> bool {
        self.series.is_valid && self.ptt.is_valid
    }
}

/// Stateful pipeline; FFT planners are reused across windows
#[derive(Debug)]
pub struct PttPipeline {
    config: PipelineConfig,
    synchronizer: TimestampSynchronizer,
    chain: ConditioningChain,
    harmonics: HarmonicAnalyzer,
    lag: LagEstimator,
    quality: QualityEngine,
    consensus: ConsensusEngine,
}

impl Default for PttPipeline {
    fn default() -> Self {
        Self::build(PipelineConfig::default())
    }
}

impl PttPipeline {
    /// Validate `config` and build every stage
    ///
    /// # Example
    /// ```
    /// use pulsesync_core::config::PipelineConfig;
    /// use pulsesync_core::pipeline::{PttPipeline, SessionInput};
    ///
    /// let mut pipeline = PttPipeline::new(PipelineConfig::default()).unwrap();
    /// let report = pipeline.process(&SessionInput::default());
    /// assert!(!report.ptt.is_valid);
    /// assert!(!report.ptt.reportable);
    /// ```
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: PipelineConfig) -> Self {
        let rate = config.sync.target_rate_hz;
        Self {
            synchronizer: TimestampSynchronizer::new(rate),
            chain: ConditioningChain::new(&config.dsp, rate),
            harmonics: HarmonicAnalyzer::new(&config.spectral),
            lag: LagEstimator::new(&config.lag, rate),
            quality: QualityEngine::new(&config.quality),
            consensus: ConsensusEngine::new(
                &config.consensus,
                config.lag.plausible_ms,
                config.quality.reportable_threshold,
            ),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Analyze one window of raw samples
    pub fn process(&mut self, input: &SessionInput) -> PipelineReport {
        let a = sanitize(&input.channel_a);
        let b = sanitize(&input.channel_b);

        let mut drift = analyze_drift(&a.samples, &b.samples, &self.config.sync);
        drift.channel_a.reordered = a.reordered;
        drift.channel_a.duplicates = a.duplicates;
        drift.channel_b.reordered = b.reordered;
        drift.channel_b.duplicates = b.duplicates;

        let series = self.synchronizer.resample_sorted(&a.samples, &b.samples);
        if !series.is_valid || series.len() < 2 {
            tracing::debug!(message = ?series.message, "pipeline_input_invalid");
            return PipelineReport::invalid(series, drift);
        }
        let fs = series.sample_rate_hz;

        let aux_a = input.auxiliary_a.align(&series.timestamps_ns);
        let aux_b = input.auxiliary_b.align(&series.timestamps_ns);
        let motion = worst_of(aux_a.motion_px.as_deref(), aux_b.motion_px.as_deref());
        let artifact_mask = build_artifact_mask(
            &series.timestamps_ns,
            &drift,
            motion.as_deref(),
            &self.config.sync,
        );

        let cond_a = self.chain.process(&series.values_a);
        let cond_b = self.chain.process(&series.values_b);
        let harmonics_a = self.harmonics.analyze(&cond_a.values, fs);
        let harmonics_b = self.harmonics.analyze(&cond_b.values, fs);

        let n = cond_a.values.len().min(cond_b.values.len());
        let lag_window = if artifact_mask.bad_windows.is_empty() {
            (0, n)
        } else {
            let (start, end) = artifact_mask.longest_clean_run();
            (start.min(n), end.min(n))
        };
        let (lo, hi) = lag_window;
        let lag = self.lag.estimate(&cond_a.values[lo..hi], &cond_b.values[lo..hi]);
        let stability = analyze_stability(
            &mut self.lag,
            &cond_a.values,
            &cond_b.values,
            Some(&artifact_mask),
        );

        let quality_a = self
            .quality
            .assess(&cond_a, fs, &AuxiliaryLevels::from_aligned(&aux_a));
        let quality_b = self
            .quality
            .assess(&cond_b, fs, &AuxiliaryLevels::from_aligned(&aux_b));
        let combined = self
            .quality
            .combine(&quality_a, &quality_b, lag.correlation, lag.peak_sharpness);

        let foot_to_foot =
            self.consensus
                .foot_to_foot(&cond_a.values, &cond_b.values, fs, Some(&artifact_mask));
        let mut ptt = self.consensus.combine(&lag, &foot_to_foot, combined.confidence);
        self.consensus.apply_stability(&mut ptt, &stability);
        let masked = artifact_mask.total_bad_fraction();
        if masked > self.config.sync.max_masked_fraction {
            ptt.reportable = false;
            ptt.message = Some(format!(
                "{:.0}% of the timeline is masked as artifacts (limit {:.0}%)",
                masked * 100.0,
                self.config.sync.max_masked_fraction * 100.0
            ));
        } else if ptt.reportable && !drift.is_acceptable {
            ptt.reportable = false;
            ptt.message = Some(format!(
                "clock drift {:.2} ms/s is too large to trust the lag",
                drift.drift_ms_per_second
            ));
        }

        tracing::info!(
            lag_ms = %format!("{:.2}", ptt.lag_ms),
            confidence = %format!("{:.3}", ptt.confidence),
            reportable = ptt.reportable,
            sqi_a = %format!("{:.1}", quality_a.score),
            sqi_b = %format!("{:.1}", quality_b.score),
            masked = %format!("{:.3}", masked),
            "ptt_window_processed"
        );

        PipelineReport {
            generated_at: Utc::now(),
            series,
            drift,
            artifact_mask,
            harmonics_a,
            harmonics_b,
            quality_a,
            quality_b,
            combined,
            lag,
            lag_window,
            stability,
            foot_to_foot,
            ptt,
        }
    }

    /// Analyze the newest `window_s` seconds held in two capture rings
    pub fn process_rings(
        &mut self,
        ring_a: &SampleRing,
        ring_b: &SampleRing,
        window_s: f64,
    ) -> PipelineReport {
        let window_ns = (window_s.max(0.0) * crate::types::NANOS_PER_SEC) as i64;
        let input = SessionInput::new(
            ring_a.snapshot(window_ns).unwrap_or_default(),
            ring_b.snapshot(window_ns).unwrap_or_default(),
        );
        self.process(&input)
    }
}

/// Elementwise maximum of two optional aligned series
fn worst_of(a: Option<&[f64]>, b: Option<&[f64]>) -> Option<Vec<f64>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.iter().zip(b).map(|(x, y)| x.max(*y)).collect()),
        (Some(one), None) | (None, Some(one)) => Some(one.to_vec()),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::auxiliary::AuxiliarySeries;
    use crate::synth::SyntheticSession;
    use crate::types::NANOS_PER_SEC;
    use std::f64::consts::PI;

    fn sine_channel(delay_s: f64, fps: f64, seconds: f64) -> Vec<TimestampedSample> {
        (0..(seconds * fps) as usize)
            .map(|i| {
                let t = i as f64 / fps;
                let v = 100.0 + (2.0 * PI * 1.2 * (t - delay_s)).sin();
                TimestampedSample::new((t * NANOS_PER_SEC) as i64, v)
            })
            .collect()
    }

    #[test]
    fn test_clean_sine_lag() {
        let input = SessionInput::new(sine_channel(0.0, 100.0, 30.0), sine_channel(0.1, 100.0, 30.0));
        let report = PttPipeline::default().process(&input);
        assert!(report.is_valid(), "{:?}", report.ptt.message);
        assert!((report.ptt.lag_ms - 100.0).abs() < 5.0, "lag {}", report.ptt.lag_ms);
        assert!(report.ptt.reportable, "{:?}", report.ptt.message);
        assert!(report.drift.is_acceptable);
        assert_eq!(report.artifact_mask.total_bad_fraction(), 0.0);
    }

    #[test]
    fn test_empty_input_is_invalid() {
        let report = PttPipeline::default().process(&SessionInput::default());
        assert!(!report.series.is_valid);
        assert!(!report.ptt.is_valid);
        assert!(report.ptt.message.is_some());
    }

    #[test]
    fn test_one_empty_channel() {
        let input = SessionInput::new(sine_channel(0.0, 100.0, 10.0), Vec::new());
        let report = PttPipeline::default().process(&input);
        assert!(!report.is_valid());
        assert!(!report.ptt.reportable);
    }

    #[test]
    fn test_mixed_rate_synthetic_session() {
        let input = SyntheticSession::default().generate();
        let report = PttPipeline::default().process(&input);
        assert!(report.is_valid(), "{:?}", report.ptt.message);
        assert!((report.ptt.lag_ms - 100.0).abs() < 10.0, "lag {}", report.ptt.lag_ms);
    }

    #[test]
    fn test_reordered_samples_are_counted() {
        let mut a = sine_channel(0.0, 100.0, 20.0);
        a.swap(10, 11);
        let dup = a[20];
        a.insert(21, dup);
        let input = SessionInput::new(a, sine_channel(0.1, 100.0, 20.0));
        let report = PttPipeline::default().process(&input);
        assert_eq!(report.drift.channel_a.duplicates, 1);
        assert!(report.drift.channel_a.reordered >= 1);
        assert!(report.is_valid());
    }

    #[test]
    fn test_heavy_motion_masks_everything() {
        let a = sine_channel(0.0, 100.0, 30.0);
        let b = sine_channel(0.1, 100.0, 30.0);
        let motion = AuxiliaryMetrics {
            motion_px: Some(AuxiliarySeries::untimed(vec![50.0; a.len()])),
            ..Default::default()
        };
        let input = SessionInput::new(a, b).with_auxiliary(motion, AuxiliaryMetrics::default());
        let report = PttPipeline::default().process(&input);
        assert!(report.artifact_mask.total_bad_fraction() > 0.9);
        assert_eq!(report.stability.window_count(), 0);
        assert!(report.quality_a.score < report.quality_b.score);
        assert!(!report.ptt.reportable);
        assert!(report.ptt.message.as_deref().unwrap().contains("masked"));
        assert!(report.lag_window.1 - report.lag_window.0 < 300);
    }

    #[test]
    fn test_correlation_skips_masked_stretch() {
        let a = sine_channel(0.0, 100.0, 30.0);
        let b = sine_channel(0.1, 100.0, 30.0);
        // Shaking for the first 10 s only
        let mut motion = vec![0.0; a.len()];
        motion[..1000].iter_mut().for_each(|m| *m = 50.0);
        let aux = AuxiliaryMetrics {
            motion_px: Some(AuxiliarySeries::untimed(motion)),
            ..Default::default()
        };
        let input = SessionInput::new(a, b).with_auxiliary(aux, AuxiliaryMetrics::default());
        let report = PttPipeline::default().process(&input);

        let (start, end) = report.lag_window;
        assert!(start >= 1000, "window {:?}", report.lag_window);
        assert_eq!(end, report.series.len());
        assert!(report.artifact_mask.bad[..start].iter().any(|&b| b));
        assert!(report.artifact_mask.bad[start..end].iter().all(|&b| !b));
        assert!(report.lag.is_valid);
        assert!((report.lag.lag_ms - 100.0).abs() < 5.0, "lag {}", report.lag.lag_ms);
        assert!(report.artifact_mask.total_bad_fraction() < 0.5);
    }

    #[test]
    fn test_wandering_lag_is_not_reportable() {
        // Delay ramps from 40 ms to 160 ms over a minute
        let channel = |ramp: bool| -> Vec<TimestampedSample> {
            (0..6000)
                .map(|i| {
                    let t = i as f64 / 100.0;
                    let delay = if ramp { 0.04 + 0.002 * t } else { 0.0 };
                    let v = 100.0 + (2.0 * PI * 1.2 * (t - delay)).sin();
                    TimestampedSample::new((t * NANOS_PER_SEC) as i64, v)
                })
                .collect()
        };
        let input = SessionInput::new(channel(false), channel(true));
        let report = PttPipeline::default().process(&input);

        assert!(report.stability.window_count() >= 2);
        assert!(!report.stability.is_stable, "std {}", report.stability.std_lag_ms);
        assert!(report.ptt.is_valid);
        assert!(report.ptt.lag_unstable);
        assert!(!report.ptt.reportable);
        assert!(report.ptt.message.is_some());
    }

    #[test]
    fn test_process_rings_uses_window() {
        let ring_a = SampleRing::new(4096);
        let ring_b = SampleRing::new(4096);
        for s in sine_channel(0.0, 100.0, 30.0) {
            ring_a.push(s);
        }
        for s in sine_channel(0.1, 100.0, 30.0) {
            ring_b.push(s);
        }
        let report = PttPipeline::default().process_rings(&ring_a, &ring_b, 20.0);
        assert!(report.is_valid());
        assert!((report.series.duration_s() - 20.0).abs() < 0.05);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = PipelineConfig::default();
        config.dsp.high_cut_hz = 80.0;
        assert!(PttPipeline::new(config).is_err());
    }

    #[test]
    fn test_worst_of() {
        assert_eq!(worst_of(Some(&[1.0, 5.0]), Some(&[3.0, 2.0])), Some(vec![3.0, 5.0]));
        assert_eq!(worst_of(None, Some(&[1.0])), Some(vec![1.0]));
        assert_eq!(worst_of(None, None), None);
    }
}
