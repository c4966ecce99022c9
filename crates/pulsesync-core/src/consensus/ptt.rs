//! Multi-method PTT consensus
//!
//! Two independent estimates of how far channel B trails channel A:
//! the correlation peak and the median foot-to-foot delay of paired
//! beats. The reported lag is the median over the contributing methods.
//! A spread above the disagreement threshold is not averaged away; it
//! lowers the confidence and is flagged on the result.

use serde::{Deserialize, Serialize};

use crate::config::ConsensusConfig;
use crate::consensus::foot::{detect_feet, pair_feet};
use crate::lag::stability::StabilityReport;
use crate::lag::xcorr::LagEstimate;
use crate::stats;
use crate::sync::drift::ArtifactMask;

/// Fewest evaluated windows that can show the lag wandering
const MIN_STABILITY_WINDOWS: usize = 2;

/// Independent lag estimation method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LagMethod {
    Correlation,
    FootToFoot,
}

/// One method's contribution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MethodLag {
    pub method: LagMethod,
    pub lag_ms: f64,
}

/// Foot-to-foot lag over paired beats
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FootToFootEstimate {
    /// Median B-minus-A foot delay
    pub lag_ms: f64,
    /// Median absolute deviation of the per-beat delays
    pub beat_jitter_ms: f64,
    /// Beats paired across channels
    pub pair_count: usize,
    pub feet_a: usize,
    pub feet_b: usize,
    /// At least `min_beats` pairs were found
    pub is_valid: bool,
    pub message: Option<String>,
}

/// Headline timing result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PttResult {
    /// Median lag across contributing methods (ms)
    pub lag_ms: f64,
    /// Spread between contributing methods (ms)
    pub agreement_ms: f64,
    /// Combined confidence after the disagreement penalty (0..1)
    pub confidence: f64,
    /// Confidence clears the threshold and the lag is plausible
    pub reportable: bool,
    /// Paired beats behind the foot-to-foot estimate
    pub beat_count: usize,
    pub methods: Vec<MethodLag>,
    pub methods_disagree: bool,
    /// Sliding-window lags spread beyond the stability limit
    pub lag_unstable: bool,
    /// At least one method contributed
    pub is_valid: bool,
    pub message: Option<String>,
}

impl PttResult {
    /// Result carrying no measurement
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// PTT consensus engine
#[derive(Debug, Clone)]
pub struct ConsensusEngine {
    config: ConsensusConfig,
    plausible_ms: (f64, f64),
    reportable_threshold: f64,
}

impl ConsensusEngine {
    /// # Arguments
    /// * `config` - Foot method, beat minimum and disagreement policy
    /// * `plausible_ms` - Lag range accepted as physiological
    /// * `reportable_threshold` - Confidence needed to report
    pub fn new(config: &ConsensusConfig, plausible_ms: (f64, f64), reportable_threshold: f64) -> Self {
        Self {
            config: config.clone(),
            plausible_ms,
            reportable_threshold,
        }
    }

    /// Median foot delay between two conditioned channels
    pub fn foot_to_foot(
        &self,
        a: &[f64],
        b: &[f64],
        sample_rate: f64,
        mask: Option<&ArtifactMask>,
    ) -> FootToFootEstimate {
        if sample_rate <= 0.0 {
            return FootToFootEstimate {
                message: Some("sample rate must be positive".to_string()),
                ..Default::default()
            };
        }
        let det_a = detect_feet(a, sample_rate, self.config.foot_method);
        let det_b = detect_feet(b, sample_rate, self.config.foot_method);
        let interval = if det_a.median_interval > 0.0 {
            det_a.median_interval
        } else {
            det_b.median_interval
        };
        let delays = pair_feet(&det_a.feet, &det_b.feet, interval / 2.0, mask);

        let to_ms = 1000.0 / sample_rate;
        let mut estimate = FootToFootEstimate {
            pair_count: delays.len(),
            feet_a: det_a.feet.len(),
            feet_b: det_b.feet.len(),
            ..Default::default()
        };
        if delays.len() < self.config.min_beats {
            estimate.message = Some(format!(
                "{} paired beats, need {}",
                delays.len(),
                self.config.min_beats
            ));
            return estimate;
        }
        estimate.lag_ms = stats::median(&delays) * to_ms;
        estimate.beat_jitter_ms = stats::median_abs_deviation(&delays) * to_ms;
        estimate.is_valid = true;
        tracing::debug!(
            lag_ms = %format!("{:.2}", estimate.lag_ms),
            jitter_ms = %format!("{:.2}", estimate.beat_jitter_ms),
            pairs = estimate.pair_count,
            "foot_to_foot_estimated"
        );
        estimate
    }

    /// Merge the method estimates into one result
    ///
    /// # Arguments
    /// * `correlation` - Cross-correlation estimate; contributes when valid
    /// * `foot` - Foot-to-foot estimate; contributes when valid
    /// * `base_confidence` - Combined quality confidence before the
    ///   disagreement penalty
    ///
    /// # Example
    /// ```
    /// use pulsesync_core::config::ConsensusConfig;
    /// use pulsesync_core::consensus::{ConsensusEngine, FootToFootEstimate};
    /// use pulsesync_core::lag::LagEstimate;
    ///
    /// let engine = ConsensusEngine::new(&ConsensusConfig::default(), (30.0, 200.0), 0.6);
    /// let corr = LagEstimate { lag_ms: 98.0, is_valid: true, ..Default::default() };
    /// let foot = FootToFootEstimate { lag_ms: 104.0, pair_count: 30, is_valid: true, ..Default::default() };
    /// let result = engine.combine(&corr, &foot, 0.9);
    /// assert!((result.lag_ms - 101.0).abs() < 1e-9);
    /// assert!((result.agreement_ms - 6.0).abs() < 1e-9);
    /// assert!(result.reportable);
    /// ```
    pub fn combine(
        &self,
        correlation: &LagEstimate,
        foot: &FootToFootEstimate,
        base_confidence: f64,
    ) -> PttResult {
        let mut methods = Vec::with_capacity(2);
        if correlation.is_valid {
            methods.push(MethodLag {
                method: LagMethod::Correlation,
                lag_ms: correlation.lag_ms,
            });
        }
        if foot.is_valid {
            methods.push(MethodLag {
                method: LagMethod::FootToFoot,
                lag_ms: foot.lag_ms,
            });
        }
        if methods.is_empty() {
            let reason = correlation
                .message
                .clone()
                .or_else(|| foot.message.clone())
                .unwrap_or_else(|| "no lag method produced an estimate".to_string());
            tracing::debug!(reason = %reason, "ptt_no_measurement");
            return PttResult::invalid(reason);
        }

        let lags: Vec<f64> = methods.iter().map(|m| m.lag_ms).collect();
        let lag_ms = stats::median(&lags);
        let max = lags.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let min = lags.iter().cloned().fold(f64::INFINITY, f64::min);
        let agreement_ms = max - min;
        let methods_disagree = agreement_ms > self.config.disagreement_ms;

        let mut confidence = base_confidence.clamp(0.0, 1.0);
        if methods_disagree {
            confidence *= self.config.disagreement_penalty;
        }
        let (lo, hi) = self.plausible_ms;
        let plausible = (lo..=hi).contains(&lag_ms);
        let reportable = confidence >= self.reportable_threshold && plausible;

        let message = if methods_disagree {
            Some(format!(
                "methods disagree by {:.1} ms (limit {:.1} ms)",
                agreement_ms, self.config.disagreement_ms
            ))
        } else if !plausible {
            Some(format!("lag {:.1} ms is outside {:.0}..{:.0} ms", lag_ms, lo, hi))
        } else if !reportable {
            Some(format!(
                "confidence {:.2} is below {:.2}",
                confidence, self.reportable_threshold
            ))
        } else {
            None
        };

        tracing::debug!(
            lag_ms = %format!("{:.2}", lag_ms),
            agreement_ms = %format!("{:.2}", agreement_ms),
            confidence = %format!("{:.3}", confidence),
            reportable,
            "ptt_consensus"
        );

        PttResult {
            lag_ms,
            agreement_ms,
            confidence,
            reportable,
            beat_count: if foot.is_valid { foot.pair_count } else { 0 },
            methods,
            methods_disagree,
            lag_unstable: false,
            is_valid: true,
            message,
        }
    }

    /// Penalize a result whose sliding-window lags wander
    ///
    /// An unstable report with at least two evaluated windows multiplies the
    /// confidence by the disagreement penalty and re-checks reportability.
    /// Sessions too short for two windows are left alone.
    pub fn apply_stability(&self, result: &mut PttResult, stability: &StabilityReport) {
        if !result.is_valid
            || stability.is_stable
            || stability.window_count() < MIN_STABILITY_WINDOWS
        {
            return;
        }
        result.lag_unstable = true;
        result.confidence *= self.config.disagreement_penalty;
        if result.confidence < self.reportable_threshold {
            result.reportable = false;
        }
        let note = format!(
            "window lags spread {:.1} ms over {} windows",
            stability.std_lag_ms,
            stability.window_count()
        );
        result.message = Some(match result.message.take() {
            Some(earlier) => format!("{}; {}", earlier, note),
            None => note,
        });
        tracing::debug!(
            std_ms = %format!("{:.2}", stability.std_lag_ms),
            confidence = %format!("{:.3}", result.confidence),
            reportable = result.reportable,
            "ptt_lag_unstable"
        );
    }
}
