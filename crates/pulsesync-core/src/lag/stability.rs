//! Sliding-window lag stability
//!
//! The lag is re-estimated on overlapping windows across the session.
//! Windows that are mostly masked as artifacts are skipped and windows
//! whose correlation does not clear the floor are discarded. The spread
//! of the surviving lags tells whether the headline lag is stable.

use serde::{Deserialize, Serialize};

use crate::config::LagConfig;
use crate::lag::xcorr::LagEstimator;
use crate::stats;
use crate::sync::drift::ArtifactMask;

/// Windows with more than this fraction of masked samples are skipped
const MAX_WINDOW_MASKED: f64 = 0.5;

/// Lag measured on one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowLag {
    /// Window start relative to the series start (seconds)
    pub start_s: f64,
    pub lag_ms: f64,
    pub correlation: f64,
}

/// Spread of per-window lags
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StabilityReport {
    /// Window length actually used (seconds)
    pub window_s: f64,
    /// Distance between window starts (seconds)
    pub step_s: f64,
    /// Windows that passed the correlation floor
    pub windows: Vec<WindowLag>,
    /// Windows skipped because of the artifact mask
    pub masked_windows: usize,
    /// Windows discarded for low correlation or degenerate content
    pub rejected_windows: usize,
    pub mean_lag_ms: f64,
    pub std_lag_ms: f64,
    /// At least one window survived and `std_lag_ms` is below the limit
    pub is_stable: bool,
    pub message: Option<String>,
}

impl StabilityReport {
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }
}

/// Run the sliding-window analysis
///
/// # Arguments
/// * `estimator` - Estimator configured for the series sample rate
/// * `a`, `b` - Conditioned channels of equal length
/// * `mask` - Optional artifact mask over the same grid
///
/// The window length is clamped to 8..=20 s and the step is
/// `window * (1 - overlap)`.
pub fn analyze_stability(
    estimator: &mut LagEstimator,
    a: &[f64],
    b: &[f64],
    mask: Option<&ArtifactMask>,
) -> StabilityReport {
    let config: LagConfig = estimator.config().clone();
    let fs = estimator.sample_rate();
    let window_s = config.effective_window_s();
    let step_s = window_s * (1.0 - config.overlap);
    let mut report = StabilityReport {
        window_s,
        step_s,
        ..Default::default()
    };

    let n = a.len().min(b.len());
    let window = (window_s * fs).round() as usize;
    let step = ((step_s * fs).round() as usize).max(1);
    if fs <= 0.0 || window == 0 || n < window {
        report.message = Some(format!(
            "series of {:.1} s is shorter than the {:.0} s stability window",
            if fs > 0.0 { n as f64 / fs } else { 0.0 },
            window_s
        ));
        return report;
    }

    let mut start = 0;
    while start + window <= n {
        let end = start + window;
        if mask.is_some_and(|m| m.bad_fraction(start, end) > MAX_WINDOW_MASKED) {
            report.masked_windows += 1;
            tracing::trace!(start, end, "stability_window_masked");
        } else {
            let est = estimator.estimate(&a[start..end], &b[start..end]);
            if est.is_valid && est.correlation > config.window_min_correlation {
                tracing::trace!(
                    start,
                    lag_ms = %format!("{:.2}", est.lag_ms),
                    correlation = %format!("{:.3}", est.correlation),
                    "stability_window"
                );
                report.windows.push(WindowLag {
                    start_s: start as f64 / fs,
                    lag_ms: est.lag_ms,
                    correlation: est.correlation,
                });
            } else {
                report.rejected_windows += 1;
            }
        }
        start += step;
    }

    let lags: Vec<f64> = report.windows.iter().map(|w| w.lag_ms).collect();
    if lags.is_empty() {
        report.message = Some("no window cleared the correlation floor".to_string());
        return report;
    }
    report.mean_lag_ms = stats::mean(&lags);
    report.std_lag_ms = stats::std_dev(&lags);
    report.is_stable = report.std_lag_ms < config.stable_std_ms;
    if !report.is_stable {
        report.message = Some(format!(
            "lag spread {:.1} ms exceeds {:.1} ms",
            report.std_lag_ms, config.stable_std_ms
        ));
    }
    tracing::debug!(
        windows = lags.len(),
        mean_ms = %format!("{:.2}", report.mean_lag_ms),
        std_ms = %format!("{:.2}", report.std_lag_ms),
        stable = report.is_stable,
        "lag_stability"
    );
    report
}
