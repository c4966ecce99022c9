//! Per-channel conditioning: detrend, band-pass, optional wavelet
//! denoising and z-score normalization, in that order.

use crate::config::DspConfig;
use crate::dsp::biquad::BandPassFilter;
use crate::dsp::normalize::zscore;
use crate::dsp::wavelet;
use crate::stats;
use crate::types::DEGENERATE_EPSILON;

/// SNR reported when the residual carries no power
pub const MAX_SNR_DB: f64 = 100.0;

/// Output of [`ConditioningChain::process`]
#[derive(Debug, Clone, Default)]
pub struct ConditionedChannel {
    /// Z-score normalized, band-limited signal
    pub values: Vec<f64>,
    /// Detrended input minus filtered output, before normalization
    pub residual: Vec<f64>,
    /// Variance of the filtered signal before normalization
    pub signal_power: f64,
    /// Mean square of the residual
    pub residual_power: f64,
    /// The filtered signal was constant, `values` are all zero
    pub is_degenerate: bool,
}

impl ConditionedChannel {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// In-band power over residual power in dB, capped at [`MAX_SNR_DB`]
    ///
    /// Returns 0 dB for a degenerate channel.
    pub fn snr_db(&self) -> f64 {
        if self.is_degenerate || self.signal_power < DEGENERATE_EPSILON {
            return 0.0;
        }
        if self.residual_power < DEGENERATE_EPSILON {
            return MAX_SNR_DB;
        }
        (10.0 * (self.signal_power / self.residual_power).log10()).min(MAX_SNR_DB)
    }
}

/// Conditioning chain configured for one sample rate
#[derive(Debug, Clone)]
pub struct ConditioningChain {
    config: DspConfig,
    sample_rate: f64,
    bandpass: BandPassFilter,
}

impl ConditioningChain {
    /// Build the chain for signals sampled at `sample_rate` Hz
    pub fn new(config: &DspConfig, sample_rate: f64) -> Self {
        let bandpass = BandPassFilter::butterworth(
            sample_rate,
            config.low_cut_hz,
            config.high_cut_hz,
            config.filter_order,
        );
        Self {
            config: config.clone(),
            sample_rate,
            bandpass,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Condition one channel
    ///
    /// # Example
    /// ```
    /// use pulsesync_core::config::DspConfig;
    /// use pulsesync_core::dsp::chain::ConditioningChain;
    ///
    /// let chain = ConditioningChain::new(&DspConfig::default(), 100.0);
    /// let raw: Vec<f64> = (0..1000)
    ///     .map(|i| 120.0 + (2.0 * std::f64::consts::PI * 1.2 * i as f64 / 100.0).sin())
    ///     .collect();
    /// let out = chain.process(&raw);
    /// assert_eq!(out.len(), raw.len());
    /// assert!(!out.is_degenerate);
    /// ```
    pub fn process(&self, raw: &[f64]) -> ConditionedChannel {
        if raw.is_empty() {
            return ConditionedChannel {
                is_degenerate: true,
                ..Default::default()
            };
        }

        let detrended = self.config.detrend.apply(raw, self.sample_rate);
        let mut filtered = if self.config.zero_phase {
            self.bandpass.apply_zero_phase(&detrended)
        } else {
            self.bandpass.apply(&detrended)
        };
        if self.config.wavelet.enabled {
            filtered = wavelet::denoise(
                &filtered,
                self.config.wavelet.levels,
                self.config.wavelet.mode,
            );
        }

        let residual: Vec<f64> = detrended
            .iter()
            .zip(&filtered)
            .map(|(d, f)| d - f)
            .collect();
        let signal_power = stats::variance(&filtered);
        let residual_power =
            residual.iter().map(|r| r * r).sum::<f64>() / residual.len() as f64;
        let is_degenerate = signal_power.sqrt() < DEGENERATE_EPSILON;

        tracing::trace!(
            samples = raw.len(),
            signal_power = %format!("{:.6}", signal_power),
            residual_power = %format!("{:.6}", residual_power),
            "channel_conditioned"
        );

        ConditionedChannel {
            values: zscore(&filtered),
            residual,
            signal_power,
            residual_power,
            is_degenerate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WaveletConfig;
    use std::f64::consts::PI;

    fn pulse(n: usize, fs: f64) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let t = i as f64 / fs;
                200.0 + 0.05 * t + (2.0 * PI * 1.2 * t).sin() + 0.3 * (2.0 * PI * 2.4 * t).sin()
            })
            .collect()
    }

    #[test]
    fn test_output_is_normalized() {
        let chain = ConditioningChain::new(&DspConfig::default(), 100.0);
        let out = chain.process(&pulse(3000, 100.0));
        assert!(stats::mean(&out.values).abs() < 1e-9);
        assert!((stats::std_dev(&out.values) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_clean_signal_has_high_snr() {
        let chain = ConditioningChain::new(&DspConfig::default(), 100.0);
        let out = chain.process(&pulse(3000, 100.0));
        assert!(out.snr_db() > 15.0, "snr {}", out.snr_db());
    }

    #[test]
    fn test_noise_lowers_snr() {
        let fs = 100.0;
        let chain = ConditioningChain::new(&DspConfig::default(), fs);
        let clean = pulse(3000, fs);
        // Out-of-band 20 Hz interference
        let noisy: Vec<f64> = clean
            .iter()
            .enumerate()
            .map(|(i, v)| v + 1.5 * (2.0 * PI * 20.0 * i as f64 / fs).sin())
            .collect();
        assert!(chain.process(&noisy).snr_db() < chain.process(&clean).snr_db());
    }

    #[test]
    fn test_constant_input_is_degenerate() {
        let chain = ConditioningChain::new(&DspConfig::default(), 100.0);
        let out = chain.process(&[512.0; 800]);
        assert!(out.is_degenerate);
        assert!(out.values.iter().all(|&v| v == 0.0));
        assert_eq!(out.snr_db(), 0.0);
    }

    #[test]
    fn test_empty_input() {
        let chain = ConditioningChain::new(&DspConfig::default(), 100.0);
        let out = chain.process(&[]);
        assert!(out.is_empty());
        assert!(out.is_degenerate);
    }

    #[test]
    fn test_wavelet_stage_runs() {
        let config = DspConfig {
            wavelet: WaveletConfig {
                enabled: true,
                ..WaveletConfig::default()
            },
            ..DspConfig::default()
        };
        let chain = ConditioningChain::new(&config, 100.0);
        let out = chain.process(&pulse(1500, 100.0));
        assert_eq!(out.len(), 1500);
        assert!(!out.is_degenerate);
    }
}
