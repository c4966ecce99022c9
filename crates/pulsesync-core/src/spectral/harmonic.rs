//! Fundamental and harmonic analysis of a conditioned channel
//!
//! The fundamental is the strongest bin inside the physiological band.
//! The 2nd and 3rd harmonics are the strongest bins within a few bins of
//! `2·f0` and `3·f0`. Spectral entropy and in-band SNR are measured over
//! the cardiac sub-band.

use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

use crate::config::SpectralConfig;
use crate::spectral::fft::Spectrum;
use crate::stats;
use crate::types::{InputIssue, DEGENERATE_EPSILON};

/// SNR reported when no noise power is left in the band
pub const MAX_SNR_DB: f64 = 100.0;

/// Shortest signal that is worth a transform
const MIN_SAMPLES: usize = 16;

/// Spectral description of one channel window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarmonicFeatures {
    /// Fundamental frequency in Hz
    pub fundamental_hz: f64,
    /// Magnitude of the fundamental bin
    pub fundamental_amplitude: f64,
    pub harmonic2_amplitude: f64,
    pub harmonic3_amplitude: f64,
    /// 2nd harmonic amplitude over fundamental amplitude
    pub harmonic2_ratio: f64,
    /// 3rd harmonic amplitude over fundamental amplitude
    pub harmonic3_ratio: f64,
    /// Shannon entropy of the cardiac band, normalized to 0..1
    pub spectral_entropy: f64,
    /// Harmonic windows against the rest of the cardiac band, in dB
    pub snr_db: f64,
    /// `60 * fundamental_hz`
    pub heart_rate_bpm: f64,
    pub is_valid: bool,
    pub message: Option<String>,
}

impl HarmonicFeatures {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Spectral/harmonic analyzer with a reusable FFT planner
pub struct HarmonicAnalyzer {
    config: SpectralConfig,
    planner: FftPlanner<f64>,
}

impl std::fmt::Debug for HarmonicAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HarmonicAnalyzer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HarmonicAnalyzer {
    pub fn new(config: &SpectralConfig) -> Self {
        Self {
            config: config.clone(),
            planner: FftPlanner::new(),
        }
    }

    /// Analyze `signal` sampled at `sample_rate` Hz
    ///
    /// Short, constant or band-less inputs yield `is_valid = false` with a
    /// diagnostic message.
    ///
    /// # Example
    /// ```
    /// use pulsesync_core::config::SpectralConfig;
    /// use pulsesync_core::spectral::HarmonicAnalyzer;
    ///
    /// let fs = 100.0;
    /// let pulse: Vec<f64> = (0..3000)
    ///     .map(|i| (2.0 * std::f64::consts::PI * 1.25 * i as f64 / fs).sin())
    ///     .collect();
    /// let features = HarmonicAnalyzer::new(&SpectralConfig::default()).analyze(&pulse, fs);
    /// assert!(features.is_valid);
    /// assert!((features.heart_rate_bpm - 75.0).abs() < 2.0);
    /// ```
    pub fn analyze(&mut self, signal: &[f64], sample_rate: f64) -> HarmonicFeatures {
        if sample_rate <= 0.0 {
            return HarmonicFeatures::invalid(InputIssue::InvalidSampleRate(sample_rate).to_string());
        }
        if signal.len() < MIN_SAMPLES {
            return HarmonicFeatures::invalid(
                InputIssue::TooShort {
                    len: signal.len(),
                    min: MIN_SAMPLES,
                }
                .to_string(),
            );
        }
        if stats::variance(signal) < DEGENERATE_EPSILON {
            return HarmonicFeatures::invalid(InputIssue::Degenerate.to_string());
        }

        let mean = stats::mean(signal);
        let centered: Vec<f64> = signal.iter().map(|x| x - mean).collect();
        let spectrum = match Spectrum::of_real(&mut self.planner, &centered, sample_rate) {
            Ok(s) => s,
            Err(e) => return HarmonicFeatures::invalid(e.to_string()),
        };

        let features = self.features_from_spectrum(&spectrum);
        tracing::debug!(
            f0_hz = %format!("{:.3}", features.fundamental_hz),
            entropy = %format!("{:.3}", features.spectral_entropy),
            snr_db = %format!("{:.1}", features.snr_db),
            "harmonics_analyzed"
        );
        features
    }

    fn features_from_spectrum(&self, spectrum: &Spectrum) -> HarmonicFeatures {
        let mags = &spectrum.magnitudes;
        let (f_lo, f_hi) = spectrum.bin_range(
            self.config.fundamental_band_hz.0,
            self.config.fundamental_band_hz.1,
        );
        let Some(f0_bin) = spectrum.peak_bin(f_lo, f_hi) else {
            return HarmonicFeatures::invalid("fundamental band has no frequency bins");
        };
        let fundamental_amplitude = mags[f0_bin];
        if fundamental_amplitude < DEGENERATE_EPSILON {
            return HarmonicFeatures::invalid("no energy in fundamental band");
        }

        let h2_bin = self.harmonic_bin(spectrum, f0_bin, 2);
        let h3_bin = self.harmonic_bin(spectrum, f0_bin, 3);
        let amplitude = |bin: Option<usize>| bin.map(|k| mags[k]).unwrap_or(0.0);
        let harmonic2_amplitude = amplitude(h2_bin);
        let harmonic3_amplitude = amplitude(h3_bin);

        let (b_lo, b_hi) =
            spectrum.bin_range(self.config.entropy_band_hz.0, self.config.entropy_band_hz.1);
        let band = &mags[b_lo..b_hi];
        let spectral_entropy = normalized_entropy(band);

        let peaks: Vec<usize> = [Some(f0_bin), h2_bin, h3_bin].into_iter().flatten().collect();
        let snr_db = band_snr_db(mags, (b_lo, b_hi), &peaks, self.config.snr_window_bins);

        let fundamental_hz = spectrum.frequency(f0_bin);
        HarmonicFeatures {
            fundamental_hz,
            fundamental_amplitude,
            harmonic2_amplitude,
            harmonic3_amplitude,
            harmonic2_ratio: harmonic2_amplitude / fundamental_amplitude,
            harmonic3_ratio: harmonic3_amplitude / fundamental_amplitude,
            spectral_entropy,
            snr_db,
            heart_rate_bpm: 60.0 * fundamental_hz,
            is_valid: true,
            message: None,
        }
    }

    /// Strongest bin within `harmonic_search_bins` of `k * f0_bin`
    fn harmonic_bin(&self, spectrum: &Spectrum, f0_bin: usize, k: usize) -> Option<usize> {
        let target = f0_bin * k;
        let len = spectrum.magnitudes.len();
        if target >= len {
            return None;
        }
        let reach = self.config.harmonic_search_bins;
        let lo = target.saturating_sub(reach).max(f0_bin + 1);
        let hi = (target + reach + 1).min(len);
        spectrum.peak_bin(lo, hi)
    }
}

/// Shannon entropy of the normalized magnitudes, divided by `log2(len)`
pub fn normalized_entropy(magnitudes: &[f64]) -> f64 {
    let total: f64 = magnitudes.iter().sum();
    if magnitudes.len() < 2 || total < DEGENERATE_EPSILON {
        return 0.0;
    }
    let h: f64 = magnitudes
        .iter()
        .map(|m| m / total)
        .filter(|&p| p > 0.0)
        .map(|p| -p * p.log2())
        .sum();
    (h / (magnitudes.len() as f64).log2()).clamp(0.0, 1.0)
}

/// Power within `±half_width` bins of `peaks` over the rest of `band`, in dB
pub fn band_snr_db(
    magnitudes: &[f64],
    band: (usize, usize),
    peaks: &[usize],
    half_width: usize,
) -> f64 {
    let (lo, hi) = band;
    let mut signal = 0.0;
    let mut noise = 0.0;
    for k in lo..hi.min(magnitudes.len()) {
        let power = magnitudes[k] * magnitudes[k];
        if peaks.iter().any(|&p| k.abs_diff(p) <= half_width) {
            signal += power;
        } else {
            noise += power;
        }
    }
    if signal < DEGENERATE_EPSILON {
        return 0.0;
    }
    if noise < DEGENERATE_EPSILON {
        return MAX_SNR_DB;
    }
    (10.0 * (signal / noise).log10()).min(MAX_SNR_DB)
}
