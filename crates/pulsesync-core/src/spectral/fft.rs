//! FFT helpers
//!
//! Transforms run through `rustfft` and are restricted to power-of-two
//! lengths. Callers with arbitrary-length real signals go through
//! [`prepare_real`], which Hann-windows and zero-pads them up.

use rustfft::{num_complex::Complex, FftPlanner};
use std::f64::consts::PI;
use thiserror::Error;

/// Precondition violations of the transform layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpectralError {
    #[error("FFT length must be a power of two, got {len}")]
    NotPowerOfTwo { len: usize },
}

/// Forward FFT of a power-of-two buffer in place
///
/// # Errors
/// [`SpectralError::NotPowerOfTwo`] if `buffer.len()` is not a power of two
/// (an empty buffer included).
pub fn forward_in_place(
    planner: &mut FftPlanner<f64>,
    buffer: &mut [Complex<f64>],
) -> Result<(), SpectralError> {
    let len = buffer.len();
    if !len.is_power_of_two() {
        return Err(SpectralError::NotPowerOfTwo { len });
    }
    planner.plan_fft_forward(len).process(buffer);
    Ok(())
}

/// Unnormalized inverse FFT of a power-of-two buffer in place
pub fn inverse_in_place(
    planner: &mut FftPlanner<f64>,
    buffer: &mut [Complex<f64>],
) -> Result<(), SpectralError> {
    let len = buffer.len();
    if !len.is_power_of_two() {
        return Err(SpectralError::NotPowerOfTwo { len });
    }
    planner.plan_fft_inverse(len).process(buffer);
    Ok(())
}

/// Symmetric Hann window of length `n`
pub fn hann_window(n: usize) -> Vec<f64> {
    if n < 2 {
        return vec![1.0; n];
    }
    let denom = (n - 1) as f64;
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / denom).cos())
        .collect()
}

/// Turn a real signal into a power-of-two complex buffer
///
/// Power-of-two inputs are copied as-is. Other lengths are Hann-windowed
/// and zero-padded to the next power of two.
pub fn prepare_real(signal: &[f64]) -> Vec<Complex<f64>> {
    let n = signal.len();
    if n.is_power_of_two() {
        return signal.iter().map(|&x| Complex::new(x, 0.0)).collect();
    }
    let window = hann_window(n);
    signal
        .iter()
        .zip(&window)
        .map(|(&x, &w)| Complex::new(x * w, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(n.next_power_of_two())
        .collect()
}

/// One-sided magnitude spectrum of a real signal
#[derive(Debug, Clone, Default)]
pub struct Spectrum {
    /// `|X[k]|` for `k = 0..=fft_len/2`
    pub magnitudes: Vec<f64>,
    /// Frequency spacing between bins in Hz
    pub bin_hz: f64,
    /// Transform length after padding
    pub fft_len: usize,
}

impl Spectrum {
    /// Compute the spectrum of `signal` sampled at `sample_rate` Hz
    ///
    /// # Example
    /// ```
    /// use pulsesync_core::spectral::fft::Spectrum;
    /// use rustfft::FftPlanner;
    ///
    /// let fs = 64.0;
    /// let tone: Vec<f64> = (0..256)
    ///     .map(|i| (2.0 * std::f64::consts::PI * 4.0 * i as f64 / fs).sin())
    ///     .collect();
    /// let spectrum = Spectrum::of_real(&mut FftPlanner::new(), &tone, fs).unwrap();
    /// assert_eq!(spectrum.peak_bin(0, spectrum.magnitudes.len()), Some(16));
    /// ```
    pub fn of_real(
        planner: &mut FftPlanner<f64>,
        signal: &[f64],
        sample_rate: f64,
    ) -> Result<Self, SpectralError> {
        let mut buffer = prepare_real(signal);
        forward_in_place(planner, &mut buffer)?;
        let fft_len = buffer.len();
        let magnitudes = buffer[..=fft_len / 2].iter().map(|c| c.norm()).collect();
        Ok(Self {
            magnitudes,
            bin_hz: sample_rate / fft_len as f64,
            fft_len,
        })
    }

    /// Frequency of bin `k` in Hz
    pub fn frequency(&self, k: usize) -> f64 {
        k as f64 * self.bin_hz
    }

    /// Half-open bin range `[lo, hi)` covering `low_hz..=high_hz`
    pub fn bin_range(&self, low_hz: f64, high_hz: f64) -> (usize, usize) {
        if self.bin_hz <= 0.0 || self.magnitudes.is_empty() {
            return (0, 0);
        }
        let lo = (low_hz / self.bin_hz).ceil().max(0.0) as usize;
        let hi = ((high_hz / self.bin_hz).floor() as usize + 1).min(self.magnitudes.len());
        (lo.min(hi), hi)
    }

    /// Bin with the largest magnitude in `[lo, hi)`
    pub fn peak_bin(&self, lo: usize, hi: usize) -> Option<usize> {
        let hi = hi.min(self.magnitudes.len());
        (lo..hi).max_by(|&a, &b| {
            self.magnitudes[a]
                .partial_cmp(&self.magnitudes[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_power_of_two() {
        let mut planner = FftPlanner::new();
        let mut buffer = vec![Complex::new(0.0, 0.0); 100];
        assert_eq!(
            forward_in_place(&mut planner, &mut buffer),
            Err(SpectralError::NotPowerOfTwo { len: 100 })
        );
        let mut empty: Vec<Complex<f64>> = Vec::new();
        assert!(forward_in_place(&mut planner, &mut empty).is_err());
    }

    #[test]
    fn test_forward_inverse_identity() {
        let mut planner = FftPlanner::new();
        let original: Vec<Complex<f64>> = (0..64)
            .map(|i| Complex::new((i as f64 * 0.3).sin(), 0.0))
            .collect();
        let mut buffer = original.clone();
        forward_in_place(&mut planner, &mut buffer).unwrap();
        inverse_in_place(&mut planner, &mut buffer).unwrap();
        for (a, b) in original.iter().zip(&buffer) {
            assert!((a.re - b.re / 64.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_prepare_real_pads_and_windows() {
        let buffer = prepare_real(&[1.0; 100]);
        assert_eq!(buffer.len(), 128);
        // Hann endpoints are zero, padding is zero
        assert!(buffer[0].re.abs() < 1e-12);
        assert!(buffer[120].re.abs() < 1e-12);
        assert!(buffer[50].re > 0.9);

        let exact = prepare_real(&[1.0; 64]);
        assert_eq!(exact.len(), 64);
        assert!(exact.iter().all(|c| c.re == 1.0));
    }

    #[test]
    fn test_bin_range() {
        let spectrum = Spectrum {
            magnitudes: vec![0.0; 513],
            bin_hz: 0.125,
            fft_len: 1024,
        };
        assert_eq!(spectrum.bin_range(0.75, 3.0), (6, 25));
        assert_eq!(spectrum.bin_range(0.8, 3.1), (7, 25));
        assert_eq!(spectrum.bin_range(0.0, 1000.0), (0, 513));
    }

    #[test]
    fn test_non_power_of_two_tone_peak() {
        let fs = 100.0;
        let tone: Vec<f64> = (0..3000)
            .map(|i| (2.0 * PI * 1.2 * i as f64 / fs).sin())
            .collect();
        let spectrum = Spectrum::of_real(&mut FftPlanner::new(), &tone, fs).unwrap();
        assert_eq!(spectrum.fft_len, 4096);
        let (lo, hi) = spectrum.bin_range(0.5, 5.0);
        let peak = spectrum.peak_bin(lo, hi).unwrap();
        assert!((spectrum.frequency(peak) - 1.2).abs() < spectrum.bin_hz);
    }
}
