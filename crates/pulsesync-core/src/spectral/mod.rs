//! Spectral/harmonic analysis
//!
//! - Power-of-two FFT with Hann windowing and zero-padding ([`fft`])
//! - Fundamental, harmonics, spectral entropy and in-band SNR ([`harmonic`])

pub mod fft;
pub mod harmonic;

pub use fft::{SpectralError, Spectrum};
pub use harmonic::{HarmonicAnalyzer, HarmonicFeatures};
