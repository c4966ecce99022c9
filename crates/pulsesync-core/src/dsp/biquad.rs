//! Cascaded Butterworth biquad filtering
//!
//! Each second-order section runs in Direct Form II:
//!
//! ```text
//! w[n] = x[n] - a1*w[n-1] - a2*w[n-2]
//! y[n] = b0*w[n] + b1*w[n-1] + b2*w[n-2]
//! ```
//!
//! Coefficients come from the bilinear transform with cutoff prewarping.
//! An order-N Butterworth response is built from N/2 sections whose Q
//! values follow the Butterworth pole angles.

use std::f64::consts::PI;

/// Normalized biquad coefficients (a0 = 1)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoeffs {
    /// Second-order low-pass section with quality factor `q`
    pub fn lowpass(sample_rate: f64, cutoff_hz: f64, q: f64) -> Self {
        let omega = 2.0 * PI * cutoff_hz / sample_rate;
        let (sin_w, cos_w) = omega.sin_cos();
        let alpha = sin_w / (2.0 * q);
        let a0 = 1.0 + alpha;
        Self {
            b0: (1.0 - cos_w) / 2.0 / a0,
            b1: (1.0 - cos_w) / a0,
            b2: (1.0 - cos_w) / 2.0 / a0,
            a1: -2.0 * cos_w / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    /// Second-order high-pass section with quality factor `q`
    pub fn highpass(sample_rate: f64, cutoff_hz: f64, q: f64) -> Self {
        let omega = 2.0 * PI * cutoff_hz / sample_rate;
        let (sin_w, cos_w) = omega.sin_cos();
        let alpha = sin_w / (2.0 * q);
        let a0 = 1.0 + alpha;
        Self {
            b0: (1.0 + cos_w) / 2.0 / a0,
            b1: -(1.0 + cos_w) / a0,
            b2: (1.0 + cos_w) / 2.0 / a0,
            a1: -2.0 * cos_w / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    /// Gain at DC
    pub fn dc_gain(&self) -> f64 {
        let denom = 1.0 + self.a1 + self.a2;
        if denom.abs() < f64::EPSILON {
            return 0.0;
        }
        (self.b0 + self.b1 + self.b2) / denom
    }
}

/// Q factors of the sections of an order-`order` Butterworth filter
///
/// `Q_k = 1 / (2 cos((2k + 1) pi / (2N)))` for `k = 0..N/2`.
pub fn butterworth_q_factors(order: usize) -> Vec<f64> {
    let n = order.max(2) as f64;
    (0..order.max(2) / 2)
        .map(|k| 1.0 / (2.0 * ((2 * k + 1) as f64 * PI / (2.0 * n)).cos()))
        .collect()
}

/// One Direct-Form-II second-order section with its state
#[derive(Debug, Clone)]
pub struct Biquad {
    coeffs: BiquadCoeffs,
    w1: f64,
    w2: f64,
}

impl Biquad {
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            w1: 0.0,
            w2: 0.0,
        }
    }

    /// Set the delay line to the steady state for a constant input `x0`
    ///
    /// Returns the steady-state output, which the next section in a
    /// cascade is primed with.
    pub fn prime(&mut self, x0: f64) -> f64 {
        let c = &self.coeffs;
        let denom = 1.0 + c.a1 + c.a2;
        let w = if denom.abs() < f64::EPSILON {
            0.0
        } else {
            x0 / denom
        };
        self.w1 = w;
        self.w2 = w;
        (c.b0 + c.b1 + c.b2) * w
    }

    #[inline]
    pub fn process(&mut self, x: f64) -> f64 {
        let c = &self.coeffs;
        let w = x - c.a1 * self.w1 - c.a2 * self.w2;
        let y = c.b0 * w + c.b1 * self.w1 + c.b2 * self.w2;
        self.w2 = self.w1;
        self.w1 = w;
        y
    }

    pub fn reset(&mut self) {
        self.w1 = 0.0;
        self.w2 = 0.0;
    }

    pub fn coeffs(&self) -> &BiquadCoeffs {
        &self.coeffs
    }
}

/// Butterworth band-pass built as a high-pass cascade followed by a
/// low-pass cascade
///
/// # Example
/// ```
/// use pulsesync_core::dsp::biquad::BandPassFilter;
///
/// let filter = BandPassFilter::butterworth(100.0, 0.7, 4.0, 4);
/// assert_eq!(filter.section_count(), 4);
/// let out = filter.apply(&vec![1.0; 500]);
/// // DC is rejected
/// assert!(out[499].abs() < 1e-6);
/// ```
#[derive(Debug, Clone)]
pub struct BandPassFilter {
    sections: Vec<Biquad>,
}

impl BandPassFilter {
    /// Order-`order` high-pass at `low_hz` then order-`order` low-pass at `high_hz`
    pub fn butterworth(sample_rate: f64, low_hz: f64, high_hz: f64, order: usize) -> Self {
        let qs = butterworth_q_factors(order);
        let mut sections = Vec::with_capacity(qs.len() * 2);
        for &q in &qs {
            sections.push(Biquad::new(BiquadCoeffs::highpass(sample_rate, low_hz, q)));
        }
        for &q in &qs {
            sections.push(Biquad::new(BiquadCoeffs::lowpass(sample_rate, high_hz, q)));
        }
        Self { sections }
    }

    /// Total number of second-order sections
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    fn run(sections: &mut [Biquad], signal: &[f64]) -> Vec<f64> {
        let Some(&first) = signal.first() else {
            return Vec::new();
        };
        let mut x0 = first;
        for section in sections.iter_mut() {
            x0 = section.prime(x0);
        }
        signal
            .iter()
            .map(|&x| sections.iter_mut().fold(x, |acc, s| s.process(acc)))
            .collect()
    }

    /// Causal filtering with the delay line primed on the first sample
    pub fn apply(&self, signal: &[f64]) -> Vec<f64> {
        let mut sections = self.sections.clone();
        Self::run(&mut sections, signal)
    }

    /// Forward-backward filtering: squared magnitude response, zero phase
    pub fn apply_zero_phase(&self, signal: &[f64]) -> Vec<f64> {
        let mut forward = self.apply(signal);
        forward.reverse();
        let mut sections = self.sections.clone();
        let mut backward = Self::run(&mut sections, &forward);
        backward.reverse();
        backward
    }
}
