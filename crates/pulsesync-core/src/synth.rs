//! Deterministic synthetic PPG streams
//!
//! Generates realistic capture sessions without hardware: a pulse-shaped
//! waveform with harmonics, baseline wander and noise, sampled by a clock
//! with its own nominal rate, timing jitter, frame drops and skew. All
//! randomness comes from a seeded LCG so every run is reproducible.

use std::f64::consts::PI;

use crate::pipeline::SessionInput;
use crate::types::{TimestampedSample, NANOS_PER_SEC};

/// Seeded linear congruential noise source
#[derive(Debug, Clone)]
pub struct NoiseSource {
    seed: u32,
}

impl NoiseSource {
    pub fn new(seed: u32) -> Self {
        Self { seed }
    }

    /// Uniform value in `[-1, 1)`
    pub fn next_uniform(&mut self) -> f64 {
        self.seed = self.seed.wrapping_mul(1103515245).wrapping_add(12345);
        let bits = (self.seed >> 16) & 0x7FFF;
        bits as f64 / 16384.0 - 1.0
    }

    /// Approximately standard normal value (Box-Muller)
    pub fn next_gaussian(&mut self) -> f64 {
        let u1 = ((self.next_uniform() + 1.0) / 2.0).max(1e-9);
        let u2 = (self.next_uniform() + 1.0) / 2.0;
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }
}

/// Pulse waveform generator
///
/// # Example
/// ```
/// use pulsesync_core::synth::PulseWaveGenerator;
///
/// let mut gen = PulseWaveGenerator::new(72.0);
/// let a = gen.sample(0.5);
/// let b = gen.sample(0.5);
/// // Noise-free by default: same time, same value
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone)]
pub struct PulseWaveGenerator {
    heart_rate_bpm: f64,
    amplitude: f64,
    baseline: f64,
    /// Relative amplitudes of the 2nd and 3rd harmonics
    harmonics: (f64, f64),
    wander_amplitude: f64,
    wander_hz: f64,
    noise_std: f64,
    noise: NoiseSource,
}

impl PulseWaveGenerator {
    /// Pure sine at `heart_rate_bpm` around a brightness baseline
    pub fn new(heart_rate_bpm: f64) -> Self {
        Self {
            heart_rate_bpm,
            amplitude: 1.0,
            baseline: 120.0,
            harmonics: (0.0, 0.0),
            wander_amplitude: 0.0,
            wander_hz: 0.1,
            noise_std: 0.0,
            noise: NoiseSource::new(0xDEADBEEF),
        }
    }

    /// Add 2nd/3rd harmonics for a skewed, pulse-like shape
    pub fn with_harmonics(mut self, second: f64, third: f64) -> Self {
        self.harmonics = (second, third);
        self
    }

    /// Add slow baseline wander
    pub fn with_wander(mut self, amplitude: f64, freq_hz: f64) -> Self {
        self.wander_amplitude = amplitude;
        self.wander_hz = freq_hz;
        self
    }

    /// Add Gaussian noise of standard deviation `std`
    pub fn with_noise(mut self, std: f64, seed: u32) -> Self {
        self.noise_std = std;
        self.noise = NoiseSource::new(seed);
        self
    }

    /// Noise-free waveform value at `t_s` seconds
    pub fn clean_value(&self, t_s: f64) -> f64 {
        let theta = 2.0 * PI * self.heart_rate_bpm / 60.0 * t_s;
        let (h2, h3) = self.harmonics;
        let pulse = theta.sin() + h2 * (2.0 * theta).sin() + h3 * (3.0 * theta).sin();
        self.baseline
            + self.amplitude * pulse
            + self.wander_amplitude * (2.0 * PI * self.wander_hz * t_s).sin()
    }

    /// Waveform value at `t_s` seconds including noise
    pub fn sample(&mut self, t_s: f64) -> f64 {
        let noise = if self.noise_std > 0.0 {
            self.noise_std * self.noise.next_gaussian()
        } else {
            0.0
        };
        self.clean_value(t_s) + noise
    }
}

/// Capture clock with jitter, drops and skew
#[derive(Debug, Clone)]
pub struct StreamClock {
    nominal_fps: f64,
    jitter_ms: f64,
    drop_probability: f64,
    /// Reported time runs fast by this many parts per million
    skew_ppm: f64,
    start_ns: i64,
    noise: NoiseSource,
}

impl StreamClock {
    /// Perfect clock at `nominal_fps`
    pub fn new(nominal_fps: f64) -> Self {
        Self {
            nominal_fps,
            jitter_ms: 0.0,
            drop_probability: 0.0,
            skew_ppm: 0.0,
            start_ns: 0,
            noise: NoiseSource::new(0x5EED),
        }
    }

    pub fn with_jitter(mut self, jitter_ms: f64, seed: u32) -> Self {
        self.jitter_ms = jitter_ms;
        self.noise = NoiseSource::new(seed);
        self
    }

    pub fn with_drops(mut self, probability: f64) -> Self {
        self.drop_probability = probability.clamp(0.0, 1.0);
        self
    }

    pub fn with_skew_ppm(mut self, skew_ppm: f64) -> Self {
        self.skew_ppm = skew_ppm;
        self
    }

    pub fn with_start_ns(mut self, start_ns: i64) -> Self {
        self.start_ns = start_ns;
        self
    }

    /// `(true capture time in s, reported timestamp in ns)` per kept frame
    pub fn ticks(&mut self, duration_s: f64) -> Vec<(f64, i64)> {
        if self.nominal_fps <= 0.0 || duration_s <= 0.0 {
            return Vec::new();
        }
        let frames = (duration_s * self.nominal_fps).floor() as usize;
        let scale = 1.0 + self.skew_ppm * 1e-6;
        let mut out = Vec::with_capacity(frames);
        for k in 0..frames {
            let t = k as f64 / self.nominal_fps;
            let jitter_s = if self.jitter_ms > 0.0 {
                self.jitter_ms * 1e-3 * self.noise.next_gaussian()
            } else {
                0.0
            };
            if self.drop_probability > 0.0
                && (self.noise.next_uniform() + 1.0) / 2.0 < self.drop_probability
            {
                continue;
            }
            let reported = self.start_ns + ((t * scale + jitter_s) * NANOS_PER_SEC).round() as i64;
            out.push((t, reported));
        }
        out
    }

    /// Sample `generator` on this clock, with the pulse arriving `delay_s` late
    pub fn capture(
        &mut self,
        generator: &mut PulseWaveGenerator,
        duration_s: f64,
        delay_s: f64,
    ) -> Vec<TimestampedSample> {
        self.ticks(duration_s)
            .into_iter()
            .map(|(t, ts)| TimestampedSample::new(ts, generator.sample(t - delay_s)))
            .collect()
    }
}

/// Parameters of a two-site synthetic recording
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticSession {
    pub duration_s: f64,
    /// Transit delay of channel B behind channel A
    pub lag_ms: f64,
    pub heart_rate_bpm: f64,
    /// Gaussian noise std added to both channels
    pub noise_std: f64,
    pub fps_a: f64,
    pub fps_b: f64,
    pub jitter_ms: f64,
    pub drop_probability: f64,
    pub skew_ppm: f64,
    pub seed: u32,
}

impl Default for SyntheticSession {
    fn default() -> Self {
        Self {
            duration_s: 30.0,
            lag_ms: 100.0,
            heart_rate_bpm: 72.0,
            noise_std: 0.0,
            fps_a: 30.0,
            fps_b: 60.0,
            jitter_ms: 2.0,
            drop_probability: 0.0,
            skew_ppm: 0.0,
            seed: 42,
        }
    }
}

impl SyntheticSession {
    /// Pulse generator for one channel
    pub fn generator(&self, channel_seed: u32) -> PulseWaveGenerator {
        PulseWaveGenerator::new(self.heart_rate_bpm)
            .with_harmonics(0.35, 0.1)
            .with_wander(2.0, 0.08)
            .with_noise(self.noise_std, channel_seed)
    }

    /// Clock for a channel captured at `fps`
    pub fn clock(&self, fps: f64, channel_seed: u32) -> StreamClock {
        StreamClock::new(fps)
            .with_jitter(self.jitter_ms, channel_seed)
            .with_drops(self.drop_probability)
    }

    /// Render both channels
    pub fn generate(&self) -> SessionInput {
        let seed_a = self.seed;
        let seed_b = self.seed.wrapping_mul(31).wrapping_add(7);
        let channel_a = self
            .clock(self.fps_a, seed_a)
            .capture(&mut self.generator(seed_a ^ 0xA5A5), self.duration_s, 0.0);
        let channel_b = self
            .clock(self.fps_b, seed_b)
            .with_skew_ppm(self.skew_ppm)
            .capture(
                &mut self.generator(seed_b ^ 0x5A5A),
                self.duration_s,
                self.lag_ms / 1000.0,
            );
        SessionInput::new(channel_a, channel_b)
    }
}
