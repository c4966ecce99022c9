//! Pulsesync Core - Dual-site PPG timing engine
//!
//! Estimates the pulse transit time (PTT) between two independently clocked
//! photoplethysmography streams, typically a face camera and a fingertip
//! camera. Raw brightness samples are aligned onto one timeline, conditioned,
//! cross-correlated and scored, and a single confidence-weighted lag is
//! reported together with the reason when it should not be trusted.
//!
//! Nothing here performs I/O or panics on bad input: degenerate windows come
//! back as result objects with `is_valid = false` and a diagnostic message.

pub mod config;
pub mod consensus;
pub mod dsp;
pub mod lag;
pub mod pipeline;
pub mod quality;
pub mod spectral;
pub mod stats;
pub mod stream;
pub mod sync;
pub mod synth;
pub mod types;

pub use config::{ConfigError, PipelineConfig};
pub use consensus::PttResult;
pub use lag::{LagEstimate, LagEstimator};
pub use pipeline::{PipelineReport, PttPipeline, SessionInput};
pub use quality::{ChannelQuality, QualityEngine};
pub use stream::{QualityMonitor, SampleRing};
pub use sync::{TimestampSynchronizer, UnifiedSeries};
pub use types::{Channel, TimestampedSample};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default unified timeline rate in Hz
pub const DEFAULT_TARGET_RATE_HZ: f64 = 100.0;
