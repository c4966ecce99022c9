//! Pulsesync - Pulse transit time from two PPG camera streams
//!
//! This library re-exports the timing engine from `pulsesync-core` and adds
//! the application-side config file handling used by the binary.

pub mod config;

pub use pulsesync_core::consensus;
pub use pulsesync_core::dsp;
pub use pulsesync_core::lag;
pub use pulsesync_core::pipeline;
pub use pulsesync_core::quality;
pub use pulsesync_core::spectral;
pub use pulsesync_core::stats;
pub use pulsesync_core::stream;
pub use pulsesync_core::sync;
pub use pulsesync_core::synth;
pub use pulsesync_core::types;

pub use pulsesync_core::{
    Channel, ChannelQuality, ConfigError, LagEstimate, LagEstimator, PipelineConfig,
    PipelineReport, PttPipeline, PttResult, QualityEngine, QualityMonitor, SampleRing,
    SessionInput, TimestampSynchronizer, TimestampedSample, UnifiedSeries,
};
pub use pulsesync_core::{DEFAULT_TARGET_RATE_HZ, VERSION};
