//! Signal quality engine
//!
//! - Systolic peak detection ([`peaks`])
//! - Per-channel scores and combined confidence ([`sqi`])

pub mod peaks;
pub mod sqi;

pub use sqi::{AuxiliaryLevels, ChannelQuality, CombinedConfidence, QualityEngine};
