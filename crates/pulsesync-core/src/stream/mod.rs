//! Live capture buffering
//!
//! - Per-channel fixed-capacity sample store ([`ring`])
//! - Rate-limited streaming quality updates ([`monitor`])

pub mod monitor;
pub mod ring;

pub use monitor::{QualityMonitor, QualityUpdate};
pub use ring::SampleRing;
