//! Shared data model for the timing engine
//!
//! Values produced by acquisition ([`TimestampedSample`]) and the small
//! closed enums used to tag channels and diagnose invalid inputs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Nanoseconds per second, used for timestamp arithmetic
pub const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Nanoseconds per millisecond
pub const NANOS_PER_MS: f64 = 1_000_000.0;

/// Variance / norm floor below which a signal is treated as constant
pub const DEGENERATE_EPSILON: f64 = 1e-12;

/// A single brightness reading with its monotonic capture time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimestampedSample {
    /// Monotonic capture time in nanoseconds
    pub timestamp_ns: i64,
    /// Brightness value
    pub value: f64,
}

impl TimestampedSample {
    /// Create a new sample
    pub fn new(timestamp_ns: i64, value: f64) -> Self {
        Self {
            timestamp_ns,
            value,
        }
    }
}

/// Which of the two capture streams a value belongs to
///
/// Channel A is conventionally the proximal site (face camera) and
/// channel B the distal site (fingertip camera). A positive lag means
/// the pulse reaches channel B after channel A.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    A,
    B,
}

impl Channel {
    /// Body site conventionally captured on this channel
    pub fn role(self) -> ChannelRole {
        match self {
            Channel::A => ChannelRole::Face,
            Channel::B => ChannelRole::Finger,
        }
    }
}

/// Body site of a capture stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelRole {
    Face,
    Finger,
}

impl ChannelRole {
    /// Lowercase label used in logs and reports
    pub fn label(self) -> &'static str {
        match self {
            ChannelRole::Face => "face",
            ChannelRole::Finger => "finger",
        }
    }
}

/// Reasons an input cannot produce a measurement
///
/// These are never surfaced as `Err` from the processing API. Their
/// display text becomes the diagnostic message of the invalid result
/// object instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputIssue {
    #[error("channel {0:?} has no samples")]
    EmptyChannel(Channel),

    #[error("channels do not overlap in time")]
    NoOverlap,

    #[error("signal lengths differ: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("signal too short: {len} samples, need at least {min}")]
    TooShort { len: usize, min: usize },

    #[error("signal variance is near zero")]
    Degenerate,

    #[error("sample rate must be positive, got {0}")]
    InvalidSampleRate(f64),
}
