//! DSP conditioning chain
//!
//! Stages run in a fixed order: [`detrend`], [`biquad`] band-pass,
//! optional [`wavelet`] denoising and [`normalize`]. [`chain`] wires them
//! together for one channel.

pub mod biquad;
pub mod chain;
pub mod detrend;
pub mod normalize;
pub mod wavelet;

pub use chain::{ConditionedChannel, ConditioningChain};
