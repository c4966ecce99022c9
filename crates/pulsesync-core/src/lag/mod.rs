//! Lag estimation between the two conditioned channels
//!
//! - Normalized cross-correlation with parabolic refinement ([`xcorr`])
//! - Sliding-window stability analysis ([`stability`])

pub mod stability;
pub mod xcorr;

pub use stability::{analyze_stability, StabilityReport, WindowLag};
pub use xcorr::{LagEstimate, LagEstimator};
