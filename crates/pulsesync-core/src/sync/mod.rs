//! Timestamp synchronization module
//!
//! This module aligns the two independently-clocked capture streams:
//! - Sanitizing and resampling onto a unified grid ([`timeline`])
//! - Clock drift, jitter, frame drops and artifact masking ([`drift`])
//! - Auxiliary metric alignment ([`auxiliary`])

pub mod auxiliary;
pub mod drift;
pub mod timeline;

pub use auxiliary::{AuxiliaryMetrics, AuxiliarySeries};
pub use drift::{ArtifactMask, DriftReport};
pub use timeline::{TimestampSynchronizer, UnifiedSeries};
