//! PTT consensus engine
//!
//! - Pulse foot detection and beat pairing ([`foot`])
//! - Method combination, agreement and reportability ([`ptt`])

pub mod foot;
pub mod ptt;

pub use foot::{FootMethod, PulseFoot};
pub use ptt::{ConsensusEngine, FootToFootEstimate, LagMethod, MethodLag, PttResult};
