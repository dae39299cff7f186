pub mod config;
pub mod error;
pub mod types;

pub use config::{ConfidenceThresholds, RadiusConfig, ScoringWeights};
pub use error::RadiusError;
pub use types::*;
