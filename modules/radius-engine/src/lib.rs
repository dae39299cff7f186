pub mod crawler;
pub mod engine;
pub mod knowledge;
pub mod questions;
pub mod scoring;
pub mod store;
pub mod tester;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use engine::{AnalysisOptions, RadiusEngine, TestQuestion};
