mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;

use radius_common::{AnalysisRecord, RadiusError};

/// Write-once document store for analysis envelopes. Records are inserted
/// under their analysis id and retrieved by id; they are never updated in
/// place. Failures surface as [`RadiusError::Store`].
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn put(&self, record: &AnalysisRecord) -> Result<(), RadiusError>;
    async fn get(&self, analysis_id: &str) -> Result<Option<AnalysisRecord>, RadiusError>;
}
