use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::info;

use radius_common::{AnalysisRecord, RadiusError};

use super::AnalysisStore;

/// Postgres-backed store. The whole envelope is kept as one JSONB document
/// keyed by analysis id, matching the write-once retrieval pattern.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, RadiusError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| RadiusError::Store(format!("Failed to connect to Postgres: {e}")))?;
        let store = Self { pool };
        store.migrate().await?;
        info!("Analysis store ready");
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn migrate(&self) -> Result<(), RadiusError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS radius_analyses (
                analysis_id TEXT PRIMARY KEY,
                record JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| RadiusError::Store(format!("Failed to create radius_analyses table: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl AnalysisStore for PgStore {
    async fn put(&self, record: &AnalysisRecord) -> Result<(), RadiusError> {
        let payload = serde_json::to_value(record)
            .map_err(|e| RadiusError::Store(format!("Failed to serialize analysis: {e}")))?;
        // Ids are unique per run; a conflict means a retry of the same run.
        sqlx::query(
            "INSERT INTO radius_analyses (analysis_id, record) VALUES ($1, $2)
             ON CONFLICT (analysis_id) DO NOTHING",
        )
        .bind(&record.analysis_id)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| RadiusError::Store(format!("Failed to persist analysis: {e}")))?;
        Ok(())
    }

    async fn get(&self, analysis_id: &str) -> Result<Option<AnalysisRecord>, RadiusError> {
        let row = sqlx::query("SELECT record FROM radius_analyses WHERE analysis_id = $1")
            .bind(analysis_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RadiusError::Store(format!("Failed to load analysis: {e}")))?;

        match row {
            Some(row) => {
                let value: serde_json::Value = row
                    .try_get("record")
                    .map_err(|e| RadiusError::Store(format!("Malformed analysis row: {e}")))?;
                let record = serde_json::from_value(value).map_err(|e| {
                    RadiusError::Store(format!(
                        "Stored analysis does not match the current schema: {e}"
                    ))
                })?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }
}
