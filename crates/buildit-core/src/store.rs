//! Persistence abstraction for pipeline records.

use async_trait::async_trait;

use crate::record::PipelineRecord;
use crate::{PipelineId, Result};

/// Durable storage for pipelines. Implementations report failures as
/// [`crate::Error::Storage`] and [`crate::Error::NotFound`].
#[async_trait]
pub trait PipelineStore: Send + Sync {
    /// Insert or replace the record with the same id.
    async fn save(&self, record: &PipelineRecord) -> Result<()>;

    async fn load(&self, id: PipelineId) -> Result<PipelineRecord>;

    /// Ids of every stored pipeline.
    async fn list(&self) -> Result<Vec<PipelineId>>;
}
