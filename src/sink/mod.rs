pub mod jsonl;
pub mod memory;

pub use jsonl::JsonLinesAuditSink;
pub use memory::MemoryAuditSink;

use crate::core::{ComputationLogRecord, DeletionAuditRecord, Result};
use async_trait::async_trait;

/// Append-only destination for audit output.
///
/// Writes are awaited by the dispatch loop before the next event is admitted,
/// so a slow sink throttles feed consumption.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append_deletion(&self, record: &DeletionAuditRecord) -> Result<()>;

    async fn append_computation(&self, record: &ComputationLogRecord) -> Result<()>;
}

#[async_trait]
impl<T: AuditSink + ?Sized> AuditSink for std::sync::Arc<T> {
    async fn append_deletion(&self, record: &DeletionAuditRecord) -> Result<()> {
        (**self).append_deletion(record).await
    }

    async fn append_computation(&self, record: &ComputationLogRecord) -> Result<()> {
        (**self).append_computation(record).await
    }
}
