use super::AuditSink;
use crate::core::{ComputationLogRecord, DeletionAuditRecord, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Audit sink that keeps records in memory. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    deletions: Arc<Mutex<Vec<DeletionAuditRecord>>>,
    computations: Arc<Mutex<Vec<ComputationLogRecord>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deletions(&self) -> Result<Vec<DeletionAuditRecord>> {
        Ok(self.deletions.lock()?.clone())
    }

    pub fn computations(&self) -> Result<Vec<ComputationLogRecord>> {
        Ok(self.computations.lock()?.clone())
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append_deletion(&self, record: &DeletionAuditRecord) -> Result<()> {
        self.deletions.lock()?.push(record.clone());
        Ok(())
    }

    async fn append_computation(&self, record: &ComputationLogRecord) -> Result<()> {
        self.computations.lock()?.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_clones_share_records() {
        let sink = MemoryAuditSink::new();
        let observer = sink.clone();

        let now = Utc::now();
        sink.append_deletion(&DeletionAuditRecord::new("e1".into(), now, now))
            .await
            .unwrap();
        sink.append_computation(&ComputationLogRecord::new(1000, Duration::from_micros(5), now))
            .await
            .unwrap();

        assert_eq!(observer.deletions().unwrap().len(), 1);
        assert_eq!(observer.computations().unwrap()[0].no_of_objects, 1000);
    }
}
