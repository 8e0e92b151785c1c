use super::AuditSink;
use crate::core::{ComputationLogRecord, DeletionAuditRecord, PipelineError, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

pub const COMPUTATION_LOG_FILE: &str = "bucket_computation_log.jsonl";

pub fn deletion_log_file(no_of_objects: u64) -> String {
    format!("bucket_deletion_log_{}.jsonl", no_of_objects)
}

/// Appends audit records as JSON lines under a directory.
///
/// Deletion records go to `bucket_deletion_log_<no_of_objects>.jsonl`,
/// computation records to `bucket_computation_log.jsonl`.
#[derive(Debug, Clone)]
pub struct JsonLinesAuditSink {
    deletion_path: PathBuf,
    computation_path: PathBuf,
    sync_data: bool,
}

impl JsonLinesAuditSink {
    pub async fn open(dir: impl AsRef<Path>, no_of_objects: u64) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .await
            .map_err(|err| PipelineError::IoError(format!("{}: {}", dir.display(), err)))?;
        Ok(Self {
            deletion_path: dir.join(deletion_log_file(no_of_objects)),
            computation_path: dir.join(COMPUTATION_LOG_FILE),
            sync_data: false,
        })
    }

    /// fsync after every append.
    pub fn with_sync_data(mut self, sync_data: bool) -> Self {
        self.sync_data = sync_data;
        self
    }

    pub fn deletion_path(&self) -> &Path {
        &self.deletion_path
    }

    pub fn computation_path(&self) -> &Path {
        &self.computation_path
    }

    pub async fn read_deletions(&self) -> Result<Vec<DeletionAuditRecord>> {
        read_lines(&self.deletion_path).await
    }

    pub async fn read_computations(&self) -> Result<Vec<ComputationLogRecord>> {
        read_lines(&self.computation_path).await
    }

    async fn append_line<T: Serialize + Sync>(&self, path: &Path, record: &T) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|err| PipelineError::SinkWrite(format!("{}: {}", path.display(), err)))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|err| PipelineError::SinkWrite(err.to_string()))?;
        file.flush()
            .await
            .map_err(|err| PipelineError::SinkWrite(err.to_string()))?;
        if self.sync_data {
            file.sync_data()
                .await
                .map_err(|err| PipelineError::SinkWrite(err.to_string()))?;
        }
        Ok(())
    }
}

async fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !fs::try_exists(path).await? {
        return Ok(Vec::new());
    }

    let file = OpenOptions::new().read(true).open(path).await?;
    let mut records = Vec::new();
    let mut lines = BufReader::new(file).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str::<T>(&line)?);
    }
    Ok(records)
}

#[async_trait]
impl AuditSink for JsonLinesAuditSink {
    async fn append_deletion(&self, record: &DeletionAuditRecord) -> Result<()> {
        self.append_line(&self.deletion_path, record).await
    }

    async fn append_computation(&self, record: &ComputationLogRecord) -> Result<()> {
        self.append_line(&self.computation_path, record).await
    }
}
