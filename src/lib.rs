// ============================================================================
// ttlwatch Library
// ============================================================================

pub mod auditor;
pub mod bucket;
pub mod classifier;
pub mod config;
pub mod core;
pub mod feed;
pub mod load_gen;
pub mod pipeline;
pub mod sink;
pub mod store;
pub mod telemetry;

// Re-export main types for convenience
pub use auditor::{AuditOutcome, DeletionAuditor};
pub use bucket::{BucketManager, BucketTier, TieredBuckets};
pub use classifier::{Classification, EventClassifier};
pub use config::{AccumulatorResetPolicy, LoadGenConfig, PipelineConfig, StoreConfig};
pub use crate::core::{
    ChangeEvent, Clock, ComputationLogRecord, DeletionAuditRecord, Entity, EntityId,
    ManualClock, NewEntity, PipelineError, Result, SystemClock,
};
pub use feed::{ChangeFeed, ChangeFeedListener, ChannelFeed, FeedSender, ListenerHandle, StreamFeed};
pub use load_gen::{GenerationReport, SyntheticLoadGenerator};
pub use pipeline::{DispatchOutcome, PipelineStats, TtlPipeline};
pub use sink::{AuditSink, JsonLinesAuditSink, MemoryAuditSink};
pub use store::{BulkInsert, ExpirySweeper, ExpiryStore, spawn_expiry_sweeper};
pub use telemetry::TelemetryAccumulator;
