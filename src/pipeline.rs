// ============================================================================
// TTL Pipeline
// ============================================================================
//
// Owns the classifier, the auditor and the telemetry accumulator. `handle`
// processes exactly one change event to completion; callers serialize calls
// so accumulator increments and resets follow feed order.
//
// ============================================================================

use crate::auditor::{AuditOutcome, DeletionAuditor};
use crate::bucket::{BucketManager, BucketTier};
use crate::classifier::{Classification, EventClassifier};
use crate::config::PipelineConfig;
use crate::core::{ChangeEvent, Clock, PipelineError, Result};
use crate::sink::AuditSink;
use crate::telemetry::TelemetryAccumulator;
use serde::Serialize;
use std::sync::Arc;
use tracing::{Level, event};

/// Counters describing what the pipeline has processed so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub events_seen: u64,
    pub inserts_sub_minute: u64,
    pub inserts_short: u64,
    pub inserts_long: u64,
    pub bucket_failures: u64,
    pub deletions_audited: u64,
    pub sink_failures: u64,
    pub malformed_skipped: u64,
    pub ignored_events: u64,
}

impl PipelineStats {
    pub fn inserts_classified(&self) -> u64 {
        self.inserts_sub_minute + self.inserts_short + self.inserts_long
    }
}

/// What happened to a single dispatched event.
#[derive(Debug)]
pub enum DispatchOutcome {
    Classified(Classification),
    Audited(AuditOutcome),
    /// Event kind the pipeline does not act on.
    Ignored { operation: String },
    /// Insert without a usable post-image or delete without a usable pre-image.
    Skipped(PipelineError),
}

pub struct TtlPipeline<B, S> {
    classifier: EventClassifier<B>,
    auditor: DeletionAuditor<S>,
    accumulator: TelemetryAccumulator,
    stats: PipelineStats,
}

impl<B: BucketManager, S: AuditSink> TtlPipeline<B, S> {
    pub fn new(buckets: B, sink: S, clock: Arc<dyn Clock>, config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            classifier: EventClassifier::new(buckets, clock.clone(), config),
            auditor: DeletionAuditor::new(sink, clock, config),
            accumulator: TelemetryAccumulator::new(),
            stats: PipelineStats::default(),
        })
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn accumulator(&self) -> &TelemetryAccumulator {
        &self.accumulator
    }

    pub fn buckets(&self) -> &B {
        self.classifier.buckets()
    }

    pub fn sink(&self) -> &S {
        self.auditor.sink()
    }

    /// Processes one change event to completion.
    pub async fn handle(&mut self, change: ChangeEvent) -> DispatchOutcome {
        self.stats.events_seen += 1;
        match change {
            ChangeEvent::Insert { id, post_image } => {
                let Some(expire_at) = post_image.and_then(|entity| entity.expire_at) else {
                    return self.skip(PipelineError::MalformedEvent(format!(
                        "insert {} has no expire_at in its post-image",
                        id
                    )));
                };
                let classification = self
                    .classifier
                    .classify(&mut self.accumulator, &id, expire_at)
                    .await;
                match classification.tier {
                    BucketTier::SubMinute => self.stats.inserts_sub_minute += 1,
                    BucketTier::Short => self.stats.inserts_short += 1,
                    BucketTier::Long => self.stats.inserts_long += 1,
                }
                if !classification.tracked {
                    self.stats.bucket_failures += 1;
                }
                DispatchOutcome::Classified(classification)
            }
            ChangeEvent::Delete { id, pre_image } => {
                let Some(expire_at) = pre_image.and_then(|entity| entity.expire_at) else {
                    return self.skip(PipelineError::MalformedEvent(format!(
                        "delete {} has no expire_at in its pre-image",
                        id
                    )));
                };
                let outcome = self
                    .auditor
                    .audit(&mut self.accumulator, &id, expire_at)
                    .await;
                self.stats.deletions_audited += 1;
                self.stats.sink_failures += outcome.errors.len() as u64;
                DispatchOutcome::Audited(outcome)
            }
            ChangeEvent::Other { operation, .. } => {
                self.stats.ignored_events += 1;
                event!(Level::TRACE, operation = %operation, "change event ignored");
                DispatchOutcome::Ignored { operation }
            }
        }
    }

    fn skip(&mut self, err: PipelineError) -> DispatchOutcome {
        self.stats.malformed_skipped += 1;
        event!(Level::WARN, error = %err, "skipping malformed change event");
        DispatchOutcome::Skipped(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::TieredBuckets;
    use crate::core::{Entity, ManualClock};
    use crate::sink::MemoryAuditSink;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn pipeline(step: Duration) -> (Arc<ManualClock>, TtlPipeline<TieredBuckets, MemoryAuditSink>) {
        let clock = Arc::new(
            ManualClock::new(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap())
                .with_auto_advance(step),
        );
        let pipeline = TtlPipeline::new(
            TieredBuckets::new(),
            MemoryAuditSink::new(),
            clock.clone(),
            &PipelineConfig::default(),
        )
        .unwrap();
        (clock, pipeline)
    }

    #[tokio::test]
    async fn test_insert_without_expiry_is_skipped() {
        let (_, mut pipeline) = pipeline(Duration::ZERO);
        let outcome = pipeline
            .handle(ChangeEvent::Insert {
                id: "e1".into(),
                post_image: Some(Entity {
                    id: "e1".into(),
                    value: "v".to_string(),
                    expire_at: None,
                }),
            })
            .await;

        assert!(matches!(
            outcome,
            DispatchOutcome::Skipped(PipelineError::MalformedEvent(_))
        ));
        assert_eq!(pipeline.stats().malformed_skipped, 1);
        assert_eq!(pipeline.accumulator().samples(), 0);
    }

    #[tokio::test]
    async fn test_delete_without_pre_image_is_skipped() {
        let (_, mut pipeline) = pipeline(Duration::ZERO);
        let outcome = pipeline
            .handle(ChangeEvent::Delete {
                id: "e1".into(),
                pre_image: None,
            })
            .await;

        assert!(matches!(outcome, DispatchOutcome::Skipped(_)));
        assert!(pipeline.sink().deletions().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_kinds_are_ignored() {
        let (_, mut pipeline) = pipeline(Duration::ZERO);
        let outcome = pipeline
            .handle(ChangeEvent::Other {
                operation: "update".to_string(),
                id: Some("e1".into()),
            })
            .await;

        assert!(matches!(outcome, DispatchOutcome::Ignored { .. }));
        assert_eq!(pipeline.stats().ignored_events, 1);
        assert_eq!(pipeline.stats().events_seen, 1);
    }

    #[tokio::test]
    async fn test_stats_track_tiers_and_audits() {
        let (clock, mut pipeline) = pipeline(Duration::from_micros(10));
        let now = clock.now();

        for (id, secs) in [("a", 30), ("b", 180), ("c", 600), ("d", 900)] {
            let entity = Entity::new(id.into(), "v", now + chrono::Duration::seconds(secs));
            pipeline.handle(ChangeEvent::insert(entity)).await;
        }
        let gone = Entity::new("a".into(), "v", now + chrono::Duration::seconds(30));
        pipeline.handle(ChangeEvent::delete(gone)).await;

        let stats = pipeline.stats();
        assert_eq!(stats.inserts_sub_minute, 1);
        assert_eq!(stats.inserts_short, 1);
        assert_eq!(stats.inserts_long, 2);
        assert_eq!(stats.inserts_classified(), 4);
        assert_eq!(stats.deletions_audited, 1);
        assert_eq!(stats.sink_failures, 0);

        let computations = pipeline.sink().computations().unwrap();
        assert_eq!(computations[0].computation_time, Duration::from_micros(40));
        assert_eq!(pipeline.accumulator().total(), Duration::ZERO);
    }
}
