use crate::bucket::{BucketManager, BucketTier};
use crate::config::PipelineConfig;
use crate::core::{Clock, EntityId};
use crate::telemetry::TelemetryAccumulator;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, Level, event, info_span};

/// Result of classifying one inserted entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub tier: BucketTier,
    /// Remaining lifetime truncated to whole milliseconds; reporting only.
    pub remaining_ms: i64,
    /// Time spent routing the entity, added to the accumulator.
    pub cost: Duration,
    /// False when the bucket manager rejected the insertion.
    pub tracked: bool,
}

/// Routes newly observed entities into TTL tiers and meters the work.
pub struct EventClassifier<B> {
    buckets: B,
    clock: Arc<dyn Clock>,
    sub_minute_threshold_ms: i64,
    short_threshold_ms: i64,
}

impl<B: BucketManager> EventClassifier<B> {
    pub fn new(buckets: B, clock: Arc<dyn Clock>, config: &PipelineConfig) -> Self {
        Self {
            buckets,
            clock,
            sub_minute_threshold_ms: config.sub_minute_threshold_ms,
            short_threshold_ms: config.short_threshold_ms,
        }
    }

    pub fn buckets(&self) -> &B {
        &self.buckets
    }

    /// Classifies one entity and records the elapsed cost into `accumulator`.
    ///
    /// Entities that are already past `expire_at` land in the sub-minute tier.
    /// A bucket insertion failure is logged and reported through
    /// `Classification::tracked`; it never stops the pipeline.
    pub async fn classify(
        &self,
        accumulator: &mut TelemetryAccumulator,
        id: &EntityId,
        expire_at: DateTime<Utc>,
    ) -> Classification {
        let started = self.clock.instant();

        let remaining = expire_at - self.clock.now();
        let tier = BucketTier::for_remaining(
            remaining,
            self.sub_minute_threshold_ms,
            self.short_threshold_ms,
        );
        let remaining_ms = remaining.num_milliseconds();
        let span = info_span!(
            "ttl.classify",
            entity_id = %id,
            tier = %tier,
            remaining_ms = remaining_ms
        );

        let tracked = match self
            .buckets
            .insert(tier, id, expire_at)
            .instrument(span.clone())
            .await
        {
            Ok(()) => true,
            Err(err) => {
                span.in_scope(|| {
                    event!(Level::WARN, error = %err, "bucket insertion failed, entity not tracked")
                });
                false
            }
        };

        let cost = self
            .clock
            .instant()
            .checked_duration_since(started)
            .unwrap_or(Duration::ZERO);
        accumulator.record(cost);

        span.in_scope(|| {
            event!(Level::DEBUG, cost_us = cost.as_micros() as u64, "entity classified")
        });
        Classification {
            tier,
            remaining_ms,
            cost,
            tracked,
        }
    }
}
