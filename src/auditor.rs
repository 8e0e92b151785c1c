use crate::config::{AccumulatorResetPolicy, PipelineConfig};
use crate::core::{
    Clock, ComputationLogRecord, DeletionAuditRecord, EntityId, PipelineError,
};
use crate::sink::AuditSink;
use crate::telemetry::TelemetryAccumulator;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, Level, event, info_span};

/// Result of auditing one observed deletion.
#[derive(Debug)]
pub struct AuditOutcome {
    pub deletion: DeletionAuditRecord,
    pub computation: ComputationLogRecord,
    /// Errors from the two sink appends, in write order.
    pub errors: Vec<PipelineError>,
    /// Whether the accumulator was reset after this deletion.
    pub reset: bool,
}

impl AuditOutcome {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Records deletion drift and flushes accumulated classification cost.
pub struct DeletionAuditor<S> {
    sink: S,
    clock: Arc<dyn Clock>,
    no_of_objects: u64,
    reset_policy: AccumulatorResetPolicy,
}

impl<S: AuditSink> DeletionAuditor<S> {
    pub fn new(sink: S, clock: Arc<dyn Clock>, config: &PipelineConfig) -> Self {
        Self {
            sink,
            clock,
            no_of_objects: config.no_of_objects,
            reset_policy: config.reset_policy,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Appends the deletion record, then the computation record, then resets
    /// the accumulator according to the reset policy.
    ///
    /// Replaying the same deletion produces another pair of records; nothing
    /// is deduplicated by entity id.
    pub async fn audit(
        &self,
        accumulator: &mut TelemetryAccumulator,
        id: &EntityId,
        declared_expire_at: DateTime<Utc>,
    ) -> AuditOutcome {
        let deletion_time = self.clock.now();
        let deletion = DeletionAuditRecord::new(id.clone(), declared_expire_at, deletion_time);
        let span = info_span!(
            "ttl.audit",
            entity_id = %id,
            deletion_time_diff_ms = deletion.deletion_time_diff_ms
        );

        let mut errors = Vec::new();
        if let Err(err) = self
            .sink
            .append_deletion(&deletion)
            .instrument(span.clone())
            .await
        {
            span.in_scope(|| event!(Level::ERROR, error = %err, "deletion audit append failed"));
            errors.push(err);
        }

        let computation =
            ComputationLogRecord::new(self.no_of_objects, accumulator.total(), deletion_time);
        if let Err(err) = self
            .sink
            .append_computation(&computation)
            .instrument(span.clone())
            .await
        {
            span.in_scope(|| event!(Level::ERROR, error = %err, "computation log append failed"));
            errors.push(err);
        }

        let reset = match self.reset_policy {
            AccumulatorResetPolicy::Always => true,
            AccumulatorResetPolicy::OnSuccess => errors.is_empty(),
        };
        let flushed = if reset { accumulator.take() } else { Duration::ZERO };

        span.in_scope(|| {
            event!(
                Level::INFO,
                computation_ms = computation.computation_time_ms(),
                flushed_us = flushed.as_micros() as u64,
                reset,
                "deletion audited"
            )
        });
        AuditOutcome {
            deletion,
            computation,
            errors,
            reset,
        }
    }
}
