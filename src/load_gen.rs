use crate::config::LoadGenConfig;
use crate::core::{Clock, NewEntity, Result};
use crate::store::BulkInsert;
use chrono::Duration as ChronoDuration;
use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::Arc;
use tracing::{Level, event, info_span};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerationReport {
    pub entities: usize,
    pub batches: usize,
}

/// Test-support generator of entities with random future expiry.
pub struct SyntheticLoadGenerator<T> {
    target: T,
    clock: Arc<dyn Clock>,
    config: LoadGenConfig,
}

impl<T: BulkInsert> SyntheticLoadGenerator<T> {
    pub fn new(target: T, clock: Arc<dyn Clock>, config: LoadGenConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            target,
            clock,
            config,
        })
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    /// Creates `count` entities expiring uniformly in `[min_ttl_ms, max_ttl_ms)`
    /// from the generation start, written in batches of `batch_size` plus one
    /// write for a non-empty remainder.
    pub async fn generate(&self, count: usize) -> Result<GenerationReport> {
        let span = info_span!("ttl.generate", count = count);
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let ttl = Uniform::new(self.config.min_ttl_ms, self.config.max_ttl_ms);
        let start = self.clock.now();

        let batch_size = self.config.batch_size;
        let mut report = GenerationReport::default();
        let mut batch = Vec::with_capacity(batch_size.min(count));

        for i in 0..count {
            let ttl_ms = rng.sample(&ttl).min(i64::MAX as u64) as i64;
            batch.push(NewEntity::new(
                format!("Document {}", i + 1),
                start + ChronoDuration::milliseconds(ttl_ms),
            ));

            if batch.len() >= batch_size {
                let next = Vec::with_capacity(batch_size.min(count - i));
                let full = std::mem::replace(&mut batch, next);
                report.entities += self.target.insert_batch(full).await?;
                report.batches += 1;
                span.in_scope(|| event!(Level::DEBUG, written = report.entities, "batch inserted"));
            }
        }

        if !batch.is_empty() {
            report.entities += self.target.insert_batch(batch).await?;
            report.batches += 1;
        }

        span.in_scope(|| {
            event!(
                Level::INFO,
                entities = report.entities,
                batches = report.batches,
                "synthetic load generated"
            )
        });
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTarget {
        batches: Mutex<Vec<Vec<NewEntity>>>,
    }

    #[async_trait]
    impl BulkInsert for RecordingTarget {
        async fn insert_batch(&self, batch: Vec<NewEntity>) -> Result<usize> {
            let len = batch.len();
            self.batches.lock()?.push(batch);
            Ok(len)
        }
    }

    fn generator(batch_size: usize) -> SyntheticLoadGenerator<RecordingTarget> {
        let clock = Arc::new(ManualClock::new(Utc.timestamp_millis_opt(1_000_000).unwrap()));
        let config = LoadGenConfig::default().batch_size(batch_size).seed(42);
        SyntheticLoadGenerator::new(RecordingTarget::default(), clock, config).unwrap()
    }

    #[tokio::test]
    async fn test_batches_with_remainder() {
        let generator = generator(4);
        let report = generator.generate(10).await.unwrap();

        let batches = generator.target().batches.lock().unwrap();
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(report, GenerationReport { entities: 10, batches: 3 });
        assert_eq!(batches[2][1].value, "Document 10");
    }

    #[tokio::test]
    async fn test_exact_multiple_has_no_empty_write() {
        let generator = generator(5);
        let report = generator.generate(10).await.unwrap();
        assert_eq!(report.batches, 2);
    }

    #[tokio::test]
    async fn test_zero_count_writes_nothing() {
        let generator = generator(5);
        let report = generator.generate(0).await.unwrap();
        assert_eq!(report, GenerationReport::default());
        assert!(generator.target().batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expiry_within_configured_range() {
        let generator = generator(1_000);
        generator.generate(500).await.unwrap();

        let start = Utc.timestamp_millis_opt(1_000_000).unwrap();
        let batches = generator.target().batches.lock().unwrap();
        for entity in batches.iter().flatten() {
            let ttl = (entity.expire_at.unwrap() - start).num_milliseconds();
            assert!((600_000..1_200_000).contains(&ttl), "ttl {} out of range", ttl);
        }
    }
}
