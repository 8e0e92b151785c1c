pub mod tiered;

pub use tiered::TieredBuckets;

use crate::config::PipelineConfig;
use crate::core::{EntityId, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse classification of an entity by remaining lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketTier {
    /// remaining <= sub-minute threshold (includes already-expired entities)
    SubMinute,
    /// sub-minute threshold < remaining <= short threshold
    Short,
    /// remaining > short threshold
    Long,
}

impl BucketTier {
    /// Picks the tier for an exact remaining lifetime. Boundaries are
    /// inclusive and compared at full precision, so 60 000 ms plus one
    /// microsecond is already past the sub-minute tier.
    pub fn for_remaining(
        remaining: ChronoDuration,
        sub_minute_threshold_ms: i64,
        short_threshold_ms: i64,
    ) -> Self {
        if remaining <= ChronoDuration::milliseconds(sub_minute_threshold_ms) {
            BucketTier::SubMinute
        } else if remaining <= ChronoDuration::milliseconds(short_threshold_ms) {
            BucketTier::Short
        } else {
            BucketTier::Long
        }
    }

    pub fn classify(remaining: ChronoDuration, config: &PipelineConfig) -> Self {
        Self::for_remaining(
            remaining,
            config.sub_minute_threshold_ms,
            config.short_threshold_ms,
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BucketTier::SubMinute => "sub_minute",
            BucketTier::Short => "short",
            BucketTier::Long => "long",
        }
    }
}

impl fmt::Display for BucketTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Insertion contract of the pending-expiry structures.
///
/// A failed insertion is non-fatal: the caller logs it and the entity is
/// simply not tracked.
#[async_trait]
pub trait BucketManager: Send + Sync {
    async fn insert_sub_minute(&self, id: &EntityId) -> Result<()>;

    async fn insert_short(&self, id: &EntityId, expire_at: DateTime<Utc>) -> Result<()>;

    async fn insert_long(&self, id: &EntityId, expire_at: DateTime<Utc>) -> Result<()>;

    /// Routes to the insertion matching `tier`.
    async fn insert(&self, tier: BucketTier, id: &EntityId, expire_at: DateTime<Utc>) -> Result<()> {
        match tier {
            BucketTier::SubMinute => self.insert_sub_minute(id).await,
            BucketTier::Short => self.insert_short(id, expire_at).await,
            BucketTier::Long => self.insert_long(id, expire_at).await,
        }
    }
}

#[async_trait]
impl<T: BucketManager + ?Sized> BucketManager for std::sync::Arc<T> {
    async fn insert_sub_minute(&self, id: &EntityId) -> Result<()> {
        (**self).insert_sub_minute(id).await
    }

    async fn insert_short(&self, id: &EntityId, expire_at: DateTime<Utc>) -> Result<()> {
        (**self).insert_short(id, expire_at).await
    }

    async fn insert_long(&self, id: &EntityId, expire_at: DateTime<Utc>) -> Result<()> {
        (**self).insert_long(id, expire_at).await
    }
}
