use super::{BucketManager, BucketTier};
use crate::core::{EntityId, PipelineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Tiers {
    sub_minute: VecDeque<EntityId>,
    short: BTreeMap<DateTime<Utc>, Vec<EntityId>>,
    long: BTreeMap<DateTime<Utc>, Vec<EntityId>>,
    members: HashSet<EntityId>,
    short_len: usize,
    long_len: usize,
}

/// In-memory three-tier pending-expiry structure.
///
/// The sub-minute tier is a FIFO of ids; the short and long tiers are ordered
/// by declared expiry so due entities can be drained from the front.
#[derive(Debug, Default)]
pub struct TieredBuckets {
    tiers: Mutex<Tiers>,
    capacity: Option<usize>,
}

impl TieredBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the number of tracked entities across all tiers.
    pub fn with_capacity_limit(capacity: usize) -> Self {
        Self {
            tiers: Mutex::new(Tiers::default()),
            capacity: Some(capacity),
        }
    }

    pub fn tier_len(&self, tier: BucketTier) -> Result<usize> {
        let tiers = self.tiers.lock()?;
        Ok(match tier {
            BucketTier::SubMinute => tiers.sub_minute.len(),
            BucketTier::Short => tiers.short_len,
            BucketTier::Long => tiers.long_len,
        })
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.tiers.lock()?.members.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn contains(&self, id: &EntityId) -> Result<bool> {
        Ok(self.tiers.lock()?.members.contains(id))
    }

    /// Drains the sub-minute tier in insertion order.
    pub fn take_sub_minute(&self) -> Result<Vec<EntityId>> {
        let mut tiers = self.tiers.lock()?;
        let drained: Vec<EntityId> = tiers.sub_minute.drain(..).collect();
        for id in &drained {
            tiers.members.remove(id);
        }
        Ok(drained)
    }

    /// Drains short and long tier entries whose expiry is at or before `now`,
    /// ordered by expiry.
    pub fn take_due(&self, now: DateTime<Utc>) -> Result<Vec<EntityId>> {
        let mut tiers = self.tiers.lock()?;
        let mut due: Vec<(DateTime<Utc>, EntityId)> = Vec::new();

        let short_due = drain_until(&mut tiers.short, now);
        tiers.short_len -= short_due.len();
        due.extend(short_due);

        let long_due = drain_until(&mut tiers.long, now);
        tiers.long_len -= long_due.len();
        due.extend(long_due);

        due.sort_by(|a, b| a.0.cmp(&b.0));
        for (_, id) in &due {
            tiers.members.remove(id);
        }
        Ok(due.into_iter().map(|(_, id)| id).collect())
    }

    fn admit(&self, tiers: &mut Tiers, id: &EntityId) -> Result<()> {
        if let Some(capacity) = self.capacity {
            if tiers.members.len() >= capacity {
                return Err(PipelineError::BucketInsert(format!(
                    "bucket capacity {} reached, cannot track {}",
                    capacity, id
                )));
            }
        }
        tiers.members.insert(id.clone());
        Ok(())
    }
}

fn drain_until(
    tier: &mut BTreeMap<DateTime<Utc>, Vec<EntityId>>,
    now: DateTime<Utc>,
) -> Vec<(DateTime<Utc>, EntityId)> {
    let Some(after) = now.checked_add_signed(chrono::Duration::nanoseconds(1)) else {
        return std::mem::take(tier)
            .into_iter()
            .flat_map(|(at, ids)| ids.into_iter().map(move |id| (at, id)))
            .collect();
    };
    let remaining = tier.split_off(&after);
    let due = std::mem::replace(tier, remaining);
    due.into_iter()
        .flat_map(|(at, ids)| ids.into_iter().map(move |id| (at, id)))
        .collect()
}

#[async_trait]
impl BucketManager for TieredBuckets {
    async fn insert_sub_minute(&self, id: &EntityId) -> Result<()> {
        let mut tiers = self.tiers.lock()?;
        self.admit(&mut tiers, id)?;
        tiers.sub_minute.push_back(id.clone());
        Ok(())
    }

    async fn insert_short(&self, id: &EntityId, expire_at: DateTime<Utc>) -> Result<()> {
        let mut tiers = self.tiers.lock()?;
        self.admit(&mut tiers, id)?;
        tiers.short.entry(expire_at).or_default().push(id.clone());
        tiers.short_len += 1;
        Ok(())
    }

    async fn insert_long(&self, id: &EntityId, expire_at: DateTime<Utc>) -> Result<()> {
        let mut tiers = self.tiers.lock()?;
        self.admit(&mut tiers, id)?;
        tiers.long.entry(expire_at).or_default().push(id.clone());
        tiers.long_len += 1;
        Ok(())
    }
}
