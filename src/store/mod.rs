// ============================================================================
// In-memory Expiry Store
// ============================================================================
//
// Entity store with a change feed. Every mutation is published to all live
// subscribers while the store lock is held, so each subscriber observes
// changes in commit order. Delivery waits on bounded channels: a slow
// subscriber throttles writers.
//
// ============================================================================

pub mod sweeper;

pub use sweeper::{ExpirySweeper, spawn_expiry_sweeper};

use crate::core::{ChangeEvent, Entity, EntityId, NewEntity, Result};
use crate::feed::{ChannelFeed, FeedSender};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{Level, event};

/// Batched write used by the load generator.
#[async_trait]
pub trait BulkInsert: Send + Sync {
    /// Inserts one batch as a single write.
    async fn insert_batch(&self, batch: Vec<NewEntity>) -> Result<usize>;
}

#[async_trait]
impl<T: BulkInsert + ?Sized> BulkInsert for std::sync::Arc<T> {
    async fn insert_batch(&self, batch: Vec<NewEntity>) -> Result<usize> {
        (**self).insert_batch(batch).await
    }
}

#[derive(Default)]
struct StoreInner {
    entities: HashMap<EntityId, Entity>,
    subscribers: Vec<FeedSender>,
}

impl StoreInner {
    async fn publish(&mut self, change: ChangeEvent) {
        let mut closed = Vec::new();
        for (idx, subscriber) in self.subscribers.iter().enumerate() {
            if subscriber.send(change.clone()).await.is_err() {
                closed.push(idx);
            }
        }
        for idx in closed.into_iter().rev() {
            self.subscribers.swap_remove(idx);
            event!(Level::DEBUG, "dropped closed change feed subscriber");
        }
    }

    fn commit_insert(&mut self, new_entity: NewEntity) -> Entity {
        let entity = Entity {
            id: EntityId::generate(),
            value: new_entity.value,
            expire_at: new_entity.expire_at,
        };
        self.entities.insert(entity.id.clone(), entity.clone());
        entity
    }
}

pub struct ExpiryStore {
    inner: Mutex<StoreInner>,
    feed_capacity: usize,
}

impl ExpiryStore {
    pub fn new(feed_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            feed_capacity: feed_capacity.max(1),
        }
    }

    /// Opens a change feed that sees every change committed after this call.
    pub async fn subscribe(&self) -> ChannelFeed {
        let (sender, feed) = ChannelFeed::channel(self.feed_capacity);
        self.inner.lock().await.subscribers.push(sender);
        feed
    }

    pub async fn insert(&self, new_entity: NewEntity) -> Result<Entity> {
        let mut inner = self.inner.lock().await;
        let entity = inner.commit_insert(new_entity);
        inner.publish(ChangeEvent::insert(entity.clone())).await;
        Ok(entity)
    }

    pub async fn insert_many(&self, batch: Vec<NewEntity>) -> Result<Vec<EntityId>> {
        let mut inner = self.inner.lock().await;
        let mut ids = Vec::with_capacity(batch.len());
        for new_entity in batch {
            let entity = inner.commit_insert(new_entity);
            ids.push(entity.id.clone());
            inner.publish(ChangeEvent::insert(entity)).await;
        }
        Ok(ids)
    }

    pub async fn get(&self, id: &EntityId) -> Option<Entity> {
        self.inner.lock().await.entities.get(id).cloned()
    }

    /// Removes an entity, publishing its pre-image. Returns `None` if absent.
    pub async fn delete(&self, id: &EntityId) -> Result<Option<Entity>> {
        let mut inner = self.inner.lock().await;
        let Some(removed) = inner.entities.remove(id) else {
            return Ok(None);
        };
        inner.publish(ChangeEvent::delete(removed.clone())).await;
        Ok(Some(removed))
    }

    /// Removes every entity whose `expire_at` is at or before `now`, oldest
    /// expiry first. Entities without an expiry are never swept.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        let mut expired: Vec<(DateTime<Utc>, EntityId)> = inner
            .entities
            .values()
            .filter(|entity| entity.is_expired_at(now))
            .filter_map(|entity| entity.expire_at.map(|at| (at, entity.id.clone())))
            .collect();
        expired.sort();

        let removed = expired.len();
        for (_, id) in expired {
            if let Some(entity) = inner.entities.remove(&id) {
                inner.publish(ChangeEvent::delete(entity)).await;
            }
        }
        Ok(removed)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entities.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn subscriber_count(&self) -> usize {
        self.inner.lock().await.subscribers.len()
    }
}

#[async_trait]
impl BulkInsert for ExpiryStore {
    async fn insert_batch(&self, batch: Vec<NewEntity>) -> Result<usize> {
        Ok(self.insert_many(batch).await?.len())
    }
}
