use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Store-assigned identifier of a TTL-bearing entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn generate() -> Self {
        Self(new_record_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

/// Entity payload before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEntity {
    pub value: String,
    pub expire_at: Option<DateTime<Utc>>,
}

impl NewEntity {
    pub fn new(value: impl Into<String>, expire_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expire_at: Some(expire_at),
        }
    }
}

/// A stored entity. `expire_at` is optional at the storage level; the
/// pipeline treats a missing value as a malformed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub value: String,
    pub expire_at: Option<DateTime<Utc>>,
}

impl Entity {
    pub fn new(id: EntityId, value: impl Into<String>, expire_at: DateTime<Utc>) -> Self {
        Self {
            id,
            value: value.into(),
            expire_at: Some(expire_at),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expire_at.is_some_and(|expire_at| expire_at <= now)
    }
}

/// A single change observed on the entity store, in commit order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// Entity created; carries the post-image.
    Insert {
        id: EntityId,
        post_image: Option<Entity>,
    },
    /// Entity removed; carries the pre-image.
    Delete {
        id: EntityId,
        pre_image: Option<Entity>,
    },
    /// Any other change kind (update, replace, drop, ...). Ignored by the pipeline.
    Other {
        operation: String,
        id: Option<EntityId>,
    },
}

impl ChangeEvent {
    pub fn insert(entity: Entity) -> Self {
        Self::Insert {
            id: entity.id.clone(),
            post_image: Some(entity),
        }
    }

    pub fn delete(entity: Entity) -> Self {
        Self::Delete {
            id: entity.id.clone(),
            pre_image: Some(entity),
        }
    }

    pub fn operation(&self) -> &str {
        match self {
            ChangeEvent::Insert { .. } => "insert",
            ChangeEvent::Delete { .. } => "delete",
            ChangeEvent::Other { operation, .. } => operation,
        }
    }

    pub fn entity_id(&self) -> Option<&EntityId> {
        match self {
            ChangeEvent::Insert { id, .. } | ChangeEvent::Delete { id, .. } => Some(id),
            ChangeEvent::Other { id, .. } => id.as_ref(),
        }
    }
}

/// One record per observed deletion. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletionAuditRecord {
    pub record_id: String,
    pub deleted_entity_id: EntityId,
    pub declared_expire_at: DateTime<Utc>,
    pub deletion_time: DateTime<Utc>,
    /// `deletion_time - declared_expire_at` in milliseconds. Positive means the
    /// deletion lagged the declared expiry.
    pub deletion_time_diff_ms: i64,
}

impl DeletionAuditRecord {
    pub fn new(
        deleted_entity_id: EntityId,
        declared_expire_at: DateTime<Utc>,
        deletion_time: DateTime<Utc>,
    ) -> Self {
        Self {
            record_id: new_record_id(),
            deleted_entity_id,
            declared_expire_at,
            deletion_time,
            deletion_time_diff_ms: (deletion_time - declared_expire_at).num_milliseconds(),
        }
    }
}

/// Classification cost flushed alongside each deletion audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputationLogRecord {
    pub record_id: String,
    pub no_of_objects: u64,
    /// Written as fractional milliseconds.
    #[serde(with = "millis_f64")]
    pub computation_time: Duration,
    pub recorded_at: DateTime<Utc>,
}

impl ComputationLogRecord {
    pub fn new(no_of_objects: u64, computation_time: Duration, recorded_at: DateTime<Utc>) -> Self {
        Self {
            record_id: new_record_id(),
            no_of_objects,
            computation_time,
            recorded_at,
        }
    }

    pub fn computation_time_ms(&self) -> f64 {
        millis_f64::to_millis(self.computation_time)
    }
}

mod millis_f64 {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::time::Duration;

    pub fn to_millis(duration: Duration) -> f64 {
        duration.as_nanos() as f64 / 1_000_000.0
    }

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(to_millis(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = f64::deserialize(deserializer)?;
        if !millis.is_finite() || millis < 0.0 {
            return Err(de::Error::custom(format!(
                "computation time must be a non-negative number of milliseconds, got {}",
                millis
            )));
        }
        Ok(Duration::from_nanos((millis * 1_000_000.0).round() as u64))
    }
}
