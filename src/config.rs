use crate::core::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Nominal workload unit recorded on every computation log record.
pub const DEFAULT_NO_OF_OBJECTS: u64 = 1000;
pub const DEFAULT_SUB_MINUTE_THRESHOLD_MS: i64 = 60_000;
pub const DEFAULT_SHORT_THRESHOLD_MS: i64 = 300_000;
pub const DEFAULT_LOAD_BATCH_SIZE: usize = 200_000;

/// What the deletion auditor does with the accumulator when a record write fails.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccumulatorResetPolicy {
    /// Reset after every deletion, even if a record write failed. The failed
    /// batch's cost is dropped but the accumulator never drifts.
    #[default]
    Always,
    /// Reset only when both records were written. A failed batch's cost rolls
    /// into the next computation log record.
    OnSuccess,
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Batch-size constant written as `no_of_objects` on computation log records
    pub no_of_objects: u64,

    /// Upper bound (inclusive) of the sub-minute tier
    pub sub_minute_threshold_ms: i64,

    /// Upper bound (inclusive) of the short tier
    pub short_threshold_ms: i64,

    /// Accumulator behavior on sink failure
    pub reset_policy: AccumulatorResetPolicy,

    /// Capacity of the bounded change-feed channel
    pub feed_capacity: usize,

    /// fsync the JSON-lines audit files after every append
    pub audit_sync_data: bool,

    pub store: StoreConfig,

    pub load: LoadGenConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            no_of_objects: DEFAULT_NO_OF_OBJECTS,
            sub_minute_threshold_ms: DEFAULT_SUB_MINUTE_THRESHOLD_MS,
            short_threshold_ms: DEFAULT_SHORT_THRESHOLD_MS,
            reset_policy: AccumulatorResetPolicy::default(),
            feed_capacity: 1024,
            audit_sync_data: false,
            store: StoreConfig::default(),
            load: LoadGenConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the batch-size constant
    pub fn no_of_objects(mut self, no_of_objects: u64) -> Self {
        self.no_of_objects = no_of_objects;
        self
    }

    /// Set tier boundaries in milliseconds
    pub fn thresholds(mut self, sub_minute_ms: i64, short_ms: i64) -> Self {
        self.sub_minute_threshold_ms = sub_minute_ms;
        self.short_threshold_ms = short_ms;
        self
    }

    /// Set the accumulator reset policy
    pub fn reset_policy(mut self, policy: AccumulatorResetPolicy) -> Self {
        self.reset_policy = policy;
        self
    }

    /// Set the change-feed channel capacity
    pub fn feed_capacity(mut self, capacity: usize) -> Self {
        self.feed_capacity = capacity;
        self
    }

    /// Sync audit files to disk after every append
    pub fn audit_sync_data(mut self, sync_data: bool) -> Self {
        self.audit_sync_data = sync_data;
        self
    }

    pub fn load(mut self, load: LoadGenConfig) -> Self {
        self.load = load;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.sub_minute_threshold_ms <= 0 {
            return Err(PipelineError::InvalidConfig(
                "sub_minute_threshold_ms must be positive".to_string(),
            ));
        }
        if self.short_threshold_ms <= self.sub_minute_threshold_ms {
            return Err(PipelineError::InvalidConfig(format!(
                "short_threshold_ms ({}) must exceed sub_minute_threshold_ms ({})",
                self.short_threshold_ms, self.sub_minute_threshold_ms
            )));
        }
        if self.feed_capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "feed_capacity must be at least 1".to_string(),
            ));
        }
        self.store.validate()?;
        self.load.validate()
    }

    /// Load and validate a JSON config file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let payload = std::fs::read_to_string(path.as_ref()).map_err(|err| {
            PipelineError::IoError(format!("{}: {}", path.as_ref().display(), err))
        })?;
        let config: Self = serde_json::from_str(&payload)?;
        config.validate()?;
        Ok(config)
    }
}

/// In-memory store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Interval of the background expiry sweep
    pub sweep_interval_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 60_000,
        }
    }
}

impl StoreConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(10))
    }

    fn validate(&self) -> Result<()> {
        if self.sweep_interval_ms == 0 {
            return Err(PipelineError::InvalidConfig(
                "store.sweep_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Synthetic load generator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadGenConfig {
    /// Maximum entities per bulk insert
    pub batch_size: usize,

    /// Lower bound (inclusive) of the random TTL
    pub min_ttl_ms: u64,

    /// Upper bound (exclusive) of the random TTL
    pub max_ttl_ms: u64,

    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for LoadGenConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_LOAD_BATCH_SIZE,
            min_ttl_ms: 10 * 60_000,
            max_ttl_ms: 20 * 60_000,
            seed: None,
        }
    }
}

impl LoadGenConfig {
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn ttl_range_ms(mut self, min_ttl_ms: u64, max_ttl_ms: u64) -> Self {
        self.min_ttl_ms = min_ttl_ms;
        self.max_ttl_ms = max_ttl_ms;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "load.batch_size must be at least 1".to_string(),
            ));
        }
        if self.max_ttl_ms <= self.min_ttl_ms {
            return Err(PipelineError::InvalidConfig(format!(
                "load.max_ttl_ms ({}) must exceed load.min_ttl_ms ({})",
                self.max_ttl_ms, self.min_ttl_ms
            )));
        }
        Ok(())
    }
}
