// ============================================================================
// Telemetry Accumulator
// ============================================================================
//
// Running sum of classification cost since the last deletion-triggered flush.
// Owned by the pipeline's dispatch loop; increments and the read-and-reset
// happen on the same serialized path, so no locking is needed.
//
// ============================================================================

use std::time::Duration;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TelemetryAccumulator {
    total_computation_time: Duration,
    samples: u64,
}

impl TelemetryAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one classification cost. Saturates instead of overflowing.
    pub fn record(&mut self, cost: Duration) {
        self.total_computation_time = self.total_computation_time.saturating_add(cost);
        self.samples = self.samples.saturating_add(1);
    }

    pub fn total(&self) -> Duration {
        self.total_computation_time
    }

    /// Number of costs recorded since the last reset.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Returns the accumulated total and resets to zero.
    pub fn take(&mut self) -> Duration {
        self.samples = 0;
        std::mem::take(&mut self.total_computation_time)
    }
}
