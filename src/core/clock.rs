use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Source of time for the pipeline.
///
/// `now` is wall-clock time used for TTL and drift arithmetic. `instant` is a
/// monotonic reading used only to measure classification cost.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn instant(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug)]
struct ManualClockState {
    now: DateTime<Utc>,
    monotonic_offset: Duration,
}

/// Deterministic clock for tests and replays.
///
/// Wall time only moves through `set`/`advance`. When `auto_advance` is set,
/// every `instant()` read moves the monotonic reading forward by that step.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    auto_advance: Duration,
    state: Mutex<ManualClockState>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            base: Instant::now(),
            auto_advance: Duration::ZERO,
            state: Mutex::new(ManualClockState {
                now,
                monotonic_offset: Duration::ZERO,
            }),
        }
    }

    pub fn with_auto_advance(mut self, step: Duration) -> Self {
        self.auto_advance = step;
        self
    }

    pub fn set(&self, now: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap_or_else(|poison| poison.into_inner());
        state.now = now;
    }

    /// Moves wall time and the monotonic reading forward together.
    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock().unwrap_or_else(|poison| poison.into_inner());
        let delta = ChronoDuration::from_std(by).unwrap_or(ChronoDuration::MAX);
        state.now = state.now.checked_add_signed(delta).unwrap_or(state.now);
        state.monotonic_offset = state.monotonic_offset.saturating_add(by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner()).now
    }

    fn instant(&self) -> Instant {
        let mut state = self.state.lock().unwrap_or_else(|poison| poison.into_inner());
        let reading = self.base + state.monotonic_offset;
        state.monotonic_offset = state.monotonic_offset.saturating_add(self.auto_advance);
        reading
    }
}
