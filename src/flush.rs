use std::{fmt, path::PathBuf, time::Duration};

/// Default number of processed orders that forces a flush.
pub const DEFAULT_FLUSH_COUNT: u64 = 40_000;
/// Default time since the last commit that forces a flush.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// When in-memory book and trade state must be made durable.
///
/// Whichever limit is exceeded first triggers the flush, bounding both memory
/// growth and how much work a crash can lose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    pub max_orders: u64,
    pub max_interval: Duration,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            max_orders: DEFAULT_FLUSH_COUNT,
            max_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

/// Work done since the last successful commit.
#[derive(Debug, Clone, Copy)]
pub struct FlushState {
    processed_since_flush: u64,
    last_flush_nanos: u64,
}

impl FlushState {
    pub fn new(now_nanos: u64) -> Self {
        Self {
            processed_since_flush: 0,
            last_flush_nanos: now_nanos,
        }
    }

    pub fn record_order(&mut self) {
        self.processed_since_flush += 1;
    }

    pub fn processed(&self) -> u64 {
        self.processed_since_flush
    }

    pub fn elapsed(&self, now_nanos: u64) -> Duration {
        Duration::from_nanos(now_nanos.saturating_sub(self.last_flush_nanos))
    }

    pub fn is_due(&self, policy: &FlushPolicy, now_nanos: u64) -> bool {
        self.processed_since_flush > policy.max_orders || self.elapsed(now_nanos) > policy.max_interval
    }

    /// Called only after a commit went through.
    pub fn reset(&mut self, now_nanos: u64) {
        self.processed_since_flush = 0;
        self.last_flush_nanos = now_nanos;
    }
}

/// What one flush made durable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushSummary {
    pub orders: u64,
    pub trades: usize,
    pub book_writes: usize,
    pub elapsed: Duration,
    pub artifact: Option<PathBuf>,
}

impl FlushSummary {
    pub fn orders_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.orders as f64 / secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for FlushSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "orders: {:<8} trades: {:<8} book writes: {:<8} time: {:.2}s orders/sec: {:.0}",
            self.orders,
            self.trades,
            self.book_writes,
            self.elapsed.as_secs_f64(),
            self.orders_per_sec()
        )
    }
}
