//! Per-operation latency counters owned by the engine.

use std::{
    collections::BTreeMap,
    fmt,
    time::{Duration, Instant},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpStats {
    pub calls: u64,
    pub total: Duration,
    pub max: Duration,
}

impl OpStats {
    pub fn mean(&self) -> Duration {
        if self.calls == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos((self.total.as_nanos() / self.calls as u128) as u64)
        }
    }
}

#[derive(Debug, Default)]
pub struct Stats {
    ops: BTreeMap<&'static str, OpStats>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, op: &'static str, took: Duration) {
        let entry = self.ops.entry(op).or_default();
        entry.calls += 1;
        entry.total += took;
        entry.max = entry.max.max(took);
    }

    /// Run `f`, charging its wall time to `op`.
    pub fn time<T>(&mut self, op: &'static str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.record(op, start.elapsed());
        out
    }

    pub fn get(&self, op: &str) -> Option<&OpStats> {
        self.ops.get(op)
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (op, s) in &self.ops {
            writeln!(
                f,
                "{:<16} calls: {:<10} mean: {:>10?} max: {:>10?}",
                op,
                s.calls,
                s.mean(),
                s.max
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_calls_and_max() {
        let mut stats = Stats::new();
        stats.record("match", Duration::from_micros(4));
        stats.record("match", Duration::from_micros(2));
        let s = stats.get("match").unwrap();
        assert_eq!(s.calls, 2);
        assert_eq!(s.max, Duration::from_micros(4));
        assert_eq!(s.mean(), Duration::from_micros(3));
        assert!(stats.get("flush").is_none());
    }

    #[test]
    fn mean_survives_call_counts_past_u32() {
        let s = OpStats {
            calls: 1 << 32,
            total: Duration::from_secs(1 << 32),
            max: Duration::from_secs(1),
        };
        assert_eq!(s.mean(), Duration::from_secs(1));

        let s = OpStats {
            calls: (1 << 32) + 2,
            total: Duration::from_secs((1 << 32) + 2),
            max: Duration::from_secs(1),
        };
        assert_eq!(s.mean(), Duration::from_secs(1));
    }

    #[test]
    fn time_passes_result_through() {
        let mut stats = Stats::new();
        let v = stats.time("flush", || 41 + 1);
        assert_eq!(v, 42);
        assert_eq!(stats.get("flush").unwrap().calls, 1);
    }
}
