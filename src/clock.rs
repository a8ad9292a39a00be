//! Nanosecond time sources for trade timestamps, artifact names and flush timing.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// A strictly increasing nanosecond clock.
///
/// Two consecutive calls never return the same value, so every trade and
/// every published artifact gets a distinct timestamp.
pub trait Clock: Send + Sync {
    fn now_nanos(&self) -> u64;
}

/// Wall-clock time since the Unix epoch that never steps backwards.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicU64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now_nanos(&self) -> u64 {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = wall.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

/// A clock that only moves when told to (plus one tick per reading).
///
/// Replaying the same order stream against a `ManualClock` started at the
/// same instant reproduces the same trade tape byte for byte.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn starting_at(nanos: u64) -> Self {
        Self {
            now: AtomicU64::new(nanos),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_nanos() as u64, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_nanos(&self) -> u64 {
        self.now.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_strictly_increasing() {
        let clock = SystemClock::new();
        let mut last = clock.now_nanos();
        for _ in 0..1000 {
            let now = clock.now_nanos();
            assert!(now > last);
            last = now;
        }
    }

    #[test]
    fn manual_clock_ticks_and_advances() {
        let clock = ManualClock::starting_at(10);
        assert_eq!(clock.now_nanos(), 10);
        assert_eq!(clock.now_nanos(), 11);
        clock.advance(Duration::from_nanos(100));
        assert_eq!(clock.now_nanos(), 112);
    }
}
