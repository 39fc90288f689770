//! Millisecond clock used for commit timestamps, claim ages and GC cutoffs.
//!
//! The broker never reads the system time directly; it asks a [`Clock`]. The
//! system clock is monotonic per instance so commit timestamps never go
//! backwards even if the wall clock does, which keeps composite ids ordered.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of "now" in milliseconds since the Unix epoch
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall clock that never moves backwards
#[derive(Default)]
pub struct SystemClock {
    last: AtomicU64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        let physical = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        // fetch_max returns the previous value; keep whichever is larger
        let last = self.last.fetch_max(physical, Ordering::SeqCst);
        last.max(physical)
    }
}

/// Manually driven clock for deterministic tests and replays
#[derive(Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: u64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Clock that can be shared between the broker and its owner
pub type SharedClock = Arc<dyn Clock>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();

        let t1 = clock.now_ms();
        let t2 = clock.now_ms();
        let t3 = clock.now_ms();

        assert!(t1 <= t2);
        assert!(t2 <= t3);
        // 13 digits until the year 2286
        assert_eq!(t1.to_string().len(), 13);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);

        clock.advance(250);
        assert_eq!(clock.now_ms(), 1_250);

        clock.set(5);
        assert_eq!(clock.now_ms(), 5);
    }
}
