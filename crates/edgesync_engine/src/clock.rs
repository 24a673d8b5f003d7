//! Time source.
//!
//! The retry loop's sleep is the only blocking call in the engine. It goes
//! through [`Clock`] so tests can use [`ManualClock`] and observe sleeps
//! instead of waiting for them.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall-clock time in Unix seconds plus a blocking sleep.
pub trait Clock: Send + Sync {
    /// Current Unix time in seconds.
    fn now(&self) -> u64;

    /// Blocks for `secs` seconds.
    fn sleep(&self, secs: u64);
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    fn sleep(&self, secs: u64) {
        std::thread::sleep(Duration::from_secs(secs));
    }
}

/// A clock that only moves when told to. Sleeping advances it instantly.
///
/// Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
    sleeps: Arc<Mutex<Vec<u64>>>,
}

impl ManualClock {
    /// Creates a clock reading `now`.
    pub fn new(now: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(now)),
            sleeps: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sets the current time.
    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Moves time forward.
    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<u64> {
        self.sleeps.lock().clone()
    }

    /// Total seconds slept.
    pub fn total_slept(&self) -> u64 {
        self.sleeps.lock().iter().sum()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn sleep(&self, secs: u64) {
        self.sleeps.lock().push(secs);
        self.advance(secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_sleep_advances_time() {
        let clock = ManualClock::new(1_000);
        let shared = clock.clone();
        clock.sleep(6);
        clock.advance(4);

        assert_eq!(shared.now(), 1_010);
        assert_eq!(shared.sleeps(), vec![6]);
        assert_eq!(shared.total_slept(), 6);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now() > 1_577_836_800);
    }
}
