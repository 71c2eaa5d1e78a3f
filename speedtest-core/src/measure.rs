//! Time Sources
//!
//! The timing engine reads time through [`Clock`] so that calibration and
//! scoring can be exercised with a [`ManualClock`] that only moves when told.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source.
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary fixed origin
    fn now(&self) -> Duration;
}

// ─── SystemClock ─────────────────────────────────────────────────────────────

/// Wall clock backed by [`std::time::Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    #[inline(always)]
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

// ─── ManualClock ─────────────────────────────────────────────────────────────

/// Clock that advances only through [`ManualClock::advance`].
///
/// Clones share the same reading, so a benchmark closure can hold one clone
/// and move time forward while the engine reads another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

// ─── Timer ───────────────────────────────────────────────────────────────────

/// Measures one span on a clock
pub struct Timer<'a, C: Clock + ?Sized> {
    clock: &'a C,
    start: Duration,
}

impl<'a, C: Clock + ?Sized> Timer<'a, C> {
    /// Start a new timer
    #[inline(always)]
    pub fn start(clock: &'a C) -> Self {
        Self {
            start: clock.now(),
            clock,
        }
    }

    /// Elapsed time since [`Timer::start`]
    #[inline(always)]
    pub fn stop(&self) -> Duration {
        self.clock.now().saturating_sub(self.start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_elapsed() {
        let clock = SystemClock::new();
        let timer = Timer::start(&clock);
        std::thread::sleep(Duration::from_millis(10));
        let elapsed = timer.stop();

        // Should be at least 5ms
        assert!(elapsed >= Duration::from_millis(5));
    }

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new();
        let handle = clock.clone();
        let timer = Timer::start(&clock);

        handle.advance(Duration::from_millis(3));
        handle.advance(Duration::from_micros(500));

        assert_eq!(timer.stop(), Duration::from_micros(3_500));
        assert_eq!(clock.now(), Duration::from_micros(3_500));
    }
}
