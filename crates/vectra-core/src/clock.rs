//! Injectable time source used by the coordination layer to compute commit
//! timestamps and evaluate bounded-staleness HEAD reads without binding the
//! rest of the workspace to the wall clock.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub type Millis = i64;

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> Millis;
}

/// The real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Millis {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_millis() as Millis
    }
}

/// A clock pinned to a fixed instant. Useful for deterministic tests of
/// commit-timestamp computation and HEAD staleness.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Millis);

impl Clock for FixedClock {
    fn now_ms(&self) -> Millis {
        self.0
    }
}

/// Wraps another clock and adds a fixed offset, useful for simulating clock
/// skew between readers and writers in tests.
pub struct OffsetClock<C: Clock> {
    inner: C,
    offset_ms: Millis,
}

impl<C: Clock> OffsetClock<C> {
    pub fn new(inner: C, offset_ms: Millis) -> Self {
        Self { inner, offset_ms }
    }
}

impl<C: Clock> Clock for OffsetClock<C> {
    fn now_ms(&self) -> Millis {
        self.inner.now_ms() + self.offset_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_is_stable() {
        let c = FixedClock(1000);
        assert_eq!(c.now_ms(), 1000);
        assert_eq!(c.now_ms(), 1000);
    }

    #[test]
    fn offset_clock_adds_offset() {
        let c = OffsetClock::new(FixedClock(1000), 250);
        assert_eq!(c.now_ms(), 1250);
    }

    #[test]
    fn system_clock_is_monotonic_enough() {
        let c = SystemClock;
        let a = c.now_ms();
        let b = c.now_ms();
        assert!(b >= a);
    }
}
