//! Single-flight guards (§5)
//!
//! A named exclusion that lets at most one task run at a time and drops
//! rather than queues overlapping attempts. `detection`, `health`, and
//! `whale` each get one of these; `whale`'s additionally carries a 1 s
//! cooldown on top of the single-flight lock to bound spam-induced CPU.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

/// `tryAcquire`-with-immediate-drop-on-failure. Returns `None` if another
/// holder is active; otherwise a `GuardPermit` that releases on drop.
pub struct SingleFlightGuard {
    held: AtomicBool,
}

impl Default for SingleFlightGuard {
    fn default() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }
}

impl SingleFlightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<GuardPermit<'_>> {
        if self
            .held
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            Some(GuardPermit { guard: self })
        } else {
            None
        }
    }
}

pub struct GuardPermit<'a> {
    guard: &'a SingleFlightGuard,
}

impl Drop for GuardPermit<'_> {
    fn drop(&mut self) {
        self.guard.held.store(false, Ordering::SeqCst);
    }
}

/// Single-flight guard plus a minimum-interval cooldown between acquisitions,
/// used for the whale-triggered scan (1 s default).
pub struct CooldownGuard {
    inner: SingleFlightGuard,
    cooldown_ms: i64,
    last_acquired_at_ms: AtomicI64,
}

impl CooldownGuard {
    pub fn new(cooldown_ms: i64) -> Self {
        Self {
            inner: SingleFlightGuard::new(),
            cooldown_ms,
            last_acquired_at_ms: AtomicI64::new(i64::MIN),
        }
    }

    pub fn try_acquire(&self) -> Option<GuardPermit<'_>> {
        let now = crate::time::now_ms();
        let last = self.last_acquired_at_ms.load(Ordering::SeqCst);
        if now - last < self.cooldown_ms {
            return None;
        }
        let permit = self.inner.try_acquire()?;
        self.last_acquired_at_ms.store(now, Ordering::SeqCst);
        Some(permit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_concurrent_acquire_is_dropped() {
        let guard = SingleFlightGuard::new();
        let first = guard.try_acquire();
        assert!(first.is_some());
        assert!(guard.try_acquire().is_none());
        drop(first);
        assert!(guard.try_acquire().is_some());
    }

    #[test]
    fn cooldown_guard_rejects_within_window() {
        let guard = CooldownGuard::new(60_000);
        let first = guard.try_acquire();
        assert!(first.is_some());
        drop(first);
        // still within the 60s cooldown window
        assert!(guard.try_acquire().is_none());
    }

    #[test]
    fn cooldown_guard_allows_after_window() {
        let guard = CooldownGuard::new(0);
        let first = guard.try_acquire();
        assert!(first.is_some());
        drop(first);
        assert!(guard.try_acquire().is_some());
    }
}
