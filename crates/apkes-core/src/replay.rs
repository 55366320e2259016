//! Per-neighbor anti-replay window.
//!
//! `spec.md` treats the replay window as opaque state "used by value": the
//! engine owns a window per neighbor and calls into it to admit or reject a
//! frame counter, without the window knowing anything about frame content.
//! This is a standard sliding bitmap over a 32-bit counter, the same shape
//! IEEE 802.15.4 security uses for its frame counter.

const WINDOW_BITS: u32 = 32;

/// Sliding-window anti-replay check over a monotonically-intended counter.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplayWindow {
    highest: u32,
    seen: u32,
    initialized: bool,
}

impl ReplayWindow {
    /// A fresh window that has not yet observed any counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether `counter` is fresh and, if so, record it.
    ///
    /// Returns `true` if the counter was accepted (not previously seen and
    /// not too far behind the window), `false` if it must be treated as a
    /// replay.
    pub fn accept(&mut self, counter: u32) -> bool {
        if !self.initialized {
            self.initialized = true;
            self.highest = counter;
            self.seen = 1;
            return true;
        }

        if counter > self.highest {
            let shift = counter - self.highest;
            self.seen = if shift >= WINDOW_BITS {
                1
            } else {
                (self.seen << shift) | 1
            };
            self.highest = counter;
            return true;
        }

        let age = self.highest - counter;
        if age >= WINDOW_BITS {
            return false;
        }
        let bit = 1u32 << age;
        if self.seen & bit != 0 {
            return false;
        }
        self.seen |= bit;
        true
    }
}
