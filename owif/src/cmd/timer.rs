/// One-shot delay measured against a caller-supplied millisecond clock.
///
/// The default timer has no delay and is expired at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timer {
    delay_ms: u32,
    started_ms: u64,
}

impl Timer {
    /// A timer of `delay_ms` started at `now_ms`.
    pub const fn new(delay_ms: u32, now_ms: u64) -> Self {
        Self {
            delay_ms,
            started_ms: now_ms,
        }
    }

    /// Restart with the same delay.
    pub fn reset(&mut self, now_ms: u64) {
        self.started_ms = now_ms;
    }

    /// Restart with a new delay.
    pub fn rearm(&mut self, delay_ms: u32, now_ms: u64) {
        self.delay_ms = delay_ms;
        self.started_ms = now_ms;
    }

    /// Whether `delay_ms` has passed since the last start.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.started_ms) >= u64::from(self.delay_ms)
    }

    /// The configured delay.
    pub fn delay_ms(&self) -> u32 {
        self.delay_ms
    }
}
