//! Configuration read once by [`OneWireSystem::begin`](crate::OneWireSystem::begin)
//! and by the bus-master setup.

use serde::{Deserialize, Serialize};

/// Number of multiplexed 1-Wire channels on the board.
pub const ONEWIRE_CHANNELS: usize = 4;

/// Default capacity of the dispatcher queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Power-on code of every DS2484 port parameter.
pub const DEFAULT_TIMING_CODE: u8 = 0x06;

/// 4-bit DS2484 port parameter codes applied to every channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortTiming {
    /// tRSTL
    pub reset_low: u8,
    /// tMSP
    pub presence_detect: u8,
    /// tW0L
    pub write_zero_low: u8,
    /// tREC0
    pub write_zero_recovery: u8,
    /// RWPU
    pub weak_pullup: u8,
}

impl Default for PortTiming {
    fn default() -> Self {
        Self {
            reset_low: DEFAULT_TIMING_CODE,
            presence_detect: DEFAULT_TIMING_CODE,
            write_zero_low: DEFAULT_TIMING_CODE,
            write_zero_recovery: DEFAULT_TIMING_CODE,
            weak_pullup: DEFAULT_TIMING_CODE,
        }
    }
}

/// Bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OneWireConfig {
    /// Enable flag per channel, channel 1 first.
    pub channels: [bool; ONEWIRE_CHANNELS],
    /// Run a full discovery during [`OneWireSystem::begin`](crate::OneWireSystem::begin).
    pub run_initial_scan: bool,
    /// Bus-master active pullup.
    pub active_pullup: bool,
    /// Bus-master strong pullup.
    pub strong_pullup: bool,
    /// Bus-master port timing.
    pub timing: PortTiming,
    /// Number of commands the dispatcher queue holds.
    pub queue_capacity: usize,
}

impl Default for OneWireConfig {
    fn default() -> Self {
        Self {
            channels: [true; ONEWIRE_CHANNELS],
            run_initial_scan: true,
            active_pullup: true,
            strong_pullup: false,
            timing: PortTiming::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl OneWireConfig {
    /// Enable or disable one channel. Channels are numbered from 1; other
    /// numbers are ignored.
    pub fn with_channel(mut self, channel: u8, enabled: bool) -> Self {
        if let Some(slot) = (channel as usize)
            .checked_sub(1)
            .and_then(|i| self.channels.get_mut(i))
        {
            *slot = enabled;
        }
        self
    }

    /// Set the startup discovery flag.
    pub fn with_initial_scan(mut self, run: bool) -> Self {
        self.run_initial_scan = run;
        self
    }

    /// Set the bus-master pullup mode.
    pub fn with_pullups(mut self, active: bool, strong: bool) -> Self {
        self.active_pullup = active;
        self.strong_pullup = strong;
        self
    }

    /// Set the bus-master port timing.
    pub fn with_timing(mut self, timing: PortTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Set the dispatcher queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Whether the 1-based `channel` is enabled.
    pub fn channel_enabled(&self, channel: u8) -> bool {
        (channel as usize)
            .checked_sub(1)
            .and_then(|i| self.channels.get(i))
            .copied()
            .unwrap_or(false)
    }
}
