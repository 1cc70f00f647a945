//! Tick Clock
//!
//! The simulator's unit of virtual time. The kernel advances the clock
//! explicitly; there is no wall-clock coupling.

/// Simulated tick counter
#[derive(Debug)]
pub struct Timer {
    ticks: u64,
}

impl Timer {
    pub fn new() -> Self {
        Self { ticks: 0 }
    }

    /// Ticks since boot
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Advance virtual time by `n` ticks
    pub fn advance(&mut self, n: u64) {
        self.ticks = self.ticks.wrapping_add(n);
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
