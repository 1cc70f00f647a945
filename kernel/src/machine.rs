//! Machine Interface
//!
//! The simulator's stand-ins for the machine-dependent primitives: the
//! interrupt level the scheduler asserts on entry, and the context-switch
//! routine that hands the CPU from one thread to the next.

use crate::sys::thread::ThreadId;
use std::sync::{Arc, Mutex};

/// Interrupt enable state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntStatus {
    /// Interrupts enabled
    On,
    /// Interrupts disabled
    Off,
}

/// The simulated interrupt flag.
///
/// Scheduler entry points require interrupts off; on a uniprocessor that is
/// the mutual exclusion. Locks cannot be used inside the scheduler, since
/// waiting for one would re-enter dispatch.
#[derive(Debug)]
pub struct Interrupt {
    level: IntStatus,
}

impl Interrupt {
    pub fn new() -> Self {
        Self {
            level: IntStatus::On,
        }
    }

    /// Set the interrupt level, returning the previous one
    pub fn set_level(&mut self, level: IntStatus) -> IntStatus {
        std::mem::replace(&mut self.level, level)
    }

    pub fn level(&self) -> IntStatus {
        self.level
    }

    pub fn is_off(&self) -> bool {
        self.level == IntStatus::Off
    }

    /// Fatal unless interrupts are disabled
    pub fn assert_off(&self) {
        assert!(self.is_off(), "scheduler entered with interrupts enabled");
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

/// Context switch between two threads
///
/// Saves the state of the currently running thread and resumes the thread
/// being switched to. Called with interrupts disabled; control continues at
/// the instruction after the switch on the resumed thread.
pub trait ContextSwitch {
    fn switch(&mut self, old: ThreadId, next: ThreadId);
}

/// Shared record of the switches a [`TraceSwitch`] performed
pub type SwitchLog = Arc<Mutex<Vec<(ThreadId, ThreadId)>>>;

/// Simulated switch primitive that records each handoff
pub struct TraceSwitch {
    log: SwitchLog,
}

impl TraceSwitch {
    /// Create the switch primitive together with a handle onto its log
    pub fn new() -> (Self, SwitchLog) {
        let log: SwitchLog = Arc::new(Mutex::new(Vec::new()));
        (Self { log: log.clone() }, log)
    }
}

impl ContextSwitch for TraceSwitch {
    fn switch(&mut self, old: ThreadId, next: ThreadId) {
        tracing::trace!(target: "sched", "switching from thread {} to thread {}", old.value(), next.value());
        if let Ok(mut log) = self.log.lock() {
            log.push((old, next));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_level_returns_old() {
        let mut intr = Interrupt::new();
        assert_eq!(intr.set_level(IntStatus::Off), IntStatus::On);
        assert!(intr.is_off());
        assert_eq!(intr.set_level(IntStatus::On), IntStatus::Off);
    }

    #[test]
    #[should_panic(expected = "interrupts enabled")]
    fn test_assert_off_panics_when_enabled() {
        Interrupt::new().assert_off();
    }

    #[test]
    fn test_trace_switch_records() {
        let (mut switch, log) = TraceSwitch::new();
        switch.switch(ThreadId(0), ThreadId(1));
        switch.switch(ThreadId(1), ThreadId(2));
        assert_eq!(*log.lock().unwrap(), vec![
            (ThreadId(0), ThreadId(1)),
            (ThreadId(1), ThreadId(2)),
        ]);
    }
}
