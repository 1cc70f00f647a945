//! Thread Management
//!
//! A thread is the unit of scheduling:
//! - Unique id, assigned monotonically at creation
//! - Priority level (0-149, higher = more urgent)
//! - Burst-time estimate driving the SJF queue
//! - State (ready, running, blocked, zombie)
//!
//! Threads are cooperative: a thread keeps the CPU until it yields, blocks,
//! or finishes. A finishing thread cannot free itself, because its stack is
//! still the active stack; it becomes a zombie that the *next* thread to run
//! buries.

/// Thread ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u32);

impl ThreadId {
    /// Get raw value
    pub fn value(&self) -> u32 {
        self.0
    }
}

/// Highest priority a thread can reach (aging clamps here)
pub const MAX_PRIORITY: u32 = 149;

/// Thread state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    /// Created but never enqueued
    JustCreated,
    /// On a ready queue, waiting for the CPU
    Ready,
    /// Currently holding the CPU
    Running,
    /// Waiting on some event, not schedulable
    Blocked,
    /// Finished, awaiting burial by the next thread to run
    Zombie,
}

/// Opaque user address space attached to a thread
///
/// The scheduler saves and restores it around a context switch without
/// knowing anything about its contents.
pub trait AddressSpace: std::fmt::Debug {
    fn save_state(&mut self);
    fn restore_state(&mut self);
}

/// Thread structure
#[derive(Debug)]
pub struct Thread {
    id: ThreadId,
    name: String,
    status: ThreadStatus,
    /// Priority (0-149); determines the ready queue band
    priority: u32,
    /// Estimated CPU ticks until the next voluntary block
    burst_time: u64,
    /// Ticks spent waiting since the last enqueue or aging promotion
    waiting_time: u64,
    /// Tick at which the thread last became ready
    ready_since: u64,
    /// Tick at which the current burst started
    start_burst: u64,
    space: Option<Box<dyn AddressSpace>>,
}

impl Thread {
    /// Create a new thread in the `JustCreated` state
    pub fn new(id: ThreadId, name: impl Into<String>, priority: u32, burst_time: u64) -> Self {
        assert!(priority <= MAX_PRIORITY, "priority {priority} out of range");
        Self {
            id,
            name: name.into(),
            status: ThreadStatus::JustCreated,
            priority,
            burst_time,
            waiting_time: 0,
            ready_since: 0,
            start_burst: 0,
            space: None,
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ThreadStatus {
        self.status
    }

    pub fn set_status(&mut self, status: ThreadStatus) {
        self.status = status;
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// Set the priority; aging only ever raises it
    pub fn set_priority(&mut self, priority: u32) {
        assert!(priority <= MAX_PRIORITY, "priority {priority} out of range");
        self.priority = priority;
    }

    pub fn burst_time(&self) -> u64 {
        self.burst_time
    }

    /// Fold the ticks actually executed into the burst estimate as an
    /// exponential average with smoothing factor 0.5
    pub fn update_burst_estimate(&mut self, actual: u64) {
        self.burst_time = (self.burst_time + actual) / 2;
    }

    pub fn waiting_time(&self) -> u64 {
        self.waiting_time
    }

    pub fn add_waiting_time(&mut self, ticks: u64) {
        self.waiting_time += ticks;
    }

    pub fn consume_waiting_time(&mut self, ticks: u64) {
        self.waiting_time -= ticks;
    }

    pub fn ready_since(&self) -> u64 {
        self.ready_since
    }

    /// Enqueue-time bookkeeping: ready status, fresh stamp, zeroed wait
    pub fn mark_ready(&mut self, now: u64) {
        self.status = ThreadStatus::Ready;
        self.ready_since = now;
        self.waiting_time = 0;
    }

    /// Reset the ready stamp without touching the accumulated wait
    pub fn stamp_ready(&mut self, now: u64) {
        self.ready_since = now;
    }

    pub fn start_burst(&self) -> u64 {
        self.start_burst
    }

    pub fn set_start_burst(&mut self, now: u64) {
        self.start_burst = now;
    }

    /// Attach a user address space
    pub fn set_space(&mut self, space: Box<dyn AddressSpace>) {
        self.space = Some(space);
    }

    pub fn save_user_state(&mut self) {
        if let Some(space) = &mut self.space {
            space.save_state();
        }
    }

    pub fn restore_user_state(&mut self) {
        if let Some(space) = &mut self.space {
            space.restore_state();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_thread_state() {
        let thread = Thread::new(ThreadId(3), "worker", 120, 50);
        assert_eq!(thread.id().value(), 3);
        assert_eq!(thread.status(), ThreadStatus::JustCreated);
        assert_eq!(thread.priority(), 120);
        assert_eq!(thread.burst_time(), 50);
    }

    #[test]
    fn test_mark_ready_resets_wait() {
        let mut thread = Thread::new(ThreadId(1), "t", 10, 0);
        thread.add_waiting_time(400);
        thread.mark_ready(7000);
        assert_eq!(thread.status(), ThreadStatus::Ready);
        assert_eq!(thread.ready_since(), 7000);
        assert_eq!(thread.waiting_time(), 0);
    }

    #[test]
    fn test_burst_estimate_halves_toward_actual() {
        let mut thread = Thread::new(ThreadId(1), "t", 10, 100);
        thread.update_burst_estimate(20);
        assert_eq!(thread.burst_time(), 60);
        thread.update_burst_estimate(20);
        assert_eq!(thread.burst_time(), 40);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_priority_bound() {
        Thread::new(ThreadId(1), "t", 150, 0);
    }
}
