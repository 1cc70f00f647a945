//! Scheduler
//!
//! Multi-level feedback scheduler with priority aging:
//! - L1: shortest-job-first over burst estimates (priority 100-149)
//! - L2: non-preemptive priority order (priority 50-99)
//! - L3: round-robin FIFO (priority 0-49)
//!
//! # Scheduling Algorithm
//!
//! 1. Always dispatch from the highest non-empty queue (L1 > L2 > L3)
//! 2. Within L1, lowest burst estimate first; within L2, highest priority
//!    first; ties break toward the lower thread id
//! 3. Aging runs on the tick cadence and raises the priority of threads
//!    that have waited long enough, migrating them across queue bands
//!
//! These routines assume interrupts are already disabled; on a uniprocessor
//! that gives mutual exclusion. Locks cannot be used here, since blocking on
//! one would re-enter dispatch.
//!
//! Every queue transition emits a tagged event on the `sched` debug target:
//! `[A]` insert, `[B]` remove, `[C]` priority change, `[E]` dispatch.

use super::thread::{Thread, ThreadId, ThreadStatus, MAX_PRIORITY};
use crate::machine::Interrupt;
use crate::{KernelError, KernelResult};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::VecDeque;

/// Lowest priority admitted to L1
pub const L1_FLOOR: u32 = 100;

/// Lowest priority admitted to L2
pub const L2_FLOOR: u32 = 50;

/// Aging and cadence parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedPolicy {
    /// Ticks between aging passes
    pub aging_interval: u64,
    /// Accumulated waiting time that earns one promotion
    pub aging_threshold: u64,
    /// Priority increment per promotion
    pub aging_boost: u32,
    /// Priority ceiling
    pub priority_max: u32,
}

impl Default for SchedPolicy {
    fn default() -> Self {
        Self {
            aging_interval: 100,
            aging_threshold: 1500,
            aging_boost: 10,
            priority_max: MAX_PRIORITY,
        }
    }
}

impl SchedPolicy {
    /// Load a policy from a JSON file
    pub fn load(path: &std::path::Path) -> KernelResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| KernelError::InvalidConfig(e.to_string()))?;
        let policy: Self = serde_json::from_str(&content)
            .map_err(|e| KernelError::InvalidConfig(e.to_string()))?;
        policy.validate()?;
        Ok(policy)
    }

    /// Save the policy to a JSON file
    pub fn save(&self, path: &std::path::Path) -> KernelResult<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| KernelError::InvalidConfig(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| KernelError::InvalidConfig(e.to_string()))
    }

    /// Reject parameters the scheduler cannot run with
    pub fn validate(&self) -> KernelResult<()> {
        if self.aging_interval == 0 {
            return Err(KernelError::InvalidConfig(
                "aging_interval must be positive".into(),
            ));
        }
        if self.aging_boost == 0 {
            return Err(KernelError::InvalidConfig(
                "aging_boost must be positive".into(),
            ));
        }
        if self.priority_max > MAX_PRIORITY {
            return Err(KernelError::InvalidConfig(format!(
                "priority_max {} exceeds the hard ceiling {}",
                self.priority_max, MAX_PRIORITY
            )));
        }
        Ok(())
    }
}

/// The three ready-queue bands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueLevel {
    /// Shortest-job-first
    L1,
    /// Non-preemptive priority
    L2,
    /// Round-robin
    L3,
}

impl QueueLevel {
    /// The band a priority belongs to
    pub fn for_priority(priority: u32) -> Self {
        if priority >= L1_FLOOR {
            QueueLevel::L1
        } else if priority >= L2_FLOOR {
            QueueLevel::L2
        } else {
            QueueLevel::L3
        }
    }

    /// Queue number as it appears in event lines
    pub fn index(self) -> usize {
        match self {
            QueueLevel::L1 => 1,
            QueueLevel::L2 => 2,
            QueueLevel::L3 => 3,
        }
    }
}

/// Scheduler
pub struct Scheduler {
    /// Every live thread in the system, ready or not
    threads: Vec<Thread>,
    /// SJF queue, ascending (burst estimate, id)
    l1: Vec<ThreadId>,
    /// Priority queue, descending priority with ascending-id ties
    l2: Vec<ThreadId>,
    /// FIFO queue
    l3: VecDeque<ThreadId>,
    /// Finishing thread to be destroyed by the next thread that runs
    to_be_destroyed: Option<ThreadId>,
    policy: SchedPolicy,
}

impl Scheduler {
    /// Create a scheduler with no ready threads
    pub fn new(policy: SchedPolicy) -> Self {
        assert!(policy.aging_interval > 0, "aging cadence must be positive");
        Self {
            threads: Vec::new(),
            l1: Vec::new(),
            l2: Vec::new(),
            l3: VecDeque::new(),
            to_be_destroyed: None,
            policy,
        }
    }

    pub fn policy(&self) -> &SchedPolicy {
        &self.policy
    }

    /// Register a newly created thread with the system
    pub fn admit(&mut self, thread: Thread) {
        assert!(
            self.thread(thread.id()).is_none(),
            "thread id {} already admitted",
            thread.id().value()
        );
        self.threads.push(thread);
    }

    /// Whether the thread is still known to the system
    pub fn contains(&self, id: ThreadId) -> bool {
        self.thread(id).is_some()
    }

    /// Get thread by ID
    pub fn thread(&self, id: ThreadId) -> Option<&Thread> {
        self.threads.iter().find(|t| t.id() == id)
    }

    /// Get mutable thread by ID
    pub fn thread_mut(&mut self, id: ThreadId) -> Option<&mut Thread> {
        self.threads.iter_mut().find(|t| t.id() == id)
    }

    /// The queue currently holding `id`, if it is ready
    pub fn queue_of(&self, id: ThreadId) -> Option<QueueLevel> {
        if self.l1.contains(&id) {
            Some(QueueLevel::L1)
        } else if self.l2.contains(&id) {
            Some(QueueLevel::L2)
        } else if self.l3.contains(&id) {
            Some(QueueLevel::L3)
        } else {
            None
        }
    }

    /// Threads waiting on some ready queue
    pub fn num_ready(&self) -> usize {
        self.l1.len() + self.l2.len() + self.l3.len()
    }

    /// Mark a thread ready and enqueue it by priority band.
    ///
    /// The thread must be just-created, running, or blocked.
    pub fn ready_to_run(&mut self, intr: &Interrupt, now: u64, id: ThreadId) {
        intr.assert_off();
        let priority = {
            let thread = self.thread_mut(id).expect("readying an unknown thread");
            debug_assert!(
                matches!(
                    thread.status(),
                    ThreadStatus::JustCreated | ThreadStatus::Running | ThreadStatus::Blocked
                ),
                "thread {} cannot become ready from {:?}",
                id.value(),
                thread.status()
            );
            thread.mark_ready(now);
            thread.priority()
        };
        let level = QueueLevel::for_priority(priority);
        self.insert_queue(level, id);
        self.emit_inserted(now, id, level);
    }

    /// Dequeue and return the next thread to dispatch, or `None`.
    ///
    /// L1 wins over L2, L2 over L3; within a queue the head is the
    /// comparator's minimum.
    pub fn find_next_to_run(&mut self, intr: &Interrupt, now: u64) -> Option<ThreadId> {
        intr.assert_off();
        let (id, level) = if !self.l1.is_empty() {
            (self.l1.remove(0), QueueLevel::L1)
        } else if !self.l2.is_empty() {
            (self.l2.remove(0), QueueLevel::L2)
        } else if let Some(id) = self.l3.pop_front() {
            (id, QueueLevel::L3)
        } else {
            return None;
        };
        self.emit_removed(now, id, level);
        Some(id)
    }

    /// One aging pass over every ready thread.
    ///
    /// Each pass credits the cadence interval to the thread's waiting time;
    /// crossing the threshold spends it on a priority boost. A boost that
    /// crosses a band boundary migrates the thread into the higher queue;
    /// within a band, queue order stays as inserted.
    pub fn aging(&mut self, intr: &Interrupt, now: u64) {
        intr.assert_off();

        // L1 threads only accrue priority; there is no higher band
        for id in self.l1.clone() {
            self.age_thread(now, id);
        }

        let mut promoted = Vec::new();
        for id in self.l2.clone() {
            if self.age_thread(now, id) && self.priority_of(id) >= L1_FLOOR {
                promoted.push(id);
            }
        }
        for id in promoted {
            self.migrate(now, id, QueueLevel::L2, QueueLevel::L1);
        }

        let mut promoted = Vec::new();
        for id in self.l3.iter().copied().collect::<Vec<_>>() {
            if self.age_thread(now, id) && self.priority_of(id) >= L2_FLOOR {
                promoted.push(id);
            }
        }
        for id in promoted {
            self.migrate(now, id, QueueLevel::L3, QueueLevel::L2);
        }
    }

    /// Remember the finishing thread for burial by its successor
    pub fn defer_destroy(&mut self, id: ThreadId) {
        assert!(
            self.to_be_destroyed.is_none(),
            "a finishing thread is already awaiting destruction"
        );
        self.to_be_destroyed = Some(id);
    }

    /// Destroy a deferred zombie exactly once; a second call is a no-op.
    ///
    /// The zombie could not free itself earlier because its stack was still
    /// the active stack.
    pub fn check_to_be_destroyed(&mut self) {
        if let Some(id) = self.to_be_destroyed.take() {
            let index = self
                .threads
                .iter()
                .position(|t| t.id() == id)
                .expect("zombie vanished before burial");
            debug_assert_eq!(self.threads[index].status(), ThreadStatus::Zombie);
            let thread = self.threads.remove(index);
            tracing::debug!(target: "sched", "thread {} ({}) destroyed", id.value(), thread.name());
        }
    }

    /// Whether a finishing thread awaits destruction
    pub fn has_pending_destroy(&self) -> bool {
        self.to_be_destroyed.is_some()
    }

    // -- Internals ----------------------------------------------------------

    fn priority_of(&self, id: ThreadId) -> u32 {
        self.thread(id).expect("unknown thread").priority()
    }

    fn sjf_key(&self, id: ThreadId) -> (u64, u32) {
        let thread = self.thread(id).expect("unknown thread");
        (thread.burst_time(), id.value())
    }

    fn priority_key(&self, id: ThreadId) -> (Reverse<u32>, u32) {
        (Reverse(self.priority_of(id)), id.value())
    }

    fn insert_queue(&mut self, level: QueueLevel, id: ThreadId) {
        match level {
            QueueLevel::L1 => {
                let key = self.sjf_key(id);
                let pos = self
                    .l1
                    .iter()
                    .position(|&other| self.sjf_key(other) > key)
                    .unwrap_or(self.l1.len());
                self.l1.insert(pos, id);
            }
            QueueLevel::L2 => {
                let key = self.priority_key(id);
                let pos = self
                    .l2
                    .iter()
                    .position(|&other| self.priority_key(other) > key)
                    .unwrap_or(self.l2.len());
                self.l2.insert(pos, id);
            }
            QueueLevel::L3 => self.l3.push_back(id),
        }
    }

    /// Credit one cadence interval; returns whether a boost fired
    fn age_thread(&mut self, now: u64, id: ThreadId) -> bool {
        let interval = self.policy.aging_interval;
        let threshold = self.policy.aging_threshold;
        let boost = self.policy.aging_boost;
        let cap = self.policy.priority_max;

        let thread = self.thread_mut(id).expect("aging an unknown thread");
        thread.add_waiting_time(interval);
        if thread.waiting_time() < threshold {
            return false;
        }
        thread.consume_waiting_time(threshold);
        thread.stamp_ready(now);
        let old = thread.priority();
        let new = (old + boost).min(cap);
        thread.set_priority(new);
        if new != old {
            tracing::debug!(
                target: "sched",
                "[C] Tick [{}]: Thread [{}] changes its priority from [{}] to [{}]",
                now,
                id.value(),
                old,
                new
            );
        }
        true
    }

    fn migrate(&mut self, now: u64, id: ThreadId, from: QueueLevel, to: QueueLevel) {
        match from {
            QueueLevel::L1 => unreachable!("nothing migrates out of L1"),
            QueueLevel::L2 => {
                let pos = self
                    .l2
                    .iter()
                    .position(|&t| t == id)
                    .expect("migrating thread not in L2");
                self.l2.remove(pos);
            }
            QueueLevel::L3 => {
                let pos = self
                    .l3
                    .iter()
                    .position(|&t| t == id)
                    .expect("migrating thread not in L3");
                let _ = self.l3.remove(pos);
            }
        }
        self.emit_removed(now, id, from);
        self.insert_queue(to, id);
        self.emit_inserted(now, id, to);
    }

    fn emit_inserted(&self, now: u64, id: ThreadId, level: QueueLevel) {
        tracing::debug!(
            target: "sched",
            "[A] Tick [{}]: Thread [{}] is inserted into queue L[{}]",
            now,
            id.value(),
            level.index()
        );
    }

    fn emit_removed(&self, now: u64, id: ThreadId, level: QueueLevel) {
        tracing::debug!(
            target: "sched",
            "[B] Tick [{}]: Thread [{}] is removed from queue L[{}]",
            now,
            id.value(),
            level.index()
        );
    }
}
