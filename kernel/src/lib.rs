//! SeedOS Kernel
//!
//! A teaching-grade operating system simulator:
//! - Cooperative kernel threads
//! - Three-level feedback scheduling with priority aging
//! - A persistent hierarchical file system (from `seedos-fs`)
//! - A per-process open-file table and numeric syscall surface
//!
//! # Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                        User programs                         |
//! |        Create / Open / Read / Write / Close / Halt           |
//! +------------------------------+-------------------------------+
//!                                | syscalls
//! +------------------------------v-------------------------------+
//! |                           Kernel                             |
//! |  +-------------+  +--------------+  +---------------------+  |
//! |  |  Scheduler  |  |  Tick clock  |  |  Open-file table    |  |
//! |  |  L1/L2/L3   |  |  + aging     |  |  (20 slots)         |  |
//! |  +-------------+  +--------------+  +---------------------+  |
//! |  +-------------------------+  +--------------------------+   |
//! |  |  File system            |  |  Machine interface       |   |
//! |  |  (seedos-fs)            |  |  (switch, interrupts)    |   |
//! |  +-------------------------+  +--------------------------+   |
//! +--------------------------------------------------------------+
//! ```
//!
//! The kernel is an explicit context value handed to every operation, not a
//! global. The machine-dependent pieces (context switch, sector device) sit
//! behind traits so the simulator can stand in for them.

pub mod filetable;
pub mod machine;
pub mod sys;
pub mod timer;

pub use filetable::{FileTable, OpenFileId, OPEN_FILE_SLOTS};
pub use machine::{ContextSwitch, IntStatus, Interrupt, SwitchLog, TraceSwitch};
pub use sys::scheduler::{QueueLevel, SchedPolicy, Scheduler};
pub use sys::thread::{AddressSpace, Thread, ThreadId, ThreadStatus};
pub use timer::Timer;

use seedos_fs::{FsError, FileSystem};
use thiserror::Error;

/// Kernel version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Kernel name
pub const NAME: &str = "SeedOS";

/// Kernel result type
pub type KernelResult<T> = Result<T, KernelError>;

/// Kernel error types
#[derive(Debug, Error)]
pub enum KernelError {
    /// Per-process open-file table is full
    #[error("open-file table is full")]
    SlotExhausted,

    /// Open-file id out of range or not bound
    #[error("invalid open-file id {0}")]
    InvalidFileId(i32),

    /// No file system has been mounted
    #[error("no file system mounted")]
    NoFileSystem,

    /// Scheduler policy file missing or malformed
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// File-system operation failed
    #[error(transparent)]
    Fs(#[from] FsError),
}

/// The kernel context: scheduler, clock, machine interface, and per-process
/// state, threaded explicitly through every operation.
pub struct Kernel {
    interrupt: Interrupt,
    timer: Timer,
    machine: Box<dyn ContextSwitch>,
    scheduler: Scheduler,
    /// The thread currently holding the CPU
    current: ThreadId,
    next_tid: u32,
    pub(crate) file_system: Option<FileSystem>,
    pub(crate) file_table: FileTable,
    pub(crate) halted: bool,
}

impl Kernel {
    /// Boot a kernel. The calling context becomes the `main` thread,
    /// running at the lowest priority.
    pub fn new(policy: SchedPolicy, machine: Box<dyn ContextSwitch>) -> Self {
        let mut scheduler = Scheduler::new(policy);
        let main_id = ThreadId(0);
        let mut main = Thread::new(main_id, "main", 0, 0);
        main.set_status(ThreadStatus::Running);
        scheduler.admit(main);

        tracing::info!("{} v{} booted", NAME, VERSION);
        Self {
            interrupt: Interrupt::new(),
            timer: Timer::new(),
            machine,
            scheduler,
            current: main_id,
            next_tid: 1,
            file_system: None,
            file_table: FileTable::new(),
            halted: false,
        }
    }

    /// Attach a file system to the kernel
    pub fn mount_file_system(&mut self, fs: FileSystem) {
        self.file_system = Some(fs);
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    /// Id of the thread currently holding the CPU
    pub fn current_thread(&self) -> ThreadId {
        self.current
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    /// Attach a user address space to a thread; the dispatcher saves and
    /// restores it around every context switch
    pub fn attach_space(&mut self, id: ThreadId, space: Box<dyn AddressSpace>) {
        self.scheduler
            .thread_mut(id)
            .expect("attaching a space to an unknown thread")
            .set_space(space);
    }

    /// Create a thread; it stays `JustCreated` until [`Kernel::ready_to_run`]
    pub fn spawn_thread(
        &mut self,
        name: impl Into<String>,
        priority: u32,
        burst_time: u64,
    ) -> ThreadId {
        let id = ThreadId(self.next_tid);
        self.next_tid += 1;
        let thread = Thread::new(id, name, priority, burst_time);
        tracing::debug!(target: "sched", "created thread {} ({})", id.value(), thread.name());
        self.scheduler.admit(thread);
        id
    }

    /// Hand a thread to the scheduler
    pub fn ready_to_run(&mut self, id: ThreadId) {
        let old_level = self.interrupt.set_level(IntStatus::Off);
        self.scheduler
            .ready_to_run(&self.interrupt, self.timer.ticks(), id);
        self.interrupt.set_level(old_level);
    }

    /// Voluntarily give up the CPU.
    ///
    /// The current thread's burst estimate is refreshed from the ticks it
    /// actually ran, it is re-enqueued, and the scheduler's pick (made
    /// before the re-enqueue) takes over. With no other ready thread, the
    /// current one simply keeps running.
    pub fn yield_now(&mut self) {
        let old_level = self.interrupt.set_level(IntStatus::Off);
        let now = self.timer.ticks();
        if let Some(next) = self.scheduler.find_next_to_run(&self.interrupt, now) {
            let id = self.current;
            {
                let thread = self
                    .scheduler
                    .thread_mut(id)
                    .expect("current thread vanished");
                let executed = now.saturating_sub(thread.start_burst());
                thread.update_burst_estimate(executed);
            }
            self.scheduler.ready_to_run(&self.interrupt, now, id);
            self.run(next, false);
        }
        self.interrupt.set_level(old_level);
    }

    /// Block the current thread and dispatch a successor.
    ///
    /// Someone else is responsible for readying the blocked thread again; a
    /// kernel with nothing left to run is wedged, which is fatal here.
    pub fn block_current(&mut self) {
        let old_level = self.interrupt.set_level(IntStatus::Off);
        let now = self.timer.ticks();
        self.scheduler
            .thread_mut(self.current)
            .expect("current thread vanished")
            .set_status(ThreadStatus::Blocked);
        let next = self
            .scheduler
            .find_next_to_run(&self.interrupt, now)
            .expect("blocking with no ready thread to take over");
        self.run(next, false);
        self.interrupt.set_level(old_level);
    }

    /// Finish the current thread.
    ///
    /// The thread becomes a zombie and the successor buries it; its memory
    /// cannot be reclaimed here because this stack is still live.
    pub fn finish_current(&mut self) {
        let old_level = self.interrupt.set_level(IntStatus::Off);
        let now = self.timer.ticks();
        let id = self.current;
        tracing::debug!(target: "sched", "thread {} finishing", id.value());
        self.scheduler
            .thread_mut(id)
            .expect("current thread vanished")
            .set_status(ThreadStatus::Zombie);
        let next = self
            .scheduler
            .find_next_to_run(&self.interrupt, now)
            .expect("finishing with no ready thread to take over");
        self.run(next, true);
        self.interrupt.set_level(old_level);
    }

    /// Dispatch the CPU to `next`.
    ///
    /// The current thread's status must already be ready, blocked, or
    /// zombie. With `finishing`, the old thread is remembered for
    /// destruction once its stack is no longer live.
    pub fn run(&mut self, next: ThreadId, finishing: bool) {
        self.interrupt.assert_off();
        let now = self.timer.ticks();
        let old = self.current;

        if finishing {
            self.scheduler.defer_destroy(old);
        }
        if let Some(thread) = self.scheduler.thread_mut(old) {
            debug_assert_ne!(
                thread.status(),
                ThreadStatus::Running,
                "caller must park the old thread before dispatching"
            );
            thread.save_user_state();
        }

        let executed = self
            .scheduler
            .thread(old)
            .map(|t| now.saturating_sub(t.start_burst()))
            .unwrap_or(0);
        tracing::debug!(
            target: "sched",
            "[E] Tick [{}]: Thread [{}] is now selected for execution, thread [{}] is replaced, and it has executed [{}] ticks",
            now,
            next.value(),
            old.value(),
            executed
        );

        {
            let thread = self
                .scheduler
                .thread_mut(next)
                .expect("dispatching an unknown thread");
            thread.set_status(ThreadStatus::Running);
            thread.set_start_burst(now);
        }
        self.current = next;
        self.machine.switch(old, next);

        // Past the switch we are on the successor's stack. Its first duties:
        // restamp the burst, bury any zombie, restore user state.
        if let Some(thread) = self.scheduler.thread_mut(self.current) {
            thread.set_start_burst(now);
        }
        self.scheduler.check_to_be_destroyed();
        if let Some(thread) = self.scheduler.thread_mut(self.current) {
            thread.restore_user_state();
        }
    }

    /// Advance virtual time, firing the aging pass on its cadence.
    ///
    /// The handler runs with interrupts disabled, as the real tick
    /// interrupt would.
    pub fn advance_time(&mut self, mut ticks: u64) {
        let interval = self.scheduler.policy().aging_interval;
        while ticks > 0 {
            let until_boundary = interval - (self.timer.ticks() % interval);
            let step = until_boundary.min(ticks);
            self.timer.advance(step);
            ticks -= step;
            if self.timer.ticks() % interval == 0 {
                let old_level = self.interrupt.set_level(IntStatus::Off);
                self.scheduler.aging(&self.interrupt, self.timer.ticks());
                self.interrupt.set_level(old_level);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernel() -> (Kernel, SwitchLog) {
        let (switch, log) = TraceSwitch::new();
        (Kernel::new(SchedPolicy::default(), Box::new(switch)), log)
    }

    #[test]
    fn test_boot_state() {
        let (kernel, _) = kernel();
        assert_eq!(kernel.current_thread(), ThreadId(0));
        assert_eq!(kernel.scheduler().num_ready(), 0);
        assert!(!kernel.halted());
    }

    #[test]
    fn test_yield_dispatches_highest_queue() {
        let (mut kernel, log) = kernel();
        let t1 = kernel.spawn_thread("t1", 40, 10);
        let t2 = kernel.spawn_thread("t2", 60, 10);
        let t3 = kernel.spawn_thread("t3", 120, 10);
        kernel.ready_to_run(t1);
        kernel.ready_to_run(t2);
        kernel.ready_to_run(t3);

        kernel.yield_now();
        assert_eq!(kernel.current_thread(), t3);
        assert_eq!(*log.lock().unwrap(), vec![(ThreadId(0), t3)]);

        // The dispatched thread is running and off every queue
        let sched = kernel.scheduler();
        assert_eq!(sched.thread(t3).unwrap().status(), ThreadStatus::Running);
        assert_eq!(sched.queue_of(t3), None);
        assert_eq!(sched.thread(ThreadId(0)).unwrap().status(), ThreadStatus::Ready);
    }

    #[test]
    fn test_yield_with_empty_queues_keeps_running() {
        let (mut kernel, log) = kernel();
        kernel.yield_now();
        assert_eq!(kernel.current_thread(), ThreadId(0));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_yield_updates_burst_estimate() {
        let (mut kernel, _) = kernel();
        let t = kernel.spawn_thread("t", 120, 10);
        kernel.ready_to_run(t);

        kernel.advance_time(40);
        kernel.yield_now();
        // main ran 40 ticks with estimate 0: new estimate (0 + 40) / 2
        assert_eq!(
            kernel.scheduler().thread(ThreadId(0)).unwrap().burst_time(),
            20
        );
    }

    #[test]
    fn test_finishing_handoff_destroys_exactly_once() {
        let (mut kernel, log) = kernel();
        let a = kernel.spawn_thread("a", 120, 5);
        let b = kernel.spawn_thread("b", 110, 5);
        kernel.ready_to_run(a);
        kernel.yield_now();
        assert_eq!(kernel.current_thread(), a);

        kernel.ready_to_run(b);
        kernel.finish_current();

        // B took over and buried A on its first code path after the switch
        assert_eq!(kernel.current_thread(), b);
        assert!(!kernel.scheduler().contains(a));
        assert!(!kernel.scheduler().has_pending_destroy());
        assert_eq!(
            *log.lock().unwrap(),
            vec![(ThreadId(0), a), (a, b)]
        );
    }

    #[test]
    fn test_block_then_ready_again() {
        let (mut kernel, _) = kernel();
        let t = kernel.spawn_thread("t", 80, 0);
        kernel.ready_to_run(t);
        kernel.yield_now();
        assert_eq!(kernel.current_thread(), t);

        kernel.block_current();
        // main (the only ready thread) takes over
        assert_eq!(kernel.current_thread(), ThreadId(0));
        assert_eq!(
            kernel.scheduler().thread(t).unwrap().status(),
            ThreadStatus::Blocked
        );

        kernel.ready_to_run(t);
        kernel.yield_now();
        assert_eq!(kernel.current_thread(), t);
    }

    #[test]
    fn test_user_state_saved_and_restored_across_dispatch() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        #[derive(Debug)]
        struct CountingSpace {
            saves: Arc<AtomicU32>,
            restores: Arc<AtomicU32>,
        }
        impl AddressSpace for CountingSpace {
            fn save_state(&mut self) {
                self.saves.fetch_add(1, Ordering::SeqCst);
            }
            fn restore_state(&mut self) {
                self.restores.fetch_add(1, Ordering::SeqCst);
            }
        }

        let (mut kernel, _) = kernel();
        let saves = Arc::new(AtomicU32::new(0));
        let restores = Arc::new(AtomicU32::new(0));
        let t = kernel.spawn_thread("user", 120, 0);
        kernel.attach_space(
            t,
            Box::new(CountingSpace {
                saves: saves.clone(),
                restores: restores.clone(),
            }),
        );
        kernel.ready_to_run(t);

        // main -> t: t's space is restored as it takes the CPU
        kernel.yield_now();
        assert_eq!(kernel.current_thread(), t);
        assert_eq!(restores.load(Ordering::SeqCst), 1);
        assert_eq!(saves.load(Ordering::SeqCst), 0);

        // t -> main: t's space is saved on the way out
        kernel.yield_now();
        assert_eq!(kernel.current_thread(), ThreadId(0));
        assert_eq!(saves.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_aging_cadence_via_advance_time() {
        let (mut kernel, _) = kernel();
        let t = kernel.spawn_thread("t", 45, 0);
        kernel.ready_to_run(t);

        kernel.advance_time(1500);
        assert_eq!(kernel.scheduler().thread(t).unwrap().priority(), 55);
        assert_eq!(kernel.scheduler().queue_of(t), Some(QueueLevel::L2));

        kernel.advance_time(1500);
        assert_eq!(kernel.scheduler().thread(t).unwrap().priority(), 65);

        kernel.advance_time(12000);
        assert_eq!(kernel.scheduler().thread(t).unwrap().priority(), 145);
        assert_eq!(kernel.scheduler().queue_of(t), Some(QueueLevel::L1));
    }

    #[test]
    fn test_advance_time_in_odd_steps_hits_every_boundary() {
        let (mut kernel, _) = kernel();
        let t = kernel.spawn_thread("t", 45, 0);
        kernel.ready_to_run(t);

        // 1500 ticks in ragged chunks still lands 15 aging passes
        for step in [37, 263, 100, 600, 450, 50] {
            kernel.advance_time(step);
        }
        assert_eq!(kernel.timer().ticks(), 1500);
        assert_eq!(kernel.scheduler().thread(t).unwrap().priority(), 55);
    }

    #[test]
    fn test_running_thread_does_not_age() {
        let (mut kernel, _) = kernel();
        let t = kernel.spawn_thread("t", 45, 0);
        kernel.ready_to_run(t);
        kernel.yield_now();
        assert_eq!(kernel.current_thread(), t);

        kernel.advance_time(3000);
        // t holds the CPU; only the ready main thread aged
        assert_eq!(kernel.scheduler().thread(t).unwrap().priority(), 45);
        assert_eq!(kernel.scheduler().thread(ThreadId(0)).unwrap().priority(), 20);
    }
}
