/*
 * Scheduler Core
 *
 * Preemptive priority scheduler for a single CPU. All scheduler state
 * (the thread arena, the list of live threads, the ready structures, the
 * policy singletons and the semaphore/lock tables) lives in one context
 * struct behind a global spin mutex, accessed through the
 * `with_scheduler`/`with_scheduler_mut` helpers.
 *
 * Every mutation of queue membership or thread status happens with
 * interrupts disabled, and the global mutex is never held across a context
 * switch: `schedule` makes its decision under the lock, releases it, and
 * only then asks the platform to switch. The thread that receives the CPU
 * finishes the hand-off in `finish_switch` (the schedule_tail step), which
 * marks bookkeeping for the outgoing thread and frees it if it was dying.
 *
 * The timer tick is the only interrupt-context entry point. It does the
 * minimum (usage counters, pending-update flags, a yield request on slice
 * expiry, waking the MLFQ service thread) and leaves all heavy work to
 * service threads.
 */

pub mod mlfq;
pub mod policy;
pub mod process;
pub mod thread;

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use spin::Mutex;

use crate::config::{
    NICE_MAX, NICE_MIN, PRI_MAX, PRI_MIN, SchedPolicy, TIME_SLICE, TIMER_FREQ,
    DONATION_DEPTH_MAX,
};
use crate::intr;
use crate::platform::{self, SpawnError};
use crate::sync::lock::{Lock, LockState};
use crate::sync::semaphore::{SemaState, Semaphore};
use crate::utils::fixed_point::Fixed;

use mlfq::PendingUpdates;
use policy::ReadyQueues;
use process::ChildProcess;

pub use thread::{Thread, ThreadFlags, ThreadStats, ThreadStatus, Tid};

pub(crate) struct Scheduler {
    /// TCB storage. Membership in the kernel is tracked by `all_list`;
    /// a dying thread's storage outlives its membership until the next
    /// thread runs `finish_switch`.
    pub(crate) threads: BTreeMap<Tid, Thread>,
    /// Every live thread.
    pub(crate) all_list: Vec<Tid>,
    pub(crate) ready: ReadyQueues,
    pub(crate) running: Tid,
    /// Outgoing side of an in-flight context switch, consumed by
    /// `finish_switch` in the incoming thread.
    pub(crate) pending_prev: Option<Tid>,

    pub(crate) initial_thread: Tid,
    pub(crate) idle_thread: Tid,
    pub(crate) wakeup_thread: Option<Tid>,
    pub(crate) mlfqs_thread: Option<Tid>,

    pub(crate) load_avg: Fixed,
    pub(crate) pending: PendingUpdates,

    pub(crate) idle_ticks: u64,
    pub(crate) kernel_ticks: u64,
    pub(crate) user_ticks: u64,
    /// Ticks the running thread has held the CPU this slice.
    pub(crate) thread_ticks: u32,

    pub(crate) sems: BTreeMap<u32, SemaState>,
    pub(crate) next_sema: u32,
    pub(crate) locks: BTreeMap<u32, LockState>,
    pub(crate) next_lock: u32,
}

impl Scheduler {
    pub(crate) fn current(&self) -> Tid {
        self.running
    }

    pub(crate) fn policy(&self) -> SchedPolicy {
        self.ready.policy()
    }

    pub(crate) fn tcb(&self, tid: Tid) -> &Thread {
        let thread = self.threads.get(&tid).expect("no TCB for thread");
        debug_assert!(thread.is_thread());
        thread
    }

    pub(crate) fn tcb_mut(&mut self, tid: Tid) -> &mut Thread {
        let thread = self.threads.get_mut(&tid).expect("no TCB for thread");
        debug_assert!(thread.is_thread());
        thread
    }

    // -- semaphore / lock tables ------------------------------------------

    pub(crate) fn sema_alloc(&mut self, value: u32) -> Semaphore {
        let id = self.next_sema;
        self.next_sema += 1;
        self.sems.insert(
            id,
            SemaState {
                value,
                waiters: Vec::new(),
            },
        );
        Semaphore(id)
    }

    pub(crate) fn sema_free(&mut self, sema: Semaphore) {
        if let Some(state) = self.sems.remove(&sema.0) {
            debug_assert!(state.waiters.is_empty(), "destroying a semaphore with waiters");
        }
    }

    pub(crate) fn sema_state_mut(&mut self, sema: Semaphore) -> &mut SemaState {
        self.sems.get_mut(&sema.0).expect("stale semaphore handle")
    }

    pub(crate) fn lock_alloc(&mut self, sema: Semaphore) -> Lock {
        let id = self.next_lock;
        self.next_lock += 1;
        self.locks.insert(id, LockState { sema, holder: None });
        Lock(id)
    }

    pub(crate) fn lock_free(&mut self, lock: Lock) {
        if let Some(state) = self.locks.remove(&lock.0) {
            debug_assert!(state.holder.is_none(), "destroying a held lock");
            self.sema_free(state.sema);
        }
    }

    pub(crate) fn lock_state(&self, lock: Lock) -> &LockState {
        self.locks.get(&lock.0).expect("stale lock handle")
    }

    pub(crate) fn lock_state_mut(&mut self, lock: Lock) -> &mut LockState {
        self.locks.get_mut(&lock.0).expect("stale lock handle")
    }

    // -- ready structures -------------------------------------------------

    pub(crate) fn ready_insert(&mut self, tid: Tid) {
        let Scheduler { ready, threads, .. } = self;
        ready.insert(tid, threads);
    }

    pub(crate) fn ready_remove(&mut self, tid: Tid) {
        let effective = self.tcb(tid).effective_priority;
        self.ready.remove(tid, effective);
    }

    fn next_thread_to_run(&mut self) -> Tid {
        self.ready.pop_highest().unwrap_or(self.idle_thread)
    }

    pub(crate) fn ready_top_priority(&self) -> Option<i32> {
        self.ready.top().map(|tid| self.tcb(tid).effective_priority)
    }

    /// Move a blocked thread into the ready structures. Does not preempt;
    /// callers that need preemption yield explicitly or request a
    /// yield-on-return.
    pub(crate) fn unblock(&mut self, tid: Tid) {
        debug_assert!(!intr::enabled());
        debug_assert_eq!(self.tcb(tid).status, ThreadStatus::Blocked);
        self.ready_insert(tid);
        self.tcb_mut(tid).status = ThreadStatus::Ready;
    }

    // -- priorities -------------------------------------------------------

    /// Set a thread's effective priority, repositioning it in the ready
    /// structures when queued.
    pub(crate) fn set_effective(&mut self, tid: Tid, priority: i32) {
        if self.tcb(tid).status == ThreadStatus::Ready {
            self.ready_remove(tid);
            self.tcb_mut(tid).effective_priority = priority;
            self.ready_insert(tid);
        } else {
            self.tcb_mut(tid).effective_priority = priority;
        }
    }

    /// Donate `priority` along the chain of lock holders starting at
    /// `donee`, to a bounded depth.
    pub(crate) fn donate(&mut self, donee: Tid, priority: i32) {
        let mut target = donee;
        for _ in 0..DONATION_DEPTH_MAX {
            if self.tcb(target).effective_priority < priority {
                self.set_effective(target, priority);
            }
            match self
                .tcb(target)
                .wait_lock
                .and_then(|lock| self.lock_state(lock).holder)
            {
                Some(holder) if holder != target => target = holder,
                _ => break,
            }
        }
    }

    /// Is `tid` subject to MLFQ accounting? The idle thread and the
    /// service threads are not.
    pub(crate) fn mlfq_eligible(&self, tid: Tid) -> bool {
        !self.tcb(tid).flags.contains(ThreadFlags::SERVICE)
    }
}

static SCHEDULER: Mutex<Option<Scheduler>> = Mutex::new(None);

pub(crate) fn with_scheduler_mut<R>(f: impl FnOnce(&mut Scheduler) -> R) -> R {
    let mut guard = SCHEDULER.lock();
    f(guard.as_mut().expect("scheduler not initialized"))
}

pub(crate) fn with_scheduler<R>(f: impl FnOnce(&Scheduler) -> R) -> R {
    let guard = SCHEDULER.lock();
    f(guard.as_ref().expect("scheduler not initialized"))
}

/// Install a fresh scheduler context with the calling execution context as
/// the initial thread.
pub(crate) fn init(policy: SchedPolicy, initial: Tid) {
    let mut scheduler = Scheduler {
        threads: BTreeMap::new(),
        all_list: Vec::new(),
        ready: ReadyQueues::new(policy),
        running: initial,
        pending_prev: None,
        initial_thread: initial,
        idle_thread: initial, // placeholder until the idle thread exists
        wakeup_thread: None,
        mlfqs_thread: None,
        load_avg: Fixed::ZERO,
        pending: PendingUpdates::empty(),
        idle_ticks: 0,
        kernel_ticks: 0,
        user_ticks: 0,
        thread_ticks: 0,
        sems: BTreeMap::new(),
        next_sema: 0,
        locks: BTreeMap::new(),
        next_lock: 0,
    };

    let child_wait = scheduler.sema_alloc(0);
    let priority = match policy {
        SchedPolicy::Priority => crate::config::PRI_DEFAULT,
        // A fresh thread with zero recent_cpu and default nice computes to
        // the top of the band.
        SchedPolicy::Mlfq => PRI_MAX,
    };
    let mut main = Thread::new(
        initial,
        "main",
        priority,
        ThreadFlags::empty(),
        child_wait,
        None,
    );
    main.status = ThreadStatus::Running;
    scheduler.threads.insert(initial, main);
    scheduler.all_list.push(initial);

    *SCHEDULER.lock() = Some(scheduler);
}

/// The running thread's tid.
pub fn current_tid() -> Tid {
    with_scheduler(|s| s.current())
}

/// Spawn a kernel thread.
///
/// The new thread enters the ready structures immediately; when it
/// outranks the caller the CPU is handed over before `spawn` returns. A
/// record of the child is added to the caller's process state so it can be
/// waited on.
pub fn spawn<F>(name: &str, priority: i32, f: F) -> Result<Tid, SpawnError>
where
    F: FnOnce() + Send + 'static,
{
    spawn_flagged(name, priority, ThreadFlags::empty(), f)
}

pub(crate) fn spawn_flagged<F>(
    name: &str,
    priority: i32,
    flags: ThreadFlags,
    f: F,
) -> Result<Tid, SpawnError>
where
    F: FnOnce() + Send + 'static,
{
    let tid = thread::allocate_tid();
    platform::get().register(tid, Box::new(move || thread_entry(f)))?;

    let old = intr::disable();
    let preempt = with_scheduler_mut(|s| {
        let creator = s.current();
        let child_wait = s.sema_alloc(0);
        let mut thread = Thread::new(
            tid,
            name,
            priority.clamp(PRI_MIN, PRI_MAX),
            flags,
            child_wait,
            Some(creator),
        );
        if s.policy() == SchedPolicy::Mlfq && !flags.contains(ThreadFlags::SERVICE) {
            // MLFQ ignores the requested priority: the thread inherits its
            // creator's accounting and computes from there.
            let parent = s.tcb(creator);
            thread.nice = parent.nice;
            thread.recent_cpu = parent.recent_cpu;
            let priority = mlfq::priority_for(thread.recent_cpu, thread.nice);
            thread.base_priority = priority;
            thread.effective_priority = priority;
        }
        let effective = thread.effective_priority;

        if !flags.contains(ThreadFlags::SERVICE) {
            s.tcb_mut(creator).children.push(ChildProcess::new(tid));
        }
        s.threads.insert(tid, thread);
        s.all_list.push(tid);
        s.ready_insert(tid);

        effective > s.tcb(creator).effective_priority && creator != s.idle_thread
    });
    intr::set_level(old);

    log::info!("created thread '{}' ({})", name, tid);
    if preempt {
        yield_now();
    }
    Ok(tid)
}

/// First code run by every spawned thread: complete the hand-off that
/// scheduled us, enable interrupts, run the thread function, and exit.
fn thread_entry<F: FnOnce()>(f: F) {
    finish_switch();
    intr::enable();
    f();
    process::exit(0);
}

/// Block the running thread. Interrupts must be off; the thread does not
/// run again until someone passes it to `unblock`.
pub fn block_current() {
    debug_assert!(!intr::enabled());
    debug_assert!(!intr::in_handler());
    with_scheduler_mut(|s| {
        let current = s.current();
        s.tcb_mut(current).status = ThreadStatus::Blocked;
    });
    schedule();
}

/// Move a blocked thread back to ready. Interrupts must be off.
pub(crate) fn unblock(tid: Tid) {
    with_scheduler_mut(|s| s.unblock(tid));
}

/// Yield the CPU, keeping the caller runnable.
pub fn yield_now() {
    debug_assert!(!intr::in_handler());
    let old = intr::disable();
    with_scheduler_mut(|s| {
        let current = s.current();
        if current != s.idle_thread {
            s.ready_insert(current);
        }
        s.tcb_mut(current).status = ThreadStatus::Ready;
    });
    schedule();
    intr::set_level(old);
}

/// Remove the running thread from the kernel and switch away for good.
pub(crate) fn exit_current() -> ! {
    debug_assert!(!intr::in_handler());
    intr::disable();
    with_scheduler_mut(|s| {
        let current = s.current();
        debug_assert!(current != s.idle_thread, "the idle thread cannot exit");
        s.all_list.retain(|&t| t != current);
        s.tcb_mut(current).status = ThreadStatus::Dying;
    });
    schedule();
    unreachable!("a dying thread was rescheduled");
}

enum HandOff {
    Stay,
    Switch,
    Retire,
}

/// Pick the next thread and hand the CPU over. Interrupts must be off and
/// the running thread's status must already have been changed.
fn schedule() {
    debug_assert!(!intr::enabled());
    let (prev, next, hand_off) = with_scheduler_mut(|s| {
        let prev = s.running;
        debug_assert!(s.tcb(prev).status != ThreadStatus::Running);
        let next = s.next_thread_to_run();
        s.tcb_mut(next).status = ThreadStatus::Running;
        s.running = next;
        s.thread_ticks = 0;
        debug_assert!(s.pending_prev.is_none());
        s.pending_prev = Some(prev);
        let hand_off = if prev == next {
            HandOff::Stay
        } else if s.tcb(prev).status == ThreadStatus::Dying {
            HandOff::Retire
        } else {
            HandOff::Switch
        };
        (prev, next, hand_off)
    });
    match hand_off {
        HandOff::Stay => finish_switch(),
        HandOff::Switch => {
            platform::get().switch(prev, next);
            // We are back on the CPU: complete whatever switch resumed us.
            finish_switch();
        }
        HandOff::Retire => platform::get().retire(prev, next),
    }
}

/// The schedule_tail step, run by the thread that just received the CPU:
/// activate its address space and free the previous thread if it was
/// dying (the initial thread's TCB is never freed).
pub(crate) fn finish_switch() {
    debug_assert!(!intr::enabled());
    let reaped = with_scheduler_mut(|s| {
        let prev = s.pending_prev.take()?;
        if prev == s.running {
            return None;
        }
        // The hosted address space needs no activation; a bare-metal
        // platform would load the incoming page directory here.
        if s.tcb(prev).status == ThreadStatus::Dying && prev != s.initial_thread {
            let thread = s.threads.remove(&prev).expect("dying thread lost its TCB");
            s.sema_free(thread.child_wait);
            Some(prev)
        } else {
            None
        }
    });
    if let Some(tid) = reaped {
        platform::get().reap(tid);
        log::debug!("reaped {}", tid);
    }
}

/// Timer tick entry, called from the interrupt path once per tick.
pub(crate) fn tick(now: i64) {
    debug_assert!(intr::in_handler());
    with_scheduler_mut(|s| {
        let current = s.current();
        let mlfqs = s.policy() == SchedPolicy::Mlfq;

        if mlfqs && s.mlfq_eligible(current) {
            let thread = s.tcb_mut(current);
            thread.recent_cpu = thread.recent_cpu.add_int(1);
        }

        if current == s.idle_thread {
            s.idle_ticks += 1;
        } else if s.tcb(current).pagedir.is_some() {
            s.user_ticks += 1;
        } else {
            s.kernel_ticks += 1;
        }

        if now % TIMER_FREQ == 0 {
            s.pending |= PendingUpdates::RECENT_CPU;
        }

        s.thread_ticks += 1;
        if s.thread_ticks >= TIME_SLICE {
            s.pending |= PendingUpdates::PRIORITIES;
            intr::request_yield_on_return();
        }

        if mlfqs && !s.pending.is_empty() {
            if let Some(helper) = s.mlfqs_thread {
                if s.tcb(helper).status == ThreadStatus::Blocked {
                    s.unblock(helper);
                    intr::request_yield_on_return();
                }
            }
        }
    });
}

/// Unblock the alarm service thread if it is parked. Called from the
/// timer interrupt when the earliest sleep deadline has passed.
pub(crate) fn wake_alarm_service() {
    with_scheduler_mut(|s| {
        if let Some(wakeup) = s.wakeup_thread {
            if s.tcb(wakeup).status == ThreadStatus::Blocked {
                s.unblock(wakeup);
                intr::request_yield_on_return();
            }
        }
    });
}

/// Set the running thread's base priority, clamped to the priority band.
///
/// Donations keep the effective priority from dropping below what donors
/// lend; when the change leaves the caller outranked by the ready front,
/// the CPU yields. Inert under MLFQ, where the formula owns priorities.
pub fn set_priority(priority: i32) {
    let priority = priority.clamp(PRI_MIN, PRI_MAX);
    let old = intr::disable();
    let should_yield = with_scheduler_mut(|s| {
        if s.policy() == SchedPolicy::Mlfq {
            return false;
        }
        let current = s.current();
        let thread = s.tcb_mut(current);
        thread.base_priority = priority;
        if thread.donors.is_empty() {
            thread.effective_priority = priority;
        } else if priority > thread.effective_priority {
            thread.effective_priority = priority;
        }
        let effective = s.tcb(current).effective_priority;
        s.ready_top_priority().is_some_and(|top| top > effective)
    });
    intr::set_level(old);
    if should_yield {
        yield_now();
    }
}

/// The running thread's effective priority.
pub fn get_priority() -> i32 {
    intr::without_interrupts(|| with_scheduler(|s| s.tcb(s.current()).effective_priority))
}

/// Set the running thread's nice value, clamped to the nice band. Under
/// MLFQ the thread's priority is recomputed immediately and the CPU yields
/// if the caller no longer belongs on it.
pub fn set_nice(nice: i32) {
    let nice = nice.clamp(NICE_MIN, NICE_MAX);
    let old = intr::disable();
    let should_yield = with_scheduler_mut(|s| {
        let current = s.current();
        s.tcb_mut(current).nice = nice;
        if s.policy() != SchedPolicy::Mlfq {
            return false;
        }
        let priority = mlfq::priority_for(s.tcb(current).recent_cpu, nice);
        let thread = s.tcb_mut(current);
        thread.base_priority = priority;
        thread.effective_priority = priority;
        s.ready_top_priority().is_some_and(|top| top > priority)
    });
    intr::set_level(old);
    if should_yield {
        yield_now();
    }
}

pub fn get_nice() -> i32 {
    intr::without_interrupts(|| with_scheduler(|s| s.tcb(s.current()).nice))
}

/// 100 times the system load average, rounded to nearest.
pub fn get_load_avg() -> i32 {
    intr::without_interrupts(|| with_scheduler(|s| s.load_avg.mul_int(100).to_int_nearest()))
}

/// 100 times the running thread's recent_cpu, rounded to nearest.
pub fn get_recent_cpu() -> i32 {
    intr::without_interrupts(|| {
        with_scheduler(|s| s.tcb(s.current()).recent_cpu.mul_int(100).to_int_nearest())
    })
}

/// Snapshot every live thread.
pub fn stats() -> Vec<ThreadStats> {
    intr::without_interrupts(|| {
        with_scheduler(|s| s.all_list.iter().map(|&tid| ThreadStats::of(s.tcb(tid))).collect())
    })
}

/// Verify the countable scheduler invariants: exactly one running thread
/// (the current one), every ready thread queued exactly where its priority
/// says, blocked threads queued nowhere, and the totals adding up to the
/// live-thread count. Logs and returns false on violation.
pub fn check_integrity() -> bool {
    intr::without_interrupts(|| {
        with_scheduler(|s| {
            let mut ok = true;

            let running: Vec<Tid> = s
                .all_list
                .iter()
                .copied()
                .filter(|&t| s.tcb(t).status == ThreadStatus::Running)
                .collect();
            if running != [s.running] {
                log::error!("running set {:?} != current {}", running, s.running);
                ok = false;
            }

            let mut blocked = 0usize;
            for &tid in &s.all_list {
                let thread = s.tcb(tid);
                let queued = s.ready.contains(tid, thread.effective_priority);
                match thread.status {
                    ThreadStatus::Ready => {
                        if !queued {
                            log::error!("{} ready but not queued", tid);
                            ok = false;
                        }
                    }
                    ThreadStatus::Blocked => {
                        blocked += 1;
                        if queued {
                            log::error!("{} blocked but queued", tid);
                            ok = false;
                        }
                    }
                    _ => {}
                }
                if thread.effective_priority < thread.base_priority {
                    log::error!("{} effective below base", tid);
                    ok = false;
                }
                if thread.donors.is_empty()
                    && thread.effective_priority != thread.base_priority
                {
                    log::error!("{} has no donors but a boosted priority", tid);
                    ok = false;
                }
            }

            if s.ready.len() + blocked + 1 != s.all_list.len() {
                log::error!(
                    "queue totals inconsistent: {} ready + {} blocked + 1 running != {} live",
                    s.ready.len(),
                    blocked,
                    s.all_list.len()
                );
                ok = false;
            }
            ok
        })
    })
}
