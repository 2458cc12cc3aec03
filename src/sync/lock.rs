/*
 * Locks with Priority Donation
 *
 * A lock is a binary semaphore plus a holder, with the donation machinery
 * that keeps strict-priority scheduling honest: a thread blocking on a held
 * lock lends its effective priority to the holder, transitively along the
 * chain of locks the holder itself is waiting on, up to a bounded depth.
 *
 * Donation is only meaningful under the strict-priority policy; in MLFQ
 * mode priorities are owned by the feedback-queue formula and acquisition
 * falls through to the plain semaphore.
 */

use crate::config::SchedPolicy;
use crate::intr;
use crate::scheduler::{self, Tid};
use crate::sync::semaphore::{self, Semaphore};

use alloc::collections::BTreeMap;

use core::fmt;

/// Handle to a kernel-owned lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lock(pub(crate) u32);

impl fmt::Display for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lock#{}", self.0)
    }
}

pub(crate) struct LockState {
    pub sema: Semaphore,
    pub holder: Option<Tid>,
}

/// Create a lock, initially released.
pub fn create() -> Lock {
    intr::without_interrupts(|| {
        scheduler::with_scheduler_mut(|s| {
            let sema = s.sema_alloc(1);
            s.lock_alloc(sema)
        })
    })
}

/// Destroy a lock. It must not be held.
pub fn destroy(lock: Lock) {
    intr::without_interrupts(|| scheduler::with_scheduler_mut(|s| s.lock_free(lock)));
}

pub fn held_by_current(lock: Lock) -> bool {
    intr::without_interrupts(|| {
        scheduler::with_scheduler_mut(|s| s.lock_state(lock).holder == Some(s.current()))
    })
}

/// Acquire `lock`, blocking until it is available.
///
/// The caller must not already hold it. While blocked, the caller donates
/// its effective priority to the holder (strict-priority mode only).
pub fn acquire(lock: Lock) {
    debug_assert!(!intr::in_handler());
    debug_assert!(!held_by_current(lock), "lock is not recursive");
    let old = intr::disable();

    let sema = scheduler::with_scheduler_mut(|s| {
        let state = s.lock_state(lock);
        let sema = state.sema;
        if let Some(holder) = state.holder {
            if s.policy() == SchedPolicy::Priority {
                let current = s.current();
                let donated = s.tcb(current).effective_priority;
                s.tcb_mut(current).wait_lock = Some(lock);

                // Enter the holder's donor list, ordered by the donors'
                // effective priorities as of now.
                let effectives: BTreeMap<Tid, i32> = s
                    .tcb(holder)
                    .donors
                    .iter()
                    .map(|&d| (d, s.tcb(d).effective_priority))
                    .collect();
                s.tcb_mut(holder).donors.insert_ordered(current, |a, b| {
                    let pa = effectives.get(a).copied().unwrap_or(donated);
                    let pb = effectives.get(b).copied().unwrap_or(donated);
                    pa > pb
                });

                s.donate(holder, donated);
            }
        }
        sema
    });

    semaphore::down(sema);

    scheduler::with_scheduler_mut(|s| {
        let current = s.current();
        s.tcb_mut(current).wait_lock = None;
        s.lock_state_mut(lock).holder = Some(current);
    });
    intr::set_level(old);
}

/// Acquire `lock` without blocking. Returns whether it was acquired.
pub fn try_acquire(lock: Lock) -> bool {
    let old = intr::disable();
    let sema = scheduler::with_scheduler_mut(|s| s.lock_state(lock).sema);
    let acquired = semaphore::try_down(sema);
    if acquired {
        scheduler::with_scheduler_mut(|s| {
            let current = s.current();
            s.lock_state_mut(lock).holder = Some(current);
        });
    }
    intr::set_level(old);
    acquired
}

/// Release `lock`, which the caller must hold.
///
/// Donations received through this lock are returned: the releaser's
/// effective priority drops back to the maximum of its base priority and
/// whatever its remaining donors still lend it.
pub fn release(lock: Lock) {
    debug_assert!(held_by_current(lock));
    let old = intr::disable();

    let sema = scheduler::with_scheduler_mut(|s| {
        let state = s.lock_state_mut(lock);
        state.holder = None;
        let sema = state.sema;

        if s.policy() == SchedPolicy::Priority {
            let current = s.current();
            let departing: alloc::vec::Vec<Tid> = s
                .tcb(current)
                .donors
                .iter()
                .copied()
                .filter(|&d| s.tcb(d).wait_lock == Some(lock))
                .collect();
            let remaining_best = s
                .tcb(current)
                .donors
                .iter()
                .copied()
                .filter(|d| !departing.contains(d))
                .map(|d| s.tcb(d).effective_priority)
                .max();

            let me = s.tcb_mut(current);
            me.donors.retain(|d| !departing.contains(d));
            me.effective_priority = match remaining_best {
                Some(best) => me.base_priority.max(best),
                None => me.base_priority,
            };
        }
        sema
    });

    // May hand the CPU straight to the woken waiter.
    semaphore::up(sema);
    intr::set_level(old);
}
