/*
 * Counting Semaphores
 *
 * A semaphore is a non-negative counter with a wait list. `down` blocks the
 * caller while the count is zero; `up` increments the count and wakes the
 * highest-effective-priority waiter, yielding to it when it outranks the
 * caller.
 *
 * Waiters are kept in arrival order; the scan at `up` time picks the best
 * waiter by the priorities in effect at that moment, so a donation received
 * while blocked moves a waiter ahead of the queue.
 */

use crate::intr;
use crate::scheduler::{self, Scheduler, Tid};

use alloc::vec::Vec;

use core::fmt;

/// Handle to a kernel-owned semaphore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Semaphore(pub(crate) u32);

impl fmt::Display for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sema#{}", self.0)
    }
}

pub(crate) struct SemaState {
    pub value: u32,
    /// Blocked waiters in arrival order.
    pub waiters: Vec<Tid>,
}

/// Create a semaphore with the given initial count.
pub fn create(value: u32) -> Semaphore {
    intr::without_interrupts(|| scheduler::with_scheduler_mut(|s| s.sema_alloc(value)))
}

/// Destroy a semaphore. It must have no waiters.
pub fn destroy(sema: Semaphore) {
    intr::without_interrupts(|| scheduler::with_scheduler_mut(|s| s.sema_free(sema)));
}

/// Down (P): wait until the count is positive, then decrement it.
///
/// May block, so it must not be called from an interrupt handler. Safe to
/// call with interrupts disabled; the caller's level is restored on return.
pub fn down(sema: Semaphore) {
    debug_assert!(!intr::in_handler());
    let old = intr::disable();
    loop {
        let acquired = scheduler::with_scheduler_mut(|s| {
            let current = s.current();
            let state = s.sema_state_mut(sema);
            if state.value == 0 {
                state.waiters.push(current);
                false
            } else {
                state.value -= 1;
                true
            }
        });
        if acquired {
            break;
        }
        scheduler::block_current();
        // Re-check on wakeup: another thread may have taken the count.
    }
    intr::set_level(old);
}

/// Try to down the semaphore without blocking. Returns whether the count
/// was positive and consumed.
pub fn try_down(sema: Semaphore) -> bool {
    intr::without_interrupts(|| {
        scheduler::with_scheduler_mut(|s| {
            let state = s.sema_state_mut(sema);
            if state.value == 0 {
                false
            } else {
                state.value -= 1;
                true
            }
        })
    })
}

/// Up (V): increment the count and wake the best waiter, if any.
///
/// When the woken thread has higher effective priority than the caller the
/// CPU yields before returning (or requests a yield-on-return from inside
/// an interrupt handler).
pub fn up(sema: Semaphore) {
    let old = intr::disable();
    let priorities = scheduler::with_scheduler_mut(|s| {
        let current = s.current();
        let woken = {
            let Scheduler { sems, threads, .. } = s;
            let state = sems
                .get_mut(&sema.0)
                .expect("semaphore: stale handle");
            state.value += 1;
            let mut best: Option<(usize, i32)> = None;
            for (index, tid) in state.waiters.iter().enumerate() {
                let effective = threads
                    .get(tid)
                    .expect("semaphore waiter without a TCB")
                    .effective_priority;
                // Strictly-greater keeps FIFO order among equal priorities.
                if best.is_none_or(|(_, b)| effective > b) {
                    best = Some((index, effective));
                }
            }
            best.map(|(index, _)| state.waiters.remove(index))
        };
        woken.map(|tid| {
            s.unblock(tid);
            (
                s.tcb(tid).effective_priority,
                s.tcb(current).effective_priority,
            )
        })
    });
    if let Some((woken, ours)) = priorities {
        if woken > ours {
            if intr::in_handler() {
                intr::request_yield_on_return();
            } else {
                intr::set_level(old);
                scheduler::yield_now();
                return;
            }
        }
    }
    intr::set_level(old);
}
