/*
 * MLFQ Policy Engine
 *
 * The multilevel feedback queue is driven by three pieces of fixed-point
 * accounting:
 *
 *   load_avg   = (59/60)*load_avg + (1/60)*ready_threads     (per second)
 *   recent_cpu = (2*load_avg)/(2*load_avg + 1)*recent_cpu + nice
 *   priority   = PRI_MAX - recent_cpu/4 - 2*nice             (clamped)
 *
 * The timer tick only increments the running thread's recent_cpu and sets
 * pending-update flags; the heavy recomputation runs in a dedicated
 * high-priority service thread that the tick handler unblocks. That keeps
 * interrupt context short while the bookkeeping still happens promptly;
 * the service thread outranks everything and runs as soon as the handler
 * returns.
 *
 * The idle thread and the two service threads are invisible to the
 * accounting: they neither age nor count toward the load average.
 */

use bitflags::bitflags;

use crate::config::{PRI_MAX, PRI_MIN};
use crate::intr;
use crate::utils::fixed_point::Fixed;

use super::thread::ThreadStatus;
use super::{Scheduler, with_scheduler_mut};

bitflags! {
    /// Recomputation requested by the tick handler, consumed by the
    /// service thread.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct PendingUpdates: u8 {
        /// Once per second: refresh load_avg and every recent_cpu.
        const RECENT_CPU = 1 << 0;
        /// Once per time slice: refresh every priority.
        const PRIORITIES = 1 << 1;
    }
}

/// The MLFQ priority formula, clamped to the priority band. recent_cpu/4
/// truncates toward zero.
pub(crate) fn priority_for(recent_cpu: Fixed, nice: i32) -> i32 {
    (PRI_MAX - recent_cpu.div_int(4).to_int() - 2 * nice).clamp(PRI_MIN, PRI_MAX)
}

/// Body of the `mlfqs` service thread: sleep until the tick handler has
/// work, then recompute with interrupts still masked.
pub(crate) fn service_loop() {
    loop {
        let old = intr::disable();
        super::block_current();
        run_pending_updates();
        intr::set_level(old);
    }
}

fn run_pending_updates() {
    with_scheduler_mut(|s| {
        let pending = s.pending;
        s.pending = PendingUpdates::empty();
        if pending.contains(PendingUpdates::RECENT_CPU) {
            update_load_and_recent_cpu(s);
        }
        if pending.contains(PendingUpdates::PRIORITIES) {
            update_priorities(s);
        }
    });
}

/// Once-a-second pass: fold the current ready/running count into load_avg,
/// then age every eligible thread's recent_cpu.
fn update_load_and_recent_cpu(s: &mut Scheduler) {
    let ready_threads = s
        .all_list
        .iter()
        .filter(|&&tid| {
            let status = s.tcb(tid).status;
            (status == ThreadStatus::Running || status == ThreadStatus::Ready)
                && s.mlfq_eligible(tid)
        })
        .count() as i32;

    s.load_avg = Fixed::from_ratio(59, 60).mul(s.load_avg)
        + Fixed::from_ratio(1, 60).mul_int(ready_threads);

    let twice_load = s.load_avg.mul_int(2);
    let decay = twice_load.div(twice_load.add_int(1));
    for tid in s.all_list.clone() {
        if !s.mlfq_eligible(tid) {
            continue;
        }
        let thread = s.tcb_mut(tid);
        thread.recent_cpu = decay.mul(thread.recent_cpu).add_int(thread.nice);
    }
}

/// Once-a-slice pass: recompute every eligible thread's priority and move
/// ready threads to the tail of their new bucket.
fn update_priorities(s: &mut Scheduler) {
    for tid in s.all_list.clone() {
        if !s.mlfq_eligible(tid) {
            continue;
        }
        let thread = s.tcb(tid);
        let priority = priority_for(thread.recent_cpu, thread.nice);
        if priority == thread.effective_priority {
            continue;
        }
        if thread.status == ThreadStatus::Ready {
            s.ready_remove(tid);
            let thread = s.tcb_mut(tid);
            thread.base_priority = priority;
            thread.effective_priority = priority;
            s.ready_insert(tid);
        } else {
            let thread = s.tcb_mut(tid);
            thread.base_priority = priority;
            thread.effective_priority = priority;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NICE_MAX;

    #[test]
    fn fresh_thread_starts_at_the_top() {
        assert_eq!(priority_for(Fixed::ZERO, 0), PRI_MAX);
    }

    #[test]
    fn most_favorable_nice_stays_clamped_at_the_top() {
        assert_eq!(priority_for(Fixed::ZERO, -20), PRI_MAX);
    }

    #[test]
    fn heavy_usage_and_hostile_nice_clamp_to_the_bottom() {
        assert_eq!(priority_for(Fixed::from_int(400), NICE_MAX), PRI_MIN);
    }

    #[test]
    fn each_four_ticks_of_usage_cost_one_level() {
        assert_eq!(priority_for(Fixed::from_int(4), 0), PRI_MAX - 1);
        assert_eq!(priority_for(Fixed::from_int(8), 0), PRI_MAX - 2);
        // Truncation toward zero: three ticks cost nothing yet.
        assert_eq!(priority_for(Fixed::from_int(3), 0), PRI_MAX);
    }

    #[test]
    fn nice_costs_two_levels_per_point() {
        assert_eq!(priority_for(Fixed::ZERO, 1), PRI_MAX - 2);
        assert_eq!(priority_for(Fixed::ZERO, 5), PRI_MAX - 10);
    }
}
