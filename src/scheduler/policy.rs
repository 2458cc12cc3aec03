/*
 * Ready Structures
 *
 * The two scheduling policies keep their runnable threads in different
 * shapes: strict priority uses a single list ordered by descending
 * effective priority, MLFQ uses 64 FIFO buckets indexed by priority. The
 * tagged variant here is what `next_thread_to_run`, ready insertion and
 * the recompute passes dispatch on.
 *
 * Callers keep the structure consistent with thread priorities: whenever a
 * ready thread's effective priority changes it is removed under its old
 * priority and reinserted under the new one.
 */

use alloc::collections::{BTreeMap, VecDeque};

use crate::config::{PRI_COUNT, PRI_MAX, PRI_MIN, SchedPolicy};
use crate::utils::ordered_list::OrderedList;

use super::thread::{Thread, Tid};

pub(crate) enum ReadyQueues {
    /// Strict priority: one list, highest effective priority first, FIFO
    /// among equals.
    Priority { ready: OrderedList<Tid> },
    /// MLFQ: one FIFO bucket per priority level.
    Mlfq { buckets: [VecDeque<Tid>; PRI_COUNT] },
}

impl ReadyQueues {
    pub fn new(policy: SchedPolicy) -> Self {
        match policy {
            SchedPolicy::Priority => ReadyQueues::Priority {
                ready: OrderedList::new(),
            },
            SchedPolicy::Mlfq => ReadyQueues::Mlfq {
                buckets: core::array::from_fn(|_| VecDeque::new()),
            },
        }
    }

    pub fn policy(&self) -> SchedPolicy {
        match self {
            ReadyQueues::Priority { .. } => SchedPolicy::Priority,
            ReadyQueues::Mlfq { .. } => SchedPolicy::Mlfq,
        }
    }

    /// Insert a runnable thread according to its current effective
    /// priority.
    pub fn insert(&mut self, tid: Tid, threads: &BTreeMap<Tid, Thread>) {
        match self {
            ReadyQueues::Priority { ready } => ready.insert_ordered(tid, |a, b| {
                threads[a].effective_priority > threads[b].effective_priority
            }),
            ReadyQueues::Mlfq { buckets } => {
                buckets[bucket_index(threads[&tid].effective_priority)].push_back(tid)
            }
        }
    }

    /// Remove a thread known to be queued under `effective`.
    pub fn remove(&mut self, tid: Tid, effective: i32) {
        match self {
            ReadyQueues::Priority { ready } => {
                let removed = ready.remove(&tid);
                debug_assert!(removed, "thread missing from ready list");
            }
            ReadyQueues::Mlfq { buckets } => {
                let bucket = &mut buckets[bucket_index(effective)];
                match bucket.iter().position(|&t| t == tid) {
                    Some(position) => {
                        bucket.remove(position);
                    }
                    None => debug_assert!(false, "thread missing from its bucket"),
                }
            }
        }
    }

    /// Pop the highest-priority runnable thread, scanning MLFQ buckets from
    /// high to low.
    pub fn pop_highest(&mut self) -> Option<Tid> {
        match self {
            ReadyQueues::Priority { ready } => ready.pop_front(),
            ReadyQueues::Mlfq { buckets } => buckets
                .iter_mut()
                .rev()
                .find_map(|bucket| bucket.pop_front()),
        }
    }

    /// The thread `pop_highest` would return, without removing it.
    pub fn top(&self) -> Option<Tid> {
        match self {
            ReadyQueues::Priority { ready } => ready.front().copied(),
            ReadyQueues::Mlfq { buckets } => buckets
                .iter()
                .rev()
                .find_map(|bucket| bucket.front().copied()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ReadyQueues::Priority { ready } => ready.len(),
            ReadyQueues::Mlfq { buckets } => buckets.iter().map(VecDeque::len).sum(),
        }
    }

    /// Is `tid` queued where a thread of priority `effective` belongs?
    pub fn contains(&self, tid: Tid, effective: i32) -> bool {
        match self {
            ReadyQueues::Priority { ready } => ready.contains(&tid),
            ReadyQueues::Mlfq { buckets } => buckets[bucket_index(effective)].contains(&tid),
        }
    }
}

fn bucket_index(priority: i32) -> usize {
    debug_assert!((PRI_MIN..=PRI_MAX).contains(&priority));
    (priority - PRI_MIN) as usize
}
