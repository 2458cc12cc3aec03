/*
 * System Timer
 *
 * Monotonic tick counter driven by the external timer interrupt at
 * TIMER_FREQ, plus blocking sleep. `interrupt()` is the contract entry
 * point: the embedder's interrupt controller calls it once per tick (the
 * hosted tests call it directly).
 *
 * Sleeping threads park on an ordered deadline list. The interrupt path
 * never walks the list; it only peeks the earliest deadline and unblocks
 * the high-priority wakeup service thread, which pops every due sleeper
 * once the handler returns. Sleep therefore costs the interrupt handler a
 * single comparison.
 */

use core::sync::atomic::{AtomicI64, Ordering};

use spin::Mutex;

use crate::intr;
use crate::scheduler::{self, Tid};
use crate::utils::ordered_list::OrderedList;

static TICKS: AtomicI64 = AtomicI64::new(0);

struct Sleeper {
    wake_at: i64,
    tid: Tid,
}

/// Sleeping threads, earliest deadline first.
static SLEEPERS: Mutex<OrderedList<Sleeper>> = Mutex::new(OrderedList::new());

/// Ticks since boot.
pub fn ticks() -> i64 {
    TICKS.load(Ordering::SeqCst)
}

/// Ticks elapsed since `then`.
pub fn elapsed(then: i64) -> i64 {
    ticks() - then
}

pub(crate) fn reset() {
    TICKS.store(0, Ordering::SeqCst);
    *SLEEPERS.lock() = OrderedList::new();
}

/// Timer interrupt entry point; called once per tick with interrupts on.
pub fn interrupt() {
    assert!(intr::enabled(), "timer interrupt while interrupts masked");
    let old = intr::disable();
    intr::handler_begin();

    let now = TICKS.fetch_add(1, Ordering::SeqCst) + 1;
    scheduler::tick(now);

    let deadline_passed = SLEEPERS
        .lock()
        .front()
        .is_some_and(|sleeper| sleeper.wake_at <= now);
    if deadline_passed {
        scheduler::wake_alarm_service();
    }

    intr::handler_end();
    let yield_requested = intr::take_yield_request();
    intr::set_level(old);
    if yield_requested {
        scheduler::yield_now();
    }
}

/// Block the calling thread for at least `duration` ticks. Non-positive
/// durations return immediately.
pub fn sleep(duration: i64) {
    debug_assert!(intr::enabled());
    if duration <= 0 {
        return;
    }
    let wake_at = ticks() + duration;
    let old = intr::disable();
    let tid = scheduler::current_tid();
    SLEEPERS
        .lock()
        .insert_ordered(Sleeper { wake_at, tid }, |a, b| a.wake_at < b.wake_at);
    scheduler::block_current();
    intr::set_level(old);
}

/// Body of the `wakeup` service thread: park until the interrupt path has
/// seen a due deadline, then release every sleeper whose time has come.
pub(crate) fn alarm_service_loop() {
    loop {
        let old = intr::disable();
        scheduler::block_current();
        loop {
            let now = ticks();
            let due = {
                let mut sleepers = SLEEPERS.lock();
                match sleepers.front() {
                    Some(sleeper) if sleeper.wake_at <= now => sleepers.pop_front(),
                    _ => None,
                }
            };
            match due {
                Some(sleeper) => scheduler::unblock(sleeper.tid),
                None => break,
            }
        }
        intr::set_level(old);
    }
}
