/*
 * Strict-Priority Scheduling Scenarios
 *
 * Preemption on spawn, FIFO rotation among equals, priority-ordered
 * semaphore wakeups, and the donation chain across two locks.
 */

mod common;

use pinion_kernel::scheduler::{self, ThreadStatus};
use pinion_kernel::sync::{lock, semaphore};

#[test]
fn higher_priority_thread_preempts_on_spawn() {
    let _k = common::boot_priority();
    let log = common::EventLog::new();

    let hi = log.clone();
    scheduler::spawn("hi", 40, move || hi.push("hi")).unwrap();
    log.push("main");

    assert_eq!(log.snapshot(), ["hi", "main"]);
}

#[test]
fn equal_priorities_rotate_in_fifo_order() {
    let _k = common::boot_priority();
    let log = common::EventLog::new();

    for name in ["a", "b", "c"] {
        let log = log.clone();
        scheduler::spawn(name, 31, move || {
            log.push(format!("{name}1"));
            scheduler::yield_now();
            log.push(format!("{name}2"));
        })
        .unwrap();
    }

    // First yield runs everyone once; the second lets them finish.
    scheduler::yield_now();
    scheduler::yield_now();

    assert_eq!(log.snapshot(), ["a1", "b1", "c1", "a2", "b2", "c2"]);
    assert!(scheduler::check_integrity());
}

#[test]
fn set_priority_round_trips_and_clamps() {
    let _k = common::boot_priority();
    scheduler::set_priority(45);
    assert_eq!(scheduler::get_priority(), 45);
    scheduler::set_priority(99);
    assert_eq!(scheduler::get_priority(), 63);
    scheduler::set_priority(-7);
    assert_eq!(scheduler::get_priority(), 0);
}

#[test]
fn lowering_priority_yields_to_the_ready_front() {
    let _k = common::boot_priority();
    let log = common::EventLog::new();

    let other = log.clone();
    scheduler::spawn("other", 31, move || other.push("other")).unwrap();
    log.push("before");
    scheduler::set_priority(20);
    log.push("after");

    assert_eq!(log.snapshot(), ["before", "other", "after"]);
}

#[test]
fn semaphore_wakes_waiters_in_priority_order() {
    let _k = common::boot_priority();
    let log = common::EventLog::new();
    let sema = semaphore::create(0);

    for (name, priority) in [("low", 40), ("high", 50), ("mid", 45)] {
        let log = log.clone();
        scheduler::spawn(name, priority, move || {
            semaphore::down(sema);
            log.push(name);
        })
        .unwrap();
    }
    assert!(log.snapshot().is_empty());

    for _ in 0..3 {
        semaphore::up(sema);
    }
    assert_eq!(log.snapshot(), ["high", "mid", "low"]);
}

#[test]
fn try_down_consumes_only_available_counts() {
    let _k = common::boot_priority();
    let sema = semaphore::create(1);
    assert!(semaphore::try_down(sema));
    assert!(!semaphore::try_down(sema));
    semaphore::up(sema);
    assert!(semaphore::try_down(sema));
}

#[test]
fn contended_try_acquire_fails_without_blocking() {
    let _k = common::boot_priority();
    let log = common::EventLog::new();
    let l = lock::create();

    assert!(lock::try_acquire(l));
    assert!(lock::held_by_current(l));

    let taker = log.clone();
    scheduler::spawn("taker", 40, move || {
        taker.push(format!("got={}", lock::try_acquire(l)));
    })
    .unwrap();

    assert_eq!(log.snapshot(), ["got=false"]);
    lock::release(l);
    assert!(!lock::held_by_current(l));
}

/// The donation-chain scenario: main plays the low thread L holding lock
/// A; M holds B and blocks on A; H blocks on B. Effective priorities climb
/// transitively and H finishes ahead of M after each release.
#[test]
fn donation_propagates_across_a_chain_of_locks() {
    let _k = common::boot_priority();
    let log = common::EventLog::new();

    scheduler::set_priority(10);
    let lock_a = lock::create();
    let lock_b = lock::create();
    lock::acquire(lock_a);

    let m_log = log.clone();
    scheduler::spawn("m", 20, move || {
        lock::acquire(lock_b);
        m_log.push("m-holds-b");
        lock::acquire(lock_a);
        m_log.push("m-holds-a");
        lock::release(lock_a);
        lock::release(lock_b);
        m_log.push("m-done");
    })
    .unwrap();
    // M preempted us, took B and blocked on A: one level of donation.
    assert_eq!(scheduler::get_priority(), 20);

    let h_log = log.clone();
    scheduler::spawn("h", 30, move || {
        lock::acquire(lock_b);
        h_log.push("h-holds-b");
        lock::release(lock_b);
        h_log.push("h-done");
    })
    .unwrap();
    // H blocked on B, which M holds; the donation reaches us through M.
    assert_eq!(scheduler::get_priority(), 30);
    let m_stats = scheduler::stats()
        .into_iter()
        .find(|t| t.name == "m")
        .unwrap();
    assert_eq!(m_stats.priority, 30);
    assert_eq!(m_stats.status, ThreadStatus::Blocked);

    lock::release(lock_a);
    // Both chains drained before we ran again: H beat M at every release.
    assert_eq!(
        log.snapshot(),
        ["m-holds-b", "m-holds-a", "h-holds-b", "h-done", "m-done"]
    );
    assert_eq!(scheduler::get_priority(), 10);
    assert!(scheduler::check_integrity());
}

/// With donation active, set_priority moves the base without losing the
/// donated boost; the boost evaporates on release.
#[test]
fn set_priority_under_donation_keeps_the_boost() {
    let _k = common::boot_priority();
    let log = common::EventLog::new();

    scheduler::set_priority(10);
    let l = lock::create();
    lock::acquire(l);

    let donor = log.clone();
    scheduler::spawn("donor", 40, move || {
        lock::acquire(l);
        donor.push("donor-got-it");
        lock::release(l);
    })
    .unwrap();
    assert_eq!(scheduler::get_priority(), 40);

    // Lowering the base does not shed the donation...
    scheduler::set_priority(5);
    assert_eq!(scheduler::get_priority(), 40);
    // ...and raising it above the donation takes over.
    scheduler::set_priority(50);
    assert_eq!(scheduler::get_priority(), 50);
    scheduler::set_priority(5);

    lock::release(l);
    assert_eq!(log.snapshot(), ["donor-got-it"]);
    assert_eq!(scheduler::get_priority(), 5);
}
