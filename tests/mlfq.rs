/*
 * MLFQ Scheduling Scenarios
 *
 * Boots with `-o mlfqs` and drives the timer by hand: priority follows the
 * formula, nice biases it immediately, CPU hogs decay and get preempted by
 * fresh threads, and the load average becomes visible after a second of
 * accounted time.
 */

mod common;

use pinion_kernel::scheduler::{self, Tid};
use pinion_kernel::{process, timer};

#[test]
fn fresh_threads_start_at_the_top_of_the_band() {
    let _k = common::boot_mlfq();
    assert_eq!(scheduler::get_priority(), 63);
    assert_eq!(scheduler::get_nice(), 0);
    assert_eq!(scheduler::get_recent_cpu(), 0);
    assert_eq!(scheduler::get_load_avg(), 0);
}

#[test]
fn set_priority_is_inert_under_mlfq() {
    let _k = common::boot_mlfq();
    scheduler::set_priority(10);
    assert_eq!(scheduler::get_priority(), 63);
}

#[test]
fn nice_biases_priority_immediately_and_clamps() {
    let _k = common::boot_mlfq();
    scheduler::set_nice(5);
    assert_eq!(scheduler::get_nice(), 5);
    assert_eq!(scheduler::get_priority(), 63 - 2 * 5);

    scheduler::set_nice(-30);
    assert_eq!(scheduler::get_nice(), -20);
    assert_eq!(scheduler::get_priority(), 63);
}

#[test]
fn ticks_charge_the_running_thread() {
    let _k = common::boot_mlfq();
    assert_eq!(scheduler::get_recent_cpu(), 0);
    for _ in 0..8 {
        timer::interrupt();
    }
    // Eight ticks of CPU, reported at 100x.
    assert_eq!(scheduler::get_recent_cpu(), 800);
    // Priority already recomputed by the service thread: 63 - 8/4.
    assert_eq!(scheduler::get_priority(), 61);
}

#[test]
fn children_inherit_their_creator_accounting() {
    let _k = common::boot_mlfq();
    let log = common::EventLog::new();

    scheduler::set_nice(3);
    let child = log.clone();
    scheduler::spawn("child", 31, move || {
        child.push(format!("nice={}", scheduler::get_nice()));
        child.push(format!("priority={}", scheduler::get_priority()));
    })
    .unwrap();

    scheduler::yield_now();
    assert_eq!(log.snapshot(), ["nice=3", "priority=57"]);
}

/// The starvation-avoidance scenario: a CPU-bound thread starts at the top,
/// decays as its recent_cpu grows, and a freshly spawned thread outranks
/// it; the load average reflects the busy second.
#[test]
fn cpu_hogs_decay_and_fresh_threads_preempt_them() {
    let _k = common::boot_mlfq();
    let log = common::EventLog::new();

    let hog_log = log.clone();
    let hog = scheduler::spawn("hog", 31, move || {
        for _ in 0..150 {
            timer::interrupt();
        }
        hog_log.push("hog-done");
    })
    .unwrap();

    // Sleep while the hog burns CPU; its ticks drive our wakeup.
    timer::sleep(50);

    let hog_stats = stats_of(hog);
    assert!(
        hog_stats.priority < 63,
        "hog did not decay: {:?}",
        hog_stats
    );
    assert!(hog_stats.recent_cpu.to_int() >= 40);
    assert!(scheduler::check_integrity());

    // A fresh thread computes back at the top of the band and gets the CPU
    // ahead of the decayed hog as soon as we block.
    let fresh_log = log.clone();
    scheduler::spawn("fresh", 31, move || fresh_log.push("fresh-ran")).unwrap();

    assert_eq!(process::wait(hog), 0);
    assert_eq!(log.snapshot(), ["fresh-ran", "hog-done"]);
    assert!(scheduler::get_load_avg() > 0);
}

fn stats_of(tid: Tid) -> scheduler::ThreadStats {
    scheduler::stats()
        .into_iter()
        .find(|t| t.tid == tid)
        .expect("thread not found")
}
