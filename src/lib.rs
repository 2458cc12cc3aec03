/*
 * Pinion Kernel Core
 *
 * The concurrency and process-management core of a small teaching kernel:
 * a preemptive single-CPU thread scheduler with two interchangeable
 * policies (strict priority with donation, and a 64-level MLFQ driven by
 * fixed-point accounting), semaphores and locks, timer sleep, user-process
 * exec/wait/exit tracking, and a validating system-call layer over a
 * per-process file table.
 *
 * The machine itself is an external collaborator. Context switches, the
 * console and power-off enter through the `Platform` trait; the filesystem
 * through `fs::FileSystem`; program loading through `process::Loader`; and
 * the timer interrupt through `utils::timer::interrupt`. The `host`
 * feature (default) provides a reference platform that runs kernel
 * threads on OS threads with a strict single-token hand-off, which is how
 * the test suite drives whole scheduling scenarios deterministically.
 *
 * Key invariants, enforced with interrupts masked:
 * - exactly one thread is Running, and it is the scheduler's `current`
 * - a Ready thread sits in exactly one ready structure; Blocked in none
 * - effective priority never drops below base priority, and equals it
 *   whenever no donations are outstanding
 * - in MLFQ mode a ready thread lives in the bucket of its priority
 */

#![cfg_attr(not(any(test, feature = "host")), no_std)]

extern crate alloc;

pub mod boot;
pub mod config;
pub mod fs;
pub mod intr;
pub mod io;
pub mod memory;
pub mod platform;
pub mod scheduler;
pub mod sync;
pub mod syscall;
pub mod utils;

pub use boot::start;
pub use config::{BootConfig, SchedPolicy};
pub use scheduler::{Thread, ThreadStats, ThreadStatus, Tid, process};
pub use utils::timer;
