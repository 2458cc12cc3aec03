/*
 * Hosted Reference Platform
 *
 * Backs the platform contract with one OS thread per kernel thread. A
 * per-context "resumed" flag plus condvar implements the context switch as
 * a strict token hand-off: `switch` clears the caller's flag, sets the
 * target's flag, and parks until some later switch hands the token back.
 * At most one context ever holds the token, so kernel threads execute one
 * at a time exactly as on a single CPU.
 *
 * Retiring contexts unwind with a private payload (the panic hook is not
 * run), which tears the OS thread down through the catch in the spawn
 * wrapper. A genuine panic inside a kernel thread is a kernel panic: it
 * aborts the whole process, because the logical CPU just disappeared.
 *
 * The console is captured into a buffer that tests can inspect, and
 * console input is fed from a script queue.
 */

use alloc::boxed::Box;
use alloc::sync::Arc;

use std::collections::{BTreeMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::thread;
use std::vec::Vec;

use log::{Level, LevelFilter, Metadata, Record};

use super::{Platform, SpawnError};
use crate::scheduler::Tid;

/// Unwind payload used by `retire`; recognized and swallowed by the spawn
/// wrapper.
struct Retired;

struct Slot {
    resumed: Mutex<bool>,
    cv: Condvar,
}

impl Slot {
    fn new(resumed: bool) -> Arc<Self> {
        Arc::new(Slot {
            resumed: Mutex::new(resumed),
            cv: Condvar::new(),
        })
    }

    fn park(&self) {
        let mut resumed = self.resumed.lock().unwrap();
        while !*resumed {
            resumed = self.cv.wait(resumed).unwrap();
        }
    }

    fn set_resumed(&self, value: bool) {
        *self.resumed.lock().unwrap() = value;
        if value {
            self.cv.notify_one();
        }
    }
}

pub struct HostPlatform {
    slots: Mutex<BTreeMap<i32, Arc<Slot>>>,
    console: Mutex<Vec<u8>>,
    input: Mutex<VecDeque<u8>>,
    powered_off: AtomicBool,
}

impl HostPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(HostPlatform {
            slots: Mutex::new(BTreeMap::new()),
            console: Mutex::new(Vec::new()),
            input: Mutex::new(VecDeque::new()),
            powered_off: AtomicBool::new(false),
        })
    }

    fn slot(&self, tid: Tid) -> Arc<Slot> {
        self.slots
            .lock()
            .unwrap()
            .get(&tid.0)
            .expect("no execution context for thread")
            .clone()
    }

    /// Everything written to the console so far.
    pub fn console_output(&self) -> Vec<u8> {
        self.console.lock().unwrap().clone()
    }

    pub fn console_string(&self) -> std::string::String {
        std::string::String::from_utf8_lossy(&self.console_output()).into_owned()
    }

    pub fn clear_console(&self) {
        self.console.lock().unwrap().clear();
    }

    /// Queue bytes for `input_getc`.
    pub fn feed_input(&self, bytes: &[u8]) {
        self.input.lock().unwrap().extend(bytes.iter().copied());
    }

    pub fn is_powered_off(&self) -> bool {
        self.powered_off.load(Ordering::SeqCst)
    }
}

impl Platform for HostPlatform {
    fn register(&self, tid: Tid, entry: Box<dyn FnOnce() + Send>) -> Result<(), SpawnError> {
        let slot = Slot::new(false);
        self.slots.lock().unwrap().insert(tid.0, slot.clone());
        thread::Builder::new()
            .name(std::format!("pinion-{}", tid.0))
            .spawn(move || {
                slot.park();
                if let Err(payload) = catch_unwind(AssertUnwindSafe(entry)) {
                    if !payload.is::<Retired>() {
                        // Kernel panic: a thread died without scheduling
                        // away, so the logical CPU is gone.
                        eprintln!("kernel panic in thread {}", tid);
                        std::process::abort();
                    }
                }
            })
            .map(|_| ())
            .map_err(|_| SpawnError)
    }

    fn adopt(&self, tid: Tid) {
        let slot = Slot::new(true);
        self.slots.lock().unwrap().insert(tid.0, slot);
    }

    fn switch(&self, prev: Tid, next: Tid) {
        debug_assert_ne!(prev, next);
        let prev_slot = self.slot(prev);
        prev_slot.set_resumed(false);
        self.slot(next).set_resumed(true);
        prev_slot.park();
    }

    fn retire(&self, prev: Tid, next: Tid) -> ! {
        debug_assert_ne!(prev, next);
        self.slot(next).set_resumed(true);
        resume_unwind(Box::new(Retired))
    }

    fn reap(&self, tid: Tid) {
        self.slots.lock().unwrap().remove(&tid.0);
    }

    fn relax(&self) {
        thread::yield_now();
    }

    fn power_off(&self) -> ! {
        self.powered_off.store(true, Ordering::SeqCst);
        log::info!("powering off");
        // The machine stops; this context unwinds away like a retiring
        // thread, and nothing is ever scheduled again.
        resume_unwind(Box::new(Retired))
    }

    fn console_write(&self, buf: &[u8]) {
        self.console.lock().unwrap().extend_from_slice(buf);
    }

    fn input_getc(&self) -> u8 {
        self.input.lock().unwrap().pop_front().unwrap_or(0)
    }
}

/// Stderr logger for hosted runs, installed explicitly by the embedder or
/// a test harness.
struct HostLogger;

impl log::Log for HostLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Debug
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: HostLogger = HostLogger;

/// Route `log` output to stderr. Safe to call more than once; later calls
/// are no-ops.
pub fn init_logging(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}
