/*
 * Thread Control Blocks
 *
 * Per-thread state for the scheduler. The original design placed each TCB
 * at the base of its thread's 4 KiB stack page and recovered it by rounding
 * the stack pointer down; the portable core keeps TCBs in the scheduler's
 * arena instead and identifies the running thread through the scheduler
 * context. The magic canary survives the move as a cheap validity check on
 * every TCB access.
 *
 * User threads carry their process state directly in the TCB: parent link,
 * child records, the wait semaphore, the open-file table and the address
 * space. Kernel threads simply leave those fields empty.
 */

use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use core::fmt;

use bitflags::bitflags;

use spin::Mutex;

use crate::config::NICE_DEFAULT;
use crate::fs::File;
use crate::io::FileTable;
use crate::memory::PageDir;
use crate::sync::lock::Lock;
use crate::sync::semaphore::Semaphore;
use crate::utils::fixed_point::Fixed;
use crate::utils::ordered_list::OrderedList;

use super::process::ChildProcess;

/// Stack-overflow style canary kept from the original TCB layout.
pub const THREAD_MAGIC: u32 = 0xcd6a_bf4b;

/// Capacity of a thread name, including nothing but the name itself.
pub const NAME_CAPACITY: usize = 16;

/// Thread identifier. Allocated monotonically, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tid(pub i32);

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tid {}", self.0)
    }
}

static NEXT_TID: Mutex<i32> = Mutex::new(1);

/// Allocate the next thread id under the tid lock.
pub(crate) fn allocate_tid() -> Tid {
    let mut next = NEXT_TID.lock();
    let tid = Tid(*next);
    *next += 1;
    tid
}

pub(crate) fn reset_tids() {
    *NEXT_TID.lock() = 1;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    Running,
    Ready,
    Blocked,
    Dying,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ThreadFlags: u8 {
        /// Scheduler service thread (idle, alarm wakeup, MLFQ engine):
        /// spawned without a child record, so it can never be reaped by
        /// `wait`, and excluded from MLFQ accounting.
        const SERVICE = 1 << 0;
    }
}

pub struct Thread {
    pub tid: Tid,
    pub name: heapless::String<NAME_CAPACITY>,
    pub status: ThreadStatus,
    pub flags: ThreadFlags,
    magic: u32,

    /// Priority the thread asked for.
    pub base_priority: i32,
    /// Priority the scheduler actually uses: base plus any donations.
    pub effective_priority: i32,
    /// Threads currently donating their priority to this one, highest first.
    pub donors: OrderedList<Tid>,
    /// The lock this thread is blocked on, if any.
    pub wait_lock: Option<Lock>,

    // MLFQ accounting.
    pub recent_cpu: Fixed,
    pub nice: i32,

    // Process state.
    pub parent: Option<Tid>,
    pub children: Vec<ChildProcess>,
    /// Semaphore this thread parks on while waiting for a child to exit.
    pub child_wait: Semaphore,
    /// The child tid a `wait` is currently parked on.
    pub tid_wait: Option<Tid>,
    /// The running executable, held open with writes denied.
    pub executable: Option<Box<dyn File>>,
    pub files: FileTable,
    pub exit_status: i32,
    pub pagedir: Option<PageDir>,
}

impl Thread {
    pub(crate) fn new(
        tid: Tid,
        name: &str,
        priority: i32,
        flags: ThreadFlags,
        child_wait: Semaphore,
        parent: Option<Tid>,
    ) -> Self {
        Thread {
            tid,
            name: truncate_name(name),
            status: ThreadStatus::Ready,
            flags,
            magic: THREAD_MAGIC,
            base_priority: priority,
            effective_priority: priority,
            donors: OrderedList::new(),
            wait_lock: None,
            recent_cpu: Fixed::ZERO,
            nice: NICE_DEFAULT,
            parent,
            children: Vec::new(),
            child_wait,
            tid_wait: None,
            executable: None,
            files: FileTable::new(),
            exit_status: 0,
            pagedir: None,
        }
    }

    /// True iff this points at a live, uncorrupted TCB.
    pub fn is_thread(&self) -> bool {
        self.magic == THREAD_MAGIC
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("tid", &self.tid)
            .field("name", &self.name.as_str())
            .field("status", &self.status)
            .field("priority", &self.effective_priority)
            .finish()
    }
}

fn truncate_name(name: &str) -> heapless::String<NAME_CAPACITY> {
    let mut out = heapless::String::new();
    for c in name.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

/// Point-in-time snapshot of one thread, for diagnostics and tests.
#[derive(Debug, Clone)]
pub struct ThreadStats {
    pub tid: Tid,
    pub name: String,
    pub status: ThreadStatus,
    pub priority: i32,
    pub nice: i32,
    pub recent_cpu: Fixed,
}

impl ThreadStats {
    pub(crate) fn of(thread: &Thread) -> Self {
        ThreadStats {
            tid: thread.tid,
            name: thread.name.as_str().to_string(),
            status: thread.status,
            priority: thread.effective_priority,
            nice: thread.nice,
            recent_cpu: thread.recent_cpu,
        }
    }
}
