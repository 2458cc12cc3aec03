/*
 * Process Layer
 *
 * User-process lifetime on top of kernel threads: spawning a program
 * through the external loader, the exec/wait/exit rendezvous between
 * parent and child, and the per-process open-file bookkeeping the syscall
 * layer leans on.
 *
 * Parent and child are linked in one direction only. The parent owns a
 * `ChildProcess` record per spawned child; the child keeps a weak tid
 * reference to its parent and checks liveness before signaling, so either
 * side may die first without dangling anything. A parent that exits simply
 * discards its records; an orphaned child skips the exit signal.
 */

use alloc::borrow::ToOwned;
use alloc::boxed::Box;
use alloc::string::String;

use core::fmt;

use spin::RwLock;

use crate::config::PRI_DEFAULT;
use crate::fs::{self, File};
use crate::intr;
use crate::memory::PageDir;
use crate::platform::SpawnError;
use crate::sync::{lock, semaphore};

use super::thread::Tid;
use super::{self as scheduler, with_scheduler_mut};

/// Per-child record owned by the parent. Created when the parent spawns
/// the child; consumed by `wait` or discarded wholesale at parent exit.
#[derive(Debug, Clone)]
pub struct ChildProcess {
    pub tid: Tid,
    pub exit_status: i32,
    /// Set once the child has exited and `exit_status` is meaningful.
    pub did_execute: bool,
}

impl ChildProcess {
    pub(crate) fn new(tid: Tid) -> Self {
        ChildProcess {
            tid,
            exit_status: 0,
            did_execute: false,
        }
    }
}

/// A loaded user program: its address space and the entry the new thread
/// runs.
pub struct LoadedProgram {
    pub pagedir: PageDir,
    pub entry: Box<dyn FnOnce() + Send>,
}

/// The loader could not produce a runnable program.
#[derive(Debug, Clone, Copy)]
pub struct LoadError(pub &'static str);

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "load failed: {}", self.0)
    }
}

/// External loader contract: build an address space and entry point from a
/// command line.
pub trait Loader: Send + Sync {
    fn load(&self, cmdline: &str) -> Result<LoadedProgram, LoadError>;
}

static LOADER: RwLock<Option<Box<dyn Loader>>> = RwLock::new(None);

pub(crate) fn install_loader(loader: Box<dyn Loader>) {
    *LOADER.write() = Some(loader);
}

fn program_name(cmdline: &str) -> &str {
    cmdline.split_whitespace().next().unwrap_or("")
}

/// `exec` syscall body: cheaply probe that the program exists before
/// spawning anything, then hand the command line to the loader path.
pub fn exec(cmdline: &str) -> Option<Tid> {
    let name = program_name(cmdline);
    lock::acquire(fs::fs_lock());
    let openable = fs::open(name).is_some();
    lock::release(fs::fs_lock());
    if !openable {
        log::debug!("exec: no such program '{}'", name);
        return None;
    }
    execute(cmdline).ok()
}

/// Spawn a thread that loads and runs `cmdline`. Returns the child's tid
/// as soon as the thread exists; load failures surface as the child
/// exiting with status -1.
pub fn execute(cmdline: &str) -> Result<Tid, SpawnError> {
    let name = program_name(cmdline).to_owned();
    let cmdline = cmdline.to_owned();
    scheduler::spawn(&name, PRI_DEFAULT, move || start_process(cmdline))
}

/// First code run by a new user thread: drive the loader, adopt the
/// resulting address space, pin the executable against writes, and enter
/// the program.
fn start_process(cmdline: String) {
    let loaded = {
        let guard = LOADER.read();
        let loader = guard.as_ref().expect("loader not installed");
        loader.load(&cmdline)
    };
    let program = match loaded {
        Ok(program) => program,
        Err(error) => {
            log::warn!("exec '{}': {}", cmdline, error);
            exit(-1);
        }
    };

    lock::acquire(fs::fs_lock());
    let executable = fs::open(program_name(&cmdline)).map(|mut file| {
        file.deny_write();
        file
    });
    lock::release(fs::fs_lock());

    intr::without_interrupts(|| {
        with_scheduler_mut(|s| {
            let current = s.current();
            let thread = s.tcb_mut(current);
            thread.pagedir = Some(program.pagedir);
            thread.executable = executable;
        })
    });

    (program.entry)();
    // Falling off the end of a program is a clean exit.
}

/// `wait` syscall body. Returns the child's exit status, or -1 when the
/// tid is not an un-reaped child of the caller. Waiting twice on the same
/// child fails the second time.
pub fn wait(child: Tid) -> i32 {
    enum WaitState {
        Missing,
        Done(i32),
        Pending(semaphore::Semaphore),
    }

    let state = intr::without_interrupts(|| {
        with_scheduler_mut(|s| {
            let current = s.current();
            let thread = s.tcb_mut(current);
            match thread.children.iter().position(|c| c.tid == child) {
                None => WaitState::Missing,
                Some(index) if thread.children[index].did_execute => {
                    let record = thread.children.remove(index);
                    WaitState::Done(record.exit_status)
                }
                Some(_) => {
                    thread.tid_wait = Some(child);
                    WaitState::Pending(thread.child_wait)
                }
            }
        })
    });

    match state {
        WaitState::Missing => -1,
        WaitState::Done(status) => status,
        WaitState::Pending(sema) => {
            semaphore::down(sema);
            intr::without_interrupts(|| {
                with_scheduler_mut(|s| {
                    let current = s.current();
                    let thread = s.tcb_mut(current);
                    thread.tid_wait = None;
                    let index = thread
                        .children
                        .iter()
                        .position(|c| c.tid == child)
                        .expect("awaited child record disappeared");
                    let record = thread.children.remove(index);
                    debug_assert!(record.did_execute);
                    record.exit_status
                })
            })
        }
    }
}

/// Terminate the current process with `status`.
///
/// Open files and the write-protected executable are released under the
/// filesystem lock, the status is published into the parent's child record
/// (waking the parent if it is parked on this tid), and the thread dies.
pub fn exit(status: i32) -> ! {
    let (name, files, executable) = intr::without_interrupts(|| {
        with_scheduler_mut(|s| {
            let current = s.current();
            let thread = s.tcb_mut(current);
            thread.exit_status = status;
            (thread.name.clone(), thread.files.drain(), thread.executable.take())
        })
    });
    log::info!("{}: exit({})", name.as_str(), status);

    if !files.is_empty() || executable.is_some() {
        lock::acquire(fs::fs_lock());
        drop(files);
        if let Some(mut exe) = executable {
            exe.allow_write();
            drop(exe);
        }
        lock::release(fs::fs_lock());
    }

    let signal = intr::without_interrupts(|| {
        with_scheduler_mut(|s| {
            let current = s.current();
            s.tcb_mut(current).pagedir = None;
            s.tcb_mut(current).children.clear();

            let parent = s.tcb(current).parent.filter(|p| s.all_list.contains(p));
            parent.and_then(|p| {
                let parent_thread = s.tcb_mut(p);
                if let Some(record) = parent_thread
                    .children
                    .iter_mut()
                    .find(|c| c.tid == current)
                {
                    record.did_execute = true;
                    record.exit_status = status;
                }
                (parent_thread.tid_wait == Some(current)).then_some(parent_thread.child_wait)
            })
        })
    });
    if let Some(sema) = signal {
        semaphore::up(sema);
    }

    scheduler::exit_current();
}

// ---------------------------------------------------------------------------
// Per-process open files
// ---------------------------------------------------------------------------

/// Install an open file into the caller's table, returning the new fd.
pub(crate) fn install_file(file: Box<dyn File>) -> i32 {
    intr::without_interrupts(|| {
        with_scheduler_mut(|s| {
            let current = s.current();
            s.tcb_mut(current).files.install(file)
        })
    })
}

/// Run `f` against the caller's file behind `fd`, or None for unknown fds.
pub(crate) fn with_file<R>(fd: i32, f: impl FnOnce(&mut dyn File) -> R) -> Option<R> {
    intr::without_interrupts(|| {
        with_scheduler_mut(|s| {
            let current = s.current();
            s.tcb_mut(current).files.get_mut(fd).map(f)
        })
    })
}

/// Close `fd` in the caller's table; unknown fds are a silent no-op.
pub(crate) fn close_file(fd: i32) {
    intr::without_interrupts(|| {
        with_scheduler_mut(|s| {
            let current = s.current();
            s.tcb_mut(current).files.close(fd);
        })
    })
}

/// Number of files the caller has open. Diagnostics and tests.
pub fn open_file_count() -> usize {
    intr::without_interrupts(|| {
        with_scheduler_mut(|s| {
            let current = s.current();
            s.tcb(current).files.len()
        })
    })
}

/// Run `f` against the caller's page directory, or None for kernel
/// threads without one.
pub fn with_current_pagedir<R>(f: impl FnOnce(&mut PageDir) -> R) -> Option<R> {
    intr::without_interrupts(|| {
        with_scheduler_mut(|s| {
            let current = s.current();
            s.tcb_mut(current).pagedir.as_mut().map(f)
        })
    })
}
