/*
 * Hosted Test Harness
 *
 * Boots the kernel core on the hosted platform with an in-memory
 * filesystem and a closure-based loader. Kernel state is process-global,
 * so tests in one binary serialize on a mutex and each test boots a fresh
 * kernel; execution contexts left parked by a previous test are inert.
 */

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pinion_kernel::config::BootConfig;
use pinion_kernel::fs::memfs::MemFileSystem;
use pinion_kernel::fs::{File, FileSystem};
use pinion_kernel::platform::host::HostPlatform;
use pinion_kernel::process::{LoadError, LoadedProgram, Loader};
use pinion_kernel::syscall::{self, TrapFrame};
use pinion_kernel::{boot, process};

static SERIAL: Mutex<()> = Mutex::new(());

/// A booted kernel plus handles to its machine. Holding it keeps the
/// serialization guard, so only one test at a time drives the kernel.
pub struct Kernel {
    pub platform: Arc<HostPlatform>,
    pub fs: Arc<MemFileSystem>,
    pub loader: Arc<TestLoader>,
    _serial: MutexGuard<'static, ()>,
}

pub fn boot_with(config: BootConfig) -> Kernel {
    let serial = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
    let platform = HostPlatform::new();
    let fs = Arc::new(MemFileSystem::new());
    let loader = Arc::new(TestLoader::new());
    boot::start(
        config,
        platform.clone(),
        Box::new(SharedFs(fs.clone())),
        Box::new(SharedLoader(loader.clone())),
    );
    Kernel {
        platform,
        fs,
        loader,
        _serial: serial,
    }
}

pub fn boot_priority() -> Kernel {
    boot_with(BootConfig::new())
}

pub fn boot_mlfq() -> Kernel {
    boot_with(BootConfig::from_args(["-o", "mlfqs"]))
}

/// Filesystem wrapper so tests can keep a seeding handle to the memfs the
/// kernel is using.
struct SharedFs(Arc<MemFileSystem>);

impl FileSystem for SharedFs {
    fn open(&self, name: &str) -> Option<Box<dyn File>> {
        self.0.open(name)
    }
    fn create(&self, name: &str, initial_size: u32) -> bool {
        self.0.create(name, initial_size)
    }
    fn remove(&self, name: &str) -> bool {
        self.0.remove(name)
    }
}

type ProgramFactory = Box<dyn Fn(&str) -> Result<LoadedProgram, LoadError> + Send + Sync>;

/// Loader mapping program names to closures that build the "executable".
pub struct TestLoader {
    programs: Mutex<BTreeMap<String, ProgramFactory>>,
}

impl TestLoader {
    pub fn new() -> Self {
        TestLoader {
            programs: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn add(
        &self,
        name: &str,
        factory: impl Fn(&str) -> Result<LoadedProgram, LoadError> + Send + Sync + 'static,
    ) {
        self.programs
            .lock()
            .unwrap()
            .insert(name.to_owned(), Box::new(factory));
    }
}

struct SharedLoader(Arc<TestLoader>);

impl Loader for SharedLoader {
    fn load(&self, cmdline: &str) -> Result<LoadedProgram, LoadError> {
        let name = cmdline.split_whitespace().next().unwrap_or("");
        let programs = self.0.programs.lock().unwrap();
        match programs.get(name) {
            Some(factory) => factory(cmdline),
            None => Err(LoadError("no such program")),
        }
    }
}

/// Ordered record of observable events, shared between test threads.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

// ---------------------------------------------------------------------------
// User-program plumbing for syscall tests
// ---------------------------------------------------------------------------

/// Base of the data page test programs map for strings and buffers.
pub const DATA: u32 = 0x0800_0000;
/// Base of the stack page; `ESP` points into it.
pub const STACK: u32 = 0x0800_1000;
/// Stack pointer test programs put their argument words at.
pub const ESP: u32 = STACK + 0x100;

/// A page directory with the standard data and stack pages mapped.
pub fn user_pages() -> pinion_kernel::memory::PageDir {
    let mut pagedir = pinion_kernel::memory::PageDir::new();
    assert!(pagedir.map_page(DATA));
    assert!(pagedir.map_page(STACK));
    pagedir
}

/// Write bytes into the current process's user memory.
pub fn poke_bytes(addr: u32, bytes: &[u8]) {
    let wrote = process::with_current_pagedir(|pd| pd.write_bytes(addr, bytes))
        .expect("not a user process");
    assert!(wrote, "poke outside mapped user memory");
}

/// Write 4-byte words into user memory starting at `addr`.
pub fn poke_words(addr: u32, words: &[u32]) {
    for (index, word) in words.iter().enumerate() {
        poke_bytes(addr + 4 * index as u32, &word.to_le_bytes());
    }
}

/// Read bytes back out of the current process's user memory.
pub fn peek_bytes(addr: u32, len: usize) -> Vec<u8> {
    process::with_current_pagedir(|pd| pd.read_bytes(addr, len))
        .expect("not a user process")
        .expect("peek outside mapped user memory")
}

/// Lay the given argument words down at `ESP` and take the trap.
pub fn do_syscall(words: &[u32]) -> i32 {
    poke_words(ESP, words);
    let mut frame = TrapFrame::new(ESP);
    syscall::dispatch(&mut frame);
    frame.eax
}
