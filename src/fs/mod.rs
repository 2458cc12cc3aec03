/*
 * Filesystem Contract
 *
 * The filesystem itself is an external collaborator: the core only needs
 * the synchronous open/create/remove entry points and a handful of
 * per-file operations, and it promises in return that no two filesystem
 * calls ever run concurrently. That promise is kept by a single global
 * lock, created at boot, which every filesystem-touching syscall (and the
 * process-exit file teardown) holds for the duration of the call.
 *
 * The lock is a real kernel lock, so a low-priority thread in the middle of
 * a filesystem call is donated priority by any higher-priority thread that
 * blocks on it.
 */

pub mod memfs;

use alloc::boxed::Box;

use spin::RwLock;

use crate::sync::lock::Lock;

/// Synchronous filesystem entry points. Implementations provide their own
/// interior mutability; the core serializes all calls through the global
/// filesystem lock.
pub trait FileSystem: Send + Sync {
    fn open(&self, name: &str) -> Option<Box<dyn File>>;
    /// Create a file of `initial_size` zero bytes. Fails if the name is
    /// empty or already exists.
    fn create(&self, name: &str, initial_size: u32) -> bool;
    fn remove(&self, name: &str) -> bool;
}

/// An open file. Dropping the handle closes it.
pub trait File: Send {
    /// Read from the current position, advancing it. Returns bytes read;
    /// short reads happen at end of file.
    fn read(&mut self, buf: &mut [u8]) -> usize;
    /// Write at the current position, advancing it. Returns bytes written;
    /// writes never grow the file, and a write-denied file accepts nothing.
    fn write(&mut self, buf: &[u8]) -> usize;
    fn seek(&mut self, pos: u32);
    fn tell(&self) -> u32;
    fn length(&self) -> u32;
    /// Deny writes to the underlying file while this handle holds the
    /// denial (used to protect running executables).
    fn deny_write(&mut self);
    fn allow_write(&mut self);
}

struct FsGlobals {
    filesystem: Box<dyn FileSystem>,
    lock: Lock,
}

static FILESYS: RwLock<Option<FsGlobals>> = RwLock::new(None);

/// Install the filesystem and its serializing lock at boot.
pub(crate) fn install(filesystem: Box<dyn FileSystem>, lock: Lock) {
    *FILESYS.write() = Some(FsGlobals { filesystem, lock });
}

/// The global filesystem lock. Callers acquire it around every call into
/// the filesystem and release it before sleeping on anything else.
pub fn fs_lock() -> Lock {
    FILESYS
        .read()
        .as_ref()
        .expect("filesystem not installed")
        .lock
}

/// Run `f` against the installed filesystem. The caller must hold the
/// filesystem lock.
pub fn with<R>(f: impl FnOnce(&dyn FileSystem) -> R) -> R {
    let guard = FILESYS.read();
    let globals = guard.as_ref().expect("filesystem not installed");
    f(&*globals.filesystem)
}

pub fn open(name: &str) -> Option<Box<dyn File>> {
    with(|fs| fs.open(name))
}

pub fn create(name: &str, initial_size: u32) -> bool {
    with(|fs| fs.create(name, initial_size))
}

pub fn remove(name: &str) -> bool {
    with(|fs| fs.remove(name))
}
