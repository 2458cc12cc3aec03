/*
 * Platform Contract
 *
 * Everything the core needs from the machine but does not implement itself:
 * execution contexts and the low-level context switch, power-off, and the
 * console. A bare-metal embedder backs these with stack frames and an
 * `iretq`-style switch; the hosted platform backs them with one OS thread
 * per kernel thread and a strict single-token hand-off.
 *
 * The scheduler drives the contract under a fixed protocol:
 *
 * 1. `register` creates a context that must not run until first switched to.
 * 2. `switch(prev, next)` suspends the calling context and resumes `next`;
 *    it returns only when some later switch names `prev` as the target.
 * 3. `retire(prev, next)` resumes `next` and tears the calling context down
 *    without ever returning (the exit path).
 * 4. `reap` frees whatever the platform still holds for a dead context.
 *
 * Exactly one context is ever running between calls, which is what makes
 * the interrupt-flag emulation in `intr` sound.
 */

use alloc::boxed::Box;
use alloc::sync::Arc;

use core::fmt;

use spin::RwLock;

use crate::scheduler::Tid;

/// Thread creation failed at the platform layer (e.g. no memory for an
/// execution context).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnError;

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("could not create an execution context")
    }
}

pub trait Platform: Send + Sync {
    /// Create a suspended execution context for `tid` that will run `entry`
    /// when first switched to.
    fn register(&self, tid: Tid, entry: Box<dyn FnOnce() + Send>) -> Result<(), SpawnError>;

    /// Adopt the calling execution context as `tid` (boot path: the caller
    /// becomes the initial thread).
    fn adopt(&self, tid: Tid);

    /// Suspend the calling context (`prev`) and resume `next`. Returns when
    /// `prev` is next switched to.
    fn switch(&self, prev: Tid, next: Tid);

    /// Resume `next` and tear down the calling context. Never returns.
    fn retire(&self, prev: Tid, next: Tid) -> !;

    /// Release execution resources still held for a dead context.
    fn reap(&self, tid: Tid);

    /// Idle-thread hint that nothing is runnable right now.
    fn relax(&self);

    fn power_off(&self) -> !;

    fn console_write(&self, buf: &[u8]);

    fn input_getc(&self) -> u8;
}

static PLATFORM: RwLock<Option<Arc<dyn Platform>>> = RwLock::new(None);

/// Install the platform at boot, replacing any previous one.
pub(crate) fn install(platform: Arc<dyn Platform>) {
    *PLATFORM.write() = Some(platform);
}

/// The installed platform.
pub fn get() -> Arc<dyn Platform> {
    PLATFORM
        .read()
        .as_ref()
        .expect("platform not installed")
        .clone()
}

#[cfg(feature = "host")]
pub mod host;
