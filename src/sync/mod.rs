/*
 * Synchronization Primitives
 *
 * Semaphores and locks for kernel threads. State lives in kernel-owned
 * tables keyed by small Copy handles; the handle types here are what the
 * rest of the kernel passes around. Interrupt-masked critical sections are
 * provided by the `intr` module.
 */

pub mod lock;
pub mod semaphore;

pub use lock::Lock;
pub use semaphore::Semaphore;
