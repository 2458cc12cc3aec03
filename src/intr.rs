/*
 * Interrupt State Emulation
 *
 * The portable core models the CPU interrupt-enable flag explicitly instead
 * of touching hardware: scheduler-internal state is only ever mutated with
 * "interrupts" disabled, and the external timer entry point runs with the
 * in-handler flag set. The platform's real interrupt controller (or, on the
 * hosted platform, the caller of `timer::interrupt`) is the only source of
 * asynchronous entry, so a process-wide flag is an exact model of the
 * single-CPU enable bit.
 *
 * The API mirrors the save/restore discipline of the original design:
 * `disable()` returns the previous level and callers restore it with
 * `set_level()`, so nested critical sections compose. Every context switch
 * happens with interrupts disabled, and each thread restores its own saved
 * level afterwards.
 */

use core::sync::atomic::{AtomicBool, Ordering};

static ENABLED: AtomicBool = AtomicBool::new(false);
static IN_HANDLER: AtomicBool = AtomicBool::new(false);
static YIELD_ON_RETURN: AtomicBool = AtomicBool::new(false);

/// Interrupt enable level, as saved and restored around critical sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    On,
    Off,
}

/// Are interrupts currently enabled?
pub fn enabled() -> bool {
    ENABLED.load(Ordering::SeqCst)
}

pub fn get_level() -> Level {
    if enabled() { Level::On } else { Level::Off }
}

/// Disable interrupts and return the previous level.
pub fn disable() -> Level {
    if ENABLED.swap(false, Ordering::SeqCst) {
        Level::On
    } else {
        Level::Off
    }
}

/// Enable interrupts and return the previous level.
///
/// # Panics
/// Panics when called from an interrupt handler; handlers run to completion
/// with interrupts masked.
pub fn enable() -> Level {
    assert!(
        !in_handler(),
        "interrupts cannot be enabled inside an interrupt handler"
    );
    if ENABLED.swap(true, Ordering::SeqCst) {
        Level::On
    } else {
        Level::Off
    }
}

/// Restore a previously saved interrupt level.
pub fn set_level(level: Level) -> Level {
    match level {
        Level::On => enable(),
        Level::Off => disable(),
    }
}

/// Run `f` with interrupts disabled, restoring the previous level after.
pub fn without_interrupts<R>(f: impl FnOnce() -> R) -> R {
    let old = disable();
    let result = f();
    set_level(old);
    result
}

/// Is the current context an (emulated) external interrupt handler?
pub fn in_handler() -> bool {
    IN_HANDLER.load(Ordering::SeqCst)
}

/// Mark entry into an external interrupt handler. Interrupts must already
/// be disabled by the caller.
pub(crate) fn handler_begin() {
    debug_assert!(!enabled());
    let was = IN_HANDLER.swap(true, Ordering::SeqCst);
    debug_assert!(!was, "nested interrupt handlers are not supported");
}

pub(crate) fn handler_end() {
    let was = IN_HANDLER.swap(false, Ordering::SeqCst);
    debug_assert!(was);
}

/// Ask for a yield once the current interrupt handler returns. Only
/// meaningful inside a handler; the interrupt entry consumes the request.
pub(crate) fn request_yield_on_return() {
    debug_assert!(in_handler());
    YIELD_ON_RETURN.store(true, Ordering::SeqCst);
}

pub(crate) fn take_yield_request() -> bool {
    YIELD_ON_RETURN.swap(false, Ordering::SeqCst)
}

/// Reset the emulated flags at boot (interrupts masked, no handler active).
pub(crate) fn reset() {
    ENABLED.store(false, Ordering::SeqCst);
    IN_HANDLER.store(false, Ordering::SeqCst);
    YIELD_ON_RETURN.store(false, Ordering::SeqCst);
}
