/*
 * System Call Dispatch
 *
 * User programs enter the kernel through a software interrupt (vector
 * 0x30); the trap frame carries the user stack pointer and the return
 * register. The dispatcher reads the syscall number from the top of the
 * user stack, fans out to the handler, and the handler pulls its argument
 * words from the fixed offsets the user-side call stubs use.
 *
 * Every word read and every user pointer dereferenced goes through the
 * validating accessors in `usermem`; a bad address anywhere terminates the
 * calling process with exit(-1) instead of returning.
 */

pub mod handlers;
pub mod numbers;
pub mod usermem;

use numbers::*;

use crate::scheduler::process;

/// Saved user state a syscall sees: the trapped stack pointer and the
/// register the result is written to.
#[derive(Debug, Clone, Copy)]
pub struct TrapFrame {
    /// User stack pointer at the moment of the trap. The syscall number
    /// lives at this address, arguments at fixed word offsets above it.
    pub esp: u32,
    /// Return register; the result of the call, if any, is stored here.
    pub eax: i32,
}

impl TrapFrame {
    pub fn new(esp: u32) -> Self {
        TrapFrame { esp, eax: 0 }
    }

    /// Argument word `index` words above the stack pointer.
    fn arg(&self, index: u32) -> u32 {
        let addr = self
            .esp
            .checked_add(index * 4)
            .unwrap_or_else(|| process::exit(-1));
        usermem::read_word(addr)
    }
}

/// Software-interrupt entry point: decode and run one system call.
pub fn dispatch(frame: &mut TrapFrame) {
    let number = usermem::read_word(frame.esp);
    match number {
        SYS_HALT => handlers::sys_halt(),
        SYS_EXIT => handlers::sys_exit(frame),
        SYS_EXEC => handlers::sys_exec(frame),
        SYS_WAIT => handlers::sys_wait(frame),
        SYS_CREATE => handlers::sys_create(frame),
        SYS_REMOVE => handlers::sys_remove(frame),
        SYS_OPEN => handlers::sys_open(frame),
        SYS_FILESIZE => handlers::sys_filesize(frame),
        SYS_READ => handlers::sys_read(frame),
        SYS_WRITE => handlers::sys_write(frame),
        SYS_SEEK => handlers::sys_seek(frame),
        SYS_TELL => handlers::sys_tell(frame),
        SYS_CLOSE => handlers::sys_close(frame),
        unknown => {
            log::warn!("unknown syscall {}", unknown);
            process::exit(-1);
        }
    }
}
