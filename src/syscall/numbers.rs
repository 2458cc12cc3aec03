/*
 * System Call Numbers
 *
 * The syscall number sits at the top of the user stack when the software
 * interrupt fires; argument words follow at the fixed offsets each handler
 * expects. Results come back in the trap frame's return register, with -1
 * as the universal failure sentinel (create/remove report 0/1 booleans).
 */

/// Software interrupt vector for system calls (DPL 3, interrupts on).
pub const SYSCALL_VECTOR: u8 = 0x30;
/// Registered name of the syscall handler.
pub const SYSCALL_HANDLER_NAME: &str = "syscall";

/// Power off the machine. No return.
pub const SYS_HALT: u32 = 0;
/// Terminate the calling process with the status at word 1. No return.
pub const SYS_EXIT: u32 = 1;
/// Run the command line pointed to by word 1. Returns the child tid or -1.
pub const SYS_EXEC: u32 = 2;
/// Reap the child tid at word 1. Returns its exit status or -1.
pub const SYS_WAIT: u32 = 3;
/// Create the file named at word 4 with the size at word 5. Returns 0/1.
pub const SYS_CREATE: u32 = 4;
/// Remove the file named at word 1. Returns 0/1.
pub const SYS_REMOVE: u32 = 5;
/// Open the file named at word 1. Returns a new fd or -1.
pub const SYS_OPEN: u32 = 6;
/// Length of the file behind the fd at word 1, or -1.
pub const SYS_FILESIZE: u32 = 7;
/// Read size (word 7) bytes into the buffer (word 6) from the fd (word 5).
/// fd 0 reads the keyboard. Returns bytes read or -1.
pub const SYS_READ: u32 = 8;
/// Write size (word 7) bytes from the buffer (word 6) to the fd (word 5).
/// fd 1 writes the console. Returns bytes written or -1.
pub const SYS_WRITE: u32 = 9;
/// Seek the fd at word 4 to the position at word 5. No result.
pub const SYS_SEEK: u32 = 10;
/// Position of the fd at word 1, or -1.
pub const SYS_TELL: u32 = 11;
/// Close the fd at word 1. Unknown fds are ignored.
pub const SYS_CLOSE: u32 = 12;
