/*
 * System Call Handlers
 *
 * One function per syscall. Argument word offsets follow the user-side
 * call stubs: single-argument calls pass at word 1, two-argument calls at
 * words 4-5, three-argument calls at words 5-7.
 *
 * Filesystem-touching calls hold the global filesystem lock for the
 * duration of the filesystem work and nothing else; console I/O never
 * takes it. Buffers are validated before any filesystem state changes.
 */

use alloc::vec;

use crate::fs;
use crate::io::console;
use crate::io::fd::{STDIN_FD, STDOUT_FD};
use crate::scheduler::Tid;
use crate::scheduler::process;
use crate::sync::lock;

use super::TrapFrame;
use super::usermem;

/// Run `f` with the global filesystem lock held.
fn with_fs_lock<R>(f: impl FnOnce() -> R) -> R {
    lock::acquire(fs::fs_lock());
    let result = f();
    lock::release(fs::fs_lock());
    result
}

pub(super) fn sys_halt() -> ! {
    crate::platform::get().power_off()
}

pub(super) fn sys_exit(frame: &TrapFrame) -> ! {
    let status = frame.arg(1) as i32;
    process::exit(status)
}

pub(super) fn sys_exec(frame: &mut TrapFrame) {
    let cmdline = usermem::read_cstr(frame.arg(1));
    frame.eax = match process::exec(&cmdline) {
        Some(tid) => tid.0,
        None => -1,
    };
}

pub(super) fn sys_wait(frame: &mut TrapFrame) {
    let tid = Tid(frame.arg(1) as i32);
    frame.eax = process::wait(tid);
}

pub(super) fn sys_create(frame: &mut TrapFrame) {
    let name = usermem::read_cstr(frame.arg(4));
    let size = frame.arg(5);
    let created = with_fs_lock(|| fs::create(&name, size));
    frame.eax = created as i32;
}

pub(super) fn sys_remove(frame: &mut TrapFrame) {
    let name = usermem::read_cstr(frame.arg(1));
    let removed = with_fs_lock(|| fs::remove(&name));
    frame.eax = removed as i32;
}

pub(super) fn sys_open(frame: &mut TrapFrame) {
    let name = usermem::read_cstr(frame.arg(1));
    let file = with_fs_lock(|| fs::open(&name));
    frame.eax = match file {
        Some(file) => process::install_file(file),
        None => -1,
    };
}

pub(super) fn sys_filesize(frame: &mut TrapFrame) {
    let fd = frame.arg(1) as i32;
    frame.eax = with_fs_lock(|| process::with_file(fd, |file| file.length() as i32))
        .unwrap_or(-1);
}

pub(super) fn sys_read(frame: &mut TrapFrame) {
    let fd = frame.arg(5) as i32;
    let buf = frame.arg(6);
    let size = frame.arg(7) as usize;
    usermem::check_range(buf, size);

    if fd == STDOUT_FD {
        frame.eax = -1;
        return;
    }
    if fd == STDIN_FD {
        let mut data = vec![0u8; size];
        for byte in data.iter_mut() {
            *byte = console::getc();
        }
        usermem::copy_out(buf, &data);
        frame.eax = size as i32;
        return;
    }

    let mut data = vec![0u8; size];
    let read = with_fs_lock(|| process::with_file(fd, |file| file.read(&mut data)));
    frame.eax = match read {
        Some(n) => {
            usermem::copy_out(buf, &data[..n]);
            n as i32
        }
        None => -1,
    };
}

pub(super) fn sys_write(frame: &mut TrapFrame) {
    let fd = frame.arg(5) as i32;
    let buf = frame.arg(6);
    let size = frame.arg(7) as usize;
    let data = usermem::copy_in(buf, size);

    if fd == STDIN_FD {
        frame.eax = -1;
        return;
    }
    if fd == STDOUT_FD {
        // Console output does not touch the filesystem, so no lock.
        console::putbuf(&data);
        frame.eax = data.len() as i32;
        return;
    }

    let written = with_fs_lock(|| process::with_file(fd, |file| file.write(&data)));
    frame.eax = match written {
        Some(n) => n as i32,
        None => -1,
    };
}

pub(super) fn sys_seek(frame: &mut TrapFrame) {
    let fd = frame.arg(4) as i32;
    let pos = frame.arg(5);
    with_fs_lock(|| process::with_file(fd, |file| file.seek(pos)));
}

pub(super) fn sys_tell(frame: &mut TrapFrame) {
    let fd = frame.arg(1) as i32;
    frame.eax = with_fs_lock(|| process::with_file(fd, |file| file.tell() as i32))
        .unwrap_or(-1);
}

pub(super) fn sys_close(frame: &mut TrapFrame) {
    let fd = frame.arg(1) as i32;
    with_fs_lock(|| process::close_file(fd));
}
