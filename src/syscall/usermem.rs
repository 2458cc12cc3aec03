/*
 * User Memory Access
 *
 * Every byte the kernel touches on behalf of a user program is checked
 * against the current address space first: the address must be strictly
 * below the user/kernel boundary and its page must be mapped. A failed
 * check is not an error the caller sees: the offending process is forced
 * into exit(-1) on the spot, so the accessors below either return valid
 * data or do not return.
 */

use alloc::string::String;
use alloc::vec::Vec;

use crate::memory::is_user_vaddr;
use crate::scheduler::process;

/// Kill the current process for touching memory it does not own.
fn fault() -> ! {
    process::exit(-1)
}

fn try_read_byte(vaddr: u32) -> Option<u8> {
    if !is_user_vaddr(vaddr) {
        return None;
    }
    process::with_current_pagedir(|pd| pd.read_byte(vaddr)).flatten()
}

/// Read a 4-byte little-endian word from user memory.
pub fn read_word(vaddr: u32) -> u32 {
    let mut bytes = [0u8; 4];
    for (i, byte) in bytes.iter_mut().enumerate() {
        let addr = vaddr.checked_add(i as u32).unwrap_or_else(|| fault());
        *byte = try_read_byte(addr).unwrap_or_else(|| fault());
    }
    u32::from_le_bytes(bytes)
}

/// Read a NUL-terminated string from user memory.
pub fn read_cstr(vaddr: u32) -> String {
    let mut bytes = Vec::new();
    let mut addr = vaddr;
    loop {
        let byte = try_read_byte(addr).unwrap_or_else(|| fault());
        if byte == 0 {
            break;
        }
        bytes.push(byte);
        addr = addr.checked_add(1).unwrap_or_else(|| fault());
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Copy `len` bytes out of user memory.
pub fn copy_in(vaddr: u32, len: usize) -> Vec<u8> {
    if len == 0 {
        return Vec::new();
    }
    process::with_current_pagedir(|pd| pd.read_bytes(vaddr, len))
        .flatten()
        .unwrap_or_else(|| fault())
}

/// Copy `data` into user memory.
pub fn copy_out(vaddr: u32, data: &[u8]) {
    if data.is_empty() {
        return;
    }
    let wrote = process::with_current_pagedir(|pd| pd.write_bytes(vaddr, data)).unwrap_or(false);
    if !wrote {
        fault();
    }
}

/// Check that `len` bytes at `vaddr` are mapped user memory, without
/// copying anything. Zero-length ranges touch nothing and always pass.
pub fn check_range(vaddr: u32, len: usize) {
    if len == 0 {
        return;
    }
    let mapped = process::with_current_pagedir(|pd| {
        let Some(end) = vaddr.checked_add(len as u32 - 1) else {
            return false;
        };
        let mut addr = vaddr;
        loop {
            if !pd.is_mapped(addr) {
                return false;
            }
            let page_end = crate::memory::page_round_down(addr) + crate::memory::PAGE_SIZE as u32 - 1;
            if page_end >= end {
                return true;
            }
            addr = page_end + 1;
        }
    })
    .unwrap_or(false);
    if !mapped {
        fault();
    }
}
