/*
 * Console
 *
 * Thin forwarding layer over the platform's console contract. Console
 * output bypasses the filesystem entirely, so `putbuf` is callable without
 * the filesystem lock.
 */

/// Write a buffer to the console.
pub fn putbuf(buf: &[u8]) {
    crate::platform::get().console_write(buf);
}

/// Read one character from the console input.
pub fn getc() -> u8 {
    crate::platform::get().input_getc()
}
