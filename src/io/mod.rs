/*
 * I/O Support
 *
 * Console forwarding to the platform contract and the per-process file
 * descriptor table.
 */

pub mod console;
pub mod fd;

pub use fd::FileTable;
