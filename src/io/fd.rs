/*
 * File Descriptor Table
 *
 * Per-process table of open files. Descriptors 0 and 1 are reserved for
 * the console (stdin/stdout) and never appear in the table; real files get
 * descriptors starting at 2. Allocation is monotonic: a closed descriptor
 * is never reused within the process.
 *
 * Lookup is a linear walk, which is the right trade for the handful of
 * files a process keeps open.
 */

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::fs::File;

/// Standard input descriptor (console).
pub const STDIN_FD: i32 = 0;
/// Standard output descriptor (console).
pub const STDOUT_FD: i32 = 1;
/// First descriptor handed out for opened files.
pub const FIRST_FILE_FD: i32 = 2;

pub struct OpenFile {
    pub fd: i32,
    pub file: Box<dyn File>,
}

pub struct FileTable {
    files: Vec<OpenFile>,
    next_fd: i32,
}

impl FileTable {
    pub fn new() -> Self {
        FileTable {
            files: Vec::new(),
            next_fd: FIRST_FILE_FD,
        }
    }

    /// Install an open file and return its freshly allocated descriptor.
    pub fn install(&mut self, file: Box<dyn File>) -> i32 {
        let fd = self.next_fd;
        self.next_fd += 1;
        self.files.push(OpenFile { fd, file });
        fd
    }

    /// Mutable access to the file behind `fd`, or None for unknown
    /// descriptors (including the reserved console descriptors).
    pub fn get_mut(&mut self, fd: i32) -> Option<&mut (dyn File + '_)> {
        for entry in self.files.iter_mut() {
            if entry.fd == fd {
                return Some(entry.file.as_mut());
            }
        }
        None
    }

    /// Close `fd`: remove the first matching record and drop its handle.
    /// Closing an unknown descriptor is a silent no-op.
    pub fn close(&mut self, fd: i32) {
        if let Some(position) = self.files.iter().position(|entry| entry.fd == fd) {
            self.files.remove(position);
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Take every open file out of the table, leaving it empty. Used at
    /// process exit to close files under the filesystem lock.
    pub fn drain(&mut self) -> Vec<OpenFile> {
        core::mem::take(&mut self.files)
    }
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FileSystem;
    use crate::fs::memfs::MemFileSystem;

    fn table_with(fs: &MemFileSystem, names: &[&str]) -> FileTable {
        let mut table = FileTable::new();
        for name in names {
            fs.create_with(name, b"x");
            table.install(fs.open(name).unwrap());
        }
        table
    }

    #[test]
    fn descriptors_start_at_two_and_never_recycle() {
        let fs = MemFileSystem::new();
        let mut table = table_with(&fs, &["a", "b"]);
        assert!(table.get_mut(2).is_some());
        assert!(table.get_mut(3).is_some());
        table.close(2);
        fs.create_with("c", b"x");
        let fd = table.install(fs.open("c").unwrap());
        assert_eq!(fd, 4);
        assert!(table.get_mut(2).is_none());
    }

    #[test]
    fn console_descriptors_are_never_in_the_table() {
        let fs = MemFileSystem::new();
        let mut table = table_with(&fs, &["a"]);
        assert!(table.get_mut(STDIN_FD).is_none());
        assert!(table.get_mut(STDOUT_FD).is_none());
        table.close(STDIN_FD); // silent no-op
        assert_eq!(table.len(), 1);
    }
}
