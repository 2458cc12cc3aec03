/*
 * In-Memory Filesystem
 *
 * Flat-namespace filesystem backed by heap buffers, used by the hosted
 * tests and available to embedders that want a ramdisk. Files are created
 * at a fixed size and never grow; removing a file unlinks the name while
 * open handles keep the inode alive.
 */

use alloc::borrow::ToOwned;
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;

use core::sync::atomic::{AtomicU32, Ordering};

use spin::Mutex;

use super::{File, FileSystem};

struct MemInode {
    data: Mutex<Box<[u8]>>,
    deny_write: AtomicU32,
}

impl MemInode {
    fn new(size: u32) -> Arc<Self> {
        Arc::new(MemInode {
            data: Mutex::new(vec![0u8; size as usize].into_boxed_slice()),
            deny_write: AtomicU32::new(0),
        })
    }
}

pub struct MemFileSystem {
    files: Mutex<BTreeMap<String, Arc<MemInode>>>,
}

impl MemFileSystem {
    pub fn new() -> Self {
        MemFileSystem {
            files: Mutex::new(BTreeMap::new()),
        }
    }

    /// Create a file with the given contents, replacing any previous file
    /// of that name. Convenience for seeding test fixtures.
    pub fn create_with(&self, name: &str, contents: &[u8]) {
        let inode = MemInode::new(contents.len() as u32);
        inode.data.lock().copy_from_slice(contents);
        self.files.lock().insert(name.to_owned(), inode);
    }
}

impl Default for MemFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for MemFileSystem {
    fn open(&self, name: &str) -> Option<Box<dyn File>> {
        let inode = self.files.lock().get(name)?.clone();
        Some(Box::new(MemFile {
            inode,
            pos: 0,
            denied: false,
        }))
    }

    fn create(&self, name: &str, initial_size: u32) -> bool {
        if name.is_empty() {
            return false;
        }
        let mut files = self.files.lock();
        if files.contains_key(name) {
            return false;
        }
        files.insert(name.to_owned(), MemInode::new(initial_size));
        true
    }

    fn remove(&self, name: &str) -> bool {
        self.files.lock().remove(name).is_some()
    }
}

struct MemFile {
    inode: Arc<MemInode>,
    pos: u32,
    denied: bool,
}

impl File for MemFile {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let data = self.inode.data.lock();
        let pos = (self.pos as usize).min(data.len());
        let n = buf.len().min(data.len() - pos);
        buf[..n].copy_from_slice(&data[pos..pos + n]);
        self.pos += n as u32;
        n
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        if self.inode.deny_write.load(Ordering::SeqCst) > 0 {
            return 0;
        }
        let mut data = self.inode.data.lock();
        let pos = (self.pos as usize).min(data.len());
        let n = buf.len().min(data.len() - pos);
        data[pos..pos + n].copy_from_slice(&buf[..n]);
        self.pos += n as u32;
        n
    }

    fn seek(&mut self, pos: u32) {
        self.pos = pos;
    }

    fn tell(&self) -> u32 {
        self.pos
    }

    fn length(&self) -> u32 {
        self.inode.data.lock().len() as u32
    }

    fn deny_write(&mut self) {
        if !self.denied {
            self.denied = true;
            self.inode.deny_write.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn allow_write(&mut self) {
        if self.denied {
            self.denied = false;
            self.inode.deny_write.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MemFile {
    fn drop(&mut self) {
        self.allow_write();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_open_read_write() {
        let fs = MemFileSystem::new();
        assert!(fs.create("a.txt", 8));
        assert!(!fs.create("a.txt", 8));
        assert!(!fs.create("", 8));

        let mut f = fs.open("a.txt").unwrap();
        assert_eq!(f.length(), 8);
        assert_eq!(f.write(b"hello world"), 8);
        assert_eq!(f.tell(), 8);
        f.seek(0);
        let mut buf = [0u8; 16];
        assert_eq!(f.read(&mut buf), 8);
        assert_eq!(&buf[..8], b"hello wo");
    }

    #[test]
    fn removed_file_stays_readable_through_open_handle() {
        let fs = MemFileSystem::new();
        fs.create_with("gone.txt", b"data");
        let mut f = fs.open("gone.txt").unwrap();
        assert!(fs.remove("gone.txt"));
        assert!(fs.open("gone.txt").is_none());
        assert!(!fs.remove("gone.txt"));
        let mut buf = [0u8; 4];
        assert_eq!(f.read(&mut buf), 4);
        assert_eq!(&buf, b"data");
    }

    #[test]
    fn deny_write_blocks_all_handles_until_allowed() {
        let fs = MemFileSystem::new();
        fs.create_with("exe", b"code");
        let mut guard = fs.open("exe").unwrap();
        let mut other = fs.open("exe").unwrap();
        guard.deny_write();
        guard.deny_write(); // idempotent per handle
        assert_eq!(other.write(b"x"), 0);
        guard.allow_write();
        assert_eq!(other.write(b"x"), 1);
    }

    #[test]
    fn dropping_a_denying_handle_releases_the_denial() {
        let fs = MemFileSystem::new();
        fs.create_with("exe", b"code");
        {
            let mut guard = fs.open("exe").unwrap();
            guard.deny_write();
        }
        let mut f = fs.open("exe").unwrap();
        assert_eq!(f.write(b"y"), 1);
    }
}
