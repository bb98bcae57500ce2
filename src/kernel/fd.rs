//! File descriptors
//!
//! A descriptor remembers the path it was opened with, which mount served it
//! and the inode number it resolved to. It never owns the inode; that belongs
//! to the filesystem (procfs snapshots are freed by the filesystem on close).

use crate::vfs::{Ino, OpenFlags};

/// File descriptor - an index into a process's file table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fd(pub u32);

impl Fd {
    pub const STDIN: Fd = Fd(0);
    pub const STDOUT: Fd = Fd(1);
    pub const STDERR: Fd = Fd(2);
    /// First number handed out by open()
    pub const FIRST: Fd = Fd(3);
}

impl std::fmt::Display for Fd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fd:{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub fd: Fd,
    /// Absolute path given to open(), after cwd resolution
    pub path: String,
    /// Mount point of the filesystem that owns `ino`
    pub mount_point: String,
    pub ino: Ino,
    pub flags: OpenFlags,
    /// Offset just past the last byte transferred
    pub pos: usize,
    /// Writes extend the content instead of replacing it
    pub append: bool,
}

impl FileDescriptor {
    pub fn new(fd: Fd, path: &str, mount_point: &str, ino: Ino, flags: OpenFlags) -> Self {
        Self {
            fd,
            path: path.to_string(),
            mount_point: mount_point.to_string(),
            ino,
            flags,
            pos: 0,
            append: flags.append(),
        }
    }

    pub fn readable(&self) -> bool {
        self.flags.readable()
    }

    pub fn writable(&self) -> bool {
        self.flags.writable()
    }
}
