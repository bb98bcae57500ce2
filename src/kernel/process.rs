//! Process abstraction
//!
//! A process owns its credentials, working directory, environment and file
//! table. There is no scheduler: a process runs to completion inside the
//! execve call that started it, so there is no state machine either.

use super::cred::Credentials;
use super::errno::Errno;
use super::fd::{Fd, FileDescriptor};
use crate::vfs::{Ino, OpenFlags};
use std::collections::{BTreeMap, HashMap};

/// Default per-process descriptor limit (RLIMIT_NOFILE)
pub const MAX_FDS_PER_PROCESS: usize = 1024;

/// Process identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(pub u32);

impl Pid {
    /// The first userland process
    pub const INIT: Pid = Pid(1);
}

impl std::fmt::Display for Pid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pid:{}", self.0)
    }
}

/// Per-process file descriptor table.
///
/// Numbers come from an accumulator that only moves forward, so a closed
/// number is never handed out again in the life of the process.
#[derive(Debug, Clone)]
pub struct FileTable {
    /// Next fd to allocate
    next_fd: u32,
    table: BTreeMap<Fd, FileDescriptor>,
    max_fds: usize,
}

impl FileTable {
    pub fn new() -> Self {
        Self::with_limit(MAX_FDS_PER_PROCESS)
    }

    pub fn with_limit(max_fds: usize) -> Self {
        Self {
            next_fd: Fd::FIRST.0, // 0, 1, 2 reserved for stdin/stdout/stderr
            table: BTreeMap::new(),
            max_fds,
        }
    }

    /// Allocate a descriptor. Returns None if the limit has been reached.
    pub fn alloc(&mut self, path: &str, mount_point: &str, ino: Ino, flags: OpenFlags) -> Option<Fd> {
        if self.table.len() >= self.max_fds {
            return None;
        }
        let fd = Fd(self.next_fd);
        self.next_fd += 1;
        self.table
            .insert(fd, FileDescriptor::new(fd, path, mount_point, ino, flags));
        Some(fd)
    }

    pub fn get(&self, fd: Fd) -> Option<&FileDescriptor> {
        self.table.get(&fd)
    }

    pub fn get_mut(&mut self, fd: Fd) -> Option<&mut FileDescriptor> {
        self.table.get_mut(&fd)
    }

    pub fn remove(&mut self, fd: Fd) -> Option<FileDescriptor> {
        self.table.remove(&fd)
    }

    pub fn contains(&self, fd: Fd) -> bool {
        self.table.contains_key(&fd)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn max_fds(&self) -> usize {
        self.max_fds
    }

    /// Open descriptor numbers in ascending order
    pub fn fds(&self) -> Vec<Fd> {
        self.table.keys().copied().collect()
    }
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}

/// A process in the system
#[derive(Debug, Clone)]
pub struct Process {
    pub pid: Pid,
    /// Parent process (None for init)
    pub parent: Option<Pid>,
    /// argv as given to execve
    pub cmdline: Vec<String>,
    /// Absolute, normalised working directory
    pub cwd: String,
    pub environ: HashMap<String, String>,
    pub cred: Credentials,
    /// Left by the last failing syscall
    pub errno: Errno,
    pub files: FileTable,
    /// Exit status of the most recently completed child
    pub last_exit: Option<i32>,
}

impl Process {
    pub fn new(pid: Pid, parent: Option<Pid>, cmdline: Vec<String>, cred: Credentials) -> Self {
        Self {
            pid,
            parent,
            cmdline,
            cwd: "/".to_string(),
            environ: HashMap::new(),
            cred,
            errno: Errno::NONE,
            files: FileTable::new(),
            last_exit: None,
        }
    }

    /// A child started by this process: it runs as our effective identity
    /// and gets its own copy of cwd and environment
    pub fn spawn_child(&self, pid: Pid, cmdline: Vec<String>, max_fds: usize) -> Self {
        Self {
            cwd: self.cwd.clone(),
            environ: self.environ.clone(),
            files: FileTable::with_limit(max_fds),
            ..Self::new(pid, Some(self.pid), cmdline, self.cred.for_child())
        }
    }

    /// Program name (argv[0])
    pub fn name(&self) -> &str {
        self.cmdline.first().map(String::as_str).unwrap_or("")
    }

    pub fn getenv(&self, key: &str) -> Option<&str> {
        self.environ.get(key).map(String::as_str)
    }

    pub fn setenv(&mut self, key: &str, value: &str) {
        self.environ.insert(key.to_string(), value.to_string());
    }
}
