//! blackhat - a simulated Unix machine for hacking games
//!
//! A [`Computer`] owns an in-memory inode filesystem, a `/proc`, a process
//! table and a Linux-flavoured syscall surface. Programs are opaque bytes
//! handed to a [`ProgramRunner`], which calls back into the computer (by
//! method or through [`Computer::dispatch`]) as the process it runs.
//!
//! ```
//! use blackhat::kernel::{Computer, Credentials};
//! use blackhat::vfs::OpenFlags;
//!
//! let mut computer = Computer::default();
//! let pid = computer.create_process(&["sh"], Credentials::root());
//! let fd = computer
//!     .sys_open(pid, "/tmp/note", OpenFlags::O_WRONLY | OpenFlags::O_CREAT, 0o644)
//!     .unwrap();
//! computer.sys_write(pid, fd, b"hello").unwrap();
//! ```

pub mod kernel;
pub mod vfs;

pub use kernel::{Computer, KernelConfig, Pid, ProgramRunner, SyscallError, SyscallResult};
pub use vfs::{Filesystem, FsError, FsResult};
