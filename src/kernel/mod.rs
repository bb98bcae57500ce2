//! The kernel: processes, descriptors, mounts and the syscall surface
//!
//! Everything hangs off a [`Computer`]. There is no global state; callers
//! hold the computer and pass it (with a pid) into every syscall.

pub mod config;
pub mod cred;
pub mod dispatch;
pub mod errno;
pub mod fd;
pub mod mount;
pub mod process;
pub mod runner;
pub mod syscall;


pub use config::KernelConfig;
pub use cred::{Credentials, Gid, Uid};
pub use dispatch::SyscallNr;
pub use errno::Errno;
pub use fd::{Fd, FileDescriptor};
pub use mount::{Mount, MountError, MountOptions, MountTable};
pub use process::{FileTable, Pid, Process};
pub use runner::{NullRunner, ProgramRunner};
pub use syscall::{Computer, Stat, SyscallError, SyscallResult, Utsname};
