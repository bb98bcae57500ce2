//! Syscall numbers and the by-name dispatch boundary
//!
//! A scripting engine drives the kernel through [`Computer::dispatch`]:
//! a syscall name, the calling pid and JSON arguments in, a JSON value out.
//! Failures never escape as errors here. They come back as the usual C
//! sentinel for the call (`-1`, `null`, `""` or `[]`) with errno set on the
//! caller.

use super::errno::Errno;
use super::fd::Fd;
use super::process::Pid;
use super::syscall::{Computer, SyscallError, SyscallResult};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::str::FromStr;

/// System call numbers (x86_64 Linux numbering; getenv and setenv live in a
/// private range since Linux handles them in libc)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SyscallNr {
    // File I/O
    Read = 0,
    Write = 1,
    Open = 2,
    Close = 3,
    Stat = 4,

    // Process
    Getpid = 39,
    Execve = 59,
    Uname = 63,
    Getcwd = 79,
    Chdir = 80,
    Getppid = 110,

    // Filesystem
    Getdents = 78,
    Rename = 82,
    Mkdir = 83,
    Rmdir = 84,
    Link = 86,
    Unlink = 87,
    Symlink = 88,
    Readlink = 89,
    Chmod = 90,
    Chown = 92,

    // Users
    Getuid = 102,
    Getgid = 104,
    Setuid = 105,
    Setgid = 106,
    Geteuid = 107,
    Getegid = 108,

    // System
    Sethostname = 170,

    // Environment
    Getenv = 1000,
    Setenv = 1001,
}

impl SyscallNr {
    pub const ALL: [SyscallNr; 30] = [
        SyscallNr::Read,
        SyscallNr::Write,
        SyscallNr::Open,
        SyscallNr::Close,
        SyscallNr::Stat,
        SyscallNr::Getpid,
        SyscallNr::Execve,
        SyscallNr::Uname,
        SyscallNr::Getcwd,
        SyscallNr::Chdir,
        SyscallNr::Getppid,
        SyscallNr::Getdents,
        SyscallNr::Rename,
        SyscallNr::Mkdir,
        SyscallNr::Rmdir,
        SyscallNr::Link,
        SyscallNr::Unlink,
        SyscallNr::Symlink,
        SyscallNr::Readlink,
        SyscallNr::Chmod,
        SyscallNr::Chown,
        SyscallNr::Getuid,
        SyscallNr::Getgid,
        SyscallNr::Setuid,
        SyscallNr::Setgid,
        SyscallNr::Geteuid,
        SyscallNr::Getegid,
        SyscallNr::Sethostname,
        SyscallNr::Getenv,
        SyscallNr::Setenv,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SyscallNr::Read => "read",
            SyscallNr::Write => "write",
            SyscallNr::Open => "open",
            SyscallNr::Close => "close",
            SyscallNr::Stat => "stat",
            SyscallNr::Getpid => "getpid",
            SyscallNr::Execve => "execve",
            SyscallNr::Uname => "uname",
            SyscallNr::Getcwd => "getcwd",
            SyscallNr::Chdir => "chdir",
            SyscallNr::Getppid => "getppid",
            SyscallNr::Getdents => "getdents",
            SyscallNr::Rename => "rename",
            SyscallNr::Mkdir => "mkdir",
            SyscallNr::Rmdir => "rmdir",
            SyscallNr::Link => "link",
            SyscallNr::Unlink => "unlink",
            SyscallNr::Symlink => "symlink",
            SyscallNr::Readlink => "readlink",
            SyscallNr::Chmod => "chmod",
            SyscallNr::Chown => "chown",
            SyscallNr::Getuid => "getuid",
            SyscallNr::Getgid => "getgid",
            SyscallNr::Setuid => "setuid",
            SyscallNr::Setgid => "setgid",
            SyscallNr::Geteuid => "geteuid",
            SyscallNr::Getegid => "getegid",
            SyscallNr::Sethostname => "sethostname",
            SyscallNr::Getenv => "getenv",
            SyscallNr::Setenv => "setenv",
        }
    }

    pub fn num(&self) -> u32 {
        *self as u32
    }

    /// What the call returns to a script when it fails
    pub fn sentinel(&self) -> Value {
        match self {
            SyscallNr::Read | SyscallNr::Stat | SyscallNr::Getenv => Value::Null,
            SyscallNr::Readlink | SyscallNr::Getcwd => json!(""),
            SyscallNr::Getdents | SyscallNr::Uname => json!([]),
            _ => json!(-1),
        }
    }
}

impl std::fmt::Display for SyscallNr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), self.num())
    }
}

impl FromStr for SyscallNr {
    type Err = SyscallError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        SyscallNr::ALL
            .iter()
            .copied()
            .find(|nr| nr.name() == name)
            .ok_or(SyscallError::NoSuchSyscall)
    }
}

/// Positional access to JSON arguments; a missing or mistyped argument is
/// EINVAL
struct Args<'a>(&'a [Value]);

impl<'a> Args<'a> {
    fn get(&self, i: usize) -> Option<&'a Value> {
        self.0.get(i).filter(|v| !v.is_null())
    }

    fn str(&self, i: usize) -> SyscallResult<&'a str> {
        self.get(i)
            .and_then(Value::as_str)
            .ok_or(SyscallError::InvalidArgument)
    }

    fn u32(&self, i: usize) -> SyscallResult<u32> {
        self.get(i)
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or(SyscallError::InvalidArgument)
    }

    fn u32_or(&self, i: usize, default: u32) -> SyscallResult<u32> {
        match self.get(i) {
            Some(_) => self.u32(i),
            None => Ok(default),
        }
    }

    fn fd(&self, i: usize) -> SyscallResult<Fd> {
        self.u32(i).map(Fd)
    }

    /// Optional list of strings
    fn strings(&self, i: usize) -> SyscallResult<Vec<String>> {
        let Some(value) = self.get(i) else {
            return Ok(Vec::new());
        };
        value
            .as_array()
            .ok_or(SyscallError::InvalidArgument)?
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or(SyscallError::InvalidArgument)
            })
            .collect()
    }

    /// Optional string-to-string map
    fn env(&self, i: usize) -> SyscallResult<HashMap<String, String>> {
        let Some(value) = self.get(i) else {
            return Ok(HashMap::new());
        };
        value
            .as_object()
            .ok_or(SyscallError::InvalidArgument)?
            .iter()
            .map(|(key, v)| {
                v.as_str()
                    .map(|s| (key.clone(), s.to_string()))
                    .ok_or(SyscallError::InvalidArgument)
            })
            .collect()
    }
}

impl Computer {
    /// Run the syscall called `name` for `pid` with JSON arguments
    pub fn dispatch(&mut self, pid: Pid, name: &str, args: &[Value]) -> Value {
        let nr = match name.parse::<SyscallNr>() {
            Ok(nr) => nr,
            Err(e) => {
                log::debug!("{}: unknown syscall {:?}", pid, name);
                self.set_errno(pid, e.errno());
                return json!(-1);
            }
        };

        match self.dispatch_nr(pid, nr, &Args(args)) {
            Ok(value) => value,
            Err(e) => {
                // Argument errors never reached a sys_* body
                self.set_errno(pid, e.errno());
                nr.sentinel()
            }
        }
    }

    fn set_errno(&mut self, pid: Pid, errno: Errno) {
        self.process_mut(pid)
            .unwrap_or_else(|| panic!("syscall from unknown {}", pid))
            .errno = errno;
    }

    fn dispatch_nr(&mut self, pid: Pid, nr: SyscallNr, args: &Args) -> SyscallResult<Value> {
        let value = match nr {
            SyscallNr::Open => {
                let fd = self.sys_open(pid, args.str(0)?, args.u32(1)?, args.u32_or(2, 0o644)?)?;
                json!(fd.0)
            }
            SyscallNr::Close => {
                self.sys_close(pid, args.fd(0)?)?;
                json!(0)
            }
            SyscallNr::Read => {
                let data = self.sys_read(pid, args.fd(0)?)?;
                json!(String::from_utf8_lossy(&data))
            }
            SyscallNr::Write => {
                let written = self.sys_write(pid, args.fd(0)?, args.str(1)?.as_bytes())?;
                json!(written)
            }
            SyscallNr::Stat => serde_json::to_value(self.sys_stat(pid, args.str(0)?)?)
                .map_err(|_| SyscallError::InvalidArgument)?,
            SyscallNr::Getcwd => json!(self.sys_getcwd(pid)?),
            SyscallNr::Chdir => {
                self.sys_chdir(pid, args.str(0)?)?;
                json!(0)
            }
            SyscallNr::Execve => {
                let status =
                    self.sys_execve(pid, args.str(0)?, &args.strings(1)?, &args.env(2)?)?;
                json!(status)
            }
            SyscallNr::Mkdir => {
                self.sys_mkdir(pid, args.str(0)?, args.u32_or(1, 0o755)?)?;
                json!(0)
            }
            SyscallNr::Rmdir => {
                self.sys_rmdir(pid, args.str(0)?)?;
                json!(0)
            }
            SyscallNr::Unlink => {
                self.sys_unlink(pid, args.str(0)?)?;
                json!(0)
            }
            SyscallNr::Rename => {
                self.sys_rename(pid, args.str(0)?, args.str(1)?)?;
                json!(0)
            }
            SyscallNr::Link => {
                self.sys_link(pid, args.str(0)?, args.str(1)?)?;
                json!(0)
            }
            SyscallNr::Symlink => {
                self.sys_symlink(pid, args.str(0)?, args.str(1)?)?;
                json!(0)
            }
            SyscallNr::Readlink => json!(self.sys_readlink(pid, args.str(0)?)?),
            SyscallNr::Getdents => json!(self.sys_getdents(pid, args.str(0)?)?),
            SyscallNr::Chmod => {
                self.sys_chmod(pid, args.str(0)?, args.u32(1)?)?;
                json!(0)
            }
            SyscallNr::Chown => {
                self.sys_chown(pid, args.str(0)?, args.u32(1)?, args.u32(2)?)?;
                json!(0)
            }
            SyscallNr::Setuid => {
                self.sys_setuid(pid, args.u32(0)?)?;
                json!(0)
            }
            SyscallNr::Setgid => {
                self.sys_setgid(pid, args.u32(0)?)?;
                json!(0)
            }
            SyscallNr::Getuid => json!(self.sys_getuid(pid)?),
            SyscallNr::Geteuid => json!(self.sys_geteuid(pid)?),
            SyscallNr::Getgid => json!(self.sys_getgid(pid)?),
            SyscallNr::Getegid => json!(self.sys_getegid(pid)?),
            SyscallNr::Getpid => json!(self.sys_getpid(pid)?),
            SyscallNr::Getppid => json!(self.sys_getppid(pid)?),
            SyscallNr::Getenv => json!(self.sys_getenv(pid, args.str(0)?)?),
            SyscallNr::Setenv => {
                self.sys_setenv(pid, args.str(0)?, args.str(1)?)?;
                json!(0)
            }
            SyscallNr::Sethostname => {
                self.sys_sethostname(pid, args.str(0)?)?;
                json!(0)
            }
            SyscallNr::Uname => json!(self.sys_uname(pid)?.to_vec()),
        };
        Ok(value)
    }
}
