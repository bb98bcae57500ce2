//! System call interface
//!
//! This is the boundary between programs and the kernel. Every syscall is a
//! `sys_*` method on [`Computer`] taking the calling pid. A failing call
//! leaves its errno on the caller before the error is returned, so a
//! program can carry on and inspect errno like it would on Linux.
//!
//! Paths are resolved against the caller's cwd, normalised, then routed to
//! the filesystem with the longest matching mount point. The mount point is
//! stripped before the filesystem sees the path.

use super::config::KernelConfig;
use super::cred::{Credentials, Gid, Uid};
use super::dispatch::SyscallNr;
use super::errno::Errno;
use super::fd::Fd;
use super::mount::{Mount, MountOptions, MountTable};
use super::process::{Pid, Process};
use super::runner::{NullRunner, ProgramRunner};
use crate::vfs::{
    Ext4, FileMode, Filesystem, FsError, Ino, Inode, OpenFlags, Permission, ProcFs,
    resolve_relative, split_parent,
};
use serde::Serialize;
use std::collections::HashMap;
use std::rc::Rc;

/// Kernel-level error, one per errno the kernel can produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyscallError {
    /// Permission bits or ownership refuse the request
    NotPermitted,
    /// File or path not found
    NotFound,
    /// The file cannot be executed as a program
    ExecFormatError,
    /// Unknown descriptor, or one opened without the needed access
    BadFileDescriptor,
    /// Descriptor in a bad state (close of an unknown fd)
    BadFileDescriptorState,
    AlreadyExists,
    InvalidArgument,
    /// The owning filesystem lacks this capability
    Unsupported { op: &'static str, fs: String },
    NotADirectory,
    IsADirectory,
    NotEmpty,
    /// Symlink chain too long
    TooManyLinks,
    /// Link or rename across mounts
    CrossDevice,
    TooManyOpenFiles,
    /// Unknown syscall name at the dispatch boundary
    NoSuchSyscall,
}

impl SyscallError {
    pub fn errno(&self) -> Errno {
        match self {
            SyscallError::NotPermitted => Errno::EPERM,
            SyscallError::NotFound => Errno::ENOENT,
            SyscallError::ExecFormatError => Errno::ENOEXEC,
            SyscallError::BadFileDescriptor => Errno::EBADF,
            SyscallError::BadFileDescriptorState => Errno::EBADFD,
            SyscallError::AlreadyExists => Errno::EEXIST,
            SyscallError::InvalidArgument => Errno::EINVAL,
            SyscallError::Unsupported { .. } => Errno::ENOSYS,
            SyscallError::NotADirectory => Errno::ENOTDIR,
            SyscallError::IsADirectory => Errno::EISDIR,
            SyscallError::NotEmpty => Errno::ENOTEMPTY,
            SyscallError::TooManyLinks => Errno::ELOOP,
            SyscallError::CrossDevice => Errno::EXDEV,
            SyscallError::TooManyOpenFiles => Errno::EMFILE,
            SyscallError::NoSuchSyscall => Errno::ENOSYS,
        }
    }
}

impl std::fmt::Display for SyscallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyscallError::NotPermitted => write!(f, "operation not permitted"),
            SyscallError::NotFound => write!(f, "no such file or directory"),
            SyscallError::ExecFormatError => write!(f, "exec format error"),
            SyscallError::BadFileDescriptor => write!(f, "bad file descriptor"),
            SyscallError::BadFileDescriptorState => {
                write!(f, "file descriptor in bad state")
            }
            SyscallError::AlreadyExists => write!(f, "file exists"),
            SyscallError::InvalidArgument => write!(f, "invalid argument"),
            SyscallError::Unsupported { op, fs } => write!(f, "{} not supported by {}", op, fs),
            SyscallError::NotADirectory => write!(f, "not a directory"),
            SyscallError::IsADirectory => write!(f, "is a directory"),
            SyscallError::NotEmpty => write!(f, "directory not empty"),
            SyscallError::TooManyLinks => write!(f, "too many levels of symbolic links"),
            SyscallError::CrossDevice => write!(f, "invalid cross-device link"),
            SyscallError::TooManyOpenFiles => write!(f, "too many open files"),
            SyscallError::NoSuchSyscall => write!(f, "function not implemented"),
        }
    }
}

impl std::error::Error for SyscallError {}

impl From<FsError> for SyscallError {
    fn from(e: FsError) -> Self {
        match e {
            FsError::NotFound => SyscallError::NotFound,
            FsError::AlreadyExists => SyscallError::AlreadyExists,
            FsError::NotPermitted => SyscallError::NotPermitted,
            FsError::NotADirectory => SyscallError::NotADirectory,
            FsError::IsADirectory => SyscallError::IsADirectory,
            FsError::NotEmpty => SyscallError::NotEmpty,
            FsError::InvalidArgument => SyscallError::InvalidArgument,
            FsError::TooManyLinks => SyscallError::TooManyLinks,
            FsError::Unsupported { op, fs } => SyscallError::Unsupported { op, fs },
        }
    }
}

pub type SyscallResult<T> = Result<T, SyscallError>;

/// Result of stat(2). Size, block and time fields are not tracked and
/// stay zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Stat {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: u64,
    pub blksize: u64,
    pub blocks: u64,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
}

impl Stat {
    fn from_inode(inode: &Inode) -> Self {
        Self {
            ino: inode.ino.0,
            mode: inode.mode.0,
            nlink: inode.links,
            uid: inode.uid.0,
            gid: inode.gid.0,
            ..Default::default()
        }
    }
}

/// Result of uname(2)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Utsname {
    pub sysname: String,
    pub nodename: String,
    pub release: String,
    pub version: String,
    pub machine: String,
    pub domainname: String,
}

impl Utsname {
    /// Fields in `struct utsname` order
    pub fn to_vec(&self) -> Vec<String> {
        vec![
            self.sysname.clone(),
            self.nodename.clone(),
            self.release.clone(),
            self.version.clone(),
            self.machine.clone(),
            self.domainname.clone(),
        ]
    }
}

/// The simulated machine: mounts, processes and the syscall surface
pub struct Computer {
    mounts: MountTable,
    processes: HashMap<Pid, Process>,
    /// Next PID to allocate; 1 is reserved for init
    next_pid: u32,
    hostname: String,
    config: KernelConfig,
    runner: Rc<dyn ProgramRunner>,
}

impl Computer {
    /// Boot a fresh machine: standard root filesystem, /proc and
    /// /etc/os-release. No process exists until `call_init` or
    /// `create_process`.
    pub fn new(config: KernelConfig) -> Self {
        let mut computer = Self {
            mounts: MountTable::new(),
            processes: HashMap::new(),
            next_pid: 2,
            hostname: config.hostname.clone(),
            config,
            runner: Rc::new(NullRunner),
        };

        if let Err(e) = computer.mount(
            "rootfs",
            "/",
            Box::new(Ext4::make_standard_fs()),
            MountOptions::new(),
        ) {
            log::error!("boot: cannot mount root filesystem: {}", e);
        }
        if computer.config.mount_proc {
            let procfs = ProcFs::new(computer.config.version_banner());
            if let Err(e) = computer.mount("proc", "/proc", Box::new(procfs), MountOptions::new()) {
                log::error!("boot: cannot mount /proc: {}", e);
            }
        }
        if let Err(e) = computer.write_os_release() {
            log::error!("boot: cannot write /etc/os-release: {}", e);
        }

        log::info!(
            "boot: {} {} ({}) up",
            computer.config.sysname,
            computer.config.release,
            computer.hostname
        );
        computer
    }

    /// Install the program runner used by execve and init
    pub fn with_runner(mut self, runner: impl ProgramRunner + 'static) -> Self {
        self.set_runner(runner);
        self
    }

    pub fn set_runner(&mut self, runner: impl ProgramRunner + 'static) {
        self.runner = Rc::new(runner);
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    fn write_os_release(&mut self) -> SyscallResult<()> {
        let content = self.config.os_release();
        let fs = self.fs_mut("/")?;
        let ino = match fs.find_inode("/etc/os-release") {
            Ok(inode) => inode.ino,
            Err(_) => fs.create(
                "/etc/os-release",
                Uid::ROOT,
                Gid::ROOT,
                FileMode::regular(0o644),
            )?,
        };
        fs.write(ino, content.as_bytes())?;
        Ok(())
    }

    // ========== MOUNTS ==========

    /// Attach a filesystem at `target`
    pub fn mount(
        &mut self,
        source: &str,
        target: &str,
        fs: Box<dyn Filesystem>,
        options: MountOptions,
    ) -> SyscallResult<()> {
        self.mounts
            .mount(source, target, fs, options)
            .map_err(|_| SyscallError::AlreadyExists)
    }

    pub fn mounts(&self) -> &MountTable {
        &self.mounts
    }

    fn mount_point(&self, path: &str) -> SyscallResult<String> {
        self.mounts
            .containing_mount_point(path)
            .ok_or(SyscallError::NotFound)
    }

    fn mount_ref(&self, mount_point: &str) -> SyscallResult<&Mount> {
        self.mounts.get(mount_point).ok_or(SyscallError::NotFound)
    }

    fn mount_mut(&mut self, mount_point: &str) -> SyscallResult<&mut Mount> {
        self.mounts
            .get_mut(mount_point)
            .ok_or(SyscallError::NotFound)
    }

    fn fs(&self, mount_point: &str) -> SyscallResult<&dyn Filesystem> {
        Ok(self.mount_ref(mount_point)?.fs.as_ref())
    }

    fn fs_mut(&mut self, mount_point: &str) -> SyscallResult<&mut dyn Filesystem> {
        Ok(self.mount_mut(mount_point)?.fs.as_mut())
    }

    /// Mount point and filesystem-relative path for an absolute path
    fn route(&self, abs: &str) -> SyscallResult<(String, String)> {
        let mount_point = self.mount_point(abs)?;
        let rel = self.mount_ref(&mount_point)?.relative_path(abs);
        Ok((mount_point, rel))
    }

    /// Like `route`, but refuses read-only mounts
    fn route_writable(&self, abs: &str) -> SyscallResult<(String, String)> {
        let (mount_point, rel) = self.route(abs)?;
        if self.mount_ref(&mount_point)?.options.read_only {
            return Err(SyscallError::NotPermitted);
        }
        Ok((mount_point, rel))
    }

    /// The inode an absolute path names, without following a final symlink
    fn lookup(&self, abs: &str) -> SyscallResult<&Inode> {
        let (mount_point, rel) = self.route(abs)?;
        Ok(self.fs(&mount_point)?.find_inode(&rel)?)
    }

    /// Follow symlinks starting at `ino`, which `path` names on
    /// `mount_point`. Targets are resolved at call time, across mounts, and
    /// relative targets against the directory holding the link. Returns the
    /// mount, inode and absolute path of the final non-link.
    fn follow(
        &self,
        mount_point: &str,
        ino: Ino,
        path: &str,
    ) -> SyscallResult<(String, Ino, String)> {
        let mut mount_point = mount_point.to_string();
        let mut ino = ino;
        let mut path = path.to_string();
        let mut hops = 0;

        loop {
            let inode = self.fs(&mount_point)?.find_inode_by_number(ino)?;
            let Some(target) = inode.link_target() else {
                return Ok((mount_point, ino, path));
            };
            if hops == self.config.max_symlink_hops {
                return Err(SyscallError::TooManyLinks);
            }
            hops += 1;

            let base = split_parent(&path)
                .map(|(parent, _)| parent)
                .unwrap_or_else(|_| "/".to_string());
            path = resolve_relative(&base, target);
            let (next_mount, rel) = self.route(&path)?;
            ino = self.fs(&next_mount)?.find_directory_entry(&rel)?.ino;
            mount_point = next_mount;
        }
    }

    /// Look up an absolute path, following a final symlink
    fn resolve(&self, abs: &str) -> SyscallResult<(String, Ino, String)> {
        let (mount_point, rel) = self.route(abs)?;
        let ino = self.fs(&mount_point)?.find_directory_entry(&rel)?.ino;
        self.follow(&mount_point, ino, abs)
    }

    // ========== PROCESSES ==========

    fn alloc_pid(&mut self) -> Pid {
        let pid = Pid(self.next_pid);
        self.next_pid += 1;
        pid
    }

    /// Create a top-level process (a login shell, say) without running
    /// anything in it
    pub fn create_process(&mut self, cmdline: &[&str], cred: Credentials) -> Pid {
        let pid = self.alloc_pid();
        let cmdline = cmdline.iter().map(|s| s.to_string()).collect();
        let mut process = Process::new(pid, None, cmdline, cred);
        process.files = super::process::FileTable::with_limit(self.config.max_fds_per_process);
        self.processes.insert(pid, process);
        log::info!("process: created {}", pid);
        pid
    }

    /// Drop a process, closing whatever it left open
    pub fn remove_process(&mut self, pid: Pid) -> Option<Process> {
        let mut process = self.processes.remove(&pid)?;
        for fd in process.files.fds() {
            if let Some(desc) = process.files.remove(fd)
                && let Ok(fs) = self.fs_mut(&desc.mount_point)
            {
                if let Err(e) = fs.close(desc.ino) {
                    log::debug!("{}: close of {} on exit failed: {}", pid, desc.fd, e);
                }
            }
        }
        log::info!("process: {} exited", pid);
        Some(process)
    }

    pub fn process(&self, pid: Pid) -> Option<&Process> {
        self.processes.get(&pid)
    }

    pub fn process_mut(&mut self, pid: Pid) -> Option<&mut Process> {
        self.processes.get_mut(&pid)
    }

    /// Pids of live processes, ascending
    pub fn pids(&self) -> Vec<Pid> {
        let mut pids: Vec<Pid> = self.processes.keys().copied().collect();
        pids.sort();
        pids
    }

    /// The errno left by the last failing syscall of `pid`
    pub fn errno(&self, pid: Pid) -> Errno {
        self.caller(pid).errno
    }

    fn caller(&self, pid: Pid) -> &Process {
        self.processes
            .get(&pid)
            .unwrap_or_else(|| panic!("syscall from unknown {}", pid))
    }

    fn caller_mut(&mut self, pid: Pid) -> &mut Process {
        self.processes
            .get_mut(&pid)
            .unwrap_or_else(|| panic!("syscall from unknown {}", pid))
    }

    fn abspath(&self, pid: Pid, path: &str) -> String {
        resolve_relative(&self.caller(pid).cwd, path)
    }

    /// Run a syscall body for `pid`, recording errno if it fails
    fn syscall<T>(
        &mut self,
        pid: Pid,
        nr: SyscallNr,
        body: impl FnOnce(&mut Self) -> SyscallResult<T>,
    ) -> SyscallResult<T> {
        self.caller(pid);
        log::debug!("{}: {}", pid, nr);
        let result = body(self);
        if let Err(e) = &result {
            log::debug!("{}: {} failed: {}", pid, nr, e);
            if let Some(process) = self.processes.get_mut(&pid) {
                process.errno = e.errno();
            }
        }
        result
    }

    /// Start /sbin/init as pid 1 with root credentials and run it to
    /// completion. A missing init is a kernel panic.
    pub fn call_init(&mut self) -> SyscallResult<i32> {
        let program = match self.read_init() {
            Ok(program) => program,
            Err(e) => {
                log::error!("Kernel panic - not syncing: /sbin/init: {}", e);
                return Err(e);
            }
        };

        let argv = vec!["/sbin/init".to_string()];
        let mut init = Process::new(Pid::INIT, None, argv.clone(), Credentials::root());
        init.files = super::process::FileTable::with_limit(self.config.max_fds_per_process);
        self.processes.insert(Pid::INIT, init);
        log::info!("init: starting /sbin/init as {}", Pid::INIT);

        let runner = Rc::clone(&self.runner);
        let status = runner.run(self, Pid::INIT, &program, &argv);
        log::warn!("init: exited with status {}", status);
        self.remove_process(Pid::INIT);
        Ok(status)
    }

    fn read_init(&self) -> SyscallResult<Vec<u8>> {
        let (mount_point, ino, _) = self.resolve("/sbin/init")?;
        Ok(self.fs(&mount_point)?.read(ino)?)
    }

    // ========== FILE I/O ==========

    /// Open `path`, creating it first with O_CREAT. Returns the new fd.
    pub fn sys_open(&mut self, pid: Pid, path: &str, flags: u32, mode: u32) -> SyscallResult<Fd> {
        self.syscall(pid, SyscallNr::Open, |k| {
            let abs = k.abspath(pid, path);
            let flags = OpenFlags::new(flags);
            let cred = k.caller(pid).cred;
            let (mount_point, rel) = k.route(&abs)?;
            let read_only = k.mount_ref(&mount_point)?.options.read_only;

            let mut created = false;
            if flags.create() {
                if k.fs(&mount_point)?.exists(&rel) {
                    if flags.exclusive() {
                        return Err(SyscallError::AlreadyExists);
                    }
                } else {
                    if read_only {
                        return Err(SyscallError::NotPermitted);
                    }
                    let mode = FileMode::regular(mode);
                    k.fs_mut(&mount_point)?
                        .create(&rel, cred.fsuid, cred.fsgid, mode)?;
                    created = true;
                }
            }

            // Access is decided by the file a final symlink points to
            let (target_mount, target_ino, _) = k.resolve(&abs)?;
            let target = k.mount_ref(&target_mount)?;
            let inode = target.fs.find_inode_by_number(target_ino)?;
            // Whoever creates the file may open it regardless of its mode
            if !created {
                if flags.readable() && !inode.check_perm(Permission::Read, &cred) {
                    return Err(SyscallError::NotPermitted);
                }
                if flags.writable() && !inode.check_perm(Permission::Write, &cred) {
                    return Err(SyscallError::NotPermitted);
                }
            }
            if flags.writable() {
                if read_only || target.options.read_only {
                    return Err(SyscallError::NotPermitted);
                }
                if inode.is_dir() {
                    return Err(SyscallError::IsADirectory);
                }
            }

            let ino = k.fs_mut(&mount_point)?.open(&rel, flags)?;
            if flags.truncate() && flags.writable() {
                k.fs_mut(&target_mount)?.write(target_ino, &[])?;
            }

            match k.caller_mut(pid).files.alloc(&abs, &mount_point, ino, flags) {
                Some(fd) => Ok(fd),
                None => {
                    k.fs_mut(&mount_point)?.close(ino)?;
                    Err(SyscallError::TooManyOpenFiles)
                }
            }
        })
    }

    pub fn sys_close(&mut self, pid: Pid, fd: Fd) -> SyscallResult<()> {
        self.syscall(pid, SyscallNr::Close, |k| {
            let desc = k
                .caller_mut(pid)
                .files
                .remove(fd)
                .ok_or(SyscallError::BadFileDescriptorState)?;
            k.fs_mut(&desc.mount_point)?.close(desc.ino)?;
            Ok(())
        })
    }

    /// Whole content of the file behind `fd`, following symlinks
    pub fn sys_read(&mut self, pid: Pid, fd: Fd) -> SyscallResult<Vec<u8>> {
        self.syscall(pid, SyscallNr::Read, |k| {
            let desc = k
                .caller(pid)
                .files
                .get(fd)
                .cloned()
                .ok_or(SyscallError::BadFileDescriptor)?;
            if !desc.readable() {
                return Err(SyscallError::BadFileDescriptor);
            }

            let (mount_point, ino, _) = k.follow(&desc.mount_point, desc.ino, &desc.path)?;
            let fs = k.fs(&mount_point)?;
            if fs.find_inode_by_number(ino)?.is_dir() {
                return Err(SyscallError::IsADirectory);
            }
            let data = fs.read(ino)?;

            if let Some(desc) = k.caller_mut(pid).files.get_mut(fd) {
                desc.pos = data.len();
            }
            Ok(data)
        })
    }

    /// Replace the content behind `fd`, or extend it for O_APPEND
    /// descriptors. Returns the number of bytes written.
    pub fn sys_write(&mut self, pid: Pid, fd: Fd, data: &[u8]) -> SyscallResult<usize> {
        self.syscall(pid, SyscallNr::Write, |k| {
            let desc = k
                .caller(pid)
                .files
                .get(fd)
                .cloned()
                .ok_or(SyscallError::BadFileDescriptor)?;
            if !desc.writable() {
                return Err(SyscallError::BadFileDescriptor);
            }

            let (mount_point, ino, _) = k.follow(&desc.mount_point, desc.ino, &desc.path)?;
            let fs = k.fs_mut(&mount_point)?;
            let written = if desc.append {
                fs.append(ino, data)?
            } else {
                fs.write(ino, data)?
            };

            if let Some(desc) = k.caller_mut(pid).files.get_mut(fd) {
                desc.pos = if desc.append { desc.pos + written } else { written };
            }
            Ok(written)
        })
    }

    // ========== FILESYSTEM ==========

    pub fn sys_mkdir(&mut self, pid: Pid, path: &str, mode: u32) -> SyscallResult<()> {
        self.syscall(pid, SyscallNr::Mkdir, |k| {
            let abs = k.abspath(pid, path);
            let cred = k.caller(pid).cred;
            let (mount_point, rel) = k.route(&abs)?;
            if k.fs(&mount_point)?.exists(&rel) {
                return Err(SyscallError::AlreadyExists);
            }
            if k.mount_ref(&mount_point)?.options.read_only {
                return Err(SyscallError::NotPermitted);
            }
            k.fs_mut(&mount_point)?
                .create(&rel, cred.fsuid, cred.fsgid, FileMode::directory(mode))?;
            Ok(())
        })
    }

    pub fn sys_rmdir(&mut self, pid: Pid, path: &str) -> SyscallResult<()> {
        self.syscall(pid, SyscallNr::Rmdir, |k| {
            let abs = k.abspath(pid, path);
            if k.mounts.is_mount_point(&abs) {
                return Err(SyscallError::NotPermitted);
            }
            let (mount_point, rel) = k.route_writable(&abs)?;
            Ok(k.fs_mut(&mount_point)?.rmdir(&rel)?)
        })
    }

    pub fn sys_unlink(&mut self, pid: Pid, path: &str) -> SyscallResult<()> {
        self.syscall(pid, SyscallNr::Unlink, |k| {
            let abs = k.abspath(pid, path);
            let (mount_point, rel) = k.route_writable(&abs)?;
            Ok(k.fs_mut(&mount_point)?.unlink(&rel)?)
        })
    }

    pub fn sys_rename(&mut self, pid: Pid, old: &str, new: &str) -> SyscallResult<()> {
        self.syscall(pid, SyscallNr::Rename, |k| {
            let (old_mount, old_rel) = k.route_writable(&k.abspath(pid, old))?;
            let (new_mount, new_rel) = k.route_writable(&k.abspath(pid, new))?;
            if old_mount != new_mount {
                // Still report a missing source first
                k.fs(&old_mount)?.find_directory_entry(&old_rel)?;
                return Err(SyscallError::CrossDevice);
            }
            Ok(k.fs_mut(&old_mount)?.rename(&old_rel, &new_rel)?)
        })
    }

    /// Hardlink `new` to the file at `old`
    pub fn sys_link(&mut self, pid: Pid, old: &str, new: &str) -> SyscallResult<()> {
        self.syscall(pid, SyscallNr::Link, |k| {
            let (old_mount, old_rel) = k.route(&k.abspath(pid, old))?;
            let (new_mount, new_rel) = k.route_writable(&k.abspath(pid, new))?;
            if old_mount != new_mount {
                k.fs(&old_mount)?.find_directory_entry(&old_rel)?;
                return Err(SyscallError::CrossDevice);
            }
            Ok(k.fs_mut(&old_mount)?.link(&old_rel, &new_rel)?)
        })
    }

    /// Create a symlink at `new` pointing to `old`. The target must exist
    /// when the link is made; it is stored exactly as given.
    pub fn sys_symlink(&mut self, pid: Pid, old: &str, new: &str) -> SyscallResult<()> {
        self.syscall(pid, SyscallNr::Symlink, |k| {
            let new_abs = k.abspath(pid, new);
            let base = split_parent(&new_abs)
                .map(|(parent, _)| parent)
                .map_err(|_| SyscallError::AlreadyExists)?;
            let perms = k.lookup(&resolve_relative(&base, old))?.mode.perms();

            let cred = k.caller(pid).cred;
            let (mount_point, rel) = k.route_writable(&new_abs)?;
            k.fs_mut(&mount_point)?
                .symlink(old, &rel, perms, cred.fsuid, cred.fsgid)?;
            Ok(())
        })
    }

    pub fn sys_readlink(&mut self, pid: Pid, path: &str) -> SyscallResult<String> {
        self.syscall(pid, SyscallNr::Readlink, |k| {
            let inode = k.lookup(&k.abspath(pid, path))?;
            inode
                .link_target()
                .map(str::to_string)
                .ok_or(SyscallError::InvalidArgument)
        })
    }

    /// stat(2) on `path` itself; a final symlink is not followed
    pub fn sys_stat(&mut self, pid: Pid, path: &str) -> SyscallResult<Stat> {
        self.syscall(pid, SyscallNr::Stat, |k| {
            let inode = k.lookup(&k.abspath(pid, path))?;
            Ok(Stat::from_inode(inode))
        })
    }

    /// Names in a directory, sorted
    pub fn sys_getdents(&mut self, pid: Pid, path: &str) -> SyscallResult<Vec<String>> {
        self.syscall(pid, SyscallNr::Getdents, |k| {
            let (mount_point, rel) = k.route(&k.abspath(pid, path))?;
            Ok(k.fs(&mount_point)?.getdents(&rel)?)
        })
    }

    /// Only the owner or the superuser may change the mode
    pub fn sys_chmod(&mut self, pid: Pid, path: &str, mode: u32) -> SyscallResult<()> {
        self.syscall(pid, SyscallNr::Chmod, |k| {
            let cred = k.caller(pid).cred;
            let (mount_point, ino, target) = k.resolve(&k.abspath(pid, path))?;
            let owner = k.fs(&mount_point)?.find_inode_by_number(ino)?.uid;
            if cred.fsuid != Uid::ROOT && cred.fsuid != owner {
                return Err(SyscallError::NotPermitted);
            }
            let (mount_point, rel) = k.route_writable(&target)?;
            Ok(k.fs_mut(&mount_point)?.chmod(&rel, mode & FileMode::PERM_MASK)?)
        })
    }

    /// Only the superuser may change ownership
    pub fn sys_chown(&mut self, pid: Pid, path: &str, uid: u32, gid: u32) -> SyscallResult<()> {
        self.syscall(pid, SyscallNr::Chown, |k| {
            let (_, _, target) = k.resolve(&k.abspath(pid, path))?;
            if k.caller(pid).cred.fsuid != Uid::ROOT {
                return Err(SyscallError::NotPermitted);
            }
            let (mount_point, rel) = k.route_writable(&target)?;
            Ok(k.fs_mut(&mount_point)?.chown(&rel, Uid(uid), Gid(gid))?)
        })
    }

    // ========== PROCESS ==========

    pub fn sys_getcwd(&mut self, pid: Pid) -> SyscallResult<String> {
        self.syscall(pid, SyscallNr::Getcwd, |k| Ok(k.caller(pid).cwd.clone()))
    }

    pub fn sys_chdir(&mut self, pid: Pid, path: &str) -> SyscallResult<()> {
        self.syscall(pid, SyscallNr::Chdir, |k| {
            // The cwd is always a real directory path, never a link
            let (mount_point, ino, resolved) = k.resolve(&k.abspath(pid, path))?;
            if !k.fs(&mount_point)?.find_inode_by_number(ino)?.is_dir() {
                return Err(SyscallError::NotADirectory);
            }
            k.caller_mut(pid).cwd = resolved;
            Ok(())
        })
    }

    /// Run the program at `path` as a child of `pid` and wait for it.
    ///
    /// The child runs as the caller's effective identity with copies of the
    /// caller's cwd and environment; `envp` entries override inherited ones.
    /// Returns 0 once the child has finished; its exit status is left on
    /// the caller.
    pub fn sys_execve(
        &mut self,
        pid: Pid,
        path: &str,
        argv: &[String],
        envp: &HashMap<String, String>,
    ) -> SyscallResult<i32> {
        self.syscall(pid, SyscallNr::Execve, |k| {
            let abs = k.abspath(pid, path);
            let cred = k.caller(pid).cred;
            let (mount_point, ino, _) = k.resolve(&abs)?;

            let mount = k.mount_ref(&mount_point)?;
            let inode = mount.fs.find_inode_by_number(ino)?;
            if mount.options.noexec || !inode.check_perm(Permission::Execute, &cred) {
                return Err(SyscallError::NotPermitted);
            }
            if !inode.is_file() {
                return Err(SyscallError::ExecFormatError);
            }
            let program = mount
                .fs
                .read(ino)
                .map_err(|_| SyscallError::ExecFormatError)?;

            let argv = if argv.is_empty() {
                vec![abs.clone()]
            } else {
                argv.to_vec()
            };
            let child_pid = k.alloc_pid();
            let mut child =
                k.caller(pid)
                    .spawn_child(child_pid, argv.clone(), k.config.max_fds_per_process);
            child
                .environ
                .extend(envp.iter().map(|(key, value)| (key.clone(), value.clone())));
            k.processes.insert(child_pid, child);
            log::info!("execve: {} started {} ({})", pid, child_pid, abs);

            let runner = Rc::clone(&k.runner);
            let status = runner.run(k, child_pid, &program, &argv);
            k.remove_process(child_pid);
            k.caller_mut(pid).last_exit = Some(status);
            Ok(0)
        })
    }

    pub fn sys_getpid(&mut self, pid: Pid) -> SyscallResult<u32> {
        self.syscall(pid, SyscallNr::Getpid, |_| Ok(pid.0))
    }

    /// Parent pid, 0 for a process without one
    pub fn sys_getppid(&mut self, pid: Pid) -> SyscallResult<u32> {
        self.syscall(pid, SyscallNr::Getppid, |k| {
            Ok(k.caller(pid).parent.map_or(0, |parent| parent.0))
        })
    }

    pub fn sys_getenv(&mut self, pid: Pid, key: &str) -> SyscallResult<Option<String>> {
        self.syscall(pid, SyscallNr::Getenv, |k| {
            Ok(k.caller(pid).getenv(key).map(str::to_string))
        })
    }

    pub fn sys_setenv(&mut self, pid: Pid, key: &str, value: &str) -> SyscallResult<()> {
        self.syscall(pid, SyscallNr::Setenv, |k| {
            if key.is_empty() || key.contains('=') {
                return Err(SyscallError::InvalidArgument);
            }
            k.caller_mut(pid).setenv(key, value);
            Ok(())
        })
    }

    // ========== USERS ==========

    pub fn sys_getuid(&mut self, pid: Pid) -> SyscallResult<u32> {
        self.syscall(pid, SyscallNr::Getuid, |k| Ok(k.caller(pid).cred.ruid.0))
    }

    pub fn sys_geteuid(&mut self, pid: Pid) -> SyscallResult<u32> {
        self.syscall(pid, SyscallNr::Geteuid, |k| Ok(k.caller(pid).cred.euid.0))
    }

    pub fn sys_getgid(&mut self, pid: Pid) -> SyscallResult<u32> {
        self.syscall(pid, SyscallNr::Getgid, |k| Ok(k.caller(pid).cred.rgid.0))
    }

    pub fn sys_getegid(&mut self, pid: Pid) -> SyscallResult<u32> {
        self.syscall(pid, SyscallNr::Getegid, |k| Ok(k.caller(pid).cred.egid.0))
    }

    /// Set the effective uid. There is no privilege check.
    pub fn sys_setuid(&mut self, pid: Pid, uid: u32) -> SyscallResult<()> {
        self.syscall(pid, SyscallNr::Setuid, |k| {
            k.caller_mut(pid).cred.set_euid(Uid(uid));
            Ok(())
        })
    }

    /// Set the effective gid. There is no privilege check.
    pub fn sys_setgid(&mut self, pid: Pid, gid: u32) -> SyscallResult<()> {
        self.syscall(pid, SyscallNr::Setgid, |k| {
            k.caller_mut(pid).cred.set_egid(Gid(gid));
            Ok(())
        })
    }

    // ========== SYSTEM ==========

    pub fn sys_sethostname(&mut self, pid: Pid, name: &str) -> SyscallResult<()> {
        self.syscall(pid, SyscallNr::Sethostname, |k| {
            log::info!("hostname: {} -> {}", k.hostname, name);
            k.hostname = name.to_string();
            Ok(())
        })
    }

    pub fn sys_uname(&mut self, pid: Pid) -> SyscallResult<Utsname> {
        self.syscall(pid, SyscallNr::Uname, |k| {
            Ok(Utsname {
                sysname: k.config.sysname.clone(),
                nodename: k.hostname.clone(),
                release: k.config.release.clone(),
                version: k.config.version.clone(),
                machine: k.config.machine.clone(),
                domainname: String::new(),
            })
        })
    }
}

impl Default for Computer {
    fn default() -> Self {
        Self::new(KernelConfig::default())
    }
}
