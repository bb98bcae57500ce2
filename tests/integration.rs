//! Integration tests for the blackhat kernel
//!
//! End-to-end scenarios across boot, the filesystem, processes and the
//! dispatch boundary. Each test boots its own computer.

use blackhat::kernel::{
    Computer, Credentials, Errno, Gid, KernelConfig, MountOptions, Pid, SyscallError, Uid,
};
use blackhat::vfs::{Ext4, OpenFlags};
use serde_json::{Value, json};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn boot() -> (Computer, Pid) {
    init_logging();
    let mut computer = Computer::default();
    let pid = computer.create_process(&["sh"], Credentials::root());
    (computer, pid)
}

fn write_file(k: &mut Computer, pid: Pid, path: &str, data: &str, mode: u32) {
    let flags = OpenFlags::O_WRONLY | OpenFlags::O_CREAT | OpenFlags::O_TRUNC;
    let fd = k.sys_open(pid, path, flags, mode).unwrap();
    k.sys_write(pid, fd, data.as_bytes()).unwrap();
    k.sys_close(pid, fd).unwrap();
}

fn cat(k: &mut Computer, pid: Pid, path: &str) -> Result<String, SyscallError> {
    let fd = k.sys_open(pid, path, OpenFlags::O_RDONLY, 0)?;
    let data = k.sys_read(pid, fd);
    k.sys_close(pid, fd)?;
    Ok(String::from_utf8_lossy(&data?).into_owned())
}

// ============================================================================
// Boot
// ============================================================================

#[test]
fn test_boot_mounts_root_and_proc() {
    let (mut k, pid) = boot();
    let targets: Vec<String> = k.mounts().list().iter().map(|m| m.target.clone()).collect();
    assert_eq!(targets, vec!["/", "/proc"]);

    let version = cat(&mut k, pid, "/proc/version").unwrap();
    assert_eq!(version, "Blackhat version 0.0.0 #0.0.0 x86_64\n");
    let release = cat(&mut k, pid, "/etc/os-release").unwrap();
    assert!(release.contains("PRETTY_NAME=\"Blackhat Linux 0.0.0\""));
}

#[test]
fn test_boot_from_json_config() {
    init_logging();
    let config =
        KernelConfig::from_json(r#"{"hostname": "corp-db", "release": "5.4.0", "mount_proc": false}"#)
            .unwrap();
    let mut k = Computer::new(config);
    let pid = k.create_process(&["sh"], Credentials::root());

    assert_eq!(k.sys_uname(pid).unwrap().nodename, "corp-db");
    assert_eq!(k.sys_uname(pid).unwrap().release, "5.4.0");
    assert_eq!(k.mounts().list().len(), 1);
    // The /proc directory still exists, it is just empty
    assert_eq!(k.sys_getdents(pid, "/proc").unwrap(), Vec::<String>::new());
}

#[test]
fn test_init_runs_as_pid_one() {
    init_logging();
    let seen: Rc<RefCell<Vec<(u32, u32, String)>>> = Rc::default();
    let record = Rc::clone(&seen);
    let mut k = Computer::default().with_runner(
        move |k: &mut Computer, pid: Pid, program: &[u8], _argv: &[String]| {
            let uid = k.sys_getuid(pid).unwrap();
            record
                .borrow_mut()
                .push((pid.0, uid, String::from_utf8_lossy(program).into_owned()));
            if program == b"init" {
                // init starts a shell, which is a nested run
                k.sys_execve(pid, "/bin/sh", &[], &HashMap::new()).unwrap();
            }
            3
        },
    );
    let setup = k.create_process(&["setup"], Credentials::root());
    write_file(&mut k, setup, "/sbin/init", "init", 0o755);
    write_file(&mut k, setup, "/bin/sh", "sh", 0o755);
    k.remove_process(setup);

    assert_eq!(k.call_init(), Ok(3));
    let seen = seen.borrow();
    assert_eq!(seen[0], (1, 0, "init".to_string()));
    assert_eq!(seen[1].2, "sh");
    assert!(seen[1].0 > 1);
    assert!(k.process(Pid::INIT).is_none());
}

#[test]
fn test_missing_init_is_kernel_panic() {
    init_logging();
    let mut k = Computer::default();
    assert_eq!(k.call_init(), Err(SyscallError::NotFound));
}

// ============================================================================
// Files and directories
// ============================================================================

#[test]
fn test_home_directory_session() {
    let (mut k, root) = boot();
    k.sys_mkdir(root, "/home/alice", 0o700).unwrap();
    k.sys_chown(root, "/home/alice", 1000, 1000).unwrap();

    let alice = k.create_process(&["bash"], Credentials::new(Uid(1000), Gid(1000)));
    k.sys_chdir(alice, "/home/alice").unwrap();
    write_file(&mut k, alice, ".bash_history", "ssh root@10.0.0.2\n", 0o600);
    k.sys_mkdir(alice, "notes", 0o755).unwrap();

    let names = k.sys_getdents(alice, ".").unwrap();
    assert_eq!(names, vec![".bash_history", "notes"]);

    let bob = k.create_process(&["bash"], Credentials::new(Uid(1001), Gid(1001)));
    assert_eq!(
        cat(&mut k, bob, "/home/alice/.bash_history"),
        Err(SyscallError::NotPermitted)
    );
    assert_eq!(k.errno(bob), Errno::EPERM);
    assert_eq!(
        cat(&mut k, root, "/home/alice/.bash_history").unwrap(),
        "ssh root@10.0.0.2\n"
    );
}

#[test]
fn test_append_log() {
    let (mut k, pid) = boot();
    write_file(&mut k, pid, "/var/auth.log", "boot\n", 0o640);
    let flags = OpenFlags::O_WRONLY | OpenFlags::O_APPEND;
    for line in ["login root\n", "logout root\n"] {
        let fd = k.sys_open(pid, "/var/auth.log", flags, 0).unwrap();
        k.sys_write(pid, fd, line.as_bytes()).unwrap();
        k.sys_close(pid, fd).unwrap();
    }
    assert_eq!(
        cat(&mut k, pid, "/var/auth.log").unwrap(),
        "boot\nlogin root\nlogout root\n"
    );
}

#[test]
fn test_symlink_chain_and_loop() {
    let (mut k, pid) = boot();
    write_file(&mut k, pid, "/etc/shadow", "root:x:0:0\n", 0o600);
    k.sys_symlink(pid, "/etc/shadow", "/tmp/s1").unwrap();
    k.sys_symlink(pid, "/tmp/s1", "/tmp/s2").unwrap();
    assert_eq!(cat(&mut k, pid, "/tmp/s2").unwrap(), "root:x:0:0\n");
    assert_eq!(k.sys_readlink(pid, "/tmp/s2").unwrap(), "/tmp/s1");

    // Break the chain into a loop
    k.sys_unlink(pid, "/etc/shadow").unwrap();
    k.sys_symlink(pid, "/tmp/s2", "/etc/shadow").unwrap();
    assert_eq!(cat(&mut k, pid, "/tmp/s2"), Err(SyscallError::TooManyLinks));
    assert_eq!(k.errno(pid), Errno::ELOOP);
}

#[test]
fn test_symlink_hop_limit_is_configurable() {
    init_logging();
    let config = KernelConfig {
        max_symlink_hops: 2,
        ..Default::default()
    };
    let mut k = Computer::new(config);
    let pid = k.create_process(&["sh"], Credentials::root());
    write_file(&mut k, pid, "/tmp/f", "x", 0o644);
    k.sys_symlink(pid, "/tmp/f", "/tmp/l1").unwrap();
    k.sys_symlink(pid, "/tmp/l1", "/tmp/l2").unwrap();
    k.sys_symlink(pid, "/tmp/l2", "/tmp/l3").unwrap();

    assert_eq!(cat(&mut k, pid, "/tmp/l2").unwrap(), "x");
    assert_eq!(cat(&mut k, pid, "/tmp/l3"), Err(SyscallError::TooManyLinks));
}

#[test]
fn test_cross_mount_operations() {
    let (mut k, pid) = boot();
    k.mount("tmpfs", "/mnt", Box::new(Ext4::new()), MountOptions::new())
        .unwrap();
    write_file(&mut k, pid, "/mnt/loot", "secrets", 0o644);
    assert_eq!(cat(&mut k, pid, "/mnt/loot").unwrap(), "secrets");

    assert_eq!(
        k.sys_rename(pid, "/mnt/loot", "/tmp/loot"),
        Err(SyscallError::CrossDevice)
    );
    assert_eq!(k.errno(pid), Errno::EXDEV);
    assert_eq!(
        k.sys_link(pid, "/mnt/loot", "/tmp/loot"),
        Err(SyscallError::CrossDevice)
    );

    // Symlinks may point across mounts
    k.sys_symlink(pid, "/mnt/loot", "/tmp/loot").unwrap();
    assert_eq!(cat(&mut k, pid, "/tmp/loot").unwrap(), "secrets");
}

#[test]
fn test_read_only_mount() {
    let (mut k, pid) = boot();
    let mut image = Ext4::new();
    image.mkdir("/data", 0o755, Uid::ROOT, Gid::ROOT).unwrap();
    k.mount("cdrom", "/media", Box::new(image), MountOptions::parse("ro"))
        .unwrap();

    assert_eq!(k.sys_getdents(pid, "/media").unwrap(), vec!["data"]);
    assert_eq!(
        k.sys_open(pid, "/media/new", OpenFlags::O_WRONLY | OpenFlags::O_CREAT, 0o644),
        Err(SyscallError::NotPermitted)
    );
    assert_eq!(k.sys_mkdir(pid, "/media/x", 0o755), Err(SyscallError::NotPermitted));
    assert_eq!(k.sys_rmdir(pid, "/media/data"), Err(SyscallError::NotPermitted));
}

#[test]
fn test_noexec_mount_refuses_execve() {
    let (mut k, pid) = boot();
    k.mount("usb", "/mnt/usb", Box::new(Ext4::new()), MountOptions::parse("noexec"))
        .unwrap();
    write_file(&mut k, pid, "/mnt/usb/payload", "#!", 0o755);
    write_file(&mut k, pid, "/bin/payload", "#!", 0o755);

    assert_eq!(
        k.sys_execve(pid, "/mnt/usb/payload", &[], &HashMap::new()),
        Err(SyscallError::NotPermitted)
    );
    assert_eq!(k.errno(pid), Errno::EPERM);

    // The mount of the final target decides, not the mount of the link
    k.sys_symlink(pid, "/mnt/usb/payload", "/tmp/run").unwrap();
    assert_eq!(
        k.sys_execve(pid, "/tmp/run", &[], &HashMap::new()),
        Err(SyscallError::NotPermitted)
    );
    assert_eq!(k.sys_execve(pid, "/bin/payload", &[], &HashMap::new()), Ok(0));
}

#[test]
fn test_procfs_snapshots() {
    let (mut k, pid) = boot();
    let fd = k.sys_open(pid, "/proc/cpuinfo", OpenFlags::O_RDONLY, 0).unwrap();
    let first = k.sys_read(pid, fd).unwrap();
    assert!(!first.is_empty());
    assert_eq!(k.sys_read(pid, fd).unwrap(), first);
    k.sys_close(pid, fd).unwrap();

    assert_eq!(
        k.sys_rename(pid, "/proc/uptime", "/proc/up"),
        Err(SyscallError::NotPermitted)
    );
    assert!(matches!(
        k.sys_symlink(pid, "/etc/os-release", "/proc/rel"),
        Err(SyscallError::Unsupported { op: "symlink", .. })
    ));
    assert_eq!(k.errno(pid), Errno::ENOSYS);
}

// ============================================================================
// Processes
// ============================================================================

#[test]
fn test_execve_environment_is_a_copy() {
    init_logging();
    let mut k = Computer::default().with_runner(
        |k: &mut Computer, pid: Pid, _: &[u8], argv: &[String]| {
            assert_eq!(k.sys_getenv(pid, "TERM").unwrap().as_deref(), Some("xterm"));
            assert_eq!(k.sys_getenv(pid, "ARGC").unwrap(), Some(argv.len().to_string()));
            k.sys_setenv(pid, "TERM", "dumb").unwrap();
            k.sys_chdir(pid, "/").unwrap();
            i32::from(k.sys_getppid(pid).unwrap() > 0)
        },
    );
    let pid = k.create_process(&["sh"], Credentials::root());
    write_file(&mut k, pid, "/bin/env", "", 0o755);
    k.sys_setenv(pid, "TERM", "xterm").unwrap();
    k.sys_chdir(pid, "/tmp").unwrap();

    let argv = vec!["env".to_string(), "-i".to_string()];
    let envp = HashMap::from([("ARGC".to_string(), "2".to_string())]);
    assert_eq!(k.sys_execve(pid, "/bin/env", &argv, &envp), Ok(0));

    let parent = k.process(pid).unwrap();
    assert_eq!(parent.last_exit, Some(1));
    assert_eq!(parent.getenv("TERM"), Some("xterm"));
    assert_eq!(parent.getenv("ARGC"), None);
    assert_eq!(parent.cwd, "/tmp");
}

#[test]
fn test_setuid_binary_escalation_path() {
    // Raising euid inside a program is visible to its own fs checks only
    init_logging();
    let mut k = Computer::default().with_runner(
        |k: &mut Computer, pid: Pid, _: &[u8], _: &[String]| {
            k.sys_setuid(pid, 0).unwrap();
            let fd = k
                .sys_open(pid, "/root/flag", OpenFlags::O_RDONLY, 0)
                .map(|fd| fd.0 as i32);
            fd.unwrap_or(-1)
        },
    );
    let root = k.create_process(&["setup"], Credentials::root());
    write_file(&mut k, root, "/root/flag", "FLAG{inode}", 0o600);
    write_file(&mut k, root, "/bin/exploit", "", 0o755);

    let user = k.create_process(&["sh"], Credentials::new(Uid(1000), Gid(1000)));
    assert_eq!(cat(&mut k, user, "/root/flag"), Err(SyscallError::NotPermitted));
    k.sys_execve(user, "/bin/exploit", &[], &HashMap::new()).unwrap();
    assert_eq!(k.process(user).unwrap().last_exit, Some(3));
    assert_eq!(k.sys_geteuid(user).unwrap(), 1000);
}

// ============================================================================
// Dispatch boundary
// ============================================================================

/// A tiny line-oriented "script" runner: each line is `name arg...` and is
/// passed straight to dispatch, with the results collected
fn run_script(k: &mut Computer, pid: Pid, script: &str) -> Vec<Value> {
    script
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let mut parts = line.split_whitespace();
            let name = parts.next().unwrap_or_default();
            let args: Vec<Value> = parts
                .map(|arg| arg.parse::<u64>().map(Value::from).unwrap_or_else(|_| json!(arg)))
                .collect();
            k.dispatch(pid, name, &args)
        })
        .collect()
}

#[test]
fn test_dispatch_script() {
    let (mut k, pid) = boot();
    let creat = OpenFlags::O_RDWR | OpenFlags::O_CREAT;
    let script = format!(
        "mkdir /tmp/work\nchdir /tmp/work\nopen out.txt {creat} 420\nwrite 3 pwned\nread 3\nclose 3\ngetcwd\ngetdents .\nunlink nothing\nfork\n"
    );
    let results = run_script(&mut k, pid, &script);
    assert_eq!(
        results,
        vec![
            json!(0),
            json!(0),
            json!(3),
            json!(5),
            json!("pwned"),
            json!(0),
            json!("/tmp/work"),
            json!(["out.txt"]),
            json!(-1),
            json!(-1),
        ]
    );
    assert_eq!(k.errno(pid), Errno::ENOSYS);
}

#[test]
fn test_dispatch_from_inside_a_program() {
    init_logging();
    let mut k = Computer::default().with_runner(
        |k: &mut Computer, pid: Pid, program: &[u8], _: &[String]| {
            let script = String::from_utf8_lossy(program).into_owned();
            let results = run_script(k, pid, &script);
            results
                .last()
                .and_then(Value::as_i64)
                .map_or(-1, |n| n as i32)
        },
    );
    let pid = k.create_process(&["sh"], Credentials::root());
    write_file(&mut k, pid, "/bin/whoami", "geteuid\ngetuid\ngetpid", 0o755);

    let status = k.dispatch(pid, "execve", &[json!("/bin/whoami")]);
    assert_eq!(status, json!(0));
    let child_pid = k.process(pid).unwrap().last_exit.unwrap();
    assert!(child_pid as u32 > pid.0);

    let uname = k.dispatch(pid, "uname", &[]);
    assert_eq!(uname[0], json!("Blackhat"));
    assert_eq!(uname.as_array().map(Vec::len), Some(6));
}
