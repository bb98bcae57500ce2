//! Program execution boundary
//!
//! The kernel does not interpret program text. It hands the bytes of an
//! executable to a [`ProgramRunner`], which runs them to completion and calls
//! back into the [`Computer`] for syscalls (execve included, so runs nest).

use super::process::Pid;
use super::syscall::Computer;

pub trait ProgramRunner {
    /// Run `program` as process `pid` and return its exit status
    fn run(&self, computer: &mut Computer, pid: Pid, program: &[u8], argv: &[String]) -> i32;
}

impl<F> ProgramRunner for F
where
    F: Fn(&mut Computer, Pid, &[u8], &[String]) -> i32,
{
    fn run(&self, computer: &mut Computer, pid: Pid, program: &[u8], argv: &[String]) -> i32 {
        self(computer, pid, program, argv)
    }
}

/// Runner used when nothing else is installed: every program exits 0
/// without doing anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRunner;

impl ProgramRunner for NullRunner {
    fn run(&self, _computer: &mut Computer, pid: Pid, program: &[u8], _argv: &[String]) -> i32 {
        log::debug!("null runner: {} ({} bytes) exits 0", pid, program.len());
        0
    }
}
