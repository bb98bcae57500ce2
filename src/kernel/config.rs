//! Kernel configuration
//!
//! Everything a fresh computer needs to know before boot. Missing fields in a
//! JSON document fall back to the defaults below.

use super::process::MAX_FDS_PER_PROCESS;
use serde::{Deserialize, Serialize};

/// Hop limit for symlink resolution, as MAXSYMLINKS on Linux
pub const DEFAULT_MAX_SYMLINK_HOPS: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub hostname: String,
    pub sysname: String,
    pub release: String,
    pub version: String,
    pub machine: String,
    /// Mount a procfs at /proc during boot
    pub mount_proc: bool,
    /// Symlinks followed before giving up with ELOOP
    pub max_symlink_hops: usize,
    pub max_fds_per_process: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            sysname: "Blackhat".to_string(),
            release: "0.0.0".to_string(),
            version: "0.0.0".to_string(),
            machine: "x86_64".to_string(),
            mount_proc: true,
            max_symlink_hops: DEFAULT_MAX_SYMLINK_HOPS,
            max_fds_per_process: MAX_FDS_PER_PROCESS,
        }
    }
}

impl KernelConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Contents of /etc/os-release
    pub fn os_release(&self) -> String {
        format!(
            "NAME=\"{sys} Linux\"\nVERSION=\"{rel}\"\nPRETTY_NAME=\"{sys} Linux {rel}\"",
            sys = self.sysname,
            rel = self.release
        )
    }

    /// The line served from /proc/version
    pub fn version_banner(&self) -> String {
        format!(
            "{} version {} #{} {}",
            self.sysname, self.release, self.version, self.machine
        )
    }
}
