//! Mount table
//!
//! Maps mount-point paths to filesystem instances. A path belongs to the
//! longest mount point that is a prefix of it on a component boundary, so
//! `/proc/uptime` goes to `/proc` while `/procedure` stays on `/`.

use crate::vfs::{Filesystem, normalize_path};
use std::collections::HashMap;

/// Mount options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountOptions {
    /// Refuse anything that would modify the filesystem
    pub read_only: bool,
    /// Refuse execve of files on this mount
    pub noexec: bool,
}

impl MountOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse mount options from a comma-separated string
    pub fn parse(options: &str) -> Self {
        let mut opts = MountOptions::new();
        for opt in options.split(',') {
            match opt.trim() {
                "ro" => opts.read_only = true,
                "rw" => opts.read_only = false,
                "noexec" => opts.noexec = true,
                "exec" => opts.noexec = false,
                _ => {} // Unknown options ignored
            }
        }
        opts
    }
}

impl std::fmt::Display for MountOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", if self.read_only { "ro" } else { "rw" })?;
        if self.noexec {
            write!(f, ",noexec")?;
        }
        Ok(())
    }
}

/// A mounted filesystem
pub struct Mount {
    /// Device or source name ("rootfs", "proc")
    pub source: String,
    /// Normalised mount point
    pub target: String,
    pub options: MountOptions,
    pub fs: Box<dyn Filesystem>,
}

impl Mount {
    /// The part of `path` this filesystem sees: the mount point is cut off
    /// and the result always starts with '/'
    pub fn relative_path(&self, path: &str) -> String {
        let path = normalize_path(path);
        if self.target == "/" {
            return path;
        }
        match path.strip_prefix(&self.target) {
            Some("") | None => "/".to_string(),
            Some(rest) => rest.to_string(),
        }
    }
}

/// Mount error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountError {
    /// Something is already mounted there
    AlreadyMounted,
    /// Nothing is mounted there
    NotMounted,
    /// The root filesystem cannot be detached
    Busy,
}

impl std::fmt::Display for MountError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MountError::AlreadyMounted => write!(f, "already mounted"),
            MountError::NotMounted => write!(f, "not mounted"),
            MountError::Busy => write!(f, "device or resource busy"),
        }
    }
}

impl std::error::Error for MountError {}

/// Mount table managing all mounted filesystems
#[derive(Default)]
pub struct MountTable {
    /// Active mounts (target path -> entry)
    mounts: HashMap<String, Mount>,
}

impl MountTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount a filesystem
    pub fn mount(
        &mut self,
        source: &str,
        target: &str,
        fs: Box<dyn Filesystem>,
        options: MountOptions,
    ) -> Result<(), MountError> {
        let target = normalize_path(target);
        if self.mounts.contains_key(&target) {
            return Err(MountError::AlreadyMounted);
        }

        log::info!("mount: {} ({}) on {} [{}]", source, fs.name(), target, options);
        let entry = Mount {
            source: source.to_string(),
            target: target.clone(),
            options,
            fs,
        };
        self.mounts.insert(target, entry);
        Ok(())
    }

    /// Unmount a filesystem
    pub fn umount(&mut self, target: &str) -> Result<Mount, MountError> {
        let target = normalize_path(target);

        // Can't unmount root
        if target == "/" {
            return Err(MountError::Busy);
        }

        self.mounts.remove(&target).ok_or(MountError::NotMounted)
    }

    pub fn is_mount_point(&self, path: &str) -> bool {
        self.mounts.contains_key(&normalize_path(path))
    }

    pub fn get(&self, target: &str) -> Option<&Mount> {
        self.mounts.get(target)
    }

    pub fn get_mut(&mut self, target: &str) -> Option<&mut Mount> {
        self.mounts.get_mut(target)
    }

    /// Mount point of the filesystem that owns `path`
    pub fn containing_mount_point(&self, path: &str) -> Option<String> {
        let path = normalize_path(path);

        // Find the longest matching mount point
        let mut best_match: Option<&str> = None;
        for mount_point in self.mounts.keys() {
            let matches = mount_point == "/"
                || path == *mount_point
                || path.starts_with(&format!("{}/", mount_point));

            if matches && best_match.is_none_or(|best| mount_point.len() > best.len()) {
                best_match = Some(mount_point);
            }
        }

        best_match.map(str::to_string)
    }

    /// All mounts, ordered by mount point
    pub fn list(&self) -> Vec<&Mount> {
        let mut mounts: Vec<&Mount> = self.mounts.values().collect();
        mounts.sort_by(|a, b| a.target.cmp(&b.target));
        mounts
    }
}
