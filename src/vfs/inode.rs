//! Inodes and directory entries
//!
//! An inode is the object itself (metadata + content) and knows nothing about
//! paths. Directory entries bind names to inode numbers and form the tree that
//! path resolution walks. Several entries may carry the same number
//! (hardlinks); the filesystem's inode table decides whether the inode exists.

use super::mode::FileMode;
use crate::kernel::cred::{Credentials, Gid, Uid};
use std::collections::BTreeMap;

/// Inode number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ino(pub u64);

impl Ino {
    /// The root directory, as on ext2/3/4
    pub const ROOT: Ino = Ino(2);
    /// First inode number handed out to ordinary files
    pub const FIRST: Ino = Ino(11);
}

impl std::fmt::Display for Ino {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Access being requested from an inode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
    Write,
    Execute,
}

/// A filesystem object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    pub ino: Ino,
    pub mode: FileMode,
    pub uid: Uid,
    pub gid: Gid,
    /// Number of directory entries referencing this inode
    pub links: u32,
    pub data: Vec<u8>,
    /// Target path, only for symlinks
    pub target: Option<String>,
}

impl Inode {
    pub fn new(ino: Ino, mode: FileMode, uid: Uid, gid: Gid) -> Self {
        Self {
            ino,
            mode,
            uid,
            gid,
            links: 1,
            data: Vec::new(),
            target: None,
        }
    }

    pub fn new_symlink(ino: Ino, perms: u32, uid: Uid, gid: Gid, target: &str) -> Self {
        Self {
            target: Some(target.to_string()),
            ..Self::new(ino, FileMode::symlink(perms), uid, gid)
        }
    }

    pub fn is_dir(&self) -> bool {
        self.mode.is_dir()
    }

    pub fn is_file(&self) -> bool {
        self.mode.is_file()
    }

    pub fn is_symlink(&self) -> bool {
        self.mode.is_symlink()
    }

    /// Where a symlink points
    pub fn link_target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn read(&self) -> &[u8] {
        &self.data
    }

    /// Replace the whole content
    pub fn write(&mut self, data: &[u8]) -> usize {
        self.data = data.to_vec();
        data.len()
    }

    /// Extend the content
    pub fn append(&mut self, data: &[u8]) -> usize {
        self.data.extend_from_slice(data);
        data.len()
    }

    /// Check whether `cred` may access this inode.
    ///
    /// Non-execute access is granted outright when either the fs uid or the
    /// fs gid is 0. Execute is always decided by the mode bits: the
    /// superuser needs at least one execute bit. Everyone else gets the union
    /// of the "other" bits, the "group" bits when the group matches, and the
    /// "owner" bits when the owner matches.
    pub fn check_perm(&self, perm: Permission, cred: &Credentials) -> bool {
        if cred.is_fs_superuser() {
            if perm != Permission::Execute {
                return true;
            }
            if cred.fsuid == Uid::ROOT {
                return self.mode.any_exec();
            }
        }

        let mode = &self.mode;
        let (other, group, owner) = match perm {
            Permission::Read => (mode.other_read(), mode.group_read(), mode.owner_read()),
            Permission::Write => (mode.other_write(), mode.group_write(), mode.owner_write()),
            Permission::Execute => (mode.other_exec(), mode.group_exec(), mode.owner_exec()),
        };

        if other {
            return true;
        }
        if self.gid == cred.fsgid && group {
            return true;
        }
        self.uid == cred.fsuid && owner
    }
}

/// A named node in the directory tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub ino: Ino,
    /// Children keyed by name; only directories have any
    pub children: BTreeMap<String, DirectoryEntry>,
}

impl DirectoryEntry {
    pub fn new(name: &str, ino: Ino) -> Self {
        Self {
            name: name.to_string(),
            ino,
            children: BTreeMap::new(),
        }
    }

    pub fn child(&self, name: &str) -> Option<&DirectoryEntry> {
        self.children.get(name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut DirectoryEntry> {
        self.children.get_mut(name)
    }

    pub fn insert(&mut self, entry: DirectoryEntry) {
        self.children.insert(entry.name.clone(), entry);
    }

    pub fn remove(&mut self, name: &str) -> Option<DirectoryEntry> {
        self.children.remove(name)
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Child names in stable (sorted) order
    pub fn names(&self) -> Vec<String> {
        self.children.keys().cloned().collect()
    }

    /// Every inode number referenced by this subtree, including this entry
    pub fn inodes(&self) -> Vec<Ino> {
        let mut out = vec![self.ino];
        for child in self.children.values() {
            out.extend(child.inodes());
        }
        out
    }
}
