//! Virtual File System
//!
//! Every mounted filesystem implements [`Filesystem`]. The kernel strips the
//! mount point before calling in, so paths seen here are always relative to
//! the filesystem's own root ("/etc/passwd", or "/" for the root itself).
//!
//! Capabilities a filesystem does not provide fall through to the default
//! bodies, which report [`FsError::Unsupported`] with the operation and the
//! filesystem name.

pub mod ext4;
pub mod inode;
pub mod mode;
pub mod procfs;

pub use ext4::Ext4;
pub use inode::{DirectoryEntry, Ino, Inode, Permission};
pub use mode::{FileMode, OpenFlags};
pub use procfs::ProcFs;

use crate::kernel::cred::{Gid, Uid};

/// Filesystem-level error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    /// Path or inode does not exist
    NotFound,
    /// Destination already exists
    AlreadyExists,
    /// Operation refused by this filesystem
    NotPermitted,
    /// A path component is not a directory
    NotADirectory,
    /// Directory given where a file was expected
    IsADirectory,
    /// Directory still has entries
    NotEmpty,
    /// Malformed request (bad name, moving a directory into itself)
    InvalidArgument,
    /// Symlink chain too long or cyclic
    TooManyLinks,
    /// Capability not implemented by this filesystem
    Unsupported { op: &'static str, fs: String },
}

impl std::fmt::Display for FsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FsError::NotFound => write!(f, "No such file or directory"),
            FsError::AlreadyExists => write!(f, "File exists"),
            FsError::NotPermitted => write!(f, "Operation not permitted"),
            FsError::NotADirectory => write!(f, "Not a directory"),
            FsError::IsADirectory => write!(f, "Is a directory"),
            FsError::NotEmpty => write!(f, "Directory not empty"),
            FsError::InvalidArgument => write!(f, "Invalid argument"),
            FsError::TooManyLinks => write!(f, "Too many levels of symbolic links"),
            FsError::Unsupported { op, fs } => write!(f, "{} not supported by {}", op, fs),
        }
    }
}

impl std::error::Error for FsError {}

pub type FsResult<T> = Result<T, FsError>;

/// The capability set of a mounted filesystem
pub trait Filesystem {
    /// Short name used in logs and `Unsupported` errors
    fn name(&self) -> &str;

    fn unsupported(&self, op: &'static str) -> FsError {
        FsError::Unsupported {
            op,
            fs: self.name().to_string(),
        }
    }

    /// Create a file, directory or other object; the type comes from `mode`
    fn create(&mut self, path: &str, uid: Uid, gid: Gid, mode: FileMode) -> FsResult<Ino> {
        let _ = (path, uid, gid, mode);
        Err(self.unsupported("create"))
    }

    /// Resolve `path` for a new descriptor and return the inode it should use
    fn open(&mut self, path: &str, flags: OpenFlags) -> FsResult<Ino> {
        let _ = flags;
        self.find_directory_entry(path).map(|entry| entry.ino)
    }

    /// Release whatever `open` handed out
    fn close(&mut self, ino: Ino) -> FsResult<()> {
        let _ = ino;
        Ok(())
    }

    /// Whole content of an inode
    fn read(&self, ino: Ino) -> FsResult<Vec<u8>>;

    /// Replace the whole content of an inode
    fn write(&mut self, ino: Ino, data: &[u8]) -> FsResult<usize> {
        let _ = (ino, data);
        Err(self.unsupported("write"))
    }

    /// Append to the content of an inode
    fn append(&mut self, ino: Ino, data: &[u8]) -> FsResult<usize> {
        let _ = (ino, data);
        Err(self.unsupported("append"))
    }

    fn unlink(&mut self, path: &str) -> FsResult<()> {
        let _ = path;
        Err(self.unsupported("unlink"))
    }

    fn rmdir(&mut self, path: &str) -> FsResult<()> {
        let _ = path;
        Err(self.unsupported("rmdir"))
    }

    fn rename(&mut self, old: &str, new: &str) -> FsResult<()> {
        let _ = (old, new);
        Err(self.unsupported("rename"))
    }

    /// Hardlink `new` to the inode behind `old`
    fn link(&mut self, old: &str, new: &str) -> FsResult<()> {
        let _ = (old, new);
        Err(self.unsupported("link"))
    }

    /// Create `linkpath` pointing at `target` with the given permission bits
    fn symlink(
        &mut self,
        target: &str,
        linkpath: &str,
        perms: u32,
        uid: Uid,
        gid: Gid,
    ) -> FsResult<Ino> {
        let _ = (target, linkpath, perms, uid, gid);
        Err(self.unsupported("symlink"))
    }

    /// Replace the permission bits, keeping the type
    fn chmod(&mut self, path: &str, perms: u32) -> FsResult<()> {
        let _ = (path, perms);
        Err(self.unsupported("chmod"))
    }

    fn chown(&mut self, path: &str, uid: Uid, gid: Gid) -> FsResult<()> {
        let _ = (path, uid, gid);
        Err(self.unsupported("chown"))
    }

    /// Names of the children of a directory
    fn getdents(&self, path: &str) -> FsResult<Vec<String>> {
        let entry = self.find_directory_entry(path)?;
        if !self.find_inode_by_number(entry.ino)?.is_dir() {
            return Err(FsError::NotADirectory);
        }
        Ok(entry.names())
    }

    fn find_directory_entry(&self, path: &str) -> FsResult<&DirectoryEntry>;

    fn find_inode_by_number(&self, ino: Ino) -> FsResult<&Inode>;

    fn find_inode(&self, path: &str) -> FsResult<&Inode> {
        let ino = self.find_directory_entry(path)?.ino;
        self.find_inode_by_number(ino)
    }

    fn exists(&self, path: &str) -> bool {
        self.find_directory_entry(path).is_ok()
    }
}

/// Non-empty components of a path; repeated slashes collapse
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty())
}

/// Split a path into its parent directory and final component.
///
/// The root has no final component and is rejected.
pub fn split_parent(path: &str) -> FsResult<(String, String)> {
    let parts: Vec<&str> = components(path).collect();
    let Some((name, parent)) = parts.split_last() else {
        return Err(FsError::InvalidArgument);
    };
    if *name == "." || *name == ".." {
        return Err(FsError::InvalidArgument);
    }
    Ok((format!("/{}", parent.join("/")), name.to_string()))
}

/// Absolute, normalised form of a path: collapses repeated slashes and
/// resolves `.` and `..` lexically
pub fn normalize_path(path: &str) -> String {
    let mut result: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                result.pop();
            }
            name => result.push(name),
        }
    }

    if result.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", result.join("/"))
    }
}

/// Join a possibly-relative path onto `base` and normalise
pub fn resolve_relative(base: &str, path: &str) -> String {
    if path.starts_with('/') {
        normalize_path(path)
    } else {
        normalize_path(&format!("{}/{}", base, path))
    }
}
