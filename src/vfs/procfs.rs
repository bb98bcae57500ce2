//! /proc virtual filesystem
//!
//! A fixed, read-only tree of files whose content is generated on demand.
//! Opening a file snapshots its content into a throwaway inode owned by this
//! filesystem; closing the descriptor frees it. Static inode numbers stay
//! small, transient ones live above [`TRANSIENT_BASE`].

use super::inode::{DirectoryEntry, Ino, Inode};
use super::mode::{FileMode, OpenFlags};
use super::{Filesystem, FsError, FsResult, components};
use crate::kernel::cred::{Gid, Uid};
use slab::Slab;
use std::collections::HashMap;
use std::time::Instant;

/// First inode number used for per-open snapshots
pub const TRANSIENT_BASE: u64 = 1 << 32;

const UPTIME: Ino = Ino(3);
const VERSION: Ino = Ino(4);
const CPUINFO: Ino = Ino(5);

const FILES: &[(&str, Ino)] = &[("uptime", UPTIME), ("version", VERSION), ("cpuinfo", CPUINFO)];

const CPUINFO_TEXT: &str = "processor\t: 0\n\
                            vendor_id\t: GenuineIntel\n\
                            model name\t: Blackhat Virtual CPU\n\
                            cpu MHz\t\t: 2400.000\n\
                            cache size\t: 8192 KB\n\
                            flags\t\t: fpu vme de pse tsc msr\n\n";

pub struct ProcFs {
    root: DirectoryEntry,
    inodes: HashMap<Ino, Inode>,
    /// Snapshots handed out by `open`
    open: Slab<Inode>,
    started: Instant,
    version: String,
}

impl ProcFs {
    /// `version` is the line served from /proc/version
    pub fn new(version: impl Into<String>) -> Self {
        let mut root = DirectoryEntry::new("/", Ino::ROOT);
        let mut inodes = HashMap::new();
        inodes.insert(
            Ino::ROOT,
            Inode::new(Ino::ROOT, FileMode::directory(0o555), Uid::ROOT, Gid::ROOT),
        );
        for (name, ino) in FILES {
            root.insert(DirectoryEntry::new(name, *ino));
            inodes.insert(
                *ino,
                Inode::new(*ino, FileMode::regular(0o444), Uid::ROOT, Gid::ROOT),
            );
        }

        Self {
            root,
            inodes,
            open: Slab::new(),
            started: Instant::now(),
            version: version.into(),
        }
    }

    /// Number of snapshots currently held open
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    fn generate(&self, ino: Ino) -> FsResult<Vec<u8>> {
        let content = match ino {
            UPTIME => {
                let secs = self.started.elapsed().as_secs_f64();
                format!("{:.2} {:.2}\n", secs, secs * 0.9)
            }
            VERSION => format!("{}\n", self.version),
            CPUINFO => CPUINFO_TEXT.to_string(),
            _ => return Err(FsError::NotFound),
        };
        Ok(content.into_bytes())
    }

    fn transient_key(ino: Ino) -> Option<usize> {
        ino.0.checked_sub(TRANSIENT_BASE).map(|key| key as usize)
    }
}

impl Filesystem for ProcFs {
    fn name(&self) -> &str {
        "procfs"
    }

    fn open(&mut self, path: &str, flags: OpenFlags) -> FsResult<Ino> {
        if flags.writable() || flags.create() || flags.truncate() {
            return Err(FsError::NotPermitted);
        }
        let inode = self.find_inode(path)?;
        if inode.is_dir() {
            return Ok(inode.ino);
        }

        let mut snapshot = inode.clone();
        snapshot.data = self.generate(inode.ino)?;
        let entry = self.open.vacant_entry();
        let ino = Ino(TRANSIENT_BASE + entry.key() as u64);
        snapshot.ino = ino;
        entry.insert(snapshot);
        log::debug!("procfs: opened {} as transient inode {}", path, ino);
        Ok(ino)
    }

    fn close(&mut self, ino: Ino) -> FsResult<()> {
        match Self::transient_key(ino) {
            Some(key) => self
                .open
                .try_remove(key)
                .map(|_| ())
                .ok_or(FsError::NotFound),
            None => Ok(()),
        }
    }

    fn read(&self, ino: Ino) -> FsResult<Vec<u8>> {
        match Self::transient_key(ino) {
            Some(_) => Ok(self.find_inode_by_number(ino)?.data.clone()),
            None => self.generate(ino),
        }
    }

    fn unlink(&mut self, _path: &str) -> FsResult<()> {
        Err(FsError::NotPermitted)
    }

    fn rmdir(&mut self, _path: &str) -> FsResult<()> {
        Err(FsError::NotPermitted)
    }

    fn rename(&mut self, _old: &str, _new: &str) -> FsResult<()> {
        Err(FsError::NotPermitted)
    }

    fn chmod(&mut self, _path: &str, _perms: u32) -> FsResult<()> {
        Err(FsError::NotPermitted)
    }

    fn chown(&mut self, _path: &str, _uid: Uid, _gid: Gid) -> FsResult<()> {
        Err(FsError::NotPermitted)
    }

    fn find_directory_entry(&self, path: &str) -> FsResult<&DirectoryEntry> {
        let mut current = &self.root;
        for name in components(path) {
            current = current.child(name).ok_or(FsError::NotFound)?;
        }
        Ok(current)
    }

    fn find_inode_by_number(&self, ino: Ino) -> FsResult<&Inode> {
        let found = match Self::transient_key(ino) {
            Some(key) => self.open.get(key),
            None => self.inodes.get(&ino),
        };
        found.ok_or(FsError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn procfs() -> ProcFs {
        ProcFs::new("Blackhat version 0.0.0")
    }

    #[test]
    fn test_listing() {
        let fs = procfs();
        assert_eq!(fs.getdents("/").unwrap(), vec!["cpuinfo", "uptime", "version"]);
        assert_eq!(fs.getdents("/uptime"), Err(FsError::NotADirectory));
    }

    #[test]
    fn test_open_snapshot_freed_on_close() {
        let mut fs = procfs();
        let ino = fs.open("/version", OpenFlags::READ).unwrap();
        assert!(ino.0 >= TRANSIENT_BASE);
        assert_eq!(fs.open_count(), 1);
        assert_eq!(fs.read(ino).unwrap(), b"Blackhat version 0.0.0\n");

        fs.close(ino).unwrap();
        assert_eq!(fs.open_count(), 0);
        assert_eq!(fs.read(ino), Err(FsError::NotFound));
        assert_eq!(fs.close(ino), Err(FsError::NotFound));
    }

    #[test]
    fn test_uptime_format() {
        let mut fs = procfs();
        let ino = fs.open("/uptime", OpenFlags::READ).unwrap();
        let text = String::from_utf8(fs.read(ino).unwrap()).unwrap();
        let fields: Vec<&str> = text.trim_end().split(' ').collect();
        assert_eq!(fields.len(), 2);
        for field in fields {
            let (_, frac) = field.split_once('.').unwrap();
            assert_eq!(frac.len(), 2);
        }
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_static_inode_reads_fresh() {
        let fs = procfs();
        let ino = fs.find_inode("/cpuinfo").unwrap().ino;
        assert!(ino.0 < TRANSIENT_BASE);
        let text = String::from_utf8(fs.read(ino).unwrap()).unwrap();
        assert!(text.starts_with("processor"));
    }

    #[test]
    fn test_mutation_not_permitted() {
        let mut fs = procfs();
        assert_eq!(fs.unlink("/uptime"), Err(FsError::NotPermitted));
        assert_eq!(fs.rmdir("/"), Err(FsError::NotPermitted));
        assert_eq!(fs.rename("/uptime", "/up"), Err(FsError::NotPermitted));
        assert_eq!(fs.chmod("/uptime", 0o777), Err(FsError::NotPermitted));
        assert_eq!(fs.chown("/uptime", Uid(1), Gid(1)), Err(FsError::NotPermitted));
        assert_eq!(fs.open("/uptime", OpenFlags::RDWR), Err(FsError::NotPermitted));
    }

    #[test]
    fn test_unsupported_names_op_and_fs() {
        let mut fs = procfs();
        assert_eq!(
            fs.link("/uptime", "/up"),
            Err(FsError::Unsupported {
                op: "link",
                fs: "procfs".to_string()
            })
        );
        assert!(matches!(
            fs.create("/new", Uid::ROOT, Gid::ROOT, FileMode::FILE_DEFAULT),
            Err(FsError::Unsupported { op: "create", .. })
        ));
        assert!(matches!(
            fs.write(UPTIME, b"x"),
            Err(FsError::Unsupported { op: "write", .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let mut fs = procfs();
        assert_eq!(fs.open("/meminfo", OpenFlags::READ), Err(FsError::NotFound));
        assert!(!fs.exists("/meminfo"));
        assert!(fs.exists("/"));
    }
}
