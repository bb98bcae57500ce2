//! In-memory inode filesystem
//!
//! Named after the on-disk format it imitates, but nothing here touches a
//! block device: the inode table is a map keyed by inode number and the
//! namespace is a tree of [`DirectoryEntry`] nodes holding numbers, never
//! references. The table alone decides whether an inode exists, so dropping
//! the last link can never leave a dangling entry behind.

use super::inode::{DirectoryEntry, Ino, Inode};
use super::mode::FileMode;
use super::{Filesystem, FsError, FsResult, components, normalize_path, split_parent};
use crate::kernel::cred::{Gid, Uid};
use std::collections::HashMap;

/// Top-level directories of a fresh system and their permissions
const STANDARD_DIRS: &[(&str, u32)] = &[
    ("bin", 0o755),
    ("etc", 0o755),
    ("home", 0o755),
    ("lib", 0o755),
    ("root", 0o750),
    ("run", 0o755),
    ("sbin", 0o755),
    ("proc", 0o555),
    ("tmp", 0o1777),
    ("usr", 0o755),
    ("var", 0o755),
];

pub struct Ext4 {
    root: DirectoryEntry,
    inodes: HashMap<Ino, Inode>,
    next_ino: u64,
}

impl Ext4 {
    /// An empty filesystem holding only a root directory owned by root
    pub fn new() -> Self {
        let mut inodes = HashMap::new();
        inodes.insert(
            Ino::ROOT,
            Inode::new(Ino::ROOT, FileMode::directory(0o755), Uid::ROOT, Gid::ROOT),
        );
        Self {
            root: DirectoryEntry::new("/", Ino::ROOT),
            inodes,
            next_ino: Ino::FIRST.0,
        }
    }

    /// Root plus the standard top-level directories
    pub fn make_standard_fs() -> Self {
        let mut fs = Self::new();
        for (name, perms) in STANDARD_DIRS {
            // Cannot collide on a fresh tree
            let _ = fs.mkdir(&format!("/{}", name), *perms, Uid::ROOT, Gid::ROOT);
        }
        fs
    }

    /// Create a directory
    pub fn mkdir(&mut self, path: &str, perms: u32, uid: Uid, gid: Gid) -> FsResult<Ino> {
        self.create(path, uid, gid, FileMode::directory(perms))
    }

    /// Number of live inodes, the root included
    pub fn inode_count(&self) -> usize {
        self.inodes.len()
    }

    fn alloc_ino(&mut self) -> Ino {
        let ino = Ino(self.next_ino);
        self.next_ino += 1;
        ino
    }

    fn inode_mut(&mut self, ino: Ino) -> FsResult<&mut Inode> {
        self.inodes.get_mut(&ino).ok_or(FsError::NotFound)
    }

    fn entry_mut(&mut self, path: &str) -> FsResult<&mut DirectoryEntry> {
        let mut current = &mut self.root;
        for name in components(path) {
            current = current.child_mut(name).ok_or(FsError::NotFound)?;
        }
        Ok(current)
    }

    /// Resolve the parent of `path` and make sure it is a directory.
    /// Returns the parent path and the final component.
    fn parent_dir(&self, path: &str) -> FsResult<(String, String)> {
        let (parent, name) = split_parent(path)?;
        if !self.find_inode(&parent)?.is_dir() {
            return Err(FsError::NotADirectory);
        }
        Ok((parent, name))
    }

    /// Drop one link from an inode, destroying it at zero
    fn release(&mut self, ino: Ino) {
        let Some(inode) = self.inodes.get_mut(&ino) else {
            return;
        };
        inode.links = inode.links.saturating_sub(1);
        if inode.links == 0 {
            self.inodes.remove(&ino);
            log::debug!("ext4: freed inode {}", ino);
        }
    }

    fn is_root(path: &str) -> bool {
        components(path).next().is_none()
    }
}

impl Default for Ext4 {
    fn default() -> Self {
        Self::new()
    }
}

impl Filesystem for Ext4 {
    fn name(&self) -> &str {
        "ext4"
    }

    fn create(&mut self, path: &str, uid: Uid, gid: Gid, mode: FileMode) -> FsResult<Ino> {
        let (parent, name) = self.parent_dir(path)?;
        if self.exists(path) {
            return Err(FsError::AlreadyExists);
        }

        let ino = self.alloc_ino();
        let inode = Inode::new(ino, FileMode::new(mode.0), uid, gid);
        self.inodes.insert(ino, inode);
        self.entry_mut(&parent)?.insert(DirectoryEntry::new(&name, ino));
        Ok(ino)
    }

    fn read(&self, ino: Ino) -> FsResult<Vec<u8>> {
        Ok(self.find_inode_by_number(ino)?.read().to_vec())
    }

    fn write(&mut self, ino: Ino, data: &[u8]) -> FsResult<usize> {
        let inode = self.inode_mut(ino)?;
        if inode.is_dir() {
            return Err(FsError::IsADirectory);
        }
        Ok(inode.write(data))
    }

    fn append(&mut self, ino: Ino, data: &[u8]) -> FsResult<usize> {
        let inode = self.inode_mut(ino)?;
        if inode.is_dir() {
            return Err(FsError::IsADirectory);
        }
        Ok(inode.append(data))
    }

    fn unlink(&mut self, path: &str) -> FsResult<()> {
        if Self::is_root(path) {
            return Err(FsError::NotPermitted);
        }
        if self.find_inode(path)?.is_dir() {
            return Err(FsError::IsADirectory);
        }

        let (parent, name) = split_parent(path)?;
        let entry = self
            .entry_mut(&parent)?
            .remove(&name)
            .ok_or(FsError::NotFound)?;
        self.release(entry.ino);
        Ok(())
    }

    fn rmdir(&mut self, path: &str) -> FsResult<()> {
        if Self::is_root(path) {
            return Err(FsError::NotPermitted);
        }
        let entry = self.find_directory_entry(path)?;
        if !self.find_inode_by_number(entry.ino)?.is_dir() {
            return Err(FsError::NotADirectory);
        }
        if !entry.is_empty() {
            return Err(FsError::NotEmpty);
        }

        let (parent, name) = split_parent(path)?;
        let entry = self
            .entry_mut(&parent)?
            .remove(&name)
            .ok_or(FsError::NotFound)?;
        self.release(entry.ino);
        Ok(())
    }

    fn rename(&mut self, old: &str, new: &str) -> FsResult<()> {
        if Self::is_root(old) {
            return Err(FsError::NotPermitted);
        }
        self.find_directory_entry(old)?;
        if self.exists(new) {
            return Err(FsError::AlreadyExists);
        }
        let (new_parent, new_name) = self.parent_dir(new)?;

        let old_norm = normalize_path(old);
        let new_norm = normalize_path(new);
        if new_norm.starts_with(&format!("{}/", old_norm)) {
            return Err(FsError::InvalidArgument);
        }

        // Detach the whole subtree and graft it under its new name
        let (old_parent, old_name) = split_parent(old)?;
        let mut subtree = self
            .entry_mut(&old_parent)?
            .remove(&old_name)
            .ok_or(FsError::NotFound)?;
        subtree.name = new_name;
        self.entry_mut(&new_parent)?.insert(subtree);
        Ok(())
    }

    fn link(&mut self, old: &str, new: &str) -> FsResult<()> {
        let inode = self.find_inode(old)?;
        if inode.is_dir() {
            return Err(FsError::NotPermitted);
        }
        let ino = inode.ino;
        if self.exists(new) {
            return Err(FsError::AlreadyExists);
        }
        let (parent, name) = self.parent_dir(new)?;

        self.entry_mut(&parent)?.insert(DirectoryEntry::new(&name, ino));
        self.inode_mut(ino)?.links += 1;
        Ok(())
    }

    /// The link takes the permission bits of its target; the kernel looks
    /// those up because the target may live on another mount
    fn symlink(
        &mut self,
        target: &str,
        linkpath: &str,
        perms: u32,
        uid: Uid,
        gid: Gid,
    ) -> FsResult<Ino> {
        let (parent, name) = self.parent_dir(linkpath)?;
        if self.exists(linkpath) {
            return Err(FsError::AlreadyExists);
        }

        let ino = self.alloc_ino();
        self.inodes
            .insert(ino, Inode::new_symlink(ino, perms, uid, gid, target));
        self.entry_mut(&parent)?.insert(DirectoryEntry::new(&name, ino));
        Ok(ino)
    }

    fn chmod(&mut self, path: &str, perms: u32) -> FsResult<()> {
        let ino = self.find_directory_entry(path)?.ino;
        let inode = self.inode_mut(ino)?;
        inode.mode = inode.mode.with_perms(perms);
        Ok(())
    }

    fn chown(&mut self, path: &str, uid: Uid, gid: Gid) -> FsResult<()> {
        let ino = self.find_directory_entry(path)?.ino;
        let inode = self.inode_mut(ino)?;
        inode.uid = uid;
        inode.gid = gid;
        Ok(())
    }

    fn find_directory_entry(&self, path: &str) -> FsResult<&DirectoryEntry> {
        let mut current = &self.root;
        for name in components(path) {
            current = current.child(name).ok_or(FsError::NotFound)?;
        }
        Ok(current)
    }

    fn find_inode_by_number(&self, ino: Ino) -> FsResult<&Inode> {
        self.inodes.get(&ino).ok_or(FsError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(fs: &mut Ext4, path: &str, data: &[u8]) -> Ino {
        let ino = fs
            .create(path, Uid(1000), Gid(1000), FileMode::regular(0o644))
            .unwrap();
        fs.write(ino, data).unwrap();
        ino
    }

    #[test]
    fn test_standard_layout() {
        let fs = Ext4::make_standard_fs();
        let mut names = fs.getdents("/").unwrap();
        names.sort();
        assert_eq!(
            names,
            vec![
                "bin", "etc", "home", "lib", "proc", "root", "run", "sbin", "tmp", "usr", "var"
            ]
        );
        assert_eq!(fs.find_inode("/root").unwrap().mode.perms(), 0o750);
        assert_eq!(fs.find_inode("/proc").unwrap().mode.perms(), 0o555);
        assert!(fs.find_inode("/tmp").unwrap().mode.is_sticky());
        assert_eq!(fs.find_inode("/").unwrap().ino, Ino::ROOT);
    }

    #[test]
    fn test_create_then_exists() {
        let mut fs = Ext4::make_standard_fs();
        assert!(!fs.exists("/tmp/a"));
        let ino = file(&mut fs, "/tmp/a", b"");
        assert!(fs.exists("/tmp/a"));
        assert!(fs.exists("//tmp///a"));
        assert!(ino.0 >= Ino::FIRST.0);
    }

    #[test]
    fn test_create_missing_parent() {
        let mut fs = Ext4::new();
        let result = fs.create("/nope/file", Uid::ROOT, Gid::ROOT, FileMode::FILE_DEFAULT);
        assert_eq!(result, Err(FsError::NotFound));
    }

    #[test]
    fn test_create_under_file() {
        let mut fs = Ext4::make_standard_fs();
        file(&mut fs, "/tmp/plain", b"x");
        let result = fs.create("/tmp/plain/child", Uid::ROOT, Gid::ROOT, FileMode::FILE_DEFAULT);
        assert_eq!(result, Err(FsError::NotADirectory));
    }

    #[test]
    fn test_create_existing() {
        let mut fs = Ext4::make_standard_fs();
        file(&mut fs, "/tmp/a", b"x");
        let result = fs.create("/tmp/a", Uid::ROOT, Gid::ROOT, FileMode::FILE_DEFAULT);
        assert_eq!(result, Err(FsError::AlreadyExists));
    }

    #[test]
    fn test_write_read_append() {
        let mut fs = Ext4::make_standard_fs();
        let ino = file(&mut fs, "/tmp/a", b"hello");
        assert_eq!(fs.read(ino).unwrap(), b"hello");
        fs.write(ino, b"bye").unwrap();
        assert_eq!(fs.read(ino).unwrap(), b"bye");
        fs.append(ino, b"!").unwrap();
        assert_eq!(fs.read(ino).unwrap(), b"bye!");
    }

    #[test]
    fn test_read_absent_differs_from_empty() {
        let mut fs = Ext4::make_standard_fs();
        let ino = file(&mut fs, "/tmp/empty", b"");
        assert_eq!(fs.read(ino), Ok(Vec::new()));
        assert_eq!(fs.read(Ino(9999)), Err(FsError::NotFound));
    }

    #[test]
    fn test_link_then_unlink_keeps_content() {
        let mut fs = Ext4::make_standard_fs();
        let ino = file(&mut fs, "/tmp/old", b"data");
        fs.link("/tmp/old", "/tmp/new").unwrap();
        assert_eq!(fs.find_inode("/tmp/new").unwrap().links, 2);

        fs.unlink("/tmp/old").unwrap();
        let inode = fs.find_inode("/tmp/new").unwrap();
        assert_eq!(inode.ino, ino);
        assert_eq!(inode.links, 1);
        assert_eq!(fs.read(ino).unwrap(), b"data");

        fs.unlink("/tmp/new").unwrap();
        assert_eq!(fs.find_inode_by_number(ino), Err(FsError::NotFound));
        assert!(!fs.exists("/tmp/old"));
        assert!(!fs.exists("/tmp/new"));
    }

    #[test]
    fn test_link_rules() {
        let mut fs = Ext4::make_standard_fs();
        file(&mut fs, "/tmp/a", b"");
        file(&mut fs, "/tmp/b", b"");
        assert_eq!(fs.link("/tmp/missing", "/tmp/c"), Err(FsError::NotFound));
        assert_eq!(fs.link("/tmp/a", "/tmp/b"), Err(FsError::AlreadyExists));
        assert_eq!(fs.link("/tmp", "/tmpdir"), Err(FsError::NotPermitted));
    }

    #[test]
    fn test_unlink_directory_rejected() {
        let mut fs = Ext4::make_standard_fs();
        assert_eq!(fs.unlink("/tmp"), Err(FsError::IsADirectory));
        assert_eq!(fs.unlink("/"), Err(FsError::NotPermitted));
        assert_eq!(fs.unlink("/tmp/none"), Err(FsError::NotFound));
    }

    #[test]
    fn test_rmdir_non_empty_is_noop() {
        let mut fs = Ext4::make_standard_fs();
        file(&mut fs, "/home/notes", b"keep");
        let before = fs.inode_count();

        assert_eq!(fs.rmdir("/home"), Err(FsError::NotEmpty));
        assert_eq!(fs.inode_count(), before);
        assert!(fs.exists("/home/notes"));

        fs.unlink("/home/notes").unwrap();
        fs.rmdir("/home").unwrap();
        assert!(!fs.exists("/home"));
        assert_eq!(fs.inode_count(), before - 2);
    }

    #[test]
    fn test_rmdir_rules() {
        let mut fs = Ext4::make_standard_fs();
        file(&mut fs, "/tmp/f", b"");
        assert_eq!(fs.rmdir("/tmp/f"), Err(FsError::NotADirectory));
        assert_eq!(fs.rmdir("/"), Err(FsError::NotPermitted));
        assert_eq!(fs.rmdir("/missing"), Err(FsError::NotFound));
    }

    #[test]
    fn test_rename_moves_subtree() {
        let mut fs = Ext4::make_standard_fs();
        fs.mkdir("/home/user", 0o755, Uid(1000), Gid(1000)).unwrap();
        let ino = file(&mut fs, "/home/user/notes", b"secret");

        fs.rename("/home/user", "/tmp/user2").unwrap();
        assert!(!fs.exists("/home/user"));
        let inode = fs.find_inode("/tmp/user2/notes").unwrap();
        assert_eq!(inode.ino, ino);
        assert_eq!(inode.links, 1);
        assert_eq!(fs.read(ino).unwrap(), b"secret");
    }

    #[test]
    fn test_rename_onto_existing_fails() {
        let mut fs = Ext4::make_standard_fs();
        let a = file(&mut fs, "/tmp/a", b"A");
        let b = file(&mut fs, "/tmp/b", b"B");
        assert_eq!(fs.rename("/tmp/a", "/tmp/b"), Err(FsError::AlreadyExists));
        assert_eq!(fs.read(a).unwrap(), b"A");
        assert_eq!(fs.read(b).unwrap(), b"B");
        assert!(fs.exists("/tmp/a"));
    }

    #[test]
    fn test_rename_into_self_rejected() {
        let mut fs = Ext4::make_standard_fs();
        fs.mkdir("/tmp/d", 0o755, Uid::ROOT, Gid::ROOT).unwrap();
        assert_eq!(fs.rename("/tmp/d", "/tmp/d/e"), Err(FsError::InvalidArgument));
        assert_eq!(fs.rename("/tmp/x", "/tmp/y"), Err(FsError::NotFound));
        assert_eq!(fs.rename("/tmp/d", "/nope/d"), Err(FsError::NotFound));
        assert!(fs.exists("/tmp/d"));
    }

    #[test]
    fn test_symlink_stores_target_verbatim() {
        let mut fs = Ext4::make_standard_fs();
        file(&mut fs, "/tmp/pw", b"");
        let ino = fs
            .symlink("../etc/passwd", "/tmp/link", 0o600, Uid(1000), Gid(1000))
            .unwrap();

        let link = fs.find_inode_by_number(ino).unwrap();
        assert!(link.is_symlink());
        assert_eq!(link.mode.perms(), 0o600);
        assert_eq!(link.link_target(), Some("../etc/passwd"));
        assert_eq!(
            fs.symlink("/etc/passwd", "/tmp/pw", 0o644, Uid::ROOT, Gid::ROOT),
            Err(FsError::AlreadyExists)
        );
        assert_eq!(
            fs.symlink("/etc/passwd", "/nope/pw", 0o644, Uid::ROOT, Gid::ROOT),
            Err(FsError::NotFound)
        );
    }

    #[test]
    fn test_chmod_keeps_type_and_chown() {
        let mut fs = Ext4::make_standard_fs();
        fs.chmod("/tmp", 0o700).unwrap();
        let tmp = fs.find_inode("/tmp").unwrap();
        assert!(tmp.is_dir());
        assert_eq!(tmp.mode.perms(), 0o700);

        fs.chown("/tmp", Uid(5), Gid(6)).unwrap();
        let tmp = fs.find_inode("/tmp").unwrap();
        assert_eq!((tmp.uid, tmp.gid), (Uid(5), Gid(6)));
    }

    #[test]
    fn test_getdents_on_file() {
        let mut fs = Ext4::make_standard_fs();
        file(&mut fs, "/tmp/f", b"");
        assert_eq!(fs.getdents("/tmp/f"), Err(FsError::NotADirectory));
        assert_eq!(fs.getdents("/tmp").unwrap(), vec!["f".to_string()]);
    }

    #[test]
    fn test_inode_numbers_monotonic() {
        let mut fs = Ext4::make_standard_fs();
        let a = file(&mut fs, "/tmp/a", b"");
        fs.unlink("/tmp/a").unwrap();
        let b = file(&mut fs, "/tmp/a", b"");
        assert!(b > a);
    }
}
