//! User/group identities and process credentials
//!
//! Linux keeps four identities per process: real, effective, saved and
//! filesystem. Permission checks in the VFS consult only the filesystem
//! slots.

/// User identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Uid(pub u32);

impl Uid {
    pub const ROOT: Uid = Uid(0);
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Group identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Gid(pub u32);

impl Gid {
    pub const ROOT: Gid = Gid(0);
}

impl std::fmt::Display for Gid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The credential set of a process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
    pub ruid: Uid,
    pub euid: Uid,
    pub suid: Uid,
    pub fsuid: Uid,
    pub rgid: Gid,
    pub egid: Gid,
    pub sgid: Gid,
    pub fsgid: Gid,
}

impl Credentials {
    /// All eight slots set to the same user and group
    pub fn new(uid: Uid, gid: Gid) -> Self {
        Self {
            ruid: uid,
            euid: uid,
            suid: uid,
            fsuid: uid,
            rgid: gid,
            egid: gid,
            sgid: gid,
            fsgid: gid,
        }
    }

    pub fn root() -> Self {
        Self::new(Uid::ROOT, Gid::ROOT)
    }

    /// Credentials for a child started by this process (exec runs as the
    /// caller's effective identity)
    pub fn for_child(&self) -> Self {
        Self::new(self.euid, self.egid)
    }

    /// Change the effective uid; the filesystem uid follows it
    pub fn set_euid(&mut self, uid: Uid) {
        self.euid = uid;
        self.fsuid = uid;
    }

    /// Change the effective gid; the filesystem gid follows it
    pub fn set_egid(&mut self, gid: Gid) {
        self.egid = gid;
        self.fsgid = gid;
    }

    /// Superuser for the purpose of filesystem access
    pub fn is_fs_superuser(&self) -> bool {
        self.fsuid == Uid::ROOT || self.fsgid == Gid::ROOT
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::root()
    }
}
