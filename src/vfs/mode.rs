//! Mode bits and open flags
//!
//! The literal values match Linux/POSIX so scripts written against the real
//! headers keep working inside the simulation.

/// File type and permission bits (st_mode)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FileMode(pub u32);

impl FileMode {
    // Permission bits
    pub const S_IRUSR: u32 = 0o400; // Owner read
    pub const S_IWUSR: u32 = 0o200; // Owner write
    pub const S_IXUSR: u32 = 0o100; // Owner execute
    pub const S_IRGRP: u32 = 0o040; // Group read
    pub const S_IWGRP: u32 = 0o020; // Group write
    pub const S_IXGRP: u32 = 0o010; // Group execute
    pub const S_IROTH: u32 = 0o004; // Other read
    pub const S_IWOTH: u32 = 0o002; // Other write
    pub const S_IXOTH: u32 = 0o001; // Other execute

    // Special bits
    pub const S_ISUID: u32 = 0o4000; // Set-user-ID
    pub const S_ISGID: u32 = 0o2000; // Set-group-ID
    pub const S_ISVTX: u32 = 0o1000; // Sticky bit

    // File types (mutually exclusive)
    pub const S_IFMT: u32 = 0xF000;
    pub const S_IFIFO: u32 = 0x1000;
    pub const S_IFCHR: u32 = 0x2000;
    pub const S_IFDIR: u32 = 0x4000;
    pub const S_IFBLK: u32 = 0x6000;
    pub const S_IFREG: u32 = 0x8000;
    pub const S_IFLNK: u32 = 0xA000;
    pub const S_IFSOCK: u32 = 0xC000;

    /// Mask covering permission and special bits
    pub const PERM_MASK: u32 = 0o7777;

    pub const FILE_DEFAULT: FileMode = FileMode(Self::S_IFREG | 0o644); // rw-r--r--
    pub const DIR_DEFAULT: FileMode = FileMode(Self::S_IFDIR | 0o755); // rwxr-xr-x

    /// Build a mode, defaulting to a regular file when no type bits are given
    pub fn new(mode: u32) -> Self {
        let kind = mode & Self::S_IFMT;
        let kind = if kind == 0 { Self::S_IFREG } else { kind };
        FileMode(kind | (mode & Self::PERM_MASK))
    }

    pub fn directory(perms: u32) -> Self {
        FileMode(Self::S_IFDIR | (perms & Self::PERM_MASK))
    }

    pub fn regular(perms: u32) -> Self {
        FileMode(Self::S_IFREG | (perms & Self::PERM_MASK))
    }

    pub fn symlink(perms: u32) -> Self {
        FileMode(Self::S_IFLNK | (perms & Self::PERM_MASK))
    }

    /// The file type bits alone
    pub fn file_type(&self) -> u32 {
        self.0 & Self::S_IFMT
    }

    /// Permission and special bits without the type
    pub fn perms(&self) -> u32 {
        self.0 & Self::PERM_MASK
    }

    /// Replace the permission bits, keeping the file type
    pub fn with_perms(&self, perms: u32) -> Self {
        FileMode(self.file_type() | (perms & Self::PERM_MASK))
    }

    pub fn is_dir(&self) -> bool {
        self.file_type() == Self::S_IFDIR
    }

    pub fn is_file(&self) -> bool {
        self.file_type() == Self::S_IFREG
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type() == Self::S_IFLNK
    }

    pub fn owner_read(&self) -> bool {
        self.0 & Self::S_IRUSR != 0
    }

    pub fn owner_write(&self) -> bool {
        self.0 & Self::S_IWUSR != 0
    }

    pub fn owner_exec(&self) -> bool {
        self.0 & Self::S_IXUSR != 0
    }

    pub fn group_read(&self) -> bool {
        self.0 & Self::S_IRGRP != 0
    }

    pub fn group_write(&self) -> bool {
        self.0 & Self::S_IWGRP != 0
    }

    pub fn group_exec(&self) -> bool {
        self.0 & Self::S_IXGRP != 0
    }

    pub fn other_read(&self) -> bool {
        self.0 & Self::S_IROTH != 0
    }

    pub fn other_write(&self) -> bool {
        self.0 & Self::S_IWOTH != 0
    }

    pub fn other_exec(&self) -> bool {
        self.0 & Self::S_IXOTH != 0
    }

    /// Any of the three execute bits
    pub fn any_exec(&self) -> bool {
        self.0 & (Self::S_IXUSR | Self::S_IXGRP | Self::S_IXOTH) != 0
    }

    pub fn is_setuid(&self) -> bool {
        self.0 & Self::S_ISUID != 0
    }

    pub fn is_setgid(&self) -> bool {
        self.0 & Self::S_ISGID != 0
    }

    pub fn is_sticky(&self) -> bool {
        self.0 & Self::S_ISVTX != 0
    }

    /// Format like `ls -l` (e.g., "drwxr-xr-x")
    pub fn to_symbolic(&self) -> String {
        let mut s = String::with_capacity(10);
        s.push(match self.file_type() {
            Self::S_IFDIR => 'd',
            Self::S_IFLNK => 'l',
            Self::S_IFIFO => 'p',
            Self::S_IFCHR => 'c',
            Self::S_IFBLK => 'b',
            Self::S_IFSOCK => 's',
            _ => '-',
        });
        s.push(if self.owner_read() { 'r' } else { '-' });
        s.push(if self.owner_write() { 'w' } else { '-' });
        s.push(if self.is_setuid() {
            if self.owner_exec() { 's' } else { 'S' }
        } else if self.owner_exec() {
            'x'
        } else {
            '-'
        });
        s.push(if self.group_read() { 'r' } else { '-' });
        s.push(if self.group_write() { 'w' } else { '-' });
        s.push(if self.is_setgid() {
            if self.group_exec() { 's' } else { 'S' }
        } else if self.group_exec() {
            'x'
        } else {
            '-'
        });
        s.push(if self.other_read() { 'r' } else { '-' });
        s.push(if self.other_write() { 'w' } else { '-' });
        s.push(if self.is_sticky() {
            if self.other_exec() { 't' } else { 'T' }
        } else if self.other_exec() {
            'x'
        } else {
            '-'
        });
        s
    }
}

impl std::fmt::Display for FileMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04o}", self.perms())
    }
}

/// Flags for open(2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags(pub u32);

impl OpenFlags {
    pub const O_RDONLY: u32 = 0o0;
    pub const O_WRONLY: u32 = 0o1;
    pub const O_RDWR: u32 = 0o2;
    pub const O_ACCMODE: u32 = 0o3;
    pub const O_CREAT: u32 = 0o100;
    pub const O_EXCL: u32 = 0o200;
    pub const O_NOCTTY: u32 = 0o400;
    pub const O_TRUNC: u32 = 0o1000;
    pub const O_APPEND: u32 = 0o2000;
    pub const O_NONBLOCK: u32 = 0o4000;
    pub const O_DSYNC: u32 = 0o10000;
    pub const O_ASYNC: u32 = 0o20000;
    pub const O_DIRECT: u32 = 0o40000;
    pub const O_LARGEFILE: u32 = 0o100000;
    pub const O_DIRECTORY: u32 = 0o200000;
    pub const O_NOFOLLOW: u32 = 0o400000;
    pub const O_NOATIME: u32 = 0o1000000;
    pub const O_CLOEXEC: u32 = 0o2000000;

    pub const READ: OpenFlags = OpenFlags(Self::O_RDONLY);
    pub const WRITE: OpenFlags = OpenFlags(Self::O_WRONLY);
    pub const RDWR: OpenFlags = OpenFlags(Self::O_RDWR);

    pub fn new(flags: u32) -> Self {
        OpenFlags(flags)
    }

    pub fn with(self, flag: u32) -> Self {
        OpenFlags(self.0 | flag)
    }

    pub fn contains(&self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    pub fn readable(&self) -> bool {
        matches!(self.0 & Self::O_ACCMODE, Self::O_RDONLY | Self::O_RDWR)
    }

    pub fn writable(&self) -> bool {
        matches!(self.0 & Self::O_ACCMODE, Self::O_WRONLY | Self::O_RDWR)
    }

    pub fn create(&self) -> bool {
        self.contains(Self::O_CREAT)
    }

    pub fn exclusive(&self) -> bool {
        self.contains(Self::O_EXCL)
    }

    pub fn truncate(&self) -> bool {
        self.contains(Self::O_TRUNC)
    }

    pub fn append(&self) -> bool {
        self.contains(Self::O_APPEND)
    }
}
