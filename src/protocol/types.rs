//! Core protocol types.

use serde::{Deserialize, Serialize};

/// Status codes returned in every response.
///
/// Numeric values are interoperable with NFSv3 where the two taxonomies
/// overlap; the values above 10000 use the NFSv3 extended range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Status {
    Ok,
    /// Not owner.
    Perm,
    /// No such file or directory.
    NoEnt,
    /// Hard I/O error.
    Io,
    /// Permission denied.
    Access,
    /// File already exists.
    Exist,
    /// Not a directory.
    NotDir,
    /// Is a directory.
    IsDir,
    /// Invalid argument or escaping name.
    Inval,
    /// File too large.
    FBig,
    /// No space left on device.
    NoSpc,
    /// Read-only filesystem.
    ReadOnlyFs,
    /// Name too long.
    NameTooLong,
    /// Directory not empty.
    NotEmpty,
    /// Stale file handle.
    Stale,
    /// Malformed file handle.
    BadHandle,
    /// Stale readdir cookie verifier.
    BadCookie,
    /// Operation not supported.
    NotSupp,
    /// Unclassified server-side failure.
    ServerFault,
}

impl Status {
    /// NFSv3-compatible numeric value.
    pub fn code(self) -> u32 {
        match self {
            Status::Ok => 0,
            Status::Perm => 1,
            Status::NoEnt => 2,
            Status::Io => 5,
            Status::Access => 13,
            Status::Exist => 17,
            Status::NotDir => 20,
            Status::IsDir => 21,
            Status::Inval => 22,
            Status::FBig => 27,
            Status::NoSpc => 28,
            Status::ReadOnlyFs => 30,
            Status::NameTooLong => 63,
            Status::NotEmpty => 66,
            Status::Stale => 70,
            Status::BadHandle => 10001,
            Status::BadCookie => 10003,
            Status::NotSupp => 10004,
            Status::ServerFault => 10006,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Perm => "ERR_PERM",
            Status::NoEnt => "ERR_NOENT",
            Status::Io => "ERR_IO",
            Status::Access => "ERR_ACCES",
            Status::Exist => "ERR_EXIST",
            Status::NotDir => "ERR_NOTDIR",
            Status::IsDir => "ERR_ISDIR",
            Status::Inval => "ERR_INVAL",
            Status::FBig => "ERR_FBIG",
            Status::NoSpc => "ERR_NOSPC",
            Status::ReadOnlyFs => "ERR_ROFS",
            Status::NameTooLong => "ERR_NAMETOOLONG",
            Status::NotEmpty => "ERR_NOTEMPTY",
            Status::Stale => "ERR_STALE",
            Status::BadHandle => "ERR_BADHANDLE",
            Status::BadCookie => "ERR_BAD_COOKIE",
            Status::NotSupp => "ERR_NOTSUPP",
            Status::ServerFault => "ERR_SERVERFAULT",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Caller identity attached to every request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub uid: u32,
    pub gid: u32,
    pub groups: Vec<u32>,
}

impl Credentials {
    pub fn new(uid: u32, gid: u32) -> Self {
        Self {
            uid,
            gid,
            groups: Vec::new(),
        }
    }

    /// Whether `gid` is the primary or a supplementary group of the caller.
    pub fn in_group(&self, gid: u32) -> bool {
        self.gid == gid || self.groups.contains(&gid)
    }
}

/// Seconds + nanoseconds timestamp.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileTime {
    pub seconds: i64,
    pub nanos: i32,
}

impl FileTime {
    pub fn new(seconds: i64, nanos: i32) -> Self {
        Self { seconds, nanos }
    }
}

/// File object classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
    Block,
    Char,
    Fifo,
    Socket,
}

impl FileType {
    pub fn is_dir(self) -> bool {
        self == FileType::Directory
    }

    pub fn is_regular(self) -> bool {
        self == FileType::Regular
    }
}

/// Attributes of a file as reported to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileAttributes {
    pub file_type: FileType,
    /// Permission bits plus SUID/SGID/sticky.
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    /// Bytes actually allocated on disk.
    pub used: u64,
    pub rdev: u64,
    /// Host inode number.
    pub file_id: u64,
    pub atime: FileTime,
    pub mtime: FileTime,
    pub ctime: FileTime,
    pub block_size: u32,
    pub blocks: u64,
}

impl FileAttributes {
    pub fn is_dir(&self) -> bool {
        self.file_type.is_dir()
    }

    pub fn is_regular(&self) -> bool {
        self.file_type.is_regular()
    }
}

/// Attributes to apply with `SetAttr` (and initial attributes on create).
/// Unset fields leave the corresponding attribute unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SetAttrs {
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub size: Option<u64>,
    pub atime: Option<FileTime>,
    pub mtime: Option<FileTime>,
}

impl SetAttrs {
    /// Just a permission change.
    pub fn with_mode(mode: u32) -> Self {
        Self {
            mode: Some(mode),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// True when any field other than `size` is set.
    pub fn touches_metadata(&self) -> bool {
        self.mode.is_some()
            || self.uid.is_some()
            || self.gid.is_some()
            || self.atime.is_some()
            || self.mtime.is_some()
    }
}

/// One directory entry. `attrs` is populated only by `ReadDirPlus`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirEntry {
    pub file_id: u64,
    pub name: String,
    pub cookie: u64,
    pub attrs: Option<FileAttributes>,
}

/// How `Create` treats an existing name.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CreateMode {
    /// Truncate-or-create.
    Unchecked,
    /// Fail if the name exists.
    Guarded,
    /// Guarded, but idempotent under replay of the same verifier.
    Exclusive,
}

/// Durability requested by (or reported for) a write.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Stability {
    Unstable,
    DataSync,
    FileSync,
}

impl Stability {
    pub fn from_level(level: u32) -> Option<Self> {
        match level {
            0 => Some(Stability::Unstable),
            1 => Some(Stability::DataSync),
            2 => Some(Stability::FileSync),
            _ => None,
        }
    }

    pub fn level(self) -> u32 {
        match self {
            Stability::Unstable => 0,
            Stability::DataSync => 1,
            Stability::FileSync => 2,
        }
    }
}

/// Filesystem usage summary returned by `StatFs`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FsStat {
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub avail_bytes: u64,
    pub total_files: u64,
    pub free_files: u64,
    pub name_max: u32,
}
