//! Filesystem error taxonomy.
//!
//! `FsError` is the closed set of failures the filesystem core can report.
//! Host I/O errors are classified by errno on entry; anything unrecognized
//! collapses to `Io` and is logged with its native identifier so an operator
//! can chase it down.

use std::io;

use tracing::warn;

use crate::protocol::Status;

pub type FsResult<T> = Result<T, FsError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FsError {
    #[error("not owner")]
    NotOwner,

    #[error("file does not exist")]
    NotFound,

    #[error("input/output error")]
    Io,

    #[error("permission denied")]
    Permission,

    #[error("file already exists")]
    Exists,

    #[error("not a directory")]
    NotDir,

    #[error("is a directory")]
    IsDir,

    #[error("invalid name")]
    InvalidName,

    #[error("file too large")]
    FileTooLarge,

    #[error("no space left on device")]
    NoSpace,

    #[error("read-only filesystem")]
    ReadOnly,

    #[error("name too long")]
    NameTooLong,

    #[error("directory not empty")]
    NotEmpty,

    #[error("stale file handle")]
    Stale,

    #[error("invalid file handle")]
    InvalidHandle,

    #[error("invalid directory cookie")]
    BadCookie,

    #[error("operation not supported")]
    NotSupported,

    #[error("server fault")]
    ServerFault,
}

impl FsError {
    /// Map to the wire status code.
    pub fn status(&self) -> Status {
        match self {
            FsError::NotOwner => Status::Perm,
            FsError::NotFound => Status::NoEnt,
            FsError::Io => Status::Io,
            FsError::Permission => Status::Access,
            FsError::Exists => Status::Exist,
            FsError::NotDir => Status::NotDir,
            FsError::IsDir => Status::IsDir,
            FsError::InvalidName => Status::Inval,
            FsError::FileTooLarge => Status::FBig,
            FsError::NoSpace => Status::NoSpc,
            FsError::ReadOnly => Status::ReadOnlyFs,
            FsError::NameTooLong => Status::NameTooLong,
            FsError::NotEmpty => Status::NotEmpty,
            FsError::Stale => Status::Stale,
            FsError::InvalidHandle => Status::BadHandle,
            FsError::BadCookie => Status::BadCookie,
            FsError::NotSupported => Status::NotSupp,
            FsError::ServerFault => Status::ServerFault,
        }
    }

    /// Classify a host I/O error by errno.
    pub fn from_io(err: &io::Error) -> Self {
        match err.raw_os_error() {
            Some(libc::EPERM) => FsError::NotOwner,
            Some(libc::ENOENT) => FsError::NotFound,
            Some(libc::EIO) => FsError::Io,
            Some(libc::EACCES) => FsError::Permission,
            Some(libc::EEXIST) => FsError::Exists,
            Some(libc::ENOTDIR) => FsError::NotDir,
            Some(libc::EISDIR) => FsError::IsDir,
            Some(libc::EINVAL) => FsError::InvalidName,
            Some(libc::EFBIG) => FsError::FileTooLarge,
            Some(libc::ENOSPC) => FsError::NoSpace,
            Some(libc::EROFS) => FsError::ReadOnly,
            Some(libc::ENAMETOOLONG) => FsError::NameTooLong,
            Some(libc::ENOTEMPTY) => FsError::NotEmpty,
            Some(libc::ESTALE) => FsError::Stale,
            _ => {
                // Also cover errors minted without an errno (e.g. from
                // io::ErrorKind constructors in std).
                match err.kind() {
                    io::ErrorKind::NotFound => FsError::NotFound,
                    io::ErrorKind::PermissionDenied => FsError::Permission,
                    io::ErrorKind::AlreadyExists => FsError::Exists,
                    _ => {
                        warn!(target: "nfs-pipe::fs", error = %err, kind = ?err.kind(), "unrecognized host error");
                        FsError::Io
                    }
                }
            }
        }
    }
}

impl From<io::Error> for FsError {
    fn from(err: io::Error) -> Self {
        FsError::from_io(&err)
    }
}

impl From<nix::errno::Errno> for FsError {
    fn from(errno: nix::errno::Errno) -> Self {
        FsError::from_io(&io::Error::from_raw_os_error(errno as i32))
    }
}
