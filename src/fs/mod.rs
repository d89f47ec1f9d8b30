//! Filesystem abstraction.
//!
//! This module provides:
//!
//! - `FileSystem`: the trait the request dispatcher drives
//! - `LocalFs`: the host-backed implementation under an export jail
//! - `FileHandle`: the 16-byte handle codec
//! - `PathJail`: lexical path containment
//! - `InodeIndex`: the inode -> path/generation index with walk recovery
//! - `FsError`: the closed error taxonomy
//!
//! Paths at this layer are jail-relative (`/`, `/dir/file`); only
//! `PathJail` turns them into host paths. All operations are synchronous
//! and are expected to be called from a blocking-capable context.

mod attr;
mod error;
mod handle;
mod index;
mod jail;
mod local;

pub use attr::{
    attributes_from_metadata, check_access, file_type_from_mode, ACCESS_EXECUTE, ACCESS_READ,
    ACCESS_WRITE,
};
pub use error::{FsError, FsResult};
pub use handle::{export_fs_id, handle_hex, FileHandle, HANDLE_SIZE};
pub use index::InodeIndex;
pub use jail::{clean, join_child, parent_of, validate_component, PathJail, NAME_MAX};
pub use local::LocalFs;

use crate::protocol::{Credentials, DirEntry, FileAttributes, FsStat, SetAttrs, Stability};

/// One page of a directory enumeration.
#[derive(Debug, Clone)]
pub struct ReadDirPage {
    /// Enumeration-epoch verifier; cookies from a page are only valid
    /// together with its verifier.
    pub verifier: u64,
    pub entries: Vec<DirEntry>,
    pub eof: bool,
}

/// The storage contract the dispatcher operates against.
///
/// Implementations may block; the dispatcher runs them on the blocking
/// thread pool. Paths are jail-relative.
pub trait FileSystem: Send + Sync {
    /// Stat a file and translate its attributes.
    fn get_attr(&self, path: &str) -> FsResult<FileAttributes>;

    /// Apply the set fields of `attrs` in order: mode, ownership, size,
    /// times. Returns post-op attributes.
    fn set_attr(&self, path: &str, attrs: &SetAttrs) -> FsResult<FileAttributes>;

    /// Find `name` inside `dir`. `.` resolves to `dir` and `..` to its
    /// lexical parent (the root is its own parent). Returns the target's
    /// jail-relative path and attributes.
    fn lookup(&self, dir: &str, name: &str) -> FsResult<(String, FileAttributes)>;

    /// Check an rwx bitmask against the caller's credentials.
    fn access(&self, path: &str, mode: u32, creds: &Credentials) -> FsResult<()>;

    /// Read up to `count` bytes at `offset`. Returns the data and the eof
    /// flag. Reading at or past the end returns empty data with eof set.
    fn read(&self, path: &str, offset: u64, count: u32) -> FsResult<(Vec<u8>, bool)>;

    /// Write `data` at `offset`. Returns the byte count and the stability
    /// level actually used, which may exceed the request.
    fn write(
        &self,
        path: &str,
        offset: u64,
        data: &[u8],
        stability: Stability,
    ) -> FsResult<(u32, Stability)>;

    /// Create a regular file in `dir`. `guarded` makes an existing name an
    /// error; otherwise an existing file is truncated. Returns the new
    /// path and post-op attributes.
    fn create(
        &self,
        dir: &str,
        name: &str,
        attrs: &SetAttrs,
        guarded: bool,
    ) -> FsResult<(String, FileAttributes)>;

    /// Create a directory in `dir`; an existing name is an error.
    fn mkdir(&self, dir: &str, name: &str, attrs: &SetAttrs)
        -> FsResult<(String, FileAttributes)>;

    /// Unlink a non-directory.
    fn remove(&self, path: &str) -> FsResult<()>;

    /// Remove an empty directory.
    fn rmdir(&self, path: &str) -> FsResult<()>;

    /// Atomically rename; the destination parent must already exist.
    fn rename(&self, from: &str, to: &str) -> FsResult<()>;

    /// Enumerate a directory page. `cookie = 0` starts over; otherwise the
    /// page resumes after the entry carrying `cookie`, and `verifier` must
    /// match the current enumeration epoch. `with_attrs` fills per-entry
    /// attributes (the readdirplus variant).
    fn read_dir(
        &self,
        dir: &str,
        cookie: u64,
        verifier: u64,
        count: u32,
        with_attrs: bool,
    ) -> FsResult<ReadDirPage>;

    /// Filesystem usage for the export.
    fn stat_fs(&self) -> FsResult<FsStat>;

    /// Flush a file's data to stable storage.
    fn commit(&self, path: &str) -> FsResult<()>;

    /// Mint (or refresh) the handle for a path.
    fn path_to_handle(&self, path: &str) -> FsResult<Vec<u8>>;

    /// Resolve a handle back to a live path, walking the export for inodes
    /// the index has not seen. Unresolvable handles are stale.
    fn handle_to_path(&self, handle: &[u8]) -> FsResult<String>;
}
