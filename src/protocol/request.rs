//! Request types.

use serde::{Deserialize, Serialize};

use super::types::{CreateMode, SetAttrs, Stability};

/// Requests from clients to the server.
///
/// File handles are opaque byte strings obtained from `GetRootHandle`,
/// `Lookup`, `Create`, or `Mkdir`. Caller credentials travel in the wire
/// envelope, not in the operation itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum NfsRequest {
    /// Fetch the export root's handle so a client can bootstrap.
    GetRootHandle,

    /// Get file attributes.
    GetAttr { handle: Vec<u8> },

    /// Apply the set fields of `attrs`; unset fields are preserved.
    SetAttr { handle: Vec<u8>, attrs: SetAttrs },

    /// Look up a directory entry by name. `.` and `..` are honored.
    Lookup { dir: Vec<u8>, name: String },

    /// Check access against an rwx bitmask (read=4, write=2, execute=1).
    Access { handle: Vec<u8>, mode: u32 },

    /// Read up to `count` bytes at `offset`.
    Read {
        handle: Vec<u8>,
        offset: u64,
        count: u32,
    },

    /// Write `data` at `offset` with the requested durability.
    Write {
        handle: Vec<u8>,
        offset: u64,
        data: Vec<u8>,
        stability: Stability,
    },

    /// Create a regular file. `verifier` only matters for
    /// `CreateMode::Exclusive`.
    Create {
        dir: Vec<u8>,
        name: String,
        attrs: SetAttrs,
        mode: CreateMode,
        verifier: u64,
    },

    /// Create a directory.
    Mkdir {
        dir: Vec<u8>,
        name: String,
        attrs: SetAttrs,
    },

    /// Remove a non-directory entry.
    Remove { dir: Vec<u8>, name: String },

    /// Remove an empty directory.
    Rmdir { dir: Vec<u8>, name: String },

    /// Atomically rename an entry, possibly across directories.
    Rename {
        from_dir: Vec<u8>,
        from_name: String,
        to_dir: Vec<u8>,
        to_name: String,
    },

    /// Page through a directory. `cookie = 0` starts from the beginning;
    /// otherwise enumeration resumes after the entry that carried `cookie`,
    /// and `verifier` must match the value returned with that page.
    ReadDir {
        dir: Vec<u8>,
        cookie: u64,
        verifier: u64,
        count: u32,
    },

    /// `ReadDir` with per-entry attributes.
    ReadDirPlus {
        dir: Vec<u8>,
        cookie: u64,
        verifier: u64,
        count: u32,
    },

    /// Filesystem usage for the export.
    StatFs { handle: Vec<u8> },

    /// Flush previously unstable writes to stable storage.
    Commit {
        handle: Vec<u8>,
        offset: u64,
        count: u32,
    },
}

impl NfsRequest {
    /// Operation name for logging and request IDs.
    pub fn op_name(&self) -> &'static str {
        match self {
            NfsRequest::GetRootHandle => "getroothandle",
            NfsRequest::GetAttr { .. } => "getattr",
            NfsRequest::SetAttr { .. } => "setattr",
            NfsRequest::Lookup { .. } => "lookup",
            NfsRequest::Access { .. } => "access",
            NfsRequest::Read { .. } => "read",
            NfsRequest::Write { .. } => "write",
            NfsRequest::Create { .. } => "create",
            NfsRequest::Mkdir { .. } => "mkdir",
            NfsRequest::Remove { .. } => "remove",
            NfsRequest::Rmdir { .. } => "rmdir",
            NfsRequest::Rename { .. } => "rename",
            NfsRequest::ReadDir { .. } => "readdir",
            NfsRequest::ReadDirPlus { .. } => "readdirplus",
            NfsRequest::StatFs { .. } => "statfs",
            NfsRequest::Commit { .. } => "commit",
        }
    }

    /// Whether this operation can modify the filesystem.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            NfsRequest::SetAttr { .. }
                | NfsRequest::Write { .. }
                | NfsRequest::Create { .. }
                | NfsRequest::Mkdir { .. }
                | NfsRequest::Remove { .. }
                | NfsRequest::Rmdir { .. }
                | NfsRequest::Rename { .. }
        )
    }
}
