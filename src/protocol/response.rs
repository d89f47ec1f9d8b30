//! Response types.

use serde::{Deserialize, Serialize};

use super::types::{DirEntry, FileAttributes, FsStat, Stability, Status};

/// Responses from the server.
///
/// Every failed operation yields `Error`; the other variants imply
/// `Status::Ok`. Mutating operations report post-operation attributes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum NfsResponse {
    /// A bare handle plus attributes (`GetRootHandle`).
    Handle {
        handle: Vec<u8>,
        attrs: FileAttributes,
    },

    /// Attributes only (`GetAttr`, `SetAttr`).
    Attr { attrs: FileAttributes },

    /// A named object with its handle (`Lookup`, `Create`, `Mkdir`).
    /// `dir_attrs` primes the client's cache for the parent directory.
    Entry {
        handle: Vec<u8>,
        attrs: FileAttributes,
        dir_attrs: Option<FileAttributes>,
    },

    /// Data read from a file.
    Read {
        attrs: FileAttributes,
        data: Vec<u8>,
        eof: bool,
    },

    /// Write acknowledgement. `stability` is what the server actually did,
    /// which may exceed the request. `verifier` is constant for the server's
    /// lifetime so clients can detect a restart.
    Write {
        attrs: FileAttributes,
        count: u32,
        stability: Stability,
        verifier: u64,
    },

    /// One page of directory entries.
    ReadDir {
        verifier: u64,
        entries: Vec<DirEntry>,
        eof: bool,
    },

    /// Filesystem usage.
    StatFs { stat: FsStat },

    /// Commit acknowledgement with the server's write verifier.
    Commit { verifier: u64, attrs: FileAttributes },

    /// Success with nothing else to say (`Access`, `Remove`, `Rmdir`,
    /// `Rename`). `dir_attrs` carries post-op parent attributes when the
    /// operation had a parent directory.
    Done { dir_attrs: Option<FileAttributes> },

    /// Any failure.
    Error { status: Status },
}

impl NfsResponse {
    pub fn error(status: Status) -> Self {
        NfsResponse::Error { status }
    }

    pub fn status(&self) -> Status {
        match self {
            NfsResponse::Error { status } => *status,
            _ => Status::Ok,
        }
    }

    pub fn is_ok(&self) -> bool {
        !matches!(self, NfsResponse::Error { .. })
    }

    /// File attributes, for the variants that carry them.
    pub fn attrs(&self) -> Option<&FileAttributes> {
        match self {
            NfsResponse::Handle { attrs, .. }
            | NfsResponse::Attr { attrs }
            | NfsResponse::Entry { attrs, .. }
            | NfsResponse::Read { attrs, .. }
            | NfsResponse::Write { attrs, .. }
            | NfsResponse::Commit { attrs, .. } => Some(attrs),
            _ => None,
        }
    }

    /// The handle, for the variants that mint one.
    pub fn handle(&self) -> Option<&[u8]> {
        match self {
            NfsResponse::Handle { handle, .. } | NfsResponse::Entry { handle, .. } => {
                Some(handle)
            }
            _ => None,
        }
    }
}
