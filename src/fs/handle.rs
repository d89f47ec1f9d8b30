//! File handle codec.
//!
//! A handle is a 16-byte big-endian triple:
//!
//! ```text
//! +--------+----------+------------+
//! | fs_id  |  inode   | generation |
//! | 4 bytes| 8 bytes  |  4 bytes   |
//! +--------+----------+------------+
//! ```
//!
//! `fs_id` is a deterministic hash of the export's absolute root path, so
//! two servers over the same root mint identical handles. `generation`
//! tags an inode's current incarnation; 0 is reserved-unused, so 1 is the
//! first live value.

use std::path::Path;

use sha2::{Digest, Sha256};

use super::error::{FsError, FsResult};

/// Serialized handle size in bytes.
pub const HANDLE_SIZE: usize = 16;

/// Structured form of a file handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHandle {
    pub fs_id: u32,
    pub inode: u64,
    pub generation: u32,
}

impl FileHandle {
    pub fn new(fs_id: u32, inode: u64, generation: u32) -> Self {
        Self {
            fs_id,
            inode,
            generation,
        }
    }

    /// Serialize to the 16-byte wire form.
    pub fn serialize(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(HANDLE_SIZE);
        data.extend_from_slice(&self.fs_id.to_be_bytes());
        data.extend_from_slice(&self.inode.to_be_bytes());
        data.extend_from_slice(&self.generation.to_be_bytes());
        data
    }

    /// Parse from wire bytes.
    ///
    /// Short input is `InvalidHandle`. Longer input is accepted and the
    /// first 16 bytes parsed, leaving room for a MAC suffix later.
    pub fn parse(data: &[u8]) -> FsResult<Self> {
        if data.len() < HANDLE_SIZE {
            return Err(FsError::InvalidHandle);
        }

        Ok(Self {
            fs_id: u32::from_be_bytes(data[0..4].try_into().expect("sliced to 4 bytes")),
            inode: u64::from_be_bytes(data[4..12].try_into().expect("sliced to 8 bytes")),
            generation: u32::from_be_bytes(data[12..16].try_into().expect("sliced to 4 bytes")),
        })
    }
}

impl std::fmt::Display for FileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "FileHandle{{fs:{}, inode:{}, gen:{}}}",
            self.fs_id, self.inode, self.generation
        )
    }
}

/// Derive the export identifier from the absolute root path.
pub fn export_fs_id(root: &Path) -> u32 {
    let digest = Sha256::digest(root.as_os_str().as_encoded_bytes());
    u32::from_be_bytes(digest[0..4].try_into().expect("digest is 32 bytes"))
}

/// Handle bytes as lowercase hex, for cache keys and logs.
pub fn handle_hex(handle: &[u8]) -> String {
    handle.iter().fold(
        String::with_capacity(handle.len() * 2),
        |mut out, b| {
            use std::fmt::Write;
            let _ = write!(out, "{b:02x}");
            out
        },
    )
}
