//! Wire protocol for the filesystem service.
//!
//! This module provides the serialization format and types for
//! communication between clients and the server.
//!
//! # Architecture
//!
//! The protocol is unary request/response over a single stream. Each request
//! carries a client-chosen `unique` ID; the server may answer out of order,
//! so clients can keep many requests in flight.
//!
//! # Frame Format
//!
//! ```text
//! +----------+---------+
//! |  length  | payload |
//! | (4 bytes)| (N bytes)|
//! +----------+---------+
//! ```
//!
//! Messages are length-prefixed with a big-endian u32, followed by
//! a bincode-serialized `WireRequest` or `WireResponse`.

mod request;
mod response;
mod types;
mod wire;

pub use request::NfsRequest;
pub use response::NfsResponse;
pub use types::{
    CreateMode, Credentials, DirEntry, FileAttributes, FileTime, FileType, FsStat, SetAttrs,
    Stability, Status,
};
pub use wire::{
    now_nanos, read_message, read_message_async, write_message, write_message_async, WireRequest,
    WireResponse, MAX_MESSAGE_SIZE,
};

/// Attribute record filled with plausible values, for protocol tests.
#[cfg(test)]
pub(crate) fn test_attrs() -> FileAttributes {
    FileAttributes {
        file_type: FileType::Regular,
        mode: 0o644,
        nlink: 1,
        uid: 1000,
        gid: 1000,
        size: 5,
        used: 4096,
        rdev: 0,
        file_id: 42,
        atime: FileTime::new(1_700_000_000, 0),
        mtime: FileTime::new(1_700_000_000, 0),
        ctime: FileTime::new(1_700_000_000, 0),
        block_size: 4096,
        blocks: 8,
    }
}
