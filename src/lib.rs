//! NFS-style network filesystem service over a socket protocol.
//!
//! `nfs-pipe` serves one host directory to remote clients with NFSv3
//! semantics over a unary request/response channel:
//!
//! - **Protocol**: length-prefixed bincode frames carrying typed
//!   request/response enums with pipelining support
//! - **Filesystem**: a jailed host-backed core with 16-byte file handles,
//!   an inode index with dynamic walk recovery, and a closed error taxonomy
//! - **Server**: admission-limited async dispatcher with root squashing and
//!   an idempotency cache for writes and exclusive creates
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use nfs_pipe::fs::LocalFs;
//! use nfs_pipe::server::{AsyncServer, ServerConfig};
//!
//! let fs = LocalFs::new("/srv/export")?;
//! let server = AsyncServer::with_config(fs, ServerConfig::default());
//! server.serve().await?;
//! ```

pub mod fs;
pub mod protocol;
pub mod server;

// Re-export the common protocol types at crate root for convenience
pub use protocol::{
    read_message, read_message_async, write_message, write_message_async, Credentials, DirEntry,
    FileAttributes, NfsRequest, NfsResponse, Status, WireRequest, WireResponse, MAX_MESSAGE_SIZE,
};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::fs::{FileSystem, LocalFs};
    pub use crate::protocol::{
        CreateMode, Credentials, DirEntry, FileAttributes, NfsRequest, NfsResponse, SetAttrs,
        Stability, Status, WireRequest, WireResponse,
    };
    pub use crate::server::{AsyncServer, Dispatcher, ServerConfig};
}
