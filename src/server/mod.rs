//! Server components.
//!
//! This module provides:
//!
//! - `Dispatcher`: the per-request pipeline (admission, squashing, handle
//!   validation, access checks, idempotency, status assembly)
//! - `AsyncServer`: pipelined TCP front end
//! - `ReplyCache`: idempotency memo for Write and exclusive Create
//! - `OpStatsCollector`: per-operation status accounting
//! - `ServerConfig`: service policy and I/O tuning
//!
//! # Example
//!
//! ```rust,ignore
//! use nfs_pipe::fs::LocalFs;
//! use nfs_pipe::server::{AsyncServer, ServerConfig};
//!
//! let fs = LocalFs::new("/srv/export")?;
//! let config = ServerConfig::default().listen_address("0.0.0.0:2049");
//! AsyncServer::with_config(fs, config).run_blocking()?;
//! ```

mod cache;
mod config;
mod dispatcher;
mod pipelined;
mod stats;

pub use cache::{ReplyCache, CREATE_REPLY_TTL, WRITE_REPLY_TTL};
pub use config::ServerConfig;
pub use dispatcher::Dispatcher;
pub use pipelined::AsyncServer;
pub use stats::{LatencyStats, OpStatsCollector, OperationStats};
