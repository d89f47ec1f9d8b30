use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use nfs_pipe::fs::LocalFs;
use nfs_pipe::server::{AsyncServer, ServerConfig};
use tracing_subscriber::EnvFilter;

/// Serve a host directory over the nfs-pipe protocol.
#[derive(Parser, Debug)]
#[command(name = "nfs-pipe", version, about)]
struct Args {
    /// Directory to export
    #[arg(long)]
    export_root: String,

    /// TCP address to listen on
    #[arg(long, default_value = "0.0.0.0:2049")]
    listen: String,

    /// Maximum requests in flight
    #[arg(long, default_value_t = 100)]
    max_concurrent: usize,

    /// Per-read payload cap in bytes
    #[arg(long, default_value_t = 1024 * 1024)]
    max_read: u32,

    /// Per-write payload cap in bytes
    #[arg(long, default_value_t = 1024 * 1024)]
    max_write: u32,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    request_timeout_secs: u64,

    /// Keep uid 0 instead of mapping it to the anonymous identity
    #[arg(long)]
    no_root_squash: bool,

    /// Anonymous user ID for squashed credentials
    #[arg(long, default_value_t = 65534)]
    anon_uid: u32,

    /// Anonymous group ID for squashed credentials
    #[arg(long, default_value_t = 65534)]
    anon_gid: u32,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_target(false)
        .init();

    let args = Args::parse();

    let config = ServerConfig::default()
        .listen_address(args.listen)
        .max_concurrent(args.max_concurrent)
        .max_read(args.max_read)
        .max_write(args.max_write)
        .request_timeout(Duration::from_secs(args.request_timeout_secs))
        .root_squash(!args.no_root_squash)
        .anonymous_identity(args.anon_uid, args.anon_gid);

    let fs = LocalFs::new(&args.export_root)
        .with_context(|| format!("failed to open export root {}", args.export_root))?;

    AsyncServer::with_config(fs, config).run_blocking()
}
