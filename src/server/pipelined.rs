//! Async pipelined server.
//!
//! # Architecture
//!
//! - One task per connection, many requests in flight (pipelining)
//! - Read frames in a loop, spawn a task for each request
//! - Write responses as they complete (out-of-order OK due to unique IDs)
//! - Filesystem operations run via the dispatcher on the blocking pool
//! - Response batching through a buffered writer for reduced syscall count

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::config::ServerConfig;
use super::dispatcher::Dispatcher;
use crate::fs::FileSystem;
use crate::protocol::{WireRequest, WireResponse, MAX_MESSAGE_SIZE};

/// Pipelined request/response server over TCP.
pub struct AsyncServer<F> {
    dispatcher: Arc<Dispatcher<F>>,
    config: ServerConfig,
}

impl<F: FileSystem + 'static> AsyncServer<F> {
    /// Create a new server with default configuration.
    pub fn new(fs: F) -> Self {
        Self::with_config(fs, ServerConfig::default())
    }

    /// Create a new server with custom configuration.
    pub fn with_config(fs: F, config: ServerConfig) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::new(fs, config.clone())),
            config,
        }
    }

    /// The dispatcher driving this server, for in-process clients and tests.
    pub fn dispatcher(&self) -> Arc<Dispatcher<F>> {
        Arc::clone(&self.dispatcher)
    }

    /// Serve on the configured TCP address.
    ///
    /// This function blocks forever, accepting and handling connections.
    pub async fn serve(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.config.listen_address).await?;
        self.serve_on(listener).await
    }

    /// Serve on an already-bound listener (lets tests bind port 0).
    pub async fn serve_on(self, listener: TcpListener) -> anyhow::Result<()> {
        info!(
            target: "nfs-pipe::server",
            addr = %listener.local_addr()?,
            "listening"
        );

        // Periodic status accounting dump for operators.
        let stats = self.dispatcher.stats().clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            interval.tick().await;
            loop {
                interval.tick().await;
                if !stats.is_empty() {
                    stats.log_summary();
                }
            }
        });

        let mut client_id = 0u32;

        loop {
            let (stream, peer) = listener.accept().await?;
            let dispatcher = Arc::clone(&self.dispatcher);
            let config = self.config.clone();
            let id = client_id;
            client_id += 1;

            info!(target: "nfs-pipe::server", client_id = id, peer = %peer, "client connected");

            tokio::spawn(async move {
                if let Err(e) = handle_client(dispatcher, stream, config).await {
                    error!(target: "nfs-pipe::server", client_id = id, error = %e, "client error");
                }
                debug!(target: "nfs-pipe::server", client_id = id, "client disconnected");
            });
        }
    }

    /// Run the server on a fresh runtime whose blocking pool is sized to
    /// the admission limit, so host I/O cannot starve the reactor.
    pub fn run_blocking(self) -> anyhow::Result<()> {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .max_blocking_threads(self.config.max_concurrent.max(8))
            .build()?
            .block_on(self.serve())
    }
}

/// Handle a single client connection with pipelining.
async fn handle_client<F: FileSystem + 'static>(
    dispatcher: Arc<Dispatcher<F>>,
    stream: tokio::net::TcpStream,
    config: ServerConfig,
) -> anyhow::Result<()> {
    let (read_half, write_half) = stream.into_split();

    // Channel for completed responses.
    let (tx, rx) = mpsc::channel::<WireResponse>(config.response_channel_size);

    // Spawn writer task
    let writer_config = config.clone();
    let writer_handle = tokio::spawn(response_writer(write_half, rx, writer_config));

    // Run reader in current task
    let reader_result = request_reader(read_half, dispatcher, tx).await;

    // Wait for writer to finish
    let _ = writer_handle.await;

    reader_result
}

/// Read requests and spawn a dispatcher task for each.
async fn request_reader<F: FileSystem + 'static>(
    mut read_half: tokio::net::tcp::OwnedReadHalf,
    dispatcher: Arc<Dispatcher<F>>,
    tx: mpsc::Sender<WireResponse>,
) -> anyhow::Result<()> {
    let mut len_buf = [0u8; 4];

    loop {
        // Read request length
        match read_half.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_MESSAGE_SIZE {
            warn!(target: "nfs-pipe::server", len, max = MAX_MESSAGE_SIZE, "frame too large");
            return Err(anyhow::anyhow!("frame too large: {} bytes", len));
        }

        // Read request body
        let mut req_buf = vec![0u8; len];
        read_half.read_exact(&mut req_buf).await?;

        // Deserialize; a malformed frame is dropped, not fatal.
        let wire_req: WireRequest = match bincode::deserialize(&req_buf) {
            Ok(r) => r,
            Err(e) => {
                warn!(target: "nfs-pipe::server", error = %e, "deserialize error");
                continue;
            }
        };

        let unique = wire_req.unique;
        let dispatcher = Arc::clone(&dispatcher);
        let tx = tx.clone();

        tokio::spawn(async move {
            let response = dispatcher
                .handle(wire_req.credentials, wire_req.request)
                .await;
            let _ = tx.send(WireResponse::new(unique, response)).await;
        });
    }

    Ok(())
}

/// Write responses with adaptive batching.
async fn response_writer(
    write_half: tokio::net::tcp::OwnedWriteHalf,
    mut rx: mpsc::Receiver<WireResponse>,
    config: ServerConfig,
) {
    let mut writer = BufWriter::with_capacity(config.write_buffer_size, write_half);
    let mut batch_count = 0usize;

    while let Some(wire_resp) = rx.recv().await {
        let resp_buf = match bincode::serialize(&wire_resp) {
            Ok(b) => b,
            Err(e) => {
                error!(
                    target: "nfs-pipe::server",
                    unique = wire_resp.unique,
                    error = %e,
                    "response serialization failed"
                );
                continue;
            }
        };

        let resp_len = (resp_buf.len() as u32).to_be_bytes();
        if writer.write_all(&resp_len).await.is_err() {
            break;
        }
        if writer.write_all(&resp_buf).await.is_err() {
            break;
        }

        batch_count += 1;

        // Flush when the batch is full or nothing else is waiting.
        if batch_count >= config.write_batch_size || rx.is_empty() {
            if writer.flush().await.is_err() {
                break;
            }
            batch_count = 0;
        }
    }

    // Final flush
    let _ = writer.flush().await;
}
