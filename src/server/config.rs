//! Server configuration.

use std::time::Duration;

/// Configuration for the request dispatcher and the pipelined server.
///
/// The first group is the service policy (admission, payload caps,
/// credential squashing); the second tunes the connection I/O path.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP address to listen on (e.g. `0.0.0.0:2049`).
    pub listen_address: String,

    /// Maximum requests in flight across all connections.
    pub max_concurrent: usize,

    /// Maximum bytes returned by one Read.
    pub max_read: u32,

    /// Maximum bytes accepted by one Write.
    pub max_write: u32,

    /// Wall-time budget per request, including admission wait.
    pub request_timeout: Duration,

    /// Map uid 0 to the anonymous identity.
    pub enable_root_squash: bool,

    /// Anonymous user ID for squashed credentials.
    pub anon_uid: u32,

    /// Anonymous group ID for squashed credentials.
    pub anon_gid: u32,

    /// Capacity of the per-connection response channel.
    pub response_channel_size: usize,

    /// Number of responses to batch before flushing.
    pub write_batch_size: usize,

    /// Size of the per-connection write buffer in bytes.
    pub write_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:2049".to_string(),
            max_concurrent: 100,
            max_read: 1024 * 1024,
            max_write: 1024 * 1024,
            request_timeout: Duration::from_secs(30),
            enable_root_squash: true,
            anon_uid: 65534, // nobody
            anon_gid: 65534, // nogroup
            response_channel_size: 4096,
            write_batch_size: 64,
            write_buffer_size: 256 * 1024,
        }
    }
}

impl ServerConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the listen address.
    pub fn listen_address(mut self, addr: impl Into<String>) -> Self {
        self.listen_address = addr.into();
        self
    }

    /// Set the maximum concurrent requests.
    pub fn max_concurrent(mut self, count: usize) -> Self {
        self.max_concurrent = count.max(1);
        self
    }

    /// Set the read payload cap.
    pub fn max_read(mut self, bytes: u32) -> Self {
        self.max_read = bytes;
        self
    }

    /// Set the write payload cap.
    pub fn max_write(mut self, bytes: u32) -> Self {
        self.max_write = bytes;
        self
    }

    /// Set the per-request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Enable or disable root squashing.
    pub fn root_squash(mut self, enabled: bool) -> Self {
        self.enable_root_squash = enabled;
        self
    }

    /// Set the anonymous identity used when squashing.
    pub fn anonymous_identity(mut self, uid: u32, gid: u32) -> Self {
        self.anon_uid = uid;
        self.anon_gid = gid;
        self
    }
}
