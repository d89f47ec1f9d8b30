//! Idempotency reply cache.
//!
//! Memoises successful `Write` and exclusive `Create` replies so a client
//! retransmission within the TTL gets the original answer back without
//! re-executing the operation. Keys are deterministic hashes of the request
//! (see the dispatcher); failures are never cached.
//!
//! A single mutex guards the map. Each insert schedules its own deferred
//! deletion; `get` also checks expiry so entries whose cleanup task has not
//! fired yet (or could not be scheduled) never serve stale data.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::protocol::NfsResponse;

/// TTL for memoised write replies.
pub const WRITE_REPLY_TTL: Duration = Duration::from_secs(5 * 60);

/// TTL for memoised exclusive-create replies.
pub const CREATE_REPLY_TTL: Duration = Duration::from_secs(2 * 60);

struct CacheEntry {
    response: NfsResponse,
    expires_at: Instant,
}

/// Time-bounded reply memo, cheap to clone and share.
#[derive(Clone, Default)]
pub struct ReplyCache {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

impl ReplyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a memoised reply; expired entries are dropped on access.
    pub fn get(&self, key: &str) -> Option<NfsResponse> {
        let mut entries = self.entries.lock().expect("reply cache poisoned");
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.response.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a reply and schedule its deletion after `ttl`.
    pub fn put(&self, key: String, response: NfsResponse, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        {
            let mut entries = self.entries.lock().expect("reply cache poisoned");
            entries.insert(
                key.clone(),
                CacheEntry {
                    response,
                    expires_at,
                },
            );
        }

        // Deferred per-entry cleanup; expiry checking in get() covers the
        // window before the task fires and contexts with no runtime.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let entries = Arc::clone(&self.entries);
            handle.spawn(async move {
                tokio::time::sleep(ttl).await;
                let mut entries = entries.lock().expect("reply cache poisoned");
                if let Some(entry) = entries.get(&key) {
                    if entry.expires_at <= Instant::now() {
                        entries.remove(&key);
                        debug!(target: "nfs-pipe::cache", key = %key, "reply expired");
                    }
                }
            });
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("reply cache poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
