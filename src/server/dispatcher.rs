//! Request dispatcher.
//!
//! Every request runs the same pipeline: admission against a bounded
//! semaphore, credential squashing, handle validation, per-operation access
//! checks, the filesystem operation itself on the blocking pool, idempotency
//! memoisation for Write and exclusive Create, and status assembly. Internal
//! failures never escape as transport errors; everything becomes a status.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use super::cache::{ReplyCache, CREATE_REPLY_TTL, WRITE_REPLY_TTL};
use super::config::ServerConfig;
use super::stats::OpStatsCollector;
use crate::fs::{
    handle_hex, join_child, validate_component, FileSystem, FsError, FsResult, ACCESS_EXECUTE,
    ACCESS_READ, ACCESS_WRITE,
};
use crate::protocol::{
    now_nanos, CreateMode, Credentials, NfsRequest, NfsResponse, SetAttrs, Status,
};

/// Entries returned by ReadDir when the client passes `count = 0`.
const READDIR_DEFAULT_COUNT: u32 = 1000;

/// Hard ceiling on entries per ReadDir page.
const READDIR_MAX_COUNT: u32 = 10_000;

/// Shared per-operation context handed to the blocking executor.
struct OpContext {
    max_read: u32,
    max_write: u32,
    write_verifier: u64,
}

/// Drives requests through admission, policy, and the filesystem core.
pub struct Dispatcher<F> {
    fs: Arc<F>,
    config: ServerConfig,
    admission: Arc<Semaphore>,
    cache: ReplyCache,
    stats: OpStatsCollector,
    /// Constant for the server's lifetime; lets clients detect a restart
    /// between an unstable write and its commit.
    write_verifier: u64,
}

impl<F: FileSystem + 'static> Dispatcher<F> {
    pub fn new(fs: F, config: ServerConfig) -> Self {
        let admission = Arc::new(Semaphore::new(config.max_concurrent));
        Self {
            fs: Arc::new(fs),
            config,
            admission,
            cache: ReplyCache::new(),
            stats: OpStatsCollector::new(),
            write_verifier: now_nanos(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Per-operation status accounting.
    pub fn stats(&self) -> &OpStatsCollector {
        &self.stats
    }

    /// The server's boot verifier, as returned with Write and Commit.
    pub fn write_verifier(&self) -> u64 {
        self.write_verifier
    }

    /// Process one request to completion. Always yields a response; the
    /// request timeout and any internal failure map to a status.
    pub async fn handle(&self, credentials: Credentials, request: NfsRequest) -> NfsResponse {
        let op = request.op_name();
        let request_id = format!("{}-{}", op, now_nanos());
        let started = Instant::now();

        debug!(
            target: "nfs-pipe::server",
            request_id = %request_id,
            uid = credentials.uid,
            gid = credentials.gid,
            "request"
        );

        let response = match timeout(
            self.config.request_timeout,
            self.admit_and_execute(credentials, request),
        )
        .await
        {
            Ok(response) => response,
            Err(_) => {
                warn!(
                    target: "nfs-pipe::server",
                    request_id = %request_id,
                    timeout_ms = self.config.request_timeout.as_millis() as u64,
                    "request timed out"
                );
                NfsResponse::error(Status::ServerFault)
            }
        };

        let status = response.status();
        let elapsed = started.elapsed();
        self.stats.record(op, status, elapsed.as_nanos() as u64);
        debug!(
            target: "nfs-pipe::server",
            request_id = %request_id,
            status = %status,
            duration_us = elapsed.as_micros() as u64,
            "response"
        );

        response
    }

    async fn admit_and_execute(
        &self,
        credentials: Credentials,
        request: NfsRequest,
    ) -> NfsResponse {
        // Admission: one slot per request, held until the host call is done.
        let permit = match Arc::clone(&self.admission).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return NfsResponse::error(Status::ServerFault),
        };

        let credentials = self.squash(credentials);
        let fs = Arc::clone(&self.fs);
        let cache = self.cache.clone();
        let ctx = OpContext {
            max_read: self.config.max_read,
            max_write: self.config.max_write,
            write_verifier: self.write_verifier,
        };

        // The whole operation runs as one blocking unit. If the request
        // timeout fires, this task still runs to completion and the slot is
        // released then; only the result is discarded.
        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            execute(fs.as_ref(), &cache, &credentials, request, &ctx)
                .unwrap_or_else(|err| NfsResponse::error(err.status()))
        })
        .await;

        match result {
            Ok(response) => response,
            Err(join_err) => {
                error!(target: "nfs-pipe::server", error = %join_err, "operation task failed");
                NfsResponse::error(Status::ServerFault)
            }
        }
    }

    /// Root squash: replace uid 0 with the anonymous identity, preserving
    /// supplementary groups.
    fn squash(&self, credentials: Credentials) -> Credentials {
        if self.config.enable_root_squash && credentials.uid == 0 {
            Credentials {
                uid: self.config.anon_uid,
                gid: self.config.anon_gid,
                groups: credentials.groups,
            }
        } else {
            credentials
        }
    }
}

/// Execute one operation against the filesystem core. Runs on the blocking
/// pool; every early exit is an `FsError` that the caller maps to a status.
fn execute<F: FileSystem>(
    fs: &F,
    cache: &ReplyCache,
    creds: &Credentials,
    request: NfsRequest,
    ctx: &OpContext,
) -> FsResult<NfsResponse> {
    match request {
        NfsRequest::GetRootHandle => {
            let handle = fs.path_to_handle("/")?;
            let attrs = fs.get_attr("/")?;
            Ok(NfsResponse::Handle { handle, attrs })
        }

        NfsRequest::GetAttr { handle } => {
            let path = fs.handle_to_path(&handle)?;
            fs.access(&path, ACCESS_READ, creds)?;
            let attrs = fs.get_attr(&path)?;
            Ok(NfsResponse::Attr { attrs })
        }

        NfsRequest::SetAttr { handle, attrs } => {
            let path = fs.handle_to_path(&handle)?;
            check_set_attr_policy(fs, &path, &attrs, creds)?;
            let attrs = fs.set_attr(&path, &attrs)?;
            Ok(NfsResponse::Attr { attrs })
        }

        NfsRequest::Lookup { dir, name } => {
            let dir_path = fs.handle_to_path(&dir)?;
            fs.access(&dir_path, ACCESS_READ | ACCESS_EXECUTE, creds)?;

            let (target, attrs) = fs.lookup(&dir_path, &name)?;
            let handle = fs.path_to_handle(&target)?;
            let dir_attrs = if target != dir_path {
                fs.get_attr(&dir_path).ok()
            } else {
                None
            };

            Ok(NfsResponse::Entry {
                handle,
                attrs,
                dir_attrs,
            })
        }

        NfsRequest::Access { handle, mode } => {
            let path = fs.handle_to_path(&handle)?;
            fs.access(&path, mode & 0o7, creds)?;
            Ok(NfsResponse::Done { dir_attrs: None })
        }

        NfsRequest::Read {
            handle,
            offset,
            count,
        } => {
            let path = fs.handle_to_path(&handle)?;
            fs.access(&path, ACCESS_READ, creds)?;

            let count = count.min(ctx.max_read);
            let (data, eof) = fs.read(&path, offset, count)?;
            let attrs = fs.get_attr(&path)?;

            Ok(NfsResponse::Read { attrs, data, eof })
        }

        NfsRequest::Write {
            handle,
            offset,
            data,
            stability,
        } => {
            let path = fs.handle_to_path(&handle)?;
            fs.access(&path, ACCESS_WRITE, creds)?;

            if data.len() > ctx.max_write as usize {
                return Err(FsError::FileTooLarge);
            }

            let key = format!(
                "write-{}-{}-{}",
                handle_hex(&handle),
                offset,
                crc32fast::hash(&data)
            );
            if let Some(cached) = cache.get(&key) {
                debug!(target: "nfs-pipe::server", key = %key, "write replay served from cache");
                return Ok(cached);
            }

            let (count, stability) = fs.write(&path, offset, &data, stability)?;
            let attrs = fs.get_attr(&path)?;

            let response = NfsResponse::Write {
                attrs,
                count,
                stability,
                verifier: ctx.write_verifier,
            };
            cache.put(key, response.clone(), WRITE_REPLY_TTL);
            Ok(response)
        }

        NfsRequest::Create {
            dir,
            name,
            attrs,
            mode,
            verifier,
        } => {
            let dir_path = fs.handle_to_path(&dir)?;
            fs.access(&dir_path, ACCESS_WRITE, creds)?;

            let exclusive_key = match mode {
                CreateMode::Exclusive => {
                    let key = format!("create-{}-{}-{}", handle_hex(&dir), name, verifier);
                    if let Some(cached) = cache.get(&key) {
                        debug!(target: "nfs-pipe::server", key = %key, "exclusive create replay served from cache");
                        return Ok(cached);
                    }
                    Some(key)
                }
                _ => None,
            };

            let guarded = !matches!(mode, CreateMode::Unchecked);
            let (target, attrs) = fs.create(&dir_path, &name, &attrs, guarded)?;
            let handle = fs.path_to_handle(&target)?;
            let dir_attrs = fs.get_attr(&dir_path).ok();

            let response = NfsResponse::Entry {
                handle,
                attrs,
                dir_attrs,
            };
            if let Some(key) = exclusive_key {
                cache.put(key, response.clone(), CREATE_REPLY_TTL);
            }
            Ok(response)
        }

        NfsRequest::Mkdir { dir, name, attrs } => {
            let dir_path = fs.handle_to_path(&dir)?;
            fs.access(&dir_path, ACCESS_WRITE, creds)?;

            let (target, attrs) = fs.mkdir(&dir_path, &name, &attrs)?;
            let handle = fs.path_to_handle(&target)?;
            let dir_attrs = fs.get_attr(&dir_path).ok();

            Ok(NfsResponse::Entry {
                handle,
                attrs,
                dir_attrs,
            })
        }

        NfsRequest::Remove { dir, name } => {
            let dir_path = fs.handle_to_path(&dir)?;
            fs.access(&dir_path, ACCESS_WRITE, creds)?;
            validate_component(&name)?;

            let (target, _) = fs.lookup(&dir_path, &name)?;
            fs.remove(&target)?;

            Ok(NfsResponse::Done {
                dir_attrs: fs.get_attr(&dir_path).ok(),
            })
        }

        NfsRequest::Rmdir { dir, name } => {
            let dir_path = fs.handle_to_path(&dir)?;
            fs.access(&dir_path, ACCESS_WRITE, creds)?;
            validate_component(&name)?;

            let (target, _) = fs.lookup(&dir_path, &name)?;
            fs.rmdir(&target)?;

            Ok(NfsResponse::Done {
                dir_attrs: fs.get_attr(&dir_path).ok(),
            })
        }

        NfsRequest::Rename {
            from_dir,
            from_name,
            to_dir,
            to_name,
        } => {
            let from_dir_path = fs.handle_to_path(&from_dir)?;
            let to_dir_path = fs.handle_to_path(&to_dir)?;
            fs.access(&from_dir_path, ACCESS_WRITE, creds)?;
            fs.access(&to_dir_path, ACCESS_WRITE, creds)?;
            validate_component(&from_name)?;
            validate_component(&to_name)?;

            let (source, _) = fs.lookup(&from_dir_path, &from_name)?;
            let destination = join_child(&to_dir_path, &to_name);
            fs.rename(&source, &destination)?;

            Ok(NfsResponse::Done {
                dir_attrs: fs.get_attr(&to_dir_path).ok(),
            })
        }

        NfsRequest::ReadDir {
            dir,
            cookie,
            verifier,
            count,
        } => read_dir_page(fs, creds, &dir, cookie, verifier, count, false),

        NfsRequest::ReadDirPlus {
            dir,
            cookie,
            verifier,
            count,
        } => read_dir_page(fs, creds, &dir, cookie, verifier, count, true),

        NfsRequest::StatFs { handle } => {
            let path = fs.handle_to_path(&handle)?;
            fs.access(&path, ACCESS_READ, creds)?;
            let stat = fs.stat_fs()?;
            Ok(NfsResponse::StatFs { stat })
        }

        NfsRequest::Commit {
            handle,
            offset: _,
            count: _,
        } => {
            let path = fs.handle_to_path(&handle)?;
            fs.commit(&path)?;
            let attrs = fs.get_attr(&path)?;
            Ok(NfsResponse::Commit {
                verifier: ctx.write_verifier,
                attrs,
            })
        }
    }
}

fn read_dir_page<F: FileSystem>(
    fs: &F,
    creds: &Credentials,
    dir: &[u8],
    cookie: u64,
    verifier: u64,
    count: u32,
    with_attrs: bool,
) -> FsResult<NfsResponse> {
    let dir_path = fs.handle_to_path(dir)?;
    fs.access(&dir_path, ACCESS_READ, creds)?;

    let count = if count == 0 {
        READDIR_DEFAULT_COUNT
    } else {
        count.min(READDIR_MAX_COUNT)
    };

    let page = fs.read_dir(&dir_path, cookie, verifier, count, with_attrs)?;
    Ok(NfsResponse::ReadDir {
        verifier: page.verifier,
        entries: page.entries,
        eof: page.eof,
    })
}

/// SetAttr policy: metadata changes (mode, ownership, times) need ownership
/// or unsquashed root; a size-only truncate needs write access.
fn check_set_attr_policy<F: FileSystem>(
    fs: &F,
    path: &str,
    attrs: &SetAttrs,
    creds: &Credentials,
) -> FsResult<()> {
    let current = fs.get_attr(path)?;
    let owner = creds.uid == 0 || creds.uid == current.uid;

    if attrs.touches_metadata() && !owner {
        return Err(FsError::NotOwner);
    }
    if attrs.size.is_some() && !owner {
        fs.access(path, ACCESS_WRITE, creds)?;
    }
    Ok(())
}
