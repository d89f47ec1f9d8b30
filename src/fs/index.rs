//! Inode index.
//!
//! A process-wide, concurrent map from host inode number to the most
//! recently observed jail-relative path and the inode's current generation.
//! The index is populated opportunistically by every operation that resolves
//! a path; a cold handle whose inode is missing triggers a bounded
//! depth-first walk of the export root to recover the path.
//!
//! Hard links legitimately give one inode several names; the index keeps
//! whichever was seen last. Removals through the server retire the inode by
//! bumping its generation, so handles minted before the removal fail the
//! generation check even if the host reuses the inode number.

use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use tracing::debug;

/// Upper bound on directory entries visited by one recovery walk.
const MAX_WALK_ENTRIES: usize = 65_536;

#[derive(Debug, Clone)]
struct InodeRecord {
    /// Most recently observed jail-relative path; `None` once retired.
    path: Option<String>,
    generation: u32,
}

/// Concurrent `inode -> (path, generation)` index.
#[derive(Debug, Default)]
pub struct InodeIndex {
    records: DashMap<u64, InodeRecord>,
}

impl InodeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `inode` currently lives at `path`; returns the inode's
    /// generation, minting generation 1 on first sight.
    pub fn observe(&self, inode: u64, path: &str) -> u32 {
        let mut entry = self.records.entry(inode).or_insert(InodeRecord {
            path: None,
            generation: 1,
        });
        entry.path = Some(path.to_string());
        entry.generation
    }

    /// Current generation for `inode`, if the index has seen it.
    pub fn generation(&self, inode: u64) -> Option<u32> {
        self.records.get(&inode).map(|r| r.generation)
    }

    /// Most recent path for `inode`, if it is live.
    pub fn path_of(&self, inode: u64) -> Option<String> {
        self.records.get(&inode).and_then(|r| r.path.clone())
    }

    /// Retire an inode that was unlinked through this server. Its
    /// generation advances so surviving handles go stale, and a later
    /// create that recycles the inode number hands out the new generation.
    pub fn retire(&self, inode: u64) {
        if let Some(mut record) = self.records.get_mut(&inode) {
            record.path = None;
            record.generation += 1;
        }
    }

    /// Rewrite paths after a rename through this server: the renamed entry
    /// itself plus every indexed descendant of a renamed directory.
    pub fn rename(&self, from: &str, to: &str) {
        let prefix = format!("{}/", from);
        for mut record in self.records.iter_mut() {
            let rewritten = match record.path.as_deref() {
                Some(path) if path == from => Some(to.to_string()),
                Some(path) => path
                    .strip_prefix(prefix.as_str())
                    .map(|rest| format!("{}/{}", to, rest)),
                None => None,
            };
            if rewritten.is_some() {
                record.path = rewritten;
            }
        }
    }

    /// Recover the path of an inode the index does not know, by walking the
    /// export root depth-first until the inode turns up. The walk is bounded
    /// and never follows symlinks. On success the index is healed and the
    /// jail-relative path returned.
    pub fn recover(&self, host_root: &Path, inode: u64) -> Option<String> {
        let mut visited = 0usize;
        // (host dir, jail-relative dir)
        let mut stack: Vec<(PathBuf, String)> = vec![(host_root.to_path_buf(), "/".to_string())];

        if let Ok(md) = std::fs::symlink_metadata(host_root) {
            if md.ino() == inode {
                self.observe(inode, "/");
                return Some("/".to_string());
            }
        }

        while let Some((dir, rel)) = stack.pop() {
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(_) => continue,
            };

            for entry in entries.flatten() {
                visited += 1;
                if visited > MAX_WALK_ENTRIES {
                    debug!(target: "nfs-pipe::index", inode, visited, "recovery walk budget exhausted");
                    return None;
                }

                let Ok(name) = entry.file_name().into_string() else {
                    continue;
                };
                let Ok(md) = entry.metadata() else {
                    continue;
                };

                let child_rel = if rel == "/" {
                    format!("/{name}")
                } else {
                    format!("{rel}/{name}")
                };

                if md.ino() == inode {
                    debug!(target: "nfs-pipe::index", inode, path = %child_rel, "recovery walk healed inode");
                    self.observe(inode, &child_rel);
                    return Some(child_rel);
                }

                if md.is_dir() {
                    stack.push((entry.path(), child_rel));
                }
            }
        }

        None
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.records.len()
    }
}
