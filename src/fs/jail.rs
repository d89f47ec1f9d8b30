//! Path containment under the export root.
//!
//! Every path received from the wire goes through [`PathJail::resolve`]
//! before it can touch the host filesystem. Resolution is purely lexical:
//! strip the leading separator, clean `.`/`..`/doubled separators, join onto
//! the root, and confirm the result is still inside. Symlinks are not
//! resolved here; the host deals with them at open time.

use std::path::{Component, Path, PathBuf};

use super::error::{FsError, FsResult};

/// Longest name a single path component may have.
pub const NAME_MAX: usize = 255;

/// Resolves jail-relative paths (the form stored in handles, e.g.
/// `/dir/file.txt`) to host paths under the export root.
#[derive(Debug, Clone)]
pub struct PathJail {
    root: PathBuf,
}

impl PathJail {
    /// `root` must already be absolute.
    pub fn new(root: PathBuf) -> Self {
        debug_assert!(root.is_absolute());
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a jail-relative path to a host path.
    ///
    /// Fails with `InvalidName` if the cleaned path would escape the root,
    /// without any host syscall.
    pub fn resolve(&self, path: &str) -> FsResult<PathBuf> {
        let cleaned = clean(path)?;
        let host = if cleaned == "/" {
            self.root.clone()
        } else {
            self.root.join(&cleaned[1..])
        };

        // Lexical cleaning already guarantees containment; the prefix check
        // stays as the final gate.
        if !host.starts_with(&self.root) {
            return Err(FsError::InvalidName);
        }
        Ok(host)
    }
}

/// Lexically normalize a wire path into canonical jail-relative form
/// (always `/`-rooted, no `.`/`..`, no doubled separators).
///
/// A path whose `..` components would climb above the root is rejected.
pub fn clean(path: &str) -> FsResult<String> {
    if path.contains('\0') {
        return Err(FsError::InvalidName);
    }

    let mut stack: Vec<&str> = Vec::new();
    for component in Path::new(path.trim_start_matches('/')).components() {
        match component {
            Component::CurDir => {}
            Component::Normal(name) => {
                let name = name.to_str().ok_or(FsError::InvalidName)?;
                if name.len() > NAME_MAX {
                    return Err(FsError::NameTooLong);
                }
                stack.push(name);
            }
            Component::ParentDir => {
                if stack.pop().is_none() {
                    return Err(FsError::InvalidName);
                }
            }
            // RootDir/Prefix cannot appear after the strip.
            _ => return Err(FsError::InvalidName),
        }
    }

    if stack.is_empty() {
        Ok("/".to_string())
    } else {
        Ok(format!("/{}", stack.join("/")))
    }
}

/// Jail-relative path of `name` inside `dir`.
pub fn join_child(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Jail-relative parent of `path`; the root's parent is the root.
pub fn parent_of(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

/// Validate a single directory-entry name from the wire.
///
/// `.` and `..` are not valid here; callers that honor them (lookup) check
/// for them before calling.
pub fn validate_component(name: &str) -> FsResult<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(FsError::InvalidName);
    }
    if name.contains('/') || name.contains('\0') {
        return Err(FsError::InvalidName);
    }
    if name.len() > NAME_MAX {
        return Err(FsError::NameTooLong);
    }
    Ok(())
}
