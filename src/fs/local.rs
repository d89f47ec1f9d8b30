//! Host-backed filesystem under the export jail.

use std::ffi::CString;
use std::fs::{File, Metadata, OpenOptions, Permissions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::attr::{attributes_from_metadata, check_access};
use super::error::{FsError, FsResult};
use super::handle::{export_fs_id, FileHandle};
use super::index::InodeIndex;
use super::jail::{join_child, parent_of, validate_component, PathJail};
use super::{FileSystem, ReadDirPage};
use crate::protocol::{Credentials, DirEntry, FileAttributes, FsStat, SetAttrs, Stability};

/// Filesystem core mapping operations onto a host directory.
///
/// All paths taken and returned are jail-relative; the embedded `PathJail`
/// is the only component that produces host paths, and it runs on every
/// path before any host syscall.
pub struct LocalFs {
    jail: PathJail,
    index: InodeIndex,
    fs_id: u32,
}

impl LocalFs {
    /// Open an export rooted at `root`. The root must exist and be a
    /// directory; it is canonicalized so that equivalent spellings of the
    /// same directory produce the same `fs_id` and therefore identical
    /// handles.
    pub fn new<P: AsRef<Path>>(root: P) -> FsResult<Self> {
        let root = std::fs::canonicalize(root.as_ref())?;
        let md = std::fs::metadata(&root)?;
        if !md.is_dir() {
            return Err(FsError::NotDir);
        }

        let fs_id = export_fs_id(&root);
        let index = InodeIndex::new();
        index.observe(md.ino(), "/");

        debug!(target: "nfs-pipe::fs", root = %root.display(), fs_id, "export opened");

        Ok(Self {
            jail: PathJail::new(root),
            index,
            fs_id,
        })
    }

    pub fn root(&self) -> &Path {
        self.jail.root()
    }

    pub fn fs_id(&self) -> u32 {
        self.fs_id
    }

    /// Resolve and stat, recording the inode observation.
    fn stat(&self, path: &str) -> FsResult<(PathBuf, Metadata)> {
        let host = self.jail.resolve(path)?;
        let md = std::fs::symlink_metadata(&host)?;
        self.index.observe(md.ino(), path);
        Ok((host, md))
    }

    fn stat_dir(&self, path: &str) -> FsResult<(PathBuf, Metadata)> {
        let (host, md) = self.stat(path)?;
        if !md.is_dir() {
            return Err(FsError::NotDir);
        }
        Ok((host, md))
    }

    fn c_path(host: &Path) -> FsResult<CString> {
        CString::new(host.as_os_str().as_bytes()).map_err(|_| FsError::InvalidName)
    }

    /// Apply non-size creation attributes to a freshly made object.
    fn apply_create_attrs(&self, host: &Path, attrs: &SetAttrs, default_mode: u32) -> FsResult<()> {
        // Explicit chmod rather than relying on open(2) mode, which the
        // process umask would filter.
        let mode = attrs.mode.unwrap_or(default_mode) & 0o7777;
        std::fs::set_permissions(host, Permissions::from_mode(mode))?;

        if attrs.uid.is_some() || attrs.gid.is_some() {
            chown(host, attrs.uid, attrs.gid)?;
        }
        if attrs.atime.is_some() || attrs.mtime.is_some() {
            let md = std::fs::symlink_metadata(host)?;
            set_times(host, &md, attrs)?;
        }
        Ok(())
    }
}

impl FileSystem for LocalFs {
    fn get_attr(&self, path: &str) -> FsResult<FileAttributes> {
        let (_, md) = self.stat(path)?;
        Ok(attributes_from_metadata(&md))
    }

    fn set_attr(&self, path: &str, attrs: &SetAttrs) -> FsResult<FileAttributes> {
        let (host, md) = self.stat(path)?;

        // Application order: mode, ownership, size, times. Unset fields
        // leave the attribute unchanged.
        if let Some(mode) = attrs.mode {
            std::fs::set_permissions(&host, Permissions::from_mode(mode & 0o7777))?;
        }

        if attrs.uid.is_some() || attrs.gid.is_some() {
            chown(&host, attrs.uid, attrs.gid)?;
        }

        if let Some(size) = attrs.size {
            let file = OpenOptions::new().write(true).open(&host)?;
            file.set_len(size)?;
        }

        if attrs.atime.is_some() || attrs.mtime.is_some() {
            set_times(&host, &md, attrs)?;
        }

        let md = std::fs::symlink_metadata(&host)?;
        Ok(attributes_from_metadata(&md))
    }

    fn lookup(&self, dir: &str, name: &str) -> FsResult<(String, FileAttributes)> {
        let (_, dir_md) = self.stat(dir)?;
        if !dir_md.is_dir() {
            return Err(FsError::NotDir);
        }

        let target = match name {
            "." => dir.to_string(),
            ".." => parent_of(dir),
            _ => {
                validate_component(name)?;
                join_child(dir, name)
            }
        };

        let (_, md) = self.stat(&target)?;
        Ok((target, attributes_from_metadata(&md)))
    }

    fn access(&self, path: &str, mode: u32, creds: &Credentials) -> FsResult<()> {
        let attrs = self.get_attr(path)?;
        if check_access(&attrs, mode, creds) {
            Ok(())
        } else {
            Err(FsError::Permission)
        }
    }

    fn read(&self, path: &str, offset: u64, count: u32) -> FsResult<(Vec<u8>, bool)> {
        let (host, md) = self.stat(path)?;
        if !attributes_from_metadata(&md).is_regular() {
            return Err(FsError::IsDir);
        }

        let size = md.size();
        if offset >= size {
            return Ok((Vec::new(), true));
        }

        let want = (count as u64).min(size - offset) as usize;
        let mut file = File::open(&host)?;
        file.seek(SeekFrom::Start(offset))?;

        let mut data = vec![0u8; want];
        let mut filled = 0;
        while filled < want {
            match file.read(&mut data[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        data.truncate(filled);

        let eof = offset + filled as u64 >= size;
        Ok((data, eof))
    }

    fn write(
        &self,
        path: &str,
        offset: u64,
        data: &[u8],
        stability: Stability,
    ) -> FsResult<(u32, Stability)> {
        let (host, md) = self.stat(path)?;
        if !attributes_from_metadata(&md).is_regular() {
            return Err(FsError::IsDir);
        }

        let mut file = OpenOptions::new().read(true).write(true).open(&host)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;

        // Unstable writes are synced anyway so a cached (idempotent) reply
        // never claims less durability than the host has; the reply reports
        // the level actually used.
        let used = match stability {
            Stability::FileSync => {
                file.sync_all()?;
                Stability::FileSync
            }
            Stability::DataSync | Stability::Unstable => {
                file.sync_data()?;
                Stability::DataSync
            }
        };

        Ok((data.len() as u32, used))
    }

    fn create(
        &self,
        dir: &str,
        name: &str,
        attrs: &SetAttrs,
        guarded: bool,
    ) -> FsResult<(String, FileAttributes)> {
        self.stat_dir(dir)?;
        validate_component(name)?;

        let target = join_child(dir, name);
        let host = self.jail.resolve(&target)?;

        let mut options = OpenOptions::new();
        options.write(true);
        if guarded {
            options.create_new(true);
        } else {
            options.create(true).truncate(true);
        }
        options.open(&host)?;

        self.apply_create_attrs(&host, attrs, 0o644)?;

        let md = std::fs::symlink_metadata(&host)?;
        self.index.observe(md.ino(), &target);
        debug!(target: "nfs-pipe::fs", path = %target, inode = md.ino(), "created file");
        Ok((target, attributes_from_metadata(&md)))
    }

    fn mkdir(
        &self,
        dir: &str,
        name: &str,
        attrs: &SetAttrs,
    ) -> FsResult<(String, FileAttributes)> {
        self.stat_dir(dir)?;
        validate_component(name)?;

        let target = join_child(dir, name);
        let host = self.jail.resolve(&target)?;

        std::fs::create_dir(&host)?;
        self.apply_create_attrs(&host, attrs, 0o755)?;

        let md = std::fs::symlink_metadata(&host)?;
        self.index.observe(md.ino(), &target);
        debug!(target: "nfs-pipe::fs", path = %target, inode = md.ino(), "created directory");
        Ok((target, attributes_from_metadata(&md)))
    }

    fn remove(&self, path: &str) -> FsResult<()> {
        let (host, md) = self.stat(path)?;
        if md.is_dir() {
            return Err(FsError::IsDir);
        }

        std::fs::remove_file(&host)?;
        self.index.retire(md.ino());
        Ok(())
    }

    fn rmdir(&self, path: &str) -> FsResult<()> {
        let (host, md) = self.stat(path)?;
        if !md.is_dir() {
            return Err(FsError::NotDir);
        }

        std::fs::remove_dir(&host)?;
        self.index.retire(md.ino());
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        let (from_host, md) = self.stat(from)?;
        let to_host = self.jail.resolve(to)?;

        std::fs::rename(&from_host, &to_host)?;
        self.index.rename(from, to);
        self.index.observe(md.ino(), to);
        Ok(())
    }

    fn read_dir(
        &self,
        dir: &str,
        cookie: u64,
        verifier: u64,
        count: u32,
        with_attrs: bool,
    ) -> FsResult<ReadDirPage> {
        let (host, dir_md) = self.stat_dir(dir)?;

        // The enumeration epoch is the directory's mtime: pages of one
        // session see the same value, and any mutation of the directory
        // invalidates outstanding cookies.
        let current = dir_md.mtime() as u64 * 1_000_000_000 + dir_md.mtime_nsec() as u64;
        if cookie != 0 && verifier != current {
            return Err(FsError::BadCookie);
        }

        let mut names: Vec<(String, u64)> = Vec::new();
        for entry in std::fs::read_dir(&host)? {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let ino = entry
                .metadata()
                .map(|md| md.ino())
                .unwrap_or_default();
            names.push((name, ino));
        }
        names.sort_by(|a, b| a.0.cmp(&b.0));

        let total = names.len();
        let start = (cookie as usize).min(total);
        let want = count as usize;
        let page = &names[start..(start + want).min(total)];

        let mut entries = Vec::with_capacity(page.len());
        for (i, (name, ino)) in page.iter().enumerate() {
            let child = join_child(dir, name);
            self.index.observe(*ino, &child);

            let attrs = if with_attrs {
                self.get_attr(&child).ok()
            } else {
                None
            };

            entries.push(DirEntry {
                file_id: *ino,
                name: name.clone(),
                cookie: (start + i + 1) as u64,
                attrs,
            });
        }

        let eof = entries.len() < want;
        Ok(ReadDirPage {
            verifier: current,
            entries,
            eof,
        })
    }

    fn stat_fs(&self) -> FsResult<FsStat> {
        let vfs = nix::sys::statvfs::statvfs(self.jail.root())?;
        let frsize = vfs.fragment_size() as u64;
        Ok(FsStat {
            total_bytes: vfs.blocks() as u64 * frsize,
            free_bytes: vfs.blocks_free() as u64 * frsize,
            avail_bytes: vfs.blocks_available() as u64 * frsize,
            total_files: vfs.files() as u64,
            free_files: vfs.files_free() as u64,
            name_max: vfs.name_max() as u32,
        })
    }

    fn commit(&self, path: &str) -> FsResult<()> {
        let (host, md) = self.stat(path)?;
        if !attributes_from_metadata(&md).is_regular() {
            return Err(FsError::IsDir);
        }
        let file = File::open(&host)?;
        file.sync_all()?;
        Ok(())
    }

    fn path_to_handle(&self, path: &str) -> FsResult<Vec<u8>> {
        let (_, md) = self.stat(path)?;
        let generation = self.index.observe(md.ino(), path);
        Ok(FileHandle::new(self.fs_id, md.ino(), generation).serialize())
    }

    fn handle_to_path(&self, handle: &[u8]) -> FsResult<String> {
        let fh = FileHandle::parse(handle)?;
        if fh.fs_id != self.fs_id {
            return Err(FsError::Stale);
        }

        if let Some(generation) = self.index.generation(fh.inode) {
            if generation != fh.generation {
                return Err(FsError::Stale);
            }
            if let Some(path) = self.index.path_of(fh.inode) {
                // The index remembers the last observed name; verify the
                // inode still lives there before trusting it.
                if let Ok(host) = self.jail.resolve(&path) {
                    if let Ok(md) = std::fs::symlink_metadata(&host) {
                        if md.ino() == fh.inode {
                            return Ok(path);
                        }
                    }
                }
            }
        }

        // Cold or outdated inode: walk the export to find it.
        match self.index.recover(self.jail.root(), fh.inode) {
            Some(path) if self.index.generation(fh.inode) == Some(fh.generation) => Ok(path),
            _ => Err(FsError::Stale),
        }
    }
}

fn chown(host: &Path, uid: Option<u32>, gid: Option<u32>) -> FsResult<()> {
    let path = LocalFs::c_path(host)?;
    let uid = uid.unwrap_or(u32::MAX) as libc::uid_t;
    let gid = gid.unwrap_or(u32::MAX) as libc::gid_t;
    // uid/gid of -1 leave that side unchanged.
    let rc = unsafe { libc::chown(path.as_ptr(), uid, gid) };
    if rc != 0 {
        return Err(FsError::from_io(&std::io::Error::last_os_error()));
    }
    Ok(())
}

fn set_times(host: &Path, current: &Metadata, attrs: &SetAttrs) -> FsResult<()> {
    let path = LocalFs::c_path(host)?;
    let times = [
        libc::timespec {
            tv_sec: attrs.atime.map(|t| t.seconds).unwrap_or(current.atime()),
            tv_nsec: attrs
                .atime
                .map(|t| t.nanos as i64)
                .unwrap_or(current.atime_nsec()),
        },
        libc::timespec {
            tv_sec: attrs.mtime.map(|t| t.seconds).unwrap_or(current.mtime()),
            tv_nsec: attrs
                .mtime
                .map(|t| t.nanos as i64)
                .unwrap_or(current.mtime_nsec()),
        },
    ];
    let rc = unsafe { libc::utimensat(libc::AT_FDCWD, path.as_ptr(), times.as_ptr(), 0) };
    if rc != 0 {
        return Err(FsError::from_io(&std::io::Error::last_os_error()));
    }
    Ok(())
}
