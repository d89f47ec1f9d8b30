//! Host stat translation and permission classification.

use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;

use crate::protocol::{Credentials, FileAttributes, FileTime, FileType};

/// Access bitmask values, matching the rwx triple on the wire.
pub const ACCESS_READ: u32 = 4;
pub const ACCESS_WRITE: u32 = 2;
pub const ACCESS_EXECUTE: u32 = 1;

/// File type from the `S_IFMT` bits of a raw mode.
pub fn file_type_from_mode(mode: u32) -> FileType {
    match mode & libc::S_IFMT {
        libc::S_IFDIR => FileType::Directory,
        libc::S_IFLNK => FileType::Symlink,
        libc::S_IFBLK => FileType::Block,
        libc::S_IFCHR => FileType::Char,
        libc::S_IFIFO => FileType::Fifo,
        libc::S_IFSOCK => FileType::Socket,
        _ => FileType::Regular,
    }
}

/// Translate a host stat buffer to protocol attributes.
pub fn attributes_from_metadata(md: &Metadata) -> FileAttributes {
    FileAttributes {
        file_type: file_type_from_mode(md.mode()),
        // Permission bits plus SUID/SGID/sticky; the type bits travel
        // separately.
        mode: md.mode() & 0o7777,
        nlink: md.nlink() as u32,
        uid: md.uid(),
        gid: md.gid(),
        size: md.size(),
        used: md.blocks() * 512,
        rdev: md.rdev(),
        file_id: md.ino(),
        atime: FileTime::new(md.atime(), md.atime_nsec() as i32),
        mtime: FileTime::new(md.mtime(), md.mtime_nsec() as i32),
        ctime: FileTime::new(md.ctime(), md.ctime_nsec() as i32),
        block_size: md.blksize() as u32,
        blocks: md.blocks(),
    }
}

/// Classic Unix permission classification.
///
/// Owner bits apply when the caller owns the file; group bits when the
/// file's group is the caller's primary or a supplementary group; other
/// bits for everyone else. Access is granted iff every requested bit is
/// present in the selected triple.
pub fn check_access(attrs: &FileAttributes, requested: u32, creds: &Credentials) -> bool {
    // Unsquashed root bypasses permission bits, as on the host.
    if creds.uid == 0 {
        return true;
    }

    let selected = if creds.uid == attrs.uid {
        (attrs.mode >> 6) & 0o7
    } else if creds.in_group(attrs.gid) {
        (attrs.mode >> 3) & 0o7
    } else {
        attrs.mode & 0o7
    };

    requested & selected == requested
}
