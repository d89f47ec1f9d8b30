//! End-to-end dispatcher scenarios over a real export directory.
//!
//! These drive the full request pipeline (handle validation, access checks,
//! idempotency, status mapping) through `Dispatcher::handle`, without the
//! socket layer.

use std::os::unix::fs::{MetadataExt, PermissionsExt};

use nfs_pipe::fs::LocalFs;
use nfs_pipe::protocol::{
    CreateMode, Credentials, FileType, NfsRequest, NfsResponse, SetAttrs, Stability, Status,
};
use nfs_pipe::server::{Dispatcher, ServerConfig};
use tempfile::TempDir;

// Squash is off for most scenarios so the suite keeps its own identity even
// when run as root; the squash scenario builds its own dispatcher.
fn new_dispatcher(root: &std::path::Path) -> Dispatcher<LocalFs> {
    let fs = LocalFs::new(root).unwrap();
    Dispatcher::new(fs, ServerConfig::default().root_squash(false))
}

fn creds() -> Credentials {
    Credentials::new(
        nix::unistd::Uid::effective().as_raw(),
        nix::unistd::Gid::effective().as_raw(),
    )
}

async fn root_handle(d: &Dispatcher<LocalFs>) -> Vec<u8> {
    match d.handle(creds(), NfsRequest::GetRootHandle).await {
        NfsResponse::Handle { handle, attrs } => {
            assert_eq!(attrs.file_type, FileType::Directory);
            assert_eq!(handle.len(), 16);
            handle
        }
        other => panic!("expected Handle, got {other:?}"),
    }
}

async fn lookup(d: &Dispatcher<LocalFs>, dir: &[u8], name: &str) -> NfsResponse {
    d.handle(
        creds(),
        NfsRequest::Lookup {
            dir: dir.to_vec(),
            name: name.to_string(),
        },
    )
    .await
}

async fn must_lookup(
    d: &Dispatcher<LocalFs>,
    dir: &[u8],
    name: &str,
) -> (Vec<u8>, nfs_pipe::FileAttributes) {
    match lookup(d, dir, name).await {
        NfsResponse::Entry { handle, attrs, .. } => (handle, attrs),
        other => panic!("lookup of {name} failed: {other:?}"),
    }
}

fn export_with_hello() -> (TempDir, Dispatcher<LocalFs>) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("hello.txt"), b"world").unwrap();
    std::fs::set_permissions(
        dir.path().join("hello.txt"),
        std::fs::Permissions::from_mode(0o644),
    )
    .unwrap();
    let d = new_dispatcher(dir.path());
    (dir, d)
}

#[tokio::test]
async fn test_bootstrap_lookup_read() {
    let (_dir, d) = export_with_hello();
    let h0 = root_handle(&d).await;

    let (h1, attrs) = must_lookup(&d, &h0, "hello.txt").await;
    assert_eq!(attrs.size, 5);
    assert_eq!(attrs.file_type, FileType::Regular);

    match d
        .handle(
            creds(),
            NfsRequest::Read {
                handle: h1,
                offset: 0,
                count: 10,
            },
        )
        .await
    {
        NfsResponse::Read { data, eof, attrs } => {
            assert_eq!(data, b"world");
            assert!(eof);
            assert_eq!(attrs.size, 5);
        }
        other => panic!("expected Read, got {other:?}"),
    }
}

#[tokio::test]
async fn test_guarded_create_then_idempotent_write() {
    let (dir, d) = export_with_hello();
    let h0 = root_handle(&d).await;

    let create = NfsRequest::Create {
        dir: h0.clone(),
        name: "a.txt".to_string(),
        attrs: SetAttrs::with_mode(0o644),
        mode: CreateMode::Guarded,
        verifier: 0,
    };

    let h2 = match d.handle(creds(), create.clone()).await {
        NfsResponse::Entry { handle, attrs, .. } => {
            assert_eq!(attrs.mode, 0o644);
            handle
        }
        other => panic!("expected Entry, got {other:?}"),
    };

    // The same guarded create again must fail.
    assert_eq!(d.handle(creds(), create).await.status(), Status::Exist);

    let write = NfsRequest::Write {
        handle: h2,
        offset: 0,
        data: b"abc".to_vec(),
        stability: Stability::FileSync,
    };

    let first = d.handle(creds(), write.clone()).await;
    let (count, verifier) = match &first {
        NfsResponse::Write {
            count, verifier, ..
        } => (*count, *verifier),
        other => panic!("expected Write, got {other:?}"),
    };
    assert_eq!(count, 3);
    assert_eq!(verifier, d.write_verifier());

    // Replay within the cache TTL: equal reply, unchanged file.
    let replay = d.handle(creds(), write).await;
    assert_eq!(first, replay);
    assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"abc");
}

#[tokio::test]
async fn test_exclusive_create_replay_semantics() {
    let (_dir, d) = export_with_hello();
    let h0 = root_handle(&d).await;

    let exclusive = |verifier: u64| NfsRequest::Create {
        dir: h0.clone(),
        name: "excl.txt".to_string(),
        attrs: SetAttrs::default(),
        mode: CreateMode::Exclusive,
        verifier,
    };

    let original = match d.handle(creds(), exclusive(7)).await {
        NfsResponse::Entry { handle, .. } => handle,
        other => panic!("expected Entry, got {other:?}"),
    };

    // Replay with the identical verifier returns the original handle.
    match d.handle(creds(), exclusive(7)).await {
        NfsResponse::Entry { handle, .. } => assert_eq!(handle, original),
        other => panic!("expected Entry on replay, got {other:?}"),
    }

    // A different verifier finds the file in the way.
    assert_eq!(
        d.handle(creds(), exclusive(8)).await.status(),
        Status::Exist
    );
}

#[tokio::test]
async fn test_mkdir_rename_lookup_chain() {
    let (_dir, d) = export_with_hello();
    let h0 = root_handle(&d).await;

    let mkdir = NfsRequest::Mkdir {
        dir: h0.clone(),
        name: "d".to_string(),
        attrs: SetAttrs::with_mode(0o755),
    };
    let dir_inode = match d.handle(creds(), mkdir).await {
        NfsResponse::Entry { attrs, .. } => {
            assert!(attrs.is_dir());
            assert_eq!(attrs.mode, 0o755);
            attrs.file_id
        }
        other => panic!("expected Entry, got {other:?}"),
    };

    let rename = NfsRequest::Rename {
        from_dir: h0.clone(),
        from_name: "d".to_string(),
        to_dir: h0.clone(),
        to_name: "d2".to_string(),
    };
    assert_eq!(d.handle(creds(), rename).await.status(), Status::Ok);

    assert_eq!(lookup(&d, &h0, "d").await.status(), Status::NoEnt);

    // The new name resolves to the same inode.
    let (_, attrs) = must_lookup(&d, &h0, "d2").await;
    assert_eq!(attrs.file_id, dir_inode);
}

#[tokio::test]
async fn test_stale_handle_after_out_of_band_delete() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("x"), b"x").unwrap();
    let d = new_dispatcher(dir.path());
    let h0 = root_handle(&d).await;
    let (hx, _) = must_lookup(&d, &h0, "x").await;

    std::fs::remove_file(dir.path().join("x")).unwrap();

    let resp = d.handle(creds(), NfsRequest::GetAttr { handle: hx }).await;
    assert_eq!(resp.status(), Status::Stale);
}

#[tokio::test]
async fn test_readdir_pages_chain_to_eof() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["e1", "e2", "e3", "e4", "e5"] {
        std::fs::write(dir.path().join(name), b"x").unwrap();
    }
    let d = new_dispatcher(dir.path());
    let h0 = root_handle(&d).await;

    let (verifier, first_page) = match d
        .handle(
            creds(),
            NfsRequest::ReadDir {
                dir: h0.clone(),
                cookie: 0,
                verifier: 0,
                count: 2,
            },
        )
        .await
    {
        NfsResponse::ReadDir {
            verifier,
            entries,
            eof,
        } => {
            assert_eq!(entries.len(), 2);
            assert!(!eof);
            (verifier, entries)
        }
        other => panic!("expected ReadDir, got {other:?}"),
    };

    // Cookies are strictly increasing from 1.
    assert_eq!(first_page[0].cookie, 1);
    assert_eq!(first_page[1].cookie, 2);

    let rest = match d
        .handle(
            creds(),
            NfsRequest::ReadDir {
                dir: h0.clone(),
                cookie: first_page[1].cookie,
                verifier,
                count: 10,
            },
        )
        .await
    {
        NfsResponse::ReadDir { entries, eof, .. } => {
            assert!(eof);
            entries
        }
        other => panic!("expected ReadDir, got {other:?}"),
    };
    assert_eq!(rest.len(), 3);

    // Every name appears exactly once across the chained pages.
    let mut names: Vec<String> = first_page
        .iter()
        .chain(rest.iter())
        .map(|e| e.name.clone())
        .collect();
    names.sort();
    assert_eq!(names, ["e1", "e2", "e3", "e4", "e5"]);
}

#[tokio::test]
async fn test_readdir_stale_verifier_rejected() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["a", "b", "c"] {
        std::fs::write(dir.path().join(name), b"x").unwrap();
    }
    let d = new_dispatcher(dir.path());
    let h0 = root_handle(&d).await;

    let resp = d
        .handle(
            creds(),
            NfsRequest::ReadDir {
                dir: h0,
                cookie: 2,
                verifier: 0xbad,
                count: 10,
            },
        )
        .await;
    assert_eq!(resp.status(), Status::BadCookie);
}

#[tokio::test]
async fn test_escaping_names_rejected_without_syscalls() {
    let (_dir, d) = export_with_hello();
    let h0 = root_handle(&d).await;

    assert_eq!(
        lookup(&d, &h0, "../../etc/passwd").await.status(),
        Status::Inval
    );

    let create = NfsRequest::Create {
        dir: h0.clone(),
        name: "../escape".to_string(),
        attrs: SetAttrs::default(),
        mode: CreateMode::Unchecked,
        verifier: 0,
    };
    assert_eq!(d.handle(creds(), create).await.status(), Status::Inval);

    let rename = NfsRequest::Rename {
        from_dir: h0.clone(),
        from_name: "hello.txt".to_string(),
        to_dir: h0,
        to_name: "../../stolen".to_string(),
    };
    assert_eq!(d.handle(creds(), rename).await.status(), Status::Inval);
}

#[tokio::test]
async fn test_read_clamped_by_max_read() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("big"), vec![7u8; 64]).unwrap();
    let fs = LocalFs::new(dir.path()).unwrap();
    let d = Dispatcher::new(
        fs,
        ServerConfig::default().root_squash(false).max_read(16),
    );

    let h0 = root_handle(&d).await;
    let (hb, _) = must_lookup(&d, &h0, "big").await;

    match d
        .handle(
            creds(),
            NfsRequest::Read {
                handle: hb,
                offset: 0,
                count: 64,
            },
        )
        .await
    {
        NfsResponse::Read { data, eof, .. } => {
            assert_eq!(data.len(), 16);
            assert!(!eof);
        }
        other => panic!("expected Read, got {other:?}"),
    }
}

#[tokio::test]
async fn test_remove_and_rmdir_statuses() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("f"), b"x").unwrap();
    std::fs::create_dir(dir.path().join("d")).unwrap();
    std::fs::write(dir.path().join("d/inner"), b"x").unwrap();
    let d = new_dispatcher(dir.path());
    let h0 = root_handle(&d).await;

    let remove = |name: &str| NfsRequest::Remove {
        dir: h0.clone(),
        name: name.to_string(),
    };
    let rmdir = |name: &str| NfsRequest::Rmdir {
        dir: h0.clone(),
        name: name.to_string(),
    };

    assert_eq!(d.handle(creds(), remove("d")).await.status(), Status::IsDir);
    assert_eq!(d.handle(creds(), rmdir("f")).await.status(), Status::NotDir);
    assert_eq!(
        d.handle(creds(), rmdir("d")).await.status(),
        Status::NotEmpty
    );
    assert_eq!(
        d.handle(creds(), remove("missing")).await.status(),
        Status::NoEnt
    );

    assert_eq!(d.handle(creds(), remove("f")).await.status(), Status::Ok);
    assert_eq!(lookup(&d, &h0, "f").await.status(), Status::NoEnt);
}

#[tokio::test]
async fn test_setattr_returns_post_op_attrs() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("f"), b"hello").unwrap();
    let d = new_dispatcher(dir.path());
    let h0 = root_handle(&d).await;
    let (hf, _) = must_lookup(&d, &h0, "f").await;

    let resp = d
        .handle(
            creds(),
            NfsRequest::SetAttr {
                handle: hf,
                attrs: SetAttrs {
                    mode: Some(0o640),
                    size: Some(2),
                    ..SetAttrs::default()
                },
            },
        )
        .await;

    match resp {
        NfsResponse::Attr { attrs } => {
            assert_eq!(attrs.mode, 0o640);
            assert_eq!(attrs.size, 2);
        }
        other => panic!("expected Attr, got {other:?}"),
    }
}

#[tokio::test]
async fn test_root_squash_blocks_owner_only_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("secret"), b"x").unwrap();
    std::fs::set_permissions(
        dir.path().join("secret"),
        std::fs::Permissions::from_mode(0o600),
    )
    .unwrap();

    let plain = new_dispatcher(dir.path());
    let squashing = Dispatcher::new(LocalFs::new(dir.path()).unwrap(), ServerConfig::default());

    let h0 = root_handle(&plain).await;
    let (hs, _) = must_lookup(&plain, &h0, "secret").await;

    // uid 0 arrives squashed to the anonymous identity and is denied the
    // owner-only read, whoever owns the file.
    let resp = squashing
        .handle(
            Credentials::new(0, 0),
            NfsRequest::Read {
                handle: hs,
                offset: 0,
                count: 4,
            },
        )
        .await;
    assert_eq!(resp.status(), Status::Access);
}

#[tokio::test]
async fn test_readdirplus_carries_attrs() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("f"), b"hello").unwrap();
    let d = new_dispatcher(dir.path());
    let h0 = root_handle(&d).await;

    match d
        .handle(
            creds(),
            NfsRequest::ReadDirPlus {
                dir: h0,
                cookie: 0,
                verifier: 0,
                count: 0,
            },
        )
        .await
    {
        NfsResponse::ReadDir { entries, eof, .. } => {
            assert!(eof);
            assert_eq!(entries.len(), 1);
            let attrs = entries[0].attrs.as_ref().expect("readdirplus attrs");
            assert_eq!(attrs.size, 5);
            assert_eq!(entries[0].file_id, attrs.file_id);
        }
        other => panic!("expected ReadDir, got {other:?}"),
    }
}

#[tokio::test]
async fn test_statfs_and_commit() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("f"), b"x").unwrap();
    let d = new_dispatcher(dir.path());
    let h0 = root_handle(&d).await;
    let (hf, _) = must_lookup(&d, &h0, "f").await;

    match d
        .handle(creds(), NfsRequest::StatFs { handle: h0 })
        .await
    {
        NfsResponse::StatFs { stat } => assert!(stat.total_bytes > 0),
        other => panic!("expected StatFs, got {other:?}"),
    }

    match d
        .handle(
            creds(),
            NfsRequest::Commit {
                handle: hf,
                offset: 0,
                count: 0,
            },
        )
        .await
    {
        NfsResponse::Commit { verifier, .. } => assert_eq!(verifier, d.write_verifier()),
        other => panic!("expected Commit, got {other:?}"),
    }
}

#[tokio::test]
async fn test_handles_survive_server_restart_via_walk() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("a")).unwrap();
    std::fs::write(dir.path().join("a/f"), b"payload").unwrap();

    let first = new_dispatcher(dir.path());
    let h0 = root_handle(&first).await;
    let (hf, attrs) = must_lookup(&first, &h0, "a").await;
    let (hff, _) = must_lookup(&first, &hf, "f").await;
    assert!(attrs.is_dir());

    // A fresh process over the same root has an empty index but the same
    // fs_id; the old handle heals through the recovery walk.
    let second = new_dispatcher(dir.path());
    match second
        .handle(
            creds(),
            NfsRequest::Read {
                handle: hff,
                offset: 0,
                count: 64,
            },
        )
        .await
    {
        NfsResponse::Read { data, .. } => assert_eq!(data, b"payload"),
        other => panic!("expected Read, got {other:?}"),
    }
}

#[tokio::test]
async fn test_lookup_dot_and_dotdot() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    let d = new_dispatcher(dir.path());
    let h0 = root_handle(&d).await;
    let root_ino = std::fs::metadata(dir.path()).unwrap().ino();

    let (hsub, _) = must_lookup(&d, &h0, "sub").await;

    let (_, attrs) = must_lookup(&d, &hsub, "..").await;
    assert_eq!(attrs.file_id, root_ino);

    let (_, attrs) = must_lookup(&d, &h0, "..").await;
    assert_eq!(attrs.file_id, root_ino, "root's parent is root");

    let (_, attrs) = must_lookup(&d, &hsub, ".").await;
    assert!(attrs.is_dir());
}
