//! Socket-level integration tests: real frames over a real TCP connection.

use std::collections::HashMap;

use nfs_pipe::fs::LocalFs;
use nfs_pipe::protocol::{
    read_message_async, Credentials, NfsRequest, NfsResponse, Status, WireRequest, WireResponse,
};
use nfs_pipe::server::{AsyncServer, ServerConfig};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

fn creds() -> Credentials {
    Credentials::new(
        nix::unistd::Uid::effective().as_raw(),
        nix::unistd::Gid::effective().as_raw(),
    )
}

async fn start_server(root: &std::path::Path) -> std::net::SocketAddr {
    let fs = LocalFs::new(root).unwrap();
    let server = AsyncServer::with_config(fs, ServerConfig::default().root_squash(false));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server.serve_on(listener));
    addr
}

async fn send(stream: &mut TcpStream, unique: u64, request: NfsRequest) {
    let frame = WireRequest::new(unique, creds(), request).encode().unwrap();
    stream.write_all(&frame).await.unwrap();
}

async fn recv(stream: &mut TcpStream) -> WireResponse {
    let payload = read_message_async(stream).await.unwrap();
    WireResponse::decode(&payload).unwrap()
}

#[tokio::test]
async fn test_bootstrap_and_read_over_socket() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("hello.txt"), b"world").unwrap();
    let addr = start_server(dir.path()).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();

    send(&mut stream, 1, NfsRequest::GetRootHandle).await;
    let resp = recv(&mut stream).await;
    assert_eq!(resp.unique, 1);
    let root = match resp.response {
        NfsResponse::Handle { handle, .. } => handle,
        other => panic!("expected Handle, got {other:?}"),
    };

    send(
        &mut stream,
        2,
        NfsRequest::Lookup {
            dir: root,
            name: "hello.txt".to_string(),
        },
    )
    .await;
    let resp = recv(&mut stream).await;
    assert_eq!(resp.unique, 2);
    let handle = match resp.response {
        NfsResponse::Entry { handle, attrs, .. } => {
            assert_eq!(attrs.size, 5);
            handle
        }
        other => panic!("expected Entry, got {other:?}"),
    };

    send(
        &mut stream,
        3,
        NfsRequest::Read {
            handle,
            offset: 0,
            count: 16,
        },
    )
    .await;
    let resp = recv(&mut stream).await;
    assert_eq!(resp.unique, 3);
    match resp.response {
        NfsResponse::Read { data, eof, .. } => {
            assert_eq!(data, b"world");
            assert!(eof);
        }
        other => panic!("expected Read, got {other:?}"),
    }
}

#[tokio::test]
async fn test_pipelined_requests_all_answered() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..8 {
        std::fs::write(dir.path().join(format!("f{i}")), vec![b'x'; i + 1]).unwrap();
    }
    let addr = start_server(dir.path()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    send(&mut stream, 100, NfsRequest::GetRootHandle).await;
    let root = match recv(&mut stream).await.response {
        NfsResponse::Handle { handle, .. } => handle,
        other => panic!("expected Handle, got {other:?}"),
    };

    // Fire a burst without waiting; responses may arrive in any order but
    // every unique must come back exactly once.
    for i in 0..8u64 {
        send(
            &mut stream,
            i,
            NfsRequest::Lookup {
                dir: root.clone(),
                name: format!("f{i}"),
            },
        )
        .await;
    }

    let mut sizes = HashMap::new();
    for _ in 0..8 {
        let resp = recv(&mut stream).await;
        match resp.response {
            NfsResponse::Entry { attrs, .. } => {
                assert!(sizes.insert(resp.unique, attrs.size).is_none());
            }
            other => panic!("expected Entry, got {other:?}"),
        }
    }

    for i in 0..8u64 {
        assert_eq!(sizes[&i], i + 1);
    }
}

#[tokio::test]
async fn test_error_statuses_cross_the_wire() {
    let dir = tempfile::tempdir().unwrap();
    let addr = start_server(dir.path()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    send(
        &mut stream,
        1,
        NfsRequest::GetAttr {
            handle: vec![1, 2, 3],
        },
    )
    .await;
    let resp = recv(&mut stream).await;
    assert_eq!(resp.response.status(), Status::BadHandle);

    send(&mut stream, 2, NfsRequest::GetRootHandle).await;
    let root = match recv(&mut stream).await.response {
        NfsResponse::Handle { handle, .. } => handle,
        other => panic!("expected Handle, got {other:?}"),
    };

    send(
        &mut stream,
        3,
        NfsRequest::Lookup {
            dir: root,
            name: "missing".to_string(),
        },
    )
    .await;
    assert_eq!(recv(&mut stream).await.response.status(), Status::NoEnt);
}

#[tokio::test]
async fn test_two_servers_same_root_interchange_handles() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("shared"), b"data").unwrap();

    let addr_a = start_server(dir.path()).await;
    let addr_b = start_server(dir.path()).await;

    let mut a = TcpStream::connect(addr_a).await.unwrap();
    let mut b = TcpStream::connect(addr_b).await.unwrap();

    send(&mut a, 1, NfsRequest::GetRootHandle).await;
    let root_a = match recv(&mut a).await.response {
        NfsResponse::Handle { handle, .. } => handle,
        other => panic!("expected Handle, got {other:?}"),
    };

    send(
        &mut a,
        2,
        NfsRequest::Lookup {
            dir: root_a,
            name: "shared".to_string(),
        },
    )
    .await;
    let handle = match recv(&mut a).await.response {
        NfsResponse::Entry { handle, .. } => handle,
        other => panic!("expected Entry, got {other:?}"),
    };

    // Identical export root means identical fs_id; server B accepts the
    // handle minted by server A.
    send(
        &mut b,
        1,
        NfsRequest::Read {
            handle,
            offset: 0,
            count: 16,
        },
    )
    .await;
    match recv(&mut b).await.response {
        NfsResponse::Read { data, .. } => assert_eq!(data, b"data"),
        other => panic!("expected Read, got {other:?}"),
    }
}
