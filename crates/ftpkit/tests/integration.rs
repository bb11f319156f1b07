//! End-to-end tests against an in-process FTP server.

#![allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]

mod server;

use ftpkit::{DirSort, Encoding, Error, FtpClient, ListingDialect, NodeKind, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use server::{FakeServer, ListStyle, ServerOptions};

async fn logged_in(server: &FakeServer) -> FtpClient {
    FtpClient::connect(server.config().build()).await.unwrap()
}

/// Names in the order the client returned them.
fn ordered(nodes: &[ftpkit::NodeInformation]) -> Vec<&str> {
    nodes.iter().map(|n| n.name.as_str()).collect()
}

fn names(nodes: &[ftpkit::NodeInformation]) -> Vec<&str> {
    let mut names: Vec<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
    names.sort_unstable();
    names
}

#[tokio::test]
async fn test_login_sequence() {
    let server = FakeServer::start(ServerOptions::default()).await;
    let client = logged_in(&server).await;

    assert!(client.is_connected());
    assert!(client.is_authenticated());
    assert!(!client.is_encrypted());
    assert_eq!(client.working_directory(), "/");
    assert!(client.supports_feature("mlsd"));
    assert!(client.supports_feature("UTF8"));
    assert_eq!(client.encoding(), Encoding::Utf8);
    assert_eq!(client.dialect(), Some(ListingDialect::Mlsd));

    assert_eq!(
        server.commands(),
        vec![
            "USER alice",
            "PASS secret",
            "FEAT",
            "OPTS UTF8 ON",
            "TYPE I",
            "CWD /",
            "PWD",
        ]
    );
}

#[tokio::test]
async fn test_login_rejected() {
    let server = FakeServer::start(ServerOptions::default()).await;
    let config = server.config().credentials("alice", "wrong").build();

    let mut client = FtpClient::new(config);
    let err = client.login().await.unwrap_err();

    assert_eq!(err.code(), Some(530));
    assert!(err.is_permanent());
    assert!(!client.is_connected());
    assert!(!client.is_authenticated());
}

#[tokio::test]
async fn test_operations_require_login() {
    let server = FakeServer::start(ServerOptions::default()).await;
    let mut client = FtpClient::new(server.config().build());

    assert!(matches!(client.list_all().await, Err(Error::NotLoggedIn)));
    assert!(matches!(
        client.delete_file("/a.txt").await,
        Err(Error::NotLoggedIn)
    ));
    assert!(server.commands().is_empty());
}

#[tokio::test]
async fn test_base_directory_is_created() {
    let server = FakeServer::start(ServerOptions::default()).await;
    let config = server.config().base_directory("/home/new").build();

    let client = FtpClient::connect(config).await.unwrap();

    assert_eq!(client.working_directory(), "/home/new");
    assert!(server.is_dir("/home"));
    assert!(server.is_dir("/home/new"));
}

#[tokio::test]
async fn test_mlsd_listing_filters() {
    let server = FakeServer::start(ServerOptions::default()).await;
    server.add_file("/readme.txt", b"hello");
    server.add_file("/data.bin", &[0u8; 1024]);
    server.add_dir("/pub");

    let mut client = logged_in(&server).await;

    let files = client.list_files().await.unwrap();
    assert_eq!(names(&files), vec!["data.bin", "readme.txt"]);
    let data = files.iter().find(|n| n.name == "data.bin").unwrap();
    assert_eq!(data.size, 1024);
    assert_eq!(
        data.modified.format("%Y-%m-%d %H:%M:%S").to_string(),
        "2024-03-15 09:30:00"
    );

    let directories = client.list_directories().await.unwrap();
    assert_eq!(names(&directories), vec!["pub"]);
    assert!(directories.iter().all(|n| n.kind == NodeKind::Directory));

    // The cdir/pdir records are not entries of the directory.
    let all = client.list_all().await.unwrap();
    assert_eq!(names(&all), vec!["data.bin", "pub", "readme.txt"]);

    assert_eq!(server.commands_named("MLSD").len(), 3);
    assert!(server.commands_named("LIST").is_empty());

    // The control connection stays in step after the listings.
    assert_eq!(client.print_working_directory().await.unwrap(), "/");
}

#[tokio::test]
async fn test_list_fallback_detects_unix() {
    let server = FakeServer::start(ServerOptions {
        feat: false,
        ..ServerOptions::default()
    })
    .await;
    server.add_file("/notes.txt", b"abc");
    server.add_dir("/archive");

    let mut client = logged_in(&server).await;
    assert!(client.features().is_empty());
    assert_eq!(client.dialect(), None);

    let directories = client.list_directories().await.unwrap();
    assert_eq!(names(&directories), vec!["archive"]);
    assert_eq!(client.dialect(), Some(ListingDialect::Unix));

    let files = client.list_files().await.unwrap();
    assert_eq!(names(&files), vec!["notes.txt"]);
    assert_eq!(files[0].size, 3);

    assert_eq!(server.commands_named("LIST").len(), 2);
}

#[tokio::test]
async fn test_list_fallback_detects_dos() {
    let server = FakeServer::start(ServerOptions {
        mlsd: false,
        list_style: ListStyle::Dos,
        ..ServerOptions::default()
    })
    .await;
    server.add_file("/report.doc", b"12345");
    server.add_dir("/logs");

    let mut client = logged_in(&server).await;
    let all = client.list_all().await.unwrap();

    assert_eq!(client.dialect(), Some(ListingDialect::Dos));
    assert_eq!(names(&all), vec!["logs", "report.doc"]);
    let report = all.iter().find(|n| n.name == "report.doc").unwrap();
    assert_eq!(report.kind, NodeKind::File);
    assert_eq!(report.size, 5);
}

#[tokio::test]
async fn test_pasv_fallback() {
    let server = FakeServer::start(ServerOptions {
        epsv: false,
        ..ServerOptions::default()
    })
    .await;
    server.add_file("/a.txt", b"a");

    let mut client = logged_in(&server).await;
    let files = client.list_files().await.unwrap();

    assert_eq!(names(&files), vec!["a.txt"]);
    assert_eq!(server.commands_named("EPSV").len(), 1);
    assert_eq!(server.commands_named("PASV").len(), 1);
}

#[tokio::test]
async fn test_node_stream() {
    let server = FakeServer::start(ServerOptions::default()).await;
    server.add_file("/one.txt", b"1");
    server.add_file("/two.txt", b"22");
    server.add_dir("/skip");

    let mut client = logged_in(&server).await;
    let mut stream = client.list_files_stream(None).await.unwrap();
    let mut seen = Vec::new();
    while let Some(node) = stream.next_node().await.unwrap() {
        seen.push(node);
    }
    stream.finish().await.unwrap();

    assert_eq!(names(&seen), vec!["one.txt", "two.txt"]);
    assert_eq!(client.file_size("/two.txt").await.unwrap(), 2);
}

#[tokio::test]
async fn test_upload_download_rename_delete() {
    let server = FakeServer::start(ServerOptions::default()).await;
    let mut client = logged_in(&server).await;
    let payload: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();

    let mut upload = client.open_write_stream("/up/dir/file.bin").await.unwrap();
    upload.write_all(&payload).await.unwrap();
    upload.finish().await.unwrap();

    assert!(server.is_dir("/up/dir"));
    assert_eq!(server.file("/up/dir/file.bin").unwrap(), payload);
    assert_eq!(client.working_directory(), "/");
    assert_eq!(
        client.file_size("/up/dir/file.bin").await.unwrap(),
        payload.len() as u64
    );

    let mut download = client.open_read_stream("/up/dir/file.bin").await.unwrap();
    let mut received = Vec::new();
    download.read_to_end(&mut received).await.unwrap();
    download.finish().await.unwrap();
    assert_eq!(received, payload);

    client
        .rename("/up/dir/file.bin", "/up/dir/moved.bin")
        .await
        .unwrap();
    assert!(!server.exists("/up/dir/file.bin"));
    assert!(server.exists("/up/dir/moved.bin"));

    client.delete_file("/up/dir/moved.bin").await.unwrap();
    assert!(!server.exists("/up/dir/moved.bin"));
}

#[tokio::test]
async fn test_download_missing_file() {
    let server = FakeServer::start(ServerOptions::default()).await;
    let mut client = logged_in(&server).await;

    let err = client.open_read_stream("/missing.txt").await.unwrap_err();
    assert_eq!(err.code(), Some(550));

    // Session still usable.
    assert!(client.list_all().await.is_ok());
}

#[tokio::test]
async fn test_create_directory_restores_working_directory() {
    let server = FakeServer::start(ServerOptions::default()).await;
    server.add_dir("/work");
    let mut client = logged_in(&server).await;
    client.change_working_directory("/work").await.unwrap();

    client.create_directory("/x/y/z").await.unwrap();
    client.create_directory("rel/sub").await.unwrap();

    assert!(server.is_dir("/x/y/z"));
    assert!(server.is_dir("/work/rel/sub"));
    assert_eq!(client.working_directory(), "/work");
}

#[tokio::test]
async fn test_recursive_delete() {
    let server = FakeServer::start(ServerOptions::default()).await;
    server.add_dir("/data");
    server.add_file("/data/a.txt", b"a");
    server.add_dir("/data/sub");
    server.add_file("/data/sub/b.txt", b"b");
    server.add_dir("/data/sub/deeper");
    server.add_file("/data/sub/deeper/c.txt", b"c");
    server.add_dir("/keep");

    let mut client = logged_in(&server).await;
    client.delete_directory("/data").await.unwrap();

    assert!(!server.exists("/data"));
    assert!(!server.exists("/data/sub/deeper/c.txt"));
    assert!(server.is_dir("/keep"));
    assert_eq!(client.working_directory(), "/");
    assert_eq!(
        server.commands_named("DELE"),
        vec!["DELE a.txt", "DELE b.txt", "DELE c.txt"]
    );
}

#[tokio::test]
async fn test_delete_root_is_noop() {
    let server = FakeServer::start(ServerOptions::default()).await;
    let mut client = logged_in(&server).await;

    client.delete_directory("/").await.unwrap();

    assert!(server.commands_named("RMD").is_empty());
    assert!(server.is_dir("/"));
}

#[tokio::test]
async fn test_send_raw_returns_errors_as_replies() {
    let server = FakeServer::start(ServerOptions::default()).await;
    let mut client = logged_in(&server).await;

    let noop = client.send_raw("NOOP").await.unwrap();
    assert_eq!(noop.code, StatusCode::COMMAND_OK);

    let unknown = client.send_raw("SITE CHMOD 644 x").await.unwrap();
    assert_eq!(unknown.code, StatusCode::SYNTAX_ERROR);

    assert!(matches!(
        client.send_raw("NOOP\r\nDELE x").await,
        Err(Error::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_logout_and_login_again() {
    let server = FakeServer::start(ServerOptions::default()).await;
    let mut client = logged_in(&server).await;

    client.logout().await.unwrap();
    assert!(!client.is_connected());
    assert!(server.commands().contains(&"QUIT".to_string()));

    client.login().await.unwrap();
    assert!(client.is_authenticated());
    assert_eq!(server.commands_named("USER").len(), 2);
}

#[tokio::test]
async fn test_login_accepts_superfluous_pass() {
    let server = FakeServer::start(ServerOptions::default()).await;
    let config = server.config().credentials("guest", "anything").build();

    let client = FtpClient::connect(config).await.unwrap();

    assert!(client.is_authenticated());
    assert_eq!(server.commands_named("PASS"), vec!["PASS anything"]);
}

async fn sortable_server(options: ServerOptions) -> FakeServer {
    let server = FakeServer::start(options).await;
    server.add_file_modified("/b.txt", b"b", "20231201000000");
    server.add_file_modified("/a.txt", b"a", "20240301000000");
    server.add_file_modified("/c.txt", b"c", "20240201000000");
    server.add_dir("/d");
    server
}

#[tokio::test]
async fn test_mlsd_sort_is_applied_client_side() {
    let server = sortable_server(ServerOptions::default()).await;
    let mut client = logged_in(&server).await;

    let nodes = client.list(None, Some(DirSort::Alphabetical)).await.unwrap();
    assert_eq!(ordered(&nodes), vec!["a.txt", "b.txt", "c.txt", "d"]);

    let nodes = client
        .list(None, Some(DirSort::AlphabeticalReverse))
        .await
        .unwrap();
    assert_eq!(ordered(&nodes), vec!["d", "c.txt", "b.txt", "a.txt"]);

    let nodes = client
        .list(Some(NodeKind::File), Some(DirSort::ModifiedTimestampReverse))
        .await
        .unwrap();
    assert_eq!(ordered(&nodes), vec!["a.txt", "c.txt", "b.txt"]);

    assert_eq!(server.commands_named("MLSD"), vec!["MLSD", "MLSD", "MLSD"]);
}

#[tokio::test]
async fn test_list_sort_is_sent_as_flag() {
    let server = sortable_server(ServerOptions {
        feat: false,
        ..ServerOptions::default()
    })
    .await;
    let mut client = logged_in(&server).await;

    let nodes = client
        .list(None, Some(DirSort::ModifiedTimestampReverse))
        .await
        .unwrap();
    // The server ignores the flag; its order is kept as returned.
    assert_eq!(ordered(&nodes), vec!["a.txt", "b.txt", "c.txt", "d"]);

    let nodes = client
        .list(None, Some(DirSort::AlphabeticalReverse))
        .await
        .unwrap();
    assert_eq!(ordered(&nodes), vec!["a.txt", "b.txt", "c.txt", "d"]);

    client.list_all().await.unwrap();
    assert_eq!(
        server.commands_named("LIST"),
        vec!["LIST -t", "LIST -r", "LIST"]
    );
}

#[tokio::test]
async fn test_mlsd_stream_sorted() {
    let server = sortable_server(ServerOptions::default()).await;
    let mut client = logged_in(&server).await;

    let mut stream = client
        .list_stream(None, Some(DirSort::AlphabeticalReverse))
        .await
        .unwrap();
    let mut seen = Vec::new();
    while let Some(node) = stream.next_node().await.unwrap() {
        seen.push(node);
    }
    stream.finish().await.unwrap();
    assert_eq!(ordered(&seen), vec!["d", "c.txt", "b.txt", "a.txt"]);

    let mut stream = client
        .list_files_stream(Some(DirSort::ModifiedTimestampReverse))
        .await
        .unwrap();
    let mut seen = Vec::new();
    while let Some(node) = stream.next_node().await.unwrap() {
        seen.push(node);
    }
    stream.finish().await.unwrap();
    assert_eq!(ordered(&seen), vec!["a.txt", "c.txt", "b.txt"]);
}

#[tokio::test]
async fn test_list_stream_sends_sort_flag() {
    let server = sortable_server(ServerOptions {
        mlsd: false,
        ..ServerOptions::default()
    })
    .await;
    let mut client = logged_in(&server).await;

    let mut stream = client
        .list_files_stream(Some(DirSort::AlphabeticalReverse))
        .await
        .unwrap();
    let mut seen = Vec::new();
    while let Some(node) = stream.next_node().await.unwrap() {
        seen.push(node);
    }
    stream.finish().await.unwrap();
    assert_eq!(ordered(&seen), vec!["a.txt", "b.txt", "c.txt"]);
    assert_eq!(client.dialect(), Some(ListingDialect::Unix));
    assert_eq!(server.commands_named("LIST"), vec!["LIST -r"]);
}

#[tokio::test]
async fn test_recursive_delete_skips_named_cdir_entries() {
    let server = FakeServer::start(ServerOptions::default()).await;
    server.add_dir("/test");
    server.add_file("/test/one.txt", b"1");
    server.add_dir("/test/inner");

    let mut client = logged_in(&server).await;
    client.delete_directory("test").await.unwrap();

    assert!(!server.exists("/test"));
    assert_eq!(server.commands_named("DELE"), vec!["DELE one.txt"]);
}

#[tokio::test]
async fn test_dropped_listing_keeps_replies_in_step() {
    let server = FakeServer::start(ServerOptions::default()).await;
    for i in 0..500 {
        server.add_file(&format!("/file{i:03}.txt"), b"x");
    }
    let mut client = logged_in(&server).await;

    let mut stream = client.list_files_stream(None).await.unwrap();
    assert!(stream.next_node().await.unwrap().is_some());
    drop(stream);

    assert_eq!(client.print_working_directory().await.unwrap(), "/");
    assert_eq!(client.file_size("/file007.txt").await.unwrap(), 1);
    assert_eq!(client.list_files().await.unwrap().len(), 500);
}

#[tokio::test]
async fn test_dropped_download_keeps_replies_in_step() {
    let server = FakeServer::start(ServerOptions::default()).await;
    server.add_file("/big.bin", &vec![7u8; 4 * 1024 * 1024]);
    server.add_file("/small.txt", b"abc");
    let mut client = logged_in(&server).await;

    let mut download = client.open_read_stream("/big.bin").await.unwrap();
    let mut head = [0u8; 16];
    download.read_exact(&mut head).await.unwrap();
    assert_eq!(head, [7u8; 16]);
    drop(download);

    assert_eq!(client.file_size("/small.txt").await.unwrap(), 3);
    let mut download = client.open_read_stream("/small.txt").await.unwrap();
    let mut received = Vec::new();
    download.read_to_end(&mut received).await.unwrap();
    download.finish().await.unwrap();
    assert_eq!(received, b"abc");
}
