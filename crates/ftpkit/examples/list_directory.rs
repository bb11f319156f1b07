#![allow(clippy::doc_markdown, clippy::uninlined_format_args)]
//! Example: Log in and list a remote directory
//!
//! ## Running
//!
//! ```bash
//! FTP_HOST=ftp.example.com FTP_USER=alice FTP_PASSWORD=secret \
//!     cargo run --package ftpkit --example list_directory -- /pub
//! ```
//!
//! Without `FTP_USER` the login is anonymous. Set `FTP_TLS=1` for explicit
//! TLS (`AUTH TLS`). `RUST_LOG=ftpkit=debug` shows the protocol exchange.

use anyhow::Context;
use ftpkit::{Config, Encryption, FtpClient, NodeKind};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let host = std::env::var("FTP_HOST").context("FTP_HOST is not set")?;
    let directory = std::env::args().nth(1).unwrap_or_else(|| "/".to_string());

    let mut builder = Config::builder(host);
    if let Ok(user) = std::env::var("FTP_USER") {
        let password = std::env::var("FTP_PASSWORD").unwrap_or_default();
        builder = builder.credentials(user, password);
    }
    if std::env::var("FTP_TLS").is_ok_and(|v| v == "1") {
        builder = builder.encryption(Encryption::Explicit);
    }

    let mut client = FtpClient::connect(builder.build())
        .await
        .context("login failed")?;
    println!("✓ Logged in, features: {:?}", client.features());

    client.change_working_directory(&directory).await?;
    for node in client.list_all().await? {
        let marker = match node.kind {
            NodeKind::Directory => "d",
            NodeKind::SymbolicLink => "l",
            NodeKind::File => "-",
        };
        println!("{} {:>12} {} {}", marker, node.size, node.modified, node.name);
    }
    println!("(dialect: {:?})", client.dialect());

    client.logout().await?;
    Ok(())
}
