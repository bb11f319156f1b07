//! # ftpkit
//!
//! An async FTP client with explicit and implicit FTPS, passive data
//! connections and directory listing parsing.
//!
//! ## Features
//!
//! - **Pipelined control channel**: A background task parses replies while
//!   commands are serialised by a mutex, so replies always match commands
//! - **Passive mode**: `EPSV` with automatic `PASV` fallback
//! - **TLS via rustls**: `AUTH TLS` or implicit TLS, with data channel protection
//! - **Listings**: `MLSD` when available, otherwise `LIST` in Unix or DOS format
//! - **Recursive directories**: Create missing parents, delete non-empty trees
//!
//! ## Quick Start
//!
//! ```ignore
//! use ftpkit::{Config, Encryption, FtpClient};
//! use tokio::io::AsyncReadExt;
//!
//! #[tokio::main]
//! async fn main() -> ftpkit::Result<()> {
//!     let config = Config::builder("ftp.example.com")
//!         .credentials("user", "secret")
//!         .encryption(Encryption::Explicit)
//!         .build();
//!
//!     let mut client = FtpClient::connect(config).await?;
//!
//!     for node in client.list_files().await? {
//!         println!("{} ({} bytes)", node.name, node.size);
//!     }
//!
//!     let mut file = client.open_read_stream("readme.txt").await?;
//!     let mut contents = Vec::new();
//!     file.read_to_end(&mut contents).await?;
//!     file.finish().await?;
//!
//!     client.logout().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`command`]: Command envelopes and their wire form
//! - [`parser`]: Reply line parsing and multi-line accumulation
//! - [`connection`]: Configuration, transport, control and data channels
//! - [`types`]: Reply codes and parsed replies

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod resolver;

pub mod command;
pub mod connection;
pub mod parser;
pub mod types;

pub use client::{Encoding, FileTransfer, FtpClient, NodeStream};
pub use command::Command;
pub use connection::{Config, ConfigBuilder, Encryption, IpVersion, TlsVersion, TransferMode};
pub use error::{Error, Result};
pub use ftpkit_listing::{DirSort, ListingDialect, NodeInformation, NodeKind};
pub use parser::{ReplyParser, parse_line};
pub use resolver::Resolver;
pub use types::{Response, StatusCode};
