//! # ftpkit-listing
//!
//! Directory listing parsers for FTP servers.
//!
//! ## Features
//!
//! - **Unix**: `ls -l` output, including Stingray servers without owner columns
//! - **DOS**: IIS style `MM-DD-YY  HH:MMAM  <DIR>` listings
//! - **MLSD**: RFC 3659 machine-readable facts
//! - **Dialect sniffing**: commit to a `LIST` dialect from the first line
//!
//! All parsers are pure functions over a single line; nothing here performs I/O.
//!
//! ## Quick Start
//!
//! ```ignore
//! use ftpkit_listing::{ListingParser, NodeKind};
//!
//! let mut parser = ListingParser::list();
//! for line in listing.lines() {
//!     if let Some(node) = parser.feed(line)? {
//!         println!("{} {} {}", node.kind, node.size, node.name);
//!     }
//! }
//! ```
//!
//! ### Parsing a Single Line
//!
//! ```ignore
//! use ftpkit_listing::ListingDialect;
//!
//! let node = ListingDialect::Mlsd
//!     .parse("type=file;size=100;modify=20240101120000; a b.txt")?
//!     .unwrap();
//! assert_eq!(node.name, "a b.txt");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod date;
mod dialect;
mod error;
mod node;
mod sort;

pub mod dos;
pub mod mlsd;
pub mod unix;

pub use date::{parse_dos_date, parse_mlsd_timestamp, parse_unix_date};
pub use dialect::{ListingDialect, ListingParser};
pub use error::{Error, Result};
pub use node::{NodeInformation, NodeKind};
pub use sort::DirSort;
