//! Connection management for FTP.

mod config;
mod control;
mod data;
mod framed;
mod stream;

pub use config::{
    ClientIdentity, Config, ConfigBuilder, Encryption, IpVersion, TlsVersion, TransferMode,
};
pub(crate) use config::normalize_directory;
pub use control::{ControlChannel, ControlGuard};
pub use data::{DataLines, DataTarget, Transfer, negotiate_passive, parse_epsv_port, parse_pasv_port};
pub use framed::{LineReader, MAX_LINE_LENGTH};
pub use stream::{FtpStream, TlsSettings, connect};
