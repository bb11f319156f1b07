//! Error types for FTP operations.

use std::io;
use std::time::Duration;

/// Result type alias for FTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// FTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller passed an argument the operation cannot use.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation requires a logged-in session.
    #[error("Not logged in")]
    NotLoggedIn,

    /// Reply framing or payload could not be understood.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Server answered with a code the command does not accept.
    #[error("Unexpected reply {code}: {message}")]
    UnexpectedReply {
        /// Reply code.
        code: u16,
        /// Reply text.
        message: String,
    },

    /// Directory listing line could not be parsed.
    #[error("Listing error: {0}")]
    Listing(#[from] ftpkit_listing::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Host is not a valid TLS server name.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Host name could not be resolved.
    #[error("Could not resolve {0}")]
    Resolve(String),

    /// Peer closed the connection.
    #[error("Connection closed")]
    ConnectionClosed,

    /// No data arrived within the configured timeout.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Server returned a well-formed error reply.
    #[error("FTP error {code}: {message}")]
    Server {
        /// Reply code (e.g., 550).
        code: u16,
        /// Error message from server.
        message: String,
    },
}

impl Error {
    /// Creates a server error from a reply code and message.
    #[must_use]
    pub fn server(code: u16, message: impl Into<String>) -> Self {
        Self::Server {
            code,
            message: message.into(),
        }
    }

    /// Creates an unexpected-reply error.
    #[must_use]
    pub fn unexpected(code: u16, message: impl Into<String>) -> Self {
        Self::UnexpectedReply {
            code,
            message: message.into(),
        }
    }

    /// Returns the reply code carried by the error, if any.
    #[must_use]
    pub const fn code(&self) -> Option<u16> {
        match self {
            Self::Server { code, .. } | Self::UnexpectedReply { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Server { code, .. } if *code >= 500 && *code < 600)
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Server { code, .. } if *code >= 400 && *code < 500)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(Error::server(550, "No such file").is_permanent());
        assert!(Error::server(421, "Too many users").is_transient());
        assert!(!Error::unexpected(550, "x").is_permanent());
        assert!(!Error::ConnectionClosed.is_transient());
    }

    #[test]
    fn test_code() {
        assert_eq!(Error::server(553, "x").code(), Some(553));
        assert_eq!(Error::unexpected(150, "x").code(), Some(150));
        assert_eq!(Error::NotLoggedIn.code(), None);
    }

    #[test]
    fn test_display_keeps_server_text() {
        let err = Error::server(550, "/pub: Permission denied");
        assert_eq!(err.to_string(), "FTP error 550: /pub: Permission denied");
    }
}
