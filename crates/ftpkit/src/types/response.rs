//! Parsed FTP replies.

use super::StatusCode;
use crate::error::{Error, Result};

/// One logical FTP reply, possibly spanning several lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Reply code.
    pub code: StatusCode,
    /// Text of the terminating line.
    pub message: String,
    /// Body lines of a multi-line reply, between the opening and closing line.
    pub additional: Vec<String>,
    /// Every physical line of the reply, as received.
    pub raw: Vec<String>,
}

impl Response {
    /// Creates a single-line reply.
    #[must_use]
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            code,
            raw: vec![format!("{code} {message}")],
            message,
            additional: Vec::new(),
        }
    }

    /// Returns true for 1xx-3xx replies.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// Returns true for 4xx/5xx and undefined replies.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.code.is_error()
    }

    /// Returns true if the code is one of `codes`.
    #[must_use]
    pub fn is_any(&self, codes: &[StatusCode]) -> bool {
        codes.contains(&self.code)
    }

    /// Passes the reply through if its code is one of `codes`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Server`] for 4xx/5xx replies and
    /// [`Error::UnexpectedReply`] for any other code.
    pub fn expect_one_of(self, codes: &[StatusCode]) -> Result<Self> {
        if self.is_any(codes) {
            return Ok(self);
        }
        if self.code.is_transient() || self.code.is_permanent() {
            return Err(Error::server(self.code.as_u16(), self.message));
        }
        Err(Error::unexpected(self.code.as_u16(), self.message))
    }

    /// Returns the full reply text, one physical line per line.
    #[must_use]
    pub fn raw_text(&self) -> String {
        self.raw.join("\n")
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code, self.message)
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
    fn test_single_line() {
        let response = Response::new(StatusCode::ACTION_OK, "CWD ok");
        assert!(response.is_success());
        assert_eq!(response.raw, vec!["250 CWD ok"]);
        assert_eq!(response.to_string(), "250 CWD ok");
        assert!(response.is_any(&[StatusCode::COMMAND_OK, StatusCode::ACTION_OK]));
    }

    #[test]
    fn test_expect_one_of() {
        let ok = Response::new(StatusCode::ACTION_OK, "done");
        assert!(ok.expect_one_of(&[StatusCode::ACTION_OK]).is_ok());

        let denied = Response::new(StatusCode::ACTION_NOT_TAKEN, "Permission denied");
        let err = denied.expect_one_of(&[StatusCode::ACTION_OK]).unwrap_err();
        assert!(matches!(err, Error::Server { code: 550, ref message } if message == "Permission denied"));

        let odd = Response::new(StatusCode::COMMAND_OK, "ok");
        let err = odd.expect_one_of(&[StatusCode::PATHNAME_CREATED]).unwrap_err();
        assert!(matches!(err, Error::UnexpectedReply { code: 200, .. }));
    }
}
