//! FTP reply codes.

/// Three-digit FTP reply code.
///
/// [`StatusCode::UNDEFINED`] stands in for lines that carry no parsable code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StatusCode(u16);

impl StatusCode {
    /// Creates a new status code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns true for the placeholder of an unparsable line.
    #[must_use]
    pub const fn is_undefined(self) -> bool {
        self.0 == Self::UNDEFINED.0
    }

    /// Returns true for 1xx, 2xx and 3xx replies.
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 >= 100 && self.0 < 400
    }

    /// Returns true for 4xx and 5xx replies and for undefined codes.
    #[must_use]
    pub const fn is_error(self) -> bool {
        !self.is_success()
    }

    /// Returns true if this is a preliminary reply (1xx).
    #[must_use]
    pub const fn is_preliminary(self) -> bool {
        self.0 >= 100 && self.0 < 200
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(self) -> bool {
        self.0 >= 400 && self.0 < 500
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(self) -> bool {
        self.0 >= 500 && self.0 < 600
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

// Reply codes the client interprets
impl StatusCode {
    /// Unparsable reply line.
    pub const UNDEFINED: Self = Self(0);
    /// 125 Data connection already open; transfer starting
    pub const DATA_ALREADY_OPEN: Self = Self(125);
    /// 150 File status okay; about to open data connection
    pub const OPENING_DATA: Self = Self(150);
    /// 200 Command okay
    pub const COMMAND_OK: Self = Self(200);
    /// 202 Command not implemented, superfluous at this site
    pub const COMMAND_SUPERFLUOUS: Self = Self(202);
    /// 211 System status, or system help reply (FEAT)
    pub const SYSTEM_HELP: Self = Self(211);
    /// 213 File status (SIZE)
    pub const FILE_STATUS: Self = Self(213);
    /// 220 Service ready for new user
    pub const SERVICE_READY: Self = Self(220);
    /// 221 Service closing control connection
    pub const CLOSING_CONTROL: Self = Self(221);
    /// 226 Closing data connection; transfer complete
    pub const CLOSING_DATA: Self = Self(226);
    /// 227 Entering Passive Mode
    pub const ENTERING_PASSIVE: Self = Self(227);
    /// 229 Entering Extended Passive Mode
    pub const ENTERING_EXTENDED_PASSIVE: Self = Self(229);
    /// 230 User logged in
    pub const LOGGED_IN: Self = Self(230);
    /// 234 Security data exchange complete (AUTH TLS)
    pub const AUTH_OK: Self = Self(234);
    /// 250 Requested file action okay, completed
    pub const ACTION_OK: Self = Self(250);
    /// 257 Pathname created / current directory
    pub const PATHNAME_CREATED: Self = Self(257);
    /// 331 User name okay, need password
    pub const NEED_PASSWORD: Self = Self(331);
    /// 350 Requested file action pending further information
    pub const PENDING_FURTHER_INFO: Self = Self(350);
    /// 421 Service not available, closing control connection
    pub const SERVICE_UNAVAILABLE: Self = Self(421);
    /// 425 Can't open data connection
    pub const CANT_OPEN_DATA: Self = Self(425);
    /// 500 Syntax error, command unrecognized
    pub const SYNTAX_ERROR: Self = Self(500);
    /// 501 Syntax error in parameters or arguments
    pub const PARAMETER_ERROR: Self = Self(501);
    /// 502 Command not implemented
    pub const NOT_IMPLEMENTED: Self = Self(502);
    /// 530 Not logged in
    pub const NOT_LOGGED_IN: Self = Self(530);
    /// 550 Requested action not taken; file unavailable
    pub const ACTION_NOT_TAKEN: Self = Self(550);
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
    fn test_success_range() {
        assert!(StatusCode::OPENING_DATA.is_success());
        assert!(StatusCode::CLOSING_DATA.is_success());
        assert!(StatusCode::NEED_PASSWORD.is_success());
        assert!(StatusCode::COMMAND_SUPERFLUOUS.is_success());
        assert_eq!(StatusCode::COMMAND_SUPERFLUOUS.as_u16(), 202);
        assert!(!StatusCode::ACTION_NOT_TAKEN.is_success());
    }

    #[test]
    fn test_error_range() {
        assert!(StatusCode::SERVICE_UNAVAILABLE.is_error());
        assert!(StatusCode::ACTION_NOT_TAKEN.is_error());
        assert!(StatusCode::UNDEFINED.is_error());
        assert!(!StatusCode::LOGGED_IN.is_error());
    }

    #[test]
    fn test_transient_and_permanent() {
        assert!(StatusCode::CANT_OPEN_DATA.is_transient());
        assert!(StatusCode::NOT_LOGGED_IN.is_permanent());
        assert!(!StatusCode::ACTION_OK.is_permanent());
    }

    #[test]
    fn test_display_is_zero_padded() {
        assert_eq!(StatusCode::CLOSING_DATA.to_string(), "226");
        assert_eq!(StatusCode::UNDEFINED.to_string(), "000");
    }
}
