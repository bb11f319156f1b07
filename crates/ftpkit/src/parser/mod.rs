//! FTP reply parser.
//!
//! Replies are single-line (`226 Transfer complete`) or multi-line:
//!
//! ```text
//! 211-Features:
//!  MLSD
//!  UTF8
//! 211 End
//! ```
//!
//! A block opened with `NNN-` only completes on a `NNN ` line with the same
//! code. Body lines in between are kept verbatim.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::types::{Response, StatusCode};

static REPLY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{3})(?:([ -])(.*))?$")
        .unwrap_or_else(|e| unreachable!("invalid reply line pattern: {e}"))
});

/// One physical reply line split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyLine {
    /// Reply code, or [`StatusCode::UNDEFINED`] if the line has none.
    pub code: StatusCode,
    /// Text after the separator.
    pub message: String,
    /// True if the separator is `-`.
    pub is_continuation: bool,
}

/// Splits a reply line into code, message and continuation marker.
///
/// Lines that do not start with three digits yield [`StatusCode::UNDEFINED`]
/// and an empty message.
#[must_use]
pub fn parse_line(line: &str) -> ReplyLine {
    let Some(captures) = REPLY_LINE.captures(line) else {
        return ReplyLine {
            code: StatusCode::UNDEFINED,
            message: String::new(),
            is_continuation: false,
        };
    };

    let code = captures
        .get(1)
        .and_then(|m| m.as_str().parse().ok())
        .map_or(StatusCode::UNDEFINED, StatusCode::new);

    ReplyLine {
        code,
        message: captures.get(3).map_or("", |m| m.as_str()).to_string(),
        is_continuation: captures.get(2).is_some_and(|m| m.as_str() == "-"),
    }
}

/// Continuation state of the reply parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParserState {
    /// Between replies.
    #[default]
    Idle,
    /// Inside a `211-` FEAT block.
    AccumulatingFeat,
    /// Inside a `220-` welcome banner.
    AccumulatingMotd,
    /// Inside any other multi-line block.
    Accumulating(StatusCode),
}

impl ParserState {
    fn for_code(code: StatusCode) -> Self {
        match code {
            StatusCode::SYSTEM_HELP => Self::AccumulatingFeat,
            StatusCode::SERVICE_READY => Self::AccumulatingMotd,
            other => Self::Accumulating(other),
        }
    }

    const fn code(self) -> Option<StatusCode> {
        match self {
            Self::Idle => None,
            Self::AccumulatingFeat => Some(StatusCode::SYSTEM_HELP),
            Self::AccumulatingMotd => Some(StatusCode::SERVICE_READY),
            Self::Accumulating(code) => Some(code),
        }
    }
}

/// Incremental reply parser fed one line at a time.
#[derive(Debug, Default)]
pub struct ReplyParser {
    state: ParserState,
    additional: Vec<String>,
    raw: Vec<String>,
}

impl ReplyParser {
    /// Creates a parser in the idle state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current continuation state.
    #[must_use]
    pub const fn state(&self) -> ParserState {
        self.state
    }

    /// Feeds one line (without its terminator).
    ///
    /// Returns a [`Response`] once a reply is complete.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for an unparsable line outside a block and
    /// for a line carrying a different code inside a block. The parser is reset
    /// to idle in both cases.
    pub fn feed(&mut self, line: &str) -> Result<Option<Response>> {
        let parsed = parse_line(line);

        let Some(open) = self.state.code() else {
            return self.feed_idle(line, parsed);
        };

        self.raw.push(line.to_string());

        if parsed.code.is_undefined() {
            self.additional.push(line.to_string());
            return Ok(None);
        }

        if parsed.code != open {
            self.reset();
            return Err(Error::Protocol(format!(
                "reply {} arrived inside multi-line {open} block",
                parsed.code
            )));
        }

        if parsed.is_continuation {
            self.additional.push(parsed.message);
            return Ok(None);
        }

        let response = Response {
            code: open,
            message: parsed.message,
            additional: std::mem::take(&mut self.additional),
            raw: std::mem::take(&mut self.raw),
        };
        self.state = ParserState::Idle;
        Ok(Some(response))
    }

    fn feed_idle(&mut self, line: &str, parsed: ReplyLine) -> Result<Option<Response>> {
        if parsed.code.is_undefined() {
            return Err(Error::Protocol(format!("unparsable reply line: {line:?}")));
        }

        if parsed.is_continuation {
            self.state = ParserState::for_code(parsed.code);
            self.raw.push(line.to_string());
            return Ok(None);
        }

        Ok(Some(Response {
            code: parsed.code,
            message: parsed.message,
            additional: Vec::new(),
            raw: vec![line.to_string()],
        }))
    }

    /// Drops any partially accumulated reply.
    pub fn reset(&mut self) {
        self.state = ParserState::Idle;
        self.additional.clear();
        self.raw.clear();
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
    use proptest::prelude::*;

    use super::*;

    fn feed_all(parser: &mut ReplyParser, lines: &[&str]) -> Result<Vec<Response>> {
        let mut out = Vec::new();
        for line in lines {
            if let Some(response) = parser.feed(line)? {
                out.push(response);
            }
        }
        Ok(out)
    }

    #[test]
    fn test_parse_terminal_line() {
        let line = parse_line("226 Transfer complete");
        assert_eq!(line.code, StatusCode::CLOSING_DATA);
        assert_eq!(line.message, "Transfer complete");
        assert!(!line.is_continuation);
    }

    #[test]
    fn test_parse_continuation_line() {
        let line = parse_line("211-Features:");
        assert_eq!(line.code, StatusCode::SYSTEM_HELP);
        assert_eq!(line.message, "Features:");
        assert!(line.is_continuation);
    }

    #[test]
    fn test_parse_bare_code() {
        let line = parse_line("200");
        assert_eq!(line.code, StatusCode::COMMAND_OK);
        assert_eq!(line.message, "");
    }

    #[test]
    fn test_parse_garbage() {
        for input in ["", " MLSD", "ab1 nope", "2024-01-01", "22 short"] {
            let line = parse_line(input);
            assert_eq!(line.code, StatusCode::UNDEFINED, "{input:?}");
            assert_eq!(line.message, "");
        }
    }

    #[test]
    fn test_feat_block() {
        let mut parser = ReplyParser::new();
        let responses = feed_all(&mut parser, &["211-Features:", "MLSD", "UTF8", "211 End"]).unwrap();

        assert_eq!(responses.len(), 1);
        let response = &responses[0];
        assert_eq!(response.code, StatusCode::SYSTEM_HELP);
        assert_eq!(response.message, "End");
        assert_eq!(response.additional, vec!["MLSD", "UTF8"]);
        assert_eq!(response.raw.len(), 4);
        assert_eq!(parser.state(), ParserState::Idle);
    }

    #[test]
    fn test_state_while_accumulating() {
        let mut parser = ReplyParser::new();
        assert!(parser.feed("220-Welcome").unwrap().is_none());
        assert_eq!(parser.state(), ParserState::AccumulatingMotd);
        assert!(parser.feed("220-Second line").unwrap().is_none());

        let response = parser.feed("220 Ready").unwrap().unwrap();
        assert_eq!(response.code, StatusCode::SERVICE_READY);
        assert_eq!(response.additional, vec!["Second line"]);
    }

    #[test]
    fn test_other_block_code() {
        let mut parser = ReplyParser::new();
        assert!(parser.feed("230-Welcome back").unwrap().is_none());
        assert_eq!(parser.state(), ParserState::Accumulating(StatusCode::LOGGED_IN));
        let response = parser.feed("230 Logged in").unwrap().unwrap();
        assert_eq!(response.code, StatusCode::LOGGED_IN);
    }

    #[test]
    fn test_mismatched_terminator_is_error() {
        let mut parser = ReplyParser::new();
        let result = feed_all(&mut parser, &["211-Features:", "MLSD", "200 End"]);
        assert!(matches!(result, Err(Error::Protocol(_))));
        assert_eq!(parser.state(), ParserState::Idle);

        // Parser is usable again after the error.
        let response = parser.feed("200 OK").unwrap().unwrap();
        assert_eq!(response.code, StatusCode::COMMAND_OK);
        assert!(response.additional.is_empty());
    }

    #[test]
    fn test_unparsable_line_when_idle() {
        let mut parser = ReplyParser::new();
        assert!(matches!(parser.feed("hello"), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_consecutive_replies() {
        let mut parser = ReplyParser::new();
        let responses = feed_all(&mut parser, &["150 Opening", "226 Done"]).unwrap();
        let codes: Vec<u16> = responses.iter().map(|r| r.code.as_u16()).collect();
        assert_eq!(codes, vec![150, 226]);
    }

    proptest! {
        #[test]
        fn terminal_lines_round_trip(code in 100u16..600, message in "[ -~]{0,64}") {
            let line = parse_line(&format!("{code} {message}"));
            prop_assert_eq!(line.code, StatusCode::new(code));
            prop_assert_eq!(line.message, message);
            prop_assert!(!line.is_continuation);
        }

        #[test]
        fn continuation_lines_round_trip(code in 100u16..600, message in "[ -~]{0,64}") {
            let line = parse_line(&format!("{code}-{message}"));
            prop_assert_eq!(line.code, StatusCode::new(code));
            prop_assert_eq!(line.message, message);
            prop_assert!(line.is_continuation);
        }
    }
}
