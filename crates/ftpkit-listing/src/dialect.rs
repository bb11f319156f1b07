//! Listing dialect selection.
//!
//! A `LIST` listing commits to a dialect by sniffing its first non-empty line
//! (Unix before DOS) and keeps it for the rest of the listing. `MLSD` listings
//! are always parsed as MLSD.

use crate::error::Result;
use crate::node::NodeInformation;
use crate::{dos, mlsd, unix};

/// A textual directory listing format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ListingDialect {
    /// Unix `ls -l` output.
    Unix,
    /// DOS / IIS output.
    Dos,
    /// RFC 3659 MLSD facts.
    Mlsd,
}

impl ListingDialect {
    /// Dialects tried, in order, against the first line of a `LIST` listing.
    pub const LIST_DIALECTS: [Self; 2] = [Self::Unix, Self::Dos];

    /// Cheap format sniff.
    #[must_use]
    pub fn test(self, line: &str) -> bool {
        match self {
            Self::Unix => unix::test(line),
            Self::Dos => dos::test(line),
            Self::Mlsd => mlsd::test(line),
        }
    }

    /// Parses one line in this dialect.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed MLSD records and Unix entries with an
    /// unmapped type character.
    pub fn parse(self, line: &str) -> Result<Option<NodeInformation>> {
        match self {
            Self::Unix => unix::parse(line),
            Self::Dos => Ok(dos::parse(line)),
            Self::Mlsd => mlsd::parse(line),
        }
    }

    /// Picks the first `LIST` dialect whose sniff accepts the line.
    #[must_use]
    pub fn detect(line: &str) -> Option<Self> {
        Self::LIST_DIALECTS.into_iter().find(|d| d.test(line))
    }
}

impl std::fmt::Display for ListingDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unix => f.write_str("unix"),
            Self::Dos => f.write_str("dos"),
            Self::Mlsd => f.write_str("mlsd"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Sniffing,
    Committed(ListingDialect),
    Unrecognised,
}

/// Line-by-line parser for one listing.
#[derive(Debug, Clone)]
pub struct ListingParser {
    state: State,
}

impl ListingParser {
    /// Parser for `LIST` output; the dialect is chosen from the first line.
    #[must_use]
    pub const fn list() -> Self {
        Self {
            state: State::Sniffing,
        }
    }

    /// Parser for `MLSD` output.
    #[must_use]
    pub const fn mlsd() -> Self {
        Self {
            state: State::Committed(ListingDialect::Mlsd),
        }
    }

    /// Returns the committed dialect, if one has been chosen.
    #[must_use]
    pub const fn dialect(&self) -> Option<ListingDialect> {
        match self.state {
            State::Committed(dialect) => Some(dialect),
            State::Sniffing | State::Unrecognised => None,
        }
    }

    /// Returns true once the first line matched no dialect.
    ///
    /// The remaining lines are discarded; the listing is treated as empty.
    #[must_use]
    pub fn is_unrecognised(&self) -> bool {
        self.state == State::Unrecognised
    }

    /// Feeds one raw line.
    ///
    /// Blank lines and a leading `total N` summary yield `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Propagates the committed dialect's parse error.
    pub fn feed(&mut self, line: &str) -> Result<Option<NodeInformation>> {
        if line.trim().is_empty() {
            return Ok(None);
        }

        let dialect = match self.state {
            State::Committed(dialect) => dialect,
            State::Unrecognised => return Ok(None),
            State::Sniffing => {
                if is_total_line(line) {
                    return Ok(None);
                }
                match ListingDialect::detect(line) {
                    Some(dialect) => {
                        self.state = State::Committed(dialect);
                        dialect
                    }
                    None => {
                        self.state = State::Unrecognised;
                        return Ok(None);
                    }
                }
            }
        };

        dialect.parse(line)
    }
}

/// `ls -l` prints `total <blocks>` before the entries.
fn is_total_line(line: &str) -> bool {
    line.trim()
        .strip_prefix("total ")
        .is_some_and(|rest| rest.trim().bytes().all(|b| b.is_ascii_digit()))
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
    use crate::node::NodeKind;

    fn feed_all(parser: &mut ListingParser, lines: &[&str]) -> Vec<NodeInformation> {
        lines
            .iter()
            .filter_map(|line| parser.feed(line).unwrap())
            .collect()
    }

    #[test]
    fn test_detect_order() {
        assert_eq!(
            ListingDialect::detect("-rw-r--r-- 1 user group 1234 Jan 01 2024 file.txt"),
            Some(ListingDialect::Unix)
        );
        assert_eq!(
            ListingDialect::detect("01-01-24  10:00AM  <DIR>  sub"),
            Some(ListingDialect::Dos)
        );
        assert_eq!(ListingDialect::detect("hello"), None);
    }

    #[test]
    fn test_list_commits_to_first_dialect() {
        let mut parser = ListingParser::list();
        let nodes = feed_all(
            &mut parser,
            &[
                "",
                "total 8",
                "drwxr-xr-x 2 user group 4096 Jan 01 2024 sub",
                "-rw-r--r-- 1 user group 12 Jan 01 2024 a.txt",
                "01-01-24  10:00AM  4096  dos.txt",
            ],
        );

        assert_eq!(parser.dialect(), Some(ListingDialect::Unix));
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].kind, NodeKind::Directory);
        assert_eq!(nodes[1].name, "a.txt");
    }

    #[test]
    fn test_unrecognised_first_line_yields_empty_listing() {
        let mut parser = ListingParser::list();
        let nodes = feed_all(
            &mut parser,
            &["garbage header", "-rw-r--r-- 1 user group 12 Jan 01 2024 a.txt"],
        );

        assert!(parser.is_unrecognised());
        assert!(nodes.is_empty());
    }

    #[test]
    fn test_mlsd_parser() {
        let mut parser = ListingParser::mlsd();
        let nodes = feed_all(
            &mut parser,
            &["type=dir;modify=20240101000000; sub", " ", "type=file;size=3; f"],
        );
        assert_eq!(nodes.len(), 2);
        assert!(parser.feed("nonsense").is_err());
    }

    proptest! {
        #[test]
        fn parse_is_idempotent(name in "[a-zA-Z0-9_. ]{1,24}", size in 0u64..10_000_000) {
            let unix = format!("-rw-r--r-- 1 user group {size} Jan 01 2024 x{name}");
            prop_assert_eq!(
                ListingDialect::Unix.parse(&unix).unwrap(),
                ListingDialect::Unix.parse(&unix).unwrap()
            );

            let mlsd = format!("type=file;size={size};modify=20240101120000; {name}");
            let first = ListingDialect::Mlsd.parse(&mlsd).unwrap();
            prop_assert_eq!(first.clone(), ListingDialect::Mlsd.parse(&mlsd).unwrap());
            prop_assert_eq!(first.map(|n| n.name), Some(name));
        }
    }
}
