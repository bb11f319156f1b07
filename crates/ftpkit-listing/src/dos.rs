//! DOS / IIS style listings.
//!
//! ```text
//! 01-01-24  10:00AM       <DIR>          sub
//! 01-01-24  10:00AM                 4096 a.txt
//! ```

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::date::parse_dos_date;
use crate::node::{NodeInformation, NodeKind};

static DIRECTORY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<modify>\d+-\d+-\d+\s+\d+:\d+\w+)\s+<DIR>\s+(?P<name>.*)$")
        .unwrap_or_else(|e| unreachable!("invalid dos directory pattern: {e}"))
});

static FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<modify>\d+-\d+-\d+\s+\d+:\d+\w+)\s+(?P<size>\d+)\s+(?P<name>.*)$")
        .unwrap_or_else(|e| unreachable!("invalid dos file pattern: {e}"))
});

/// Returns true if the line looks like a DOS listing entry.
#[must_use]
pub fn test(line: &str) -> bool {
    DIRECTORY.is_match(line) || FILE.is_match(line)
}

/// Parses one DOS listing line, trying the directory form first.
#[must_use]
pub fn parse(line: &str) -> Option<NodeInformation> {
    if let Some(captures) = DIRECTORY.captures(line) {
        return Some(NodeInformation {
            name: group(&captures, "name").to_string(),
            size: 0,
            modified: parse_dos_date(group(&captures, "modify")),
            kind: NodeKind::Directory,
        });
    }

    FILE.captures(line).map(|captures| NodeInformation {
        name: group(&captures, "name").to_string(),
        size: group(&captures, "size").parse().unwrap_or(0),
        modified: parse_dos_date(group(&captures, "modify")),
        kind: NodeKind::File,
    })
}

fn group<'a>(captures: &Captures<'a>, name: &str) -> &'a str {
    captures.name(name).map_or("", |m| m.as_str())
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
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn test_parse_directory() {
        let node = parse("01-01-24  10:00AM  <DIR>  sub").unwrap();
        assert_eq!(node.kind, NodeKind::Directory);
        assert_eq!(node.name, "sub");
        assert_eq!(node.size, 0);
        assert_eq!(
            node.modified,
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn test_parse_file() {
        let node = parse("01-01-24  10:00AM  4096  a.txt").unwrap();
        assert_eq!(node.kind, NodeKind::File);
        assert_eq!(node.size, 4096);
        assert_eq!(node.name, "a.txt");
    }

    #[test]
    fn test_parse_name_with_spaces() {
        let node = parse("02-14-24  03:30PM                 12 annual report.docx").unwrap();
        assert_eq!(node.name, "annual report.docx");
        assert_eq!(node.size, 12);
    }

    #[test]
    fn test_sniff() {
        assert!(test("01-01-24  10:00AM  <DIR>  sub"));
        assert!(test("01-01-24  10:00AM  4096  a.txt"));
        assert!(!test("-rw-r--r-- 1 user group 1234 Jan 01 2024 file.txt"));
        assert_eq!(parse("not a listing"), None);
    }
}
