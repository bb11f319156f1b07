//! Unix `ls -l` style listings.
//!
//! ```text
//! drwxr-xr-x   2 user group  4096 Jan 01 10:00 dirname
//! -rw-r--r--   1 user group  1234 Jan 01  2024 file.txt
//! -rw-r--r--   1          1234 Jan 01  2024 file.txt     (stingray, no owner/group)
//! ```

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::date::parse_unix_date;
use crate::error::{Error, Result};
use crate::node::{NodeInformation, NodeKind};

/// Standard seven-column form.
static STANDARD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^(?P<permissions>\S{10}\S?)\s+
        (?P<objectcount>\d+)\s+
        (?P<user>\S+)\s+
        (?P<group>\S+)\s+
        (?P<size>\d+)\s+
        (?P<date>\w{3}\s+\d{1,2}\s+(?:\d{1,2}:\d{2}|\d{4}))\s+
        (?P<name>.+)$",
    )
    .unwrap_or_else(|e| unreachable!("invalid unix listing pattern: {e}"))
});

/// Stingray servers omit the owner and group columns.
static STINGRAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^(?P<permissions>\S{10}\S?)\s+
        (?P<objectcount>\d+)\s+
        (?P<size>\d+)\s+
        (?P<date>\w{3}\s+\d{1,2}\s+(?:\d{1,2}:\d{2}|\d{4}))\s+
        (?P<name>.+)$",
    )
    .unwrap_or_else(|e| unreachable!("invalid stingray listing pattern: {e}"))
});

/// Returns true if the line looks like Unix `ls -l` output.
#[must_use]
pub fn test(line: &str) -> bool {
    STANDARD.is_match(line) || STINGRAY.is_match(line)
}

/// Parses one Unix listing line.
///
/// Returns `Ok(None)` for lines that match neither pattern.
///
/// # Errors
///
/// Returns an error if the permission string starts with an unmapped type
/// character (block/char devices, sockets, pipes).
pub fn parse(line: &str) -> Result<Option<NodeInformation>> {
    let Some(captures) = STANDARD.captures(line).or_else(|| STINGRAY.captures(line)) else {
        return Ok(None);
    };

    let kind = node_kind(group(&captures, "permissions"))?;
    let name = group(&captures, "name");
    if name.is_empty() {
        return Err(Error::MissingName(line.to_string()));
    }

    Ok(Some(NodeInformation {
        name: name.to_string(),
        size: group(&captures, "size").parse().unwrap_or(0),
        modified: parse_unix_date(group(&captures, "date")),
        kind,
    }))
}

fn group<'a>(captures: &Captures<'a>, name: &str) -> &'a str {
    captures.name(name).map_or("", |m| m.as_str())
}

fn node_kind(permissions: &str) -> Result<NodeKind> {
    match permissions.chars().next() {
        Some('d') => Ok(NodeKind::Directory),
        Some('-' | 's') => Ok(NodeKind::File),
        Some('l') => Ok(NodeKind::SymbolicLink),
        Some(other) => Err(Error::UnknownNodeKind(other)),
        None => Err(Error::UnknownNodeKind(' ')),
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
    use chrono::{NaiveDate, NaiveDateTime};

    use super::*;

    #[test]
    fn test_parse_file() {
        let node = parse("-rw-r--r-- 1 user group 1234 Jan 01 2024 file.txt")
            .unwrap()
            .unwrap();
        assert_eq!(node.kind, NodeKind::File);
        assert_eq!(node.size, 1234);
        assert_eq!(node.name, "file.txt");
        assert_eq!(
            node.modified,
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn test_parse_directory_keeps_reported_size() {
        let node = parse("drwxr-xr-x   2 ftp  ftp      4096 Mar  5 10:00 pub")
            .unwrap()
            .unwrap();
        assert_eq!(node.kind, NodeKind::Directory);
        assert_eq!(node.size, 4096);
        assert_eq!(node.name, "pub");
        assert_ne!(node.modified, NaiveDateTime::MIN);
    }

    #[test]
    fn test_parse_symlink() {
        let node = parse("lrwxrwxrwx 1 root root 7 Jan 01 2024 current -> v1.2")
            .unwrap()
            .unwrap();
        assert_eq!(node.kind, NodeKind::SymbolicLink);
        assert_eq!(node.name, "current -> v1.2");
    }

    #[test]
    fn test_parse_setuid_is_file() {
        let node = parse("srwxr-xr-x 1 user group 10 Jan 01 2024 tool")
            .unwrap()
            .unwrap();
        assert_eq!(node.kind, NodeKind::File);
    }

    #[test]
    fn test_parse_name_with_spaces() {
        let node = parse("-rw-r--r-- 1 user group 5 Jan 01 2024 my file.txt")
            .unwrap()
            .unwrap();
        assert_eq!(node.name, "my file.txt");
    }

    #[test]
    fn test_parse_stingray() {
        let line = "-r--r--r--   1      1234 Jan 01  2024 report.pdf";
        assert!(test(line));
        let node = parse(line).unwrap().unwrap();
        assert_eq!(node.kind, NodeKind::File);
        assert_eq!(node.size, 1234);
        assert_eq!(node.name, "report.pdf");
    }

    #[test]
    fn test_parse_unknown_kind_is_error() {
        let result = parse("crw-rw-rw- 1 root root 0 Jan 01 2024 null");
        assert_eq!(result, Err(Error::UnknownNodeKind('c')));
    }

    #[test]
    fn test_non_matching_line() {
        assert!(!test("total 12"));
        assert!(!test("01-01-24  10:00AM  <DIR>  sub"));
        assert_eq!(parse("total 12").unwrap(), None);
    }
}
