//! Machine-readable MLSD listings (RFC 3659).
//!
//! Each record is `fact=value;fact=value; name`. The name follows the fact list
//! and loses at most one leading space, so embedded and trailing spaces survive.

use chrono::NaiveDateTime;

use crate::date::parse_mlsd_timestamp;
use crate::error::{Error, Result};
use crate::node::{NodeInformation, NodeKind};

/// Returns true if the line looks like an MLSD record.
#[must_use]
pub fn test(line: &str) -> bool {
    split_record(line).is_some_and(|(facts, _)| facts.contains('='))
}

/// Parses one MLSD record.
///
/// Blank lines and the `cdir`/`pdir` entries describing the listed directory
/// and its parent yield `Ok(None)`.
///
/// # Errors
///
/// Returns [`Error::MalformedMlsd`] when the record has no fact list, no name,
/// or a fact without `=`.
pub fn parse(line: &str) -> Result<Option<NodeInformation>> {
    if line.trim().is_empty() {
        return Ok(None);
    }

    let (facts, name) =
        split_record(line).ok_or_else(|| Error::MalformedMlsd(line.to_string()))?;
    if name.is_empty() {
        return Err(Error::MalformedMlsd(line.to_string()));
    }

    let mut node = NodeInformation::new(name, 0, NaiveDateTime::MIN, NodeKind::SymbolicLink);

    for fact in facts.split(';').filter(|f| !f.is_empty()) {
        let (key, value) = fact
            .split_once('=')
            .ok_or_else(|| Error::MalformedMlsd(line.to_string()))?;

        match key.trim().to_ascii_lowercase().as_str() {
            "type" if is_directory_reference(value) => return Ok(None),
            "type" => node.kind = parse_type(value),
            "modify" => node.modified = parse_mlsd_timestamp(value),
            "size" => node.size = value.trim().parse().unwrap_or(0),
            _ => {}
        }
    }

    Ok(Some(node))
}

/// Splits a record into its fact list and its name.
fn split_record(line: &str) -> Option<(&str, &str)> {
    if let Some(pos) = line.find("; ") {
        return Some((&line[..pos], &line[pos + 2..]));
    }

    // Some servers omit the separating space.
    let pos = line.rfind(';')?;
    Some((&line[..pos], &line[pos + 1..]))
}

/// `cdir` and `pdir` name the listed directory itself and its parent.
fn is_directory_reference(value: &str) -> bool {
    let value = value.trim();
    value.eq_ignore_ascii_case("cdir") || value.eq_ignore_ascii_case("pdir")
}

fn parse_type(value: &str) -> NodeKind {
    if value.eq_ignore_ascii_case("dir") {
        NodeKind::Directory
    } else if value.eq_ignore_ascii_case("file") {
        NodeKind::File
    } else {
        NodeKind::SymbolicLink
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
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn test_parse_file_with_space_in_name() {
        let node = parse("type=file;size=100;modify=20240101120000; a b.txt")
            .unwrap()
            .unwrap();
        assert_eq!(node.kind, NodeKind::File);
        assert_eq!(node.size, 100);
        assert_eq!(node.name, "a b.txt");
        assert_eq!(
            node.modified,
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn test_only_one_leading_space_is_stripped() {
        let node = parse("type=file;size=1;  padded ").unwrap().unwrap();
        assert_eq!(node.name, " padded ");
    }

    #[test]
    fn test_parse_directory() {
        let node = parse("Type=dir;Modify=20231231235959;UNIX.mode=0755; docs")
            .unwrap()
            .unwrap();
        assert_eq!(node.kind, NodeKind::Directory);
        assert_eq!(node.name, "docs");
        assert_eq!(node.size, 0);
    }

    #[test]
    fn test_unknown_type_is_symlink() {
        let node = parse("type=OS.unix=slink:/tmp;size=4; tmp").unwrap().unwrap();
        assert_eq!(node.kind, NodeKind::SymbolicLink);
    }

    #[test]
    fn test_directory_references_are_skipped() {
        assert_eq!(parse("type=cdir;modify=20240101000000; .").unwrap(), None);
        assert_eq!(parse("Type=cdir;Perm=el; test").unwrap(), None);
        assert_eq!(parse("type=pdir;modify=20240101000000; /home/user").unwrap(), None);
        assert_eq!(parse("TYPE=PDir; ..").unwrap(), None);
    }

    #[test]
    fn test_blank_line() {
        assert_eq!(parse("   ").unwrap(), None);
    }

    #[test]
    fn test_malformed_records() {
        assert!(matches!(parse("just-a-name"), Err(Error::MalformedMlsd(_))));
        assert!(matches!(parse("type=file;size=3; "), Err(Error::MalformedMlsd(_))));
        assert!(matches!(parse("type=file;garbage; x"), Err(Error::MalformedMlsd(_))));
    }

    #[test]
    fn test_sniff() {
        assert!(test("type=file;size=100; a.txt"));
        assert!(!test("-rw-r--r-- 1 user group 1234 Jan 01 2024 file.txt"));
    }
}
