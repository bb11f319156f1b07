//! Listing order hints.

use crate::node::NodeInformation;

/// Requested order of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DirSort {
    /// Ascending by name.
    Alphabetical,
    /// Descending by name.
    AlphabeticalReverse,
    /// Newest first.
    ModifiedTimestampReverse,
}

impl DirSort {
    /// Returns the `LIST` flag asking the server for this order.
    ///
    /// Servers that ignore the flag return their own order; `LIST` output is
    /// never re-sorted client-side.
    #[must_use]
    pub const fn list_flag(self) -> &'static str {
        match self {
            Self::Alphabetical => "-1",
            Self::AlphabeticalReverse => "-r",
            Self::ModifiedTimestampReverse => "-t",
        }
    }

    /// Sorts nodes client-side (used for MLSD listings).
    pub fn sort(self, nodes: &mut [NodeInformation]) {
        match self {
            Self::Alphabetical => nodes.sort_by(|a, b| a.name.cmp(&b.name)),
            Self::AlphabeticalReverse => nodes.sort_by(|a, b| b.name.cmp(&a.name)),
            Self::ModifiedTimestampReverse => nodes.sort_by(|a, b| b.modified.cmp(&a.modified)),
        }
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
    use crate::node::NodeKind;

    fn node(name: &str, day: u32) -> NodeInformation {
        let modified: NaiveDateTime = NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        NodeInformation::new(name, 0, modified, NodeKind::File)
    }

    fn names(nodes: &[NodeInformation]) -> Vec<&str> {
        nodes.iter().map(|n| n.name.as_str()).collect()
    }

    #[test]
    fn test_alphabetical() {
        let mut nodes = vec![node("b", 1), node("c", 2), node("a", 3)];
        DirSort::Alphabetical.sort(&mut nodes);
        assert_eq!(names(&nodes), ["a", "b", "c"]);

        DirSort::AlphabeticalReverse.sort(&mut nodes);
        assert_eq!(names(&nodes), ["c", "b", "a"]);
    }

    #[test]
    fn test_newest_first() {
        let mut nodes = vec![node("old", 1), node("new", 20), node("mid", 10)];
        DirSort::ModifiedTimestampReverse.sort(&mut nodes);
        assert_eq!(names(&nodes), ["new", "mid", "old"]);
    }

    #[test]
    fn test_list_flags() {
        assert_eq!(DirSort::Alphabetical.list_flag(), "-1");
        assert_eq!(DirSort::AlphabeticalReverse.list_flag(), "-r");
        assert_eq!(DirSort::ModifiedTimestampReverse.list_flag(), "-t");
    }
}
