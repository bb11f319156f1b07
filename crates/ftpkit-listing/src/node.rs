//! Filesystem entries produced by the listing parsers.

use chrono::NaiveDateTime;

/// Kind of a remote filesystem node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NodeKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link (or any MLSD type we do not recognise).
    SymbolicLink,
}

impl NodeKind {
    /// Returns the MLSD `type` fact value for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Directory => "dir",
            Self::SymbolicLink => "link",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a directory listing.
///
/// Timestamps are naive: Unix and DOS listings report server-local time, MLSD
/// reports UTC. Unparsable dates become [`NaiveDateTime::MIN`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeInformation {
    /// Entry name as reported by the server.
    pub name: String,
    /// Size in bytes (0 when the listing does not report it).
    pub size: u64,
    /// Last modification time.
    pub modified: NaiveDateTime,
    /// Node kind.
    pub kind: NodeKind,
}

impl NodeInformation {
    /// Creates a new node record.
    #[must_use]
    pub fn new(name: impl Into<String>, size: u64, modified: NaiveDateTime, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            size,
            modified,
            kind,
        }
    }

    /// Returns true if this node is a regular file.
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    /// Returns true if this node is a directory.
    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    /// Returns true if the modification time could not be determined.
    #[must_use]
    pub fn has_unknown_modified(&self) -> bool {
        self.modified == NaiveDateTime::MIN
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
    fn test_kind_predicates() {
        let file = NodeInformation::new("a.txt", 3, NaiveDateTime::MIN, NodeKind::File);
        assert!(file.is_file());
        assert!(!file.is_directory());
        assert!(file.has_unknown_modified());

        let dir = NodeInformation::new("sub", 0, NaiveDateTime::MIN, NodeKind::Directory);
        assert!(dir.is_directory());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(NodeKind::File.to_string(), "file");
        assert_eq!(NodeKind::Directory.to_string(), "dir");
        assert_eq!(NodeKind::SymbolicLink.to_string(), "link");
    }
}
