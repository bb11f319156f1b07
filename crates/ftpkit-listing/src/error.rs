//! Error types for listing parsers.

/// Result type alias for listing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Listing parse errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// MLSD record does not follow `fact=value;...; name`.
    #[error("Malformed MLSD record: {0}")]
    MalformedMlsd(String),

    /// Permission string starts with a type character we do not map.
    #[error("Unexpected node type character: {0:?}")]
    UnknownNodeKind(char),

    /// A matched line carried no file name.
    #[error("No name found in listing line: {0}")]
    MissingName(String),
}
