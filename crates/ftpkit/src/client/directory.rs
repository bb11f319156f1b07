//! Working directory and directory tree operations.

use std::future::Future;
use std::pin::Pin;

use ftpkit_listing::NodeKind;
use tracing::debug;

use super::FtpClient;
use crate::command::Command;
use crate::types::StatusCode;
use crate::{Error, Result};

/// Deepest path accepted by the recursive directory operations.
pub const MAX_PATH_DEPTH: usize = 128;

const DIRECTORY_CHANGED: [StatusCode; 2] = [StatusCode::COMMAND_OK, StatusCode::ACTION_OK];
const DIRECTORY_CREATED: [StatusCode; 3] = [
    StatusCode::COMMAND_OK,
    StatusCode::ACTION_OK,
    StatusCode::PATHNAME_CREATED,
];
const DIRECTORY_REMOVED: [StatusCode; 2] = [StatusCode::COMMAND_OK, StatusCode::ACTION_OK];

impl FtpClient {
    /// Changes the working directory and refreshes it with `PWD`.
    pub async fn change_working_directory(&mut self, directory: &str) -> Result<()> {
        require_directory(directory)?;
        self.logged_in()?
            .send_expect(&Command::Cwd(directory.to_string()), &[StatusCode::ACTION_OK])
            .await?;
        self.state.working_directory = self.print_working_directory().await?;
        Ok(())
    }

    /// Queries the working directory with `PWD`.
    pub async fn print_working_directory(&mut self) -> Result<String> {
        let response = self
            .logged_in()?
            .send_expect(&Command::Pwd, &[StatusCode::PATHNAME_CREATED])
            .await?;
        extract_quoted_path(&response.message)
    }

    /// Creates a directory and any missing parents.
    ///
    /// Each segment is entered with `CWD` and created with `MKD` when that
    /// fails. The working directory is restored afterwards.
    pub async fn create_directory(&mut self, path: &str) -> Result<()> {
        require_directory(path)?;
        let segments = path_segments(path)?;
        self.logged_in()?;

        let original = self.state.working_directory.clone();
        let created = self.create_segments(path.starts_with('/'), &segments).await;
        let restored = self.change_working_directory(&original).await;
        created?;
        restored
    }

    async fn create_segments(&mut self, absolute: bool, segments: &[&str]) -> Result<()> {
        let control = self.logged_in()?;
        if absolute {
            control
                .send_expect(&Command::Cwd("/".to_string()), &DIRECTORY_CHANGED)
                .await?;
        }

        for segment in segments {
            let entered = control.send(&Command::Cwd((*segment).to_string())).await?;
            if entered.is_any(&DIRECTORY_CHANGED) {
                continue;
            }

            debug!(segment, "Creating missing directory");
            control
                .send_expect(&Command::Mkd((*segment).to_string()), &DIRECTORY_CREATED)
                .await?;
            control
                .send_expect(&Command::Cwd((*segment).to_string()), &DIRECTORY_CHANGED)
                .await?;
        }
        Ok(())
    }

    /// Removes a directory, emptying it first if the server reports it is not empty.
    ///
    /// Deleting `/` is a no-op.
    pub async fn delete_directory(&mut self, path: &str) -> Result<()> {
        require_directory(path)?;
        if path.trim().trim_matches('/').is_empty() {
            return Ok(());
        }
        path_segments(path)?;
        self.logged_in()?;
        self.delete_tree(path.to_string(), 0).await
    }

    fn delete_tree(
        &mut self,
        path: String,
        depth: usize,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if depth > MAX_PATH_DEPTH {
                return Err(Error::InvalidArgument(format!(
                    "directory tree deeper than {MAX_PATH_DEPTH} levels"
                )));
            }

            let response = self.logged_in()?.send(&Command::Rmd(path.clone())).await?;
            if response.is_any(&DIRECTORY_REMOVED) {
                return Ok(());
            }
            if response.code != StatusCode::ACTION_NOT_TAKEN {
                return response.expect_one_of(&DIRECTORY_REMOVED).map(|_| ());
            }

            debug!(path = %path, depth, "Directory not empty, deleting contents");
            self.empty_directory(&path, depth).await?;

            self.logged_in()?
                .send_expect(&Command::Rmd(path), &DIRECTORY_REMOVED)
                .await?;
            Ok(())
        })
    }

    async fn empty_directory(&mut self, path: &str, depth: usize) -> Result<()> {
        let original = self.state.working_directory.clone();
        self.change_working_directory(path).await?;

        let nodes: Vec<_> = self
            .list_all()
            .await?
            .into_iter()
            .filter(|n| n.name != "." && n.name != "..")
            .collect();
        for node in nodes.iter().filter(|n| n.kind != NodeKind::Directory) {
            self.delete_file(&node.name).await?;
        }
        for node in nodes.iter().filter(|n| n.kind == NodeKind::Directory) {
            self.delete_tree(node.name.clone(), depth + 1).await?;
        }

        self.change_working_directory(&original).await
    }
}

/// Rejects empty and `.` directory arguments.
fn require_directory(directory: &str) -> Result<()> {
    let trimmed = directory.trim();
    if trimmed.is_empty() || trimmed == "." {
        return Err(Error::InvalidArgument(format!(
            "invalid directory: {directory:?}"
        )));
    }
    Ok(())
}

/// Splits a path into its non-empty segments.
fn path_segments(path: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() > MAX_PATH_DEPTH {
        return Err(Error::InvalidArgument(format!(
            "path has more than {MAX_PATH_DEPTH} segments"
        )));
    }
    Ok(segments)
}

/// Extracts the path from a `257 "/some/dir" is current directory` reply.
///
/// Embedded quotes are doubled (`""`) per RFC 959.
fn extract_quoted_path(message: &str) -> Result<String> {
    let malformed = || Error::Protocol(format!("no quoted path in PWD reply: {message}"));

    let start = message.find('"').ok_or_else(malformed)?;
    let mut path = String::new();
    let mut chars = message[start + 1..].chars().peekable();
    while let Some(c) = chars.next() {
        if c != '"' {
            path.push(c);
            continue;
        }
        if chars.peek() == Some(&'"') {
            chars.next();
            path.push('"');
            continue;
        }
        return Ok(path);
    }
    Err(malformed())
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
    fn test_extract_quoted_path() {
        assert_eq!(
            extract_quoted_path("\"/pub/incoming\" is current directory").unwrap(),
            "/pub/incoming"
        );
        assert_eq!(extract_quoted_path("\"/\"").unwrap(), "/");
        assert_eq!(
            extract_quoted_path("\"/say \"\"hi\"\"\" created").unwrap(),
            "/say \"hi\""
        );
    }

    #[test]
    fn test_extract_quoted_path_requires_quotes() {
        assert!(matches!(extract_quoted_path("/pub"), Err(Error::Protocol(_))));
        assert!(matches!(extract_quoted_path("\"/pub"), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_require_directory() {
        assert!(require_directory("/pub").is_ok());
        assert!(require_directory("").is_err());
        assert!(require_directory(" . ").is_err());
    }

    #[test]
    fn test_path_segments() {
        assert_eq!(path_segments("/a//b/c/").unwrap(), vec!["a", "b", "c"]);
        assert_eq!(path_segments("rel/dir").unwrap(), vec!["rel", "dir"]);

        let deep = "a/".repeat(MAX_PATH_DEPTH + 1);
        assert!(matches!(path_segments(&deep), Err(Error::InvalidArgument(_))));
    }
}
