//! Directory listings.
//!
//! `MLSD` is used when the server advertises it, `LIST` otherwise. `LIST`
//! output commits to a dialect on its first line; a first line no dialect
//! recognises yields an empty listing.

use std::collections::VecDeque;

use ftpkit_listing::{DirSort, ListingDialect, ListingParser, NodeInformation, NodeKind};
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, warn};

use super::FtpClient;
use crate::Result;
use crate::command::Command;
use crate::connection::{DataLines, FtpStream};

impl FtpClient {
    /// Lists every entry of the working directory.
    pub async fn list_all(&mut self) -> Result<Vec<NodeInformation>> {
        self.list(None, None).await
    }

    /// Lists the files of the working directory.
    pub async fn list_files(&mut self) -> Result<Vec<NodeInformation>> {
        self.list(Some(NodeKind::File), None).await
    }

    /// Lists the subdirectories of the working directory.
    pub async fn list_directories(&mut self) -> Result<Vec<NodeInformation>> {
        self.list(Some(NodeKind::Directory), None).await
    }

    /// Lists the working directory, keeping only `filter` nodes when given.
    ///
    /// `sort` is applied client-side for `MLSD` and sent as a `LIST` flag
    /// otherwise; servers that ignore the flag return their own order.
    pub async fn list(
        &mut self,
        filter: Option<NodeKind>,
        sort: Option<DirSort>,
    ) -> Result<Vec<NodeInformation>> {
        let (command, mut parser) = self.listing_command(sort);
        let (_permit, transfer) = self.open_transfer(&command).await?;
        let mut nodes = read_listing(transfer.into_lines(), &mut parser, filter).await?;

        self.record_dialect(&parser);
        if let (Some(sort), true) = (sort, self.state.uses_mlsd) {
            sort.sort(&mut nodes);
        }
        debug!(count = nodes.len(), ?filter, "Listed directory");
        Ok(nodes)
    }

    /// Streams the files of the working directory.
    ///
    /// The control connection stays busy until the stream is exhausted or
    /// [`NodeStream::finish`] is called.
    pub async fn list_files_stream(&mut self, sort: Option<DirSort>) -> Result<NodeStream<'_>> {
        self.list_stream(Some(NodeKind::File), sort).await
    }

    /// Streams the working directory, keeping only `filter` nodes when given.
    ///
    /// For `LIST`, `sort` is sent as a flag and nodes are yielded as they
    /// arrive. For `MLSD` with a `sort`, the listing is read in full and sorted
    /// before the first node is yielded.
    pub async fn list_stream(
        &mut self,
        filter: Option<NodeKind>,
        sort: Option<DirSort>,
    ) -> Result<NodeStream<'_>> {
        let (command, mut parser) = self.listing_command(sort);
        let (permit, transfer) = self.open_transfer(&command).await?;
        let lines = transfer.into_lines();

        let (lines, sorted) = match sort {
            Some(sort) if self.state.uses_mlsd => {
                let mut nodes = read_listing(lines, &mut parser, filter).await?;
                sort.sort(&mut nodes);
                (None, VecDeque::from(nodes))
            }
            _ => (Some(lines), VecDeque::new()),
        };

        Ok(NodeStream {
            lines,
            sorted,
            parser,
            filter,
            dialect: &mut self.state.dialect,
            _permit: permit,
        })
    }

    fn listing_command(&self, sort: Option<DirSort>) -> (Command, ListingParser) {
        if self.state.uses_mlsd {
            (Command::Mlsd, ListingParser::mlsd())
        } else {
            let flag = sort.map(|s| s.list_flag().to_string());
            (Command::List(flag), ListingParser::list())
        }
    }

    fn record_dialect(&mut self, parser: &ListingParser) {
        if let Some(dialect) = parser.dialect() {
            self.state.dialect = Some(dialect);
        } else if parser.is_unrecognised() {
            warn!("Listing format not recognised; treating listing as empty");
        }
    }
}

/// Returns true if `node` passes the optional kind filter.
fn accepts(filter: Option<NodeKind>, node: &NodeInformation) -> bool {
    filter.is_none_or(|kind| node.kind == kind)
}

/// Reads a whole listing, then waits for the transfer to complete.
async fn read_listing(
    mut lines: DataLines<FtpStream>,
    parser: &mut ListingParser,
    filter: Option<NodeKind>,
) -> Result<Vec<NodeInformation>> {
    let collected = collect_nodes(&mut lines, parser, filter).await;
    let finished = lines.finish().await;
    let nodes = collected?;
    finished?;
    Ok(nodes)
}

async fn collect_nodes(
    lines: &mut DataLines<FtpStream>,
    parser: &mut ListingParser,
    filter: Option<NodeKind>,
) -> Result<Vec<NodeInformation>> {
    let mut nodes = Vec::new();
    while let Some(line) = lines.next_line().await? {
        if let Some(node) = parser.feed(&line)?
            && accepts(filter, &node)
        {
            nodes.push(node);
        }
    }
    Ok(nodes)
}

/// Lazily parsed directory listing.
///
/// Borrows the client, so no other command can be issued until the stream is
/// dropped or finished.
pub struct NodeStream<'a> {
    lines: Option<DataLines<FtpStream>>,
    /// Nodes read ahead for a client-side sort.
    sorted: VecDeque<NodeInformation>,
    parser: ListingParser,
    filter: Option<NodeKind>,
    dialect: &'a mut Option<ListingDialect>,
    _permit: OwnedSemaphorePermit,
}

impl std::fmt::Debug for NodeStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeStream")
            .field("filter", &self.filter)
            .field("done", &self.lines.is_none())
            .field("buffered", &self.sorted.len())
            .finish_non_exhaustive()
    }
}

impl NodeStream<'_> {
    /// Returns the next node, or `None` after the server's `226` was validated.
    ///
    /// # Errors
    ///
    /// Returns an error for transport failures, unparsable lines and a
    /// completion reply other than `226`.
    pub async fn next_node(&mut self) -> Result<Option<NodeInformation>> {
        if let Some(node) = self.sorted.pop_front() {
            return Ok(Some(node));
        }

        loop {
            let Some(lines) = self.lines.as_mut() else {
                return Ok(None);
            };

            let Some(line) = lines.next_line().await? else {
                self.finish_transfer().await?;
                return Ok(None);
            };

            if let Some(node) = self.parser.feed(&line)? {
                if let Some(dialect) = self.parser.dialect() {
                    *self.dialect = Some(dialect);
                }
                if accepts(self.filter, &node) {
                    return Ok(Some(node));
                }
            }
        }
    }

    /// Stops reading and waits for the transfer to complete.
    ///
    /// # Errors
    ///
    /// Returns an error if the completion reply is not `226`. Servers may
    /// answer an early close with `426`.
    pub async fn finish(mut self) -> Result<()> {
        self.finish_transfer().await
    }

    async fn finish_transfer(&mut self) -> Result<()> {
        if let Some(lines) = self.lines.take() {
            lines.finish().await?;
        }
        Ok(())
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
    use chrono::NaiveDateTime;

    use super::*;

    fn node(kind: NodeKind) -> NodeInformation {
        NodeInformation::new("n", 0, NaiveDateTime::MIN, kind)
    }

    #[test]
    fn test_filter_uses_and_semantics() {
        assert!(accepts(None, &node(NodeKind::File)));
        assert!(accepts(None, &node(NodeKind::Directory)));
        assert!(accepts(Some(NodeKind::File), &node(NodeKind::File)));
        assert!(!accepts(Some(NodeKind::File), &node(NodeKind::Directory)));
        assert!(!accepts(Some(NodeKind::Directory), &node(NodeKind::SymbolicLink)));
    }
}
