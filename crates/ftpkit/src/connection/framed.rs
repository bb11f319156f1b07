//! Line framing for control and data connections.
//!
//! Lines end in LF; a CR right before the LF is dropped. Bytes after the last
//! LF stay buffered until more data arrives.

#![allow(clippy::missing_errors_doc)]

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{Error, Result};

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum line length to prevent memory exhaustion.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Incremental LF splitter over an async reader.
#[derive(Debug)]
pub struct LineReader<R> {
    reader: R,
    buffer: BytesMut,
}

impl<R> LineReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Creates a new line reader.
    pub fn new(reader: R) -> Self {
        Self::with_buffer(reader, BytesMut::with_capacity(DEFAULT_BUFFER_SIZE))
    }

    /// Creates a line reader that starts with already-received bytes.
    pub fn with_buffer(reader: R, buffer: BytesMut) -> Self {
        Self { reader, buffer }
    }

    /// Reads the next line, or `None` on clean end of stream.
    ///
    /// A trailing partial line without LF is returned at end of stream.
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(line) = take_line(&mut self.buffer) {
                return Ok(Some(line));
            }

            if self.buffer.len() > MAX_LINE_LENGTH {
                return Err(Error::Protocol("line too long".to_string()));
            }

            if self.reader.read_buf(&mut self.buffer).await? == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                let rest = self.buffer.split();
                return Ok(Some(decode(&rest)));
            }
        }
    }

    /// Returns true if bytes are buffered but not yet returned as a line.
    #[must_use]
    pub fn has_buffered(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Splits the reader from its unread bytes.
    pub fn into_parts(self) -> (R, BytesMut) {
        (self.reader, self.buffer)
    }

    /// Gets a mutable reference to the underlying reader.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }
}

/// Removes one complete line from the front of `buffer`.
fn take_line(buffer: &mut BytesMut) -> Option<String> {
    let pos = find_lf(buffer)?;
    let mut line = buffer.split_to(pos);
    buffer.advance(1);
    if line.last() == Some(&b'\r') {
        line.truncate(line.len() - 1);
    }
    Some(decode(&line))
}

fn find_lf(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n')
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
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
    use tokio_test::io::Builder;

    use super::*;

    #[tokio::test]
    async fn test_crlf_and_bare_lf() {
        let mock = Builder::new().read(b"220 Ready\r\nline two\nlast").build();
        let mut reader = LineReader::new(mock);

        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("220 Ready"));
        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("line two"));
        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("last"));
        assert_eq!(reader.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_line_split_across_reads() {
        let mock = Builder::new()
            .read(b"211-Fea")
            .read(b"tures:\r")
            .read(b"\n211 End\r\n")
            .build();
        let mut reader = LineReader::new(mock);

        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("211-Features:"));
        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("211 End"));
        assert_eq!(reader.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_lines_are_kept() {
        let mock = Builder::new().read(b"\r\n\r\nx\r\n").build();
        let mut reader = LineReader::new(mock);

        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some(""));
        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some(""));
        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn test_prefilled_buffer() {
        let mock = Builder::new().read(b"ady\r\n").build();
        let mut reader = LineReader::with_buffer(mock, BytesMut::from(&b"220 Re"[..]));
        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("220 Ready"));
    }

    #[tokio::test]
    async fn test_has_buffered() {
        let mock = Builder::new().read(b"150 Opening\r\n226 Done\r\n").build();
        let mut reader = LineReader::new(mock);
        reader.read_line().await.unwrap();
        assert!(reader.has_buffered());
        reader.read_line().await.unwrap();
        assert!(!reader.has_buffered());
    }
}
