//! File streams over data connections.

use std::io;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::OwnedSemaphorePermit;
use tracing::debug;

use super::{FtpClient, require_path};
use crate::Result;
use crate::command::Command;
use crate::connection::{FtpStream, Transfer};

impl FtpClient {
    /// Opens a file for reading with `RETR`.
    pub async fn open_read_stream(&mut self, path: &str) -> Result<FileTransfer<'_>> {
        require_path(path)?;
        let (permit, transfer) = self.open_transfer(&Command::Retr(path.to_string())).await?;
        Ok(FileTransfer::new(transfer, permit))
    }

    /// Opens a file for writing with `STOR`, creating missing parent directories.
    pub async fn open_write_stream(&mut self, path: &str) -> Result<FileTransfer<'_>> {
        require_path(path)?;
        self.logged_in()?;

        if let Some((parent, _)) = path.rsplit_once('/')
            && !parent.trim_matches('/').is_empty()
        {
            debug!(parent, "Ensuring parent directories exist");
            self.create_directory(parent).await?;
        }

        let (permit, transfer) = self.open_transfer(&Command::Stor(path.to_string())).await?;
        Ok(FileTransfer::new(transfer, permit))
    }
}

/// Byte stream for one file download or upload.
///
/// Call [`FileTransfer::finish`] when done; it closes the data connection and
/// checks the server's `226`. Dropping the stream instead aborts the transfer;
/// the next command first waits for and discards the server's final reply.
pub struct FileTransfer<'a> {
    transfer: Transfer<FtpStream>,
    _permit: OwnedSemaphorePermit,
    _client: PhantomData<&'a mut FtpClient>,
}

impl std::fmt::Debug for FileTransfer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileTransfer")
            .field("transfer", &self.transfer)
            .finish_non_exhaustive()
    }
}

impl FileTransfer<'_> {
    const fn new(transfer: Transfer<FtpStream>, permit: OwnedSemaphorePermit) -> Self {
        Self {
            transfer,
            _permit: permit,
            _client: PhantomData,
        }
    }

    /// Closes the data connection and waits for the server's `226`.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails or the completion reply is not `226`.
    pub async fn finish(self) -> Result<()> {
        self.transfer.finish().await?;
        Ok(())
    }
}

impl AsyncRead for FileTransfer<'_> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(self.get_mut().transfer.stream_mut()).poll_read(cx, buf)
    }
}

impl AsyncWrite for FileTransfer<'_> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(self.get_mut().transfer.stream_mut()).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(self.get_mut().transfer.stream_mut()).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(self.get_mut().transfer.stream_mut()).poll_shutdown(cx)
    }
}
