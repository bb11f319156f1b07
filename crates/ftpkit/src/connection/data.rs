//! Passive data connections.
//!
//! `EPSV` is tried first and `PASV` is the fallback. The data socket is opened
//! to the control connection's host; the address in a `PASV` reply is ignored
//! because NAT routinely makes it wrong.

#![allow(clippy::missing_errors_doc)]

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::config::IpVersion;
use super::control::ControlGuard;
use super::framed::LineReader;
use super::stream::{self, FtpStream, TlsSettings};
use crate::command::Command;
use crate::resolver::Resolver;
use crate::types::{Response, StatusCode};
use crate::{Error, Result};

static EPSV_PORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[|,](\d+)[|,]").unwrap_or_else(|e| unreachable!("invalid EPSV pattern: {e}"))
});

static PASV_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,3}),\s*(\d{1,3}),\s*(\d{1,3}),\s*(\d{1,3}),\s*(\d{1,3}),\s*(\d{1,3})")
        .unwrap_or_else(|e| unreachable!("invalid PASV pattern: {e}"))
});

/// Preliminary replies that announce a data transfer.
const TRANSFER_STARTING: [StatusCode; 2] = [StatusCode::DATA_ALREADY_OPEN, StatusCode::OPENING_DATA];

/// Extracts the port from an `EPSV` reply such as `Entering Extended Passive Mode (|||6446|)`.
#[must_use]
pub fn parse_epsv_port(message: &str) -> Option<u16> {
    EPSV_PORT
        .captures(message)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u16>().ok())
        .filter(|&port| port != 0)
}

/// Extracts the port from a `PASV` reply such as `Entering Passive Mode (192,168,1,1,200,50)`.
#[must_use]
pub fn parse_pasv_port(message: &str) -> Option<u16> {
    let captures = PASV_ADDRESS.captures(message)?;
    let mut octets = [0u8; 6];
    for (i, octet) in octets.iter_mut().enumerate() {
        *octet = captures.get(i + 1)?.as_str().parse().ok()?;
    }
    let port = u16::from(octets[4]) * 256 + u16::from(octets[5]);
    (port != 0).then_some(port)
}

/// Asks the server for a passive data port.
pub async fn negotiate_passive<S>(control: &mut ControlGuard<S>) -> Result<u16>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let epsv = control.send(&Command::Epsv).await?;
    if epsv.code == StatusCode::ENTERING_EXTENDED_PASSIVE {
        if let Some(port) = parse_epsv_port(&epsv.message) {
            return Ok(port);
        }
        debug!(message = %epsv.message, "Unparsable EPSV reply, falling back to PASV");
    } else {
        debug!(code = %epsv.code, "EPSV rejected, falling back to PASV");
    }

    let pasv = control
        .send(&Command::Pasv)
        .await?
        .expect_one_of(&[StatusCode::ENTERING_PASSIVE])?;
    parse_pasv_port(&pasv.message)
        .ok_or_else(|| Error::Protocol(format!("malformed PASV reply: {}", pasv.message)))
}

/// Where and how to open data connections for one session.
#[derive(Debug, Clone, Copy)]
pub struct DataTarget<'a> {
    /// Control connection host.
    pub host: &'a str,
    /// Preferred address family.
    pub ip_version: IpVersion,
    /// Shared resolver.
    pub resolver: &'a Resolver,
    /// TLS settings when the session is encrypted.
    pub tls: Option<&'a TlsSettings>,
    /// Inactivity timeout.
    pub timeout: Duration,
    /// Timeout for tearing down a finished data stream.
    pub disconnect_timeout: Duration,
}

/// An open data connection whose final `226` is still outstanding.
pub struct Transfer<S> {
    control: ControlGuard<S>,
    stream: FtpStream,
    timeout: Duration,
    disconnect_timeout: Duration,
}

impl<S> std::fmt::Debug for Transfer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transfer")
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}

impl<S> Transfer<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Negotiates a passive port, connects, and issues `command`.
    ///
    /// Succeeds once the server answers `125` or `150`.
    pub async fn open(
        mut control: ControlGuard<S>,
        command: &Command,
        target: &DataTarget<'_>,
    ) -> Result<Self> {
        let port = negotiate_passive(&mut control).await?;
        let addr = target
            .resolver
            .resolve(target.host, port, target.ip_version)
            .await?;
        let stream = stream::connect(addr, target.timeout).await?;
        debug!(%addr, %command, "Data connection open");

        control.write(command).await?;

        let stream = match target.tls {
            Some(tls) => upgrade_while_awaiting(&mut control, stream, tls, target.timeout).await?,
            None => {
                control.recv().await?.expect_one_of(&TRANSFER_STARTING)?;
                stream
            }
        };

        Ok(Self {
            control,
            stream,
            timeout: target.timeout,
            disconnect_timeout: target.disconnect_timeout,
        })
    }

    /// Gets a mutable reference to the data stream.
    pub fn stream_mut(&mut self) -> &mut FtpStream {
        &mut self.stream
    }

    /// Switches to line-oriented reading.
    #[must_use]
    pub fn into_lines(self) -> DataLines<S> {
        DataLines {
            lines: LineReader::new(self.stream),
            control: self.control,
            timeout: self.timeout,
            disconnect_timeout: self.disconnect_timeout,
        }
    }

    /// Closes the data stream and waits for the server's `226`.
    pub async fn finish(self) -> Result<Response> {
        close(
            self.stream,
            self.control,
            self.timeout,
            self.disconnect_timeout,
        )
        .await
    }
}

/// Line reader over a data connection.
pub struct DataLines<S> {
    lines: LineReader<FtpStream>,
    control: ControlGuard<S>,
    timeout: Duration,
    disconnect_timeout: Duration,
}

impl<S> std::fmt::Debug for DataLines<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLines").finish_non_exhaustive()
    }
}

impl<S> DataLines<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Reads the next line, or `None` once the server closed the data stream.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        tokio::time::timeout(self.timeout, self.lines.read_line())
            .await
            .map_err(|_| Error::Timeout(self.timeout))?
    }

    /// Closes the data stream and waits for the server's `226`.
    pub async fn finish(self) -> Result<Response> {
        let (stream, _) = self.lines.into_parts();
        close(stream, self.control, self.timeout, self.disconnect_timeout).await
    }
}

/// Runs the TLS handshake and waits for the preliminary reply concurrently.
///
/// Servers differ on whether `150` comes before or after the handshake.
async fn upgrade_while_awaiting<S>(
    control: &mut ControlGuard<S>,
    stream: FtpStream,
    tls: &TlsSettings,
    timeout: Duration,
) -> Result<FtpStream>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let upgrade = async {
        tokio::time::timeout(timeout, stream.upgrade_to_tls(tls))
            .await
            .map_err(|_| Error::Timeout(timeout))?
    };
    tokio::pin!(upgrade);

    let mut upgraded = None;
    let reply = loop {
        tokio::select! {
            result = &mut upgrade, if upgraded.is_none() => upgraded = Some(result?),
            reply = control.recv() => break reply?,
        }
    };
    reply.expect_one_of(&TRANSFER_STARTING)?;

    match upgraded {
        Some(stream) => Ok(stream),
        None => upgrade.await,
    }
}

/// Flushes and shuts down the data stream, then validates the `226`.
///
/// The socket is dropped only after the reply arrives; it was opened with
/// zero linger, so dropping it earlier could discard unsent upload bytes.
async fn close<S>(
    mut stream: FtpStream,
    mut control: ControlGuard<S>,
    timeout: Duration,
    disconnect_timeout: Duration,
) -> Result<Response>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    tokio::time::timeout(timeout, stream.flush())
        .await
        .map_err(|_| Error::Timeout(timeout))??;

    match tokio::time::timeout(disconnect_timeout, stream.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "Data stream shutdown failed"),
        Err(_) => debug!(?disconnect_timeout, "Data stream shutdown timed out"),
    }

    let reply = control.recv().await;
    drop(stream);
    reply?.expect_one_of(&[StatusCode::CLOSING_DATA])
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
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader, duplex};
    use tokio::net::TcpListener;

    use super::*;
    use crate::connection::ControlChannel;

    #[test]
    fn test_epsv_port() {
        assert_eq!(
            parse_epsv_port("Entering Extended Passive Mode (|||6446|)"),
            Some(6446)
        );
        assert_eq!(parse_epsv_port("Entering Extended Passive Mode (,,,6446,)"), Some(6446));
        assert_eq!(parse_epsv_port("Entering Extended Passive Mode"), None);
        assert_eq!(parse_epsv_port("(|||99999|)"), None);
        assert_eq!(parse_epsv_port("(|||0|)"), None);
    }

    #[test]
    fn test_pasv_port() {
        assert_eq!(
            parse_pasv_port("Entering Passive Mode (192,168,1,1,200,50)"),
            Some(51250)
        );
        assert_eq!(parse_pasv_port("=127,0,0,1,4,1"), Some(1025));
        assert_eq!(parse_pasv_port("Entering Passive Mode (1,2,3,4,5)"), None);
        assert_eq!(parse_pasv_port("(1,2,3,4,300,1)"), None);
    }

    type ServerRead = BufReader<tokio::io::ReadHalf<tokio::io::DuplexStream>>;
    type ServerWrite = tokio::io::WriteHalf<tokio::io::DuplexStream>;

    async fn next_command(reader: &mut ServerRead) -> String {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        line.trim_end().to_string()
    }

    /// Accepts one data connection and sends `payload`.
    async fn serve_data(listener: TcpListener, payload: &'static [u8]) {
        let (mut socket, _) = listener.accept().await.unwrap();
        socket.write_all(payload).await.unwrap();
        socket.shutdown().await.unwrap();
    }

    async fn control_pair() -> (ControlChannel<tokio::io::DuplexStream>, ServerRead, ServerWrite) {
        let (client, server) = duplex(4096);
        let (server_read, mut server_write) = tokio::io::split(server);
        server_write.write_all(b"220 Ready\r\n").await.unwrap();
        let (channel, _) = ControlChannel::open(client, Duration::from_secs(5)).await.unwrap();
        (channel, BufReader::new(server_read), server_write)
    }

    fn target(resolver: &Resolver) -> DataTarget<'_> {
        DataTarget {
            host: "127.0.0.1",
            ip_version: IpVersion::V4,
            resolver,
            tls: None,
            timeout: Duration::from_secs(5),
            disconnect_timeout: Duration::from_millis(100),
        }
    }

    #[tokio::test]
    async fn test_listing_over_pasv_fallback() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let data = tokio::spawn(serve_data(listener, b"line one\r\nline two\n"));

        let (channel, mut server_read, mut server_write) = control_pair().await;
        let control_task = tokio::spawn(async move {
            assert_eq!(next_command(&mut server_read).await, "EPSV");
            server_write.write_all(b"502 EPSV not implemented\r\n").await.unwrap();
            assert_eq!(next_command(&mut server_read).await, "PASV");
            let reply = format!(
                "227 Entering Passive Mode (10,9,8,7,{},{})\r\n",
                port / 256,
                port % 256
            );
            server_write.write_all(reply.as_bytes()).await.unwrap();
            assert_eq!(next_command(&mut server_read).await, "LIST");
            server_write.write_all(b"150 Here it comes\r\n").await.unwrap();
            server_write.write_all(b"226 Transfer complete\r\n").await.unwrap();
            (server_read, server_write)
        });

        let resolver = Resolver::new();
        let transfer = Transfer::open(channel.lock().await, &Command::List(None), &target(&resolver))
            .await
            .unwrap();
        let mut lines = transfer.into_lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("line one"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("line two"));
        assert_eq!(lines.next_line().await.unwrap(), None);

        let done = lines.finish().await.unwrap();
        assert_eq!(done.code, StatusCode::CLOSING_DATA);

        data.await.unwrap();
        control_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_transfer_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.map(|_| ()) });

        let (channel, mut server_read, mut server_write) = control_pair().await;
        let control_task = tokio::spawn(async move {
            assert_eq!(next_command(&mut server_read).await, "EPSV");
            let reply = format!("229 Entering Extended Passive Mode (|||{port}|)\r\n");
            server_write.write_all(reply.as_bytes()).await.unwrap();
            assert_eq!(next_command(&mut server_read).await, "RETR missing.txt");
            server_write.write_all(b"550 No such file\r\n").await.unwrap();
            (server_read, server_write)
        });

        let resolver = Resolver::new();
        let result = Transfer::open(
            channel.lock().await,
            &Command::Retr("missing.txt".to_string()),
            &target(&resolver),
        )
        .await;
        assert!(matches!(result, Err(Error::Server { code: 550, .. })));

        control_task.await.unwrap();
        accept.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_upload_is_flushed_before_completion() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let data = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            socket.read_to_end(&mut received).await.unwrap();
            received
        });

        let (channel, mut server_read, mut server_write) = control_pair().await;
        let control_task = tokio::spawn(async move {
            assert_eq!(next_command(&mut server_read).await, "EPSV");
            let reply = format!("229 Entering Extended Passive Mode (|||{port}|)\r\n");
            server_write.write_all(reply.as_bytes()).await.unwrap();
            assert_eq!(next_command(&mut server_read).await, "STOR up.bin");
            server_write.write_all(b"125 Go ahead\r\n").await.unwrap();
            (server_read, server_write)
        });

        let resolver = Resolver::new();
        let mut transfer = Transfer::open(
            channel.lock().await,
            &Command::Stor("up.bin".to_string()),
            &target(&resolver),
        )
        .await
        .unwrap();
        transfer.stream_mut().write_all(b"payload").await.unwrap();

        let (_server_read, mut server_write) = control_task.await.unwrap();
        let finishing = tokio::spawn(transfer.finish());

        assert_eq!(data.await.unwrap(), b"payload");
        server_write.write_all(b"226 Stored\r\n").await.unwrap();
        assert_eq!(finishing.await.unwrap().unwrap().code, StatusCode::CLOSING_DATA);
    }

    #[tokio::test]
    async fn test_dropped_listing_settles_before_next_command() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (closed_tx, closed_rx) = tokio::sync::oneshot::channel();
        let data = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"line one\r\nline two\r\n").await.unwrap();
            // Returns once the client drops its end.
            let mut rest = Vec::new();
            let _ = socket.read_to_end(&mut rest).await;
            closed_tx.send(()).unwrap();
        });

        let (channel, mut server_read, mut server_write) = control_pair().await;
        let control_task = tokio::spawn(async move {
            assert_eq!(next_command(&mut server_read).await, "EPSV");
            let reply = format!("229 Entering Extended Passive Mode (|||{port}|)\r\n");
            server_write.write_all(reply.as_bytes()).await.unwrap();
            assert_eq!(next_command(&mut server_read).await, "LIST");
            server_write.write_all(b"150 Here it comes\r\n").await.unwrap();

            closed_rx.await.unwrap();
            server_write
                .write_all(b"426 Connection closed; transfer aborted\r\n")
                .await
                .unwrap();
            assert_eq!(next_command(&mut server_read).await, "NOOP");
            server_write.write_all(b"200 NOOP ok\r\n").await.unwrap();
            (server_read, server_write)
        });

        let resolver = Resolver::new();
        let transfer = Transfer::open(channel.lock().await, &Command::List(None), &target(&resolver))
            .await
            .unwrap();
        let mut lines = transfer.into_lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("line one"));
        drop(lines);

        let response = channel.send(&Command::Noop).await.unwrap();
        assert_eq!(response.code, StatusCode::COMMAND_OK);
        assert_eq!(response.message, "NOOP ok");

        data.await.unwrap();
        control_task.await.unwrap();
    }
}
