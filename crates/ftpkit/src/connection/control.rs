//! Control connection.
//!
//! A background task reads reply lines, feeds them through the
//! [`ReplyParser`] and queues complete replies. Commands are written under a
//! mutex, so exactly one command is in flight and replies pair with commands
//! in FIFO order.
//!
//! Every written command owes one final (non-1xx) reply. Replies still owed by
//! an abandoned exchange (a timed-out wait, a dropped future, a data transfer
//! dropped before its `226`) are awaited and discarded before the next command
//! is written.

#![allow(clippy::missing_errors_doc)]

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::config::Encryption;
use super::framed::LineReader;
use super::stream::{FtpStream, TlsSettings};
use crate::command::Command;
use crate::parser::ReplyParser;
use crate::types::{Response, StatusCode};
use crate::{Error, Result};

type ReplyQueue = mpsc::UnboundedReceiver<Result<Response>>;

/// Write half and reply queue, guarded by the command mutex.
struct Inner<S> {
    writer: WriteHalf<S>,
    replies: ReplyQueue,
    /// Final replies owed by commands already written.
    outstanding: usize,
}

/// Control connection with a background reply reader.
pub struct ControlChannel<S> {
    inner: Arc<Mutex<Inner<S>>>,
    reader_token: CancellationToken,
    timeout: Duration,
}

impl<S> std::fmt::Debug for ControlChannel<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlChannel")
            .field("timeout", &self.timeout)
            .field("closed", &self.reader_token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<S> ControlChannel<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Reads the welcome reply from `stream` and starts the background reader.
    ///
    /// Fails unless the welcome is a success reply.
    pub async fn open(stream: S, timeout: Duration) -> Result<(Self, Response)> {
        let mut reader = LineReader::new(stream);
        let mut parser = ReplyParser::new();
        let welcome = read_welcome(&mut reader, &mut parser, timeout).await?;
        Ok((Self::start(reader, parser, timeout), welcome))
    }

    /// Splits the stream and spawns the reply reader.
    fn start(reader: LineReader<S>, parser: ReplyParser, timeout: Duration) -> Self {
        let (stream, leftover) = reader.into_parts();
        let (read_half, writer) = tokio::io::split(stream);
        let (tx, replies) = mpsc::unbounded_channel();
        let reader_token = CancellationToken::new();

        tokio::spawn(read_loop(
            LineReader::with_buffer(read_half, leftover),
            parser,
            tx,
            reader_token.clone(),
        ));

        Self {
            inner: Arc::new(Mutex::new(Inner {
                writer,
                replies,
                outstanding: 0,
            })),
            reader_token,
            timeout,
        }
    }

    /// Returns the inactivity timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns true once the background reader has been stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.reader_token.is_cancelled()
    }

    /// Sends a command and waits for its reply.
    pub async fn send(&self, command: &Command) -> Result<Response> {
        self.lock().await.send(command).await
    }

    /// Sends a command and requires one of `codes` in the reply.
    pub async fn send_expect(&self, command: &Command, codes: &[StatusCode]) -> Result<Response> {
        self.send(command).await?.expect_one_of(codes)
    }

    /// Sends a command, waiting at most `timeout` for the reply.
    pub async fn send_with_timeout(&self, command: &Command, timeout: Duration) -> Result<Response> {
        let mut guard = self.lock().await;
        guard.settle().await?;
        guard.write(command).await?;
        guard.recv_within(timeout).await
    }

    /// Takes the command mutex for a multi-step exchange.
    pub async fn lock(&self) -> ControlGuard<S> {
        ControlGuard {
            inner: Arc::clone(&self.inner).lock_owned().await,
            timeout: self.timeout,
        }
    }

    /// Stops the background reader.
    pub fn close(&self) {
        self.reader_token.cancel();
    }
}

impl ControlChannel<FtpStream> {
    /// Runs the connection handshake on a freshly connected stream.
    ///
    /// Implicit TLS upgrades before the welcome; explicit TLS sends `AUTH TLS`
    /// after it and upgrades in place.
    pub async fn connect(
        stream: FtpStream,
        encryption: Encryption,
        tls: Option<&TlsSettings>,
        timeout: Duration,
    ) -> Result<(Self, Response)> {
        let tls_settings = || {
            tls.ok_or_else(|| Error::InvalidArgument("TLS settings required".to_string()))
        };

        let stream = match encryption {
            Encryption::Implicit => stream.upgrade_to_tls(tls_settings()?).await?,
            Encryption::None | Encryption::Explicit => stream,
        };

        let mut reader = LineReader::new(stream);
        let mut parser = ReplyParser::new();
        let welcome = read_welcome(&mut reader, &mut parser, timeout).await?;

        if encryption == Encryption::Explicit {
            let command = Command::AuthTls;
            debug!(%command, ">");
            reader.get_mut().write_all(&command.serialize()).await?;
            reader.get_mut().flush().await?;

            read_reply(&mut reader, &mut parser, timeout)
                .await?
                .expect_one_of(&[StatusCode::AUTH_OK])?;

            let (stream, leftover) = reader.into_parts();
            let stream = stream.upgrade_to_tls(tls_settings()?).await?;
            reader = LineReader::with_buffer(stream, leftover);
        }

        Ok((Self::start(reader, parser, timeout), welcome))
    }
}

impl<S> Drop for ControlChannel<S> {
    fn drop(&mut self) {
        self.reader_token.cancel();
    }
}

/// Exclusive access to the control connection.
///
/// Held across a whole data transfer so the final `226` cannot be taken by an
/// unrelated command.
pub struct ControlGuard<S> {
    inner: OwnedMutexGuard<Inner<S>>,
    timeout: Duration,
}

impl<S> std::fmt::Debug for ControlGuard<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlGuard").finish_non_exhaustive()
    }
}

impl<S> ControlGuard<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Settles owed replies, sends a command and waits for its reply.
    pub async fn send(&mut self, command: &Command) -> Result<Response> {
        self.settle().await?;
        self.write(command).await?;
        self.recv().await
    }

    /// Writes a command without waiting for a reply.
    ///
    /// The command's final reply is owed from here on; it is consumed by
    /// [`recv`](Self::recv) or, if nobody waits for it, by the next
    /// [`settle`](Self::settle).
    pub async fn write(&mut self, command: &Command) -> Result<()> {
        debug!(%command, ">");
        self.inner.writer.write_all(&command.serialize()).await?;
        self.inner.writer.flush().await?;
        self.inner.outstanding += 1;
        Ok(())
    }

    /// Returns the number of final replies still owed by written commands.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding
    }

    /// Waits for the next reply.
    pub async fn recv(&mut self) -> Result<Response> {
        self.recv_within(self.timeout).await
    }

    /// Waits at most `timeout` for the next reply.
    pub async fn recv_within(&mut self, timeout: Duration) -> Result<Response> {
        match tokio::time::timeout(timeout, self.inner.replies.recv()).await {
            Ok(Some(reply)) => {
                self.account(&reply);
                reply
            }
            Ok(None) => Err(Error::ConnectionClosed),
            Err(_) => Err(Error::Timeout(timeout)),
        }
    }

    /// Waits for and discards every reply still owed, then drains the queue.
    pub async fn settle(&mut self) -> Result<()> {
        self.settle_within(self.timeout).await
    }

    /// Like [`settle`](Self::settle), waiting at most `timeout` per owed reply.
    ///
    /// On timeout nothing is written and the replies stay owed, so a later
    /// call picks up where this one stopped.
    pub async fn settle_within(&mut self, timeout: Duration) -> Result<()> {
        self.drain_stale();
        while self.inner.outstanding > 0 {
            let stale = match tokio::time::timeout(timeout, self.inner.replies.recv()).await {
                Ok(Some(stale)) => stale,
                Ok(None) => return Err(Error::ConnectionClosed),
                Err(_) => {
                    warn!(
                        outstanding = self.inner.outstanding,
                        ?timeout,
                        "Owed reply did not arrive"
                    );
                    return Err(Error::Timeout(timeout));
                }
            };
            self.discard(stale);
        }
        self.drain_stale();
        Ok(())
    }

    /// Discards replies already queued.
    pub fn drain_stale(&mut self) -> usize {
        let mut drained = 0;
        while let Ok(stale) = self.inner.replies.try_recv() {
            self.discard(stale);
            drained += 1;
        }
        drained
    }

    fn discard(&mut self, stale: Result<Response>) {
        self.account(&stale);
        match stale {
            Ok(response) => warn!(%response, "Discarding stale reply"),
            Err(e) => warn!(error = %e, "Discarding stale reply error"),
        }
    }

    /// A 1xx reply is preliminary; the final reply is still owed.
    fn account(&mut self, reply: &Result<Response>) {
        let preliminary = matches!(reply, Ok(r) if r.code.is_preliminary());
        if !preliminary {
            self.inner.outstanding = self.inner.outstanding.saturating_sub(1);
        }
    }
}

async fn read_loop<R>(
    mut reader: LineReader<ReadHalf<R>>,
    mut parser: ReplyParser,
    tx: mpsc::UnboundedSender<Result<Response>>,
    token: CancellationToken,
) where
    R: AsyncRead + Send + Unpin,
{
    loop {
        let line = tokio::select! {
            () = token.cancelled() => break,
            line = reader.read_line() => line,
        };

        match line {
            Ok(Some(line)) => {
                trace!(line = %line, "<");
                match parser.feed(&line) {
                    Ok(Some(response)) => {
                        if tx.send(Ok(response)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        if tx.send(Err(e)).is_err() {
                            break;
                        }
                    }
                }
            }
            Ok(None) => {
                debug!("Control connection closed by server");
                break;
            }
            Err(e) => {
                let _ = tx.send(Err(e));
                break;
            }
        }
    }
    token.cancel();
}

async fn read_welcome<R>(
    reader: &mut LineReader<R>,
    parser: &mut ReplyParser,
    timeout: Duration,
) -> Result<Response>
where
    R: AsyncRead + Unpin,
{
    let welcome = read_reply(reader, parser, timeout).await?;
    if welcome.is_error() {
        return Err(Error::server(welcome.code.as_u16(), welcome.message));
    }
    debug!(code = %welcome.code, message = %welcome.message, "Server welcome");
    Ok(welcome)
}

/// Reads one complete reply directly, before the background reader runs.
async fn read_reply<R>(
    reader: &mut LineReader<R>,
    parser: &mut ReplyParser,
    timeout: Duration,
) -> Result<Response>
where
    R: AsyncRead + Unpin,
{
    let read = async {
        loop {
            let line = reader.read_line().await?.ok_or(Error::ConnectionClosed)?;
            trace!(line = %line, "<");
            if let Some(response) = parser.feed(&line)? {
                return Ok(response);
            }
        }
    };

    tokio::time::timeout(timeout, read)
        .await
        .map_err(|_| Error::Timeout(timeout))?
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
    use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream, duplex};

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Server side of a duplex pipe, line oriented.
    struct Server {
        reader: BufReader<ReadHalf<DuplexStream>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl Server {
        fn new(stream: DuplexStream) -> Self {
            let (r, w) = tokio::io::split(stream);
            Self {
                reader: BufReader::new(r),
                writer: w,
            }
        }

        async fn expect(&mut self, expected: &str) {
            let mut line = String::new();
            self.reader.read_line(&mut line).await.unwrap();
            assert_eq!(line, format!("{expected}\r\n"));
        }

        async fn reply(&mut self, text: &str) {
            self.writer.write_all(text.as_bytes()).await.unwrap();
        }
    }

    async fn open_pair(welcome: &str) -> (ControlChannel<DuplexStream>, Server) {
        let (client, server) = duplex(4096);
        let mut server = Server::new(server);
        server.reply(welcome).await;
        let (channel, _) = ControlChannel::open(client, TIMEOUT).await.unwrap();
        (channel, server)
    }

    #[tokio::test]
    async fn test_multiline_welcome() {
        let (client, server) = duplex(4096);
        let mut server = Server::new(server);
        server.reply("220-Hello\r\n220-MOTD line\r\n220 Ready\r\n").await;

        let (_channel, welcome) = ControlChannel::open(client, TIMEOUT).await.unwrap();
        assert_eq!(welcome.code, StatusCode::SERVICE_READY);
        assert_eq!(welcome.additional, vec!["MOTD line"]);
    }

    #[tokio::test]
    async fn test_error_welcome() {
        let (client, server) = duplex(4096);
        let mut server = Server::new(server);
        server.reply("421 Too many connections\r\n").await;

        let result = ControlChannel::open(client, TIMEOUT).await;
        assert!(matches!(result, Err(Error::Server { code: 421, .. })));
    }

    #[tokio::test]
    async fn test_send_receives_reply() {
        let (channel, mut server) = open_pair("220 Ready\r\n").await;

        let server_task = tokio::spawn(async move {
            server.expect("NOOP").await;
            server.reply("200 NOOP ok\r\n").await;
            server
        });

        let response = channel.send(&Command::Noop).await.unwrap();
        assert_eq!(response.code, StatusCode::COMMAND_OK);
        assert_eq!(response.message, "NOOP ok");
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_send_expect_maps_errors() {
        let (channel, mut server) = open_pair("220 Ready\r\n").await;

        let server_task = tokio::spawn(async move {
            server.expect("CWD /missing").await;
            server.reply("550 No such directory\r\n").await;
            server.expect("PWD").await;
            server.reply("200 odd\r\n").await;
            server
        });

        let cwd = channel
            .send_expect(&Command::Cwd("/missing".to_string()), &[StatusCode::ACTION_OK])
            .await;
        assert!(matches!(cwd, Err(Error::Server { code: 550, .. })));

        let pwd = channel
            .send_expect(&Command::Pwd, &[StatusCode::PATHNAME_CREATED])
            .await;
        assert!(matches!(pwd, Err(Error::UnexpectedReply { code: 200, .. })));
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_sends_are_serialised() {
        let (channel, mut server) = open_pair("220 Ready\r\n").await;
        let channel = Arc::new(channel);

        // The server answers each command only after reading it, and checks
        // that no second command arrives before the first reply is written.
        let server_task = tokio::spawn(async move {
            for _ in 0..2 {
                let mut line = String::new();
                server.reader.read_line(&mut line).await.unwrap();
                assert!(server.reader.buffer().is_empty());
                tokio::time::sleep(Duration::from_millis(20)).await;
                let arg = line.trim_end().trim_start_matches("SIZE ").to_string();
                server.reply(&format!("213 {arg}\r\n")).await;
            }
        });

        let a = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.send(&Command::Size("a".to_string())).await })
        };
        let b = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.send(&Command::Size("b".to_string())).await })
        };

        assert_eq!(a.await.unwrap().unwrap().message, "a");
        assert_eq!(b.await.unwrap().unwrap().message, "b");
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_reply_is_discarded() {
        let (channel, mut server) = open_pair("220 Ready\r\n").await;

        server.reply("226 Late transfer complete\r\n").await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let server_task = tokio::spawn(async move {
            server.expect("NOOP").await;
            server.reply("200 ok\r\n").await;
            server
        });

        let mut guard = channel.lock().await;
        let response = guard.send(&Command::Noop).await.unwrap();
        assert_eq!(response.code, StatusCode::COMMAND_OK);
        drop(guard);
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_drain_stale_counts() {
        let (channel, mut server) = open_pair("220 Ready\r\n").await;
        server.reply("200 one\r\n200 two\r\n").await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut guard = channel.lock().await;
        assert_eq!(guard.drain_stale(), 2);
        assert_eq!(guard.drain_stale(), 0);
    }

    #[tokio::test]
    async fn test_timeout_then_recover() {
        let (channel, mut server) = open_pair("220 Ready\r\n").await;

        let mut guard = channel.lock().await;
        guard.write(&Command::Noop).await.unwrap();
        let result = guard.recv_within(Duration::from_millis(20)).await;
        assert!(matches!(result, Err(Error::Timeout(_))));
        assert_eq!(guard.outstanding(), 1);
        drop(guard);

        // The late reply is only written after the next command has been
        // issued by the caller; it must still not be paired with PWD.
        let server_task = tokio::spawn(async move {
            server.expect("NOOP").await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            server.reply("200 late\r\n").await;
            server.expect("PWD").await;
            server.reply("257 \"/\" is current\r\n").await;
            server
        });

        let response = channel.send(&Command::Pwd).await.unwrap();
        assert_eq!(response.code, StatusCode::PATHNAME_CREATED);
        assert_eq!(channel.lock().await.outstanding(), 0);
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_connection_closed() {
        let (channel, server) = open_pair("220 Ready\r\n").await;
        drop(server);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let result = channel.send(&Command::Noop).await;
        assert!(result.is_err());
        assert!(channel.is_closed());
    }

    #[tokio::test]
    async fn test_cancelled_send_keeps_reader_alive() {
        let (channel, mut server) = open_pair("220 Ready\r\n").await;

        let pending = channel.send(&Command::Noop);
        let cancelled = tokio::time::timeout(Duration::from_millis(20), pending).await;
        assert!(cancelled.is_err());
        assert!(!channel.is_closed());

        let server_task = tokio::spawn(async move {
            server.expect("NOOP").await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            server.reply("200 stale\r\n").await;
            server.expect("FEAT").await;
            server.reply("211-Features:\r\n MLSD\r\n211 End\r\n").await;
            server
        });

        let response = channel.send(&Command::Feat).await.unwrap();
        assert_eq!(response.code, StatusCode::SYSTEM_HELP);
        assert_eq!(response.additional, vec![" MLSD"]);
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_preliminary_reply_keeps_final_owed() {
        let (channel, mut server) = open_pair("220 Ready\r\n").await;

        let server_task = tokio::spawn(async move {
            server.expect("RETR a.txt").await;
            server.reply("150 Opening data connection\r\n").await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            server.reply("426 Transfer aborted\r\n").await;
            server.expect("NOOP").await;
            server.reply("200 NOOP ok\r\n").await;
            server
        });

        let mut guard = channel.lock().await;
        let opening = guard.send(&Command::Retr("a.txt".to_string())).await.unwrap();
        assert_eq!(opening.code, StatusCode::OPENING_DATA);
        assert_eq!(guard.outstanding(), 1);
        drop(guard);

        let response = channel.send(&Command::Noop).await.unwrap();
        assert_eq!(response.code, StatusCode::COMMAND_OK);
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_settle_times_out_without_writing() {
        let (channel, mut server) = open_pair("220 Ready\r\n").await;

        let mut guard = channel.lock().await;
        guard.write(&Command::Noop).await.unwrap();
        drop(guard);
        server.expect("NOOP").await;

        let mut guard = channel.lock().await;
        let settled = guard.settle_within(Duration::from_millis(20)).await;
        assert!(matches!(settled, Err(Error::Timeout(_))));
        assert_eq!(guard.outstanding(), 1);

        server.reply("200 finally\r\n").await;
        guard.settle().await.unwrap();
        assert_eq!(guard.outstanding(), 0);
    }
}
