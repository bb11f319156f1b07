//! High-level FTP session.
//!
//! [`FtpClient`] owns the control connection and the session state. Every
//! operation except [`FtpClient::login`] and [`FtpClient::send_raw`] requires
//! a logged-in session.
//!
//! Login runs these steps, failing on the first error:
//!
//! ```text
//! connect ─ (implicit TLS) ─ 220 ─ (AUTH TLS) ─ USER ─ PASS ─ (PBSZ 0, PROT P)
//!         ─ FEAT ─ (OPTS UTF8 ON) ─ TYPE ─ (create base dir) ─ CWD base dir
//! ```

#![allow(clippy::missing_errors_doc)]

mod directory;
mod listing;
mod transfer;

use std::sync::Arc;

use ftpkit_listing::ListingDialect;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

pub use self::listing::NodeStream;
pub use self::transfer::FileTransfer;
use crate::command::Command;
use crate::connection::{
    self, Config, ControlChannel, DataTarget, FtpStream, TlsSettings, Transfer, TransferMode,
};
use crate::resolver::Resolver;
use crate::types::{Response, StatusCode};
use crate::{Error, Result};

/// Character encoding used for paths on the control connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// 7-bit ASCII (RFC 959 default).
    #[default]
    Ascii,
    /// UTF-8, after the server advertised `UTF8`.
    Utf8,
}

/// Mutable state of one logical session.
#[derive(Debug)]
struct SessionState {
    authenticated: bool,
    encrypted: bool,
    working_directory: String,
    encoding: Encoding,
    features: Vec<String>,
    uses_mlsd: bool,
    dialect: Option<ListingDialect>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            authenticated: false,
            encrypted: false,
            working_directory: "/".to_string(),
            encoding: Encoding::Ascii,
            features: Vec::new(),
            uses_mlsd: false,
            dialect: None,
        }
    }
}

/// Async FTP client.
#[derive(Debug)]
pub struct FtpClient {
    config: Config,
    resolver: Resolver,
    tls: Option<TlsSettings>,
    control: Option<ControlChannel<FtpStream>>,
    data_permit: Arc<Semaphore>,
    state: SessionState,
}

impl FtpClient {
    /// Creates a disconnected client.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            resolver: Resolver::new(),
            tls: None,
            control: None,
            data_permit: Arc::new(Semaphore::new(1)),
            state: SessionState::default(),
        }
    }

    /// Creates a client and logs in.
    pub async fn connect(config: Config) -> Result<Self> {
        let mut client = Self::new(config);
        client.login().await?;
        Ok(client)
    }

    /// Returns the connection configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Returns true while a control connection is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.control.as_ref().is_some_and(|c| !c.is_closed())
    }

    /// Returns true after a successful login.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.authenticated && self.is_connected()
    }

    /// Returns true if the control connection is TLS-protected.
    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        self.state.encrypted
    }

    /// Returns the last known working directory.
    #[must_use]
    pub fn working_directory(&self) -> &str {
        &self.state.working_directory
    }

    /// Returns the features advertised in reply to `FEAT`.
    #[must_use]
    pub fn features(&self) -> &[String] {
        &self.state.features
    }

    /// Returns true if `FEAT` listed `name` (case-insensitive).
    #[must_use]
    pub fn supports_feature(&self, name: &str) -> bool {
        self.state.features.iter().any(|feature| {
            feature
                .split_whitespace()
                .next()
                .is_some_and(|token| token.eq_ignore_ascii_case(name))
        })
    }

    /// Returns the active path encoding.
    #[must_use]
    pub const fn encoding(&self) -> Encoding {
        self.state.encoding
    }

    /// Returns the listing dialect in use.
    ///
    /// `Mlsd` when the server supports it; otherwise the dialect detected by
    /// the most recent `LIST`, or `None` before any listing.
    #[must_use]
    pub const fn dialect(&self) -> Option<ListingDialect> {
        self.state.dialect
    }

    /// Connects and logs in, logging out first if already connected.
    pub async fn login(&mut self) -> Result<()> {
        if self.control.is_some() {
            self.logout().await?;
        }

        let encryption = self.config.encryption;
        if encryption.is_encrypted() && self.tls.is_none() {
            self.tls = Some(TlsSettings::from_config(&self.config)?);
        }

        let addr = self
            .resolver
            .resolve(&self.config.host, self.config.port, self.config.ip_version)
            .await?;
        info!(host = %self.config.host, %addr, ?encryption, "Connecting");

        let stream = connection::connect(addr, self.config.timeout).await?;
        let (control, _welcome) =
            ControlChannel::connect(stream, encryption, self.tls.as_ref(), self.config.timeout)
                .await?;
        self.control = Some(control);
        self.state = SessionState {
            encrypted: encryption.is_encrypted(),
            ..SessionState::default()
        };

        if let Err(e) = self.authenticate().await {
            warn!(error = %e, "Login failed");
            self.disconnect();
            return Err(e);
        }
        Ok(())
    }

    async fn authenticate(&mut self) -> Result<()> {
        let control = self.control()?;

        let user = control
            .send_expect(
                &Command::User(self.config.username.clone()),
                &[StatusCode::LOGGED_IN, StatusCode::NEED_PASSWORD],
            )
            .await?;
        if user.code == StatusCode::NEED_PASSWORD {
            control
                .send_expect(
                    &Command::Pass(self.config.password.clone()),
                    &[StatusCode::LOGGED_IN, StatusCode::COMMAND_SUPERFLUOUS],
                )
                .await?;
        }

        if self.state.encrypted {
            control
                .send_expect(&Command::Pbsz(0), &[StatusCode::COMMAND_OK])
                .await?;
            control
                .send_expect(&Command::Prot('P'), &[StatusCode::COMMAND_OK])
                .await?;
        }

        self.state.features = self.negotiate_features().await?;
        self.state.uses_mlsd = self.supports_feature("MLSD");
        self.state.dialect = self.state.uses_mlsd.then_some(ListingDialect::Mlsd);
        self.enable_utf8().await;

        self.set_transfer_mode(self.config.transfer_mode, self.config.mode_second_type)
            .await?;
        self.state.authenticated = true;

        let base = self.config.base_directory.clone();
        if base != "/" {
            self.create_directory(&base).await?;
        }
        self.change_working_directory(&base).await?;

        info!(
            user = %self.config.username,
            directory = %self.state.working_directory,
            mlsd = self.state.uses_mlsd,
            "Logged in"
        );
        Ok(())
    }

    async fn negotiate_features(&self) -> Result<Vec<String>> {
        let response = self.control()?.send(&Command::Feat).await?;
        if response.is_any(&[StatusCode::SYNTAX_ERROR, StatusCode::NOT_IMPLEMENTED]) {
            debug!(code = %response.code, "FEAT not supported");
            return Ok(Vec::new());
        }
        let response = response.expect_one_of(&[StatusCode::SYSTEM_HELP])?;

        Ok(response
            .additional
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty() && !line.starts_with("211"))
            .map(ToString::to_string)
            .collect())
    }

    /// Switches to UTF-8 when advertised. `OPTS UTF8 ON` failures are ignored.
    async fn enable_utf8(&mut self) {
        if self.state.encoding != Encoding::Ascii || !self.supports_feature("UTF8") {
            return;
        }
        self.state.encoding = Encoding::Utf8;

        let Ok(control) = self.control() else { return };
        match control.send(&Command::Opts("UTF8 ON".to_string())).await {
            Ok(response) if response.is_error() => {
                debug!(%response, "OPTS UTF8 ON refused; keeping UTF-8");
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "OPTS UTF8 ON failed"),
        }
    }

    /// Sends `QUIT` and closes the connection.
    ///
    /// Replies still owed by earlier commands are discarded first. Those and
    /// the `QUIT` reply are each awaited for at most the disconnect timeout;
    /// the outcome is ignored.
    pub async fn logout(&mut self) -> Result<()> {
        let Some(control) = self.control.as_ref() else {
            return Ok(());
        };

        let mut guard = control.lock().await;
        if let Err(e) = guard.settle_within(self.config.disconnect_timeout).await {
            debug!(error = %e, "Owed replies not settled before QUIT");
        }
        let quit = async {
            guard.write(&Command::Quit).await?;
            guard.recv_within(self.config.disconnect_timeout).await
        };
        match quit.await {
            Ok(response) => debug!(%response, "QUIT"),
            Err(e) => debug!(error = %e, "QUIT failed"),
        }
        drop(guard);

        self.disconnect();
        info!(host = %self.config.host, "Logged out");
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(control) = self.control.take() {
            control.close();
        }
        self.state = SessionState::default();
    }

    /// Sets the representation type (`TYPE A`, `TYPE I`, `TYPE A N`, ...).
    pub async fn set_transfer_mode(&mut self, mode: TransferMode, second: Option<char>) -> Result<()> {
        self.control()?
            .send_expect(&Command::Type { mode, second }, &[StatusCode::COMMAND_OK])
            .await?;
        self.config.transfer_mode = mode;
        self.config.mode_second_type = second;
        Ok(())
    }

    /// Announces the client name with `CLNT`.
    pub async fn set_client_name(&mut self, name: &str) -> Result<()> {
        self.logged_in()?
            .send_expect(&Command::Clnt(name.to_string()), &[StatusCode::COMMAND_OK])
            .await?;
        Ok(())
    }

    /// Deletes a file.
    pub async fn delete_file(&mut self, path: &str) -> Result<()> {
        require_path(path)?;
        self.logged_in()?
            .send_expect(
                &Command::Dele(path.to_string()),
                &[StatusCode::COMMAND_OK, StatusCode::ACTION_OK],
            )
            .await?;
        Ok(())
    }

    /// Renames a file or directory.
    pub async fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        require_path(from)?;
        require_path(to)?;
        let control = self.logged_in()?;
        control
            .send_expect(
                &Command::Rnfr(from.to_string()),
                &[StatusCode::PENDING_FURTHER_INFO],
            )
            .await?;
        control
            .send_expect(
                &Command::Rnto(to.to_string()),
                &[StatusCode::COMMAND_OK, StatusCode::ACTION_OK],
            )
            .await?;
        Ok(())
    }

    /// Returns the size of a file in bytes.
    pub async fn file_size(&mut self, path: &str) -> Result<u64> {
        require_path(path)?;
        let response = self
            .logged_in()?
            .send_expect(&Command::Size(path.to_string()), &[StatusCode::FILE_STATUS])
            .await?;
        response
            .message
            .trim()
            .parse()
            .map_err(|_| Error::Protocol(format!("malformed SIZE reply: {}", response.message)))
    }

    /// Sends an arbitrary command line and returns the reply uninterpreted.
    pub async fn send_raw(&mut self, line: &str) -> Result<Response> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.contains(['\r', '\n']) {
            return Err(Error::InvalidArgument(
                "command must be a single line".to_string(),
            ));
        }
        self.control()?.send(&Command::Raw(line.to_string())).await
    }

    fn control(&self) -> Result<&ControlChannel<FtpStream>> {
        self.control
            .as_ref()
            .filter(|c| !c.is_closed())
            .ok_or(Error::NotLoggedIn)
    }

    fn logged_in(&self) -> Result<&ControlChannel<FtpStream>> {
        if !self.state.authenticated {
            return Err(Error::NotLoggedIn);
        }
        self.control()
    }

    /// Takes the data permit and the control lock, then opens a data transfer.
    async fn open_transfer(
        &self,
        command: &Command,
    ) -> Result<(OwnedSemaphorePermit, Transfer<FtpStream>)> {
        let control = self.logged_in()?;
        let permit = Arc::clone(&self.data_permit)
            .acquire_owned()
            .await
            .map_err(|_| Error::ConnectionClosed)?;

        let target = DataTarget {
            host: &self.config.host,
            ip_version: self.config.ip_version,
            resolver: &self.resolver,
            tls: self.tls.as_ref().filter(|_| self.state.encrypted),
            timeout: self.config.timeout,
            disconnect_timeout: self.config.disconnect_timeout,
        };
        let transfer = Transfer::open(control.lock().await, command, &target).await?;
        Ok((permit, transfer))
    }
}

/// Rejects empty paths.
fn require_path(path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(Error::InvalidArgument("path must not be empty".to_string()));
    }
    Ok(())
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
    fn test_new_client_is_disconnected() {
        let client = FtpClient::new(Config::new("ftp.example.com"));
        assert!(!client.is_connected());
        assert!(!client.is_authenticated());
        assert!(!client.is_encrypted());
        assert_eq!(client.working_directory(), "/");
        assert_eq!(client.encoding(), Encoding::Ascii);
        assert_eq!(client.dialect(), None);
    }

    #[tokio::test]
    async fn test_operations_require_login() {
        let mut client = FtpClient::new(Config::new("ftp.example.com"));
        assert!(matches!(client.delete_file("a.txt").await, Err(Error::NotLoggedIn)));
        assert!(matches!(client.file_size("a.txt").await, Err(Error::NotLoggedIn)));
        assert!(matches!(client.list_all().await, Err(Error::NotLoggedIn)));
        assert!(matches!(client.send_raw("NOOP").await, Err(Error::NotLoggedIn)));
    }

    #[tokio::test]
    async fn test_logout_when_disconnected() {
        let mut client = FtpClient::new(Config::new("ftp.example.com"));
        assert!(client.logout().await.is_ok());
    }

    #[tokio::test]
    async fn test_argument_validation() {
        let mut client = FtpClient::new(Config::new("ftp.example.com"));
        assert!(matches!(client.delete_file("  ").await, Err(Error::InvalidArgument(_))));
        assert!(matches!(
            client.change_working_directory(".").await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            client.send_raw("NOOP\r\nQUIT").await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_supports_feature() {
        let mut client = FtpClient::new(Config::new("ftp.example.com"));
        client.state.features = vec!["MLST type*;size*;modify*;".to_string(), "UTF8".to_string()];
        assert!(client.supports_feature("utf8"));
        assert!(client.supports_feature("MLST"));
        assert!(!client.supports_feature("MLSD"));
    }
}
