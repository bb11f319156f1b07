//! Connection configuration types.

use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use serde::{Deserialize, Serialize};

/// Control connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Encryption {
    /// Plain FTP (port 21). **Credentials travel in clear text.**
    #[default]
    None,
    /// Start in plaintext and upgrade with `AUTH TLS` (port 21).
    Explicit,
    /// TLS from the first byte (port 990).
    Implicit,
}

impl Encryption {
    /// Returns the default port for this mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None | Self::Explicit => 21,
            Self::Implicit => 990,
        }
    }

    /// Returns true if the connection will be encrypted.
    #[must_use]
    pub const fn is_encrypted(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Preferred address family for control and data connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IpVersion {
    /// IPv4.
    #[default]
    V4,
    /// IPv6.
    V6,
}

/// Representation type sent with `TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransferMode {
    /// `TYPE A`.
    Ascii,
    /// `TYPE I`.
    #[default]
    Binary,
}

impl TransferMode {
    /// Returns the `TYPE` argument character.
    #[must_use]
    pub const fn type_char(self) -> char {
        match self {
            Self::Ascii => 'A',
            Self::Binary => 'I',
        }
    }
}

/// TLS protocol version allowed during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TlsVersion {
    /// TLS 1.2.
    Tls12,
    /// TLS 1.3.
    Tls13,
}

impl TlsVersion {
    pub(crate) const fn protocol(self) -> &'static rustls::SupportedProtocolVersion {
        match self {
            Self::Tls12 => &rustls::version::TLS12,
            Self::Tls13 => &rustls::version::TLS13,
        }
    }
}

/// Client certificate chain and key for mutual TLS.
#[derive(Debug)]
pub struct ClientIdentity {
    /// Certificate chain, leaf first.
    pub cert_chain: Vec<CertificateDer<'static>>,
    /// Private key for the leaf certificate.
    pub key: PrivateKeyDer<'static>,
}

/// FTP connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server hostname or IP literal.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Login name.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Directory to enter after login, always starting with `/`.
    pub base_directory: String,
    /// Security mode.
    pub encryption: Encryption,
    /// Preferred address family.
    pub ip_version: IpVersion,
    /// Representation type set after login.
    pub transfer_mode: TransferMode,
    /// Optional second `TYPE` argument (e.g., `N`).
    pub mode_second_type: Option<char>,
    /// TLS versions offered during the handshake.
    pub tls_versions: Vec<TlsVersion>,
    /// Accept any server certificate. Only for testing against self-signed servers.
    pub ignore_certificate_errors: bool,
    /// Client certificate for mutual TLS.
    #[serde(skip)]
    pub client_identity: Option<Arc<ClientIdentity>>,
    /// Inactivity timeout for control and data reads.
    pub timeout: Duration,
    /// Timeout used while tearing down a finished data stream.
    pub disconnect_timeout: Duration,
}

impl Config {
    /// Creates a configuration for anonymous, unencrypted access on port 21.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        ConfigBuilder::new(host).build()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(host)
    }
}

/// Builder for connection configuration.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    host: String,
    port: Option<u16>,
    username: String,
    password: String,
    base_directory: String,
    encryption: Encryption,
    ip_version: IpVersion,
    transfer_mode: TransferMode,
    mode_second_type: Option<char>,
    tls_versions: Vec<TlsVersion>,
    ignore_certificate_errors: bool,
    client_identity: Option<Arc<ClientIdentity>>,
    timeout: Duration,
    disconnect_timeout: Duration,
}

impl ConfigBuilder {
    /// Creates a new builder with the given host.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            username: String::new(),
            password: String::new(),
            base_directory: "/".to_string(),
            encryption: Encryption::None,
            ip_version: IpVersion::V4,
            transfer_mode: TransferMode::Binary,
            mode_second_type: None,
            tls_versions: vec![TlsVersion::Tls12, TlsVersion::Tls13],
            ignore_certificate_errors: false,
            client_identity: None,
            timeout: Duration::from_secs(120),
            disconnect_timeout: Duration::from_millis(100),
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the login credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Sets the directory entered after login.
    #[must_use]
    pub fn base_directory(mut self, path: impl Into<String>) -> Self {
        self.base_directory = path.into();
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn encryption(mut self, encryption: Encryption) -> Self {
        self.encryption = encryption;
        self
    }

    /// Sets the preferred address family.
    #[must_use]
    pub const fn ip_version(mut self, ip_version: IpVersion) -> Self {
        self.ip_version = ip_version;
        self
    }

    /// Sets the representation type and optional second type character.
    #[must_use]
    pub const fn transfer_mode(mut self, mode: TransferMode, second: Option<char>) -> Self {
        self.transfer_mode = mode;
        self.mode_second_type = second;
        self
    }

    /// Sets the TLS versions offered during the handshake.
    #[must_use]
    pub fn tls_versions(mut self, versions: impl Into<Vec<TlsVersion>>) -> Self {
        self.tls_versions = versions.into();
        self
    }

    /// Accepts any server certificate.
    #[must_use]
    pub const fn ignore_certificate_errors(mut self, ignore: bool) -> Self {
        self.ignore_certificate_errors = ignore;
        self
    }

    /// Sets a client certificate for mutual TLS.
    #[must_use]
    pub fn client_identity(mut self, identity: ClientIdentity) -> Self {
        self.client_identity = Some(Arc::new(identity));
        self
    }

    /// Sets the inactivity timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the data stream teardown timeout.
    #[must_use]
    pub const fn disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.disconnect_timeout = timeout;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        let (username, password) = if self.username.trim().is_empty() {
            ("anonymous".to_string(), String::new())
        } else {
            (self.username, self.password)
        };

        Config {
            host: host_from(&self.host),
            port: self.port.unwrap_or_else(|| self.encryption.default_port()),
            username,
            password,
            base_directory: normalize_directory(&self.base_directory),
            encryption: self.encryption,
            ip_version: self.ip_version,
            transfer_mode: self.transfer_mode,
            mode_second_type: self.mode_second_type,
            tls_versions: self.tls_versions,
            ignore_certificate_errors: self.ignore_certificate_errors,
            client_identity: self.client_identity,
            timeout: self.timeout,
            disconnect_timeout: self.disconnect_timeout,
        }
    }
}

/// Reduces `ftp://user@host:21/path` to `host`; plain hosts pass through.
fn host_from(value: &str) -> String {
    let value = value.trim();
    let Some((_, rest)) = value.split_once("://") else {
        return value.to_string();
    };

    let authority = rest.split('/').next().unwrap_or(rest);
    let authority = authority.rsplit_once('@').map_or(authority, |(_, h)| h);

    if authority.starts_with('[') {
        return authority
            .find(']')
            .map_or(authority, |end| &authority[..=end])
            .to_string();
    }
    authority.split(':').next().unwrap_or(authority).to_string()
}

/// Makes the path absolute with a single leading `/` and no trailing `/`.
pub(crate) fn normalize_directory(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    format!("/{trimmed}")
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
    fn test_defaults() {
        let config = Config::new("ftp.example.com");
        assert_eq!(config.host, "ftp.example.com");
        assert_eq!(config.port, 21);
        assert_eq!(config.username, "anonymous");
        assert_eq!(config.password, "");
        assert_eq!(config.base_directory, "/");
        assert_eq!(config.encryption, Encryption::None);
        assert_eq!(config.ip_version, IpVersion::V4);
        assert_eq!(config.transfer_mode, TransferMode::Binary);
        assert_eq!(config.tls_versions, vec![TlsVersion::Tls12, TlsVersion::Tls13]);
        assert!(!config.ignore_certificate_errors);
        assert_eq!(config.timeout, Duration::from_secs(120));
        assert_eq!(config.disconnect_timeout, Duration::from_millis(100));
    }

    #[test]
    fn test_default_ports() {
        assert_eq!(Encryption::None.default_port(), 21);
        assert_eq!(Encryption::Explicit.default_port(), 21);
        assert_eq!(Encryption::Implicit.default_port(), 990);

        let config = Config::builder("h").encryption(Encryption::Implicit).build();
        assert_eq!(config.port, 990);

        let config = Config::builder("h")
            .encryption(Encryption::Implicit)
            .port(2990)
            .build();
        assert_eq!(config.port, 2990);
    }

    #[test]
    fn test_credentials() {
        let config = Config::builder("h").credentials("alice", "secret").build();
        assert_eq!(config.username, "alice");
        assert_eq!(config.password, "secret");

        let config = Config::builder("h").credentials("  ", "ignored").build();
        assert_eq!(config.username, "anonymous");
        assert_eq!(config.password, "");
    }

    #[test]
    fn test_host_from_url() {
        assert_eq!(host_from("ftp://ftp.example.com/pub"), "ftp.example.com");
        assert_eq!(host_from("ftp://bob@ftp.example.com:2121/"), "ftp.example.com");
        assert_eq!(host_from("ftps://[::1]:990"), "[::1]");
        assert_eq!(host_from(" 10.0.0.1 "), "10.0.0.1");
    }

    #[test]
    fn test_base_directory_normalised() {
        assert_eq!(normalize_directory(""), "/");
        assert_eq!(normalize_directory("/"), "/");
        assert_eq!(normalize_directory("pub/incoming/"), "/pub/incoming");
        assert_eq!(normalize_directory("//data"), "/data");
    }

    #[test]
    fn test_serde_round_trip() {
        let config = Config::builder("ftp.example.com")
            .encryption(Encryption::Explicit)
            .transfer_mode(TransferMode::Ascii, Some('N'))
            .build();

        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.encryption, Encryption::Explicit);
        assert_eq!(back.mode_second_type, Some('N'));
        assert!(back.client_identity.is_none());
    }
}
