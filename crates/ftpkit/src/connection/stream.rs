//! Transport streams for control and data connections.

#![allow(clippy::missing_errors_doc)]

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::{debug, warn};

use super::config::Config;
use crate::{Error, Result};

/// A stream that can be either plaintext or TLS.
pub enum FtpStream {
    /// Plaintext TCP stream.
    Plain(TcpStream),
    /// TLS-encrypted stream (boxed to reduce enum size).
    Tls(Box<TlsStream<TcpStream>>),
}

impl FtpStream {
    /// Upgrades a plaintext stream to TLS.
    pub async fn upgrade_to_tls(self, tls: &TlsSettings) -> Result<Self> {
        match self {
            Self::Plain(tcp) => {
                let stream = tls
                    .connector
                    .connect(tls.server_name.clone(), tcp)
                    .await?;
                debug!("TLS handshake complete");
                Ok(Self::Tls(Box::new(stream)))
            }
            Self::Tls(_) => Err(Error::Protocol("stream is already TLS".to_string())),
        }
    }

    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl std::fmt::Debug for FtpStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("FtpStream::Plain"),
            Self::Tls(_) => f.write_str("FtpStream::Tls"),
        }
    }
}

impl AsyncRead for FtpStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for FtpStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Opens a TCP connection with zero linger.
pub async fn connect(addr: SocketAddr, timeout: Duration) -> Result<FtpStream> {
    let tcp = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| Error::Timeout(timeout))??;

    #[allow(deprecated)]
    tcp.set_linger(Some(Duration::ZERO))?;
    tcp.set_nodelay(true)?;

    debug!(%addr, "TCP connected");
    Ok(FtpStream::Plain(tcp))
}

/// TLS connector and server name shared by every stream of one session.
///
/// Data connections reuse the control connection's connector so rustls can
/// resume the TLS session, which many FTPS servers require.
#[derive(Clone)]
pub struct TlsSettings {
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

impl std::fmt::Debug for TlsSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsSettings")
            .field("server_name", &self.server_name)
            .finish_non_exhaustive()
    }
}

impl TlsSettings {
    /// Builds the TLS client configuration from the connection settings.
    pub fn from_config(config: &Config) -> Result<Self> {
        if config.tls_versions.is_empty() {
            return Err(Error::InvalidArgument(
                "at least one TLS version is required".to_string(),
            ));
        }
        let versions: Vec<&'static rustls::SupportedProtocolVersion> =
            config.tls_versions.iter().map(|v| v.protocol()).collect();

        let builder = rustls::ClientConfig::builder_with_protocol_versions(&versions);
        let builder = if config.ignore_certificate_errors {
            warn!(host = %config.host, "TLS certificate validation disabled");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
        } else {
            let root_store = rustls::RootCertStore {
                roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
            };
            builder.with_root_certificates(root_store)
        };

        let tls_config = match &config.client_identity {
            Some(identity) => builder
                .with_client_auth_cert(identity.cert_chain.clone(), identity.key.clone_key())?,
            None => builder.with_no_client_auth(),
        };

        let host = config.host.trim_start_matches('[').trim_end_matches(']');
        let server_name = ServerName::try_from(host.to_string())?;

        Ok(Self {
            connector: TlsConnector::from(Arc::new(tls_config)),
            server_name,
        })
    }
}

/// Verifier used when certificate errors are explicitly ignored.
#[derive(Debug)]
struct AcceptAnyCertificate;

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
            SignatureScheme::ED448,
        ]
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
    use crate::connection::{Encryption, TlsVersion};

    #[test]
    fn test_tls_settings_from_config() {
        let config = Config::builder("ftp.example.com")
            .encryption(Encryption::Explicit)
            .build();
        let settings = TlsSettings::from_config(&config).unwrap();
        assert_eq!(
            settings.server_name,
            ServerName::try_from("ftp.example.com").unwrap()
        );
    }

    #[test]
    fn test_tls_settings_accept_ip_literal() {
        let config = Config::builder("[::1]")
            .ignore_certificate_errors(true)
            .tls_versions([TlsVersion::Tls13])
            .build();
        assert!(TlsSettings::from_config(&config).is_ok());
    }

    #[test]
    fn test_tls_settings_need_a_version() {
        let config = Config::builder("ftp.example.com")
            .tls_versions(Vec::new())
            .build();
        assert!(matches!(
            TlsSettings::from_config(&config),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_plain() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (stream, accepted) = tokio::join!(connect(addr, Duration::from_secs(5)), listener.accept());
        let stream = stream.unwrap();
        assert!(!stream.is_tls());
        assert!(accepted.is_ok());
    }
}
