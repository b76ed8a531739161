//! Endpoint normalization and connection bootstrap for controllers and agents.
//!
//! WebSocket targets are tried over TLS first (certificate and hostname
//! checks disabled) and downgraded to plain `ws://` once if that fails.
//! Raw-stream targets get a single attempt.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::DigitallySignedStruct;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::Result;

/// Pause before the downgraded attempt.
pub const FALLBACK_PAUSE: Duration = Duration::from_millis(500);

/// Deadline for a single connection attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client-side WebSocket stream.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A normalized WebSocket target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsEndpoint {
    secure: bool,
    host: String,
    port: u16,
    path: String,
}

impl WsEndpoint {
    /// Normalize user input.
    ///
    /// `https://` becomes `wss://`, `http://` becomes `ws://`, a missing
    /// scheme means `wss://`. A missing port becomes `default_port`.
    pub fn parse(raw: &str, default_port: u16) -> Result<Self> {
        let raw = raw.trim();
        let (secure, rest) = match split_scheme(raw) {
            Some((scheme, rest)) => match scheme.to_ascii_lowercase().as_str() {
                "https" | "wss" => (true, rest),
                "http" | "ws" => (false, rest),
                _ => {
                    return Err(Error::InvalidEndpoint(format!(
                        "unsupported scheme in {:?}",
                        raw
                    )))
                }
            },
            None => (true, raw),
        };

        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, ""),
        };
        let (host, port) = split_host_port(authority)?;

        Ok(Self {
            secure,
            host,
            port: port.unwrap_or(default_port),
            path: path.to_string(),
        })
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The same endpoint over plain `ws://`.
    pub fn downgrade(&self) -> Self {
        Self {
            secure: false,
            ..self.clone()
        }
    }

    pub fn url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}{}", scheme, authority(&self.host, self.port), self.path)
    }
}

impl fmt::Display for WsEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

/// A normalized raw-stream target: `host:port`, `tcp://` stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEndpoint {
    host: String,
    port: u16,
}

impl RawEndpoint {
    pub fn parse(raw: &str, default_port: u16) -> Result<Self> {
        let raw = raw.trim();
        let rest = match split_scheme(raw) {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("tcp") => rest,
            Some(_) => {
                return Err(Error::InvalidEndpoint(format!(
                    "unsupported scheme in {:?}",
                    raw
                )))
            }
            None => raw,
        };
        let (host, port) = split_host_port(rest.trim_end_matches('/'))?;
        Ok(Self {
            host,
            port: port.unwrap_or(default_port),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for RawEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&authority(&self.host, self.port))
    }
}

fn split_scheme(raw: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = raw.split_once("://")?;
    let valid = !scheme.is_empty()
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some((scheme, rest))
}

fn split_host_port(authority: &str) -> Result<(String, Option<u16>)> {
    let invalid = || Error::InvalidEndpoint(format!("invalid host {:?}", authority));

    if let Some(bracketed) = authority.strip_prefix('[') {
        let (host, tail) = bracketed.split_once(']').ok_or_else(invalid)?;
        if host.is_empty() {
            return Err(invalid());
        }
        let port = match tail {
            "" => None,
            tail => Some(parse_port(tail.strip_prefix(':').ok_or_else(invalid)?)?),
        };
        return Ok((host.to_string(), port));
    }

    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => (host, Some(parse_port(port)?)),
        Some(_) => (authority, None),
        None => (authority, None),
    };
    if host.is_empty() {
        return Err(invalid());
    }
    Ok((host.to_string(), port))
}

fn parse_port(port: &str) -> Result<u16> {
    port.parse()
        .map_err(|_| Error::InvalidEndpoint(format!("invalid port {:?}", port)))
}

fn authority(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Accepts any server certificate for any host name.
#[derive(Debug)]
struct AcceptAnyCert {
    schemes: Vec<rustls::SignatureScheme>,
}

impl ServerCertVerifier for AcceptAnyCert {
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

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.schemes.clone()
    }
}

/// TLS client configuration with certificate and hostname checks disabled.
pub fn insecure_tls_config() -> Result<rustls::ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let schemes = provider
        .signature_verification_algorithms
        .supported_schemes();
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert { schemes }))
        .with_no_client_auth();
    Ok(config)
}

/// One WebSocket connection attempt.
pub async fn connect_ws(endpoint: &WsEndpoint) -> Result<WsStream> {
    let request = endpoint.url().into_client_request()?;
    let connector = if endpoint.is_secure() {
        Some(Connector::Rustls(Arc::new(insecure_tls_config()?)))
    } else {
        None
    };

    debug!(url = %endpoint, "connecting");
    let attempt = connect_async_tls_with_config(request, None, false, connector);
    match tokio::time::timeout(CONNECT_TIMEOUT, attempt).await {
        Ok(Ok((stream, _response))) => Ok(stream),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(Error::Timeout),
    }
}

/// Connect over TLS, falling back once to plain `ws://`.
///
/// Returns the stream and the endpoint that actually worked.
pub async fn connect_with_fallback(endpoint: &WsEndpoint) -> Result<(WsStream, WsEndpoint)> {
    with_fallback(endpoint, FALLBACK_PAUSE, |target| async move {
        connect_ws(&target).await
    })
    .await
}

/// The fallback policy, independent of how a single attempt is made.
pub async fn with_fallback<T, F, Fut>(
    endpoint: &WsEndpoint,
    pause: Duration,
    mut attempt: F,
) -> Result<(T, WsEndpoint)>
where
    F: FnMut(WsEndpoint) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let first = match attempt(endpoint.clone()).await {
        Ok(conn) => {
            info!(url = %endpoint, "connected");
            return Ok((conn, endpoint.clone()));
        }
        Err(e) => e,
    };

    if !endpoint.is_secure() {
        return Err(Error::Connection(format!(
            "could not connect to {}: {}",
            endpoint, first
        )));
    }

    let plain = endpoint.downgrade();
    warn!(url = %endpoint, "secure connection failed ({}), retrying with {}", first, plain);
    tokio::time::sleep(pause).await;

    match attempt(plain.clone()).await {
        Ok(conn) => {
            info!(url = %plain, "connected without TLS");
            Ok((conn, plain))
        }
        Err(second) => Err(Error::Connection(format!(
            "could not connect to {} ({}) nor to {} ({})",
            endpoint, first, plain, second
        ))),
    }
}

/// Single raw-stream connection attempt.
pub async fn connect_raw(endpoint: &RawEndpoint) -> Result<TcpStream> {
    let target = endpoint.to_string();
    debug!(%target, "connecting");
    match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&target)).await {
        Ok(Ok(stream)) => {
            info!(%target, "connected");
            Ok(stream)
        }
        Ok(Err(e)) => Err(Error::Connection(format!("could not connect to {}: {}", target, e))),
        Err(_) => Err(Error::Connection(format!("timed out connecting to {}", target))),
    }
}
