//! Line-framed client transport over TCP or TLS.
//!
//! The transport owns the socket and frames the byte stream into IRC
//! lines: inbound reads are length-bounded, trimmed of CR/LF, and
//! rejected on control characters (the CTCP `\x01` delimiter excepted);
//! outbound writes are flushed per line. Everything protocol-shaped
//! lives in the [`Engine`](crate::engine::Engine) — the transport never
//! inspects a line's content.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig as TlsConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::warn;

use crate::error::ClientError;

/// Upper bound accepted for one inbound line. Far above the protocol's
/// 512 so over-long lines from lenient servers surface as a typed error
/// instead of silently corrupting the stream.
pub const MAX_INBOUND_LINE_LEN: usize = 8191;

const MAX_LINE_PREVIEW_LEN: usize = 512;

/// Default port for plaintext connections.
pub const DEFAULT_PORT: u16 = 6667;

/// Default port for TLS connections.
pub const DEFAULT_TLS_PORT: u16 = 6697;

/// A parsed connection target.
///
/// Recognized schemes: `irc://` (plaintext), `irc6://` (plaintext,
/// resolve IPv6), `ircs://` (TLS). A bare `host[:port]` is accepted as
/// plaintext.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServerAddr {
    /// Host name or address literal.
    pub host: String,
    /// Port, defaulted per scheme when absent.
    pub port: u16,
    /// Whether to wrap the stream in TLS.
    pub tls: bool,
    /// Whether to prefer IPv6 resolution (`irc6`).
    pub prefer_ipv6: bool,
}

impl ServerAddr {
    /// Parse a connection URI or bare `host[:port]`.
    pub fn parse(uri: &str) -> Result<ServerAddr, ClientError> {
        let (scheme, rest) = match uri.split_once("://") {
            Some((s, r)) => (Some(s), r),
            None => (None, uri),
        };

        let (tls, prefer_ipv6) = match scheme {
            None => (false, false),
            Some(s) if s.eq_ignore_ascii_case("irc") => (false, false),
            Some(s) if s.eq_ignore_ascii_case("irc6") => (false, true),
            Some(s) if s.eq_ignore_ascii_case("ircs") => (true, false),
            Some(other) => return Err(ClientError::InvalidScheme(other.to_string())),
        };

        let rest = rest.trim_end_matches('/');
        if rest.is_empty() {
            return Err(ClientError::EmptyArgument("host"));
        }

        // A bracketed literal keeps its colons: [::1]:6667
        let (host, port) = if let Some(inner) = rest.strip_prefix('[') {
            match inner.split_once(']') {
                Some((addr, tail)) => {
                    let port = tail
                        .strip_prefix(':')
                        .map(|p| p.parse())
                        .transpose()
                        .map_err(|_| ClientError::Validation {
                            what: "port",
                            reason: format!("{:?} is not a port number", tail),
                        })?;
                    (addr.to_string(), port)
                }
                None => {
                    return Err(ClientError::Validation {
                        what: "host",
                        reason: "unterminated IPv6 literal".to_string(),
                    })
                }
            }
        } else {
            match rest.rsplit_once(':') {
                Some((h, p)) => {
                    let port = p.parse().map_err(|_| ClientError::Validation {
                        what: "port",
                        reason: format!("{:?} is not a port number", p),
                    })?;
                    (h.to_string(), Some(port))
                }
                None => (rest.to_string(), None),
            }
        };

        let port = port.unwrap_or(if tls { DEFAULT_TLS_PORT } else { DEFAULT_PORT });

        Ok(ServerAddr {
            host,
            port,
            tls,
            prefer_ipv6,
        })
    }
}

/// Why an inbound read failed.
#[derive(Debug)]
pub enum TransportReadError {
    /// Underlying I/O failure; the connection is gone.
    Io(std::io::Error),
    /// A line exceeded [`MAX_INBOUND_LINE_LEN`].
    LineTooLong {
        /// The first bytes of the offending line.
        preview: String,
    },
    /// A line carried a forbidden control character.
    IllegalControlChar {
        /// The offending character.
        ch: char,
        /// The first bytes of the offending line.
        preview: String,
    },
}

impl From<std::io::Error> for TransportReadError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// A connected line transport.
#[allow(clippy::large_enum_variant)]
pub enum Transport {
    /// Plaintext TCP.
    Tcp {
        reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
        writer: tokio::net::tcp::OwnedWriteHalf,
    },
    /// TLS over TCP.
    Tls {
        reader: BufReader<tokio::io::ReadHalf<TlsStream<TcpStream>>>,
        writer: tokio::io::WriteHalf<TlsStream<TcpStream>>,
    },
}

impl Transport {
    /// Dial `addr`, wrapping in TLS when the scheme asks for it.
    pub async fn connect(addr: &ServerAddr) -> Result<Transport> {
        let stream = Self::dial(addr).await?;

        if let Err(e) = Self::enable_keepalive(&stream) {
            warn!("failed to enable TCP keepalive: {}", e);
        }

        if addr.tls {
            let connector = tls_connector();
            let server_name = ServerName::try_from(addr.host.clone())
                .with_context(|| format!("invalid TLS server name {:?}", addr.host))?;
            let stream = connector
                .connect(server_name, stream)
                .await
                .context("TLS handshake failed")?;
            let (read, write) = tokio::io::split(stream);
            Ok(Transport::Tls {
                reader: BufReader::new(read),
                writer: write,
            })
        } else {
            let (read, write) = stream.into_split();
            Ok(Transport::Tcp {
                reader: BufReader::new(read),
                writer: write,
            })
        }
    }

    async fn dial(addr: &ServerAddr) -> Result<TcpStream> {
        use tokio::net::lookup_host;

        let mut last_err = None;
        let candidates = lookup_host((addr.host.as_str(), addr.port))
            .await
            .with_context(|| format!("cannot resolve {}", addr.host))?;

        // irc6 prefers IPv6 candidates, plain irc takes them as resolved.
        let mut v6 = Vec::new();
        let mut v4 = Vec::new();
        for candidate in candidates {
            if candidate.is_ipv6() {
                v6.push(candidate);
            } else {
                v4.push(candidate);
            }
        }
        let ordered = if addr.prefer_ipv6 {
            v6.into_iter().chain(v4)
        } else {
            v4.into_iter().chain(v6)
        };

        for candidate in ordered {
            match TcpStream::connect(candidate).await {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err
            .map(anyhow::Error::from)
            .unwrap_or_else(|| anyhow::anyhow!("no addresses for {}", addr.host)))
    }

    fn enable_keepalive(stream: &TcpStream) -> Result<()> {
        use socket2::{SockRef, TcpKeepalive};
        use std::time::Duration;

        let sock = SockRef::from(stream);
        let keepalive = TcpKeepalive::new()
            .with_time(Duration::from_secs(120))
            .with_interval(Duration::from_secs(30));
        sock.set_tcp_keepalive(&keepalive)?;
        Ok(())
    }

    /// Whether the stream is TLS-wrapped.
    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tls { .. })
    }

    /// Read the next line, or `None` on a clean peer close.
    pub async fn read_line(&mut self) -> Result<Option<String>, TransportReadError> {
        match self {
            Transport::Tcp { reader, .. } => read_line_limited(reader).await,
            Transport::Tls { reader, .. } => read_line_limited(reader).await,
        }
    }

    /// Write one CRLF-terminated line and flush it.
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        match self {
            Transport::Tcp { writer, .. } => {
                writer.write_all(line.as_bytes()).await?;
                writer.flush().await?;
            }
            Transport::Tls { writer, .. } => {
                writer.write_all(line.as_bytes()).await?;
                writer.flush().await?;
            }
        }
        Ok(())
    }

    /// Split into independently owned read and write halves, so a select
    /// loop can await inbound lines while its handlers write.
    pub fn split(self) -> (TransportReader, TransportWriter) {
        match self {
            Transport::Tcp { reader, writer } => {
                (TransportReader::Tcp(reader), TransportWriter::Tcp(writer))
            }
            Transport::Tls { reader, writer } => {
                (TransportReader::Tls(reader), TransportWriter::Tls(writer))
            }
        }
    }
}

/// The inbound half of a split [`Transport`].
pub enum TransportReader {
    /// Plaintext TCP.
    Tcp(BufReader<tokio::net::tcp::OwnedReadHalf>),
    /// TLS over TCP.
    Tls(BufReader<tokio::io::ReadHalf<TlsStream<TcpStream>>>),
}

impl TransportReader {
    /// Read the next line, or `None` on a clean peer close.
    pub async fn read_line(&mut self) -> Result<Option<String>, TransportReadError> {
        match self {
            TransportReader::Tcp(reader) => read_line_limited(reader).await,
            TransportReader::Tls(reader) => read_line_limited(reader).await,
        }
    }
}

/// The outbound half of a split [`Transport`].
pub enum TransportWriter {
    /// Plaintext TCP.
    Tcp(tokio::net::tcp::OwnedWriteHalf),
    /// TLS over TCP.
    Tls(tokio::io::WriteHalf<TlsStream<TcpStream>>),
}

impl TransportWriter {
    /// Write one CRLF-terminated line and flush it.
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        match self {
            TransportWriter::Tcp(writer) => {
                writer.write_all(line.as_bytes()).await?;
                writer.flush().await?;
            }
            TransportWriter::Tls(writer) => {
                writer.write_all(line.as_bytes()).await?;
                writer.flush().await?;
            }
        }
        Ok(())
    }
}

fn tls_connector() -> TlsConnector {
    let mut roots = RootCertStore::empty();
    let loaded = rustls_native_certs::load_native_certs();
    for error in &loaded.errors {
        warn!("error loading a native root certificate: {}", error);
    }
    for cert in loaded.certs {
        let _ = roots.add(cert);
    }
    let config = TlsConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

async fn read_line_limited<R>(
    reader: &mut BufReader<R>,
) -> Result<Option<String>, TransportReadError>
where
    R: AsyncRead + Unpin,
{
    let mut line: Vec<u8> = Vec::with_capacity(512);
    let mut exceeded_limit = false;

    loop {
        let buffer = reader.fill_buf().await?;

        if buffer.is_empty() {
            if line.is_empty() && !exceeded_limit {
                return Ok(None);
            }
            break;
        }

        let newline_pos = buffer.iter().position(|&b| b == b'\n');
        let to_consume = newline_pos.map_or(buffer.len(), |idx| idx + 1);

        if !exceeded_limit {
            let projected_len = line.len().saturating_add(to_consume);
            if projected_len > MAX_INBOUND_LINE_LEN {
                let available = MAX_INBOUND_LINE_LEN.saturating_sub(line.len());
                line.extend_from_slice(&buffer[..available.min(buffer.len())]);
                exceeded_limit = true;
            } else {
                line.extend_from_slice(&buffer[..to_consume]);
            }
        }

        reader.consume(to_consume);

        if newline_pos.is_some() {
            break;
        }
    }

    if exceeded_limit {
        warn!(
            length = line.len(),
            "inbound line exceeds {} byte limit", MAX_INBOUND_LINE_LEN
        );
        let preview_len = line.len().min(MAX_LINE_PREVIEW_LEN);
        let preview = String::from_utf8_lossy(&line[..preview_len]).to_string();
        return Err(TransportReadError::LineTooLong { preview });
    }

    while matches!(line.last(), Some(b'\r') | Some(b'\n')) {
        line.pop();
    }

    if line.is_empty() {
        return Ok(Some(String::new()));
    }

    let line_str = String::from_utf8_lossy(&line).to_string();

    for ch in line_str.chars() {
        // \x01 passes: it is the CTCP delimiter.
        if ch == '\0' || (ch.is_control() && ch != '\r' && ch != '\n' && ch != '\u{1}') {
            let preview = line_str.chars().take(MAX_LINE_PREVIEW_LEN).collect();
            return Err(TransportReadError::IllegalControlChar { ch, preview });
        }
    }

    Ok(Some(line_str))
}
