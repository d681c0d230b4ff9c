//! Transport abstraction (TCP with optional TLS vs Unix socket)

use super::tls::{server_name, TlsConfig};
use crate::config::Target;
use crate::protocol::constants::ssl_response;
use crate::protocol::{encode_message, FrontendMessage};
use crate::{Error, Result};
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};
use tokio_rustls::client::TlsStream;

/// Transport layer abstraction
pub enum Transport {
    /// Plain TCP socket
    Tcp(TcpStream),
    /// TLS-encrypted TCP socket
    Tls(Box<TlsStream<TcpStream>>),
    /// Unix domain socket
    Unix(UnixStream),
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Tcp(_) => f.write_str("Transport::Tcp(TcpStream)"),
            Transport::Tls(_) => f.write_str("Transport::Tls(TlsStream)"),
            Transport::Unix(_) => f.write_str("Transport::Unix(UnixStream)"),
        }
    }
}

impl Transport {
    /// Open the socket for `target`
    pub async fn connect(target: &Target) -> Result<Self> {
        match target {
            Target::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port))
                    .await
                    .map_err(|source| Error::Connect {
                        host: host.clone(),
                        port: *port,
                        source,
                    })?;
                stream.set_nodelay(true)?;
                Ok(Transport::Tcp(stream))
            }
            Target::Unix { path } => {
                let stream =
                    UnixStream::connect(path)
                        .await
                        .map_err(|source| Error::ConnectSocket {
                            path: path.clone(),
                            source,
                        })?;
                Ok(Transport::Unix(stream))
            }
        }
    }

    /// Send SSLRequest and upgrade to TLS if the server agrees.
    ///
    /// A refusal (`N`) keeps the plain socket when `mode` allows plaintext and
    /// is an error otherwise.
    pub async fn negotiate_tls(self, tls: &TlsConfig, hostname: &str) -> Result<Self> {
        let mut tcp = match self {
            Transport::Tcp(stream) => stream,
            Transport::Tls(_) => {
                return Err(Error::Tls("transport is already TLS-encrypted".into()));
            }
            Transport::Unix(_) => {
                return Err(Error::Tls("cannot upgrade Unix socket to TLS".into()));
            }
        };

        let request = encode_message(&FrontendMessage::SslRequest)?;
        tcp.write_all(&request).await?;
        tcp.flush().await?;

        // Exactly one byte; anything buffered beyond it would be unencrypted
        // injected data, so read it on its own.
        let response = match tcp.read_u8().await {
            Ok(byte) => byte,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(Error::ConnectionClosed)
            }
            Err(e) => return Err(e.into()),
        };

        match response {
            ssl_response::ACCEPT => {
                tracing::debug!("server accepted TLS, upgrading connection");
                let connector = tokio_rustls::TlsConnector::from(tls.client_config());
                let stream = connector
                    .connect(server_name(hostname)?, tcp)
                    .await
                    .map_err(|e| Error::Tls(format!("TLS handshake failed: {}", e)))?;
                tracing::debug!("TLS connection established");
                Ok(Transport::Tls(Box::new(stream)))
            }
            ssl_response::REJECT if tls.mode().allows_plaintext() => {
                tracing::debug!("server does not support TLS, continuing in plaintext");
                Ok(Transport::Tcp(tcp))
            }
            ssl_response::REJECT => Err(Error::Tls(format!(
                "server does not support SSL, but SSL was required (sslmode={})",
                tls.mode()
            ))),
            // Pre-7.0 servers answer with an ErrorResponse
            ssl_response::ERROR => Err(Error::Protocol(
                "server answered SSLRequest with an error; protocol 3.0 is not supported".into(),
            )),
            other => Err(Error::Protocol(format!(
                "unexpected SSLRequest response byte: 0x{:02X}",
                other
            ))),
        }
    }

    /// Whether traffic is encrypted
    pub fn is_tls(&self) -> bool {
        matches!(self, Transport::Tls(_))
    }

    /// Write all bytes to the transport
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        match self {
            Transport::Tcp(stream) => stream.write_all(buf).await?,
            Transport::Tls(stream) => stream.write_all(buf).await?,
            Transport::Unix(stream) => stream.write_all(buf).await?,
        }
        Ok(())
    }

    /// Flush the transport
    pub async fn flush(&mut self) -> Result<()> {
        match self {
            Transport::Tcp(stream) => stream.flush().await?,
            Transport::Tls(stream) => stream.flush().await?,
            Transport::Unix(stream) => stream.flush().await?,
        }
        Ok(())
    }

    /// Read bytes into buffer
    pub async fn read_buf(&mut self, buf: &mut BytesMut) -> Result<usize> {
        let n = match self {
            Transport::Tcp(stream) => stream.read_buf(buf).await?,
            Transport::Tls(stream) => stream.read_buf(buf).await?,
            Transport::Unix(stream) => stream.read_buf(buf).await?,
        };
        Ok(n)
    }

    /// Shutdown the transport
    pub async fn shutdown(&mut self) -> Result<()> {
        match self {
            Transport::Tcp(stream) => stream.shutdown().await?,
            Transport::Tls(stream) => stream.shutdown().await?,
            Transport::Unix(stream) => stream.shutdown().await?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SslMode;
    use std::path::PathBuf;
    use tokio::net::TcpListener;

    async fn refused_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    #[tokio::test]
    async fn test_tcp_connect_failure_names_target() {
        let port = refused_port().await;
        let target = Target::Tcp {
            host: "127.0.0.1".into(),
            port,
        };
        let err = Transport::connect(&target).await.unwrap_err();
        assert!(matches!(err, Error::Connect { port: p, .. } if p == port));
        assert!(err.to_string().contains("127.0.0.1"));
    }

    #[tokio::test]
    async fn test_unix_connect_failure() {
        let target = Target::Unix {
            path: PathBuf::from("/nonexistent/pg-probe/.s.PGSQL.5432"),
        };
        let err = Transport::connect(&target).await.unwrap_err();
        assert!(matches!(err, Error::ConnectSocket { .. }));
    }

    async fn negotiate_against(answer: u8, mode: SslMode) -> Result<Transport> {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 8];
            socket.read_exact(&mut request).await.unwrap();
            socket.write_all(&[answer]).await.unwrap();
            request
        });

        let transport = Transport::connect(&Target::Tcp {
            host: "127.0.0.1".into(),
            port,
        })
        .await
        .unwrap();
        let tls = TlsConfig::for_mode(mode, None).unwrap().unwrap();
        let result = transport.negotiate_tls(&tls, "127.0.0.1").await;

        let request = server.await.unwrap();
        assert_eq!(request, [0, 0, 0, 8, 0x04, 0xd2, 0x16, 0x2f]);
        result
    }

    #[tokio::test]
    async fn test_prefer_falls_back_to_plaintext() {
        let transport = negotiate_against(b'N', SslMode::Prefer).await.unwrap();
        assert!(!transport.is_tls());
    }

    #[tokio::test]
    async fn test_require_refused_is_tls_error() {
        let err = negotiate_against(b'N', SslMode::Require).await.unwrap_err();
        assert!(matches!(err, Error::Tls(_)));
        assert!(err.to_string().contains("sslmode=require"));
    }

    #[tokio::test]
    async fn test_garbage_ssl_answer_is_protocol_error() {
        let err = negotiate_against(b'?', SslMode::Prefer).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }
}
