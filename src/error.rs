//! Error types

use crate::protocol::ErrorFields;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while talking to the server
#[derive(Debug, Error)]
pub enum Error {
    /// TCP connect failed (refused, unreachable, DNS failure, ...)
    #[error("connection to server at \"{host}\", port {port} failed: {source}")]
    Connect {
        /// Host we tried to reach
        host: String,
        /// Port we tried to reach
        port: u16,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// Unix socket connect failed
    #[error("connection to server on socket \"{}\" failed: {source}", path.display())]
    ConnectSocket {
        /// Socket path
        path: PathBuf,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// I/O error on an established transport
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS negotiation or handshake failure
    #[error("TLS error: {0}")]
    Tls(String),

    /// Client-side authentication failure (unsupported method, bad SCRAM exchange)
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// ErrorResponse sent by the server
    #[error("{0}")]
    Server(ErrorFields),

    /// Unexpected or malformed protocol traffic
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Server closed the socket
    #[error("server closed the connection unexpectedly")]
    ConnectionClosed,

    /// Connection is not idle
    #[error("connection busy: {0}")]
    ConnectionBusy(String),

    /// Illegal state machine transition
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state description
        expected: String,
        /// Actual state description
        actual: String,
    },
}

impl Error {
    /// SQLSTATE code, if the server reported one
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Server(fields) => fields.code.as_deref(),
            _ => None,
        }
    }

    /// Whether the server rejected our credentials (SQLSTATE class 28)
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, Error::Authentication(_))
            || self.sqlstate().is_some_and(|code| code.starts_with("28"))
    }
}
