//! Connection management
//!
//! This module handles:
//! * Transport abstraction (TCP, TLS over TCP, Unix socket)
//! * Connection lifecycle (startup, auth, query execution, terminate)
//! * State machine enforcement
//! * Cursors borrowed from a connection

mod conn;
mod cursor;
mod state;
mod tls;
mod transport;

pub use conn::{Connection, QueryResult};
pub use cursor::{Cursor, Row};
pub use state::ConnectionState;
pub use tls::{server_name, SslMode, TlsConfig};
pub use transport::Transport;
