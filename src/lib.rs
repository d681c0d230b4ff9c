//! pg-probe: a one-shot PostgreSQL connectivity probe
//!
//! Connects to a server, runs `SELECT version();`, reports the row (or the
//! first error) and closes everything it opened.
//!
//! ```no_run
//! use pg_probe::{probe, ProbeConfig};
//!
//! # async fn example() {
//! let config = ProbeConfig::builder("church_ssl", "postgres")
//!     .host("localhost")
//!     .port(5432)
//!     .password("password")
//!     .build();
//!
//! let report = probe(&config).await;
//! match &report.outcome {
//!     Ok(row) => println!("server says {}", row),
//!     Err(err) => println!("{:?} failure during {:?}: {}", err.kind, err.stage, err),
//! }
//! # }
//! ```
//!
//! The protocol layer is a minimal PostgreSQL v3 frontend: TLS negotiation,
//! cleartext/MD5/SCRAM-SHA-256 authentication, simple queries and Terminate.

#![warn(missing_docs)]

pub mod auth;
pub mod config;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod probe;
pub mod protocol;

pub use config::{Password, ProbeConfig, ProbeConfigBuilder, Target};
pub use connection::{Connection, Cursor, Row, SslMode};
pub use error::{Error, Result};
pub use probe::{
    probe, run_probe, Cleanup, ErrorKind, Outcome, ProbeError, ProbeReport, Stage,
};
