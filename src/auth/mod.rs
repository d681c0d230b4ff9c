//! Password authentication mechanisms
//!
//! * Cleartext (handled inline by the connection)
//! * MD5
//! * SCRAM-SHA-256

pub mod md5;
mod scram;

pub use scram::{ScramClient, ScramError};
