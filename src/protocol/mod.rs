//! PostgreSQL frontend/backend protocol (v3.0)
//!
//! Only the messages needed for startup, authentication, a simple query and
//! termination are modelled.

pub mod constants;
pub mod decode;
pub mod encode;
mod message;

pub use decode::decode_message;
pub use encode::encode_message;
pub use message::{
    AuthenticationMessage, BackendMessage, ErrorFields, FieldDescription, FrontendMessage,
    TransactionStatus,
};
