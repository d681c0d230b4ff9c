//! Protocol message types

use super::constants::tx_status;
use bytes::Bytes;

/// Frontend message (client → server)
#[derive(Debug, Clone)]
pub enum FrontendMessage {
    /// Startup message
    Startup {
        /// Protocol version
        version: i32,
        /// Connection parameters
        params: Vec<(String, String)>,
    },

    /// SSLRequest message (TLS negotiation)
    SslRequest,

    /// Password message, cleartext or already MD5-hashed
    Password(String),

    /// SASL initial response message
    SaslInitialResponse {
        /// SASL mechanism name (e.g., "SCRAM-SHA-256")
        mechanism: String,
        /// SASL client first message data
        data: Vec<u8>,
    },

    /// SASL response message
    SaslResponse {
        /// SASL client final message data
        data: Vec<u8>,
    },

    /// Simple query
    Query(String),

    /// Terminate message
    Terminate,
}

/// Backend message (server → client)
#[derive(Debug, Clone)]
pub enum BackendMessage {
    /// Authentication request
    Authentication(AuthenticationMessage),

    /// Backend key data (for cancellation)
    BackendKeyData {
        /// Process ID
        process_id: i32,
        /// Secret key
        secret_key: i32,
    },

    /// Command complete
    CommandComplete(String),

    /// Data row; `None` is SQL NULL
    DataRow(Vec<Option<Bytes>>),

    /// Response to an empty query string
    EmptyQueryResponse,

    /// Error response
    ErrorResponse(ErrorFields),

    /// Notice response
    NoticeResponse(ErrorFields),

    /// Parameter status
    ParameterStatus {
        /// Parameter name
        name: String,
        /// Parameter value
        value: String,
    },

    /// Ready for query
    ReadyForQuery(TransactionStatus),

    /// Row description
    RowDescription(Vec<FieldDescription>),
}

/// Authentication message types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationMessage {
    /// Authentication OK
    Ok,

    /// Cleartext password required
    CleartextPassword,

    /// MD5 password required
    Md5Password {
        /// Salt for MD5 hash
        salt: [u8; 4],
    },

    /// SASL authentication mechanisms available (Postgres 10+)
    Sasl {
        /// List of SASL mechanism names (e.g., ["SCRAM-SHA-256"])
        mechanisms: Vec<String>,
    },

    /// SASL continuation message (server challenge)
    SaslContinue {
        /// SASL server first message data
        data: Vec<u8>,
    },

    /// SASL final message (server verification)
    SaslFinal {
        /// SASL server final message data
        data: Vec<u8>,
    },

    /// Any method this client does not implement (Kerberos, GSSAPI, SSPI, ...)
    Unsupported {
        /// Raw authentication request code
        code: i32,
    },
}

/// Transaction status carried by ReadyForQuery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Not in a transaction block
    Idle,
    /// Inside a transaction block
    InTransaction,
    /// Inside a failed transaction block
    Failed,
}

impl TryFrom<u8> for TransactionStatus {
    type Error = u8;

    fn try_from(byte: u8) -> std::result::Result<Self, u8> {
        match byte {
            tx_status::IDLE => Ok(Self::Idle),
            tx_status::IN_TRANSACTION => Ok(Self::InTransaction),
            tx_status::FAILED => Ok(Self::Failed),
            other => Err(other),
        }
    }
}

/// Field description (column metadata)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescription {
    /// Column name
    pub name: String,
    /// Table OID (0 if not a table column)
    pub table_oid: i32,
    /// Column attribute number (0 if not a table column)
    pub column_attr: i16,
    /// Data type OID
    pub type_oid: u32,
    /// Data type size
    pub type_size: i16,
    /// Type modifier
    pub type_modifier: i32,
    /// Format code (0 = text, 1 = binary)
    pub format_code: i16,
}

/// Error/notice fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorFields {
    /// Severity (ERROR, FATAL, WARNING, etc.)
    pub severity: Option<String>,
    /// SQLSTATE code
    pub code: Option<String>,
    /// Human-readable message
    pub message: Option<String>,
    /// Additional detail
    pub detail: Option<String>,
    /// Hint
    pub hint: Option<String>,
    /// Position in query string
    pub position: Option<String>,
}

/// Rendered the way libpq prints server errors:
/// `FATAL:  database "nope" does not exist`, then optional DETAIL/HINT lines.
impl std::fmt::Display for ErrorFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref severity) = self.severity {
            write!(f, "{}:  ", severity)?;
        }
        f.write_str(self.message.as_deref().unwrap_or("unknown server error"))?;
        if let Some(ref detail) = self.detail {
            write!(f, "\nDETAIL:  {}", detail)?;
        }
        if let Some(ref hint) = self.hint {
            write!(f, "\nHINT:  {}", hint)?;
        }
        Ok(())
    }
}
