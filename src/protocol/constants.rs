//! Postgres protocol constants

/// Protocol version 3.0
pub const PROTOCOL_VERSION: i32 = 0x0003_0000;

/// SSLRequest code (80877103 = 1234 << 16 | 5679)
pub const SSL_REQUEST_CODE: i32 = 0x04D2_162F;

/// Default server port
pub const DEFAULT_PORT: u16 = 5432;

/// Single-byte answers to SSLRequest
pub mod ssl_response {
    /// Server will proceed with a TLS handshake
    pub const ACCEPT: u8 = b'S';

    /// Server refuses TLS, continue in plaintext or give up
    pub const REJECT: u8 = b'N';

    /// Pre-7.0 style error instead of a single byte
    pub const ERROR: u8 = b'E';
}

/// Frontend message type tags
pub mod frontend {
    /// PasswordMessage, SASLInitialResponse and SASLResponse share this tag
    pub const PASSWORD: u8 = b'p';

    /// Simple query
    pub const QUERY: u8 = b'Q';

    /// Terminate
    pub const TERMINATE: u8 = b'X';
}

/// Backend message type tags
pub mod tags {
    /// Authentication request
    pub const AUTHENTICATION: u8 = b'R';

    /// Backend key data
    pub const BACKEND_KEY_DATA: u8 = b'K';

    /// Command complete
    pub const COMMAND_COMPLETE: u8 = b'C';

    /// Data row
    pub const DATA_ROW: u8 = b'D';

    /// Empty query string
    pub const EMPTY_QUERY_RESPONSE: u8 = b'I';

    /// Error response
    pub const ERROR_RESPONSE: u8 = b'E';

    /// Notice response
    pub const NOTICE_RESPONSE: u8 = b'N';

    /// Parameter status
    pub const PARAMETER_STATUS: u8 = b'S';

    /// Ready for query
    pub const READY_FOR_QUERY: u8 = b'Z';

    /// Row description
    pub const ROW_DESCRIPTION: u8 = b'T';
}

/// Authentication request codes
pub mod auth {
    /// Authentication successful
    pub const OK: i32 = 0;

    /// Kerberos V5 (unsupported)
    pub const KERBEROS_V5: i32 = 2;

    /// Cleartext password required
    pub const CLEARTEXT_PASSWORD: i32 = 3;

    /// MD5 password required
    pub const MD5_PASSWORD: i32 = 5;

    /// GSSAPI (unsupported)
    pub const GSS: i32 = 7;

    /// SSPI (unsupported)
    pub const SSPI: i32 = 9;

    /// SASL mechanisms available (Postgres 10+)
    pub const SASL: i32 = 10;

    /// SASL server challenge
    pub const SASL_CONTINUE: i32 = 11;

    /// SASL server final message
    pub const SASL_FINAL: i32 = 12;
}

/// Transaction status reported by ReadyForQuery
pub mod tx_status {
    /// Idle (not in transaction)
    pub const IDLE: u8 = b'I';

    /// In transaction block
    pub const IN_TRANSACTION: u8 = b'T';

    /// Failed transaction (queries will be rejected until END)
    pub const FAILED: u8 = b'E';
}

/// SASL mechanism negotiated for SCRAM
pub const SCRAM_SHA_256: &str = "SCRAM-SHA-256";
