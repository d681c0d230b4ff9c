//! SCRAM-SHA-256 authentication implementation
//!
//! Implements the SCRAM-SHA-256 (Salted Challenge Response Authentication Mechanism)
//! as defined in RFC 5802 and RFC 7677 for PostgreSQL authentication (Postgres 10+).
//! Channel binding is not offered; the GS2 header is always `n,,`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::{Digest, Sha256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// GS2 header for "client does not support channel binding"
const GS2_HEADER: &str = "n,,";

/// Upper bound on the server-chosen PBKDF2 iteration count (PostgreSQL uses 4096)
const MAX_ITERATIONS: u32 = 10_000_000;

/// Characters allowed in a SCRAM nonce (printable ASCII minus ',')
const NONCE_CHARSET: &[u8] =
    b"!\"#$%&'()*+-./0123456789:;<=>?@ABCDEFGHIJKLMNOPQRSTUVWXYZ[\\]^_`abcdefghijklmnopqrstuvwxyz{|}~";

/// SCRAM authentication error types
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScramError {
    /// Server signature did not match
    #[error("invalid server proof: {0}")]
    InvalidServerProof(String),
    /// Malformed server message
    #[error("invalid server message: {0}")]
    InvalidServerMessage(String),
    /// Server aborted the exchange with `e=...`
    #[error("server error: {0}")]
    ServerError(String),
    /// Base64 decoding error
    #[error("Base64 error: {0}")]
    Base64Error(String),
    /// Method called out of order
    #[error("SCRAM exchange out of order: {0}")]
    OutOfOrder(&'static str),
}

/// SCRAM-SHA-256 client
///
/// ```text
/// client_first()        -> SASLInitialResponse
/// client_final(server1) -> SASLResponse
/// verify_server_final(server2)
/// ```
pub struct ScramClient {
    password: String,
    nonce: String,
    client_first_bare: String,
    expected_server_signature: Option<Vec<u8>>,
}

impl ScramClient {
    /// Create a new client with a random 24-character nonce
    pub fn new(username: &str, password: &str) -> Self {
        let mut rng = rand::thread_rng();
        let nonce: String = (0..24)
            .map(|_| NONCE_CHARSET[rng.gen_range(0..NONCE_CHARSET.len())] as char)
            .collect();
        Self::with_nonce(username, password, nonce)
    }

    fn with_nonce(username: &str, password: &str, nonce: String) -> Self {
        // Postgres ignores this name in favor of the startup user, but it
        // still has to be a valid saslname.
        let client_first_bare = format!("n={},r={}", escape_saslname(username), nonce);
        Self {
            password: password.to_string(),
            nonce,
            client_first_bare,
            expected_server_signature: None,
        }
    }

    /// Client first message, sent in SASLInitialResponse
    pub fn client_first(&self) -> String {
        format!("{}{}", GS2_HEADER, self.client_first_bare)
    }

    /// Process the server first message and produce the client final message
    pub fn client_final(&mut self, server_first: &str) -> Result<String, ScramError> {
        let first = ServerFirst::parse(server_first)?;

        if !first.nonce.starts_with(&self.nonce) || first.nonce.len() == self.nonce.len() {
            return Err(ScramError::InvalidServerMessage(
                "server nonce does not extend client nonce".to_string(),
            ));
        }

        let salt = BASE64
            .decode(first.salt)
            .map_err(|_| ScramError::Base64Error("invalid salt encoding".to_string()))?;

        let salted_password = hi(self.password.as_bytes(), &salt, first.iterations);
        let client_key = hmac(&salted_password, b"Client Key");
        let stored_key = Sha256::digest(&client_key);
        let server_key = hmac(&salted_password, b"Server Key");

        let without_proof = format!("c={},r={}", BASE64.encode(GS2_HEADER), first.nonce);
        let auth_message = format!(
            "{},{},{}",
            self.client_first_bare, server_first, without_proof
        );

        let client_signature = hmac(&stored_key, auth_message.as_bytes());
        let proof: Vec<u8> = client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(k, s)| k ^ s)
            .collect();

        self.expected_server_signature = Some(hmac(&server_key, auth_message.as_bytes()));

        Ok(format!("{},p={}", without_proof, BASE64.encode(proof)))
    }

    /// Verify the server final message (`v=<signature>` or `e=<error>`)
    pub fn verify_server_final(&self, server_final: &str) -> Result<(), ScramError> {
        let expected = self
            .expected_server_signature
            .as_ref()
            .ok_or(ScramError::OutOfOrder("server final before client final"))?;

        if let Some(err) = server_final.strip_prefix("e=") {
            return Err(ScramError::ServerError(err.to_string()));
        }

        let encoded = server_final
            .split(',')
            .find_map(|attr| attr.strip_prefix("v="))
            .ok_or_else(|| ScramError::InvalidServerMessage("missing 'v=' attribute".to_string()))?;

        let signature = BASE64.decode(encoded).map_err(|_| {
            ScramError::Base64Error("invalid server signature encoding".to_string())
        })?;

        if constant_time_compare(&signature, expected) {
            Ok(())
        } else {
            Err(ScramError::InvalidServerProof(
                "server signature verification failed".to_string(),
            ))
        }
    }
}

/// Parsed `r=<nonce>,s=<salt>,i=<iterations>`
#[derive(Debug)]
struct ServerFirst<'a> {
    nonce: &'a str,
    salt: &'a str,
    iterations: u32,
}

impl<'a> ServerFirst<'a> {
    fn parse(msg: &'a str) -> Result<Self, ScramError> {
        if msg.starts_with("m=") {
            return Err(ScramError::InvalidServerMessage(
                "mandatory extensions are not supported".to_string(),
            ));
        }

        let (mut nonce, mut salt, mut iterations) = (None, None, None);
        for attr in msg.split(',') {
            if let Some(v) = attr.strip_prefix("r=") {
                nonce = Some(v);
            } else if let Some(v) = attr.strip_prefix("s=") {
                salt = Some(v);
            } else if let Some(v) = attr.strip_prefix("i=") {
                iterations = Some(v);
            }
        }

        let missing = || {
            ScramError::InvalidServerMessage(
                "missing required fields in server first message".to_string(),
            )
        };
        let iterations = iterations
            .ok_or_else(missing)?
            .parse::<u32>()
            .ok()
            .filter(|&i| i > 0)
            .ok_or_else(|| {
                ScramError::InvalidServerMessage("invalid iteration count".to_string())
            })?;
        if iterations > MAX_ITERATIONS {
            return Err(ScramError::InvalidServerMessage(format!(
                "iteration count {} exceeds the limit of {}",
                iterations, MAX_ITERATIONS
            )));
        }

        Ok(Self {
            nonce: nonce.filter(|n| !n.is_empty()).ok_or_else(missing)?,
            salt: salt.filter(|s| !s.is_empty()).ok_or_else(missing)?,
            iterations,
        })
    }
}

/// Hi() from RFC 5802: PBKDF2 with HMAC-SHA-256
fn hi(password: &[u8], salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut out = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
    out
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Constant-time comparison to prevent timing attacks
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// RFC 5802 saslname: '=' and ',' must be escaped
fn escape_saslname(name: &str) -> String {
    name.replace('=', "=3D").replace(',', "=2C")
}
