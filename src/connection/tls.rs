//! TLS configuration and support for secure connections to Postgres.
//!
//! Certificate checking follows libpq's `sslmode` semantics:
//!
//! | mode          | encrypted          | chain verified | hostname verified |
//! |---------------|--------------------|----------------|-------------------|
//! | `disable`     | no                 | -              | -                 |
//! | `prefer`      | if server agrees   | no             | no                |
//! | `require`     | yes                | no             | no                |
//! | `verify-ca`   | yes                | yes            | no                |
//! | `verify-full` | yes                | yes            | yes               |

use crate::{Error, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// SSL/TLS connection mode matching PostgreSQL `sslmode` parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SslMode {
    /// No TLS (plaintext connection)
    Disable,
    /// Try TLS, fall back to plaintext when the server refuses
    #[default]
    Prefer,
    /// TLS required, but server certificate is not verified
    Require,
    /// TLS required, server certificate must be signed by a trusted CA
    VerifyCa,
    /// TLS required, server certificate must be signed by a trusted CA and hostname must match
    VerifyFull,
}

impl SslMode {
    /// Whether this mode requires certificate verification (CA or full)
    pub fn requires_verification(&self) -> bool {
        matches!(self, Self::VerifyCa | Self::VerifyFull)
    }

    /// Whether a plaintext session is acceptable when the server refuses TLS
    pub fn allows_plaintext(&self) -> bool {
        matches!(self, Self::Disable | Self::Prefer)
    }
}

impl std::fmt::Display for SslMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disable => write!(f, "disable"),
            Self::Prefer => write!(f, "prefer"),
            Self::Require => write!(f, "require"),
            Self::VerifyCa => write!(f, "verify-ca"),
            Self::VerifyFull => write!(f, "verify-full"),
        }
    }
}

impl std::str::FromStr for SslMode {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "disable" => Ok(Self::Disable),
            "prefer" => Ok(Self::Prefer),
            "require" => Ok(Self::Require),
            "verify-ca" => Ok(Self::VerifyCa),
            "verify-full" => Ok(Self::VerifyFull),
            _ => Err(Error::Config(format!(
                "invalid sslmode '{}': expected disable, prefer, require, verify-ca, or verify-full",
                s
            ))),
        }
    }
}

/// Compiled TLS settings for one connection attempt
#[derive(Clone)]
pub struct TlsConfig {
    mode: SslMode,
    ca_cert_path: Option<PathBuf>,
    client_config: Arc<ClientConfig>,
}

impl TlsConfig {
    /// Build the rustls configuration for `mode`.
    ///
    /// Returns `None` for `disable`. Root certificates are only loaded for the
    /// verifying modes: `sslrootcert` if given, else the platform store, else
    /// the bundled Mozilla roots.
    pub fn for_mode(mode: SslMode, sslrootcert: Option<&Path>) -> Result<Option<Self>> {
        let provider = crypto_provider();
        let verifier: Arc<dyn ServerCertVerifier> = match mode {
            SslMode::Disable => return Ok(None),
            SslMode::Prefer | SslMode::Require => Arc::new(AcceptAnyServerCert(provider.clone())),
            SslMode::VerifyCa | SslMode::VerifyFull => {
                let roots = match sslrootcert {
                    Some(path) => load_ca_file(path)?,
                    None => load_system_roots(),
                };
                let webpki = WebPkiServerVerifier::builder_with_provider(
                    Arc::new(roots),
                    provider.clone(),
                )
                .build()
                .map_err(|e| Error::Tls(format!("could not build certificate verifier: {}", e)))?;
                if mode == SslMode::VerifyFull {
                    webpki
                } else {
                    Arc::new(IgnoreHostname(webpki))
                }
            }
        };

        let client_config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::Tls(format!("unsupported TLS configuration: {}", e)))?
            .dangerous()
            .with_custom_certificate_verifier(verifier)
            .with_no_client_auth();

        Ok(Some(Self {
            mode,
            ca_cert_path: sslrootcert.map(Path::to_path_buf),
            client_config: Arc::new(client_config),
        }))
    }

    /// Mode this configuration was built for
    pub fn mode(&self) -> SslMode {
        self.mode
    }

    /// Get the rustls ClientConfig for this TLS configuration.
    pub fn client_config(&self) -> Arc<ClientConfig> {
        self.client_config.clone()
    }
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("mode", &self.mode)
            .field("ca_cert_path", &self.ca_cert_path)
            .field("client_config", &"<ClientConfig>")
            .finish()
    }
}

/// Parse server name from hostname for TLS SNI (Server Name Indication).
pub fn server_name(hostname: &str) -> Result<ServerName<'static>> {
    let hostname = hostname.trim_end_matches('.');
    ServerName::try_from(hostname.to_string())
        .map_err(|_| Error::Tls(format!("invalid hostname for TLS: '{}'", hostname)))
}

fn load_ca_file(path: &Path) -> Result<RootCertStore> {
    let file = File::open(path).map_err(|e| {
        Error::Config(format!(
            "could not read root certificate file \"{}\": {}",
            path.display(),
            e
        ))
    })?;

    let mut store = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut BufReader::new(file)) {
        let cert = cert.map_err(|e| {
            Error::Config(format!(
                "could not parse root certificate file \"{}\": {}",
                path.display(),
                e
            ))
        })?;
        store
            .add(cert)
            .map_err(|e| Error::Config(format!("invalid root certificate: {}", e)))?;
    }

    if store.is_empty() {
        return Err(Error::Config(format!(
            "no certificates found in \"{}\"",
            path.display()
        )));
    }
    Ok(store)
}

fn load_system_roots() -> RootCertStore {
    let result = rustls_native_certs::load_native_certs();
    for err in &result.errors {
        tracing::debug!("skipping platform certificate: {}", err);
    }

    let mut store = RootCertStore::empty();
    let (added, _ignored) = store.add_parsable_certificates(result.certs);
    if added == 0 {
        tracing::debug!("no platform root certificates, using bundled webpki roots");
        store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }
    store
}

fn crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// `prefer`/`require`: encrypt, but trust whatever certificate is presented.
/// Handshake signatures are still checked.
#[derive(Debug)]
struct AcceptAnyServerCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// `verify-ca`: full chain validation, hostname mismatch tolerated
#[derive(Debug)]
struct IgnoreHostname(Arc<WebPkiServerVerifier>);

impl ServerCertVerifier for IgnoreHostname {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        match self
            .0
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            Err(rustls::Error::InvalidCertificate(
                CertificateError::NotValidForName | CertificateError::NotValidForNameContext { .. },
            )) => Ok(ServerCertVerified::assertion()),
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.0.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.0.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.supported_verify_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssl_mode_from_str() {
        assert_eq!("disable".parse::<SslMode>().unwrap(), SslMode::Disable);
        assert_eq!("prefer".parse::<SslMode>().unwrap(), SslMode::Prefer);
        assert_eq!("require".parse::<SslMode>().unwrap(), SslMode::Require);
        assert_eq!("verify-ca".parse::<SslMode>().unwrap(), SslMode::VerifyCa);
        assert_eq!(
            "verify-full".parse::<SslMode>().unwrap(),
            SslMode::VerifyFull
        );
    }

    #[test]
    fn test_ssl_mode_from_str_invalid() {
        assert!("invalid".parse::<SslMode>().is_err());
        assert!("allow".parse::<SslMode>().is_err());
        assert!("Require".parse::<SslMode>().is_err());
    }

    #[test]
    fn test_ssl_mode_display_round_trips() {
        for mode in [
            SslMode::Disable,
            SslMode::Prefer,
            SslMode::Require,
            SslMode::VerifyCa,
            SslMode::VerifyFull,
        ] {
            assert_eq!(mode.to_string().parse::<SslMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_ssl_mode_default_is_prefer() {
        assert_eq!(SslMode::default(), SslMode::Prefer);
    }

    #[test]
    fn test_ssl_mode_policies() {
        assert!(SslMode::Prefer.allows_plaintext());
        assert!(!SslMode::Require.allows_plaintext());
        assert!(!SslMode::Require.requires_verification());
        assert!(SslMode::VerifyCa.requires_verification());
        assert!(SslMode::VerifyFull.requires_verification());
    }

    #[test]
    fn test_disable_builds_no_tls_config() {
        assert!(TlsConfig::for_mode(SslMode::Disable, None).unwrap().is_none());
    }

    #[test]
    fn test_require_builds_without_roots() {
        let tls = TlsConfig::for_mode(SslMode::Require, None).unwrap().unwrap();
        assert_eq!(tls.mode(), SslMode::Require);
        let debug = format!("{:?}", tls);
        assert!(debug.contains("TlsConfig"));
    }

    #[test]
    fn test_missing_root_cert_file_is_config_error() {
        let err = TlsConfig::for_mode(
            SslMode::VerifyFull,
            Some(Path::new("/nonexistent/pg-probe/ca.pem")),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_server_name() {
        assert!(server_name("localhost").is_ok());
        assert!(server_name("db.internal.example.com.").is_ok());
        assert!(server_name("127.0.0.1").is_ok());
        assert!(server_name("::1").is_ok());
        assert!(server_name("bad host name").is_err());
    }
}
