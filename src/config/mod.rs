//! Probe configuration
//!
//! A `ProbeConfig` holds everything needed to reach one server: the five
//! classic libpq parameters (host, port, user, password, database) plus the
//! TLS mode and application name. It can be built programmatically, from a
//! `postgres://` URL, or by the CLI from flags and `PG*` environment variables.

mod connection_string;

use crate::connection::SslMode;
use crate::protocol::constants::DEFAULT_PORT;
use std::fmt;
use std::path::PathBuf;

/// Application name reported to the server unless overridden
pub const DEFAULT_APPLICATION_NAME: &str = "pg-probe";

/// Secret string whose `Debug` output is redacted
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    /// Wrap a secret
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Borrow the secret for the authentication exchange
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

impl From<&str> for Password {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Password {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Where the socket goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// TCP host and port
    Tcp {
        /// Hostname or IP address
        host: String,
        /// Port
        port: u16,
    },
    /// Unix domain socket file
    Unix {
        /// Full socket path, e.g. `/run/postgresql/.s.PGSQL.5432`
        path: PathBuf,
    },
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Tcp { host, port } => write!(f, "{}:{}", host, port),
            Target::Unix { path } => write!(f, "{}", path.display()),
        }
    }
}

/// Connection parameters for one probe run
///
/// Values are used as given; nothing is validated before the connection
/// attempt, so a bad value surfaces as a connect or authentication failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Hostname, IP address, or a Unix socket directory (leading `/`)
    pub host: String,
    /// Server port
    pub port: u16,
    /// Role name
    pub user: String,
    /// Password (optional; trust/peer auth needs none)
    pub password: Option<Password>,
    /// Database name
    pub database: String,
    /// SSL/TLS mode
    pub sslmode: SslMode,
    /// CA certificate file used by `verify-ca`/`verify-full`
    pub sslrootcert: Option<PathBuf>,
    /// Name shown in `pg_stat_activity`
    pub application_name: Option<String>,
}

impl Default for ProbeConfig {
    /// libpq-style defaults: `localhost:5432`, OS user, database named after the user
    fn default() -> Self {
        let user = whoami::username();
        Self::new(user.clone(), user)
    }
}

impl ProbeConfig {
    /// Create a configuration for `database` as `user` on `localhost:5432`
    pub fn new(database: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            user: user.into(),
            password: None,
            database: database.into(),
            sslmode: SslMode::default(),
            sslrootcert: None,
            application_name: Some(DEFAULT_APPLICATION_NAME.to_string()),
        }
    }

    /// Create a builder
    ///
    /// ```
    /// use pg_probe::ProbeConfig;
    ///
    /// let config = ProbeConfig::builder("church_ssl", "postgres")
    ///     .host("localhost")
    ///     .port(5432)
    ///     .password("password")
    ///     .build();
    /// assert_eq!(config.target().to_string(), "localhost:5432");
    /// ```
    pub fn builder(database: impl Into<String>, user: impl Into<String>) -> ProbeConfigBuilder {
        ProbeConfigBuilder {
            config: Self::new(database, user),
        }
    }

    /// Set password
    pub fn password(mut self, password: impl Into<Password>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Resolve the socket target; a host starting with `/` is a socket directory
    pub fn target(&self) -> Target {
        if self.host.starts_with('/') {
            Target::Unix {
                path: socket_path(&self.host, self.port),
            }
        } else {
            Target::Tcp {
                host: self.host.clone(),
                port: self.port,
            }
        }
    }
}

/// Construct the full Unix socket path
fn socket_path(socket_dir: &str, port: u16) -> PathBuf {
    PathBuf::from(format!(
        "{}/.s.PGSQL.{}",
        socket_dir.trim_end_matches('/'),
        port
    ))
}

/// Builder for `ProbeConfig`
#[derive(Debug, Clone)]
pub struct ProbeConfigBuilder {
    config: ProbeConfig,
}

impl ProbeConfigBuilder {
    /// Set the host (or socket directory)
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the password
    pub fn password(mut self, password: impl Into<Password>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    /// Set SSL/TLS mode
    pub fn sslmode(mut self, mode: SslMode) -> Self {
        self.config.sslmode = mode;
        self
    }

    /// Set the CA certificate file
    pub fn sslrootcert(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.sslrootcert = Some(path.into());
        self
    }

    /// Set the application name; `None` sends none
    pub fn application_name(mut self, name: Option<String>) -> Self {
        self.config.application_name = name;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ProbeConfig {
        self.config
    }
}
