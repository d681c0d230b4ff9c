//! Core connection type

use super::cursor::Cursor;
use super::state::ConnectionState;
use super::tls::TlsConfig;
use super::transport::Transport;
use crate::auth::{md5, ScramClient};
use crate::config::{ProbeConfig, Target};
use crate::metrics::{counters, histograms, labels};
use crate::protocol::constants::{PROTOCOL_VERSION, SCRAM_SHA_256};
use crate::protocol::{
    decode_message, encode_message, AuthenticationMessage, BackendMessage, ErrorFields,
    FieldDescription, FrontendMessage,
};
use crate::{Error, Result};
use bytes::BytesMut;
use std::collections::HashMap;
use std::time::Instant;
use tracing::Instrument;

/// Everything a simple query produced up to ReadyForQuery
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Columns of the last result set (empty for commands without rows)
    pub columns: Vec<FieldDescription>,
    /// Text-format values of the last result set, `None` for SQL NULL
    pub rows: Vec<Vec<Option<String>>>,
    /// Tag of the last CommandComplete, e.g. `SELECT 1`
    pub command_tag: Option<String>,
}

/// Postgres connection
pub struct Connection {
    transport: Transport,
    state: ConnectionState,
    read_buf: BytesMut,
    process_id: Option<i32>,
    secret_key: Option<i32>,
    server_params: HashMap<String, String>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("transport", &self.transport)
            .field("state", &self.state)
            .field("process_id", &self.process_id)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Open a socket, negotiate TLS and authenticate
    ///
    /// The returned connection is idle and ready for a query.
    pub async fn connect(config: &ProbeConfig) -> Result<Self> {
        let target = config.target();
        async {
            counters::connect_attempted();

            // Build TLS settings first so a bad sslrootcert fails before any traffic
            let tls = match &target {
                Target::Tcp { .. } => {
                    TlsConfig::for_mode(config.sslmode, config.sslrootcert.as_deref())?
                }
                Target::Unix { .. } => None,
            };

            let mut transport = Transport::connect(&target).await?;
            tracing::debug!("socket connected");
            let mut state = ConnectionState::Initial;

            if let Some(tls) = tls {
                state.transition(ConnectionState::NegotiatingTls)?;
                transport = transport.negotiate_tls(&tls, &config.host).await?;
                if transport.is_tls() {
                    tracing::info!("TLS connection established");
                }
            }

            let mut conn = Self::new(transport, state);
            conn.startup(config).await?;
            Ok(conn)
        }
        .instrument(tracing::info_span!(
            "connect",
            target = %target,
            sslmode = %config.sslmode
        ))
        .await
    }

    fn new(transport: Transport, state: ConnectionState) -> Self {
        Self {
            transport,
            state,
            read_buf: BytesMut::with_capacity(8192),
            process_id: None,
            secret_key: None,
            server_params: HashMap::new(),
        }
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the session is TLS-encrypted
    pub fn is_tls(&self) -> bool {
        self.transport.is_tls()
    }

    /// Backend process id from BackendKeyData
    pub fn backend_pid(&self) -> Option<i32> {
        self.process_id
    }

    /// Process id and secret key a CancelRequest would need
    pub fn backend_key(&self) -> Option<(i32, i32)> {
        self.process_id.zip(self.secret_key)
    }

    /// Value of a ParameterStatus sent by the server (`server_version`, ...)
    pub fn server_parameter(&self, name: &str) -> Option<&str> {
        self.server_params.get(name).map(String::as_str)
    }

    /// Send the StartupMessage and run authentication up to ReadyForQuery
    async fn startup(&mut self, config: &ProbeConfig) -> Result<()> {
        async {
            self.state.transition(ConnectionState::AwaitingAuth)?;

            let mut params = vec![
                ("user".to_string(), config.user.clone()),
                ("database".to_string(), config.database.clone()),
                ("client_encoding".to_string(), "UTF8".to_string()),
            ];
            if let Some(app_name) = &config.application_name {
                params.push(("application_name".to_string(), app_name.clone()));
            }

            let startup = FrontendMessage::Startup {
                version: PROTOCOL_VERSION,
                params,
            };
            self.send_message(&startup).await?;

            self.state.transition(ConnectionState::Authenticating)?;
            self.authenticate(config).await?;

            self.state.transition(ConnectionState::Idle)?;
            tracing::info!(
                server_version = self.server_parameter("server_version").unwrap_or("unknown"),
                "startup complete"
            );
            Ok(())
        }
        .instrument(tracing::info_span!(
            "startup",
            user = %config.user,
            database = %config.database
        ))
        .await
    }

    /// Handle authentication
    async fn authenticate(&mut self, config: &ProbeConfig) -> Result<()> {
        let auth_start = Instant::now();
        let mut mechanism = labels::MECHANISM_NONE;

        loop {
            let msg = self.receive_message().await?;

            match msg {
                BackendMessage::Authentication(auth) => match auth {
                    AuthenticationMessage::Ok => {
                        tracing::debug!(mechanism, "authentication successful");
                        counters::auth_successful(mechanism);
                        histograms::auth_duration(
                            mechanism,
                            auth_start.elapsed().as_millis() as u64,
                        );
                        // ParameterStatus and BackendKeyData follow; keep reading
                    }
                    AuthenticationMessage::CleartextPassword => {
                        mechanism = labels::MECHANISM_CLEARTEXT;
                        counters::auth_attempted(mechanism);
                        let password = required_password(config, mechanism)?;
                        self.send_message(&FrontendMessage::Password(password.to_string()))
                            .await?;
                    }
                    AuthenticationMessage::Md5Password { salt } => {
                        mechanism = labels::MECHANISM_MD5;
                        counters::auth_attempted(mechanism);
                        let password = required_password(config, mechanism)?;
                        let hashed = md5::password_message(&config.user, password, salt);
                        self.send_message(&FrontendMessage::Password(hashed)).await?;
                    }
                    AuthenticationMessage::Sasl { mechanisms } => {
                        mechanism = labels::MECHANISM_SCRAM;
                        counters::auth_attempted(mechanism);
                        self.handle_sasl(&mechanisms, config).await?;
                    }
                    AuthenticationMessage::SaslContinue { .. }
                    | AuthenticationMessage::SaslFinal { .. } => {
                        return Err(Error::Protocol(
                            "unexpected SASL message outside of SASL flow".into(),
                        ));
                    }
                    AuthenticationMessage::Unsupported { code } => {
                        counters::auth_failed(mechanism, "unsupported");
                        return Err(Error::Authentication(format!(
                            "authentication method {} not supported",
                            code
                        )));
                    }
                },
                BackendMessage::BackendKeyData {
                    process_id,
                    secret_key,
                } => {
                    self.process_id = Some(process_id);
                    self.secret_key = Some(secret_key);
                }
                BackendMessage::ParameterStatus { name, value } => {
                    tracing::debug!("parameter status: {} = {}", name, value);
                    self.server_params.insert(name, value);
                }
                BackendMessage::NoticeResponse(notice) => {
                    tracing::info!("server notice: {}", notice);
                }
                BackendMessage::ReadyForQuery(_) => break,
                BackendMessage::ErrorResponse(err) => {
                    return Err(server_auth_failure(mechanism, err));
                }
                other => {
                    return Err(Error::Protocol(format!(
                        "unexpected message during auth: {:?}",
                        other
                    )));
                }
            }
        }

        Ok(())
    }

    /// Handle SASL authentication (SCRAM-SHA-256)
    async fn handle_sasl(&mut self, mechanisms: &[String], config: &ProbeConfig) -> Result<()> {
        if !mechanisms.iter().any(|m| m == SCRAM_SHA_256) {
            counters::auth_failed(labels::MECHANISM_SCRAM, "unsupported");
            return Err(Error::Authentication(format!(
                "none of the server's SASL authentication mechanisms are supported: {}",
                mechanisms.join(", ")
            )));
        }

        let password = required_password(config, labels::MECHANISM_SCRAM)?;
        let mut scram = ScramClient::new(&config.user, password);
        tracing::debug!("initiating SCRAM-SHA-256 authentication");

        self.send_message(&FrontendMessage::SaslInitialResponse {
            mechanism: SCRAM_SHA_256.to_string(),
            data: scram.client_first().into_bytes(),
        })
        .await?;

        let server_first = match self.receive_message().await? {
            BackendMessage::Authentication(AuthenticationMessage::SaslContinue { data }) => {
                sasl_text(data)?
            }
            BackendMessage::ErrorResponse(err) => {
                return Err(server_auth_failure(labels::MECHANISM_SCRAM, err))
            }
            other => {
                return Err(Error::Protocol(format!(
                    "expected SASLContinue, got {:?}",
                    other
                )))
            }
        };

        let client_final = scram
            .client_final(&server_first)
            .map_err(|e| scram_failure("SCRAM error", e))?;
        self.send_message(&FrontendMessage::SaslResponse {
            data: client_final.into_bytes(),
        })
        .await?;

        let server_final = match self.receive_message().await? {
            BackendMessage::Authentication(AuthenticationMessage::SaslFinal { data }) => {
                sasl_text(data)?
            }
            BackendMessage::ErrorResponse(err) => {
                return Err(server_auth_failure(labels::MECHANISM_SCRAM, err))
            }
            other => {
                return Err(Error::Protocol(format!(
                    "expected SASLFinal, got {:?}",
                    other
                )))
            }
        };

        scram
            .verify_server_final(&server_final)
            .map_err(|e| scram_failure("SCRAM verification failed", e))?;

        tracing::debug!("SCRAM-SHA-256 server signature verified");
        Ok(())
    }

    /// Open a cursor on this connection
    ///
    /// The cursor mutably borrows the connection, so it cannot outlive it and
    /// no other query can run while it exists.
    pub fn cursor(&mut self) -> Result<Cursor<'_>> {
        if !self.state.is_idle() {
            return Err(Error::ConnectionBusy(format!(
                "connection in state: {}",
                self.state
            )));
        }
        Ok(Cursor::new(self))
    }

    /// Execute a simple query and collect its results
    ///
    /// A server error is returned only after the trailing ReadyForQuery has
    /// been read, so the connection stays usable.
    pub async fn simple_query(&mut self, query: &str) -> Result<QueryResult> {
        if !self.state.is_idle() {
            return Err(Error::ConnectionBusy(format!(
                "connection in state: {}",
                self.state
            )));
        }

        self.state.transition(ConnectionState::QueryInProgress)?;
        self.send_message(&FrontendMessage::Query(query.to_string()))
            .await?;
        self.state.transition(ConnectionState::ReadingResults)?;

        let mut result = QueryResult::default();
        let mut failure: Option<ErrorFields> = None;

        loop {
            match self.receive_message().await? {
                BackendMessage::RowDescription(columns) => {
                    // A later statement's result set replaces the earlier one
                    result.columns = columns;
                    result.rows.clear();
                }
                BackendMessage::DataRow(values) => {
                    let row = values
                        .into_iter()
                        .map(|v| v.map(text_value).transpose())
                        .collect::<Result<Vec<_>>>()?;
                    result.rows.push(row);
                }
                BackendMessage::CommandComplete(tag) => {
                    tracing::debug!(tag = %tag, "command complete");
                    result.command_tag = Some(tag);
                }
                BackendMessage::EmptyQueryResponse => {
                    result.command_tag = None;
                }
                BackendMessage::ErrorResponse(err) => {
                    tracing::debug!("query failed: {}", err);
                    failure.get_or_insert(err);
                }
                BackendMessage::NoticeResponse(notice) => {
                    tracing::info!("server notice: {}", notice);
                }
                BackendMessage::ParameterStatus { name, value } => {
                    self.server_params.insert(name, value);
                }
                BackendMessage::ReadyForQuery(status) => {
                    tracing::trace!(?status, "ready for query");
                    break;
                }
                other => {
                    return Err(Error::Protocol(format!(
                        "unexpected message during query: {:?}",
                        other
                    )));
                }
            }
        }

        self.state.transition(ConnectionState::Idle)?;
        match failure {
            Some(err) => Err(Error::Server(err)),
            None => Ok(result),
        }
    }

    /// Send a frontend message
    async fn send_message(&mut self, msg: &FrontendMessage) -> Result<()> {
        let buf = encode_message(msg)?;
        self.transport.write_all(&buf).await?;
        self.transport.flush().await?;
        Ok(())
    }

    /// Receive a backend message
    async fn receive_message(&mut self) -> Result<BackendMessage> {
        loop {
            match decode_message(&mut self.read_buf) {
                Ok(Some(msg)) => return Ok(msg),
                Ok(None) => {}
                Err(e) => {
                    self.state.transition(ConnectionState::Closed)?;
                    return Err(Error::Protocol(e.to_string()));
                }
            }

            let n = self.transport.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                self.state.transition(ConnectionState::Closed)?;
                return Err(Error::ConnectionClosed);
            }
        }
    }

    /// Send Terminate and shut the socket down
    ///
    /// The socket is released even when this returns an error.
    pub async fn close(mut self) -> Result<()> {
        let was_open = self.state != ConnectionState::Closed;
        self.state.transition(ConnectionState::Closed)?;
        if was_open {
            if let Err(e) = self.send_message(&FrontendMessage::Terminate).await {
                tracing::debug!("could not send Terminate: {}", e);
            }
        }
        self.transport.shutdown().await?;
        tracing::debug!("connection closed");
        Ok(())
    }
}

fn required_password<'a>(config: &'a ProbeConfig, mechanism: &'static str) -> Result<&'a str> {
    match &config.password {
        Some(password) => Ok(password.expose()),
        None => {
            counters::auth_failed(mechanism, "no_password");
            Err(Error::Authentication("no password supplied".into()))
        }
    }
}

fn server_auth_failure(mechanism: &'static str, err: ErrorFields) -> Error {
    counters::auth_failed(mechanism, err.code.as_deref().unwrap_or("server_error"));
    Error::Server(err)
}

fn scram_failure(context: &str, err: crate::auth::ScramError) -> Error {
    counters::auth_failed(labels::MECHANISM_SCRAM, "scram");
    Error::Authentication(format!("{}: {}", context, err))
}

fn sasl_text(data: Vec<u8>) -> Result<String> {
    String::from_utf8(data)
        .map_err(|e| Error::Authentication(format!("invalid UTF-8 in SASL message: {}", e)))
}

fn text_value(bytes: bytes::Bytes) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| Error::Protocol(format!("column value is not valid UTF-8: {}", e)))
}
