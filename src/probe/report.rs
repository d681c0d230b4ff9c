//! Probe outcome and its console renderings

use super::{CLOSED_LINE, CONNECTED_LABEL, FAILURE_LABEL};
use crate::connection::Row;
use crate::Error;
use serde::Serialize;
use serde_json::json;
use std::io::{self, Write};

/// What a probe run produced
pub type Outcome = std::result::Result<Row, ProbeError>;

/// Failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unusable configuration (bad URL, unreadable root certificate)
    Config,
    /// Socket could not be opened
    Connect,
    /// I/O failure on an open socket
    Io,
    /// TLS refused or handshake failed
    Tls,
    /// Credentials rejected or auth method unsupported
    Authentication,
    /// Any other server ErrorResponse
    Server,
    /// Unexpected protocol traffic
    Protocol,
    /// Server hung up
    ConnectionClosed,
    /// The statement returned no row
    NoRows,
}

/// Where in the run the failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Connecting and authenticating
    Connect,
    /// Opening the cursor
    Cursor,
    /// Running the statement
    Execute,
    /// Fetching the row
    Fetch,
}

/// First error of a failed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct ProbeError {
    /// Failure category
    pub kind: ErrorKind,
    /// Step that failed
    pub stage: Stage,
    /// Human-readable description
    pub message: String,
    /// SQLSTATE, when the server sent one
    pub sqlstate: Option<String>,
}

impl ProbeError {
    /// Classify `err` raised during `stage`
    pub fn new(stage: Stage, err: Error) -> Self {
        let kind = match &err {
            Error::Config(_) => ErrorKind::Config,
            Error::Connect { .. } | Error::ConnectSocket { .. } => ErrorKind::Connect,
            Error::Io(_) => ErrorKind::Io,
            Error::Tls(_) => ErrorKind::Tls,
            _ if err.is_auth_rejection() => ErrorKind::Authentication,
            Error::Server(_) => ErrorKind::Server,
            Error::ConnectionClosed => ErrorKind::ConnectionClosed,
            Error::Authentication(_)
            | Error::Protocol(_)
            | Error::ConnectionBusy(_)
            | Error::InvalidState { .. } => ErrorKind::Protocol,
        };

        Self {
            kind,
            stage,
            sqlstate: err.sqlstate().map(str::to_string),
            message: err.to_string(),
        }
    }

    /// The statement completed without returning a row
    pub fn no_rows() -> Self {
        Self {
            kind: ErrorKind::NoRows,
            stage: Stage::Fetch,
            message: "query returned no rows".to_string(),
            sqlstate: None,
        }
    }
}

/// Which handles were released
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Cleanup {
    /// A cursor was opened and then closed
    pub cursor_closed: bool,
    /// A connection was established and then closed
    pub connection_closed: bool,
}

/// Result of one probe run plus the cleanup that happened
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    /// Fetched row or first error
    pub outcome: Outcome,
    /// Released handles
    pub cleanup: Cleanup,
}

impl ProbeReport {
    /// Report for a run that never started because the configuration was unusable
    pub fn config_error(err: Error) -> Self {
        Self {
            outcome: Err(ProbeError::new(Stage::Connect, err)),
            cleanup: Cleanup::default(),
        }
    }

    /// Whether the version row was fetched
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Outcome line followed by the closing line
    pub fn write_text<W: Write>(&self, out: &mut W) -> io::Result<()> {
        match &self.outcome {
            Ok(row) => writeln!(out, "{} {}", CONNECTED_LABEL, row)?,
            Err(err) => writeln!(out, "{} {}", FAILURE_LABEL, err)?,
        }
        writeln!(out, "{}", CLOSED_LINE)
    }

    /// Machine-readable form of the report
    pub fn to_json(&self) -> serde_json::Value {
        match &self.outcome {
            Ok(row) => json!({
                "status": "connected",
                "row": row.to_string(),
                "columns": row.columns(),
                "error": null,
                "cleanup": self.cleanup,
            }),
            Err(err) => json!({
                "status": "error",
                "row": null,
                "columns": [],
                "error": err,
                "cleanup": self.cleanup,
            }),
        }
    }

    /// One pretty-printed JSON document and a newline
    pub fn write_json<W: Write>(&self, out: &mut W) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut *out, &self.to_json())?;
        writeln!(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ErrorFields;

    fn version_row() -> Row {
        Row::new(
            vec!["version".into()],
            vec![Some("PostgreSQL 16.2 on x86_64-pc-linux-gnu".into())],
        )
    }

    fn render(report: &ProbeReport) -> String {
        let mut out = Vec::new();
        report.write_text(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn server_error(code: &str, message: &str) -> Error {
        Error::Server(ErrorFields {
            severity: Some("FATAL".into()),
            code: Some(code.into()),
            message: Some(message.into()),
            ..Default::default()
        })
    }

    #[test]
    fn test_success_text() {
        let report = ProbeReport {
            outcome: Ok(version_row()),
            cleanup: Cleanup {
                cursor_closed: true,
                connection_closed: true,
            },
        };
        assert_eq!(
            render(&report),
            "You are connected to -  ('PostgreSQL 16.2 on x86_64-pc-linux-gnu',)\n\
             PostgreSQL connection is closed\n"
        );
    }

    #[test]
    fn test_failure_text() {
        let err = Error::Connect {
            host: "localhost".into(),
            port: 5432,
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "Connection refused"),
        };
        let report = ProbeReport {
            outcome: Err(ProbeError::new(Stage::Connect, err)),
            cleanup: Cleanup::default(),
        };
        assert_eq!(
            render(&report),
            "Error while connecting to PostgreSQL connection to server at \"localhost\", port 5432 failed: Connection refused\n\
             PostgreSQL connection is closed\n"
        );
    }

    #[test]
    fn test_closing_line_printed_once() {
        let report = ProbeReport::config_error(Error::Config("bad".into()));
        assert_eq!(render(&report).matches(CLOSED_LINE).count(), 1);
    }

    #[test]
    fn test_classification() {
        let auth = ProbeError::new(
            Stage::Connect,
            server_error("28P01", "password authentication failed for user \"postgres\""),
        );
        assert_eq!(auth.kind, ErrorKind::Authentication);
        assert_eq!(auth.sqlstate.as_deref(), Some("28P01"));
        assert_eq!(
            auth.message,
            "FATAL:  password authentication failed for user \"postgres\""
        );

        let missing_db = ProbeError::new(
            Stage::Connect,
            server_error("3D000", "database \"nope\" does not exist"),
        );
        assert_eq!(missing_db.kind, ErrorKind::Server);

        let no_password = ProbeError::new(
            Stage::Connect,
            Error::Authentication("no password supplied".into()),
        );
        assert_eq!(no_password.kind, ErrorKind::Authentication);

        assert_eq!(
            ProbeError::new(Stage::Connect, Error::Tls("refused".into())).kind,
            ErrorKind::Tls
        );
        assert_eq!(
            ProbeError::new(Stage::Execute, Error::ConnectionClosed).kind,
            ErrorKind::ConnectionClosed
        );
        assert_eq!(ProbeError::no_rows().kind, ErrorKind::NoRows);
    }

    #[test]
    fn test_socket_failure_after_connect_is_io() {
        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "connection reset by peer");
        let err = ProbeError::new(Stage::Execute, Error::Io(reset));

        assert_eq!(err.kind, ErrorKind::Io);
        assert_eq!(err.stage, Stage::Execute);
        assert!(err.sqlstate.is_none());
        assert_eq!(serde_json::to_value(err.kind).unwrap(), "io");
    }

    #[test]
    fn test_json_success() {
        let report = ProbeReport {
            outcome: Ok(version_row()),
            cleanup: Cleanup {
                cursor_closed: true,
                connection_closed: true,
            },
        };
        let json = report.to_json();
        assert_eq!(json["status"], "connected");
        assert_eq!(json["row"], "('PostgreSQL 16.2 on x86_64-pc-linux-gnu',)");
        assert_eq!(json["columns"][0], "version");
        assert!(json["error"].is_null());
        assert_eq!(json["cleanup"]["connection_closed"], true);
    }

    #[test]
    fn test_json_failure() {
        let report = ProbeReport {
            outcome: Err(ProbeError::new(
                Stage::Execute,
                server_error("42601", "syntax error"),
            )),
            cleanup: Cleanup {
                cursor_closed: true,
                connection_closed: true,
            },
        };
        let mut out = Vec::new();
        report.write_json(&mut out).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"]["kind"], "server");
        assert_eq!(json["error"]["stage"], "execute");
        assert_eq!(json["error"]["sqlstate"], "42601");
        assert!(json["row"].is_null());
    }
}
