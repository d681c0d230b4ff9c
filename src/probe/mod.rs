//! The connectivity probe
//!
//! One run: connect, open a cursor, `SELECT version();`, fetch one row, then
//! close the cursor and the connection (each only if it was created). Every
//! failure is captured in the returned report; nothing escapes.

mod report;

pub use report::{Cleanup, ErrorKind, Outcome, ProbeError, ProbeReport, Stage};

use crate::config::ProbeConfig;
use crate::connection::{Connection, Cursor};
use crate::metrics::{counters, histograms, labels};
use std::io::Write;
use std::time::Instant;
use tracing::Instrument;

/// The introspection statement
pub const VERSION_QUERY: &str = "SELECT version();";

/// Prefix of the success line
pub const CONNECTED_LABEL: &str = "You are connected to - ";

/// Prefix of the failure line
pub const FAILURE_LABEL: &str = "Error while connecting to PostgreSQL";

/// Printed once at the end of every run
pub const CLOSED_LINE: &str = "PostgreSQL connection is closed";

/// Run the probe and print the text report to stdout
pub async fn run_probe(config: &ProbeConfig) -> Outcome {
    let report = probe(config).await;
    let mut stdout = std::io::stdout().lock();
    if let Err(e) = report.write_text(&mut stdout).and_then(|_| stdout.flush()) {
        tracing::error!("failed to write report: {}", e);
    }
    report.outcome
}

/// Run the probe without printing anything
pub async fn probe(config: &ProbeConfig) -> ProbeReport {
    let started = Instant::now();
    let mut cleanup = Cleanup::default();

    let outcome = run(config, &mut cleanup)
        .instrument(tracing::info_span!(
            "probe",
            host = %config.host,
            port = config.port,
            database = %config.database,
            user = %config.user
        ))
        .await;

    let label = match &outcome {
        Ok(_) => labels::OUTCOME_SUCCESS,
        Err(err) => {
            tracing::debug!(kind = ?err.kind, stage = ?err.stage, "probe failed: {}", err);
            labels::OUTCOME_FAILURE
        }
    };
    counters::run_finished(label);
    histograms::run_duration(label, started.elapsed().as_millis() as u64);

    ProbeReport { outcome, cleanup }
}

async fn run(config: &ProbeConfig, cleanup: &mut Cleanup) -> Outcome {
    let mut conn = Connection::connect(config)
        .await
        .map_err(|e| ProbeError::new(Stage::Connect, e))?;

    let outcome = query_version(&mut conn, cleanup).await;

    // The socket is dropped even if Terminate or shutdown fails
    if let Err(e) = conn.close().await {
        tracing::warn!("error while closing connection: {}", e);
    }
    cleanup.connection_closed = true;

    outcome
}

async fn query_version(conn: &mut Connection, cleanup: &mut Cleanup) -> Outcome {
    let mut cursor = conn
        .cursor()
        .map_err(|e| ProbeError::new(Stage::Cursor, e))?;

    let fetched = fetch_version(&mut cursor).await;

    cursor.close();
    cleanup.cursor_closed = true;

    fetched
}

async fn fetch_version(cursor: &mut Cursor<'_>) -> Outcome {
    cursor
        .execute(VERSION_QUERY)
        .await
        .map_err(|e| ProbeError::new(Stage::Execute, e))?;

    cursor
        .fetch_one()
        .map_err(|e| ProbeError::new(Stage::Fetch, e))?
        .ok_or_else(ProbeError::no_rows)
}
