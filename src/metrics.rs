//! Metrics emitted through the `metrics` facade
//!
//! Nothing is recorded unless the embedding application installs a recorder.

/// Label values
pub mod labels {
    /// Server accepted the connection without a password
    pub const MECHANISM_NONE: &str = "none";
    /// Cleartext password
    pub const MECHANISM_CLEARTEXT: &str = "cleartext";
    /// MD5 password
    pub const MECHANISM_MD5: &str = "md5";
    /// SCRAM-SHA-256
    pub const MECHANISM_SCRAM: &str = "scram-sha-256";

    /// Probe fetched the version row
    pub const OUTCOME_SUCCESS: &str = "success";
    /// Probe reported an error
    pub const OUTCOME_FAILURE: &str = "failure";
}

/// Counters
pub mod counters {
    use metrics::counter;

    /// A socket connect was attempted
    pub fn connect_attempted() {
        counter!("pg_probe_connect_attempts_total").increment(1);
    }

    /// The server asked for credentials with `mechanism`
    pub fn auth_attempted(mechanism: &'static str) {
        counter!("pg_probe_auth_attempts_total", "mechanism" => mechanism).increment(1);
    }

    /// The server sent AuthenticationOk
    pub fn auth_successful(mechanism: &'static str) {
        counter!("pg_probe_auth_success_total", "mechanism" => mechanism).increment(1);
    }

    /// Authentication failed; `reason` is a SQLSTATE or a short client-side cause
    pub fn auth_failed(mechanism: &'static str, reason: &str) {
        counter!(
            "pg_probe_auth_failures_total",
            "mechanism" => mechanism,
            "reason" => reason.to_string()
        )
        .increment(1);
    }

    /// A probe run finished
    pub fn run_finished(outcome: &'static str) {
        counter!("pg_probe_runs_total", "outcome" => outcome).increment(1);
    }
}

/// Histograms
pub mod histograms {
    use metrics::histogram;

    /// Time from Startup to AuthenticationOk
    pub fn auth_duration(mechanism: &'static str, millis: u64) {
        histogram!("pg_probe_auth_duration_ms", "mechanism" => mechanism).record(millis as f64);
    }

    /// Wall time of a whole probe run, cleanup included
    pub fn run_duration(outcome: &'static str, millis: u64) {
        histogram!("pg_probe_run_duration_ms", "outcome" => outcome).record(millis as f64);
    }
}
