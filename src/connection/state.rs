//! Connection state machine

use crate::{Error, Result};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket open, nothing sent yet
    Initial,

    /// SSLRequest sent, awaiting S/N response
    NegotiatingTls,

    /// Startup sent, awaiting authentication request
    AwaitingAuth,

    /// Authentication exchange in progress
    Authenticating,

    /// Idle (ready for query)
    Idle,

    /// Query sent, no response read yet
    QueryInProgress,

    /// Reading query results up to ReadyForQuery
    ReadingResults,

    /// Terminated or broken; no further traffic
    Closed,
}

impl ConnectionState {
    /// Check if transition is valid
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Initial, NegotiatingTls)
                | (Initial, AwaitingAuth)
                | (NegotiatingTls, AwaitingAuth)
                | (AwaitingAuth, Authenticating)
                | (Authenticating, Idle)
                | (Idle, QueryInProgress)
                | (QueryInProgress, ReadingResults)
                | (ReadingResults, Idle)
                | (_, Closed)
        )
    }

    /// Transition to new state
    pub fn transition(&mut self, next: ConnectionState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(Error::InvalidState {
                expected: format!("valid transition from {}", self),
                actual: next.to_string(),
            });
        }
        *self = next;
        Ok(())
    }

    /// Whether a query may be sent
    pub fn is_idle(&self) -> bool {
        *self == ConnectionState::Idle
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::NegotiatingTls => write!(f, "negotiating_tls"),
            Self::AwaitingAuth => write!(f, "awaiting_auth"),
            Self::Authenticating => write!(f, "authenticating"),
            Self::Idle => write!(f, "idle"),
            Self::QueryInProgress => write!(f, "query_in_progress"),
            Self::ReadingResults => write!(f, "reading_results"),
            Self::Closed => write!(f, "closed"),
        }
    }
}
