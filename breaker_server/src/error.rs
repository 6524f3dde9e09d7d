//! Error types for the listener and per-event processing.
//!
//! [`ListenError`] is fatal: the socket is gone and the process should exit so
//! its supervisor can restart it. [`EventError`] is scoped to one datagram;
//! the listener logs it and moves on to the next one.

use thiserror::Error;

/// Socket-level failures that end the listener.
#[derive(Debug, Error)]
pub enum ListenError {
    #[error("failed to bind UDP socket on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to receive datagram: {0}")]
    Receive(#[source] std::io::Error),
}

/// Recoverable failures while handling a single build notification.
#[derive(Debug, Error)]
pub enum EventError {
    /// The datagram was not a JSON build notification.
    #[error("malformed build notification: {0}")]
    Decode(#[from] serde_json::Error),

    /// The CI build page could not be fetched.
    #[error("failed to fetch build details from {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The chat command could not be launched.
    #[error("failed to run chat command `{program}`: {source}")]
    Dispatch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The breaker tally could not be updated.
    #[error("failed to update tally for {key}: {source}")]
    Tally {
        key: String,
        #[source]
        source: TallyError,
    },
}

impl EventError {
    /// Stable label used for log fields and metric labels.
    pub fn category(&self) -> &'static str {
        match self {
            EventError::Decode(_) => "decode",
            EventError::Fetch { .. } => "fetch",
            EventError::Dispatch { .. } => "dispatch",
            EventError::Tally { .. } => "tally",
        }
    }
}

/// Failures talking to the key-value tally store.
#[derive(Debug, Error)]
pub enum TallyError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("stored count {0:?} is not an integer")]
    InvalidCount(String),
    #[error("tally store URL cannot be used as a base URL")]
    InvalidBase,
}
