//! Error types for the livescore pipeline
//!
//! Every error here is scoped to a single frame, snapshot, handler or
//! configuration value. None of them is fatal to a running session.

use thiserror::Error;

/// Failure raised by an application callback.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Errors while turning a `log` frame into typed events.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The frame text is not JSON at all.
    #[error("log frame is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// The frame parsed but carries no `log` list.
    #[error("log frame has no 'log' list")]
    MissingLog,

    /// A transport line that is not a `[event, data]` array.
    #[error("unexpected transport message: {0}")]
    UnexpectedMessage(String),

    /// A recognised event kind is missing or mistyping a required field.
    #[error("malformed {kind} event: {source}")]
    Malformed {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors while rebuilding the scoreboard from a snapshot.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid scoreboard snapshot: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("player '{0}' is listed more than once in the snapshot")]
    DuplicatePlayer(String),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("handler limit of {limit} reached for {kind} events")]
    TooManyHandlers { kind: String, limit: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no numeric match id in url '{0}'")]
    InvalidUrl(String),

    #[error("no match id configured")]
    MissingListId,

    #[error("assist window must be greater than zero")]
    ZeroAssistWindow,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("outbound transport channel is closed")]
    Closed,
}
