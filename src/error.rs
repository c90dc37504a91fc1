use std::io;

use thiserror::Error;

/// Errors surfaced to the embedding application.
///
/// Protocol-level failures (bad request lines, oversized bodies, auth
/// denials) never show up here; they are answered on the wire with the
/// matching status code. This type covers configuration and registration
/// mistakes plus fatal I/O.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("a route prefix cannot be empty")]
    EmptyRoute,

    #[error("metric already exists with the same name and labels: {0}")]
    DuplicateMetric(String),

    #[error("unknown state {0:?}")]
    UnknownState(String),

    #[error("state index {index} out of range (states: {len})")]
    StateIndexOutOfRange { index: usize, len: usize },

    #[error("newlines are not allowed in SSE event names or payloads")]
    InvalidSseEvent,
}

pub type Result<T> = std::result::Result<T, Error>;
