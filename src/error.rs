//! Error types for the transport, session, and configuration layers.

use std::path::PathBuf;

use thiserror::Error;

/// Failures talking to the Solargraph server.
///
/// These never describe a problem *reported by* the server (that is the
/// `status: "error"` variant of a successful response), only problems
/// reaching it or understanding its reply.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid server endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Solargraph server is not ready")]
    NotReady,

    #[error("request cancelled")]
    Cancelled,

    #[error("request timed out")]
    Timeout,
}

impl TransportError {
    /// Map a `reqwest` error, folding its timeout flavour into [`Self::Timeout`].
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(err)
        }
    }
}

/// Failures managing the external server process.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid server endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("server process produced no readable output")]
    NoOutput,

    #[error("server did not report a port within {0:?}")]
    ReadyTimeout(std::time::Duration),

    #[error("server process exited before becoming ready")]
    Exited,
}

/// Failures loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

pub type TransportResult<T> = Result<T, TransportError>;
