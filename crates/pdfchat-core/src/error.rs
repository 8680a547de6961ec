//! Error types for the core library.

use std::path::PathBuf;

use thiserror::Error;

/// Why a query to the QA endpoint did not produce an answer.
///
/// Every variant is handled the same way by the session: the user sees the
/// fallback reply and the error goes to the log.
#[derive(Error, Debug)]
pub enum AskError {
    /// Connection, DNS, timeout or body read failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint answered with a non-2xx status.
    #[error("endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// 2xx, but the body was not `{"response": <string>}`.
    #[error("malformed response body: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The caller stopped waiting before the endpoint answered.
    #[error("request was cancelled before settling")]
    Cancelled,

    /// The request future panicked before settling.
    #[error("request task panicked: {0}")]
    Panicked(String),
}

/// Startup configuration problems. These are fatal for the binary.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no QA endpoint configured (use --endpoint, PDFCHAT_ENDPOINT, or the config file)")]
    MissingEndpoint,

    #[error("invalid QA endpoint {url:?}: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("could not determine config directory")]
    NoConfigDir,

    #[error("failed to access config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
