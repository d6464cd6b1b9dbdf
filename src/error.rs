//! Error types shared across the daemon.

use std::path::PathBuf;
use std::time::Duration;

/// Result type alias for daemon operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the control API or driving the
/// reconciliation loop.
///
/// Fatality scope matters more than the variant itself: a failed container
/// list skips the whole discovery cycle, a failed inspect degrades a single
/// record, and nothing here ever terminates the loop.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The control socket could not be dialed.
    #[error("failed to connect to control socket {path}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The control API answered with a non-success status.
    #[error("control api error: {status}: {body}")]
    Api { status: hyper::StatusCode, body: String },

    /// A response body was not the JSON shape we expect.
    #[error("malformed control api response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The overall per-request deadline elapsed.
    #[error("request to {path} timed out after {timeout:?}")]
    Timeout { path: String, timeout: Duration },

    /// The calling context was cancelled before the operation finished.
    #[error("operation cancelled")]
    Cancelled,

    /// Protocol-level failure on an in-flight exchange.
    #[error("http exchange failed: {0}")]
    Http(#[from] hyper::Error),

    /// The request could not even be constructed.
    #[error("invalid request: {0}")]
    Request(#[from] hyper::http::Error),

    /// `start()` was called on a provider that is not idle.
    #[error("provider already started")]
    AlreadyStarted,
}
