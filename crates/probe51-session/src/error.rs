//! Session errors

use thiserror::Error;

/// Session result type
pub type Result<T> = std::result::Result<T, Error>;

/// Session errors
#[derive(Debug, Error)]
pub enum Error {
    /// The monitor process failed to start.
    #[error("failed to spawn monitor process: {0}")]
    Spawn(String),

    #[error("transport i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The expected pattern never appeared; a structurally unrelated line
    /// arrived in its place. Carries the raw text, never retried.
    #[error("protocol mismatch, unexpected monitor response: {raw:?}")]
    ProtocolMismatch { raw: String },

    /// Non-zero exit code observed on terminate.
    #[error("monitor exited with code {0}")]
    AbnormalExit(i32),

    /// Operation invoked before its prerequisites were met.
    #[error("stale session: {0} invoked before required setup")]
    StaleSession(&'static str),

    /// The transport was torn down while expectations were still pending.
    #[error("session closed with expectations pending")]
    Closed,
}
