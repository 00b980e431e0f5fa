//! Error types for the SSH connection manager core.
//!
//! All failures surfaced by this crate are variants of [`GatewayError`]. Per
//! the error-opacity contract, the `Display` text of a variant never embeds
//! the underlying library error string — that detail is reachable only via
//! `std::error::Error::source` for logging.

use thiserror::Error;

/// Unified error type for the SSH connection manager core.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Raised by the config loader before the core runs.
    #[error("{0}")]
    Config(String),

    /// `Manager::get_connection` was called with a name outside the allowlist.
    #[error("host '{name}' is not in the allowlist. Available: {available}")]
    HostNotAllowed { name: String, available: String },

    /// Rejected by [`crate::guard::CommandGuard`].
    #[error("{0}")]
    PermissionDenied(String),

    /// Dial, auth, or host-key failure. Connection state transitions to `Error`.
    #[error("failed to connect to '{host}'")]
    ConnectFailure {
        host: String,
        #[source]
        source: TransportError,
    },

    /// Mid-operation transport fault. Connection state transitions to `Error`.
    #[error("{message}")]
    TransportFailure {
        message: String,
        #[source]
        source: TransportError,
    },

    /// An `execute` deadline was exceeded; the channel was forcibly closed.
    #[error("command timed out on '{host}' (no output for {timeout_secs}s)")]
    Timeout { host: String, timeout_secs: u64 },

    /// A local file was missing (upload) or unwritable (download).
    #[error("{0}")]
    LocalIoError(String),

    /// An application-level failure (e.g. SFTP permission denied). Connection
    /// state is left unchanged.
    #[error("{message}")]
    ApplicationError {
        message: String,
        #[source]
        source: TransportError,
    },
}

/// Opaque wrapper around an underlying transport error.
///
/// Kept separate from [`GatewayError`] so the detailed cause can be attached
/// as a `source()` without ever being interpolated into a `GatewayError`'s
/// `Display` text.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self(detail.into())
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::LocalIoError(err.to_string())
    }
}
