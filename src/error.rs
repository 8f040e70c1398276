//! Error types for the fastls crate.
//!
//! Every failure maps to one of four [`ErrorKind`]s. The executor folds them
//! into a [`FetchResult`](crate::response::FetchResult), so none of these ever
//! reach a transport adapter as an `Err`.

use std::io;
use std::time::Duration;

use serde::Serialize;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification shared by every adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Caller's fault. Never retried.
    Validation,
    /// Network or environment fault (DNS, connect, proxy, TLS).
    Connect,
    /// Deadline exceeded in any phase.
    Timeout,
    /// Unexpected engine-side fault.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Connect => "connect",
            Self::Timeout => "timeout",
            Self::Internal => "internal",
        }
    }
}

/// Request validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("timeout must be a positive number of seconds")]
    NonPositiveTimeout,

    #[error("invalid HTTP method: {0:?}")]
    InvalidMethod(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("fingerprint and browser are mutually exclusive")]
    ConflictingFingerprint,

    #[error("unknown browser: {0:?}")]
    UnknownBrowser(String),

    #[error("unsupported fingerprint type: {0:?} (expected \"ja3\" or \"ja4r\")")]
    UnsupportedFingerprintType(String),

    #[error("invalid http2Settings: {0}")]
    InvalidHttp2Settings(String),

    #[error("malformed {format} fingerprint: {reason}")]
    MalformedFingerprint {
        format: &'static str,
        reason: String,
    },
}

impl ValidationError {
    pub fn malformed(format: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedFingerprint {
            format,
            reason: reason.into(),
        }
    }
}

/// Errors that can occur while executing a fetch.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request rejected before any I/O.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Proxy URL unusable or proxy not reachable.
    #[error("proxy unreachable: {0}")]
    ProxyUnreachable(String),

    /// Connection error (DNS, TCP connect).
    #[error("connection error: {0}")]
    Connection(String),

    /// TLS/SSL error, including handshake rejection by the remote.
    #[error("TLS error: {0}")]
    Tls(String),

    /// HTTP protocol error.
    #[error("HTTP protocol error: {0}")]
    HttpProtocol(String),

    /// QUIC transport error (UDP bind, QUIC handshake).
    #[error("QUIC error: {0}")]
    Quic(String),

    /// Redirect limit exceeded.
    #[error("too many redirects")]
    RedirectLimit { count: usize },

    /// Redirect with a Location that cannot be followed.
    #[error("invalid redirect URL: {0}")]
    InvalidRedirectUrl(String),

    /// Response body larger than the configured bound.
    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// Decompression error.
    #[error("decompression error: {0}")]
    Decompression(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Total request deadline exceeded.
    #[error("timeout")]
    Timeout(Duration),

    /// Caller cancelled the fetch.
    #[error("cancelled")]
    Cancelled,

    /// Engine-side fault (panic, broken invariant).
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify this error into the shared taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Cancelled | Self::Internal(_) => ErrorKind::Internal,
            Self::ProxyUnreachable(_)
            | Self::Connection(_)
            | Self::Tls(_)
            | Self::HttpProtocol(_)
            | Self::Quic(_)
            | Self::RedirectLimit { .. }
            | Self::InvalidRedirectUrl(_)
            | Self::BodyTooLarge { .. }
            | Self::Decompression(_)
            | Self::Io(_) => ErrorKind::Connect,
        }
    }

    /// Create a proxy error.
    pub fn proxy(message: impl Into<String>) -> Self {
        Self::ProxyUnreachable(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a TLS error.
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Create an HTTP protocol error.
    pub fn http_protocol(message: impl Into<String>) -> Self {
        Self::HttpProtocol(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
