//! Error types for the IMAP client.

use std::time::Duration;

use thiserror::Error;

use crate::types::ResponseCode;

/// Errors raised by the client and its parsers.
#[derive(Debug, Error)]
pub enum Error {
    /// Network I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or record error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Host name not usable for TLS verification.
    #[error("invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Response bytes did not parse.
    #[error("parse error at byte {position}: {message}")]
    Parse {
        /// Byte offset into the response.
        position: usize,
        /// What was expected.
        message: String,
    },

    /// Login or SASL exchange rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Tagged NO completion.
    #[error("server returned NO: {text}")]
    No {
        /// Bracketed response code, if any.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },

    /// Tagged BAD completion.
    #[error("server returned BAD: {0}")]
    Bad(String),

    /// Server announced it is closing the connection.
    #[error("server sent BYE: {0}")]
    Bye(String),

    /// Deadline elapsed.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Operation not allowed in the current session state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Unexpected or oversized data.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A failed state transition consumed the client; reconnect to continue.
    #[error("connection closed")]
    Closed,
}

impl Error {
    /// Returns true if the connection is unusable after this error.
    #[must_use]
    pub const fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Tls(_) | Self::Bye(_) | Self::Timeout(_) | Self::Closed
        )
    }

    /// Returns true for a NO carrying a rate-limit or availability code.
    #[must_use]
    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::No { code: Some(code), .. } if code.is_transient())
    }
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;
