//! Error types for the engine.

use thiserror::Error;

/// Errors raised by the engine.
///
/// `Transport` is the only transient kind; the connection manager retries it
/// before it ever reaches a caller. Everything else stops a run.
#[derive(Debug, Error)]
pub enum Error {
    /// Credentials rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The server sent something unusable or refused a well-formed command.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Network failure, timeout, BYE or throttling that outlived the retry budget.
    #[error("transport error: {0}")]
    Transport(#[source] mailsweep_imap::Error),

    /// The mailbox's UIDVALIDITY changed, so stored UIDs no longer mean anything.
    #[error("UIDVALIDITY of {mailbox} changed from {expected} to {actual}")]
    StaleSnapshot {
        /// Mailbox name.
        mailbox: String,
        /// Epoch the run was pinned to.
        expected: u32,
        /// Epoch the server reports now.
        actual: u32,
    },

    /// The server rejected the mailbox name.
    #[error("mailbox not found: {0}")]
    MailboxNotFound(String),

    /// Checkpoint database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored selection or mutation did not round-trip.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// No checkpoint with this id.
    #[error("run not found: {0}")]
    RunNotFound(String),

    /// Invalid configuration or selection.
    #[error("configuration error: {0}")]
    Config(String),

    /// A fatal error stopped the run; its checkpoint is kept for resume.
    #[error("run {run_id} aborted: {source}")]
    Aborted {
        /// Run that was stopped.
        run_id: String,
        /// Highest chunk index committed before the stop.
        last_committed_chunk: Option<usize>,
        /// What stopped it.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Returns true for errors the connection manager retries.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns the innermost error of an [`Error::Aborted`] chain.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Aborted { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
