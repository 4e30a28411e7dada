//! Per-connection state carried as a value.

use std::time::Duration;

use mailsweep_imap::{ServerProfile, UidValidity};
use tokio::time::Instant;

/// Lifecycle of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No connection.
    Disconnected,
    /// Connect or login in progress.
    Connecting,
    /// Logged in, nothing selected.
    Authenticated,
    /// Mailbox selected.
    Selected(String),
    /// The connection failed and was dropped; the next use reconnects.
    Faulted,
}

/// One authenticated connection plus what the engine knows about it.
///
/// The session remembers the mailbox it was pinned to and the UIDVALIDITY
/// observed when first selecting it, so a reconnect can tell whether stored
/// UIDs are still meaningful.
pub struct Session<T> {
    id: u64,
    pub(crate) conn: Option<T>,
    pub(crate) state: SessionState,
    pub(crate) pinned: Option<(String, UidValidity)>,
    pub(crate) profile: ServerProfile,
    pub(crate) last_activity: Instant,
}

impl<T> Session<T> {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            conn: None,
            state: SessionState::Disconnected,
            pinned: None,
            profile: ServerProfile::default(),
            last_activity: Instant::now(),
        }
    }

    /// Identifier for logs.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// Capabilities of the server this session talks to.
    #[must_use]
    pub const fn profile(&self) -> ServerProfile {
        self.profile
    }

    /// Mailbox and epoch this session is pinned to.
    #[must_use]
    pub fn pinned(&self) -> Option<(&str, UidValidity)> {
        self.pinned.as_ref().map(|(mailbox, v)| (mailbox.as_str(), *v))
    }

    /// The selected mailbox, if any.
    #[must_use]
    pub fn selected_mailbox(&self) -> Option<&str> {
        match &self.state {
            SessionState::Selected(mailbox) => Some(mailbox),
            _ => None,
        }
    }

    /// Returns true if the connection is up.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.conn.is_some()
            && matches!(
                self.state,
                SessionState::Authenticated | SessionState::Selected(_)
            )
    }

    /// Time since the last successful command.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    pub(crate) fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Drops the connection after a failure. The pin survives.
    pub(crate) fn fault(&mut self) {
        self.conn = None;
        self.state = SessionState::Faulted;
    }
}

impl<T> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("pinned", &self.pinned)
            .finish_non_exhaustive()
    }
}
