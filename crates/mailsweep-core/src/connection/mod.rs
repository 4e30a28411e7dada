//! Authenticated IMAP sessions for one account.
//!
//! The [`ConnectionManager`] owns a bounded pool of sessions, lends each to
//! one worker at a time, and hides transient failures behind reconnect with
//! exponential backoff. The wire is reached through the [`Connector`] and
//! [`Connection`] traits so the manager can be driven by the real client
//! ([`ImapConnector`]) or by an in-process server.

mod imap;
mod manager;
mod session;

use std::future::Future;

use mailsweep_imap::{
    FetchAttribute, FetchItem, ListResponse, SearchCriteria, ServerProfile, StoreAction, Uid,
    UidSet, UidValidity,
};

pub use self::imap::ImapConnector;
pub use manager::{ConnectionManager, PooledSession};
pub use session::{Session, SessionState};

/// Account credentials. The engine never inspects where they came from.
#[derive(Clone)]
pub enum Credentials {
    /// LOGIN with a password (or app password).
    Password {
        /// Account name.
        username: String,
        /// Secret.
        password: String,
    },
    /// SASL XOAUTH2 with a bearer token.
    OAuth2 {
        /// Account name.
        username: String,
        /// Access token.
        access_token: String,
    },
}

impl Credentials {
    /// Account name.
    #[must_use]
    pub fn username(&self) -> &str {
        match self {
            Self::Password { username, .. } | Self::OAuth2 { username, .. } => username,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Password { .. } => "Password",
            Self::OAuth2 { .. } => "OAuth2",
        };
        f.debug_struct(kind)
            .field("username", &self.username())
            .finish_non_exhaustive()
    }
}

/// What SELECT reported, reduced to what the engine needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxSnapshot {
    /// UIDVALIDITY epoch.
    pub validity: UidValidity,
    /// Message count.
    pub exists: u32,
    /// Next UID to be assigned.
    pub uid_next: Option<Uid>,
}

/// One protocol command the engine issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `UID SEARCH`.
    Search(SearchCriteria),
    /// `UID FETCH`.
    Fetch {
        /// Messages to read.
        uids: UidSet,
        /// Items to read.
        items: Vec<FetchAttribute>,
    },
    /// `UID STORE ... .SILENT`.
    Store {
        /// Messages to change.
        uids: UidSet,
        /// Flag or label change.
        action: StoreAction,
    },
    /// `UID COPY`.
    Copy {
        /// Messages to copy.
        uids: UidSet,
        /// Destination.
        mailbox: String,
    },
    /// `UID MOVE`.
    Move {
        /// Messages to move.
        uids: UidSet,
        /// Destination.
        mailbox: String,
    },
    /// `UID EXPUNGE`.
    UidExpunge(UidSet),
    /// `EXPUNGE` of every `\Deleted` message.
    Expunge,
    /// `LIST`.
    List {
        /// Reference name.
        reference: String,
        /// Pattern.
        pattern: String,
    },
}

impl Request {
    /// Command name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Search(_) => "UID SEARCH",
            Self::Fetch { .. } => "UID FETCH",
            Self::Store { .. } => "UID STORE",
            Self::Copy { .. } => "UID COPY",
            Self::Move { .. } => "UID MOVE",
            Self::UidExpunge(_) => "UID EXPUNGE",
            Self::Expunge => "EXPUNGE",
            Self::List { .. } => "LIST",
        }
    }

    /// Returns true if the command needs a selected mailbox.
    #[must_use]
    pub const fn needs_mailbox(&self) -> bool {
        !matches!(self, Self::List { .. })
    }
}

/// Parsed reply to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Completed with no data of interest.
    Done,
    /// `UID SEARCH` result, ascending.
    Uids(Vec<Uid>),
    /// `UID FETCH` result, one item list per message.
    Messages(Vec<Vec<FetchItem>>),
    /// `LIST` result.
    Mailboxes(Vec<ListResponse>),
}

/// Opens authenticated connections.
pub trait Connector: Send + Sync {
    /// The connection type produced.
    type Conn: Connection;

    /// Connects and authenticates.
    fn connect(&self) -> impl Future<Output = mailsweep_imap::Result<Self::Conn>> + Send;
}

/// An authenticated connection.
///
/// Errors are the protocol client's; the manager classifies them.
pub trait Connection: Send {
    /// Server capabilities reduced to a profile.
    fn profile(&self) -> ServerProfile;

    /// Selects `mailbox` read-write.
    fn select(
        &mut self,
        mailbox: &str,
    ) -> impl Future<Output = mailsweep_imap::Result<MailboxSnapshot>> + Send;

    /// Runs one command.
    fn execute(
        &mut self,
        request: &Request,
    ) -> impl Future<Output = mailsweep_imap::Result<Reply>> + Send;

    /// Liveness probe.
    fn noop(&mut self) -> impl Future<Output = mailsweep_imap::Result<()>> + Send;

    /// Ends the session.
    fn logout(self) -> impl Future<Output = mailsweep_imap::Result<()>> + Send;
}
