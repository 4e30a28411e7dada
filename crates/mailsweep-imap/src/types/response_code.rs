//! Response codes carried in brackets on status responses.

use super::{Capability, Flag, Uid, UidValidity};

/// Response code from a status response (`OK [UIDVALIDITY 3]`, `NO [UNAVAILABLE]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// ALERT: text that must be shown to the user.
    Alert,
    /// CAPABILITY list piggybacked on a greeting or login reply.
    Capability(Vec<Capability>),
    /// PERMANENTFLAGS: flags the client may store.
    PermanentFlags(Vec<Flag>),
    /// READ-ONLY
    ReadOnly,
    /// READ-WRITE
    ReadWrite,
    /// TRYCREATE: target mailbox does not exist.
    TryCreate,
    /// NONEXISTENT (RFC 5530): mailbox does not exist.
    Nonexistent,
    /// AUTHENTICATIONFAILED (RFC 5530)
    AuthenticationFailed,
    /// UNAVAILABLE (RFC 5530): temporary server-side failure.
    Unavailable,
    /// LIMIT (RFC 5530): a server limit was hit, such as too many connections.
    Limit,
    /// THROTTLED: the server is rate limiting this client.
    Throttled,
    /// UIDNEXT
    UidNext(Uid),
    /// UIDVALIDITY
    UidValidity(UidValidity),
    /// UNSEEN: first unseen sequence number.
    Unseen(u32),
    /// COPYUID (RFC 4315)
    CopyUid {
        /// UIDVALIDITY of the destination mailbox.
        uidvalidity: UidValidity,
        /// Source UIDs in wire form.
        source: String,
        /// Destination UIDs in wire form.
        dest: String,
    },
    /// Any other code, with its text.
    Unknown(String),
}

impl ResponseCode {
    /// Returns true for codes that mean "try again later".
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable | Self::Limit | Self::Throttled)
    }

    /// Returns true for codes that mean the mailbox does not exist.
    #[must_use]
    pub const fn is_missing_mailbox(&self) -> bool {
        matches!(self, Self::Nonexistent | Self::TryCreate)
    }
}
