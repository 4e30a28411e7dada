//! Server capability profile.
//!
//! A bulk mutation is expressed differently depending on what the server
//! offers: Gmail wants label edits, others want flags plus expunge, and
//! archiving needs MOVE or COPY. This module reduces the capability list to
//! the handful of facts that decide which commands to send.

use crate::types::Capability;

/// What the server lets a mutation rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct ServerProfile {
    /// `X-GM-EXT-1`: labels are edited with `X-GM-LABELS`.
    pub gmail_labels: bool,
    /// UIDPLUS: `UID EXPUNGE` removes exactly the chosen messages.
    pub uidplus: bool,
    /// MOVE: messages can be moved atomically.
    pub native_move: bool,
    /// The server rejects plaintext LOGIN.
    pub login_disabled: bool,
}

impl ServerProfile {
    /// Builds a profile from advertised capabilities.
    #[must_use]
    pub fn from_capabilities(capabilities: &[Capability]) -> Self {
        let mut profile = Self::default();
        for cap in capabilities {
            match cap {
                Capability::GmailExt1 => profile.gmail_labels = true,
                Capability::UidPlus => profile.uidplus = true,
                Capability::Move => profile.native_move = true,
                Capability::LoginDisabled => profile.login_disabled = true,
                _ => {}
            }
        }
        profile
    }

    /// Profile of a Gmail account.
    #[must_use]
    pub const fn gmail() -> Self {
        Self {
            gmail_labels: true,
            uidplus: true,
            native_move: true,
            login_disabled: false,
        }
    }

    /// Profile of a bare RFC 3501 server.
    #[must_use]
    pub const fn basic() -> Self {
        Self {
            gmail_labels: false,
            uidplus: false,
            native_move: false,
            login_disabled: false,
        }
    }
}

/// Normalizes the case-insensitive name `INBOX`; other names are kept.
#[must_use]
pub fn normalize_mailbox(mailbox: &str) -> String {
    if mailbox.eq_ignore_ascii_case("inbox") {
        return "INBOX".to_string();
    }
    mailbox.to_string()
}
