//! IMAP command builder.
//!
//! Only the commands a bulk mutation run needs are modelled. Message-level
//! commands are always UID commands: sequence numbers shift under expunge,
//! UIDs do not.

mod serialize;
mod tag_generator;
mod types;

use crate::types::{Mailbox, Tag, UidSet};

pub use tag_generator::TagGenerator;
pub use types::{FetchAttribute, SearchCriteria, StoreAction};

use serialize::{
    write_astring, write_fetch_items, write_mailbox, write_search_criteria, write_store_action,
};

/// IMAP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    // Any state
    /// CAPABILITY
    Capability,
    /// NOOP
    Noop,
    /// LOGOUT
    Logout,

    // Not authenticated
    /// LOGIN
    Login {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// AUTHENTICATE with an initial response (SASL-IR).
    Authenticate {
        /// SASL mechanism.
        mechanism: String,
        /// Base64 initial response.
        initial_response: Option<String>,
    },

    // Authenticated
    /// SELECT
    Select {
        /// Mailbox to select.
        mailbox: Mailbox,
    },
    /// EXAMINE (read-only SELECT).
    Examine {
        /// Mailbox to examine.
        mailbox: Mailbox,
    },
    /// LIST
    List {
        /// Reference name.
        reference: String,
        /// Mailbox pattern.
        pattern: String,
    },

    // Selected
    /// CLOSE
    Close,
    /// EXPUNGE
    Expunge,
    /// UID EXPUNGE (RFC 4315)
    UidExpunge {
        /// UIDs to expunge.
        uids: UidSet,
    },
    /// UID SEARCH
    UidSearch {
        /// Search criteria.
        criteria: SearchCriteria,
    },
    /// UID FETCH
    UidFetch {
        /// UIDs to fetch.
        uids: UidSet,
        /// Items to fetch.
        items: Vec<FetchAttribute>,
    },
    /// UID STORE
    UidStore {
        /// UIDs to modify.
        uids: UidSet,
        /// What to change.
        action: StoreAction,
        /// Suppress the untagged FETCH echo.
        silent: bool,
    },
    /// UID COPY
    UidCopy {
        /// UIDs to copy.
        uids: UidSet,
        /// Destination mailbox.
        mailbox: Mailbox,
    },
    /// UID MOVE (RFC 6851)
    UidMove {
        /// UIDs to move.
        uids: UidSet,
        /// Destination mailbox.
        mailbox: Mailbox,
    },
}

impl Command {
    /// Serializes the command, CRLF-terminated, under the given tag.
    #[must_use]
    pub fn serialize(&self, tag: &Tag) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(tag.as_str().as_bytes());
        buf.push(b' ');

        match self {
            Self::Capability => buf.extend_from_slice(b"CAPABILITY"),
            Self::Noop => buf.extend_from_slice(b"NOOP"),
            Self::Logout => buf.extend_from_slice(b"LOGOUT"),

            Self::Login { username, password } => {
                buf.extend_from_slice(b"LOGIN ");
                write_astring(&mut buf, username);
                buf.push(b' ');
                write_astring(&mut buf, password);
            }

            Self::Authenticate {
                mechanism,
                initial_response,
            } => {
                buf.extend_from_slice(b"AUTHENTICATE ");
                buf.extend_from_slice(mechanism.as_bytes());
                if let Some(resp) = initial_response {
                    buf.push(b' ');
                    buf.extend_from_slice(resp.as_bytes());
                }
            }

            Self::Select { mailbox } => {
                buf.extend_from_slice(b"SELECT ");
                write_mailbox(&mut buf, mailbox);
            }

            Self::Examine { mailbox } => {
                buf.extend_from_slice(b"EXAMINE ");
                write_mailbox(&mut buf, mailbox);
            }

            Self::List { reference, pattern } => {
                buf.extend_from_slice(b"LIST ");
                write_astring(&mut buf, reference);
                buf.push(b' ');
                write_astring(&mut buf, pattern);
            }

            Self::Close => buf.extend_from_slice(b"CLOSE"),
            Self::Expunge => buf.extend_from_slice(b"EXPUNGE"),

            Self::UidExpunge { uids } => {
                buf.extend_from_slice(b"UID EXPUNGE ");
                buf.extend_from_slice(uids.to_string().as_bytes());
            }

            Self::UidSearch { criteria } => {
                buf.extend_from_slice(b"UID SEARCH ");
                write_search_criteria(&mut buf, criteria);
            }

            Self::UidFetch { uids, items } => {
                buf.extend_from_slice(b"UID FETCH ");
                buf.extend_from_slice(uids.to_string().as_bytes());
                buf.push(b' ');
                write_fetch_items(&mut buf, items);
            }

            Self::UidStore {
                uids,
                action,
                silent,
            } => {
                buf.extend_from_slice(b"UID STORE ");
                buf.extend_from_slice(uids.to_string().as_bytes());
                buf.push(b' ');
                write_store_action(&mut buf, action, *silent);
            }

            Self::UidCopy { uids, mailbox } => {
                buf.extend_from_slice(b"UID COPY ");
                buf.extend_from_slice(uids.to_string().as_bytes());
                buf.push(b' ');
                write_mailbox(&mut buf, mailbox);
            }

            Self::UidMove { uids, mailbox } => {
                buf.extend_from_slice(b"UID MOVE ");
                buf.extend_from_slice(uids.to_string().as_bytes());
                buf.push(b' ');
                write_mailbox(&mut buf, mailbox);
            }
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Short name used in logs. Never includes arguments, so credentials
    /// cannot leak into log output.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Capability => "CAPABILITY",
            Self::Noop => "NOOP",
            Self::Logout => "LOGOUT",
            Self::Login { .. } => "LOGIN",
            Self::Authenticate { .. } => "AUTHENTICATE",
            Self::Select { .. } => "SELECT",
            Self::Examine { .. } => "EXAMINE",
            Self::List { .. } => "LIST",
            Self::Close => "CLOSE",
            Self::Expunge => "EXPUNGE",
            Self::UidExpunge { .. } => "UID EXPUNGE",
            Self::UidSearch { .. } => "UID SEARCH",
            Self::UidFetch { .. } => "UID FETCH",
            Self::UidStore { .. } => "UID STORE",
            Self::UidCopy { .. } => "UID COPY",
            Self::UidMove { .. } => "UID MOVE",
        }
    }
}
