//! Response data types.

use crate::types::{Capability, Flags, ListResponse, ResponseCode, SeqNum, Uid};

/// One data item of a FETCH response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItem {
    /// UID.
    Uid(Uid),
    /// Message flags.
    Flags(Flags),
    /// Internal date, verbatim (`"17-Jul-1996 02:44:25 -0700"`).
    InternalDate(String),
    /// Size in octets.
    Rfc822Size(u32),
    /// Envelope.
    Envelope(Box<Envelope>),
    /// Gmail labels, verbatim (`\Inbox`, `Receipts`).
    GmailLabels(Vec<String>),
    /// A body section, e.g. `HEADER.FIELDS (LIST-ID)`.
    Body {
        /// Section specifier between the brackets.
        section: Option<String>,
        /// Section payload, `None` for NIL.
        data: Option<Vec<u8>>,
    },
}

/// Message envelope.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Envelope {
    /// Date header.
    pub date: Option<String>,
    /// Subject header.
    pub subject: Option<String>,
    /// From addresses.
    pub from: Vec<Address>,
    /// Sender addresses.
    pub sender: Vec<Address>,
    /// Reply-To addresses.
    pub reply_to: Vec<Address>,
    /// To addresses.
    pub to: Vec<Address>,
    /// Cc addresses.
    pub cc: Vec<Address>,
    /// Bcc addresses.
    pub bcc: Vec<Address>,
    /// In-Reply-To header.
    pub in_reply_to: Option<String>,
    /// Message-ID header.
    pub message_id: Option<String>,
}

/// Envelope address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    /// Display name.
    pub name: Option<String>,
    /// Source route, obsolete.
    pub adl: Option<String>,
    /// Local part.
    pub mailbox: Option<String>,
    /// Domain.
    pub host: Option<String>,
}

impl Address {
    /// Returns `local@domain`, if both parts are present.
    #[must_use]
    pub fn email(&self) -> Option<String> {
        match (&self.mailbox, &self.host) {
            (Some(m), Some(h)) => Some(format!("{m}@{h}")),
            _ => None,
        }
    }
}

/// Untagged server data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UntaggedResponse {
    /// `* OK`
    Ok {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `* NO`
    No {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `* BAD`
    Bad {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `* PREAUTH`
    PreAuth {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `* BYE`
    Bye {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `* CAPABILITY ...`
    Capability(Vec<Capability>),
    /// `* LIST ...`
    List(ListResponse),
    /// `* FLAGS (...)`
    Flags(Flags),
    /// `* n EXISTS`
    Exists(u32),
    /// `* n RECENT`
    Recent(u32),
    /// `* n EXPUNGE`
    Expunge(SeqNum),
    /// `* n FETCH (...)`
    Fetch {
        /// Sequence number.
        seq: SeqNum,
        /// Data items.
        items: Vec<FetchItem>,
    },
    /// `* SEARCH ...`. For `UID SEARCH` the numbers are UIDs.
    Search(Vec<u32>),
    /// Any response this client has no use for, kept by keyword.
    Other(String),
}

impl UntaggedResponse {
    /// Returns the UID of a FETCH response, if it carried one.
    #[must_use]
    pub fn fetch_uid(&self) -> Option<Uid> {
        let Self::Fetch { items, .. } = self else {
            return None;
        };
        items.iter().find_map(|item| match item {
            FetchItem::Uid(uid) => Some(*uid),
            _ => None,
        })
    }
}
