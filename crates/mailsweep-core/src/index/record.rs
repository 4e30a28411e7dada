//! Per-message metadata and its construction from FETCH data.

use chrono::{DateTime, Utc};
use mailsweep_imap::{FetchItem, Flags, Uid};

/// What the selector can see about one message.
///
/// A UID is only meaningful together with the mailbox and UIDVALIDITY it was
/// fetched under; the cursor that produced the record carries both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    /// Server-assigned UID.
    pub uid: Uid,
    /// Gmail labels, or keyword flags elsewhere.
    pub labels: Vec<String>,
    /// System and keyword flags.
    pub flags: Flags,
    /// INTERNALDATE.
    pub internal_date: Option<DateTime<Utc>>,
    /// RFC822.SIZE in bytes.
    pub size: u64,
    /// First `From` address.
    pub sender: Option<String>,
    /// Decoded-as-is subject.
    pub subject: Option<String>,
    /// `List-Id` header value, angle brackets included.
    pub list_id: Option<String>,
}

impl MessageRecord {
    /// A record with only a UID.
    #[must_use]
    pub fn new(uid: Uid) -> Self {
        Self {
            uid,
            labels: Vec::new(),
            flags: Flags::new(),
            internal_date: None,
            size: 0,
            sender: None,
            subject: None,
            list_id: None,
        }
    }

    /// Builds a record from one message's FETCH items.
    ///
    /// Returns `None` if the items carry no UID. `gmail_labels` chooses
    /// whether labels come from `X-GM-LABELS` or from keyword flags.
    #[must_use]
    pub fn from_fetch(items: Vec<FetchItem>, gmail_labels: bool) -> Option<Self> {
        let uid = items.iter().find_map(|item| match item {
            FetchItem::Uid(uid) => Some(*uid),
            _ => None,
        })?;
        let mut record = Self::new(uid);
        let mut gm_labels = None;

        for item in items {
            match item {
                FetchItem::Flags(flags) => record.flags = flags,
                FetchItem::InternalDate(raw) => record.internal_date = parse_internal_date(&raw),
                FetchItem::Rfc822Size(size) => record.size = u64::from(size),
                FetchItem::Envelope(envelope) => {
                    record.sender = envelope.from.first().and_then(|addr| addr.email());
                    record.subject = envelope.subject;
                }
                FetchItem::GmailLabels(labels) => gm_labels = Some(labels),
                FetchItem::Body { data: Some(data), .. } => {
                    record.list_id = header_value(&data, "List-Id");
                }
                FetchItem::Uid(_) | FetchItem::Body { data: None, .. } => {}
            }
        }

        record.labels = if gmail_labels {
            gm_labels.unwrap_or_default()
        } else {
            record.flags.keywords().map(str::to_string).collect()
        };
        Some(record)
    }
}

/// Parses `dd-Mon-yyyy hh:mm:ss +zzzz`. The day may be space-padded.
#[must_use]
pub fn parse_internal_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw.trim(), "%d-%b-%Y %H:%M:%S %z")
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

/// Extracts one header's unfolded value from a header block.
fn header_value(block: &[u8], name: &str) -> Option<String> {
    let text = String::from_utf8_lossy(block);
    let mut value: Option<String> = None;

    for line in text.split("\r\n").flat_map(|l| l.split('\n')) {
        if let Some(current) = value.as_mut() {
            if line.starts_with([' ', '\t']) {
                current.push(' ');
                current.push_str(line.trim());
                continue;
            }
            break;
        }
        if let Some((field, rest)) = line.split_once(':')
            && field.trim().eq_ignore_ascii_case(name)
        {
            value = Some(rest.trim().to_string());
        }
    }

    value.filter(|v| !v.is_empty())
}
