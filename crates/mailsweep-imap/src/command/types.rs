//! Command-related type definitions.

use crate::types::{Flag, UidSet};

/// Individual FETCH attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchAttribute {
    /// UID.
    Uid,
    /// Message flags.
    Flags,
    /// Internal date.
    InternalDate,
    /// RFC822 size.
    Rfc822Size,
    /// Envelope structure.
    Envelope,
    /// Gmail labels (`X-GM-LABELS`).
    GmailLabels,
    /// Selected header fields, fetched without setting `\Seen`.
    HeaderFields(Vec<String>),
}

/// STORE action.
///
/// Additive or subtractive only, so re-applying an action is a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreAction {
    /// `+FLAGS`
    AddFlags(Vec<Flag>),
    /// `-FLAGS`
    RemoveFlags(Vec<Flag>),
    /// `+X-GM-LABELS`
    AddLabels(Vec<String>),
    /// `-X-GM-LABELS`
    RemoveLabels(Vec<String>),
}

/// SEARCH criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCriteria {
    /// All messages.
    All,
    /// Messages with `\Deleted`.
    Deleted,
    /// Messages in a UID set.
    Uid(UidSet),
    /// Negation.
    Not(Box<Self>),
    /// Conjunction.
    And(Vec<Self>),
}
