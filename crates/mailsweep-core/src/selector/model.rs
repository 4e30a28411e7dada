//! Selection rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One predicate over a message's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "term", content = "value", rename_all = "snake_case")]
pub enum Term {
    /// Every message. Must be requested explicitly.
    All,
    /// Carries this label (case-insensitive).
    Label(String),
    /// INTERNALDATE strictly before this instant.
    OlderThan(DateTime<Utc>),
    /// Sender matches: substring, or glob when the pattern has `*` or `?`.
    Sender(String),
    /// `List-Id` matches, same rules as [`Term::Sender`].
    ListId(String),
    /// At least this many bytes.
    LargerThan(u64),
    /// Fewer than this many bytes.
    SmallerThan(u64),
}

/// Mailbox plus the terms a message must all satisfy.
///
/// A selection without terms matches nothing; use [`Term::All`] to target a
/// whole mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    /// Mailbox to search.
    pub mailbox: String,
    /// Conjunction of terms.
    pub terms: Vec<Term>,
}

impl Selection {
    /// An empty selection over `mailbox`.
    #[must_use]
    pub fn new(mailbox: impl Into<String>) -> Self {
        Self {
            mailbox: mailbox.into(),
            terms: Vec::new(),
        }
    }

    /// Adds a term.
    #[must_use]
    pub fn with(mut self, term: Term) -> Self {
        self.terms.push(term);
        self
    }

    /// Returns true if no message can match.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// SHA-256 of the canonical JSON form, hex encoded.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn fingerprint(&self) -> serde_json::Result<String> {
        let canonical = serde_json::to_vec(self)?;
        let digest = Sha256::digest(&canonical);
        Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
    }
}
