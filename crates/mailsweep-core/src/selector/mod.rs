//! Pure evaluation of selection rules against message metadata.

mod model;

use std::collections::VecDeque;

use mailsweep_imap::Uid;
use regex::Regex;

pub use model::{Selection, Term};

use crate::index::{MessageRecord, RecordSource};
use crate::{Error, Result};

/// Case-insensitive text matcher.
#[derive(Debug, Clone)]
enum Pattern {
    Substring(String),
    Glob(Regex),
}

impl Pattern {
    fn compile(pattern: &str) -> Result<Self> {
        if !pattern.contains(['*', '?']) {
            return Ok(Self::Substring(pattern.to_lowercase()));
        }
        let mut source = String::from("(?i)^");
        for c in pattern.chars() {
            match c {
                '*' => source.push_str(".*"),
                '?' => source.push('.'),
                other => source.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
            }
        }
        source.push('$');
        Regex::new(&source)
            .map(Self::Glob)
            .map_err(|e| Error::Config(format!("bad pattern {pattern:?}: {e}")))
    }

    fn matches(&self, text: &str) -> bool {
        match self {
            Self::Substring(needle) => text.to_lowercase().contains(needle.as_str()),
            Self::Glob(re) => re.is_match(text),
        }
    }
}

#[derive(Debug, Clone)]
enum Compiled {
    All,
    Label(String),
    OlderThan(chrono::DateTime<chrono::Utc>),
    Sender(Pattern),
    ListId(Pattern),
    LargerThan(u64),
    SmallerThan(u64),
}

/// A selection with its patterns compiled.
#[derive(Debug, Clone)]
pub struct Selector {
    terms: Vec<Compiled>,
}

impl Selector {
    /// Compiles `selection`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a pattern that does not compile.
    pub fn new(selection: &Selection) -> Result<Self> {
        let terms = selection
            .terms
            .iter()
            .map(|term| {
                Ok(match term {
                    Term::All => Compiled::All,
                    Term::Label(label) => Compiled::Label(label.clone()),
                    Term::OlderThan(cutoff) => Compiled::OlderThan(*cutoff),
                    Term::Sender(p) => Compiled::Sender(Pattern::compile(p)?),
                    Term::ListId(p) => Compiled::ListId(Pattern::compile(p)?),
                    Term::LargerThan(n) => Compiled::LargerThan(*n),
                    Term::SmallerThan(n) => Compiled::SmallerThan(*n),
                })
            })
            .collect::<Result<_>>()?;
        Ok(Self { terms })
    }

    /// Returns true if `record` satisfies every term.
    #[must_use]
    pub fn matches(&self, record: &MessageRecord) -> bool {
        !self.terms.is_empty() && self.terms.iter().all(|term| term_matches(term, record))
    }
}

fn term_matches(term: &Compiled, record: &MessageRecord) -> bool {
    match term {
        Compiled::All => true,
        Compiled::Label(label) => record
            .labels
            .iter()
            .any(|l| l.eq_ignore_ascii_case(label)),
        Compiled::OlderThan(cutoff) => record.internal_date.is_some_and(|date| date < *cutoff),
        Compiled::Sender(pattern) => record
            .sender
            .as_deref()
            .is_some_and(|sender| pattern.matches(sender)),
        Compiled::ListId(pattern) => record
            .list_id
            .as_deref()
            .is_some_and(|id| pattern.matches(id)),
        Compiled::LargerThan(n) => record.size >= *n,
        Compiled::SmallerThan(n) => record.size < *n,
    }
}

/// Evaluates `selection` against one record.
///
/// # Errors
///
/// Returns [`Error::Config`] for a pattern that does not compile.
pub fn apply(selection: &Selection, record: &MessageRecord) -> Result<bool> {
    Ok(Selector::new(selection)?.matches(record))
}

/// Drains `source` and returns the matching UIDs, ascending.
///
/// # Errors
///
/// Propagates the source's errors.
pub async fn evaluate_all(selection: &Selection, source: &mut impl RecordSource) -> Result<Vec<Uid>> {
    evaluate_with_sample(selection, source, 0)
        .await
        .map(|evaluation| evaluation.uids)
}

/// Matches plus the first and last `sample` matching records.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    /// Matching UIDs, ascending.
    pub uids: Vec<Uid>,
    /// Messages examined.
    pub scanned: usize,
    /// First matches.
    pub head: Vec<MessageRecord>,
    /// Last matches not already in `head`.
    pub tail: Vec<MessageRecord>,
}

/// Like [`evaluate_all`], keeping a preview sample.
///
/// # Errors
///
/// Propagates the source's errors.
pub async fn evaluate_with_sample(
    selection: &Selection,
    source: &mut impl RecordSource,
    sample: usize,
) -> Result<Evaluation> {
    let selector = Selector::new(selection)?;
    let mut evaluation = Evaluation::default();
    let mut tail = VecDeque::with_capacity(sample);

    if selection.is_empty() {
        return Ok(evaluation);
    }

    while let Some(batch) = source.next_batch().await? {
        evaluation.scanned += batch.len();
        for record in batch {
            if !selector.matches(&record) {
                continue;
            }
            evaluation.uids.push(record.uid);
            if evaluation.head.len() < sample {
                evaluation.head.push(record);
            } else if sample > 0 {
                if tail.len() == sample {
                    tail.pop_front();
                }
                tail.push_back(record);
            }
        }
    }

    evaluation.uids.sort_unstable();
    evaluation.uids.dedup();
    evaluation.tail = tail.into();
    Ok(evaluation)
}
