//! Mailbox snapshot and lazy metadata retrieval.
//!
//! A cursor takes the UID list once with `UID SEARCH ALL` and then fetches
//! metadata one bounded batch at a time, so memory stays proportional to the
//! batch size rather than the mailbox size.

mod record;

use std::future::Future;

use mailsweep_imap::{FetchAttribute, SearchCriteria, Uid, UidSet, UidValidity};
use tracing::debug;

pub use record::{MessageRecord, parse_internal_date};

use crate::connection::{ConnectionManager, Connector, Reply, Request, Session};
use crate::{Error, Result};

/// A source of record batches.
pub trait RecordSource {
    /// Returns the next batch, or `None` when exhausted.
    fn next_batch(&mut self) -> impl Future<Output = Result<Option<Vec<MessageRecord>>>>;
}

/// Opens metadata cursors.
#[derive(Debug, Clone, Copy)]
pub struct MailboxIndex {
    batch_size: usize,
}

impl MailboxIndex {
    /// Creates an index that fetches `batch_size` UIDs per request.
    #[must_use]
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    /// Selects `mailbox`, takes its UID snapshot and returns a cursor over it.
    ///
    /// With `expected` set, a different UIDVALIDITY fails with
    /// [`Error::StaleSnapshot`].
    pub async fn fetch_metadata<'a, C: Connector>(
        &self,
        manager: &'a ConnectionManager<C>,
        session: &'a mut Session<C::Conn>,
        mailbox: &str,
        expected: Option<UidValidity>,
    ) -> Result<MetadataCursor<'a, C>> {
        let snapshot = manager.select(session, mailbox, expected).await?;
        let reply = manager
            .execute(session, &Request::Search(SearchCriteria::All))
            .await?;
        let Reply::Uids(uids) = reply else {
            return Err(Error::Protocol("UID SEARCH returned no result".into()));
        };
        debug!(
            mailbox,
            validity = snapshot.validity.get(),
            messages = uids.len(),
            "uid snapshot taken"
        );

        let gmail = session.profile().gmail_labels;
        Ok(MetadataCursor {
            manager,
            session,
            validity: snapshot.validity,
            uids,
            position: 0,
            batch_size: self.batch_size,
            items: fetch_items(gmail),
            gmail,
        })
    }
}

/// FETCH items for metadata. Gmail also gets `X-GM-LABELS`.
#[must_use]
pub fn fetch_items(gmail: bool) -> Vec<FetchAttribute> {
    let mut items = vec![
        FetchAttribute::Uid,
        FetchAttribute::Flags,
        FetchAttribute::InternalDate,
        FetchAttribute::Rfc822Size,
        FetchAttribute::Envelope,
        FetchAttribute::HeaderFields(vec!["LIST-ID".to_string()]),
    ];
    if gmail {
        items.push(FetchAttribute::GmailLabels);
    }
    items
}

/// Restartable walk over a mailbox's metadata.
///
/// The position only advances after a batch is returned, so calling
/// [`RecordSource::next_batch`] again after an error re-fetches the same
/// batch.
pub struct MetadataCursor<'a, C: Connector> {
    manager: &'a ConnectionManager<C>,
    session: &'a mut Session<C::Conn>,
    validity: UidValidity,
    uids: Vec<Uid>,
    position: usize,
    batch_size: usize,
    items: Vec<FetchAttribute>,
    gmail: bool,
}

impl<C: Connector> MetadataCursor<'_, C> {
    /// UIDVALIDITY the snapshot was taken under.
    #[must_use]
    pub const fn validity(&self) -> UidValidity {
        self.validity
    }

    /// Number of messages in the snapshot.
    #[must_use]
    pub fn total(&self) -> usize {
        self.uids.len()
    }

    /// Messages not yet returned.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.uids.len() - self.position
    }
}

impl<C: Connector> RecordSource for MetadataCursor<'_, C> {
    async fn next_batch(&mut self) -> Result<Option<Vec<MessageRecord>>> {
        let end = (self.position + self.batch_size).min(self.uids.len());
        let Some(set) = UidSet::from_uids(&self.uids[self.position..end]) else {
            return Ok(None);
        };

        let request = Request::Fetch {
            uids: set,
            items: self.items.clone(),
        };
        let Reply::Messages(messages) = self.manager.execute(self.session, &request).await? else {
            return Err(Error::Protocol("UID FETCH returned no messages".into()));
        };

        let mut records: Vec<MessageRecord> = messages
            .into_iter()
            .filter_map(|items| MessageRecord::from_fetch(items, self.gmail))
            .collect();
        records.sort_by_key(|record| record.uid);
        records.dedup_by_key(|record| record.uid);

        debug!(
            from = self.position,
            to = end,
            received = records.len(),
            "metadata batch fetched"
        );
        self.position = end;
        Ok(Some(records))
    }
}

/// In-memory source, one batch per inner vector.
#[derive(Debug, Default)]
pub struct VecSource {
    batches: std::collections::VecDeque<Vec<MessageRecord>>,
}

impl VecSource {
    /// Splits `records` into batches of `batch_size`.
    #[must_use]
    pub fn new(records: Vec<MessageRecord>, batch_size: usize) -> Self {
        let batches = records
            .chunks(batch_size.max(1))
            .map(<[MessageRecord]>::to_vec)
            .collect();
        Self { batches }
    }
}

impl RecordSource for VecSource {
    async fn next_batch(&mut self) -> Result<Option<Vec<MessageRecord>>> {
        Ok(self.batches.pop_front())
    }
}
