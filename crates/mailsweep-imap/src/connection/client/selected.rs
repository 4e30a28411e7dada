//! Commands valid with a mailbox selected.
//!
//! Everything that addresses messages goes by UID.

use tokio::io::{AsyncRead, AsyncWrite};

use super::Client;
use super::states::{Authenticated, Selected};
use crate::command::{Command, FetchAttribute, SearchCriteria, StoreAction};
use crate::parser::{FetchItem, UntaggedResponse};
use crate::types::{Mailbox, Uid, UidSet};
use crate::{Error, Result};

impl<S> Client<S, Selected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// What SELECT reported for the current mailbox.
    #[must_use]
    pub const fn selected(&self) -> &Selected {
        &self.state
    }

    /// Switches to another mailbox.
    pub async fn select(self, mailbox: &str) -> Result<Self> {
        self.open(mailbox, false).await
    }

    /// Closes the mailbox, silently expunging `\Deleted` messages.
    pub async fn close(mut self) -> Result<Client<S, Authenticated>> {
        self.execute(&Command::Close).await?;
        Ok(self.into_state(Authenticated))
    }

    /// Runs `UID SEARCH` and returns matching UIDs in ascending order.
    pub async fn uid_search(&mut self, criteria: SearchCriteria) -> Result<Vec<Uid>> {
        let untagged = self.execute(&Command::UidSearch { criteria }).await?;

        let mut uids: Vec<Uid> = untagged
            .into_iter()
            .filter_map(|response| match response {
                UntaggedResponse::Search(numbers) => Some(numbers),
                _ => None,
            })
            .flatten()
            .filter_map(Uid::new)
            .collect();
        uids.sort_unstable();
        uids.dedup();
        Ok(uids)
    }

    /// Runs `UID FETCH` and returns the item list of each message.
    ///
    /// Unsolicited FETCH data without a UID (flag changes made by other
    /// sessions) is dropped.
    pub async fn uid_fetch(
        &mut self,
        uids: &UidSet,
        items: Vec<FetchAttribute>,
    ) -> Result<Vec<Vec<FetchItem>>> {
        let untagged = self
            .execute(&Command::UidFetch {
                uids: uids.clone(),
                items,
            })
            .await?;

        Ok(untagged
            .into_iter()
            .filter(|response| response.fetch_uid().is_some())
            .filter_map(|response| match response {
                UntaggedResponse::Fetch { items, .. } => Some(items),
                _ => None,
            })
            .collect())
    }

    /// Runs `UID STORE` with `.SILENT`.
    pub async fn uid_store(&mut self, uids: &UidSet, action: StoreAction) -> Result<()> {
        self.require_writable()?;
        self.execute(&Command::UidStore {
            uids: uids.clone(),
            action,
            silent: true,
        })
        .await
        .map(|_| ())
    }

    /// Copies messages to another mailbox.
    pub async fn uid_copy(&mut self, uids: &UidSet, mailbox: &str) -> Result<()> {
        self.execute(&Command::UidCopy {
            uids: uids.clone(),
            mailbox: Mailbox::new(mailbox),
        })
        .await
        .map(|_| ())
    }

    /// Moves messages to another mailbox (RFC 6851).
    pub async fn uid_move(&mut self, uids: &UidSet, mailbox: &str) -> Result<()> {
        if !self.supports_move() {
            return Err(Error::InvalidState("server lacks MOVE".into()));
        }
        self.require_writable()?;
        self.execute(&Command::UidMove {
            uids: uids.clone(),
            mailbox: Mailbox::new(mailbox),
        })
        .await
        .map(|_| ())
    }

    /// Expunges only the given UIDs (RFC 4315).
    pub async fn uid_expunge(&mut self, uids: &UidSet) -> Result<()> {
        if !self.supports_uidplus() {
            return Err(Error::InvalidState("server lacks UIDPLUS".into()));
        }
        self.require_writable()?;
        self.execute(&Command::UidExpunge { uids: uids.clone() })
            .await
            .map(|_| ())
    }

    /// Expunges every `\Deleted` message in the mailbox.
    pub async fn expunge(&mut self) -> Result<()> {
        self.require_writable()?;
        self.execute(&Command::Expunge).await.map(|_| ())
    }

    fn require_writable(&self) -> Result<()> {
        if self.state.status.read_only {
            return Err(Error::InvalidState(format!(
                "{} is open read-only",
                self.state.mailbox
            )));
        }
        Ok(())
    }
}
