//! Commands valid once logged in.
//!
//! LIST is also legal with a mailbox selected.

use tokio::io::{AsyncRead, AsyncWrite};

use super::Client;
use super::states::{Authenticated, Selected};
use crate::Result;
use crate::command::Command;
use crate::parser::UntaggedResponse;
use crate::types::ListResponse;

impl<S> Client<S, Authenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Selects a mailbox read-write.
    pub async fn select(self, mailbox: &str) -> Result<Client<S, Selected>> {
        self.open(mailbox, false).await
    }

    /// Opens a mailbox read-only.
    pub async fn examine(self, mailbox: &str) -> Result<Client<S, Selected>> {
        self.open(mailbox, true).await
    }
}

impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Lists mailboxes matching `pattern` under `reference`.
    pub async fn list(&mut self, reference: &str, pattern: &str) -> Result<Vec<ListResponse>> {
        let untagged = self
            .execute(&Command::List {
                reference: reference.to_string(),
                pattern: pattern.to_string(),
            })
            .await?;

        Ok(untagged
            .into_iter()
            .filter_map(|response| match response {
                UntaggedResponse::List(item) => Some(item),
                _ => None,
            })
            .collect())
    }
}
