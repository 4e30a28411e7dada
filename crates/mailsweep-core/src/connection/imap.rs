//! [`Connector`] backed by the real IMAP client.

use mailsweep_imap::connection::{Authenticated, Selected, connect};
use mailsweep_imap::{Client, Config, Error, ImapStream, ServerProfile};
use tracing::debug;

use super::{Connection, Connector, Credentials, MailboxSnapshot, Reply, Request};

type AuthClient = Client<ImapStream, Authenticated>;
type SelectedClient = Client<ImapStream, Selected>;

/// Connects to one server with one set of credentials.
#[derive(Debug, Clone)]
pub struct ImapConnector {
    config: Config,
    credentials: Credentials,
}

impl ImapConnector {
    /// Creates a connector.
    #[must_use]
    pub const fn new(config: Config, credentials: Credentials) -> Self {
        Self {
            config,
            credentials,
        }
    }
}

impl Connector for ImapConnector {
    type Conn = ImapConnection;

    async fn connect(&self) -> mailsweep_imap::Result<ImapConnection> {
        debug!(host = %self.config.host, port = self.config.port, "connecting");
        let stream = connect(&self.config).await?;
        let client = Client::from_stream(stream).await?;

        let client = match &self.credentials {
            Credentials::Password { username, password } => {
                client.login(username, password).await?
            }
            Credentials::OAuth2 {
                username,
                access_token,
            } => client.authenticate_xoauth2(username, access_token).await?,
        };
        debug!(user = %self.credentials.username(), "authenticated");

        Ok(ImapConnection {
            profile: client.profile(),
            client: ClientState::Authenticated(client),
        })
    }
}

enum ClientState {
    Authenticated(AuthClient),
    Selected(SelectedClient),
    /// A transition consumed the client and failed. Every later call
    /// reports [`Error::Closed`].
    Lost,
}

/// Live connection in either the authenticated or the selected state.
pub struct ImapConnection {
    client: ClientState,
    profile: ServerProfile,
}

impl ImapConnection {
    fn selected(&mut self) -> mailsweep_imap::Result<&mut SelectedClient> {
        match &mut self.client {
            ClientState::Selected(client) => Ok(client),
            ClientState::Authenticated(_) => {
                Err(Error::InvalidState("no mailbox selected".into()))
            }
            ClientState::Lost => Err(Error::Closed),
        }
    }
}

impl Connection for ImapConnection {
    fn profile(&self) -> ServerProfile {
        self.profile
    }

    async fn select(&mut self, mailbox: &str) -> mailsweep_imap::Result<MailboxSnapshot> {
        let selected = match std::mem::replace(&mut self.client, ClientState::Lost) {
            ClientState::Authenticated(client) => client.select(mailbox).await?,
            ClientState::Selected(client) => client.select(mailbox).await?,
            ClientState::Lost => return Err(Error::Closed),
        };

        let status = selected.selected().status();
        let validity = status
            .uid_validity
            .ok_or_else(|| Error::Protocol(format!("SELECT {mailbox} reported no UIDVALIDITY")))?;
        let snapshot = MailboxSnapshot {
            validity,
            exists: status.exists,
            uid_next: status.uid_next,
        };
        self.client = ClientState::Selected(selected);
        Ok(snapshot)
    }

    async fn execute(&mut self, request: &Request) -> mailsweep_imap::Result<Reply> {
        if let Request::List { reference, pattern } = request {
            let entries = match &mut self.client {
                ClientState::Authenticated(client) => client.list(reference, pattern).await?,
                ClientState::Selected(client) => client.list(reference, pattern).await?,
                ClientState::Lost => return Err(Error::Closed),
            };
            return Ok(Reply::Mailboxes(entries));
        }

        let client = self.selected()?;
        let reply = match request {
            Request::Search(criteria) => Reply::Uids(client.uid_search(criteria.clone()).await?),
            Request::Fetch { uids, items } => {
                Reply::Messages(client.uid_fetch(uids, items.clone()).await?)
            }
            Request::Store { uids, action } => {
                client.uid_store(uids, action.clone()).await?;
                Reply::Done
            }
            Request::Copy { uids, mailbox } => {
                client.uid_copy(uids, mailbox).await?;
                Reply::Done
            }
            Request::Move { uids, mailbox } => {
                client.uid_move(uids, mailbox).await?;
                Reply::Done
            }
            Request::UidExpunge(uids) => {
                client.uid_expunge(uids).await?;
                Reply::Done
            }
            Request::Expunge => {
                client.expunge().await?;
                Reply::Done
            }
            Request::List { .. } => Reply::Done,
        };
        Ok(reply)
    }

    async fn noop(&mut self) -> mailsweep_imap::Result<()> {
        match &mut self.client {
            ClientState::Authenticated(client) => client.noop().await,
            ClientState::Selected(client) => client.noop().await,
            ClientState::Lost => Err(Error::Closed),
        }
    }

    async fn logout(self) -> mailsweep_imap::Result<()> {
        match self.client {
            ClientState::Authenticated(client) => client.logout().await,
            ClientState::Selected(client) => client.logout().await,
            ClientState::Lost => Ok(()),
        }
    }
}
