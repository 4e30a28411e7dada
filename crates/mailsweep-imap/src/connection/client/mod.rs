//! Type-state IMAP client.
//!
//! The session moves through three states and each one only exposes the
//! commands that are legal in it:
//!
//! - `NotAuthenticated`: after the greeting
//! - `Authenticated`: after LOGIN or AUTHENTICATE
//! - `Selected`: after SELECT or EXAMINE
//!
//! Transitions consume the client and return it in the new state.

#![allow(clippy::missing_errors_doc)]

mod authenticated;
mod not_authenticated;
mod selected;
mod states;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

pub use self::states::{Authenticated, NotAuthenticated, Selected};
use super::framed::{FramedStream, read_until_tagged};
use crate::command::{Command, TagGenerator};
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::quirks::ServerProfile;
use crate::types::{
    Capability, Mailbox, MailboxStatus, ResponseCode, Status, Tag, UidValidity,
};
use crate::{Error, Result};

/// IMAP client in state `State`.
pub struct Client<S, State> {
    pub(crate) stream: FramedStream<S>,
    pub(crate) tag_gen: TagGenerator,
    pub(crate) capabilities: Vec<Capability>,
    pub(crate) state: State,
}

impl<S, State: std::fmt::Debug> std::fmt::Debug for Client<S, State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("capabilities", &self.capabilities)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns the capabilities last advertised by the server.
    #[must_use]
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    /// Checks for a specific capability.
    #[must_use]
    pub fn has_capability(&self, cap: &Capability) -> bool {
        self.capabilities.contains(cap)
    }

    /// UIDPLUS (RFC 4315): `UID EXPUNGE` is available.
    #[must_use]
    pub fn supports_uidplus(&self) -> bool {
        self.has_capability(&Capability::UidPlus)
    }

    /// MOVE (RFC 6851).
    #[must_use]
    pub fn supports_move(&self) -> bool {
        self.has_capability(&Capability::Move)
    }

    /// Gmail's `X-GM-EXT-1`: labels and `X-GM-*` fetch items.
    #[must_use]
    pub fn supports_gmail_labels(&self) -> bool {
        self.has_capability(&Capability::GmailExt1)
    }

    /// Reduces the capability list to a [`ServerProfile`].
    #[must_use]
    pub fn profile(&self) -> ServerProfile {
        ServerProfile::from_capabilities(&self.capabilities)
    }

    /// Sends NOOP. Used as a liveness probe on idle connections.
    pub async fn noop(&mut self) -> Result<()> {
        self.execute(&Command::Noop).await.map(|_| ())
    }

    /// Refreshes the capability list.
    pub async fn capability(&mut self) -> Result<Vec<Capability>> {
        self.execute(&Command::Capability).await?;
        Ok(self.capabilities.clone())
    }

    /// Ends the session. A server that hangs up after BYE is not an error.
    pub async fn logout(mut self) -> Result<()> {
        match self.execute(&Command::Logout).await {
            Ok(_) | Err(Error::Bye(_)) => {}
            Err(Error::Io(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {}
            Err(err) => return Err(err),
        }
        self.stream.shutdown().await;
        Ok(())
    }

    /// Sends `command` and waits for its completion.
    ///
    /// Returns the untagged data that arrived meanwhile. A NO, BAD or BYE
    /// completion becomes the matching error.
    pub(crate) async fn execute(&mut self, command: &Command) -> Result<Vec<UntaggedResponse>> {
        self.execute_with_code(command).await.map(|(untagged, _)| untagged)
    }

    /// Like [`Self::execute`], also returning the completion's response code.
    pub(crate) async fn execute_with_code(
        &mut self,
        command: &Command,
    ) -> Result<(Vec<UntaggedResponse>, Option<ResponseCode>)> {
        let tag = self.tag_gen.next();
        debug!(tag = %tag, command = command.name(), "sending command");
        self.stream.write_command(&command.serialize(&tag)).await?;

        let raw = read_until_tagged(&mut self.stream, &tag).await?;
        let (untagged, completion) = self.collect(&raw, &tag)?;
        let code = completion.as_ref().and_then(|c| c.code.clone());
        check_completion(completion)?;
        Ok((untagged, code))
    }

    /// Issues SELECT or EXAMINE and moves to the selected state.
    ///
    /// On failure the server has deselected any previous mailbox, so the
    /// client is consumed either way.
    pub(crate) async fn open(mut self, mailbox: &str, read_only: bool) -> Result<Client<S, Selected>> {
        let mailbox = Mailbox::new(mailbox);
        let command = if read_only {
            Command::Examine {
                mailbox: mailbox.clone(),
            }
        } else {
            Command::Select {
                mailbox: mailbox.clone(),
            }
        };
        let (untagged, code) = self.execute_with_code(&command).await?;

        let mut status = mailbox_status(untagged);
        status.read_only = read_only || matches!(code, Some(ResponseCode::ReadOnly));
        debug!(
            mailbox = %mailbox,
            exists = status.exists,
            uid_validity = ?status.uid_validity.map(UidValidity::get),
            "mailbox opened"
        );
        Ok(self.into_state(Selected::new(mailbox, status)))
    }

    /// Parses a command's responses, absorbing capability updates.
    pub(crate) fn collect(
        &mut self,
        raw: &[Vec<u8>],
        tag: &Tag,
    ) -> Result<(Vec<UntaggedResponse>, Option<Completion>)> {
        let mut untagged = Vec::with_capacity(raw.len());
        let mut completion = None;

        for bytes in raw {
            match ResponseParser::parse(bytes)? {
                Response::Tagged {
                    tag: resp_tag,
                    status,
                    code,
                    text,
                } if &resp_tag == tag => {
                    if let Some(ResponseCode::Capability(caps)) = &code {
                        self.capabilities.clone_from(caps);
                    }
                    completion = Some(Completion { status, code, text });
                }
                Response::Tagged { tag, .. } => {
                    trace!(tag = %tag, "ignoring completion for another tag");
                }
                Response::Untagged(UntaggedResponse::Capability(caps)) => {
                    self.capabilities = caps;
                }
                Response::Untagged(
                    UntaggedResponse::Ok {
                        code: Some(ResponseCode::Capability(caps)),
                        ..
                    },
                ) => {
                    self.capabilities = caps;
                }
                Response::Untagged(response) => untagged.push(response),
                Response::Continuation { .. } => {
                    return Err(Error::Protocol("unexpected continuation request".into()));
                }
            }
        }

        Ok((untagged, completion))
    }

    pub(crate) fn into_state<T>(self, state: T) -> Client<S, T> {
        Client {
            stream: self.stream,
            tag_gen: self.tag_gen,
            capabilities: self.capabilities,
            state,
        }
    }
}

/// Folds SELECT/EXAMINE data into a [`MailboxStatus`].
pub(crate) fn mailbox_status(untagged: Vec<UntaggedResponse>) -> MailboxStatus {
    let mut status = MailboxStatus::default();
    for response in untagged {
        match response {
            UntaggedResponse::Exists(n) => status.exists = n,
            UntaggedResponse::Recent(n) => status.recent = n,
            UntaggedResponse::Flags(flags) => status.flags = flags,
            UntaggedResponse::Ok {
                code: Some(code), ..
            } => match code {
                ResponseCode::UidValidity(v) => status.uid_validity = Some(v),
                ResponseCode::UidNext(v) => status.uid_next = Some(v),
                _ => {}
            },
            _ => {}
        }
    }
    status
}

/// Tagged completion of a command.
#[derive(Debug)]
pub(crate) struct Completion {
    pub status: Status,
    pub code: Option<ResponseCode>,
    pub text: String,
}

/// Maps a completion to `Ok` or the matching error.
pub(crate) fn check_completion(completion: Option<Completion>) -> Result<()> {
    let Some(Completion { status, code, text }) = completion else {
        return Err(Error::Protocol("missing tagged response".to_string()));
    };
    match status {
        Status::Ok | Status::PreAuth => Ok(()),
        Status::No => Err(Error::No { code, text }),
        Status::Bad => Err(Error::Bad(text)),
        Status::Bye => Err(Error::Bye(text)),
    }
}
