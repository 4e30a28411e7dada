//! Greeting and authentication.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use super::states::{Authenticated, NotAuthenticated};
use super::{Client, check_completion};
use crate::command::{Command, TagGenerator};
use crate::connection::framed::FramedStream;
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::ResponseCode;
use crate::{Error, Result};

impl<S> Client<S, NotAuthenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a connected stream and reads the server greeting.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut framed = FramedStream::new(stream);

        let greeting = framed.read_response().await?;
        let mut capabilities = Vec::new();
        match ResponseParser::parse(&greeting)? {
            Response::Untagged(
                UntaggedResponse::Ok { code, .. } | UntaggedResponse::PreAuth { code, .. },
            ) => {
                if let Some(ResponseCode::Capability(caps)) = code {
                    capabilities = caps;
                }
            }
            Response::Untagged(UntaggedResponse::Bye { text, .. }) => {
                return Err(Error::Bye(text));
            }
            other => {
                return Err(Error::Protocol(format!("unexpected greeting: {other:?}")));
            }
        }

        Ok(Self {
            stream: framed,
            tag_gen: TagGenerator::default(),
            capabilities,
            state: NotAuthenticated,
        })
    }

    /// Authenticates with LOGIN.
    ///
    /// A NO completion becomes [`Error::Auth`].
    pub async fn login(mut self, username: &str, password: &str) -> Result<Client<S, Authenticated>> {
        let command = Command::Login {
            username: username.to_string(),
            password: password.to_string(),
        };
        match self.execute(&command).await {
            Ok(_) => {}
            Err(Error::No { text, .. }) => return Err(Error::Auth(text)),
            Err(err) => return Err(err),
        }
        self.authenticated().await
    }

    /// Authenticates with the XOAUTH2 SASL mechanism using an access token.
    ///
    /// On rejection the server sends a base64 JSON challenge and waits for an
    /// empty line before completing with NO; that exchange is handled here.
    pub async fn authenticate_xoauth2(
        mut self,
        username: &str,
        access_token: &str,
    ) -> Result<Client<S, Authenticated>> {
        let tag = self.tag_gen.next();
        let command = Command::Authenticate {
            mechanism: "XOAUTH2".to_string(),
            initial_response: Some(xoauth2_initial_response(username, access_token)),
        };
        debug!(tag = %tag, command = command.name(), "sending command");
        self.stream.write_command(&command.serialize(&tag)).await?;

        let mut raw = Vec::new();
        loop {
            let response = self.stream.read_response().await?;
            if response.starts_with(b"+") {
                self.stream.write_command(b"\r\n").await?;
                continue;
            }
            let done = response.starts_with(tag.as_str().as_bytes())
                && response.get(tag.as_str().len()) == Some(&b' ');
            raw.push(response);
            if done {
                break;
            }
        }

        let (_, completion) = self.collect(&raw, &tag)?;
        match check_completion(completion) {
            Ok(()) => self.authenticated().await,
            Err(Error::No { text, .. }) => Err(Error::Auth(text)),
            Err(err) => Err(err),
        }
    }

    /// Moves to the authenticated state, fetching capabilities if the server
    /// did not volunteer them.
    async fn authenticated(mut self) -> Result<Client<S, Authenticated>> {
        if self.capabilities.is_empty() {
            self.capability().await?;
        }
        Ok(self.into_state(Authenticated))
    }
}

/// Builds the base64 XOAUTH2 initial client response.
fn xoauth2_initial_response(username: &str, access_token: &str) -> String {
    STANDARD.encode(format!("user={username}\x01auth=Bearer {access_token}\x01\x01"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio_test::io::Builder;

    use super::*;
    use crate::types::Capability;

    #[test]
    fn xoauth2_response_encoding() {
        let encoded = xoauth2_initial_response("someuser@example.com", "ya29.vF9dft4qmTc2Nvb3RlckBhdHRhdmlzdGEuY29tCg");
        let decoded = STANDARD.decode(encoded).unwrap();
        assert_eq!(
            decoded,
            b"user=someuser@example.com\x01auth=Bearer ya29.vF9dft4qmTc2Nvb3RlckBhdHRhdmlzdGEuY29tCg\x01\x01"
        );
    }

    #[tokio::test]
    async fn greeting_capabilities_are_kept() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1 UIDPLUS X-GM-EXT-1] Gimap ready\r\n")
            .build();
        let client = Client::from_stream(mock).await.unwrap();
        assert!(client.supports_uidplus());
        assert!(client.supports_gmail_labels());
        assert!(!client.supports_move());
    }

    #[tokio::test]
    async fn bye_greeting_is_an_error() {
        let mock = Builder::new().read(b"* BYE too many connections\r\n").build();
        let err = Client::from_stream(mock).await.unwrap_err();
        assert!(matches!(err, Error::Bye(text) if text == "too many connections"));
    }

    #[tokio::test]
    async fn login_rejection_is_auth_error() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
            .write(b"A0000 LOGIN user wrong\r\n")
            .read(b"A0000 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n")
            .build();
        let client = Client::from_stream(mock).await.unwrap();
        let err = client.login("user", "wrong").await.unwrap_err();
        assert!(matches!(err, Error::Auth(text) if text == "Invalid credentials"));
    }

    #[tokio::test]
    async fn login_refreshes_capabilities() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1 LOGINDISABLED] ready\r\n")
            .write(b"A0000 LOGIN user pass\r\n")
            .read(b"A0000 OK [CAPABILITY IMAP4rev1 MOVE UIDPLUS] Logged in\r\n")
            .build();
        let client = Client::from_stream(mock).await.unwrap();
        let client = client.login("user", "pass").await.unwrap();
        assert!(client.has_capability(&Capability::Move));
        assert!(!client.has_capability(&Capability::LoginDisabled));
    }

    #[tokio::test]
    async fn xoauth2_failure_answers_challenge() {
        let initial = xoauth2_initial_response("u@example.com", "token");
        let command = format!("A0000 AUTHENTICATE XOAUTH2 {initial}\r\n");
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1 AUTH=XOAUTH2] ready\r\n")
            .write(command.as_bytes())
            .read(b"+ eyJzdGF0dXMiOiI0MDAifQ==\r\n")
            .write(b"\r\n")
            .read(b"A0000 NO [AUTHENTICATIONFAILED] Invalid credentials (Failure)\r\n")
            .build();
        let client = Client::from_stream(mock).await.unwrap();
        let err = client
            .authenticate_xoauth2("u@example.com", "token")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }
}
