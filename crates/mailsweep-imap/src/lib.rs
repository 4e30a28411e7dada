//! # mailsweep-imap
//!
//! Async IMAP client with just enough protocol for bulk mailbox mutation:
//! authentication, SELECT, LIST, and the UID forms of SEARCH, FETCH, STORE,
//! COPY, MOVE and EXPUNGE.
//!
//! ## Features
//!
//! - **Type-state client**: `NotAuthenticated` → `Authenticated` → `Selected`
//!   is enforced at compile time
//! - **UID-only message addressing**: sequence numbers never leave the parser
//! - **Gmail labels**: `X-GM-LABELS` fetch and store
//! - **TLS via rustls** with the webpki root set
//! - **Sans-I/O parser**: protocol parsing separated from network I/O
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailsweep_imap::{Client, Config, SearchCriteria};
//!
//! #[tokio::main]
//! async fn main() -> mailsweep_imap::Result<()> {
//!     let config = Config::new("imap.gmail.com");
//!     let stream = mailsweep_imap::connection::connect(&config).await?;
//!     let client = Client::from_stream(stream).await?;
//!     let client = client.login("user@example.com", "app-password").await?;
//!
//!     let mut client = client.select("INBOX").await?;
//!     let uids = client.uid_search(SearchCriteria::All).await?;
//!     println!("{} messages", uids.len());
//!
//!     client.logout().await
//! }
//! ```
//!
//! ## Connection States
//!
//! ```text
//! NotAuthenticated ── login() / authenticate_xoauth2() ──→ Authenticated
//! Authenticated    ── select() / examine() ──────────────→ Selected
//! Selected         ── close() ───────────────────────────→ Authenticated
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod quirks;
pub mod types;

pub use command::{Command, FetchAttribute, SearchCriteria, StoreAction, TagGenerator};
pub use connection::{
    Authenticated, Client, Config, ConfigBuilder, ImapStream, NotAuthenticated, Security, Selected,
};
pub use error::{Error, Result};
pub use parser::{Envelope, FetchItem, Response, ResponseParser, UntaggedResponse};
pub use quirks::ServerProfile;
pub use types::{
    Capability, Flag, Flags, ListResponse, Mailbox, MailboxAttribute, MailboxStatus, ResponseCode,
    SeqNum, Status, Tag, Uid, UidSet, UidValidity,
};
