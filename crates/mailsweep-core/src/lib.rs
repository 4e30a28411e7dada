//! # mailsweep-core
//!
//! Resumable bulk mutation engine for very large IMAP mailboxes.
//!
//! A run turns a [`Selection`] into a set of candidate UIDs, splits them into
//! chunks and applies a [`Mutation`] chunk by chunk, persisting progress so
//! an interrupted run can be resumed without redoing committed work.
//!
//! - [`connection`]: session pool, reconnect and backoff
//! - [`index`]: UID snapshot and batched metadata retrieval
//! - [`selector`]: pure evaluation of selection rules
//! - [`mutation`]: per-server command plans
//! - [`executor`]: chunk dispatch
//! - [`checkpoint`]: durable run state in `SQLite`

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod checkpoint;
pub mod config;
pub mod connection;
mod engine;
mod error;
pub mod executor;
pub mod index;
pub mod mutation;
pub mod selector;

pub use checkpoint::{CheckpointRepository, ChunkStatus, RunCheckpoint, RunState, RunSummary};
pub use config::{Backoff, ConnectionConfig, EngineConfig, RetryPolicy};
pub use connection::{
    Connection, ConnectionManager, Connector, Credentials, ImapConnector, MailboxSnapshot, Reply,
    Request, Session, SessionState,
};
pub use engine::{Engine, RunOptions, Survey};
pub use error::{Error, Result};
pub use executor::{BatchExecutor, RunResult};
pub use index::{MailboxIndex, MessageRecord, RecordSource};
pub use mutation::{CommandPlan, Mutation};
pub use selector::{Selection, Selector, Term};
