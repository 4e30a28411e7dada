//! Checkpoint data models.

use chrono::{DateTime, Utc};
use mailsweep_imap::{Uid, UidSet, UidValidity};

use crate::mutation::Mutation;
use crate::selector::Selection;
use crate::{Error, Result};

/// Lifecycle of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    /// Not yet attempted, or put back after an interruption.
    Pending,
    /// Commands are on the wire.
    InFlight,
    /// Every command of the plan succeeded.
    Committed,
    /// Transport failures outlived the retry budget.
    Failed,
}

impl ChunkStatus {
    /// Stored form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Committed => "committed",
            Self::Failed => "failed",
        }
    }

    /// Parses the stored form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for an unknown value.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_flight" => Ok(Self::InFlight),
            "committed" => Ok(Self::Committed),
            "failed" => Ok(Self::Failed),
            other => Err(Error::Protocol(format!("unknown chunk status {other:?}"))),
        }
    }
}

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Chunks written, nothing dispatched.
    Planned,
    /// Dispatch started.
    Running,
    /// Every chunk committed.
    Completed,
    /// Stopped with work left; resumable.
    Aborted,
}

impl RunState {
    /// Stored form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }

    /// Parses the stored form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for an unknown value.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "planned" => Ok(Self::Planned),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "aborted" => Ok(Self::Aborted),
            other => Err(Error::Protocol(format!("unknown run state {other:?}"))),
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One bounded slice of the candidate list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    /// Position in the run, from zero.
    pub id: usize,
    /// UIDs, ascending.
    pub uids: Vec<Uid>,
    /// Current status.
    pub status: ChunkStatus,
    /// Times the chunk ended `Failed`.
    pub failures: u32,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
}

impl ChunkRecord {
    /// Compressed UID set for the wire.
    #[must_use]
    pub fn uid_set(&self) -> Option<UidSet> {
        UidSet::from_uids(&self.uids)
    }
}

/// Durable state of one run.
#[derive(Debug, Clone)]
pub struct RunCheckpoint {
    /// Unique run id.
    pub run_id: String,
    /// Fingerprint of `selection`.
    pub fingerprint: String,
    /// What was selected.
    pub selection: Selection,
    /// What is applied.
    pub mutation: Mutation,
    /// Destination of [`Mutation::Archive`] on servers without Gmail labels,
    /// fixed when the run is planned.
    pub archive_mailbox: String,
    /// UIDVALIDITY the candidates were taken under.
    pub uid_validity: UidValidity,
    /// Run state.
    pub state: RunState,
    /// Chunks in dispatch order.
    pub chunks: Vec<ChunkRecord>,
    /// When the run was planned.
    pub created_at: DateTime<Utc>,
}

impl RunCheckpoint {
    /// Plans a new run over `candidates`, split into chunks of `chunk_size`.
    ///
    /// # Errors
    ///
    /// Returns an error if the selection cannot be fingerprinted.
    pub fn plan(
        selection: Selection,
        mutation: Mutation,
        archive_mailbox: &str,
        uid_validity: UidValidity,
        candidates: &[Uid],
        chunk_size: usize,
    ) -> Result<Self> {
        let mut sorted = candidates.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let chunks = sorted
            .chunks(chunk_size.max(1))
            .enumerate()
            .map(|(id, uids)| ChunkRecord {
                id,
                uids: uids.to_vec(),
                status: ChunkStatus::Pending,
                failures: 0,
                last_error: None,
            })
            .collect();

        Ok(Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            fingerprint: selection.fingerprint()?,
            selection,
            mutation,
            archive_mailbox: archive_mailbox.to_string(),
            uid_validity,
            state: RunState::Planned,
            chunks,
            created_at: Utc::now(),
        })
    }

    /// Mailbox the run mutates.
    #[must_use]
    pub fn mailbox(&self) -> &str {
        &self.selection.mailbox
    }

    /// Number of chunks with `status`.
    #[must_use]
    pub fn count(&self, status: ChunkStatus) -> usize {
        self.chunks.iter().filter(|c| c.status == status).count()
    }

    /// Highest committed chunk id.
    #[must_use]
    pub fn last_committed(&self) -> Option<usize> {
        self.chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Committed)
            .map(|c| c.id)
            .max()
    }

    /// UIDs of every failed chunk, ascending.
    #[must_use]
    pub fn failed_uids(&self) -> Vec<Uid> {
        self.chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Failed)
            .flat_map(|c| c.uids.iter().copied())
            .collect()
    }
}

/// One row of the run listing.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Run id.
    pub run_id: String,
    /// Mailbox.
    pub mailbox: String,
    /// Mutation applied.
    pub mutation: Mutation,
    /// Run state.
    pub state: RunState,
    /// Total chunks.
    pub total_chunks: usize,
    /// Committed chunks.
    pub committed_chunks: usize,
    /// Failed chunks.
    pub failed_chunks: usize,
    /// When the run was planned.
    pub created_at: DateTime<Utc>,
}
