//! Chunked, resumable application of a mutation.
//!
//! Up to `pool_size` workers pull chunk ids from a shared queue. Each chunk
//! is marked `InFlight` before its first command and `Committed` after its
//! last, so the checkpoint never claims more than the server has applied.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use futures::future::join_all;
use mailsweep_imap::Uid;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::checkpoint::{CheckpointRepository, ChunkRecord, ChunkStatus, RunCheckpoint, RunState};
use crate::config::EngineConfig;
use crate::connection::{ConnectionManager, Connector, Request};
use crate::mutation::{self, defers_expunge};
use crate::{Error, Result};

/// How a run ended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunResult {
    /// Run id, empty when nothing was planned.
    pub run_id: String,
    /// Every chunk committed.
    pub completed: bool,
    /// Stopped with chunks left; the checkpoint is kept.
    pub aborted: bool,
    /// Stopped by cancellation.
    pub cancelled: bool,
    /// Planned only; nothing was sent.
    pub dry_run: bool,
    /// UIDs of every chunk left `Failed`.
    pub failed_identifiers: Vec<u32>,
    /// Ids of the failed chunks.
    pub failed_chunks: Vec<usize>,
    /// Chunks committed, including earlier attempts.
    pub committed_chunks: usize,
    /// Chunks in the run.
    pub total_chunks: usize,
}

impl RunResult {
    fn from_checkpoint(run: &RunCheckpoint) -> Self {
        Self {
            run_id: run.run_id.clone(),
            failed_identifiers: run.failed_uids().into_iter().map(Uid::get).collect(),
            failed_chunks: run
                .chunks
                .iter()
                .filter(|c| c.status == ChunkStatus::Failed)
                .map(|c| c.id)
                .collect(),
            committed_chunks: run.count(ChunkStatus::Committed),
            total_chunks: run.chunks.len(),
            ..Self::default()
        }
    }
}

/// Drives a planned run to completion or abort.
pub struct BatchExecutor<'a, C: Connector> {
    manager: &'a ConnectionManager<C>,
    store: &'a CheckpointRepository,
    config: &'a EngineConfig,
}

/// State shared by the workers of one run.
struct Dispatch {
    queue: Mutex<VecDeque<usize>>,
    halt: CancellationToken,
    fatal: Mutex<Option<Error>>,
}

impl Dispatch {
    fn next(&self) -> Option<usize> {
        if self.halt.is_cancelled() {
            return None;
        }
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    fn abort(&self, err: Error) {
        let mut fatal = self.fatal.lock().unwrap_or_else(PoisonError::into_inner);
        if fatal.is_none() {
            *fatal = Some(err);
        }
        self.halt.cancel();
    }
}

impl<'a, C: Connector> BatchExecutor<'a, C> {
    /// Creates an executor over a manager and a checkpoint store.
    #[must_use]
    pub const fn new(
        manager: &'a ConnectionManager<C>,
        store: &'a CheckpointRepository,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            manager,
            store,
            config,
        }
    }

    /// Dispatches every `Pending` chunk of `run`.
    ///
    /// Transport failures that outlive the retry budget mark the chunk
    /// `Failed` and dispatch continues. Any other error stops dispatch, puts
    /// the in-flight chunk back to `Pending` and returns
    /// [`Error::Aborted`]. Cancellation is observed between chunks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Aborted`] on a fatal error, or a database error if
    /// the checkpoint cannot be updated after dispatch.
    pub async fn execute(&self, run: &RunCheckpoint, cancel: &CancellationToken) -> Result<RunResult> {
        let pending: VecDeque<usize> = run
            .chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Pending)
            .map(|c| c.id)
            .collect();
        info!(
            run_id = %run.run_id,
            mailbox = run.mailbox(),
            mutation = %run.mutation,
            pending = pending.len(),
            total = run.chunks.len(),
            "run started"
        );
        self.store.set_run_state(&run.run_id, RunState::Running).await?;

        if let Err(err) = self.verify_snapshot(run).await {
            return self.abort(run, err).await;
        }

        let workers = self.manager.config().pool_size.min(pending.len()).max(1);
        let dispatch = Dispatch {
            queue: Mutex::new(pending),
            halt: cancel.child_token(),
            fatal: Mutex::new(None),
        };
        let deferred = AtomicBool::new(false);

        join_all((0..workers).map(|worker| self.worker(worker, run, &dispatch, &deferred))).await;

        if let Some(err) = dispatch.fatal.into_inner().unwrap_or_else(PoisonError::into_inner) {
            return self.abort(run, err).await;
        }

        let finished = self.store.load(&run.run_id).await?;
        let mut result = RunResult::from_checkpoint(&finished);

        if result.committed_chunks == result.total_chunks {
            if let Err(err) = self.finish(run, deferred.load(Ordering::Relaxed)).await {
                return self.abort(run, err).await;
            }
            result.completed = true;
            info!(run_id = %run.run_id, chunks = result.total_chunks, "run completed");
            return Ok(result);
        }

        self.store.set_run_state(&run.run_id, RunState::Aborted).await?;
        result.aborted = true;
        result.cancelled = cancel.is_cancelled();
        warn!(
            run_id = %run.run_id,
            committed = result.committed_chunks,
            failed = ?result.failed_chunks,
            cancelled = result.cancelled,
            "run aborted"
        );
        Ok(result)
    }

    /// Reselects the run's mailbox and checks its UIDVALIDITY.
    async fn verify_snapshot(&self, run: &RunCheckpoint) -> Result<()> {
        let mut session = self.manager.acquire().await?;
        self.manager
            .select(&mut session, run.mailbox(), Some(run.uid_validity))
            .await
            .map(|_| ())
    }

    async fn worker(&self, worker: usize, run: &RunCheckpoint, dispatch: &Dispatch, deferred: &AtomicBool) {
        while let Some(id) = dispatch.next() {
            let chunk = &run.chunks[id];
            match self.process(run, chunk).await {
                Ok(defer) => {
                    if defer {
                        deferred.store(true, Ordering::Relaxed);
                    }
                }
                Err(Error::Transport(err)) => {
                    warn!(run_id = %run.run_id, worker, chunk = id, error = %err, "chunk failed");
                    let message = err.to_string();
                    if let Err(err) = self
                        .store
                        .mark_chunk(&run.run_id, id, ChunkStatus::Failed, Some(&message))
                        .await
                    {
                        dispatch.abort(err);
                    }
                }
                Err(err) => {
                    warn!(run_id = %run.run_id, worker, chunk = id, error = %err, "fatal error, stopping dispatch");
                    if let Err(db) = self
                        .store
                        .mark_chunk(&run.run_id, id, ChunkStatus::Pending, None)
                        .await
                    {
                        warn!(run_id = %run.run_id, chunk = id, error = %db, "could not reset chunk");
                    }
                    dispatch.abort(err);
                }
            }
        }
        debug!(run_id = %run.run_id, worker, "worker done");
    }

    /// Runs one chunk. Returns whether a deferred expunge is owed.
    async fn process(&self, run: &RunCheckpoint, chunk: &ChunkRecord) -> Result<bool> {
        let uids = chunk
            .uid_set()
            .ok_or_else(|| Error::Protocol(format!("chunk {} has no UIDs", chunk.id)))?;

        let mut session = self.manager.acquire().await?;
        self.manager
            .ensure_selected(&mut session, run.mailbox(), run.uid_validity)
            .await?;

        self.store
            .mark_chunk(&run.run_id, chunk.id, ChunkStatus::InFlight, None)
            .await?;

        let plan = mutation::plan(
            &run.mutation,
            &session.profile(),
            &uids,
            &run.archive_mailbox,
        );
        for step in &plan.steps {
            self.manager.execute(&mut session, step).await?;
        }

        self.store
            .mark_chunk(&run.run_id, chunk.id, ChunkStatus::Committed, None)
            .await?;
        debug!(run_id = %run.run_id, chunk = chunk.id, uids = chunk.uids.len(), "chunk committed");
        Ok(plan.deferred_expunge)
    }

    /// Runs the deferred expunge, then archives or discards the checkpoint.
    async fn finish(&self, run: &RunCheckpoint, deferred: bool) -> Result<()> {
        let mut session = self.manager.acquire().await?;
        if deferred || defers_expunge(&run.mutation, &session.profile()) {
            self.manager
                .ensure_selected(&mut session, run.mailbox(), run.uid_validity)
                .await?;
            self.manager.execute(&mut session, &Request::Expunge).await?;
            info!(run_id = %run.run_id, mailbox = run.mailbox(), "deferred expunge done");
        }
        drop(session);

        if self.config.retain_completed {
            self.store.archive(&run.run_id).await
        } else {
            self.store.discard(&run.run_id).await
        }
    }

    async fn abort(&self, run: &RunCheckpoint, err: Error) -> Result<RunResult> {
        self.store.set_run_state(&run.run_id, RunState::Aborted).await?;
        let last_committed_chunk = self.store.load(&run.run_id).await?.last_committed();
        warn!(run_id = %run.run_id, error = %err, "run aborted by fatal error");
        Err(Error::Aborted {
            run_id: run.run_id.clone(),
            last_committed_chunk,
            source: Box::new(err),
        })
    }
}
