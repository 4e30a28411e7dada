//! Entry points tying the components together.

use mailsweep_imap::{ListResponse, Uid, UidValidity};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::checkpoint::{
    CheckpointRepository, ChunkRecord, ChunkStatus, RunCheckpoint, RunState, RunSummary,
};
use crate::config::{ConnectionConfig, EngineConfig};
use crate::connection::{ConnectionManager, Connector, Reply, Request};
use crate::executor::{BatchExecutor, RunResult};
use crate::index::{MailboxIndex, MessageRecord};
use crate::mutation::Mutation;
use crate::selector::{Selection, Selector, evaluate_with_sample};
use crate::{Error, Result};

/// Options for [`Engine::run`] and [`Engine::resume`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Plan and report without sending any mutation.
    pub dry_run: bool,
    /// Stops dispatch between chunks when cancelled.
    pub cancel: CancellationToken,
}

/// Candidates of a selection plus a preview of them.
#[derive(Debug, Clone)]
pub struct Survey {
    /// UIDVALIDITY the candidates belong to.
    pub validity: UidValidity,
    /// Messages examined.
    pub scanned: usize,
    /// Matching UIDs, ascending.
    pub candidates: Vec<Uid>,
    /// First matching records.
    pub head: Vec<MessageRecord>,
    /// Last matching records.
    pub tail: Vec<MessageRecord>,
}

/// Bulk mutation engine for one account.
pub struct Engine<C: Connector> {
    manager: ConnectionManager<C>,
    store: CheckpointRepository,
    config: EngineConfig,
}

impl<C: Connector> Engine<C> {
    /// Creates an engine. Connections are opened lazily.
    #[must_use]
    pub fn new(
        connector: C,
        connection: ConnectionConfig,
        store: CheckpointRepository,
        config: EngineConfig,
    ) -> Self {
        Self {
            manager: ConnectionManager::new(connector, connection),
            store,
            config,
        }
    }

    /// The connection manager.
    #[must_use]
    pub const fn manager(&self) -> &ConnectionManager<C> {
        &self.manager
    }

    /// The checkpoint store.
    #[must_use]
    pub const fn store(&self) -> &CheckpointRepository {
        &self.store
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the UIDs `selection` matches, ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the mailbox cannot be read.
    pub async fn plan(&self, selection: &Selection) -> Result<Vec<Uid>> {
        self.survey(selection, 0).await.map(|survey| survey.candidates)
    }

    /// Evaluates `selection` and keeps `sample` records from each end.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a bad pattern, or an error if the
    /// mailbox cannot be read.
    pub async fn survey(&self, selection: &Selection, sample: usize) -> Result<Survey> {
        Selector::new(selection)?;

        let mut session = self.manager.acquire().await?;
        let index = MailboxIndex::new(self.config.fetch_batch_size);
        let mut cursor = index
            .fetch_metadata(&self.manager, &mut session, &selection.mailbox, None)
            .await?;
        let evaluation = evaluate_with_sample(selection, &mut cursor, sample).await?;

        info!(
            mailbox = %selection.mailbox,
            scanned = evaluation.scanned,
            candidates = evaluation.uids.len(),
            "selection evaluated"
        );
        Ok(Survey {
            validity: cursor.validity(),
            scanned: evaluation.scanned,
            candidates: evaluation.uids,
            head: evaluation.head,
            tail: evaluation.tail,
        })
    }

    /// Selects, plans and executes a run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Aborted`] if a fatal error stops the run, or the
    /// underlying error if planning fails.
    pub async fn run(
        &self,
        selection: Selection,
        mutation: Mutation,
        options: &RunOptions,
    ) -> Result<RunResult> {
        let survey = self.survey(&selection, 0).await?;
        self.execute_survey(selection, mutation, &survey, options).await
    }

    /// Executes a run over candidates already surveyed.
    ///
    /// An empty candidate list completes at once without a checkpoint. A dry
    /// run reports the chunk layout without storing or sending anything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Aborted`] if a fatal error stops the run.
    pub async fn execute_survey(
        &self,
        selection: Selection,
        mutation: Mutation,
        survey: &Survey,
        options: &RunOptions,
    ) -> Result<RunResult> {
        if survey.candidates.is_empty() {
            info!(mailbox = %selection.mailbox, "nothing selected");
            return Ok(RunResult {
                completed: true,
                dry_run: options.dry_run,
                ..RunResult::default()
            });
        }

        let run = RunCheckpoint::plan(
            selection,
            mutation,
            &self.config.archive_mailbox,
            survey.validity,
            &survey.candidates,
            self.config.chunk_size,
        )?;

        if options.dry_run {
            info!(chunks = run.chunks.len(), mutation = %run.mutation, "dry run");
            return Ok(RunResult {
                dry_run: true,
                total_chunks: run.chunks.len(),
                ..RunResult::default()
            });
        }

        self.store.create(&run).await?;
        BatchExecutor::new(&self.manager, &self.store, &self.config)
            .execute(&run, &options.cancel)
            .await
    }

    /// Continues a stored run.
    ///
    /// Failed chunks below `max_chunk_failures` are retried; the rest stay
    /// failed and keep the run from completing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RunNotFound`], [`Error::StaleSnapshot`] (wrapped in
    /// [`Error::Aborted`]) if the mailbox was renumbered, or the first fatal
    /// error.
    pub async fn resume(&self, run_id: &str, options: &RunOptions) -> Result<RunResult> {
        let mut run = if options.dry_run {
            self.store.get(run_id).await?
        } else {
            self.store.load(run_id).await?
        };
        if run.fingerprint != run.selection.fingerprint()? {
            return Err(Error::Config(format!(
                "checkpoint {run_id} does not match its stored selection"
            )));
        }
        if run.state == RunState::Completed {
            return Ok(RunResult {
                run_id: run.run_id,
                completed: true,
                dry_run: options.dry_run,
                committed_chunks: run.chunks.len(),
                total_chunks: run.chunks.len(),
                ..RunResult::default()
            });
        }

        let limit = self.config.max_chunk_failures;
        let retry: Vec<usize> = run
            .chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Failed && c.failures < limit)
            .map(|c| c.id)
            .collect();
        if options.dry_run {
            let stuck: Vec<&ChunkRecord> = run
                .chunks
                .iter()
                .filter(|c| c.status == ChunkStatus::Failed && c.failures >= limit)
                .collect();
            info!(
                run_id,
                retry = retry.len(),
                stuck = stuck.len(),
                "dry run of resume"
            );
            return Ok(RunResult {
                run_id: run.run_id.clone(),
                dry_run: true,
                failed_identifiers: stuck
                    .iter()
                    .flat_map(|c| c.uids.iter().map(|uid| uid.get()))
                    .collect(),
                failed_chunks: stuck.iter().map(|c| c.id).collect(),
                committed_chunks: run.count(ChunkStatus::Committed),
                total_chunks: run.chunks.len(),
                ..RunResult::default()
            });
        }

        for id in retry {
            self.store
                .mark_chunk(run_id, id, ChunkStatus::Pending, None)
                .await?;
            run.chunks[id].status = ChunkStatus::Pending;
        }

        info!(
            run_id,
            pending = run.count(ChunkStatus::Pending),
            committed = run.count(ChunkStatus::Committed),
            "resuming run"
        );
        BatchExecutor::new(&self.manager, &self.store, &self.config)
            .execute(&run, &options.cancel)
            .await
    }

    /// Reads a stored run without altering it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RunNotFound`] for an unknown run.
    pub async fn status(&self, run_id: &str) -> Result<RunCheckpoint> {
        self.store.get(run_id).await
    }

    /// Lists stored runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn runs(&self) -> Result<Vec<RunSummary>> {
        self.store.list().await
    }

    /// Deletes a stored run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RunNotFound`] for an unknown run.
    pub async fn discard(&self, run_id: &str) -> Result<()> {
        self.store.discard(run_id).await
    }

    /// Lists every mailbox of the account.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be reached.
    pub async fn list_mailboxes(&self) -> Result<Vec<ListResponse>> {
        let mut session = self.manager.acquire().await?;
        let request = Request::List {
            reference: String::new(),
            pattern: "*".to_string(),
        };
        match self.manager.execute(&mut session, &request).await? {
            Reply::Mailboxes(mailboxes) => Ok(mailboxes),
            _ => Err(Error::Protocol("LIST returned no mailboxes".into())),
        }
    }

    /// Logs out pooled sessions.
    pub async fn shutdown(&self) {
        self.manager.shutdown().await;
    }
}
