//! SQLite-backed checkpoint store.

use chrono::{DateTime, Utc};
use mailsweep_imap::{Uid, UidValidity};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use tokio::sync::Mutex;
use tracing::debug;

use super::model::{ChunkRecord, ChunkStatus, RunCheckpoint, RunState, RunSummary};
use crate::{Error, Result};

/// Durable record of runs and their chunks.
///
/// Writes go through a single lock so chunk transitions from concurrent
/// workers are applied one at a time.
pub struct CheckpointRepository {
    pool: SqlitePool,
    writer: Mutex<()>,
}

impl CheckpointRepository {
    /// Opens or creates the database at `database_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let repo = Self {
            pool,
            writer: Mutex::new(()),
        };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Create an in-memory repository for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let repo = Self {
            pool,
            writer: Mutex::new(()),
        };
        repo.initialize().await?;
        Ok(repo)
    }

    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS runs (
                run_id TEXT PRIMARY KEY,
                fingerprint TEXT NOT NULL,
                selection TEXT NOT NULL,
                mutation TEXT NOT NULL,
                archive_mailbox TEXT NOT NULL,
                mailbox TEXT NOT NULL,
                uid_validity INTEGER NOT NULL,
                state TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS chunks (
                run_id TEXT NOT NULL REFERENCES runs(run_id) ON DELETE CASCADE,
                chunk_id INTEGER NOT NULL,
                uids TEXT NOT NULL,
                status TEXT NOT NULL,
                failures INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                PRIMARY KEY (run_id, chunk_id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Stores a freshly planned run with all its chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn create(&self, run: &RunCheckpoint) -> Result<()> {
        let _guard = self.writer.lock().await;
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            INSERT INTO runs
                (run_id, fingerprint, selection, mutation, archive_mailbox, mailbox,
                 uid_validity, state, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&run.run_id)
        .bind(&run.fingerprint)
        .bind(serde_json::to_string(&run.selection)?)
        .bind(serde_json::to_string(&run.mutation)?)
        .bind(&run.archive_mailbox)
        .bind(run.mailbox())
        .bind(i64::from(run.uid_validity.get()))
        .bind(run.state.as_str())
        .bind(run.created_at.to_rfc3339())
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        for chunk in &run.chunks {
            let uids: Vec<u32> = chunk.uids.iter().map(|uid| uid.get()).collect();
            sqlx::query(
                r"
                INSERT INTO chunks (run_id, chunk_id, uids, status, failures, last_error)
                VALUES (?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(&run.run_id)
            .bind(chunk_id(chunk.id)?)
            .bind(serde_json::to_string(&uids)?)
            .bind(chunk.status.as_str())
            .bind(i64::from(chunk.failures))
            .bind(&chunk.last_error)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(run_id = %run.run_id, chunks = run.chunks.len(), "checkpoint created");
        Ok(())
    }

    /// Records a chunk transition. Moving to `Failed` bumps the failure count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RunNotFound`] if the chunk does not exist, or an error
    /// if the database query fails.
    pub async fn mark_chunk(
        &self,
        run_id: &str,
        chunk: usize,
        status: ChunkStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let _guard = self.writer.lock().await;
        let bump = i64::from(status == ChunkStatus::Failed);
        let result = sqlx::query(
            r"
            UPDATE chunks
            SET status = ?,
                failures = failures + ?,
                last_error = COALESCE(?, last_error)
            WHERE run_id = ? AND chunk_id = ?
            ",
        )
        .bind(status.as_str())
        .bind(bump)
        .bind(error)
        .bind(run_id)
        .bind(chunk_id(chunk)?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::RunNotFound(format!("{run_id} chunk {chunk}")));
        }
        self.touch(run_id).await
    }

    /// Sets the run state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RunNotFound`] for an unknown run, or an error if the
    /// database query fails.
    pub async fn set_run_state(&self, run_id: &str, state: RunState) -> Result<()> {
        let _guard = self.writer.lock().await;
        let result = sqlx::query("UPDATE runs SET state = ?, updated_at = ? WHERE run_id = ?")
            .bind(state.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(run_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::RunNotFound(run_id.to_string()));
        }
        Ok(())
    }

    /// Loads a run. Chunks left `InFlight` by an interrupted process are
    /// demoted to `Pending`, in the database as well as in the result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RunNotFound`] for an unknown run, or an error if the
    /// database query fails or a stored value is corrupt.
    pub async fn load(&self, run_id: &str) -> Result<RunCheckpoint> {
        {
            let _guard = self.writer.lock().await;
            let demoted = sqlx::query(
                "UPDATE chunks SET status = ? WHERE run_id = ? AND status = ?",
            )
            .bind(ChunkStatus::Pending.as_str())
            .bind(run_id)
            .bind(ChunkStatus::InFlight.as_str())
            .execute(&self.pool)
            .await?;
            if demoted.rows_affected() > 0 {
                debug!(run_id, chunks = demoted.rows_affected(), "in-flight chunks demoted");
            }
        }
        self.get(run_id).await
    }

    /// Reads a run as stored, without touching `InFlight` chunks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RunNotFound`] for an unknown run, or an error if the
    /// database query fails or a stored value is corrupt.
    pub async fn get(&self, run_id: &str) -> Result<RunCheckpoint> {
        let row = sqlx::query(
            r"
            SELECT run_id, fingerprint, selection, mutation, archive_mailbox, uid_validity,
                   state, created_at
            FROM runs
            WHERE run_id = ?
            ",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::RunNotFound(run_id.to_string()))?;

        let chunk_rows = sqlx::query(
            r"
            SELECT chunk_id, uids, status, failures, last_error
            FROM chunks
            WHERE run_id = ?
            ORDER BY chunk_id ASC
            ",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        let chunks = chunk_rows
            .iter()
            .map(chunk_from_row)
            .collect::<Result<Vec<_>>>()?;

        let validity: i64 = row.get("uid_validity");
        let uid_validity = u32::try_from(validity)
            .ok()
            .and_then(UidValidity::new)
            .ok_or_else(|| Error::Protocol(format!("stored UIDVALIDITY {validity} is invalid")))?;

        Ok(RunCheckpoint {
            run_id: row.get("run_id"),
            fingerprint: row.get("fingerprint"),
            selection: serde_json::from_str(&row.get::<String, _>("selection"))?,
            mutation: serde_json::from_str(&row.get::<String, _>("mutation"))?,
            archive_mailbox: row.get("archive_mailbox"),
            uid_validity,
            state: RunState::parse(&row.get::<String, _>("state"))?,
            chunks,
            created_at: parse_time(&row.get::<String, _>("created_at")),
        })
    }

    /// Lists stored runs, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self) -> Result<Vec<RunSummary>> {
        let rows = sqlx::query(
            r"
            SELECT r.run_id, r.mailbox, r.mutation, r.state, r.created_at,
                   COUNT(c.chunk_id) AS total,
                   COALESCE(SUM(c.status = 'committed'), 0) AS committed,
                   COALESCE(SUM(c.status = 'failed'), 0) AS failed
            FROM runs r
            LEFT JOIN chunks c ON c.run_id = r.run_id
            GROUP BY r.run_id
            ORDER BY r.created_at DESC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(RunSummary {
                    run_id: row.get("run_id"),
                    mailbox: row.get("mailbox"),
                    mutation: serde_json::from_str(&row.get::<String, _>("mutation"))?,
                    state: RunState::parse(&row.get::<String, _>("state"))?,
                    total_chunks: count(row, "total"),
                    committed_chunks: count(row, "committed"),
                    failed_chunks: count(row, "failed"),
                    created_at: parse_time(&row.get::<String, _>("created_at")),
                })
            })
            .collect()
    }

    /// Marks a run Completed and keeps it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RunNotFound`] for an unknown run, or an error if the
    /// database query fails.
    pub async fn archive(&self, run_id: &str) -> Result<()> {
        self.set_run_state(run_id, RunState::Completed).await
    }

    /// Deletes a run and its chunks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RunNotFound`] for an unknown run, or an error if the
    /// database query fails.
    pub async fn discard(&self, run_id: &str) -> Result<()> {
        let _guard = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks WHERE run_id = ?")
            .bind(run_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM runs WHERE run_id = ?")
            .bind(run_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::RunNotFound(run_id.to_string()));
        }
        tx.commit().await?;
        debug!(run_id, "checkpoint discarded");
        Ok(())
    }

    async fn touch(&self, run_id: &str) -> Result<()> {
        sqlx::query("UPDATE runs SET updated_at = ? WHERE run_id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(run_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn chunk_id(id: usize) -> Result<i64> {
    i64::try_from(id).map_err(|_| Error::Config(format!("chunk id {id} out of range")))
}

fn chunk_from_row(row: &SqliteRow) -> Result<ChunkRecord> {
    let id: i64 = row.get("chunk_id");
    let raw: Vec<u32> = serde_json::from_str(&row.get::<String, _>("uids"))?;
    let uids = raw
        .into_iter()
        .map(|n| Uid::new(n).ok_or_else(|| Error::Protocol("stored UID 0".into())))
        .collect::<Result<Vec<_>>>()?;
    let failures: i64 = row.get("failures");

    Ok(ChunkRecord {
        id: usize::try_from(id).map_err(|_| Error::Protocol(format!("stored chunk id {id}")))?,
        uids,
        status: ChunkStatus::parse(&row.get::<String, _>("status"))?,
        failures: u32::try_from(failures).unwrap_or(u32::MAX),
        last_error: row.get("last_error"),
    })
}

fn count(row: &SqliteRow, column: &str) -> usize {
    usize::try_from(row.get::<i64, _>(column)).unwrap_or(0)
}

fn parse_time(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_default()
}
