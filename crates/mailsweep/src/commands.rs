//! Subcommand implementations.

use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use mailsweep_core::{
    CheckpointRepository, ChunkStatus, Engine, ImapConnector, MessageRecord, Mutation, RunOptions,
    RunResult, Selection, Survey,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::RunControl;
use crate::config::AppConfig;
use crate::credentials;

/// How a command ended, for the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Completed, dry run, or nothing to do.
    Done,
    /// Stopped with a resumable checkpoint.
    Aborted,
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Done => Self::SUCCESS,
            Outcome::Aborted => Self::from(1),
        }
    }
}

async fn open_store(config: &AppConfig) -> Result<CheckpointRepository> {
    let path = config.checkpoint_path()?;
    let store = CheckpointRepository::new(&path.to_string_lossy())
        .await
        .with_context(|| format!("opening checkpoint database {}", path.display()))?;
    Ok(store)
}

async fn open_engine(config: &AppConfig, control: &RunControl) -> Result<Engine<ImapConnector>> {
    let credentials = credentials::resolve(&config.account)?;
    let connector = ImapConnector::new(config.imap(), credentials);

    let mut connection = config.connection();
    if let Some(concurrency) = control.concurrency {
        connection = connection.with_pool_size(concurrency);
    }
    let mut engine = config.engine();
    if let Some(size) = control.chunk_size {
        engine = engine.with_chunk_size(size);
    }

    let store = open_store(config).await?;
    Ok(Engine::new(connector, connection, store, engine))
}

/// Cancels the returned token on Ctrl-C.
fn interrupt_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the chunks in flight");
            token.cancel();
        }
    });
    cancel
}

/// Surveys, previews, confirms and executes.
pub async fn run(
    config: &AppConfig,
    selection: Selection,
    mutation: Mutation,
    control: &RunControl,
    json: bool,
) -> Result<Outcome> {
    if selection.is_empty() {
        bail!("no selection terms given; use --all to select every message");
    }
    let engine = open_engine(config, control).await?;
    let survey = engine.survey(&selection, engine.config().preview_size).await?;

    println!(
        "{} of {} messages in {} match; action: {mutation}",
        survey.candidates.len(),
        survey.scanned,
        selection.mailbox
    );
    if survey.candidates.is_empty() {
        engine.shutdown().await;
        return Ok(Outcome::Done);
    }
    if !control.yes || control.dry_run {
        print_preview(&survey);
    }

    if control.dry_run {
        let options = RunOptions {
            dry_run: true,
            ..RunOptions::default()
        };
        let result = engine
            .execute_survey(selection, mutation, &survey, &options)
            .await?;
        engine.shutdown().await;
        return Ok(report(&result, json));
    }

    if !control.yes && !confirm("Proceed?").await? {
        println!("Nothing changed.");
        engine.shutdown().await;
        return Ok(Outcome::Done);
    }

    let options = RunOptions {
        dry_run: false,
        cancel: interrupt_token(),
    };
    let result = engine
        .execute_survey(selection, mutation, &survey, &options)
        .await;
    engine.shutdown().await;
    Ok(report(&result?, json))
}

/// Continues a stored run.
pub async fn resume(config: &AppConfig, run_id: &str, json: bool) -> Result<Outcome> {
    let engine = open_engine(config, &RunControl::default()).await?;
    let options = RunOptions {
        dry_run: false,
        cancel: interrupt_token(),
    };
    let result = engine.resume(run_id, &options).await;
    engine.shutdown().await;
    Ok(report(&result?, json))
}

/// Prints one run, or every stored run.
pub async fn status(config: &AppConfig, run_id: Option<&str>) -> Result<Outcome> {
    let store = open_store(config).await?;

    let Some(run_id) = run_id else {
        let runs = store.list().await?;
        if runs.is_empty() {
            println!("No stored runs.");
        }
        for run in runs {
            println!(
                "{}  {:<9}  {:<20}  {:<16}  {}/{} committed, {} failed  {}",
                run.run_id,
                run.state.to_string(),
                run.mailbox,
                run.mutation.to_string(),
                run.committed_chunks,
                run.total_chunks,
                run.failed_chunks,
                run.created_at.format("%Y-%m-%d %H:%M")
            );
        }
        return Ok(Outcome::Done);
    };

    let run = store.get(run_id).await?;
    println!("run:        {}", run.run_id);
    println!("state:      {}", run.state);
    println!("mailbox:    {} (UIDVALIDITY {})", run.mailbox(), run.uid_validity);
    println!("action:     {}", run.mutation);
    println!("planned:    {}", run.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!(
        "chunks:     {} total, {} committed, {} pending, {} in flight, {} failed",
        run.chunks.len(),
        run.count(ChunkStatus::Committed),
        run.count(ChunkStatus::Pending),
        run.count(ChunkStatus::InFlight),
        run.count(ChunkStatus::Failed)
    );
    for chunk in run.chunks.iter().filter(|c| c.status == ChunkStatus::Failed) {
        println!(
            "  chunk {} ({} messages, {} failures): {}",
            chunk.id,
            chunk.uids.len(),
            chunk.failures,
            chunk.last_error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(Outcome::Done)
}

/// Deletes a stored run.
pub async fn discard(config: &AppConfig, run_id: &str) -> Result<Outcome> {
    open_store(config).await?.discard(run_id).await?;
    println!("Discarded {run_id}.");
    Ok(Outcome::Done)
}

/// Lists the account's mailboxes.
pub async fn folders(config: &AppConfig) -> Result<Outcome> {
    let engine = open_engine(config, &RunControl::default()).await?;
    let mailboxes = engine.list_mailboxes().await?;
    engine.shutdown().await;
    for entry in mailboxes {
        if entry.is_selectable() {
            println!("{}", entry.mailbox);
        } else {
            println!("{} (not selectable)", entry.mailbox);
        }
    }
    Ok(Outcome::Done)
}

/// Reads a password from stdin and stores it in the keyring.
pub async fn set_password(config: &AppConfig) -> Result<Outcome> {
    eprint!("Password for {}: ", config.account.username);
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        bail!("empty password");
    }
    credentials::store_password(&config.account.username, password)?;
    info!(user = %config.account.username, "password stored in keyring");
    Ok(Outcome::Done)
}

async fn confirm(question: &str) -> Result<bool> {
    eprint!("{question} [y/N] ");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}

fn print_preview(survey: &Survey) {
    if survey.head.is_empty() {
        return;
    }
    println!("First matches:");
    survey.head.iter().for_each(print_record);
    if !survey.tail.is_empty() {
        println!("Last matches:");
        survey.tail.iter().for_each(print_record);
    }
}

fn print_record(record: &MessageRecord) {
    let date = record
        .internal_date
        .map_or_else(|| "----------".to_string(), |d| d.format("%Y-%m-%d").to_string());
    println!(
        "  {:>8}  {date}  {:<32}  {}",
        record.uid.get(),
        truncate(record.sender.as_deref().unwrap_or("-"), 32),
        truncate(record.subject.as_deref().unwrap_or("(no subject)"), 60)
    );
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn report(result: &RunResult, json: bool) -> Outcome {
    if json {
        match serde_json::to_string_pretty(result) {
            Ok(text) => println!("{text}"),
            Err(e) => warn!(error = %e, "cannot encode result"),
        }
    } else if result.dry_run {
        println!("Dry run: {} chunks would be sent.", result.total_chunks);
    } else if result.completed {
        println!("Done: {} chunks committed.", result.committed_chunks);
    } else {
        let why = if result.cancelled { "interrupted" } else { "stopped" };
        println!(
            "Run {} {why}: {}/{} chunks committed, {} failed ({} messages).",
            result.run_id,
            result.committed_chunks,
            result.total_chunks,
            result.failed_chunks.len(),
            result.failed_identifiers.len()
        );
        println!("Resume with: mailsweep resume {}", result.run_id);
    }

    if result.aborted {
        Outcome::Aborted
    } else {
        Outcome::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_counts_chars() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ünïcödé-sender", 8), "ünïcödé…");
    }

    #[test]
    fn aborted_runs_exit_one() {
        let aborted = RunResult {
            run_id: "r".into(),
            aborted: true,
            ..RunResult::default()
        };
        assert_eq!(report(&aborted, true), Outcome::Aborted);
        let done = RunResult {
            completed: true,
            ..RunResult::default()
        };
        assert_eq!(report(&done, true), Outcome::Done);
    }
}
