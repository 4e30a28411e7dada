//! End-to-end runs against the in-process server.

#![allow(clippy::unwrap_used)]

mod common;

use std::time::Duration;

use common::{FakeMessage, FakeServer, Fault, seed, uid};
use mailsweep_core::{
    ChunkStatus, CheckpointRepository, ConnectionConfig, Engine, EngineConfig, Error, Mutation,
    RetryPolicy, RunOptions, RunState, Selection, Term,
};
use mailsweep_imap::UidSet;
use tokio_util::sync::CancellationToken;

fn fast_retry() -> RetryPolicy {
    RetryPolicy::default()
        .with_base_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(4))
}

async fn engine(
    server: &FakeServer,
    pool_size: usize,
    config: EngineConfig,
) -> Engine<common::FakeConnector> {
    let connection = ConnectionConfig::default()
        .with_pool_size(pool_size)
        .with_retry(fast_retry());
    let store = CheckpointRepository::in_memory().await.unwrap();
    Engine::new(server.connector(), connection, store, config)
}

fn old_mail() -> Selection {
    Selection::new("INBOX").with(Term::Label("Old".into()))
}

#[tokio::test]
async fn large_selection_commits_every_chunk() {
    let server = FakeServer::gmail();
    seed(&server, 250_000);
    let engine = engine(&server, 2, EngineConfig::default()).await;

    let result = engine
        .run(old_mail(), Mutation::AddLabel("Swept".into()), &RunOptions::default())
        .await
        .unwrap();

    assert!(result.completed);
    assert!(!result.aborted);
    assert_eq!(result.total_chunks, 500);
    assert_eq!(result.committed_chunks, 500);
    assert!(result.failed_identifiers.is_empty());
    assert_eq!(server.count("UID STORE"), 500);
    assert!(server.max_live() <= 2);
    assert!(server.messages("INBOX").iter().all(|m| m.labels.contains("Swept")));
    // Completed runs are not retained by default.
    assert!(engine.runs().await.unwrap().is_empty());
}

#[tokio::test]
async fn persistent_transport_failure_fails_one_chunk() {
    let server = FakeServer::gmail();
    seed(&server, 10_000);
    // First UID of the tenth chunk; six failures outlast a budget of five retries.
    server.fail_store(4501, 6, Fault::Drop);
    let engine = engine(&server, 1, EngineConfig::default()).await;

    let result = engine
        .run(old_mail(), Mutation::Delete, &RunOptions::default())
        .await
        .unwrap();

    assert!(!result.completed);
    assert!(result.aborted);
    assert!(!result.cancelled);
    assert_eq!(result.total_chunks, 20);
    assert_eq!(result.failed_chunks, vec![9]);
    assert_eq!(result.failed_identifiers, (4501..=5000).collect::<Vec<u32>>());
    assert_eq!(result.committed_chunks, 19);

    let run = engine.status(&result.run_id).await.unwrap();
    assert_eq!(run.state, RunState::Aborted);
    for chunk in &run.chunks[..9] {
        assert_eq!(chunk.status, ChunkStatus::Committed);
    }
    assert_eq!(run.chunks[9].status, ChunkStatus::Failed);
    assert_eq!(run.chunks[9].failures, 1);
    assert!(run.chunks[9].last_error.is_some());
    assert_eq!(server.messages("INBOX").len(), 500);

    // Healthy transport: resume finishes the run.
    let resumed = engine
        .resume(&result.run_id, &RunOptions::default())
        .await
        .unwrap();
    assert!(resumed.completed);
    assert_eq!(resumed.committed_chunks, 20);
    assert_eq!(resumed.total_chunks, 20);
    assert!(server.messages("INBOX").is_empty());
    assert_eq!(server.messages("[Gmail]/Trash").len(), 10_000);
}

#[tokio::test]
async fn chunks_past_the_failure_limit_stay_failed() {
    let server = FakeServer::gmail();
    seed(&server, 1_000);
    server.fail_store(1, 1_000, Fault::Drop);
    let config = EngineConfig::default().with_max_chunk_failures(2);
    let engine = engine(&server, 1, config).await;

    let first = engine
        .run(old_mail(), Mutation::Archive, &RunOptions::default())
        .await
        .unwrap();
    assert_eq!(first.failed_chunks, vec![0]);

    let second = engine.resume(&first.run_id, &RunOptions::default()).await.unwrap();
    assert!(second.aborted);
    assert_eq!(second.failed_chunks, vec![0]);

    // Two failures recorded: the chunk is no longer retried.
    let stores = server.count("UID STORE");
    let third = engine.resume(&first.run_id, &RunOptions::default()).await.unwrap();
    assert!(third.aborted);
    assert_eq!(third.failed_chunks, vec![0]);
    assert_eq!(third.committed_chunks, 1);
    assert_eq!(server.count("UID STORE"), stores);

    let dry = engine
        .resume(
            &first.run_id,
            &RunOptions {
                dry_run: true,
                ..RunOptions::default()
            },
        )
        .await
        .unwrap();
    assert!(dry.dry_run);
    assert_eq!(dry.failed_chunks, vec![0]);
    assert_eq!(dry.failed_identifiers, (1..=500).collect::<Vec<u32>>());
}

#[tokio::test]
async fn resume_dry_run_sends_and_stores_nothing() {
    let server = FakeServer::gmail();
    seed(&server, 1_500);
    server.fail_store(1, 6, Fault::Drop);
    let engine = engine(&server, 1, EngineConfig::default()).await;

    let first = engine
        .run(old_mail(), Mutation::Delete, &RunOptions::default())
        .await
        .unwrap();
    assert_eq!(first.failed_chunks, vec![0]);
    server.clear_faults();

    let stores = server.count("UID STORE");
    let connects = server.connects();
    let dry = engine
        .resume(
            &first.run_id,
            &RunOptions {
                dry_run: true,
                ..RunOptions::default()
            },
        )
        .await
        .unwrap();
    assert!(dry.dry_run);
    assert!(!dry.completed);
    assert_eq!(dry.total_chunks, 3);
    assert_eq!(dry.committed_chunks, 2);
    // One failure is below the limit, so the chunk would be retried.
    assert!(dry.failed_chunks.is_empty());
    assert_eq!(server.count("UID STORE"), stores);
    assert_eq!(server.connects(), connects);

    let run = engine.status(&first.run_id).await.unwrap();
    assert_eq!(run.state, RunState::Aborted);
    assert_eq!(run.chunks[0].status, ChunkStatus::Failed);
    assert_eq!(server.messages("INBOX").len(), 500);

    let resumed = engine.resume(&first.run_id, &RunOptions::default()).await.unwrap();
    assert!(resumed.completed);
    assert!(server.messages("INBOX").is_empty());
}

#[tokio::test]
async fn resume_keeps_the_planned_archive_mailbox() {
    let server = FakeServer::new(mailsweep_imap::ServerProfile {
        uidplus: true,
        native_move: true,
        ..mailsweep_imap::ServerProfile::basic()
    });
    seed(&server, 1_200);
    server.create_mailbox("Archive/Old");
    server.create_mailbox("Elsewhere");

    // The configuration changed after the run was planned.
    let config = EngineConfig::default().with_archive_mailbox("Elsewhere");
    let engine = engine(&server, 1, config).await;
    let survey = engine.survey(&old_mail_basic(), 0).await.unwrap();
    let run = mailsweep_core::RunCheckpoint::plan(
        old_mail_basic(),
        Mutation::Archive,
        "Archive/Old",
        survey.validity,
        &survey.candidates,
        500,
    )
    .unwrap();
    engine.store().create(&run).await.unwrap();
    assert_eq!(engine.status(&run.run_id).await.unwrap().archive_mailbox, "Archive/Old");

    let result = engine.resume(&run.run_id, &RunOptions::default()).await.unwrap();
    assert!(result.completed);
    assert_eq!(server.messages("Archive/Old").len(), 1_200);
    assert!(server.messages("Elsewhere").is_empty());
    assert!(server.messages("INBOX").is_empty());
}

#[tokio::test]
async fn resumed_run_matches_uninterrupted_run() {
    let reference = FakeServer::basic();
    seed(&reference, 3_000);
    let engine_a = engine(&reference, 1, EngineConfig::default()).await;
    let result = engine_a
        .run(old_mail_basic(), Mutation::Delete, &RunOptions::default())
        .await
        .unwrap();
    assert!(result.completed);

    let server = FakeServer::basic();
    seed(&server, 3_000);
    let engine_b = engine(&server, 1, EngineConfig::default()).await;
    let cancel = CancellationToken::new();
    server.cancel_after_stores(2, cancel.clone());
    let options = RunOptions {
        dry_run: false,
        cancel,
    };
    let interrupted = engine_b
        .run(old_mail_basic(), Mutation::Delete, &options)
        .await
        .unwrap();
    assert!(interrupted.cancelled);
    assert!(interrupted.aborted);
    assert_eq!(interrupted.committed_chunks, 2);
    assert!(interrupted.failed_identifiers.is_empty());

    let resumed = engine_b
        .resume(&interrupted.run_id, &RunOptions::default())
        .await
        .unwrap();
    assert!(resumed.completed);
    assert_eq!(resumed.committed_chunks, 6);
    assert_eq!(server.snapshot(), reference.snapshot());
    assert!(server.messages("INBOX").is_empty());
    // No UIDPLUS: a single plain EXPUNGE once everything committed.
    assert_eq!(server.count("EXPUNGE"), 1);
    assert_eq!(server.count("UID EXPUNGE"), 0);
}

fn old_mail_basic() -> Selection {
    // Outside Gmail, labels are keyword flags; the seed has none, so select by sender.
    Selection::new("INBOX").with(Term::Sender("@example.com".into()))
}

#[tokio::test]
async fn empty_selection_does_nothing() {
    let server = FakeServer::gmail();
    seed(&server, 100);
    let engine = engine(&server, 2, EngineConfig::default()).await;

    let result = engine
        .run(Selection::new("INBOX"), Mutation::Delete, &RunOptions::default())
        .await
        .unwrap();

    assert!(result.completed);
    assert_eq!(result.total_chunks, 0);
    assert!(result.run_id.is_empty());
    assert_eq!(server.count("UID STORE"), 0);
    assert_eq!(server.messages("INBOX").len(), 100);
    assert!(engine.runs().await.unwrap().is_empty());
}

#[tokio::test]
async fn renumbered_mailbox_is_never_mutated() {
    let server = FakeServer::gmail();
    seed(&server, 1_200);
    let engine = engine(&server, 2, EngineConfig::default()).await;

    let selection = old_mail();
    let survey = engine.survey(&selection, 0).await.unwrap();
    assert_eq!(survey.candidates.len(), 1_200);
    server.bump_validity("INBOX");

    let err = engine
        .execute_survey(selection, Mutation::Delete, &survey, &RunOptions::default())
        .await
        .unwrap_err();

    let Error::Aborted {
        run_id,
        last_committed_chunk,
        source,
    } = err
    else {
        panic!("expected an aborted run");
    };
    assert!(matches!(*source, Error::StaleSnapshot { expected: 1, actual: 2, .. }));
    assert_eq!(last_committed_chunk, None);
    assert_eq!(server.count("UID STORE"), 0);
    assert_eq!(server.messages("INBOX").len(), 1_200);

    let run = engine.status(&run_id).await.unwrap();
    assert_eq!(run.state, RunState::Aborted);
    assert_eq!(run.count(ChunkStatus::Pending), 3);
}

#[tokio::test]
async fn refused_command_aborts_and_keeps_checkpoint() {
    let server = FakeServer::gmail();
    seed(&server, 2_000);
    server.fail_store(1001, 1, Fault::Refuse);
    let engine = engine(&server, 1, EngineConfig::default()).await;

    let err = engine
        .run(old_mail(), Mutation::RemoveLabel("Old".into()), &RunOptions::default())
        .await
        .unwrap_err();
    let Error::Aborted {
        run_id,
        last_committed_chunk,
        source,
    } = err
    else {
        panic!("expected an aborted run");
    };
    assert!(matches!(*source, Error::Protocol(_)));
    assert_eq!(last_committed_chunk, Some(1));

    let run = engine.status(&run_id).await.unwrap();
    assert_eq!(run.chunks[2].status, ChunkStatus::Pending);
    assert_eq!(run.chunks[3].status, ChunkStatus::Pending);
    assert_eq!(run.count(ChunkStatus::InFlight), 0);

    let resumed = engine.resume(&run_id, &RunOptions::default()).await.unwrap();
    assert!(resumed.completed);
    assert!(server.messages("INBOX").iter().all(|m| !m.labels.contains("Old")));
}

#[tokio::test]
async fn interrupted_in_flight_chunk_is_redone() {
    let server = FakeServer::gmail();
    seed(&server, 1_500);
    let config = EngineConfig::default().with_retain_completed(true);
    let engine = engine(&server, 2, config).await;

    let survey = engine.survey(&old_mail(), 0).await.unwrap();
    let dry = engine
        .execute_survey(
            old_mail(),
            Mutation::AddLabel("Later".into()),
            &survey,
            &RunOptions {
                dry_run: true,
                ..RunOptions::default()
            },
        )
        .await
        .unwrap();
    assert!(dry.dry_run);
    assert_eq!(dry.total_chunks, 3);
    assert_eq!(server.count("UID STORE"), 0);

    // Simulate a crash after chunk 0 was committed and chunk 1 was sent.
    let run = mailsweep_core::RunCheckpoint::plan(
        old_mail(),
        Mutation::AddLabel("Later".into()),
        "Archive",
        survey.validity,
        &survey.candidates,
        500,
    )
    .unwrap();
    let store = engine.store();
    store.create(&run).await.unwrap();
    store
        .mark_chunk(&run.run_id, 0, ChunkStatus::Committed, None)
        .await
        .unwrap();
    store
        .mark_chunk(&run.run_id, 1, ChunkStatus::InFlight, None)
        .await
        .unwrap();
    store.set_run_state(&run.run_id, RunState::Running).await.unwrap();

    let result = engine.resume(&run.run_id, &RunOptions::default()).await.unwrap();
    assert!(result.completed);
    assert_eq!(result.committed_chunks, 3);
    // Chunk 0 was not resent.
    assert_eq!(server.count("UID STORE"), 2);
    assert!(server.messages("INBOX")[500..].iter().all(|m| m.labels.contains("Later")));

    // Retained as completed; resuming again is a no-op.
    let again = engine.resume(&run.run_id, &RunOptions::default()).await.unwrap();
    assert!(again.completed);
    assert_eq!(server.count("UID STORE"), 2);
}

#[tokio::test]
async fn archive_without_move_copies_and_expunges() {
    let server = FakeServer::new(mailsweep_imap::ServerProfile {
        uidplus: true,
        ..mailsweep_imap::ServerProfile::basic()
    });
    server.create_mailbox("Archive");
    server.populate("INBOX", 40, |n| {
        let msg = FakeMessage::new(format!("Digest {n}"), "list@lists.example.org")
            .with_date("15-Mar-2019 08:00:00 +0000");
        if n % 2 == 0 { msg.with_list_id("<weekly.lists.example.org>") } else { msg }
    });
    let config = EngineConfig::default().with_chunk_size(8);
    let engine = engine(&server, 2, config).await;

    let selection = Selection::new("INBOX").with(Term::ListId("<weekly.*>".into()));
    let result = engine
        .run(selection, Mutation::Archive, &RunOptions::default())
        .await
        .unwrap();

    assert!(result.completed);
    assert_eq!(result.total_chunks, 3);
    assert_eq!(server.messages("INBOX").len(), 20);
    assert_eq!(server.messages("Archive").len(), 20);
    assert_eq!(server.count("UID COPY"), 3);
    assert_eq!(server.count("UID EXPUNGE"), 3);
    assert_eq!(server.count("EXPUNGE"), 0);
}

#[tokio::test]
async fn mutation_plans_are_idempotent() {
    // UID COPY duplicates on replay, so the plain server here advertises MOVE.
    let plain = FakeServer::new(mailsweep_imap::ServerProfile {
        uidplus: true,
        native_move: true,
        ..mailsweep_imap::ServerProfile::basic()
    });
    for server in [FakeServer::gmail(), plain] {
        seed(&server, 20);
        server.create_mailbox("Archive");
        let engine = engine(&server, 1, EngineConfig::default()).await;
        let manager = engine.manager();
        let uids = UidSet::range(uid(1), uid(20));

        for mutation in [
            Mutation::AddLabel("Keep".into()),
            Mutation::RemoveLabel("Old".into()),
            Mutation::Archive,
            Mutation::Delete,
        ] {
            let mut session = manager.acquire().await.unwrap();
            manager.select(&mut session, "INBOX", None).await.unwrap();
            let plan = mailsweep_core::mutation::plan(&mutation, &session.profile(), &uids, "Archive");

            for step in &plan.steps {
                manager.execute(&mut session, step).await.unwrap();
            }
            let once = server.snapshot();
            for step in &plan.steps {
                manager.execute(&mut session, step).await.unwrap();
            }
            assert_eq!(server.snapshot(), once, "{mutation} is not idempotent");
        }
    }
}

#[tokio::test]
async fn preview_keeps_both_ends() {
    let server = FakeServer::gmail();
    seed(&server, 50);
    let engine = engine(&server, 1, EngineConfig::default().with_fetch_batch_size(7)).await;

    let survey = engine.survey(&old_mail(), 3).await.unwrap();
    assert_eq!(survey.scanned, 50);
    assert_eq!(survey.candidates.len(), 50);
    let head: Vec<u32> = survey.head.iter().map(|r| r.uid.get()).collect();
    let tail: Vec<u32> = survey.tail.iter().map(|r| r.uid.get()).collect();
    assert_eq!(head, vec![1, 2, 3]);
    assert_eq!(tail, vec![48, 49, 50]);
    assert_eq!(survey.head[0].subject.as_deref(), Some("Message 1"));
    assert_eq!(server.count("UID FETCH"), 8);
}

#[tokio::test]
async fn unknown_mailbox_is_reported() {
    let server = FakeServer::gmail();
    let engine = engine(&server, 1, EngineConfig::default()).await;

    let err = engine.plan(&Selection::new("Nope").with(Term::All)).await.unwrap_err();
    assert!(matches!(err, Error::MailboxNotFound(_)));

    let mailboxes = engine.list_mailboxes().await.unwrap();
    let names: Vec<&str> = mailboxes.iter().map(|m| m.mailbox.as_str()).collect();
    assert!(names.contains(&"INBOX"));
    assert!(names.contains(&"[Gmail]/Trash"));
}
