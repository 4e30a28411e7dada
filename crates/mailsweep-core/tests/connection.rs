//! Session pool, reconnect and backoff.

#![allow(clippy::unwrap_used)]

mod common;

use std::time::Duration;

use common::{FakeServer, Fault, seed, uid};
use mailsweep_core::{ConnectionConfig, ConnectionManager, Error, Reply, Request, SessionState};
use mailsweep_imap::{SearchCriteria, StoreAction, UidSet, UidValidity};

fn manager(server: &FakeServer, pool_size: usize) -> ConnectionManager<common::FakeConnector> {
    ConnectionManager::new(
        server.connector(),
        ConnectionConfig::default().with_pool_size(pool_size),
    )
}

fn trash(n: u32) -> Request {
    Request::Store {
        uids: UidSet::single(uid(n)),
        action: StoreAction::AddLabels(vec!["\\Trash".into()]),
    }
}

#[tokio::test(start_paused = true)]
async fn connect_failures_are_retried() {
    let server = FakeServer::gmail();
    server.fail_connects(3);
    let manager = manager(&server, 1);

    let session = manager.acquire().await.unwrap();
    assert_eq!(session.state(), &SessionState::Authenticated);
    assert_eq!(server.connects(), 4);
}

#[tokio::test(start_paused = true)]
async fn retry_budget_is_bounded() {
    let server = FakeServer::gmail();
    server.fail_connects(100);
    let manager = manager(&server, 1);

    let started = tokio::time::Instant::now();
    let err = manager.acquire().await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
    assert!(err.is_transient());
    // One attempt plus five retries, waiting 1 + 2 + 4 + 8 + 16 seconds.
    assert_eq!(server.connects(), 6);
    assert_eq!(started.elapsed(), Duration::from_secs(31));
}

#[tokio::test(start_paused = true)]
async fn pool_never_exceeds_its_size() {
    let server = FakeServer::gmail();
    let manager = manager(&server, 2);

    let first = manager.acquire().await.unwrap();
    let second = manager.acquire().await.unwrap();
    let blocked = tokio::time::timeout(Duration::from_secs(5), manager.acquire()).await;
    assert!(blocked.is_err());

    let first_id = first.id();
    drop(first);
    let third = manager.acquire().await.unwrap();
    assert_eq!(third.id(), first_id);
    assert_eq!(server.connects(), 2);
    assert_eq!(server.max_live(), 2);
    drop(second);
}

#[tokio::test(start_paused = true)]
async fn idle_sessions_are_probed() {
    let server = FakeServer::gmail();
    let manager = manager(&server, 1);

    drop(manager.acquire().await.unwrap());
    drop(manager.acquire().await.unwrap());
    assert_eq!(server.count("NOOP"), 0);

    tokio::time::advance(Duration::from_secs(11 * 60)).await;
    drop(manager.acquire().await.unwrap());
    assert_eq!(server.count("NOOP"), 1);
    assert_eq!(server.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn dropped_connection_reselects_pinned_mailbox() {
    let server = FakeServer::gmail();
    seed(&server, 10);
    server.fail_store(3, 2, Fault::Drop);
    let manager = manager(&server, 1);

    let mut session = manager.acquire().await.unwrap();
    let snapshot = manager.select(&mut session, "INBOX", None).await.unwrap();
    assert_eq!(snapshot.exists, 10);

    let reply = manager.execute(&mut session, &trash(3)).await.unwrap();
    assert_eq!(reply, Reply::Done);
    assert_eq!(server.connects(), 3);
    assert_eq!(session.selected_mailbox(), Some("INBOX"));
    assert_eq!(session.pinned(), Some(("INBOX", UidValidity::new(1).unwrap())));
    assert_eq!(server.messages("[Gmail]/Trash").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn renumbering_is_detected_on_reconnect() {
    let server = FakeServer::gmail();
    seed(&server, 10);
    let manager = manager(&server, 1);

    let mut session = manager.acquire().await.unwrap();
    manager.select(&mut session, "INBOX", None).await.unwrap();
    server.bump_validity("INBOX");
    server.fail_store(1, 1, Fault::Drop);

    let err = manager.execute(&mut session, &trash(1)).await.unwrap_err();
    assert!(matches!(
        err,
        Error::StaleSnapshot { expected: 1, actual: 2, .. }
    ));
    assert_eq!(server.messages("INBOX").len(), 10);
}

#[tokio::test(start_paused = true)]
async fn refusals_are_not_retried() {
    let server = FakeServer::gmail();
    seed(&server, 10);
    server.fail_store(1, 1, Fault::Refuse);
    let manager = manager(&server, 1);

    let mut session = manager.acquire().await.unwrap();
    let err = manager.select(&mut session, "Missing", None).await.unwrap_err();
    assert!(matches!(err, Error::MailboxNotFound(_)));

    // The refused SELECT leaves the session without a mailbox, so it is
    // reopened before the next one.
    assert!(!session.is_live());
    manager.select(&mut session, "INBOX", None).await.unwrap();
    assert_eq!(server.connects(), 2);

    let err = manager.execute(&mut session, &trash(1)).await.unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
    assert_eq!(server.connects(), 2);

    let reply = manager
        .execute(&mut session, &Request::Search(SearchCriteria::All))
        .await
        .unwrap();
    assert!(matches!(reply, Reply::Uids(uids) if uids.len() == 10));
}

#[tokio::test(start_paused = true)]
async fn commands_need_a_selected_mailbox() {
    let server = FakeServer::gmail();
    let manager = manager(&server, 1);

    let mut session = manager.acquire().await.unwrap();
    let err = manager
        .execute(&mut session, &Request::Search(SearchCriteria::All))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
}

#[tokio::test(start_paused = true)]
async fn rejected_login_is_not_retried() {
    let server = FakeServer::gmail();
    server.reject_logins(1);
    let manager = manager(&server, 1);

    let err = manager.acquire().await.unwrap_err();
    assert!(matches!(err, Error::Auth(_)));
    assert!(!err.is_transient());
    assert_eq!(server.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn throttled_commands_back_off_and_retry() {
    let server = FakeServer::gmail();
    seed(&server, 10);
    server.fail_store(4, 2, Fault::Throttle);
    let manager = manager(&server, 1);

    let mut session = manager.acquire().await.unwrap();
    manager.select(&mut session, "INBOX", None).await.unwrap();

    let started = tokio::time::Instant::now();
    let reply = manager.execute(&mut session, &trash(4)).await.unwrap();
    assert_eq!(reply, Reply::Done);
    assert_eq!(started.elapsed(), Duration::from_secs(3));
    assert_eq!(server.count("UID STORE"), 3);
    assert_eq!(server.connects(), 3);
    assert_eq!(server.messages("[Gmail]/Trash").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn throttling_past_the_budget_is_a_transport_error() {
    let server = FakeServer::gmail();
    seed(&server, 10);
    server.fail_store(4, 100, Fault::Throttle);
    let manager = manager(&server, 1);

    let mut session = manager.acquire().await.unwrap();
    manager.select(&mut session, "INBOX", None).await.unwrap();

    let err = manager.execute(&mut session, &trash(4)).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Transport(mailsweep_imap::Error::No {
            code: Some(mailsweep_imap::ResponseCode::Throttled),
            ..
        })
    ));
    assert!(err.is_transient());
    assert_eq!(server.count("UID STORE"), 6);
    assert!(server.messages("[Gmail]/Trash").is_empty());
}
