//! Session pool with reconnect and backoff.

use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use mailsweep_imap::UidValidity;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, info, warn};

use super::session::{Session, SessionState};
use super::{Connection, Connector, MailboxSnapshot, Reply, Request};
use crate::config::ConnectionConfig;
use crate::{Error, Result};

/// How a protocol failure is handled.
enum Failure {
    /// Drop the connection, back off, try again.
    Transient(mailsweep_imap::Error),
    /// Surface to the caller untouched.
    Fatal(Error),
}

/// What was being attempted, for mapping a NO completion.
#[derive(Clone, Copy)]
enum Step<'a> {
    Connect,
    Select(&'a str),
    Command,
}

fn classify(err: mailsweep_imap::Error, step: Step<'_>) -> Failure {
    use mailsweep_imap::Error as Imap;

    if err.is_connection_lost() || err.is_throttled() {
        return Failure::Transient(err);
    }
    let fatal = match err {
        Imap::Auth(text) => Error::Auth(text),
        Imap::No { text, .. } if matches!(step, Step::Connect) => Error::Auth(text),
        Imap::No { text, .. } => match step {
            Step::Select(mailbox) => Error::MailboxNotFound(format!("{mailbox}: {text}")),
            _ => Error::Protocol(format!("command refused: {text}")),
        },
        Imap::InvalidDnsName(e) => Error::Config(format!("invalid host name: {e}")),
        other => Error::Protocol(other.to_string()),
    };
    Failure::Fatal(fatal)
}

/// Owns at most `pool_size` sessions and lends them out one worker at a time.
pub struct ConnectionManager<C: Connector> {
    connector: C,
    config: ConnectionConfig,
    permits: Semaphore,
    parked: Mutex<Vec<Session<C::Conn>>>,
    next_id: AtomicU64,
}

impl<C: Connector> ConnectionManager<C> {
    /// Creates a manager. No connection is opened until one is needed.
    #[must_use]
    pub fn new(connector: C, config: ConnectionConfig) -> Self {
        let pool_size = config.pool_size.max(1);
        Self {
            connector,
            permits: Semaphore::new(pool_size),
            config,
            parked: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Pool and retry configuration.
    #[must_use]
    pub const fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// The underlying connector.
    #[must_use]
    pub const fn connector(&self) -> &C {
        &self.connector
    }

    /// Borrows a live session, waiting while `pool_size` are lent out.
    ///
    /// A parked session idle past `idle_timeout` is probed with NOOP and
    /// reopened if the probe fails.
    pub async fn acquire(&self) -> Result<PooledSession<'_, C>> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::Config("connection pool closed".into()))?;

        let parked = self
            .parked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        let mut session = match parked {
            Some(session) => session,
            None => Session::new(self.next_id.fetch_add(1, Ordering::Relaxed)),
        };

        if session.is_live() && session.idle_for() > self.config.idle_timeout {
            debug!(session = session.id(), idle = ?session.idle_for(), "probing idle session");
            let probe = match session.conn.as_mut() {
                Some(conn) => self.timed(conn.noop()).await,
                None => Ok(()),
            };
            match probe {
                Ok(()) => session.touch(),
                Err(err) => {
                    debug!(session = session.id(), error = %err, "idle probe failed");
                    session.fault();
                }
            }
        }

        if !session.is_live() {
            self.open(&mut session).await?;
        }

        Ok(PooledSession {
            session: Some(session),
            manager: self,
            _permit: permit,
        })
    }

    /// Connects and authenticates `session`, retrying transient failures.
    ///
    /// If the session was pinned to a mailbox, that mailbox is reselected and
    /// its UIDVALIDITY compared with the pinned one.
    pub async fn open(&self, session: &mut Session<C::Conn>) -> Result<()> {
        let mut backoff = self.config.retry.backoff();
        loop {
            match self.reconnect(session).await {
                Ok(()) => return Ok(()),
                Err(Failure::Fatal(err)) => return Err(err),
                Err(Failure::Transient(err)) => {
                    session.fault();
                    self.wait(&mut backoff, session, "connect", err).await?;
                }
            }
        }
    }

    /// Selects `mailbox` and pins the session to it.
    ///
    /// With `expected` set, a different UIDVALIDITY fails with
    /// [`Error::StaleSnapshot`].
    pub async fn select(
        &self,
        session: &mut Session<C::Conn>,
        mailbox: &str,
        expected: Option<UidValidity>,
    ) -> Result<MailboxSnapshot> {
        if session.pinned().is_some_and(|(pinned, _)| pinned != mailbox) {
            session.pinned = None;
        }
        let mut backoff = self.config.retry.backoff();
        loop {
            let attempt = async {
                if !session.is_live() {
                    self.reconnect(session).await?;
                }
                self.select_once(session, mailbox).await
            };
            match attempt.await {
                Ok(snapshot) => {
                    if let Some(expected) = expected {
                        check_validity(mailbox, expected, snapshot.validity)?;
                    }
                    session.pinned = Some((mailbox.to_string(), snapshot.validity));
                    return Ok(snapshot);
                }
                Err(Failure::Fatal(err)) => return Err(err),
                Err(Failure::Transient(err)) => {
                    session.fault();
                    self.wait(&mut backoff, session, "select", err).await?;
                }
            }
        }
    }

    /// Makes sure `session` has `mailbox` selected under `validity`.
    pub async fn ensure_selected(
        &self,
        session: &mut Session<C::Conn>,
        mailbox: &str,
        validity: UidValidity,
    ) -> Result<()> {
        if session.selected_mailbox() == Some(mailbox)
            && session.pinned().is_some_and(|(_, v)| v == validity)
        {
            return Ok(());
        }
        self.select(session, mailbox, Some(validity)).await.map(|_| ())
    }

    /// Runs one command, reconnecting and retrying transient failures.
    pub async fn execute(&self, session: &mut Session<C::Conn>, request: &Request) -> Result<Reply> {
        let mut backoff = self.config.retry.backoff();
        loop {
            let attempt = async {
                if !session.is_live() {
                    self.reconnect(session).await?;
                }
                if request.needs_mailbox() && session.selected_mailbox().is_none() {
                    return Err(Failure::Fatal(Error::Protocol(format!(
                        "{} needs a selected mailbox",
                        request.name()
                    ))));
                }
                let conn = session
                    .conn
                    .as_mut()
                    .ok_or_else(|| Failure::Fatal(Error::Protocol("session not connected".into())))?;
                self.timed(conn.execute(request))
                    .await
                    .map_err(|err| classify(err, Step::Command))
            };
            match attempt.await {
                Ok(reply) => {
                    session.touch();
                    return Ok(reply);
                }
                Err(Failure::Fatal(err)) => return Err(err),
                Err(Failure::Transient(err)) => {
                    session.fault();
                    self.wait(&mut backoff, session, request.name(), err).await?;
                }
            }
        }
    }

    /// Logs out every parked session.
    pub async fn shutdown(&self) {
        let parked: Vec<_> = std::mem::take(
            &mut *self.parked.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for mut session in parked {
            if let Some(conn) = session.conn.take() {
                if let Err(err) = self.timed(conn.logout()).await {
                    debug!(session = session.id(), error = %err, "logout failed");
                }
            }
        }
    }

    /// One connect attempt plus reselect of the pinned mailbox.
    async fn reconnect(&self, session: &mut Session<C::Conn>) -> std::result::Result<(), Failure> {
        session.state = SessionState::Connecting;
        let conn = self
            .timed(self.connector.connect())
            .await
            .map_err(|err| classify(err, Step::Connect))?;
        session.profile = conn.profile();
        session.conn = Some(conn);
        session.state = SessionState::Authenticated;
        session.touch();
        info!(session = session.id(), "session opened");

        if let Some((mailbox, pinned)) = session.pinned.clone() {
            let snapshot = self.select_once(session, &mailbox).await?;
            check_validity(&mailbox, pinned, snapshot.validity).map_err(Failure::Fatal)?;
        }
        Ok(())
    }

    async fn select_once(
        &self,
        session: &mut Session<C::Conn>,
        mailbox: &str,
    ) -> std::result::Result<MailboxSnapshot, Failure> {
        let conn = session
            .conn
            .as_mut()
            .ok_or_else(|| Failure::Fatal(Error::Protocol("session not connected".into())))?;
        let snapshot = match self.timed(conn.select(mailbox)).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                // A failed SELECT consumes the client.
                session.fault();
                return Err(classify(err, Step::Select(mailbox)));
            }
        };
        session.state = SessionState::Selected(mailbox.to_string());
        session.touch();
        debug!(
            session = session.id(),
            mailbox,
            validity = snapshot.validity.get(),
            exists = snapshot.exists,
            "mailbox selected"
        );
        Ok(snapshot)
    }

    /// Sleeps for the next backoff delay, or gives up with `Transport`.
    async fn wait(
        &self,
        backoff: &mut crate::config::Backoff,
        session: &Session<C::Conn>,
        what: &str,
        err: mailsweep_imap::Error,
    ) -> Result<()> {
        let Some(delay) = backoff.next_delay() else {
            warn!(session = session.id(), what, error = %err, "retry budget exhausted");
            return Err(Error::Transport(err));
        };
        warn!(
            session = session.id(),
            what,
            error = %err,
            retry = backoff.retries(),
            delay = ?delay,
            "transient failure, reconnecting"
        );
        tokio::time::sleep(delay).await;
        Ok(())
    }

    async fn timed<T>(
        &self,
        fut: impl Future<Output = mailsweep_imap::Result<T>>,
    ) -> mailsweep_imap::Result<T> {
        let limit = self.config.command_timeout;
        tokio::time::timeout(limit, fut)
            .await
            .unwrap_or(Err(mailsweep_imap::Error::Timeout(limit)))
    }

    fn park(&self, session: Session<C::Conn>) {
        if session.is_live() {
            self.parked
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(session);
        } else {
            debug!(session = session.id(), "dropping unhealthy session");
        }
    }
}

fn check_validity(mailbox: &str, expected: UidValidity, actual: UidValidity) -> Result<()> {
    if expected == actual {
        return Ok(());
    }
    Err(Error::StaleSnapshot {
        mailbox: mailbox.to_string(),
        expected: expected.get(),
        actual: actual.get(),
    })
}

/// A session on loan from the pool. Returned on drop if still healthy.
pub struct PooledSession<'a, C: Connector> {
    session: Option<Session<C::Conn>>,
    manager: &'a ConnectionManager<C>,
    _permit: SemaphorePermit<'a>,
}

impl<C: Connector> Deref for PooledSession<'_, C> {
    type Target = Session<C::Conn>;

    fn deref(&self) -> &Self::Target {
        // Only `Drop` takes the session out.
        self.session.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl<C: Connector> DerefMut for PooledSession<'_, C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<C: Connector> std::fmt::Debug for PooledSession<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledSession")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl<C: Connector> Drop for PooledSession<'_, C> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.manager.park(session);
        }
    }
}
