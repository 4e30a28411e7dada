//! In-process IMAP server model for engine tests.
//!
//! Messages, mailboxes and UIDVALIDITY live behind one lock shared by every
//! connection, so tests can inject faults and inspect the final state.

#![allow(dead_code, clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use mailsweep_core::{Connection, Connector, MailboxSnapshot, Reply, Request};
use mailsweep_imap::parser::Address;
use mailsweep_imap::{
    Envelope, FetchItem, Flag, Flags, ListResponse, Mailbox, ResponseCode, ServerProfile,
    StoreAction, Uid, UidSet, UidValidity,
};
use tokio_util::sync::CancellationToken;

/// How an injected fault shows up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The connection resets.
    Drop,
    /// The server answers `NO`.
    Refuse,
    /// The server answers `NO [THROTTLED]`.
    Throttle,
}

#[derive(Debug, Clone)]
pub struct FakeMessage {
    pub uid: u32,
    pub labels: BTreeSet<String>,
    pub flags: Flags,
    pub date: String,
    pub size: u32,
    pub from: String,
    pub subject: String,
    pub list_id: Option<String>,
}

impl FakeMessage {
    pub fn new(subject: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            uid: 0,
            labels: BTreeSet::new(),
            flags: Flags::new(),
            date: "01-Jan-2020 00:00:00 +0000".to_string(),
            size: 2048,
            from: from.into(),
            subject: subject.into(),
            list_id: None,
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.labels.insert(label.to_string());
        self
    }

    pub fn with_date(mut self, date: &str) -> Self {
        self.date = date.to_string();
        self
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    pub fn with_list_id(mut self, id: &str) -> Self {
        self.list_id = Some(id.to_string());
        self
    }

    fn fetch_items(&self, gmail: bool) -> Vec<FetchItem> {
        let (local, host) = self.from.split_once('@').unwrap_or((&self.from, "localhost"));
        let envelope = Envelope {
            subject: Some(self.subject.clone()),
            from: vec![Address {
                name: None,
                adl: None,
                mailbox: Some(local.to_string()),
                host: Some(host.to_string()),
            }],
            ..Envelope::default()
        };
        let header = match &self.list_id {
            Some(id) => format!("List-Id: {id}\r\n\r\n"),
            None => "\r\n".to_string(),
        };
        let mut items = vec![
            FetchItem::Uid(Uid::new(self.uid).unwrap()),
            FetchItem::Flags(self.flags.clone()),
            FetchItem::InternalDate(self.date.clone()),
            FetchItem::Rfc822Size(self.size),
            FetchItem::Envelope(Box::new(envelope)),
            FetchItem::Body {
                section: Some("HEADER.FIELDS (LIST-ID)".to_string()),
                data: Some(header.into_bytes()),
            },
        ];
        if gmail {
            items.push(FetchItem::GmailLabels(self.labels.iter().cloned().collect()));
        }
        items
    }
}

#[derive(Debug)]
struct FakeMailbox {
    validity: u32,
    uid_next: u32,
    messages: BTreeMap<u32, FakeMessage>,
}

impl FakeMailbox {
    fn new(validity: u32) -> Self {
        Self {
            validity,
            uid_next: 1,
            messages: BTreeMap::new(),
        }
    }

    fn append(&mut self, mut message: FakeMessage) {
        message.uid = self.uid_next;
        self.uid_next += 1;
        self.messages.insert(message.uid, message);
    }
}

#[derive(Debug)]
struct StoreFault {
    uid: u32,
    remaining: u32,
    fault: Fault,
}

#[derive(Debug, Default)]
struct State {
    profile: ServerProfile,
    mailboxes: BTreeMap<String, FakeMailbox>,
    store_faults: Vec<StoreFault>,
    connect_failures: u32,
    login_rejections: u32,
    cancel_after: Option<(usize, CancellationToken)>,
    stores: usize,
    commands: HashMap<&'static str, usize>,
    connects: usize,
    live: usize,
    max_live: usize,
}

/// Shared handle to the server model.
#[derive(Clone, Default)]
pub struct FakeServer {
    state: Arc<Mutex<State>>,
}

impl FakeServer {
    pub fn new(profile: ServerProfile) -> Self {
        let server = Self::default();
        {
            let mut state = server.lock();
            state.profile = profile;
            state.mailboxes.insert("INBOX".into(), FakeMailbox::new(1));
        }
        server
    }

    pub fn gmail() -> Self {
        let server = Self::new(ServerProfile::gmail());
        server.create_mailbox("[Gmail]/Trash");
        server
    }

    pub fn basic() -> Self {
        Self::new(ServerProfile::basic())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn create_mailbox(&self, name: &str) {
        self.lock()
            .mailboxes
            .entry(name.to_string())
            .or_insert_with(|| FakeMailbox::new(1));
    }

    pub fn populate(&self, mailbox: &str, count: u32, make: impl Fn(u32) -> FakeMessage) {
        let mut state = self.lock();
        let target = state
            .mailboxes
            .entry(mailbox.to_string())
            .or_insert_with(|| FakeMailbox::new(1));
        for n in 1..=count {
            target.append(make(n));
        }
    }

    pub fn connector(&self) -> FakeConnector {
        FakeConnector {
            state: Arc::clone(&self.state),
        }
    }

    /// The next `times` STOREs touching `uid` fail with `fault`.
    pub fn fail_store(&self, uid: u32, times: u32, fault: Fault) {
        self.lock().store_faults.push(StoreFault {
            uid,
            remaining: times,
            fault,
        });
    }

    pub fn clear_faults(&self) {
        self.lock().store_faults.clear();
    }

    pub fn fail_connects(&self, times: u32) {
        self.lock().connect_failures = times;
    }

    /// The next `times` logins are rejected as bad credentials.
    pub fn reject_logins(&self, times: u32) {
        self.lock().login_rejections = times;
    }

    /// Cancels `token` once `stores` STOREs have succeeded.
    pub fn cancel_after_stores(&self, stores: usize, token: CancellationToken) {
        self.lock().cancel_after = Some((stores, token));
    }

    pub fn bump_validity(&self, mailbox: &str) {
        let mut state = self.lock();
        let target = state.mailboxes.get_mut(mailbox).unwrap();
        target.validity += 1;
    }

    pub fn count(&self, command: &str) -> usize {
        self.lock().commands.get(command).copied().unwrap_or(0)
    }

    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    pub fn max_live(&self) -> usize {
        self.lock().max_live
    }

    pub fn messages(&self, mailbox: &str) -> Vec<FakeMessage> {
        self.lock()
            .mailboxes
            .get(mailbox)
            .map(|m| m.messages.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Mailbox contents without UIDs: (subject, labels, flags), sorted.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<(String, Vec<String>, Vec<String>)>> {
        self.lock()
            .mailboxes
            .iter()
            .map(|(name, mailbox)| {
                let mut contents: Vec<_> = mailbox
                    .messages
                    .values()
                    .map(|m| {
                        let mut flags: Vec<String> =
                            m.flags.iter().map(|f| f.as_str().to_string()).collect();
                        flags.sort();
                        (m.subject.clone(), m.labels.iter().cloned().collect(), flags)
                    })
                    .collect();
                contents.sort();
                (name.clone(), contents)
            })
            .collect()
    }
}

pub struct FakeConnector {
    state: Arc<Mutex<State>>,
}

impl Connector for FakeConnector {
    type Conn = FakeConnection;

    async fn connect(&self) -> mailsweep_imap::Result<FakeConnection> {
        let mut state = self.state.lock().unwrap();
        state.connects += 1;
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(reset("connection refused"));
        }
        if state.login_rejections > 0 {
            state.login_rejections -= 1;
            return Err(mailsweep_imap::Error::Auth(
                "[AUTHENTICATIONFAILED] invalid credentials".into(),
            ));
        }
        state.live += 1;
        state.max_live = state.max_live.max(state.live);
        Ok(FakeConnection {
            state: Arc::clone(&self.state),
            profile: state.profile,
            selected: None,
            dead: false,
        })
    }
}

pub struct FakeConnection {
    state: Arc<Mutex<State>>,
    profile: ServerProfile,
    selected: Option<String>,
    dead: bool,
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.live -= 1;
        }
    }
}

fn reset(text: &str) -> mailsweep_imap::Error {
    mailsweep_imap::Error::Io(std::io::Error::new(
        std::io::ErrorKind::ConnectionReset,
        text.to_string(),
    ))
}

fn refuse(text: &str) -> mailsweep_imap::Error {
    mailsweep_imap::Error::No {
        code: None,
        text: text.to_string(),
    }
}

impl Connection for FakeConnection {
    fn profile(&self) -> ServerProfile {
        self.profile
    }

    async fn select(&mut self, mailbox: &str) -> mailsweep_imap::Result<MailboxSnapshot> {
        if self.dead {
            return Err(reset("connection closed"));
        }
        let state = self.state.lock().unwrap();
        let Some(target) = state.mailboxes.get(mailbox) else {
            return Err(refuse("no such mailbox"));
        };
        let snapshot = MailboxSnapshot {
            validity: UidValidity::new(target.validity).unwrap(),
            exists: u32::try_from(target.messages.len()).unwrap(),
            uid_next: Uid::new(target.uid_next),
        };
        drop(state);
        self.selected = Some(mailbox.to_string());
        Ok(snapshot)
    }

    async fn execute(&mut self, request: &Request) -> mailsweep_imap::Result<Reply> {
        if self.dead {
            return Err(reset("connection closed"));
        }
        let mut state = self.state.lock().unwrap();
        *state.commands.entry(request.name()).or_default() += 1;

        if let Request::List { .. } = request {
            let mailboxes = state
                .mailboxes
                .keys()
                .map(|name| ListResponse {
                    attributes: Vec::new(),
                    delimiter: Some('/'),
                    mailbox: Mailbox::new(name.as_str()),
                })
                .collect();
            return Ok(Reply::Mailboxes(mailboxes));
        }

        let Some(selected) = self.selected.clone() else {
            return Err(mailsweep_imap::Error::Bad("no mailbox selected".into()));
        };
        let result = apply(&mut state, &selected, request);
        if matches!(&result, Err(mailsweep_imap::Error::Io(_))) {
            self.dead = true;
        }
        result
    }

    async fn noop(&mut self) -> mailsweep_imap::Result<()> {
        if self.dead {
            return Err(reset("connection closed"));
        }
        *self.state.lock().unwrap().commands.entry("NOOP").or_default() += 1;
        Ok(())
    }

    async fn logout(self) -> mailsweep_imap::Result<()> {
        Ok(())
    }
}

fn apply(state: &mut State, selected: &str, request: &Request) -> mailsweep_imap::Result<Reply> {
    let gmail = state.profile.gmail_labels;
    match request {
        Request::Search(_) => {
            let mailbox = &state.mailboxes[selected];
            let uids = mailbox.messages.keys().filter_map(|&n| Uid::new(n)).collect();
            Ok(Reply::Uids(uids))
        }
        Request::Fetch { uids, .. } => {
            let mailbox = &state.mailboxes[selected];
            let messages = in_set(mailbox, uids)
                .map(|m| m.fetch_items(gmail))
                .collect();
            Ok(Reply::Messages(messages))
        }
        Request::Store { uids, action } => {
            if let Some(fault) = state
                .store_faults
                .iter_mut()
                .find(|f| f.remaining > 0 && Uid::new(f.uid).is_some_and(|u| uids.contains(u)))
            {
                fault.remaining -= 1;
                return Err(match fault.fault {
                    Fault::Drop => reset("connection reset by peer"),
                    Fault::Refuse => refuse("permission denied"),
                    Fault::Throttle => mailsweep_imap::Error::No {
                        code: Some(ResponseCode::Throttled),
                        text: "too many commands, slow down".into(),
                    },
                });
            }
            store(state, selected, uids, action);
            state.stores += 1;
            if let Some((after, token)) = &state.cancel_after
                && state.stores >= *after
            {
                token.cancel();
            }
            Ok(Reply::Done)
        }
        Request::Copy { uids, mailbox } | Request::Move { uids, mailbox } => {
            if !state.mailboxes.contains_key(mailbox) {
                return Err(refuse("[TRYCREATE] no such mailbox"));
            }
            let copies: Vec<FakeMessage> = in_set(&state.mailboxes[selected], uids)
                .cloned()
                .collect();
            let target = state.mailboxes.get_mut(mailbox).unwrap();
            for message in copies {
                target.append(message);
            }
            if matches!(request, Request::Move { .. }) {
                let source = state.mailboxes.get_mut(selected).unwrap();
                source
                    .messages
                    .retain(|&uid, _| !Uid::new(uid).is_some_and(|u| uids.contains(u)));
            }
            Ok(Reply::Done)
        }
        Request::UidExpunge(uids) => {
            let source = state.mailboxes.get_mut(selected).unwrap();
            source.messages.retain(|&uid, m| {
                !(m.flags.is_deleted() && Uid::new(uid).is_some_and(|u| uids.contains(u)))
            });
            Ok(Reply::Done)
        }
        Request::Expunge => {
            let source = state.mailboxes.get_mut(selected).unwrap();
            source.messages.retain(|_, m| !m.flags.is_deleted());
            Ok(Reply::Done)
        }
        Request::List { .. } => unreachable!(),
    }
}

fn in_set<'a>(mailbox: &'a FakeMailbox, uids: &'a UidSet) -> impl Iterator<Item = &'a FakeMessage> {
    mailbox
        .messages
        .values()
        .filter(move |m| Uid::new(m.uid).is_some_and(|u| uids.contains(u)))
}

fn store(state: &mut State, selected: &str, uids: &UidSet, action: &StoreAction) {
    let mut trashed = Vec::new();
    let mut archived = Vec::new();
    let source = state.mailboxes.get_mut(selected).unwrap();
    for message in source.messages.values_mut() {
        if !Uid::new(message.uid).is_some_and(|u| uids.contains(u)) {
            continue;
        }
        match action {
            StoreAction::AddFlags(flags) => flags.iter().for_each(|f| message.flags.insert(f.clone())),
            StoreAction::RemoveFlags(flags) => flags.iter().for_each(|f| message.flags.remove(f)),
            StoreAction::AddLabels(labels) => {
                for label in labels {
                    if label == "\\Trash" {
                        trashed.push(message.uid);
                    } else {
                        message.labels.insert(label.clone());
                    }
                }
            }
            StoreAction::RemoveLabels(labels) => {
                for label in labels {
                    message.labels.remove(label);
                    if label == "\\Inbox" && selected == "INBOX" {
                        archived.push(message.uid);
                    }
                }
            }
        }
    }

    for (uids, destination) in [(trashed, "[Gmail]/Trash"), (archived, "[Gmail]/All Mail")] {
        let moved: Vec<FakeMessage> = uids
            .iter()
            .filter_map(|uid| state.mailboxes.get_mut(selected).unwrap().messages.remove(uid))
            .collect();
        if moved.is_empty() {
            continue;
        }
        let target = state
            .mailboxes
            .entry(destination.to_string())
            .or_insert_with(|| FakeMailbox::new(1));
        for message in moved {
            target.append(message);
        }
    }
}

/// `count` messages `Message n` from `sender n`, all labelled `Old` and
/// carrying `\Inbox` on Gmail.
pub fn seed(server: &FakeServer, count: u32) {
    server.populate("INBOX", count, |n| {
        FakeMessage::new(format!("Message {n}"), format!("sender{}@example.com", n % 7))
            .with_label("Old")
            .with_label("\\Inbox")
    });
}

pub fn uid(n: u32) -> Uid {
    Uid::new(n).unwrap()
}

pub fn flag(name: &str) -> Flag {
    Flag::parse(name)
}
