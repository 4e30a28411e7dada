//! Mutations and their per-server command plans.

use mailsweep_imap::{Flag, ServerProfile, StoreAction, UidSet};
use serde::{Deserialize, Serialize};

use crate::connection::Request;

/// Gmail's label for the trash folder.
const GMAIL_TRASH: &str = "\\Trash";
/// Gmail's label for the inbox.
const GMAIL_INBOX: &str = "\\Inbox";

/// A change applied to every selected message.
///
/// Every variant is idempotent: applying it to a message that already
/// carries the change leaves the message as it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "label", rename_all = "snake_case")]
pub enum Mutation {
    /// Move to trash (Gmail) or flag `\Deleted` and expunge.
    Delete,
    /// Add a label, or a keyword flag outside Gmail.
    AddLabel(String),
    /// Remove a label or keyword flag.
    RemoveLabel(String),
    /// Drop `\Inbox` (Gmail) or move to the archive mailbox.
    Archive,
}

impl Mutation {
    /// Short name for logs and status output.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::AddLabel(_) => "add-label",
            Self::RemoveLabel(_) => "remove-label",
            Self::Archive => "archive",
        }
    }
}

impl std::fmt::Display for Mutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AddLabel(label) | Self::RemoveLabel(label) => {
                write!(f, "{} {label}", self.name())
            }
            _ => f.write_str(self.name()),
        }
    }
}

/// Returns true if `mutation` leaves `\Deleted` messages that only a plain
/// `EXPUNGE` after the run can remove.
#[must_use]
pub const fn defers_expunge(mutation: &Mutation, profile: &ServerProfile) -> bool {
    if profile.gmail_labels || profile.uidplus {
        return false;
    }
    match mutation {
        Mutation::Delete => true,
        Mutation::Archive => !profile.native_move,
        Mutation::AddLabel(_) | Mutation::RemoveLabel(_) => false,
    }
}

/// Commands for one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPlan {
    /// Commands to run in order.
    pub steps: Vec<Request>,
    /// A plain `EXPUNGE` must run once after every chunk has committed.
    pub deferred_expunge: bool,
}

/// Builds the command plan for applying `mutation` to `uids`.
///
/// Without UIDPLUS the expunge of `\Deleted` messages cannot be scoped to a
/// UID set, so it is deferred until the whole run has committed.
#[must_use]
pub fn plan(mutation: &Mutation, profile: &ServerProfile, uids: &UidSet, archive_mailbox: &str) -> CommandPlan {
    let store = |action| Request::Store {
        uids: uids.clone(),
        action,
    };
    let mut deferred_expunge = false;
    let mut expunge = |steps: &mut Vec<Request>| {
        if profile.uidplus {
            steps.push(Request::UidExpunge(uids.clone()));
        } else {
            deferred_expunge = true;
        }
    };

    let steps = if profile.gmail_labels {
        match mutation {
            Mutation::Delete => vec![store(StoreAction::AddLabels(vec![GMAIL_TRASH.into()]))],
            Mutation::AddLabel(label) => vec![store(StoreAction::AddLabels(vec![label.clone()]))],
            Mutation::RemoveLabel(label) => {
                vec![store(StoreAction::RemoveLabels(vec![label.clone()]))]
            }
            Mutation::Archive => vec![store(StoreAction::RemoveLabels(vec![GMAIL_INBOX.into()]))],
        }
    } else {
        match mutation {
            Mutation::Delete => {
                let mut steps = vec![store(StoreAction::AddFlags(vec![Flag::Deleted]))];
                expunge(&mut steps);
                steps
            }
            Mutation::AddLabel(label) => vec![store(StoreAction::AddFlags(vec![Flag::parse(label)]))],
            Mutation::RemoveLabel(label) => {
                vec![store(StoreAction::RemoveFlags(vec![Flag::parse(label)]))]
            }
            Mutation::Archive if profile.native_move => vec![Request::Move {
                uids: uids.clone(),
                mailbox: archive_mailbox.to_string(),
            }],
            Mutation::Archive => {
                let mut steps = vec![
                    Request::Copy {
                        uids: uids.clone(),
                        mailbox: archive_mailbox.to_string(),
                    },
                    store(StoreAction::AddFlags(vec![Flag::Deleted])),
                ];
                expunge(&mut steps);
                steps
            }
        }
    };

    CommandPlan {
        steps,
        deferred_expunge,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use mailsweep_imap::Uid;

    use super::*;

    fn uids() -> UidSet {
        UidSet::range(Uid::new(1).unwrap(), Uid::new(500).unwrap())
    }

    fn plain(uidplus: bool, native_move: bool) -> ServerProfile {
        ServerProfile {
            uidplus,
            native_move,
            ..ServerProfile::basic()
        }
    }

    #[test]
    fn gmail_plans_are_single_label_stores() {
        let gmail = ServerProfile::gmail();
        for (mutation, expected) in [
            (Mutation::Delete, StoreAction::AddLabels(vec!["\\Trash".into()])),
            (Mutation::AddLabel("Keep".into()), StoreAction::AddLabels(vec!["Keep".into()])),
            (Mutation::RemoveLabel("Old".into()), StoreAction::RemoveLabels(vec!["Old".into()])),
            (Mutation::Archive, StoreAction::RemoveLabels(vec!["\\Inbox".into()])),
        ] {
            let plan = plan(&mutation, &gmail, &uids(), "Archive");
            assert_eq!(
                plan.steps,
                vec![Request::Store {
                    uids: uids(),
                    action: expected
                }]
            );
            assert!(!plan.deferred_expunge);
        }
    }

    #[test]
    fn delete_with_uidplus_expunges_the_chunk() {
        let plan = plan(&Mutation::Delete, &plain(true, false), &uids(), "Archive");
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[1], Request::UidExpunge(uids()));
        assert!(!plan.deferred_expunge);
    }

    #[test]
    fn delete_without_uidplus_defers_expunge() {
        let plan = plan(&Mutation::Delete, &plain(false, false), &uids(), "Archive");
        assert_eq!(
            plan.steps,
            vec![Request::Store {
                uids: uids(),
                action: StoreAction::AddFlags(vec![Flag::Deleted])
            }]
        );
        assert!(plan.deferred_expunge);
        assert!(defers_expunge(&Mutation::Delete, &plain(false, false)));
    }

    #[test]
    fn archive_prefers_move() {
        let plan = plan(&Mutation::Archive, &plain(true, true), &uids(), "Old Mail");
        assert_eq!(
            plan.steps,
            vec![Request::Move {
                uids: uids(),
                mailbox: "Old Mail".into()
            }]
        );
    }

    #[test]
    fn archive_without_move_copies_then_deletes() {
        let plan = plan(&Mutation::Archive, &plain(false, false), &uids(), "Archive");
        assert!(matches!(&plan.steps[0], Request::Copy { mailbox, .. } if mailbox == "Archive"));
        assert!(matches!(&plan.steps[1], Request::Store { .. }));
        assert_eq!(plan.steps.len(), 2);
        assert!(plan.deferred_expunge);
    }

    #[test]
    fn labels_become_keywords() {
        let plan = plan(&Mutation::AddLabel("Receipts".into()), &plain(true, true), &uids(), "Archive");
        assert_eq!(
            plan.steps,
            vec![Request::Store {
                uids: uids(),
                action: StoreAction::AddFlags(vec![Flag::Keyword("Receipts".into())])
            }]
        );
    }

    #[test]
    fn serde_shape() {
        assert_eq!(serde_json::to_string(&Mutation::Delete).unwrap(), r#"{"action":"delete"}"#);
        let json = serde_json::to_string(&Mutation::AddLabel("X".into())).unwrap();
        assert_eq!(json, r#"{"action":"add_label","label":"X"}"#);
        assert_eq!(serde_json::from_str::<Mutation>(&json).unwrap(), Mutation::AddLabel("X".into()));
    }
}
