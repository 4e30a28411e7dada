//! Client state types.

use crate::types::{Mailbox, MailboxStatus, UidValidity};

/// Greeting received, no credentials yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotAuthenticated;

/// Logged in, no mailbox selected.
#[derive(Debug, Clone, Copy, Default)]
pub struct Authenticated;

/// A mailbox is selected. Carries what SELECT reported.
#[derive(Debug, Clone)]
pub struct Selected {
    pub(crate) mailbox: Mailbox,
    pub(crate) status: MailboxStatus,
}

impl Selected {
    /// Creates the selected state.
    #[must_use]
    pub const fn new(mailbox: Mailbox, status: MailboxStatus) -> Self {
        Self { mailbox, status }
    }

    /// Name of the selected mailbox.
    #[must_use]
    pub const fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// Status reported by SELECT/EXAMINE.
    #[must_use]
    pub const fn status(&self) -> &MailboxStatus {
        &self.status
    }

    /// The mailbox's UIDVALIDITY, if the server sent one.
    #[must_use]
    pub const fn uid_validity(&self) -> Option<UidValidity> {
        self.status.uid_validity
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn states_are_send_sync() {
        assert_send_sync::<NotAuthenticated>();
        assert_send_sync::<Authenticated>();
        assert_send_sync::<Selected>();
    }

    #[test]
    fn selected_accessors() {
        let status = MailboxStatus {
            exists: 100,
            uid_validity: UidValidity::new(12345),
            ..Default::default()
        };
        let selected = Selected::new(Mailbox::inbox(), status);

        assert_eq!(selected.mailbox().as_str(), "INBOX");
        assert_eq!(selected.status().exists, 100);
        assert_eq!(selected.uid_validity().unwrap().get(), 12345);
    }
}
