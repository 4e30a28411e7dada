//! Command-line interface.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use mailsweep_core::{Mutation, Selection, Term};

#[derive(Parser, Debug)]
#[command(name = "mailsweep", version, about = "Bulk delete, archive and relabel for large IMAP mailboxes")]
pub struct Cli {
    /// Configuration file [default: <config dir>/mailsweep/config.toml]
    #[arg(short, long, env = "MAILSWEEP_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print run results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Select messages and apply an action to them
    Run(RunArgs),

    /// Continue an interrupted run
    Resume {
        /// Run id printed when the run stopped
        run_id: String,
    },

    /// Show one run, or list stored runs
    Status {
        /// Run id
        run_id: Option<String>,
    },

    /// Forget a stored run
    Discard {
        /// Run id
        run_id: String,
    },

    /// List mailboxes
    Folders,

    /// Delete every message in a mailbox
    DeleteFolder {
        /// Mailbox name
        mailbox: String,

        #[command(flatten)]
        control: RunControl,
    },

    /// Store the account password in the system keyring (read from stdin)
    SetPassword,
}

/// Flags shared by every mutating command.
#[derive(Args, Debug, Clone, Default)]
pub struct RunControl {
    /// Show what would be done without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the preview and confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Messages per chunk
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Concurrent sessions
    #[arg(long)]
    pub concurrency: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Mailbox to search
    #[arg(short, long, default_value = "INBOX")]
    pub mailbox: String,

    /// Match messages carrying this label
    #[arg(long)]
    pub label: Option<String>,

    /// Match messages older than this many days
    #[arg(long = "older-than-days", value_name = "DAYS", value_parser = parse_age)]
    pub older_than: Option<DateTime<Utc>>,

    /// Match sender by substring, or glob with * and ?
    #[arg(long = "from", value_name = "PATTERN")]
    pub sender: Option<String>,

    /// Match List-Id by substring, or glob with * and ?
    #[arg(long, value_name = "PATTERN")]
    pub list_id: Option<String>,

    /// Match messages of at least this size (e.g. 10M)
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub larger_than: Option<u64>,

    /// Match messages smaller than this size (e.g. 4K)
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub smaller_than: Option<u64>,

    /// Match every message in the mailbox
    #[arg(long)]
    pub all: bool,

    /// What to do with matching messages
    #[arg(long, value_enum)]
    pub action: Action,

    /// Label for add-label and remove-label
    #[arg(long, required_if_eq_any = [("action", "add-label"), ("action", "remove-label")])]
    pub target_label: Option<String>,

    #[command(flatten)]
    pub control: RunControl,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Move to trash, or flag deleted and expunge
    Delete,
    /// Remove from the inbox, or move to the archive mailbox
    Archive,
    /// Add --target-label
    AddLabel,
    /// Remove --target-label
    RemoveLabel,
}

impl RunArgs {
    /// Builds the selection from the flags.
    #[must_use]
    pub fn selection(&self) -> Selection {
        let mut selection = Selection::new(&self.mailbox);
        if self.all {
            selection = selection.with(Term::All);
        }
        if let Some(label) = &self.label {
            selection = selection.with(Term::Label(label.clone()));
        }
        if let Some(cutoff) = self.older_than {
            selection = selection.with(Term::OlderThan(cutoff));
        }
        if let Some(sender) = &self.sender {
            selection = selection.with(Term::Sender(sender.clone()));
        }
        if let Some(list_id) = &self.list_id {
            selection = selection.with(Term::ListId(list_id.clone()));
        }
        if let Some(size) = self.larger_than {
            selection = selection.with(Term::LargerThan(size));
        }
        if let Some(size) = self.smaller_than {
            selection = selection.with(Term::SmallerThan(size));
        }
        selection
    }

    /// Builds the mutation from the flags.
    #[must_use]
    pub fn mutation(&self) -> Mutation {
        let label = || self.target_label.clone().unwrap_or_default();
        match self.action {
            Action::Delete => Mutation::Delete,
            Action::Archive => Mutation::Archive,
            Action::AddLabel => Mutation::AddLabel(label()),
            Action::RemoveLabel => Mutation::RemoveLabel(label()),
        }
    }
}

/// Parses a day count into the cutoff that many days before now.
fn parse_age(s: &str) -> Result<DateTime<Utc>, String> {
    let days: u32 = s
        .trim()
        .parse()
        .map_err(|_| format!("invalid day count {s:?}"))?;
    Duration::try_days(i64::from(days))
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .ok_or_else(|| format!("{days} days reaches before the earliest representable date"))
}

/// Parses a byte count with an optional K, M or G suffix (powers of 1024).
fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let (digits, shift) = match s.chars().last().map(|c| c.to_ascii_uppercase()) {
        Some('K') => (&s[..s.len() - 1], 10),
        Some('M') => (&s[..s.len() - 1], 20),
        Some('G') => (&s[..s.len() - 1], 30),
        _ => (s, 0),
    };
    let value: u64 = digits
        .trim()
        .parse()
        .map_err(|_| format!("invalid size {s:?}"))?;
    value
        .checked_mul(1 << shift)
        .ok_or_else(|| format!("size {s:?} is too large"))
}
