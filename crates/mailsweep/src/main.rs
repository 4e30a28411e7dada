//! `mailsweep`: bulk delete, archive and relabel for very large IMAP mailboxes.
//!
//! Exit status: 0 when the run completed (or was a dry run), 1 when it
//! stopped with a resumable checkpoint, 2 on configuration or
//! authentication errors.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cli;
mod commands;
mod config;
mod credentials;

use std::process::ExitCode;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command};
use commands::Outcome;
use config::AppConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "mailsweep=debug,mailsweep_core=debug,mailsweep_imap=debug"
    } else {
        "mailsweep=info,mailsweep_core=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match dispatch(cli).await {
        Ok(outcome) => outcome.into(),
        Err(err) => {
            if let Some(mailsweep_core::Error::Aborted { run_id, .. }) =
                err.downcast_ref::<mailsweep_core::Error>()
            {
                eprintln!("error: {err:#}");
                eprintln!("Resume with: mailsweep resume {run_id}");
                return Outcome::Aborted.into();
            }
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<Outcome> {
    let path = match cli.config {
        Some(path) => path,
        None => config::default_path()?,
    };
    debug!(path = %path.display(), "loading configuration");
    let config = AppConfig::load(&path)?;

    match cli.command {
        Command::Run(args) => {
            let selection = args.selection();
            let mutation = args.mutation();
            commands::run(&config, selection, mutation, &args.control, cli.json).await
        }
        Command::DeleteFolder { mailbox, control } => {
            let selection = mailsweep_core::Selection::new(mailbox).with(mailsweep_core::Term::All);
            commands::run(
                &config,
                selection,
                mailsweep_core::Mutation::Delete,
                &control,
                cli.json,
            )
            .await
        }
        Command::Resume { run_id } => commands::resume(&config, &run_id, cli.json).await,
        Command::Status { run_id } => commands::status(&config, run_id.as_deref()).await,
        Command::Discard { run_id } => commands::discard(&config, &run_id).await,
        Command::Folders => commands::folders(&config).await,
        Command::SetPassword => commands::set_password(&config).await,
    }
}
