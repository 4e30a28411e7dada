//! Configuration file.
//!
//! ```toml
//! [account]
//! host = "imap.gmail.com"
//! username = "me@gmail.com"
//! password_env = "MAILSWEEP_PASSWORD"
//!
//! [engine]
//! chunk_size = 500
//! concurrency = 2
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use mailsweep_core::{ConnectionConfig, EngineConfig, RetryPolicy};
use mailsweep_imap::connection::Security;
use serde::Deserialize;

/// Errors loading the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// File is not valid TOML for this schema.
    #[error("invalid config {path}: {source}")]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },

    /// No platform directory to fall back to.
    #[error("no {0} directory on this platform; pass the path explicitly")]
    NoDirectory(&'static str),
}

/// Whole configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Account to connect to.
    pub account: AccountConfig,
    /// Engine tuning.
    #[serde(default)]
    pub engine: EngineSection,
}

/// `[account]`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    /// IMAP server host.
    pub host: String,
    /// Port; 993 with TLS, 143 without.
    pub port: Option<u16>,
    /// Implicit TLS.
    #[serde(default = "default_tls")]
    pub tls: bool,
    /// Login name.
    pub username: String,
    /// Password in clear; prefer `password_env` or the keyring.
    pub password: Option<String>,
    /// Environment variable holding the password.
    pub password_env: Option<String>,
    /// Environment variable holding an OAuth2 access token.
    pub oauth_token_env: Option<String>,
}

const fn default_tls() -> bool {
    true
}

/// `[engine]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSection {
    /// UIDs per mutation chunk.
    pub chunk_size: usize,
    /// UIDs per metadata FETCH.
    pub fetch_batch_size: usize,
    /// Concurrent sessions.
    pub concurrency: usize,
    /// Retries for transient failures.
    pub max_retries: u32,
    /// First backoff delay.
    pub base_delay_secs: u64,
    /// Backoff cap.
    pub max_delay_secs: u64,
    /// Per-command deadline.
    pub command_timeout_secs: u64,
    /// Idle time before a parked session is probed.
    pub idle_timeout_secs: u64,
    /// Failed chunks at or above this count are not retried on resume.
    pub max_chunk_failures: u32,
    /// Archive destination outside Gmail.
    pub archive_mailbox: String,
    /// Keep completed runs.
    pub retain_completed: bool,
    /// Candidates previewed from each end.
    pub preview_size: usize,
    /// Checkpoint database; defaults under the data directory.
    pub checkpoint_db: Option<PathBuf>,
}

impl Default for EngineSection {
    fn default() -> Self {
        let engine = EngineConfig::default();
        let connection = ConnectionConfig::default();
        Self {
            chunk_size: engine.chunk_size,
            fetch_batch_size: engine.fetch_batch_size,
            concurrency: connection.pool_size,
            max_retries: connection.retry.max_retries,
            base_delay_secs: connection.retry.base_delay.as_secs(),
            max_delay_secs: connection.retry.max_delay.as_secs(),
            command_timeout_secs: connection.command_timeout.as_secs(),
            idle_timeout_secs: connection.idle_timeout.as_secs(),
            max_chunk_failures: engine.max_chunk_failures,
            archive_mailbox: engine.archive_mailbox,
            retain_completed: engine.retain_completed,
            preview_size: engine.preview_size,
            checkpoint_db: None,
        }
    }
}

impl AppConfig {
    /// Loads the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parses TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text does not match the schema.
    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Network settings for the protocol client.
    #[must_use]
    pub fn imap(&self) -> mailsweep_imap::Config {
        let security = if self.account.tls {
            Security::Implicit
        } else {
            Security::None
        };
        let mut builder = mailsweep_imap::Config::builder(&self.account.host).security(security);
        if let Some(port) = self.account.port {
            builder = builder.port(port);
        }
        builder
            .connect_timeout(Duration::from_secs(self.engine.command_timeout_secs))
            .build()
    }

    /// Pool and retry settings.
    #[must_use]
    pub fn connection(&self) -> ConnectionConfig {
        let e = &self.engine;
        let retry = RetryPolicy::default()
            .with_max_retries(e.max_retries)
            .with_base_delay(Duration::from_secs(e.base_delay_secs))
            .with_max_delay(Duration::from_secs(e.max_delay_secs));
        ConnectionConfig::default()
            .with_pool_size(e.concurrency)
            .with_command_timeout(Duration::from_secs(e.command_timeout_secs))
            .with_idle_timeout(Duration::from_secs(e.idle_timeout_secs))
            .with_retry(retry)
    }

    /// Run settings.
    #[must_use]
    pub fn engine(&self) -> EngineConfig {
        let e = &self.engine;
        EngineConfig::default()
            .with_chunk_size(e.chunk_size)
            .with_fetch_batch_size(e.fetch_batch_size)
            .with_max_chunk_failures(e.max_chunk_failures)
            .with_archive_mailbox(e.archive_mailbox.clone())
            .with_retain_completed(e.retain_completed)
            .with_preview_size(e.preview_size)
    }

    /// Checkpoint database path, creating its directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if no data directory exists or it cannot be created.
    pub fn checkpoint_path(&self) -> Result<PathBuf, ConfigError> {
        let path = match &self.engine.checkpoint_db {
            Some(path) => path.clone(),
            None => dirs::data_dir()
                .ok_or(ConfigError::NoDirectory("data"))?
                .join("mailsweep")
                .join("checkpoints.db"),
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Read {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        Ok(path)
    }
}

/// Default configuration file location.
///
/// # Errors
///
/// Returns an error if the platform has no configuration directory.
pub fn default_path() -> Result<PathBuf, ConfigError> {
    Ok(dirs::config_dir()
        .ok_or(ConfigError::NoDirectory("config"))?
        .join("mailsweep")
        .join("config.toml"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn minimal_file_uses_defaults() {
        let config = AppConfig::parse(
            r#"
            [account]
            host = "imap.example.com"
            username = "me@example.com"
            "#,
        )
        .unwrap();

        assert!(config.account.tls);
        let imap = config.imap();
        assert_eq!(imap.port, 993);
        assert_eq!(imap.security, Security::Implicit);

        let connection = config.connection();
        assert_eq!(connection.pool_size, 2);
        assert_eq!(connection.retry, RetryPolicy::default());

        let engine = config.engine();
        assert_eq!(engine.chunk_size, 500);
        assert_eq!(engine.max_chunk_failures, 3);
        assert_eq!(engine.archive_mailbox, "Archive");
    }

    #[test]
    fn engine_section_overrides() {
        let config = AppConfig::parse(
            r#"
            [account]
            host = "mail.example.org"
            port = 143
            tls = false
            username = "me"
            password_env = "PW"

            [engine]
            chunk_size = 200
            concurrency = 4
            max_retries = 2
            archive_mailbox = "Old"
            checkpoint_db = "/tmp/sweep.db"
            "#,
        )
        .unwrap();

        assert_eq!(config.imap().port, 143);
        assert_eq!(config.imap().security, Security::None);
        assert_eq!(config.connection().pool_size, 4);
        assert_eq!(config.connection().retry.max_retries, 2);
        assert_eq!(config.engine().chunk_size, 200);
        assert_eq!(config.engine().archive_mailbox, "Old");
        assert_eq!(
            config.engine.checkpoint_db.as_deref(),
            Some(Path::new("/tmp/sweep.db"))
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = AppConfig::parse(
            r#"
            [account]
            host = "h"
            username = "u"
            pasword = "typo"
            "#,
        );
        assert!(err.is_err());
    }
}
