//! Credential resolution.
//!
//! Sources, in order: an OAuth2 token from `oauth_token_env`, a password in
//! the config file, a password from `password_env`, and finally the system
//! keyring entry `mailsweep` / `<username>`.

use keyring::Entry;
use mailsweep_core::Credentials;
use tracing::debug;

use crate::config::AccountConfig;

/// Service name used for keyring entries.
const SERVICE_NAME: &str = "mailsweep";

/// Error type for credential lookup.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Failed to access keyring.
    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    /// A configured environment variable is unset.
    #[error("environment variable {0} is not set")]
    MissingEnv(String),

    /// Nothing configured and nothing in the keyring.
    #[error("no password for {0}: set password_env or store one with `mailsweep set-password`")]
    NotFound(String),
}

/// Resolves the account's credentials.
///
/// # Errors
///
/// Returns an error if a configured source is empty or nothing is found.
pub fn resolve(account: &AccountConfig) -> Result<Credentials, CredentialError> {
    resolve_with(account, |name| std::env::var(name).ok(), keyring_password)
}

fn resolve_with(
    account: &AccountConfig,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl Fn(&str) -> Result<Option<String>, CredentialError>,
) -> Result<Credentials, CredentialError> {
    let username = account.username.clone();

    if let Some(var) = &account.oauth_token_env {
        let access_token = env(var).ok_or_else(|| CredentialError::MissingEnv(var.clone()))?;
        debug!(user = %username, "using OAuth2 token");
        return Ok(Credentials::OAuth2 {
            username,
            access_token,
        });
    }

    if let Some(password) = &account.password {
        return Ok(Credentials::Password {
            username,
            password: password.clone(),
        });
    }

    if let Some(var) = &account.password_env {
        let password = env(var).ok_or_else(|| CredentialError::MissingEnv(var.clone()))?;
        return Ok(Credentials::Password { username, password });
    }

    match keyring(&username)? {
        Some(password) => {
            debug!(user = %username, "password loaded from keyring");
            Ok(Credentials::Password { username, password })
        }
        None => Err(CredentialError::NotFound(username)),
    }
}

/// Retrieves the password stored for `username`.
///
/// # Errors
///
/// Returns an error if the keyring operation fails.
pub fn keyring_password(username: &str) -> Result<Option<String>, CredentialError> {
    let entry = Entry::new(SERVICE_NAME, username)?;
    match entry.get_password() {
        Ok(password) => Ok(Some(password)),
        Err(keyring::Error::NoEntry) => {
            debug!("No password found for {username}");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Stores the password for `username` in the system keyring.
///
/// # Errors
///
/// Returns an error if the keyring operation fails.
pub fn store_password(username: &str, password: &str) -> Result<(), CredentialError> {
    let entry = Entry::new(SERVICE_NAME, username)?;
    entry.set_password(password)?;
    debug!("Stored password for {username}");
    Ok(())
}
