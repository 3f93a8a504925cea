//! Authenticator adapters.
//!
//! - `DevAuthenticator` trusts the token as a display name. Local play only.
//! - `AccountFileAuthenticator` checks `username:secret` tokens against a
//!   read-only accounts file of SHA-256 secret hashes.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use gamelobby_domain::{DomainError, PlayerIdentity};

use super::ports::{AuthError, Authenticator};

/// Accepts any token that is a valid display name; the player id is its
/// lowercase form.
#[derive(Debug, Clone, Copy, Default)]
pub struct DevAuthenticator;

#[async_trait]
impl Authenticator for DevAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<PlayerIdentity, AuthError> {
        let name = token.trim();
        PlayerIdentity::parse(name.to_lowercase(), name)
            .map_err(|e| AuthError::MalformedToken(e.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum AccountFileError {
    #[error("Failed to read accounts file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse accounts file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid account '{username}': {source}")]
    InvalidAccount {
        username: String,
        #[source]
        source: DomainError,
    },
    #[error("Duplicate account '{0}'")]
    Duplicate(String),
}

#[derive(Debug, Deserialize)]
struct AccountsFile {
    #[serde(default)]
    accounts: Vec<AccountRecord>,
}

#[derive(Debug, Deserialize)]
struct AccountRecord {
    username: String,
    /// Hex SHA-256 of the secret
    hash: String,
}

#[derive(Debug, Clone)]
struct Account {
    identity: PlayerIdentity,
    hash: String,
}

/// Credentials from a JSON accounts file: `{"accounts":[{"username","hash"}]}`.
///
/// Usernames are matched case-insensitively. Registration is not supported;
/// the file is read once at startup.
#[derive(Debug, Clone)]
pub struct AccountFileAuthenticator {
    accounts: HashMap<String, Account>,
}

impl AccountFileAuthenticator {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, AccountFileError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let authenticator = Self::from_json(&raw)?;
        tracing::info!(
            path = %path.display(),
            accounts = authenticator.len(),
            "Loaded accounts file"
        );
        Ok(authenticator)
    }

    pub fn from_json(raw: &str) -> Result<Self, AccountFileError> {
        let file: AccountsFile = serde_json::from_str(raw)?;
        let mut accounts = HashMap::with_capacity(file.accounts.len());
        for record in file.accounts {
            let key = record.username.trim().to_lowercase();
            let identity = PlayerIdentity::parse(key.clone(), record.username.trim()).map_err(
                |source| AccountFileError::InvalidAccount {
                    username: record.username.clone(),
                    source,
                },
            )?;
            let account = Account {
                identity,
                hash: record.hash.trim().to_ascii_lowercase(),
            };
            if accounts.insert(key.clone(), account).is_some() {
                return Err(AccountFileError::Duplicate(key));
            }
        }
        Ok(Self { accounts })
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

/// Hex-encoded SHA-256 of `secret`, the format stored in accounts files.
pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

#[async_trait]
impl Authenticator for AccountFileAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<PlayerIdentity, AuthError> {
        let (username, secret) = token
            .split_once(':')
            .ok_or_else(|| AuthError::MalformedToken("expected 'username:secret'".to_string()))?;

        let account = self
            .accounts
            .get(&username.trim().to_lowercase())
            .ok_or(AuthError::InvalidCredentials)?;
        if hash_secret(secret) != account.hash {
            tracing::warn!(player_id = %account.identity.id(), "Wrong secret");
            return Err(AuthError::InvalidCredentials);
        }
        Ok(account.identity.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn accounts_json() -> String {
        format!(
            r#"{{"accounts":[{{"username":"Ada","hash":"{}"}},{{"username":"bob","hash":"{}"}}]}}"#,
            hash_secret("lovelace"),
            hash_secret("hunter2").to_uppercase()
        )
    }

    #[tokio::test]
    async fn dev_authenticator_uses_token_as_name() {
        let identity = DevAuthenticator.authenticate(" Ada ").await.expect("valid name");
        assert_eq!(identity.id().as_str(), "ada");
        assert_eq!(identity.display_name().as_str(), "Ada");

        let err = DevAuthenticator.authenticate("   ").await.expect_err("blank");
        assert!(matches!(err, AuthError::MalformedToken(_)));
    }

    #[tokio::test]
    async fn account_file_checks_secret_hash() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(accounts_json().as_bytes()).expect("write accounts");
        let auth = AccountFileAuthenticator::load(file.path()).await.expect("load");
        assert_eq!(auth.len(), 2);

        let identity = auth.authenticate("ADA:lovelace").await.expect("valid login");
        assert_eq!(identity.id().as_str(), "ada");
        assert_eq!(identity.display_name().as_str(), "Ada");

        assert!(auth.authenticate("bob:hunter2").await.is_ok());
        assert_eq!(
            auth.authenticate("ada:babbage").await,
            Err(AuthError::InvalidCredentials)
        );
        assert_eq!(
            auth.authenticate("carol:anything").await,
            Err(AuthError::InvalidCredentials)
        );
        assert!(matches!(
            auth.authenticate("no-separator").await,
            Err(AuthError::MalformedToken(_))
        ));
    }

    #[test]
    fn duplicate_usernames_are_rejected() {
        let raw = r#"{"accounts":[{"username":"Ada","hash":"00"},{"username":"ADA","hash":"11"}]}"#;
        assert!(matches!(
            AccountFileAuthenticator::from_json(raw),
            Err(AccountFileError::Duplicate(name)) if name == "ada"
        ));
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = AccountFileAuthenticator::load(dir.path().join("absent.json"))
            .await
            .expect_err("missing file");
        assert!(matches!(err, AccountFileError::Io(_)));
    }
}
