//! Credential lookup.
//!
//! A [`SecretProvider`] resolves a secret name to a JSON object. Typed
//! credential bundles are parsed from that object and memoised per process by
//! [`CachedSecret`], so a secret is fetched at most once no matter how many
//! requests need it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::config::{SecretBackend, SecretsConfig};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SecretError {
    #[error("secret `{secret}` is unavailable: {reason}")]
    Unavailable { secret: String, reason: String },
    #[error("secret `{secret}` is malformed: {reason}")]
    Malformed { secret: String, reason: String },
    #[error("secret `{secret}` is missing required field `{field}`")]
    MissingCredential { secret: String, field: &'static str },
}

#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn get_secret(&self, name: &str) -> Result<Value, SecretError>;
}

/// Reads secrets from environment variables. The variable name is derived from
/// the secret name: uppercased, with every non-alphanumeric character replaced
/// by `_` (`prod/slack-bot` reads `PROD_SLACK_BOT`).
#[derive(Clone, Debug, Default)]
pub struct EnvSecretProvider;

pub fn env_var_for_secret(name: &str) -> String {
    name.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch.to_ascii_uppercase() } else { '_' })
        .collect()
}

#[async_trait]
impl SecretProvider for EnvSecretProvider {
    async fn get_secret(&self, name: &str) -> Result<Value, SecretError> {
        let var = env_var_for_secret(name);
        debug!(secret = name, env_var = %var, "reading secret from environment");
        let raw = std::env::var(&var).map_err(|_| SecretError::Unavailable {
            secret: name.to_owned(),
            reason: format!("environment variable `{var}` is not set"),
        })?;
        parse_secret_string(name, &raw)
    }
}

/// Reads `{directory}/{name}.json`.
#[derive(Clone, Debug)]
pub struct FileSecretProvider {
    directory: PathBuf,
}

impl FileSecretProvider {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self { directory: directory.into() }
    }
}

#[async_trait]
impl SecretProvider for FileSecretProvider {
    async fn get_secret(&self, name: &str) -> Result<Value, SecretError> {
        let path = self.directory.join(format!("{name}.json"));
        debug!(secret = name, path = %path.display(), "reading secret from file");
        let raw = tokio::fs::read_to_string(&path).await.map_err(|error| {
            SecretError::Unavailable {
                secret: name.to_owned(),
                reason: format!("could not read `{}`: {error}", path.display()),
            }
        })?;
        parse_secret_string(name, &raw)
    }
}

#[derive(Debug, Default)]
pub struct InMemorySecretProvider {
    secrets: HashMap<String, Value>,
    fetches: AtomicUsize,
}

impl InMemorySecretProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, name: impl Into<String>, value: Value) -> Self {
        self.secrets.insert(name.into(), value);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretProvider for InMemorySecretProvider {
    async fn get_secret(&self, name: &str) -> Result<Value, SecretError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.secrets.get(name).cloned().ok_or_else(|| SecretError::Unavailable {
            secret: name.to_owned(),
            reason: "no such secret".to_owned(),
        })
    }
}

pub fn provider_from_config(config: &SecretsConfig) -> Result<Arc<dyn SecretProvider>, SecretError> {
    match config.backend {
        SecretBackend::Env => Ok(Arc::new(EnvSecretProvider)),
        SecretBackend::File => {
            let directory = config.directory.clone().ok_or_else(|| SecretError::Unavailable {
                secret: "*".to_owned(),
                reason: "secrets.directory is not configured".to_owned(),
            })?;
            Ok(Arc::new(FileSecretProvider::new(directory)))
        }
    }
}

fn parse_secret_string(name: &str, raw: &str) -> Result<Value, SecretError> {
    let value: Value = serde_json::from_str(raw).map_err(|error| SecretError::Malformed {
        secret: name.to_owned(),
        reason: error.to_string(),
    })?;
    if !value.is_object() {
        return Err(SecretError::Malformed {
            secret: name.to_owned(),
            reason: "expected a JSON object".to_owned(),
        });
    }
    Ok(value)
}

pub trait Credentials: Sized + Send + Sync + 'static {
    fn from_secret(secret: &str, value: Value) -> Result<Self, SecretError>;
}

/// Slack app credentials. Only the signing secret and bot token are required.
#[derive(Clone, Debug)]
pub struct SlackCredentials {
    pub signing_secret: SecretString,
    pub bot_token: SecretString,
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
    pub bot_refresh_token: Option<SecretString>,
}

#[derive(Deserialize)]
struct RawSlackSecret {
    #[serde(rename = "SlackSigningSecret", default)]
    signing_secret: String,
    #[serde(rename = "SlackBotUserOAuthToken", default)]
    bot_token: String,
    #[serde(rename = "SlackClientId")]
    client_id: Option<String>,
    #[serde(rename = "SlackClientSecret")]
    client_secret: Option<String>,
    #[serde(rename = "SlackBotUserRefreshToken")]
    bot_refresh_token: Option<String>,
}

impl Credentials for SlackCredentials {
    fn from_secret(secret: &str, value: Value) -> Result<Self, SecretError> {
        let raw: RawSlackSecret = serde_json::from_value(value).map_err(|error| {
            SecretError::Malformed { secret: secret.to_owned(), reason: error.to_string() }
        })?;
        require(secret, "SlackSigningSecret", &raw.signing_secret)?;
        require(secret, "SlackBotUserOAuthToken", &raw.bot_token)?;

        Ok(Self {
            signing_secret: raw.signing_secret.into(),
            bot_token: raw.bot_token.into(),
            client_id: raw.client_id,
            client_secret: raw.client_secret.map(Into::into),
            bot_refresh_token: raw.bot_refresh_token.map(Into::into),
        })
    }
}

#[derive(Clone, Debug)]
pub struct SearchCredentials {
    pub api_key: SecretString,
}

#[derive(Deserialize)]
struct RawSearchSecret {
    #[serde(rename = "BraveAPIKey", default)]
    api_key: String,
}

impl Credentials for SearchCredentials {
    fn from_secret(secret: &str, value: Value) -> Result<Self, SecretError> {
        let raw: RawSearchSecret = serde_json::from_value(value).map_err(|error| {
            SecretError::Malformed { secret: secret.to_owned(), reason: error.to_string() }
        })?;
        require(secret, "BraveAPIKey", &raw.api_key)?;
        Ok(Self { api_key: raw.api_key.into() })
    }
}

fn require(secret: &str, field: &'static str, value: &str) -> Result<(), SecretError> {
    if value.trim().is_empty() {
        return Err(SecretError::MissingCredential { secret: secret.to_owned(), field });
    }
    Ok(())
}

/// A credential bundle fetched lazily on first use and kept for the lifetime of
/// this value. Failed fetches are not cached.
pub struct CachedSecret<T> {
    provider: Arc<dyn SecretProvider>,
    name: String,
    cell: OnceCell<T>,
}

impl<T: Credentials> CachedSecret<T> {
    pub fn new(provider: Arc<dyn SecretProvider>, name: impl Into<String>) -> Self {
        Self { provider, name: name.into(), cell: OnceCell::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn get(&self) -> Result<&T, SecretError> {
        self.cell
            .get_or_try_init(|| async {
                debug!(secret = %self.name, "fetching secret value");
                let value = self.provider.get_secret(&self.name).await?;
                T::from_secret(&self.name, value)
            })
            .await
    }
}

impl SlackCredentials {
    pub fn signing_secret(&self) -> &str {
        self.signing_secret.expose_secret()
    }

    pub fn bot_token(&self) -> &str {
        self.bot_token.expose_secret()
    }
}

impl SearchCredentials {
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}
