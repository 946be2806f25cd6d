use std::sync::Arc;

use answerbot_core::secrets::{CachedSecret, SecretError, SlackCredentials};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

use crate::blocks::Block;

#[derive(Debug, Error)]
pub enum SlackApiError {
    #[error(transparent)]
    Credentials(#[from] SecretError),
    #[error("slack {method} request failed: {source}")]
    Transport {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("slack {method} rate limited, retry after {retry_after_secs}s")]
    RateLimited { method: &'static str, retry_after_secs: u64 },
    #[error("slack {method} returned HTTP {status}: {body}")]
    Status { method: &'static str, status: u16, body: String },
    #[error("slack {method} failed: {error}")]
    Api { method: &'static str, error: String },
    #[error("slack {method} response is missing `{field}`")]
    MissingField { method: &'static str, field: &'static str },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct SlackUser {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub real_name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
}

/// `conversations.replies` result. The parent message comes first and the
/// newest reply last.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ThreadReplies {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub messages: Vec<ThreadMessage>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    pub channel: String,
    pub text: String,
    pub blocks: Vec<Block>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
}

/// Handle to a posted message, used to edit it in place.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedMessage {
    pub channel: String,
    pub ts: String,
}

#[async_trait]
pub trait SlackApi: Send + Sync {
    async fn user_info(&self, user: &str) -> Result<SlackUser, SlackApiError>;

    /// A reply listing with `ok == false` is returned as-is rather than as an
    /// error so callers can fall back to answering without history.
    async fn thread_replies(
        &self,
        channel: &str,
        thread_ts: &str,
    ) -> Result<ThreadReplies, SlackApiError>;

    async fn post_message(&self, message: OutgoingMessage) -> Result<PostedMessage, SlackApiError>;

    async fn update_message(
        &self,
        target: &PostedMessage,
        text: &str,
        blocks: Vec<Block>,
    ) -> Result<(), SlackApiError>;
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    body: T,
}

impl<T> Envelope<T> {
    fn into_ok(self, method: &'static str) -> Result<T, SlackApiError> {
        if self.ok {
            Ok(self.body)
        } else {
            Err(SlackApiError::Api {
                method,
                error: self.error.unwrap_or_else(|| "unknown".to_owned()),
            })
        }
    }
}

#[derive(Deserialize)]
struct UserInfoBody {
    #[serde(default)]
    user: Option<SlackUser>,
}

#[derive(Deserialize)]
struct PostMessageBody {
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

#[derive(Deserialize)]
struct Empty {}

/// Slack Web API over HTTPS, authenticated with the bot token from the Slack
/// secret. The token is resolved on first call.
pub struct SlackWebClient {
    http: Client,
    base_url: String,
    credentials: Arc<CachedSecret<SlackCredentials>>,
}

impl SlackWebClient {
    pub fn new(base_url: impl Into<String>, credentials: Arc<CachedSecret<SlackCredentials>>) -> Self {
        Self::with_client(Client::new(), base_url, credentials)
    }

    pub fn with_client(
        http: Client,
        base_url: impl Into<String>,
        credentials: Arc<CachedSecret<SlackCredentials>>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { http, base_url, credentials }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: &'static str,
        request: RequestBuilder,
    ) -> Result<T, SlackApiError> {
        let credentials = self.credentials.get().await?;
        let response = request
            .bearer_auth(credentials.bot_token())
            .send()
            .await
            .map_err(|source| SlackApiError::Transport { method, source })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse().ok())
                .unwrap_or(30);
            return Err(SlackApiError::RateLimited { method, retry_after_secs });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SlackApiError::Status { method, status: status.as_u16(), body });
        }

        let parsed = response
            .json::<T>()
            .await
            .map_err(|source| SlackApiError::Transport { method, source })?;
        debug!(event_name = "slack.api.response", method, "slack api call completed");
        Ok(parsed)
    }
}

#[async_trait]
impl SlackApi for SlackWebClient {
    async fn user_info(&self, user: &str) -> Result<SlackUser, SlackApiError> {
        const METHOD: &str = "users.info";
        let request = self.http.get(self.url(METHOD)).query(&[("user", user)]);
        let envelope: Envelope<UserInfoBody> = self.send(METHOD, request).await?;
        envelope
            .into_ok(METHOD)?
            .user
            .ok_or(SlackApiError::MissingField { method: METHOD, field: "user" })
    }

    async fn thread_replies(
        &self,
        channel: &str,
        thread_ts: &str,
    ) -> Result<ThreadReplies, SlackApiError> {
        const METHOD: &str = "conversations.replies";
        let request =
            self.http.get(self.url(METHOD)).query(&[("channel", channel), ("ts", thread_ts)]);
        self.send(METHOD, request).await
    }

    async fn post_message(&self, message: OutgoingMessage) -> Result<PostedMessage, SlackApiError> {
        const METHOD: &str = "chat.postMessage";
        let request = self.http.post(self.url(METHOD)).json(&message);
        let envelope: Envelope<PostMessageBody> = self.send(METHOD, request).await?;
        let body = envelope.into_ok(METHOD)?;

        let ts = body.ts.ok_or(SlackApiError::MissingField { method: METHOD, field: "ts" })?;
        Ok(PostedMessage { channel: body.channel.unwrap_or(message.channel), ts })
    }

    async fn update_message(
        &self,
        target: &PostedMessage,
        text: &str,
        blocks: Vec<Block>,
    ) -> Result<(), SlackApiError> {
        const METHOD: &str = "chat.update";
        if target.channel.is_empty() || target.ts.is_empty() {
            error!(
                event_name = "slack.update.skipped",
                channel = %target.channel,
                ts = %target.ts,
                "cannot update message without channel and ts"
            );
            return Ok(());
        }

        let payload = json!({
            "channel": target.channel,
            "ts": target.ts,
            "text": text,
            "blocks": blocks,
        });
        let request = self.http.post(self.url(METHOD)).json(&payload);
        let envelope: Envelope<Empty> = self.send(METHOD, request).await?;
        envelope.into_ok(METHOD)?;
        Ok(())
    }
}
