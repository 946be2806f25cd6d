use std::collections::HashMap;
use std::sync::Arc;

use answerbot_core::conversation::{
    slack_ts_to_iso, strip_mentions, ConversationContext, ConversationKey, HistoryEntry,
    PromptBuilder, ERROR_PREFIX, FEEDBACK_MESSAGE, PROCESSING_MESSAGE,
};
use answerbot_core::errors::ApplicationError;
use answerbot_core::secrets::{CachedSecret, SecretError, SlackCredentials};
use answerbot_db::{ContextStore, MessageMetadataStore, MessageRecord, RepositoryError};
use answerbot_search::{to_blocks, SearchApi, SearchError, SummarizerSearchApiResponse};
use answerbot_slack::signature::{
    RETRY_NUM_HEADER, RETRY_REASON_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER,
};
use answerbot_slack::{
    markdown_block, verify_signature, EventPayload, OutgoingMessage, PostedMessage,
    QualifiedEvent, RetryMarker, SlackApi, SlackApiError,
};
use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Collaborators the handler needs for one invocation. Built once at bootstrap
/// and shared across requests.
#[derive(Clone)]
pub struct HandlerDependencies {
    pub slack: Arc<dyn SlackApi>,
    pub search: Arc<dyn SearchApi>,
    pub contexts: Arc<dyn ContextStore>,
    pub messages: Arc<dyn MessageMetadataStore>,
    pub slack_credentials: Arc<CachedSecret<SlackCredentials>>,
    pub days_to_live: u32,
}

#[derive(Clone, Debug, Default)]
pub struct InboundRequest {
    pub body: Bytes,
    pub signature: Option<String>,
    pub timestamp: Option<String>,
    pub retry_reason: Option<String>,
    pub retry_num: Option<String>,
}

impl InboundRequest {
    pub fn from_headers(headers: &HeaderMap, body: Bytes) -> Self {
        let header = |name: &str| {
            headers.get(name).and_then(|value| value.to_str().ok()).map(str::to_owned)
        };
        Self {
            body,
            signature: header(SIGNATURE_HEADER),
            timestamp: header(TIMESTAMP_HEADER),
            retry_reason: header(RETRY_REASON_HEADER),
            retry_num: header(RETRY_NUM_HEADER),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct HandlerResponse {
    pub status: StatusCode,
    pub body: ResponseBody,
}

impl HandlerResponse {
    fn json(status: StatusCode, body: Value) -> Self {
        Self { status, body: ResponseBody::Json(body) }
    }

    fn bad_request() -> Self {
        Self::json(StatusCode::BAD_REQUEST, json!({ "error": "Bad request" }))
    }

    fn forbidden() -> Self {
        Self::json(StatusCode::FORBIDDEN, json!({ "error": "Forbidden" }))
    }

    /// Filtered deliveries are acknowledged with 200 so Slack does not retry.
    fn diagnostic(message: impl Into<String>) -> Self {
        Self::json(StatusCode::OK, json!({ "error": message.into() }))
    }
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Secret(#[from] SecretError),
    #[error("context store failure: {0}")]
    Context(#[from] RepositoryError),
    #[error(transparent)]
    Slack(#[from] SlackApiError),
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error("thread history could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<HandlerError> for ApplicationError {
    fn from(error: HandlerError) -> Self {
        match error {
            HandlerError::Secret(error) => Self::Secret(error),
            HandlerError::Search(SearchError::Credentials(error)) => Self::Secret(error),
            HandlerError::Slack(SlackApiError::Credentials(error)) => Self::Secret(error),
            HandlerError::Context(error) => Self::Persistence(error.to_string()),
            HandlerError::Slack(error) => Self::Integration(error.to_string()),
            HandlerError::Search(error) => Self::Integration(error.to_string()),
            HandlerError::Serialize(error) => Self::Integration(error.to_string()),
        }
    }
}

pub struct SlackEventHandler {
    deps: HandlerDependencies,
}

impl SlackEventHandler {
    pub fn new(deps: HandlerDependencies) -> Self {
        Self { deps }
    }

    pub async fn handle(&self, request: InboundRequest) -> Result<HandlerResponse, HandlerError> {
        self.handle_at(request, Utc::now()).await
    }

    pub async fn handle_at(
        &self,
        request: InboundRequest,
        now: DateTime<Utc>,
    ) -> Result<HandlerResponse, HandlerError> {
        if request.body.is_empty() {
            warn!(event_name = "slack.event.rejected", reason = "empty_body");
            return Ok(HandlerResponse::bad_request());
        }

        let credentials = self.deps.slack_credentials.get().await?;
        if !verify_signature(
            request.timestamp.as_deref(),
            request.signature.as_deref(),
            &request.body,
            credentials.signing_secret(),
            now,
        ) {
            warn!(event_name = "slack.event.rejected", reason = "invalid_signature");
            return Ok(HandlerResponse::forbidden());
        }

        let payload = match EventPayload::parse(&request.body) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(event_name = "slack.event.rejected", reason = "malformed_body", error = %error);
                return Ok(HandlerResponse::bad_request());
            }
        };

        if let Some(challenge) = payload.challenge() {
            info!(event_name = "slack.event.challenge");
            return Ok(HandlerResponse {
                status: StatusCode::OK,
                body: ResponseBody::Text(challenge.to_owned()),
            });
        }

        if let Some(marker) =
            RetryMarker::from_headers(request.retry_reason.as_deref(), request.retry_num.as_deref())
        {
            let diagnostic = marker.diagnostic();
            info!(event_name = "slack.event.retry_ignored", retry_reason = %marker.reason);
            return Ok(HandlerResponse::diagnostic(diagnostic));
        }

        let event = match payload.qualify() {
            Ok(event) => event,
            Err(rejection) => {
                debug!(event_name = "slack.event.filtered", reason = %rejection);
                return Ok(HandlerResponse::diagnostic(rejection.to_string()));
            }
        };

        self.answer(event, now).await
    }

    async fn answer(
        &self,
        event: QualifiedEvent,
        now: DateTime<Utc>,
    ) -> Result<HandlerResponse, HandlerError> {
        let key = event.conversation_key();
        info!(
            event_name = "slack.event.accepted",
            correlation_id = %event.client_msg_id,
            conversation_key = %key,
            channel = %event.channel,
            kind = event.kind.as_str(),
        );

        let stored = self.deps.contexts.get(&key, now).await?;
        let mut context = ConversationContext::from_metadata(stored.as_ref());
        let mut prompt = PromptBuilder::new();

        if let Some(thread_ts) = event.thread_ts.as_deref() {
            let history = self.thread_history(&event.channel, thread_ts).await?;
            if !history.is_empty() {
                debug!(
                    event_name = "slack.thread.expanded",
                    correlation_id = %event.client_msg_id,
                    entries = history.len(),
                );
                context.reset();
                prompt.history(&history)?;
            }
        }
        prompt.line(strip_mentions(&event.text));
        let query = prompt.build();

        let placeholder = OutgoingMessage {
            channel: event.channel.clone(),
            text: PROCESSING_MESSAGE.to_owned(),
            blocks: vec![markdown_block(PROCESSING_MESSAGE, None)],
            thread_ts: event.reply_thread_ts().map(str::to_owned),
        };
        let (summary, placeholder) = tokio::join!(
            self.deps.search.summarize(&query),
            self.deps.slack.post_message(placeholder)
        );
        let placeholder = placeholder?;

        match summary {
            Ok(summary) => self.complete(&event, &key, &context, &prompt, summary, now).await,
            Err(error) if error.is_fatal() => Err(error.into()),
            Err(error) => self.fail(&event, &key, &context, &prompt, &placeholder, error).await,
        }
    }

    /// Prior messages of the thread, oldest first, excluding the triggering
    /// message and the bot's own answers.
    async fn thread_history(
        &self,
        channel: &str,
        thread_ts: &str,
    ) -> Result<Vec<HistoryEntry>, HandlerError> {
        let replies = self.deps.slack.thread_replies(channel, thread_ts).await?;
        if !replies.ok {
            warn!(
                event_name = "slack.thread.unavailable",
                channel = %channel,
                error = replies.error.as_deref().unwrap_or("unknown"),
            );
            return Ok(Vec::new());
        }
        let Some((_, earlier)) = replies.messages.split_last() else {
            return Ok(Vec::new());
        };

        let mut names: HashMap<String, Option<String>> = HashMap::new();
        let mut history = Vec::new();
        for message in earlier {
            let Some(user) = message.user.as_deref().filter(|user| !user.is_empty()) else {
                continue;
            };
            let text = message.text.as_deref().unwrap_or_default();
            if text == FEEDBACK_MESSAGE {
                continue;
            }

            let name = match names.get(user) {
                Some(name) => name.clone(),
                None => {
                    let name = self.deps.slack.user_info(user).await?.real_name;
                    names.insert(user.to_owned(), name.clone());
                    name
                }
            };
            history.push(HistoryEntry {
                name,
                message: strip_mentions(text),
                date: message.ts.as_deref().and_then(slack_ts_to_iso),
            });
        }
        Ok(history)
    }

    async fn complete(
        &self,
        event: &QualifiedEvent,
        key: &ConversationKey,
        context: &ConversationContext,
        prompt: &PromptBuilder,
        summary: SummarizerSearchApiResponse,
        now: DateTime<Utc>,
    ) -> Result<HandlerResponse, HandlerError> {
        let blocks = to_blocks(&summary);
        self.deps.contexts.put(key, "", "", now).await?;

        let posted = self
            .deps
            .slack
            .post_message(OutgoingMessage {
                channel: event.channel.clone(),
                text: FEEDBACK_MESSAGE.to_owned(),
                blocks: blocks.clone(),
                thread_ts: event.reply_thread_ts().map(str::to_owned),
            })
            .await?;
        self.record_posted(&posted, key, now).await;

        info!(
            event_name = "slack.event.answered",
            correlation_id = %event.client_msg_id,
            conversation_key = %key,
            channel = %event.channel,
            blocks = blocks.len(),
        );
        Ok(HandlerResponse::json(
            StatusCode::OK,
            json!({
                "chat": {
                    "key": key,
                    "context": context,
                    "prompt": prompt.build(),
                    "output": summary,
                    "blocks": blocks,
                }
            }),
        ))
    }

    async fn fail(
        &self,
        event: &QualifiedEvent,
        key: &ConversationKey,
        context: &ConversationContext,
        prompt: &PromptBuilder,
        placeholder: &PostedMessage,
        error: SearchError,
    ) -> Result<HandlerResponse, HandlerError> {
        let detail = error.to_string();
        warn!(
            event_name = "slack.event.search_failed",
            correlation_id = %event.client_msg_id,
            conversation_key = %key,
            channel = %event.channel,
            error = %detail,
        );

        let message = format!("{ERROR_PREFIX}\n_{detail}_");
        let blocks = vec![markdown_block(message.as_str(), None)];
        self.deps.slack.update_message(placeholder, &message, blocks.clone()).await?;

        Ok(HandlerResponse::json(
            StatusCode::OK,
            json!({
                "chat": {
                    "key": key,
                    "context": context,
                    "input": prompt.lines(),
                    "output": detail,
                    "blocks": blocks,
                },
                "error": detail,
            }),
        ))
    }

    async fn record_posted(
        &self,
        posted: &PostedMessage,
        key: &ConversationKey,
        now: DateTime<Utc>,
    ) {
        if posted.ts.is_empty() {
            return;
        }
        let record = MessageRecord::new(
            posted.channel.clone(),
            posted.ts.clone(),
            key.clone(),
            self.deps.days_to_live,
            now,
        );
        if let Err(error) = self.deps.messages.record(record).await {
            warn!(
                event_name = "message_metadata.record_failed",
                conversation_key = %key,
                channel = %posted.channel,
                error = %error,
            );
        }
    }
}
