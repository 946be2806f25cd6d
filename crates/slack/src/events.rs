use answerbot_core::conversation::{ConversationKey, EventKind};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("body is not a JSON object")]
    NotAnObject,
}

/// An Events API delivery. Fields are read leniently: absent, non-string and
/// empty values all read as missing, so unexpected event shapes end up in the
/// unsupported branch instead of failing to parse.
#[derive(Clone, Debug, PartialEq)]
pub struct EventPayload {
    raw: Map<String, Value>,
}

impl EventPayload {
    pub fn parse(body: &[u8]) -> Result<Self, PayloadError> {
        match serde_json::from_slice::<Value>(body)? {
            Value::Object(raw) => Ok(Self { raw }),
            _ => Err(PayloadError::NotAnObject),
        }
    }

    /// `url_verification` challenge to echo back, if any.
    pub fn challenge(&self) -> Option<&str> {
        string_field(&self.raw, "challenge")
    }

    pub fn body_type(&self) -> Option<&str> {
        string_field(&self.raw, "type")
    }

    /// Applies the dispatch filters in order: supported event type with a
    /// `client_msg_id`, then a channel and text to answer.
    pub fn qualify(&self) -> Result<QualifiedEvent, FilterRejection> {
        let unsupported =
            || FilterRejection::Unsupported { body_type: self.body_type().map(str::to_owned) };

        let event = match self.raw.get("event") {
            Some(Value::Object(event)) => event,
            _ => return Err(unsupported()),
        };
        let kind = string_field(event, "type").and_then(EventKind::parse).ok_or_else(unsupported)?;
        let client_msg_id = string_field(event, "client_msg_id").ok_or_else(unsupported)?;

        let (Some(channel), Some(text)) =
            (string_field(event, "channel"), string_field(event, "text"))
        else {
            return Err(FilterRejection::MissingChannelOrText);
        };

        let owned = |key: &str| string_field(event, key).map(str::to_owned);
        Ok(QualifiedEvent {
            kind,
            team_id: string_field(&self.raw, "team_id").unwrap_or_default().to_owned(),
            client_msg_id: client_msg_id.to_owned(),
            channel: channel.to_owned(),
            text: text.to_owned(),
            user: owned("user"),
            ts: owned("ts"),
            event_ts: owned("event_ts"),
            thread_ts: owned("thread_ts"),
        })
    }
}

fn string_field<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    object.get(key).and_then(Value::as_str).filter(|value| !value.is_empty())
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FilterRejection {
    #[error("Unsupported body type {}", .body_type.as_deref().unwrap_or("unknown"))]
    Unsupported { body_type: Option<String> },
    #[error("No channel or text to response from")]
    MissingChannelOrText,
}

/// Present when Slack redelivers an event it considers unacknowledged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryMarker {
    pub reason: String,
    pub num: Option<String>,
}

impl RetryMarker {
    pub fn from_headers(reason: Option<&str>, num: Option<&str>) -> Option<Self> {
        let reason = reason.filter(|value| !value.is_empty())?;
        Some(Self { reason: reason.to_owned(), num: num.map(str::to_owned) })
    }

    pub fn diagnostic(&self) -> String {
        format!(
            "Ignoring retry event: Retry-Reason '{}', Retry-Num '{}'",
            self.reason,
            self.num.as_deref().unwrap_or_default()
        )
    }
}

/// A message or mention that passed every filter and will be answered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QualifiedEvent {
    pub kind: EventKind,
    pub team_id: String,
    pub client_msg_id: String,
    pub channel: String,
    pub text: String,
    pub user: Option<String>,
    pub ts: Option<String>,
    pub event_ts: Option<String>,
    pub thread_ts: Option<String>,
}

impl QualifiedEvent {
    pub fn conversation_key(&self) -> ConversationKey {
        let event_ts = self.event_ts.as_deref().or(self.ts.as_deref()).unwrap_or_default();
        ConversationKey::derive(
            self.kind,
            &self.team_id,
            &self.channel,
            event_ts,
            self.thread_ts.as_deref(),
        )
    }

    /// Mentions are answered in a thread under the mentioning message; plain
    /// channel messages are answered top-level.
    pub fn reply_thread_ts(&self) -> Option<&str> {
        match self.kind {
            EventKind::AppMention => self.ts.as_deref(),
            EventKind::Message => None,
        }
    }
}
