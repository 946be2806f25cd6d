use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Text of the final answer message. Thread history skips messages carrying it
/// so the bot's own answers are not replayed into the next prompt.
pub const FEEDBACK_MESSAGE: &str = "Open Slack to provide feedback";
pub const PROCESSING_MESSAGE: &str = "Processing...";
pub const ERROR_PREFIX: &str = "*_Processing error_*";
pub const HISTORY_PREAMBLE: &str = "Given the following conversation thread history in JSON:";
pub const PROMPT_SEPARATOR: &str = "\n----------\n";

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Message,
    AppMention,
}

impl EventKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "message" => Some(Self::Message),
            "app_mention" => Some(Self::AppMention),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::AppMention => "app_mention",
        }
    }
}

/// Groups the exchanges of one conversation for context caching.
///
/// Plain channel messages share one key per channel. Mentions are keyed by the
/// thread they live in, so the mention that starts a thread and every reply in
/// that thread resolve to the same key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationKey(pub String);

impl ConversationKey {
    pub fn derive(
        kind: EventKind,
        team: &str,
        channel: &str,
        event_ts: &str,
        thread_ts: Option<&str>,
    ) -> Self {
        match kind {
            EventKind::Message => Self(format!("{team}:{channel}")),
            EventKind::AppMention => {
                let anchor = thread_ts.unwrap_or(event_ts);
                Self(format!("{team}:{channel}:{anchor}"))
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMetadata {
    pub channel: ConversationKey,
    pub conversation_id: String,
    pub system_message_id: String,
    /// Milliseconds since the epoch.
    pub latest_ts: i64,
    /// Seconds since the epoch.
    pub expire_at: i64,
}

impl ChannelMetadata {
    pub fn fresh(
        channel: ConversationKey,
        conversation_id: impl Into<String>,
        system_message_id: impl Into<String>,
        days_to_live: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            channel,
            conversation_id: conversation_id.into(),
            system_message_id: system_message_id.into(),
            latest_ts: now.timestamp_millis(),
            expire_at: expire_at(days_to_live, now),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expire_at <= now.timestamp()
    }
}

pub fn expire_at(days_to_live: u32, now: DateTime<Utc>) -> i64 {
    now.timestamp() + i64::from(days_to_live) * SECONDS_PER_DAY
}

/// Identifiers handed to the backend to resume a conversation. Both absent
/// means the request starts from scratch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<String>,
}

impl ConversationContext {
    pub fn from_metadata(metadata: Option<&ChannelMetadata>) -> Self {
        match metadata {
            Some(metadata) => Self {
                conversation_id: Some(metadata.conversation_id.clone()),
                parent_message_id: Some(metadata.system_message_id.clone()),
            },
            None => Self::default(),
        }
    }

    pub fn reset(&mut self) {
        self.conversation_id = None;
        self.parent_message_id = None;
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

fn mention_pattern() -> &'static Regex {
    static MENTION: OnceLock<Regex> = OnceLock::new();
    MENTION.get_or_init(|| match Regex::new(r"<@[A-Z0-9]+>") {
        Ok(pattern) => pattern,
        Err(error) => unreachable!("mention pattern is a valid literal: {error}"),
    })
}

/// Removes `<@U123ABC>` user mentions and trims the result.
pub fn strip_mentions(text: &str) -> String {
    mention_pattern().replace_all(text, "").trim().to_owned()
}

/// Converts a Slack message timestamp (`"1700000000.123456"`) to ISO-8601 with
/// millisecond precision. Sub-millisecond digits are truncated.
pub fn slack_ts_to_iso(ts: &str) -> Option<String> {
    let ts = ts.trim();
    if ts.is_empty() {
        return None;
    }
    let (seconds, fraction) = ts.split_once('.').unwrap_or((ts, ""));
    let seconds: i64 = seconds.parse().ok()?;
    if !fraction.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    let millis_digits: String = fraction.chars().chain("000".chars()).take(3).collect();
    let millis: i64 = millis_digits.parse().ok()?;
    let stamp = DateTime::<Utc>::from_timestamp_millis(seconds.checked_mul(1000)? + millis)?;
    Some(stamp.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Accumulates prompt lines; the joined prompt separates lines with
/// [`PROMPT_SEPARATOR`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PromptBuilder {
    lines: Vec<String>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&mut self, entries: &[HistoryEntry]) -> Result<&mut Self, serde_json::Error> {
        let serialized = serde_json::to_string(entries)?;
        self.lines.push(format!("{HISTORY_PREAMBLE}\n{serialized}"));
        Ok(self)
    }

    pub fn line(&mut self, text: impl Into<String>) -> &mut Self {
        self.lines.push(text.into());
        self
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn build(&self) -> String {
        self.lines.join(PROMPT_SEPARATOR)
    }
}
