use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use answerbot_core::conversation::{expire_at, ChannelMetadata, ConversationKey};

pub mod context;
pub mod memory;
pub mod message;

pub use context::SqlContextStore;
pub use memory::{InMemoryContextStore, InMemoryMessageMetadataStore};
pub use message::SqlMessageMetadataStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("invalid table name `{0}`")]
    InvalidTableName(String),
}

/// Last-known conversation state per conversation key.
///
/// `put` replaces the whole record and recomputes its expiry; there is no merge
/// and no locking, so concurrent writers resolve as last writer wins.
#[async_trait]
pub trait ContextStore: Send + Sync {
    async fn get(
        &self,
        key: &ConversationKey,
        now: DateTime<Utc>,
    ) -> Result<Option<ChannelMetadata>, RepositoryError>;

    async fn put(
        &self,
        key: &ConversationKey,
        conversation_id: &str,
        system_message_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ChannelMetadata, RepositoryError>;

    async fn delete(&self, key: &ConversationKey) -> Result<(), RepositoryError>;

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

/// A message the bot posted, kept so later tooling can map it back to the
/// conversation that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageRecord {
    pub channel: String,
    pub message_ts: String,
    pub conversation_key: ConversationKey,
    pub created_at: i64,
    pub expire_at: i64,
}

impl MessageRecord {
    pub fn new(
        channel: impl Into<String>,
        message_ts: impl Into<String>,
        conversation_key: ConversationKey,
        days_to_live: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            channel: channel.into(),
            message_ts: message_ts.into(),
            conversation_key,
            created_at: now.timestamp(),
            expire_at: expire_at(days_to_live, now),
        }
    }
}

#[async_trait]
pub trait MessageMetadataStore: Send + Sync {
    async fn record(&self, record: MessageRecord) -> Result<(), RepositoryError>;

    async fn find(
        &self,
        channel: &str,
        message_ts: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<MessageRecord>, RepositoryError>;

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
}
