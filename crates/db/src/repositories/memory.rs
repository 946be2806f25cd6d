use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use answerbot_core::conversation::{ChannelMetadata, ConversationKey};

use super::{ContextStore, MessageMetadataStore, MessageRecord, RepositoryError};

/// Same expiry semantics as the SQL store, without a database.
pub struct InMemoryContextStore {
    days_to_live: u32,
    entries: RwLock<HashMap<String, ChannelMetadata>>,
}

impl InMemoryContextStore {
    pub fn new(days_to_live: u32) -> Self {
        Self { days_to_live, entries: RwLock::new(HashMap::new()) }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl ContextStore for InMemoryContextStore {
    async fn get(
        &self,
        key: &ConversationKey,
        now: DateTime<Utc>,
    ) -> Result<Option<ChannelMetadata>, RepositoryError> {
        let entries = self.entries.read().await;
        Ok(entries.get(key.as_str()).filter(|metadata| !metadata.is_expired(now)).cloned())
    }

    async fn put(
        &self,
        key: &ConversationKey,
        conversation_id: &str,
        system_message_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ChannelMetadata, RepositoryError> {
        let metadata = ChannelMetadata::fresh(
            key.clone(),
            conversation_id,
            system_message_id,
            self.days_to_live,
            now,
        );
        let mut entries = self.entries.write().await;
        entries.insert(key.0.clone(), metadata.clone());
        Ok(metadata)
    }

    async fn delete(&self, key: &ConversationKey) -> Result<(), RepositoryError> {
        let mut entries = self.entries.write().await;
        entries.remove(key.as_str());
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, metadata| !metadata.is_expired(now));
        Ok((before - entries.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryMessageMetadataStore {
    records: RwLock<HashMap<(String, String), MessageRecord>>,
}

impl InMemoryMessageMetadataStore {
    pub async fn all(&self) -> Vec<MessageRecord> {
        self.records.read().await.values().cloned().collect()
    }
}

#[async_trait::async_trait]
impl MessageMetadataStore for InMemoryMessageMetadataStore {
    async fn record(&self, record: MessageRecord) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        records.insert((record.channel.clone(), record.message_ts.clone()), record);
        Ok(())
    }

    async fn find(
        &self,
        channel: &str,
        message_ts: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<MessageRecord>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records
            .get(&(channel.to_owned(), message_ts.to_owned()))
            .filter(|record| record.expire_at > now.timestamp())
            .cloned())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| record.expire_at > now.timestamp());
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use answerbot_core::conversation::ConversationKey;

    use super::{InMemoryContextStore, InMemoryMessageMetadataStore};
    use crate::repositories::{ContextStore, MessageMetadataStore, MessageRecord};

    #[tokio::test]
    async fn in_memory_context_store_hides_and_purges_expired_entries() {
        let store = InMemoryContextStore::new(1);
        let now = Utc::now();
        let key = ConversationKey("T1:C1".to_owned());

        store.put(&key, "conv", "msg", now).await.expect("put");
        assert!(store.get(&key, now).await.expect("get").is_some());

        let later = now + Duration::days(1);
        assert!(store.get(&key, later).await.expect("get expired").is_none());
        assert_eq!(store.purge_expired(later).await.expect("purge"), 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn in_memory_message_store_keys_by_channel_and_timestamp() {
        let store = InMemoryMessageMetadataStore::default();
        let now = Utc::now();
        let key = ConversationKey("T1:C1".to_owned());

        store.record(MessageRecord::new("C1", "1.0", key.clone(), 1, now)).await.expect("record");
        store.record(MessageRecord::new("C1", "1.0", key, 1, now)).await.expect("re-record");

        assert_eq!(store.all().await.len(), 1);
        assert!(store.find("C1", "1.0", now).await.expect("find").is_some());
    }
}
