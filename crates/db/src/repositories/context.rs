use chrono::{DateTime, Utc};
use sqlx::Row;

use answerbot_core::conversation::{ChannelMetadata, ConversationKey};

use super::{ContextStore, RepositoryError};
use crate::DbPool;

pub struct SqlContextStore {
    pool: DbPool,
    table: String,
    days_to_live: u32,
}

impl SqlContextStore {
    /// `table` must come from a validated [`crate::TableNames`].
    pub fn new(pool: DbPool, table: impl Into<String>, days_to_live: u32) -> Self {
        Self { pool, table: table.into(), days_to_live }
    }
}

fn decode<T>(result: Result<T, sqlx::Error>) -> Result<T, RepositoryError> {
    result.map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn row_to_metadata(row: &sqlx::sqlite::SqliteRow) -> Result<ChannelMetadata, RepositoryError> {
    let channel: String = decode(row.try_get("channel"))?;
    let conversation_id: Option<String> = decode(row.try_get("conversation_id"))?;
    let system_message_id: Option<String> = decode(row.try_get("system_message_id"))?;

    Ok(ChannelMetadata {
        channel: ConversationKey(channel),
        conversation_id: conversation_id.unwrap_or_default(),
        system_message_id: system_message_id.unwrap_or_default(),
        latest_ts: decode(row.try_get("latest_ts"))?,
        expire_at: decode(row.try_get("expire_at"))?,
    })
}

#[async_trait::async_trait]
impl ContextStore for SqlContextStore {
    async fn get(
        &self,
        key: &ConversationKey,
        now: DateTime<Utc>,
    ) -> Result<Option<ChannelMetadata>, RepositoryError> {
        let sql = format!(
            "SELECT channel, conversation_id, system_message_id, latest_ts, expire_at
             FROM {} WHERE channel = ? AND expire_at > ?",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(key.as_str())
            .bind(now.timestamp())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_metadata).transpose()
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
        let sql = format!(
            "INSERT INTO {} (channel, conversation_id, system_message_id, latest_ts, expire_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(channel) DO UPDATE SET
                 conversation_id = excluded.conversation_id,
                 system_message_id = excluded.system_message_id,
                 latest_ts = excluded.latest_ts,
                 expire_at = excluded.expire_at",
            self.table
        );
        sqlx::query(&sql)
            .bind(metadata.channel.as_str())
            .bind(&metadata.conversation_id)
            .bind(&metadata.system_message_id)
            .bind(metadata.latest_ts)
            .bind(metadata.expire_at)
            .execute(&self.pool)
            .await?;

        Ok(metadata)
    }

    async fn delete(&self, key: &ConversationKey) -> Result<(), RepositoryError> {
        let sql = format!("DELETE FROM {} WHERE channel = ?", self.table);
        sqlx::query(&sql).bind(key.as_str()).execute(&self.pool).await?;
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let sql = format!("DELETE FROM {} WHERE expire_at <= ?", self.table);
        let result = sqlx::query(&sql).bind(now.timestamp()).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use answerbot_core::conversation::ConversationKey;

    use super::SqlContextStore;
    use crate::repositories::ContextStore;
    use crate::schema::{ensure, TableNames};
    use crate::connect_with_settings;

    async fn store(days_to_live: u32) -> SqlContextStore {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        let tables = TableNames::new("channel_metadata", "message_metadata").expect("tables");
        ensure(&pool, &tables).await.expect("ensure schema");
        SqlContextStore::new(pool, tables.cache(), days_to_live)
    }

    #[tokio::test]
    async fn put_then_get_round_trips_and_missing_key_is_absent() {
        let store = store(90).await;
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().expect("date");
        let key = ConversationKey("T1:C1".to_owned());

        assert!(store.get(&key, now).await.expect("get missing").is_none());

        let written = store.put(&key, "conv-1", "msg-1", now).await.expect("put");
        let loaded = store.get(&key, now).await.expect("get").expect("present");

        assert_eq!(loaded, written);
        assert_eq!(loaded.expire_at, now.timestamp() + 90 * 86_400);
        assert_eq!(loaded.latest_ts, now.timestamp_millis());
    }

    #[tokio::test]
    async fn put_replaces_prior_record_including_empty_identifiers() {
        let store = store(1).await;
        let first = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).single().expect("date");
        let later = first + Duration::hours(3);
        let key = ConversationKey("T1:C1:100.1".to_owned());

        store.put(&key, "conv-1", "msg-1", first).await.expect("first put");
        store.put(&key, "", "", later).await.expect("second put");

        let loaded = store.get(&key, later).await.expect("get").expect("present");
        assert_eq!(loaded.conversation_id, "");
        assert_eq!(loaded.system_message_id, "");
        assert_eq!(loaded.expire_at, later.timestamp() + 86_400);
    }

    #[tokio::test]
    async fn expired_rows_are_hidden_then_purged() {
        let store = store(1).await;
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).single().expect("date");
        let stale = ConversationKey("T1:C1".to_owned());
        let live = ConversationKey("T1:C2".to_owned());

        store.put(&stale, "a", "b", now - Duration::days(2)).await.expect("put stale");
        store.put(&live, "c", "d", now).await.expect("put live");

        assert!(store.get(&stale, now).await.expect("get stale").is_none());
        assert_eq!(store.purge_expired(now).await.expect("purge"), 1);
        assert!(store.get(&live, now).await.expect("get live").is_some());
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let store = store(1).await;
        let now = Utc::now();
        let key = ConversationKey("T1:C1".to_owned());

        store.put(&key, "conv", "msg", now).await.expect("put");
        store.delete(&key).await.expect("delete");
        store.delete(&key).await.expect("delete is idempotent");

        assert!(store.get(&key, now).await.expect("get").is_none());
    }
}
