use chrono::{DateTime, Utc};
use sqlx::Row;

use answerbot_core::conversation::ConversationKey;

use super::{MessageMetadataStore, MessageRecord, RepositoryError};
use crate::DbPool;

pub struct SqlMessageMetadataStore {
    pool: DbPool,
    table: String,
}

impl SqlMessageMetadataStore {
    pub fn new(pool: DbPool, table: impl Into<String>) -> Self {
        Self { pool, table: table.into() }
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<MessageRecord, RepositoryError> {
    let conversation_key: String =
        row.try_get("conversation_key").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    Ok(MessageRecord {
        channel: row.try_get("channel").map_err(|e| RepositoryError::Decode(e.to_string()))?,
        message_ts: row
            .try_get("message_ts")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        conversation_key: ConversationKey(conversation_key),
        created_at: row
            .try_get("created_at")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        expire_at: row.try_get("expire_at").map_err(|e| RepositoryError::Decode(e.to_string()))?,
    })
}

#[async_trait::async_trait]
impl MessageMetadataStore for SqlMessageMetadataStore {
    async fn record(&self, record: MessageRecord) -> Result<(), RepositoryError> {
        let sql = format!(
            "INSERT INTO {} (message_ts, channel, conversation_key, created_at, expire_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(channel, message_ts) DO UPDATE SET
                 conversation_key = excluded.conversation_key,
                 created_at = excluded.created_at,
                 expire_at = excluded.expire_at",
            self.table
        );
        sqlx::query(&sql)
            .bind(&record.message_ts)
            .bind(&record.channel)
            .bind(record.conversation_key.as_str())
            .bind(record.created_at)
            .bind(record.expire_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find(
        &self,
        channel: &str,
        message_ts: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<MessageRecord>, RepositoryError> {
        let sql = format!(
            "SELECT message_ts, channel, conversation_key, created_at, expire_at
             FROM {} WHERE channel = ? AND message_ts = ? AND expire_at > ?",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(channel)
            .bind(message_ts)
            .bind(now.timestamp())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_record(r)?)),
            None => Ok(None),
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let sql = format!("DELETE FROM {} WHERE expire_at <= ?", self.table);
        let result = sqlx::query(&sql).bind(now.timestamp()).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
