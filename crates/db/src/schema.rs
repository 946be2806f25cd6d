use answerbot_core::config::{is_sql_identifier, ContextConfig};
use tracing::debug;

use crate::repositories::RepositoryError;
use crate::DbPool;

/// Table names are configuration, so every statement interpolates them. They
/// are validated once here and never taken from request data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableNames {
    cache: String,
    message_metadata: String,
}

impl TableNames {
    pub fn new(
        cache: impl Into<String>,
        message_metadata: impl Into<String>,
    ) -> Result<Self, RepositoryError> {
        let cache = cache.into();
        let message_metadata = message_metadata.into();
        for name in [&cache, &message_metadata] {
            if !is_sql_identifier(name) {
                return Err(RepositoryError::InvalidTableName(name.clone()));
            }
        }
        if cache == message_metadata {
            return Err(RepositoryError::InvalidTableName(format!(
                "{cache} (cache and message metadata tables must differ)"
            )));
        }
        Ok(Self { cache, message_metadata })
    }

    pub fn from_config(config: &ContextConfig) -> Result<Self, RepositoryError> {
        Self::new(config.cache_table.clone(), config.message_metadata_table.clone())
    }

    pub fn cache(&self) -> &str {
        &self.cache
    }

    pub fn message_metadata(&self) -> &str {
        &self.message_metadata
    }
}

/// Creates both tables and their expiry indexes when missing. Safe to run on
/// every start.
pub async fn ensure(pool: &DbPool, tables: &TableNames) -> Result<(), RepositoryError> {
    let cache = tables.cache();
    let messages = tables.message_metadata();

    let statements = [
        format!(
            "CREATE TABLE IF NOT EXISTS {cache} (
                channel TEXT PRIMARY KEY NOT NULL,
                conversation_id TEXT NOT NULL DEFAULT '',
                system_message_id TEXT NOT NULL DEFAULT '',
                latest_ts INTEGER NOT NULL,
                expire_at INTEGER NOT NULL
            )"
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_{cache}_expire_at ON {cache} (expire_at)"),
        format!(
            "CREATE TABLE IF NOT EXISTS {messages} (
                message_ts TEXT NOT NULL,
                channel TEXT NOT NULL,
                conversation_key TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expire_at INTEGER NOT NULL,
                PRIMARY KEY (channel, message_ts)
            )"
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_{messages}_expire_at ON {messages} (expire_at)"),
    ];

    for statement in &statements {
        sqlx::query(statement).execute(pool).await?;
    }
    debug!(event_name = "db.schema.ensured", cache_table = cache, message_table = messages);
    Ok(())
}

/// Configured tables that do not exist in the connected database.
pub async fn missing_tables(
    pool: &DbPool,
    tables: &TableNames,
) -> Result<Vec<String>, RepositoryError> {
    let mut missing = Vec::new();
    for name in [tables.cache(), tables.message_metadata()] {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(name)
        .fetch_one(pool)
        .await?;
        if count == 0 {
            missing.push(name.to_owned());
        }
    }
    Ok(missing)
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::{ensure, missing_tables, TableNames};
    use crate::connect_with_settings;
    use crate::repositories::RepositoryError;

    async fn table_count(pool: &sqlx::SqlitePool, name: &str) -> i64 {
        sqlx::query(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(name)
        .fetch_one(pool)
        .await
        .expect("query sqlite_master")
        .get::<i64, _>("count")
    }

    #[tokio::test]
    async fn ensure_creates_configured_tables_idempotently() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        let tables = TableNames::new("channel_cache", "posted_messages").expect("valid names");

        ensure(&pool, &tables).await.expect("first ensure");
        ensure(&pool, &tables).await.expect("second ensure");

        assert_eq!(table_count(&pool, "channel_cache").await, 1);
        assert_eq!(table_count(&pool, "posted_messages").await, 1);
        assert_eq!(table_count(&pool, "channel_metadata").await, 0);
    }

    #[tokio::test]
    async fn missing_tables_lists_only_absent_tables() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        let tables = TableNames::new("channel_cache", "posted_messages").expect("valid names");

        let before = missing_tables(&pool, &tables).await.expect("inspect");
        assert_eq!(before, vec!["channel_cache".to_owned(), "posted_messages".to_owned()]);

        let other = TableNames::new("channel_cache", "other_messages").expect("valid names");
        ensure(&pool, &other).await.expect("ensure other");
        let partial = missing_tables(&pool, &tables).await.expect("inspect");
        assert_eq!(partial, vec!["posted_messages".to_owned()]);

        ensure(&pool, &tables).await.expect("ensure");
        assert!(missing_tables(&pool, &tables).await.expect("inspect").is_empty());
    }

    #[test]
    fn table_names_reject_non_identifiers() {
        let error = TableNames::new("cache; DROP TABLE x", "messages").expect_err("invalid");
        assert!(matches!(error, RepositoryError::InvalidTableName(name) if name.starts_with("cache;")));

        assert!(TableNames::new("1cache", "messages").is_err());
        assert!(TableNames::new("same", "same").is_err());
    }
}
