use answerbot_core::conversation::ConversationKey;
use answerbot_db::repositories::{
    ContextStore, InMemoryContextStore, SqlContextStore,
};
use answerbot_db::{connect_with_settings, schema, TableNames};
use chrono::{Duration, TimeZone, Utc};

type ContractResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left,
                $right
            ));
        }
    };
}

async fn exercise_contract(store: &dyn ContextStore) -> ContractResult {
    let now = Utc
        .with_ymd_and_hms(2024, 2, 10, 8, 30, 0)
        .single()
        .ok_or_else(|| "fixed date should be valid".to_owned())?;
    let channel_key = ConversationKey("T1:C1".to_owned());
    let thread_key = ConversationKey("T1:C1:1700000000.000100".to_owned());

    let missing = store.get(&channel_key, now).await.map_err(|e| e.to_string())?;
    require!(missing.is_none(), "missing key should read as absent");

    store.put(&channel_key, "conv-a", "msg-a", now).await.map_err(|e| e.to_string())?;
    store.put(&thread_key, "", "", now).await.map_err(|e| e.to_string())?;

    let channel = store
        .get(&channel_key, now)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "channel key should be present".to_owned())?;
    require_eq!(channel.conversation_id.as_str(), "conv-a");
    require_eq!(channel.system_message_id.as_str(), "msg-a");
    require_eq!(channel.expire_at, now.timestamp() + 3 * 86_400);

    let thread = store
        .get(&thread_key, now)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "thread key should be present".to_owned())?;
    require_eq!(thread.conversation_id.as_str(), "");

    let later = now + Duration::days(1);
    store.put(&channel_key, "", "", later).await.map_err(|e| e.to_string())?;
    let replaced = store
        .get(&channel_key, later)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "replaced key should be present".to_owned())?;
    require_eq!(replaced.conversation_id.as_str(), "");
    require_eq!(replaced.expire_at, later.timestamp() + 3 * 86_400);

    let after_thread_expiry = now + Duration::days(3);
    let purged = store.purge_expired(after_thread_expiry).await.map_err(|e| e.to_string())?;
    require_eq!(purged, 1);
    let survivor = store.get(&channel_key, after_thread_expiry).await.map_err(|e| e.to_string())?;
    require!(survivor.is_some(), "refreshed key should survive the purge");

    store.delete(&channel_key).await.map_err(|e| e.to_string())?;
    let deleted = store.get(&channel_key, after_thread_expiry).await.map_err(|e| e.to_string())?;
    require!(deleted.is_none(), "deleted key should read as absent");

    Ok(())
}

#[tokio::test]
async fn sql_context_store_honors_contract() -> ContractResult {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.map_err(|e| e.to_string())?;
    let tables = TableNames::new("contract_cache", "contract_messages").map_err(|e| e.to_string())?;
    schema::ensure(&pool, &tables).await.map_err(|e| e.to_string())?;

    let store = SqlContextStore::new(pool, tables.cache(), 3);
    exercise_contract(&store).await
}

#[tokio::test]
async fn in_memory_context_store_honors_contract() -> ContractResult {
    let store = InMemoryContextStore::new(3);
    exercise_contract(&store).await
}
