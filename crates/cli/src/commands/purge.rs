use answerbot_db::schema::{self, TableNames};
use answerbot_db::{
    connect, ContextStore, MessageMetadataStore, SqlContextStore, SqlMessageMetadataStore,
};
use chrono::Utc;

use crate::commands::{
    load_config, runtime, CommandResult, EXIT_DATABASE, EXIT_PURGE, EXIT_SCHEMA,
};

pub fn run() -> CommandResult {
    let config = match load_config("purge") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("purge") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let tables = TableNames::from_config(&config.context)
            .map_err(|error| ("schema", error.to_string(), EXIT_SCHEMA))?;
        let pool = connect(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DATABASE))?;
        schema::ensure(&pool, &tables)
            .await
            .map_err(|error| ("schema", error.to_string(), EXIT_SCHEMA))?;

        let now = Utc::now();
        let contexts =
            SqlContextStore::new(pool.clone(), tables.cache(), config.context.days_to_live);
        let messages = SqlMessageMetadataStore::new(pool.clone(), tables.message_metadata());
        let purged_contexts = contexts
            .purge_expired(now)
            .await
            .map_err(|error| ("purge", error.to_string(), EXIT_PURGE))?;
        let purged_messages = messages
            .purge_expired(now)
            .await
            .map_err(|error| ("purge", error.to_string(), EXIT_PURGE))?;

        pool.close().await;
        Ok::<(u64, u64), (&'static str, String, u8)>((purged_contexts, purged_messages))
    });

    match result {
        Ok((contexts, messages)) => CommandResult::success(
            "purge",
            format!("purged {contexts} expired context rows and {messages} expired message rows"),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("purge", error_class, message, exit_code)
        }
    }
}
