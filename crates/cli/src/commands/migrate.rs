use answerbot_db::schema::{self, TableNames};
use answerbot_db::connect;

use crate::commands::{load_config, runtime, CommandResult, EXIT_DATABASE, EXIT_SCHEMA};

pub fn run() -> CommandResult {
    let config = match load_config("migrate") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("migrate") {
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
        pool.close().await;
        Ok::<TableNames, (&'static str, String, u8)>(tables)
    });

    match result {
        Ok(tables) => CommandResult::success(
            "migrate",
            format!(
                "tables `{}` and `{}` are ready",
                tables.cache(),
                tables.message_metadata()
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}
