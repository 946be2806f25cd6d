use std::sync::Arc;

use answerbot_core::config::AppConfig;
use answerbot_core::secrets::{
    provider_from_config, CachedSecret, SearchCredentials, SecretError, SecretProvider,
    SlackCredentials,
};
use answerbot_db::schema::{self, TableNames};
use answerbot_db::{
    connect, DbPool, RepositoryError, SqlContextStore, SqlMessageMetadataStore,
};
use answerbot_search::BraveClient;
use answerbot_slack::SlackWebClient;
use thiserror::Error;
use tracing::info;

use crate::handler::{HandlerDependencies, SlackEventHandler};
use crate::health::Readiness;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub handler: Arc<SlackEventHandler>,
    pub readiness: Readiness,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("schema bootstrap failed: {0}")]
    Schema(#[source] RepositoryError),
    #[error("secret provider unavailable: {0}")]
    Secrets(#[source] SecretError),
    #[error("search client could not be built: {0}")]
    SearchClient(#[source] reqwest::Error),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let provider = provider_from_config(&config.secrets).map_err(BootstrapError::Secrets)?;
    bootstrap_with_provider(config, provider).await
}

/// Wires every collaborator. Secrets are resolved lazily on first use, so a
/// misnamed secret surfaces on the first request rather than at startup.
pub async fn bootstrap_with_provider(
    config: AppConfig,
    provider: Arc<dyn SecretProvider>,
) -> Result<Application, BootstrapError> {
    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    let tables = TableNames::from_config(&config.context).map_err(BootstrapError::Schema)?;
    schema::ensure(&db_pool, &tables).await.map_err(BootstrapError::Schema)?;
    info!(
        event_name = "system.bootstrap.schema_ready",
        correlation_id = "bootstrap",
        cache_table = tables.cache(),
        message_metadata_table = tables.message_metadata(),
        "context tables ready"
    );

    let slack_credentials = Arc::new(CachedSecret::<SlackCredentials>::new(
        provider.clone(),
        config.slack.secret_name.clone(),
    ));
    let search_credentials = Arc::new(CachedSecret::<SearchCredentials>::new(
        provider,
        config.search.secret_name.clone(),
    ));

    let slack = SlackWebClient::new(config.slack.api_base_url.clone(), slack_credentials.clone());
    let search = BraveClient::from_config(&config.search, search_credentials)
        .map_err(BootstrapError::SearchClient)?;
    let days_to_live = config.context.days_to_live;

    let handler = SlackEventHandler::new(HandlerDependencies {
        slack: Arc::new(slack),
        search: Arc::new(search),
        contexts: Arc::new(SqlContextStore::new(
            db_pool.clone(),
            tables.cache().to_owned(),
            days_to_live,
        )),
        messages: Arc::new(SqlMessageMetadataStore::new(
            db_pool.clone(),
            tables.message_metadata().to_owned(),
        )),
        slack_credentials: slack_credentials.clone(),
        days_to_live,
    });
    let readiness = Readiness { db_pool: db_pool.clone(), tables, slack_credentials };

    Ok(Application { config, db_pool, handler: Arc::new(handler), readiness })
}
