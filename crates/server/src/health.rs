use std::sync::Arc;

use answerbot_core::errors::ApplicationError;
use answerbot_core::secrets::{CachedSecret, SlackCredentials};
use answerbot_db::schema::{missing_tables, TableNames};
use answerbot_db::DbPool;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::warn;

/// What the events route needs before it can answer anything: the context
/// tables it reads and writes, and the signing secret it verifies with.
#[derive(Clone)]
pub struct Readiness {
    pub db_pool: DbPool,
    pub tables: TableNames,
    pub slack_credentials: Arc<CachedSecret<SlackCredentials>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReadinessCheck {
    pub name: &'static str,
    pub ready: bool,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReadinessReport {
    pub status: &'static str,
    pub checks: Vec<ReadinessCheck>,
    pub checked_at: String,
}

pub fn router(readiness: Readiness) -> Router {
    Router::new().route("/health", get(health)).with_state(readiness)
}

pub async fn health(State(readiness): State<Readiness>) -> (StatusCode, Json<ReadinessReport>) {
    let checks = vec![context_tables(&readiness).await, signing_secret(&readiness).await];
    let ready = checks.iter().all(|check| check.ready);
    if !ready {
        let failed: Vec<&str> =
            checks.iter().filter(|check| !check.ready).map(|check| check.name).collect();
        warn!(event_name = "system.health.degraded", failed = ?failed);
    }

    let report = ReadinessReport {
        status: if ready { "ready" } else { "degraded" },
        checks,
        checked_at: Utc::now().to_rfc3339(),
    };
    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(report))
}

async fn context_tables(readiness: &Readiness) -> ReadinessCheck {
    let (ready, detail) = match missing_tables(&readiness.db_pool, &readiness.tables).await {
        Ok(missing) if missing.is_empty() => (
            true,
            format!(
                "`{}` and `{}` present",
                readiness.tables.cache(),
                readiness.tables.message_metadata()
            ),
        ),
        Ok(missing) => (false, format!("missing tables: {}", missing.join(", "))),
        Err(error) => (false, format!("database query failed: {error}")),
    };
    ReadinessCheck { name: "context_tables", ready, detail }
}

async fn signing_secret(readiness: &Readiness) -> ReadinessCheck {
    let (ready, detail) = match readiness.slack_credentials.get().await {
        Ok(_) => (true, format!("secret `{}` resolved", readiness.slack_credentials.name())),
        Err(error) => {
            let error = ApplicationError::from(error);
            (false, format!("{}: {error}", error.error_class()))
        }
    };
    ReadinessCheck { name: "slack_signing_secret", ready, detail }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use answerbot_core::secrets::{CachedSecret, InMemorySecretProvider, SlackCredentials};
    use answerbot_db::schema::{ensure, TableNames};
    use answerbot_db::{connect_with_settings, DbPool};
    use axum::{extract::State, http::StatusCode, Json};
    use serde_json::json;

    use crate::health::{health, Readiness};

    fn credentials(provider: InMemorySecretProvider) -> Arc<CachedSecret<SlackCredentials>> {
        Arc::new(CachedSecret::new(Arc::new(provider), "answerbot/slack"))
    }

    fn slack_secret() -> InMemorySecretProvider {
        InMemorySecretProvider::new().with_secret(
            "answerbot/slack",
            json!({ "SlackSigningSecret": "signing", "SlackBotUserOAuthToken": "xoxb-1" }),
        )
    }

    async fn pool() -> DbPool {
        connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect")
    }

    fn tables() -> TableNames {
        TableNames::new("channel_metadata", "message_metadata").expect("valid names")
    }

    #[tokio::test]
    async fn ready_when_tables_exist_and_secret_resolves() {
        let db_pool = pool().await;
        ensure(&db_pool, &tables()).await.expect("schema");

        let readiness = Readiness {
            db_pool: db_pool.clone(),
            tables: tables(),
            slack_credentials: credentials(slack_secret()),
        };
        let (status, Json(report)) = health(State(readiness)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.status, "ready");
        assert_eq!(report.checks.len(), 2);
        assert!(report.checks.iter().all(|check| check.ready));
        assert_eq!(report.checks[1].detail, "secret `answerbot/slack` resolved");

        db_pool.close().await;
    }

    #[tokio::test]
    async fn missing_tables_and_secret_degrade_readiness() {
        let db_pool = pool().await;

        let readiness = Readiness {
            db_pool: db_pool.clone(),
            tables: tables(),
            slack_credentials: credentials(InMemorySecretProvider::new()),
        };
        let (status, Json(report)) = health(State(readiness)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.status, "degraded");
        assert_eq!(report.checks[0].name, "context_tables");
        assert_eq!(report.checks[0].detail, "missing tables: channel_metadata, message_metadata");
        assert_eq!(report.checks[1].name, "slack_signing_secret");
        assert!(report.checks[1].detail.starts_with("secret_unavailable"));

        db_pool.close().await;
    }

    #[tokio::test]
    async fn closed_pool_reports_database_failure() {
        let db_pool = pool().await;
        db_pool.close().await;

        let readiness =
            Readiness { db_pool, tables: tables(), slack_credentials: credentials(slack_secret()) };
        let (status, Json(report)) = health(State(readiness)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!report.checks[0].ready);
        assert!(report.checks[0].detail.starts_with("database query failed"));
        assert!(report.checks[1].ready);
    }
}
