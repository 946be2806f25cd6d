use std::sync::Arc;

use answerbot_core::config::AppConfig;
use answerbot_core::errors::ApplicationError;
use answerbot_core::secrets::{
    provider_from_config, CachedSecret, Credentials, SearchCredentials, SecretProvider,
    SlackCredentials,
};
use answerbot_db::{connect, ping};

use crate::commands::{load_config, runtime, CommandResult, EXIT_NOT_READY};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CheckStatus {
    Pass,
    Fail,
}

#[derive(Debug)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

pub fn run() -> CommandResult {
    let config = match load_config("doctor") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("doctor") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let checks = runtime.block_on(async {
        let mut checks = vec![DoctorCheck {
            name: "config_validation",
            status: CheckStatus::Pass,
            details: "configuration loaded and validated".to_string(),
        }];
        checks.extend(check_secrets(&config).await);
        checks.push(check_database_connectivity(&config).await);
        checks
    });

    let report = render(&checks);
    if checks.iter().all(|check| check.status == CheckStatus::Pass) {
        CommandResult::success("doctor", report)
    } else {
        CommandResult::failure("doctor", "readiness", report, EXIT_NOT_READY)
    }
}

async fn check_secrets(config: &AppConfig) -> Vec<DoctorCheck> {
    let provider = match provider_from_config(&config.secrets) {
        Ok(provider) => provider,
        Err(error) => {
            return vec![DoctorCheck {
                name: "secret_provider",
                status: CheckStatus::Fail,
                details: error.to_string(),
            }];
        }
    };

    vec![
        check_secret::<SlackCredentials>(
            "slack_secret_resolution",
            provider.clone(),
            &config.slack.secret_name,
        )
        .await,
        check_secret::<SearchCredentials>(
            "search_secret_resolution",
            provider,
            &config.search.secret_name,
        )
        .await,
    ]
}

async fn check_secret<T: Credentials>(
    name: &'static str,
    provider: Arc<dyn SecretProvider>,
    secret_name: &str,
) -> DoctorCheck {
    match CachedSecret::<T>::new(provider, secret_name).get().await {
        Ok(_) => DoctorCheck {
            name,
            status: CheckStatus::Pass,
            details: format!("secret `{secret_name}` resolved with all required fields"),
        },
        Err(error) => {
            let failure = ApplicationError::from(error);
            DoctorCheck {
                name,
                status: CheckStatus::Fail,
                details: format!("{}: {failure}", failure.error_class()),
            }
        }
    }
}

async fn check_database_connectivity(config: &AppConfig) -> DoctorCheck {
    let result = async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;
        let probe = ping(&pool).await.map_err(|error| format!("database probe failed: {error}"));
        pool.close().await;
        probe
    }
    .await;

    match result {
        Ok(()) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        },
        Err(error) => {
            DoctorCheck { name: "database_connectivity", status: CheckStatus::Fail, details: error }
        }
    }
}

fn render(checks: &[DoctorCheck]) -> String {
    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let mut lines = vec![if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    }];

    for check in checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
