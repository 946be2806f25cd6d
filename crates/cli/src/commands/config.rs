use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use answerbot_core::config::AppConfig;
use toml::Value;

use crate::commands::{load_config, CommandResult};

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

pub fn run() -> CommandResult {
    let config = match load_config("config") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    CommandResult::success("config", lines.join("\n"))
}

fn field(key: &'static str, value: String, env_keys: &'static [&'static str]) -> Field {
    Field { key, value, env_keys }
}

fn fields(config: &AppConfig) -> Vec<Field> {
    vec![
        field("database.url", config.database.url.clone(), &["ANSWERBOT_DATABASE_URL"]),
        field(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["ANSWERBOT_DATABASE_MAX_CONNECTIONS"],
        ),
        field(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["ANSWERBOT_DATABASE_TIMEOUT_SECS"],
        ),
        field(
            "slack.secret_name",
            display_name(&config.slack.secret_name),
            &["ANSWERBOT_SLACK_SECRET_NAME", "SLACK_SECRET_NAME"],
        ),
        field(
            "slack.api_base_url",
            config.slack.api_base_url.clone(),
            &["ANSWERBOT_SLACK_API_BASE_URL"],
        ),
        field(
            "search.secret_name",
            display_name(&config.search.secret_name),
            &["ANSWERBOT_SEARCH_SECRET_NAME", "BRAVE_SECRET_NAME"],
        ),
        field("search.base_url", config.search.base_url.clone(), &["ANSWERBOT_SEARCH_BASE_URL"]),
        field(
            "search.timeout_secs",
            config.search.timeout_secs.to_string(),
            &["ANSWERBOT_SEARCH_TIMEOUT_SECS"],
        ),
        field(
            "context.days_to_live",
            config.context.days_to_live.to_string(),
            &["ANSWERBOT_CONTEXT_DAYS_TO_LIVE", "CONTEXT_DAYS_TO_LIVE"],
        ),
        field(
            "context.cache_table",
            config.context.cache_table.clone(),
            &["ANSWERBOT_CONTEXT_CACHE_TABLE", "CACHE_TABLE_NAME"],
        ),
        field(
            "context.message_metadata_table",
            config.context.message_metadata_table.clone(),
            &["ANSWERBOT_CONTEXT_MESSAGE_METADATA_TABLE", "MESSAGE_METADATA_TABLE_NAME"],
        ),
        field(
            "secrets.backend",
            format!("{:?}", config.secrets.backend),
            &["ANSWERBOT_SECRETS_BACKEND"],
        ),
        field(
            "secrets.directory",
            config
                .secrets
                .directory
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "<unset>".to_string()),
            &["ANSWERBOT_SECRETS_DIRECTORY"],
        ),
        field(
            "server.bind_address",
            config.server.bind_address.clone(),
            &["ANSWERBOT_SERVER_BIND_ADDRESS"],
        ),
        field("server.port", config.server.port.to_string(), &["ANSWERBOT_SERVER_PORT"]),
        field(
            "server.events_path",
            config.server.events_path.clone(),
            &["ANSWERBOT_SERVER_EVENTS_PATH"],
        ),
        field(
            "logging.level",
            config.logging.level.clone(),
            &["ANSWERBOT_LOGGING_LEVEL", "ANSWERBOT_LOG_LEVEL"],
        ),
        field(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["ANSWERBOT_LOGGING_FORMAT", "ANSWERBOT_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("answerbot.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/answerbot.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Secret names are shown as configured; the secret values are never loaded here.
fn display_name(name: &str) -> String {
    if name.trim().is_empty() {
        "<empty>".to_string()
    } else {
        name.to_string()
    }
}
