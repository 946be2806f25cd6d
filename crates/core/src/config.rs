use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub slack: SlackConfig,
    pub search: SearchConfig,
    pub context: ContextConfig,
    pub secrets: SecretsConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Slack credentials live in the secret store; only the secret's name is configured here.
#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub secret_name: String,
    pub api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub secret_name: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ContextConfig {
    pub days_to_live: u32,
    pub cache_table: String,
    pub message_metadata_table: String,
}

#[derive(Clone, Debug)]
pub struct SecretsConfig {
    pub backend: SecretBackend,
    pub directory: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub events_path: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretBackend {
    Env,
    File,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub slack_secret_name: Option<String>,
    pub search_secret_name: Option<String>,
    pub context_days_to_live: Option<u32>,
    pub secrets_backend: Option<SecretBackend>,
    pub secrets_directory: Option<PathBuf>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const DEFAULT_SLACK_API_BASE_URL: &str = "https://slack.com/api";
pub const DEFAULT_SEARCH_BASE_URL: &str = "https://api.search.brave.com/res/v1";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://answerbot.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            slack: SlackConfig {
                secret_name: String::new(),
                api_base_url: DEFAULT_SLACK_API_BASE_URL.to_string(),
            },
            search: SearchConfig {
                secret_name: String::new(),
                base_url: DEFAULT_SEARCH_BASE_URL.to_string(),
                timeout_secs: 30,
            },
            context: ContextConfig {
                days_to_live: 90,
                cache_table: "channel_metadata".to_string(),
                message_metadata_table: "message_metadata".to_string(),
            },
            secrets: SecretsConfig { backend: SecretBackend::Env, directory: None },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 3000,
                events_path: "/slack/events".to_string(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for SecretBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "env" => Ok(Self::Env),
            "file" => Ok(Self::File),
            other => Err(ConfigError::Validation(format!(
                "unsupported secrets backend `{other}` (expected env|file)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("answerbot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(slack) = patch.slack {
            if let Some(secret_name) = slack.secret_name {
                self.slack.secret_name = secret_name;
            }
            if let Some(api_base_url) = slack.api_base_url {
                self.slack.api_base_url = api_base_url;
            }
        }

        if let Some(search) = patch.search {
            if let Some(secret_name) = search.secret_name {
                self.search.secret_name = secret_name;
            }
            if let Some(base_url) = search.base_url {
                self.search.base_url = base_url;
            }
            if let Some(timeout_secs) = search.timeout_secs {
                self.search.timeout_secs = timeout_secs;
            }
        }

        if let Some(context) = patch.context {
            if let Some(days_to_live) = context.days_to_live {
                self.context.days_to_live = days_to_live;
            }
            if let Some(cache_table) = context.cache_table {
                self.context.cache_table = cache_table;
            }
            if let Some(message_metadata_table) = context.message_metadata_table {
                self.context.message_metadata_table = message_metadata_table;
            }
        }

        if let Some(secrets) = patch.secrets {
            if let Some(backend) = secrets.backend {
                self.secrets.backend = backend;
            }
            if let Some(directory) = secrets.directory {
                self.secrets.directory = Some(directory);
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(events_path) = server.events_path {
                self.server.events_path = events_path;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("ANSWERBOT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("ANSWERBOT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("ANSWERBOT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("ANSWERBOT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("ANSWERBOT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        let slack_secret_name =
            read_env("ANSWERBOT_SLACK_SECRET_NAME").or_else(|| read_env("SLACK_SECRET_NAME"));
        if let Some(value) = slack_secret_name {
            self.slack.secret_name = value;
        }
        if let Some(value) = read_env("ANSWERBOT_SLACK_API_BASE_URL") {
            self.slack.api_base_url = value;
        }

        let search_secret_name =
            read_env("ANSWERBOT_SEARCH_SECRET_NAME").or_else(|| read_env("BRAVE_SECRET_NAME"));
        if let Some(value) = search_secret_name {
            self.search.secret_name = value;
        }
        if let Some(value) = read_env("ANSWERBOT_SEARCH_BASE_URL") {
            self.search.base_url = value;
        }
        if let Some(value) = read_env("ANSWERBOT_SEARCH_TIMEOUT_SECS") {
            self.search.timeout_secs = parse_u64("ANSWERBOT_SEARCH_TIMEOUT_SECS", &value)?;
        }

        let days_to_live = read_env("ANSWERBOT_CONTEXT_DAYS_TO_LIVE")
            .map(|value| ("ANSWERBOT_CONTEXT_DAYS_TO_LIVE", value))
            .or_else(|| read_env("CONTEXT_DAYS_TO_LIVE").map(|value| ("CONTEXT_DAYS_TO_LIVE", value)));
        if let Some((key, value)) = days_to_live {
            self.context.days_to_live = parse_u32(key, &value)?;
        }
        let cache_table =
            read_env("ANSWERBOT_CONTEXT_CACHE_TABLE").or_else(|| read_env("CACHE_TABLE_NAME"));
        if let Some(value) = cache_table {
            self.context.cache_table = value;
        }
        let message_metadata_table = read_env("ANSWERBOT_CONTEXT_MESSAGE_METADATA_TABLE")
            .or_else(|| read_env("MESSAGE_METADATA_TABLE_NAME"));
        if let Some(value) = message_metadata_table {
            self.context.message_metadata_table = value;
        }

        if let Some(value) = read_env("ANSWERBOT_SECRETS_BACKEND") {
            self.secrets.backend = value.parse()?;
        }
        if let Some(value) = read_env("ANSWERBOT_SECRETS_DIRECTORY") {
            self.secrets.directory = Some(PathBuf::from(value));
        }

        if let Some(value) = read_env("ANSWERBOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("ANSWERBOT_SERVER_PORT") {
            self.server.port = parse_u16("ANSWERBOT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("ANSWERBOT_SERVER_EVENTS_PATH") {
            self.server.events_path = value;
        }

        let log_level =
            read_env("ANSWERBOT_LOGGING_LEVEL").or_else(|| read_env("ANSWERBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("ANSWERBOT_LOGGING_FORMAT").or_else(|| read_env("ANSWERBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(slack_secret_name) = overrides.slack_secret_name {
            self.slack.secret_name = slack_secret_name;
        }
        if let Some(search_secret_name) = overrides.search_secret_name {
            self.search.secret_name = search_secret_name;
        }
        if let Some(days_to_live) = overrides.context_days_to_live {
            self.context.days_to_live = days_to_live;
        }
        if let Some(backend) = overrides.secrets_backend {
            self.secrets.backend = backend;
        }
        if let Some(directory) = overrides.secrets_directory {
            self.secrets.directory = Some(directory);
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_slack(&self.slack)?;
        validate_search(&self.search)?;
        validate_context(&self.context)?;
        validate_secrets(&self.secrets)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("answerbot.toml"), PathBuf::from("config/answerbot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    if slack.secret_name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "slack.secret_name is required (set ANSWERBOT_SLACK_SECRET_NAME or SLACK_SECRET_NAME). It names the secret holding SlackSigningSecret and SlackBotUserOAuthToken".to_string(),
        ));
    }
    validate_http_url("slack.api_base_url", &slack.api_base_url)
}

fn validate_search(search: &SearchConfig) -> Result<(), ConfigError> {
    if search.secret_name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "search.secret_name is required (set ANSWERBOT_SEARCH_SECRET_NAME or BRAVE_SECRET_NAME). It names the secret holding BraveAPIKey".to_string(),
        ));
    }
    if search.timeout_secs == 0 || search.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "search.timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    validate_http_url("search.base_url", &search.base_url)
}

fn validate_context(context: &ContextConfig) -> Result<(), ConfigError> {
    if context.days_to_live == 0 {
        return Err(ConfigError::Validation(
            "context.days_to_live must be greater than zero".to_string(),
        ));
    }
    if !is_sql_identifier(&context.cache_table) {
        return Err(ConfigError::Validation(format!(
            "context.cache_table `{}` must match [A-Za-z_][A-Za-z0-9_]*",
            context.cache_table
        )));
    }
    if !is_sql_identifier(&context.message_metadata_table) {
        return Err(ConfigError::Validation(format!(
            "context.message_metadata_table `{}` must match [A-Za-z_][A-Za-z0-9_]*",
            context.message_metadata_table
        )));
    }
    if context.cache_table.eq_ignore_ascii_case(&context.message_metadata_table) {
        return Err(ConfigError::Validation(
            "context.cache_table and context.message_metadata_table must differ".to_string(),
        ));
    }
    Ok(())
}

fn validate_secrets(secrets: &SecretsConfig) -> Result<(), ConfigError> {
    if secrets.backend == SecretBackend::File && secrets.directory.is_none() {
        return Err(ConfigError::Validation(
            "secrets.directory is required when secrets.backend is `file`".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }
    if !server.events_path.starts_with('/') {
        return Err(ConfigError::Validation(
            "server.events_path must start with `/`".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{field} must start with http:// or https://"
        )));
    }
    Ok(())
}

pub fn is_sql_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    slack: Option<SlackPatch>,
    search: Option<SearchPatch>,
    context: Option<ContextPatch>,
    secrets: Option<SecretsPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    secret_name: Option<String>,
    api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchPatch {
    secret_name: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ContextPatch {
    days_to_live: Option<u32>,
    cache_table: Option<String>,
    message_metadata_table: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SecretsPatch {
    backend: Option<SecretBackend>,
    directory: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    events_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, SecretBackend};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const MANAGED_VARS: &[&str] = &[
        "ANSWERBOT_SLACK_SECRET_NAME",
        "ANSWERBOT_SEARCH_SECRET_NAME",
        "SLACK_SECRET_NAME",
        "BRAVE_SECRET_NAME",
        "CONTEXT_DAYS_TO_LIVE",
        "CACHE_TABLE_NAME",
        "MESSAGE_METADATA_TABLE_NAME",
        "ANSWERBOT_CONTEXT_DAYS_TO_LIVE",
        "ANSWERBOT_DATABASE_URL",
        "ANSWERBOT_LOG_LEVEL",
        "ANSWERBOT_LOG_FORMAT",
        "ANSWERBOT_SECRETS_BACKEND",
        "TEST_SLACK_SECRET_NAME",
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        env::set_var("TEST_SLACK_SECRET_NAME", "prod/slack");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("answerbot.toml");
            fs::write(
                &path,
                r#"
[slack]
secret_name = "${TEST_SLACK_SECRET_NAME}"

[search]
secret_name = "prod/brave"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.slack.secret_name == "prod/slack",
                "slack secret name should be interpolated from environment",
            )?;
            ensure(config.search.secret_name == "prod/brave", "search secret name from file")?;
            Ok(())
        })();

        clear_vars(MANAGED_VARS);
        result
    }

    #[test]
    fn legacy_env_names_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        env::set_var("SLACK_SECRET_NAME", "legacy/slack");
        env::set_var("BRAVE_SECRET_NAME", "legacy/brave");
        env::set_var("CONTEXT_DAYS_TO_LIVE", "7");
        env::set_var("CACHE_TABLE_NAME", "legacy_cache");
        env::set_var("MESSAGE_METADATA_TABLE_NAME", "legacy_messages");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.slack.secret_name == "legacy/slack", "legacy slack secret name")?;
            ensure(config.search.secret_name == "legacy/brave", "legacy brave secret name")?;
            ensure(config.context.days_to_live == 7, "legacy days to live")?;
            ensure(config.context.cache_table == "legacy_cache", "legacy cache table")?;
            ensure(
                config.context.message_metadata_table == "legacy_messages",
                "legacy message metadata table",
            )?;
            Ok(())
        })();

        clear_vars(MANAGED_VARS);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        env::set_var("ANSWERBOT_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("ANSWERBOT_SLACK_SECRET_NAME", "env/slack");
        env::set_var("ANSWERBOT_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("answerbot.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[slack]
secret_name = "file/slack"

[search]
secret_name = "file/brave"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "env log format should win over default",
            )?;
            ensure(
                config.slack.secret_name == "env/slack",
                "env slack secret name should win over file",
            )?;
            ensure(config.search.secret_name == "file/brave", "file value kept when no env")?;
            Ok(())
        })();

        clear_vars(MANAGED_VARS);
        result
    }

    #[test]
    fn validation_fails_fast_without_secret_names() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        let error = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => {
                return Err("expected validation failure but config load succeeded".to_string())
            }
            Err(error) => error,
        };
        let has_message = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("slack.secret_name")
        );
        ensure(has_message, "validation failure should mention slack.secret_name")
    }

    #[test]
    fn table_names_must_be_identifiers() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        env::set_var("ANSWERBOT_SLACK_SECRET_NAME", "slack");
        env::set_var("ANSWERBOT_SEARCH_SECRET_NAME", "brave");
        env::set_var("CACHE_TABLE_NAME", "cache; DROP TABLE x");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected table name validation failure".to_string()),
            Err(ConfigError::Validation(message)) => {
                ensure(message.contains("context.cache_table"), "error names cache_table")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars(MANAGED_VARS);
        result
    }

    #[test]
    fn file_backend_requires_directory() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                slack_secret_name: Some("slack".to_string()),
                search_secret_name: Some("brave".to_string()),
                secrets_backend: Some(SecretBackend::File),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        ensure(
            matches!(result, Err(ConfigError::Validation(ref message)) if message.contains("secrets.directory")),
            "file backend without directory should fail validation",
        )
    }

    #[test]
    fn invalid_days_to_live_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        env::set_var("CONTEXT_DAYS_TO_LIVE", "N");

        let result = AppConfig::load(LoadOptions::default());
        clear_vars(MANAGED_VARS);

        ensure(
            matches!(result, Err(ConfigError::InvalidEnvOverride { ref key, .. }) if key == "CONTEXT_DAYS_TO_LIVE"),
            "non-numeric days to live should be rejected with the variable name",
        )
    }
}
